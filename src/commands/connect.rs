use std::path::Path;

use colored::Colorize;

use crate::cli::Cli;
use walletbridge::connection::ConnectReport;
use walletbridge::state_transfer::StorageState;
use walletbridge::{AutomationSession, Bridge, BridgeError, Result};

pub async fn run(cli: &Cli, url: &str, test_id: &str, state: Option<&Path>) -> Result<()> {
    let config = cli.load_config()?;
    let expected_chain = config.network.chain_id;
    let bridge = Bridge::from_config(config);

    let state = state.map(StorageState::load).transpose()?;
    let session = bridge.open_session(test_id).await?;
    let outcome = drive(&session, url, state.as_ref()).await;
    session.teardown().await;
    let (report, on_network) = outcome?;

    if cli.json {
        println!(
            "{}",
            serde_json::json!({
                "url": url,
                "connect": report,
                "network": { "chain_id": expected_chain, "matched": on_network },
            })
        );
    } else {
        print_report(url, &report, expected_chain, on_network);
    }

    if report.connected {
        Ok(())
    } else {
        Err(BridgeError::Other(format!(
            "Wallet did not connect to {} after {} attempt(s)",
            url, report.attempts
        )))
    }
}

async fn drive(
    session: &AutomationSession,
    url: &str,
    state: Option<&StorageState>,
) -> Result<(ConnectReport, bool)> {
    if let Some(state) = state {
        session.restore_state(state).await?;
    }

    let page = session.open_dapp(url).await?;
    let report = session.connect_wallet(&page).await?;
    let on_network = if report.connected {
        session.ensure_network(&page).await?
    } else {
        false
    };
    Ok((report, on_network))
}

fn print_report(url: &str, report: &ConnectReport, chain_id: u64, on_network: bool) {
    println!();
    println!("  {}", url.bold());
    println!("  {}", "─".repeat(40).dimmed());

    if report.connected {
        let how = if report.already_connected {
            "already connected".to_string()
        } else {
            format!("{} attempt(s)", report.attempts)
        };
        println!("  {}  Connected ({})", "✓".green(), how);
    } else {
        println!(
            "  {}  Not connected after {} attempt(s), last state {:?}",
            "✗".red(),
            report.attempts,
            report.final_state
        );
    }

    if on_network {
        println!("  {}  On chain {}", "✓".green(), chain_id);
    } else if report.connected {
        println!("  {}  Wallet is not on chain {}", "!".yellow(), chain_id);
    }
    println!();
}
