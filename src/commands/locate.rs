use colored::Colorize;

use crate::cli::Cli;
use walletbridge::extension::{DiscoveryPath, ExtensionLocator};
use walletbridge::{Bridge, Result};

pub async fn run(cli: &Cli, url: Option<&str>) -> Result<()> {
    let config = cli.load_config()?;
    let bridge = Bridge::from_config(config);

    // A pre-baked profile is not required just to find the extension
    let session = if bridge.profiles().has_prebaked(bridge.fingerprint()) {
        bridge.open_session("locate").await?
    } else {
        bridge.open_scratch_session("locate").await?
    };

    let located: Result<(String, DiscoveryPath)> = async {
        if let Some(url) = url {
            session.open_dapp(url).await?;
        }
        let locator = ExtensionLocator::from_config(&bridge.config().wallet, &session.timeouts());
        locator.locate_with_path(session.context()?.as_ref()).await
    }
    .await;

    session.teardown().await;
    let (id, path) = located?;

    if cli.json {
        println!(
            "{}",
            serde_json::json!({
                "id": id,
                "discovered_via": format!("{:?}", path),
            })
        );
    } else {
        println!("{}", id);
        println!("  {} via {:?}", "◆".cyan(), path);
    }

    Ok(())
}
