use colored::Colorize;

use super::{abandon_spinner, create_spinner, finish_spinner};
use crate::cli::Cli;
use walletbridge::{Bridge, Result};

pub async fn run(cli: &Cli, force: bool) -> Result<()> {
    let config = cli.load_config()?;
    let bridge = Bridge::from_config(config);
    let fingerprint = bridge.fingerprint().clone();

    let spinner = create_spinner(
        cli.json,
        &format!("Onboarding wallet for profile {}...", fingerprint),
    );
    let stored = match bridge.prebake(force).await {
        Ok(path) => path,
        Err(e) => {
            abandon_spinner(spinner, "Pre-bake failed");
            return Err(e);
        }
    };
    finish_spinner(spinner, &format!("Profile {} ready", fingerprint));

    if cli.json {
        println!(
            "{}",
            serde_json::json!({
                "fingerprint": fingerprint.as_str(),
                "path": stored.display().to_string(),
            })
        );
    } else {
        println!(
            "  {}  Stored at {}",
            "◆".cyan(),
            stored.display().to_string().dimmed()
        );
    }

    Ok(())
}
