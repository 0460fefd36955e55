use colored::Colorize;

use crate::cli::Cli;
use walletbridge::profile::{ProfileManager, WalletSetup};
use walletbridge::Result;

pub async fn run(cli: &Cli) -> Result<()> {
    let config = cli.load_config()?;
    let fingerprint = WalletSetup::from_config(&config).fingerprint();
    let profiles = ProfileManager::from_config(&config.cache);
    let cache_dir = profiles.cache_dir(&fingerprint);
    let prebaked = profiles.has_prebaked(&fingerprint);

    if cli.json {
        println!(
            "{}",
            serde_json::json!({
                "fingerprint": fingerprint.as_str(),
                "prebaked": prebaked,
                "path": cache_dir.display().to_string(),
            })
        );
        return Ok(());
    }

    println!("{}", fingerprint);
    if prebaked {
        println!(
            "  {} Pre-baked at {}",
            "✓".green(),
            cache_dir.display().to_string().dimmed()
        );
    } else {
        println!(
            "  {} Not pre-baked (run 'walletbridge prebake')",
            "!".yellow()
        );
    }

    Ok(())
}
