use colored::Colorize;

use crate::cli::{CacheCommands, Cli};
use walletbridge::extension::ExtensionInstaller;
use walletbridge::profile::{ProfileManager, WalletSetup};
use walletbridge::Result;

pub async fn run(cli: &Cli, command: &CacheCommands) -> Result<()> {
    match command {
        CacheCommands::List => list(cli).await,
        CacheCommands::Remove { version } => remove(cli, version).await,
    }
}

async fn list(cli: &Cli) -> Result<()> {
    let config = cli.load_config()?;
    let installer = ExtensionInstaller::new(config.cache.root_dir(), &config.wallet);
    let versions = installer.installed_versions()?;

    let fingerprint = WalletSetup::from_config(&config).fingerprint();
    let prebaked = ProfileManager::from_config(&config.cache).has_prebaked(&fingerprint);

    if cli.json {
        println!(
            "{}",
            serde_json::json!({
                "root": installer.cache_root().display().to_string(),
                "extension_versions": versions,
                "pinned_version": config.wallet.version,
                "fingerprint": fingerprint.as_str(),
                "prebaked": prebaked,
            })
        );
        return Ok(());
    }

    println!();
    println!(
        "  {}  {}",
        "Cache".bold(),
        installer.cache_root().display().to_string().dimmed()
    );
    println!("  {}", "─".repeat(40).dimmed());

    if versions.is_empty() {
        println!("  {}", "No extension versions cached".dimmed());
    }
    for version in &versions {
        let marker = if *version == config.wallet.version {
            " (pinned)".cyan().to_string()
        } else {
            String::new()
        };
        println!("  {}  {} v{}{}", "◆".cyan(), config.wallet.name, version, marker);
    }

    let profile_state = if prebaked {
        "pre-baked".green()
    } else {
        "missing".yellow()
    };
    println!("  {}  Profile {}: {}", "◆".cyan(), fingerprint, profile_state);
    println!();

    Ok(())
}

async fn remove(cli: &Cli, version: &str) -> Result<()> {
    let config = cli.load_config()?;
    let installer = ExtensionInstaller::new(config.cache.root_dir(), &config.wallet);
    let removed = installer.remove(version)?;

    if cli.json {
        println!(
            "{}",
            serde_json::json!({ "version": version, "removed": removed })
        );
    } else if removed {
        println!("{} Removed v{}", "✓".green(), version);
    } else {
        println!("{} v{} is not cached", "!".yellow(), version);
    }

    Ok(())
}
