use colored::Colorize;

use super::{abandon_spinner, create_spinner, finish_spinner};
use crate::cli::Cli;
use walletbridge::extension::ExtensionInstaller;
use walletbridge::Result;

pub async fn run(cli: &Cli, version: Option<&str>) -> Result<()> {
    let config = cli.load_config()?;
    let version = version.unwrap_or(&config.wallet.version);
    let installer = ExtensionInstaller::new(config.cache.root_dir(), &config.wallet);

    let spinner = create_spinner(
        cli.json,
        &format!("Installing {} v{}...", config.wallet.name, version),
    );
    let installed = match installer.ensure(version).await {
        Ok(installed) => installed,
        Err(e) => {
            abandon_spinner(spinner, "Install failed");
            return Err(e);
        }
    };
    finish_spinner(
        spinner,
        &format!("{} v{}", installed.declared_name, installed.version),
    );

    if cli.json {
        println!(
            "{}",
            serde_json::json!({
                "name": installed.declared_name,
                "version": installed.version,
                "path": installed.path.display().to_string(),
            })
        );
    } else {
        println!(
            "  {}  Path: {}",
            "◆".cyan(),
            installed.path.display().to_string().dimmed()
        );
    }

    Ok(())
}
