use crate::cli::{Cli, ConfigCommands};
use walletbridge::{BridgeError, Result};

pub async fn run(cli: &Cli, command: &ConfigCommands) -> Result<()> {
    match command {
        ConfigCommands::Show => show(cli).await,
        ConfigCommands::Path => path(cli).await,
    }
}

async fn show(cli: &Cli) -> Result<()> {
    let config = cli.load_config()?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&config)?);
    } else {
        let toml_str =
            toml::to_string_pretty(&config).map_err(|e| BridgeError::ConfigError(e.to_string()))?;
        println!("{}", toml_str);
    }

    Ok(())
}

async fn path(cli: &Cli) -> Result<()> {
    let path = cli.config_path();

    if cli.json {
        println!(
            "{}",
            serde_json::json!({
                "path": path.display().to_string(),
                "exists": path.is_file(),
            })
        );
    } else {
        println!("{}", path.display());
    }

    Ok(())
}
