pub mod cache;
pub mod config;
pub mod connect;
pub mod fingerprint;
pub mod install;
pub mod locate;
pub mod prebake;

use std::time::Duration;

use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};

/// Spinner for long-running steps. `None` in JSON mode.
fn create_spinner(json: bool, message: &str) -> Option<ProgressBar> {
    if json {
        return None;
    }
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner()
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"])
        .template("  {spinner} {msg}")
    {
        pb.set_style(style);
    }
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(80));
    Some(pb)
}

fn finish_spinner(pb: Option<ProgressBar>, message: &str) {
    if let Some(pb) = pb {
        pb.finish_with_message(format!("{} {}", "✓".green(), message));
    }
}

fn abandon_spinner(pb: Option<ProgressBar>, message: &str) {
    if let Some(pb) = pb {
        pb.abandon_with_message(format!("{} {}", "✗".red(), message));
    }
}
