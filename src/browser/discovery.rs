use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::{BridgeError, Result};

/// Chromium-family browsers that can load unpacked extensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrowserType {
    Chromium,
    Chrome,
    Brave,
    Edge,
}

impl BrowserType {
    pub fn name(&self) -> &'static str {
        match self {
            BrowserType::Chromium => "Chromium",
            BrowserType::Chrome => "Google Chrome",
            BrowserType::Brave => "Brave",
            BrowserType::Edge => "Microsoft Edge",
        }
    }

    /// Executable names looked up on `PATH`
    fn path_names(&self) -> &'static [&'static str] {
        match self {
            BrowserType::Chromium => &["chromium", "chromium-browser"],
            BrowserType::Chrome => &["google-chrome", "google-chrome-stable", "chrome"],
            BrowserType::Brave => &["brave-browser", "brave"],
            BrowserType::Edge => &["microsoft-edge", "msedge"],
        }
    }
}

#[derive(Debug, Clone)]
pub struct BrowserInfo {
    pub browser_type: BrowserType,
    pub path: PathBuf,
    pub version: Option<String>,
}

impl BrowserInfo {
    pub fn new(browser_type: BrowserType, path: PathBuf) -> Self {
        Self {
            browser_type,
            path,
            version: None,
        }
    }

    pub fn with_version(mut self) -> Self {
        self.version = detect_version(&self.path);
        self
    }
}

/// Resolve the browser to launch: an explicit executable wins, otherwise the
/// highest-priority installed browser.
pub fn resolve_browser(executable: Option<&str>) -> Result<BrowserInfo> {
    match executable.map(str::trim).filter(|s| !s.is_empty()) {
        Some(path) => {
            let path = PathBuf::from(shellexpand::tilde(path).to_string());
            if !path.exists() {
                return Err(BridgeError::BrowserLaunchFailed(format!(
                    "Browser not found at: {}",
                    path.display()
                )));
            }
            // Assume Chrome-compatible
            Ok(BrowserInfo::new(BrowserType::Chromium, path))
        }
        None => discover_browser(),
    }
}

/// Discover the best available browser on the system
pub fn discover_browser() -> Result<BrowserInfo> {
    discover_all_browsers()
        .into_iter()
        .next()
        .ok_or(BridgeError::BrowserNotFound)
}

/// Discover all available browsers, in priority order.
///
/// Branded Chrome 137+ ignores `--load-extension`, so Chromium is preferred.
pub fn discover_all_browsers() -> Vec<BrowserInfo> {
    let mut found = Vec::new();

    for (browser_type, paths) in browser_candidates() {
        let known = paths
            .iter()
            .map(|p| PathBuf::from(shellexpand::tilde(p).to_string()))
            .find(|p| p.exists());

        let path = known.or_else(|| {
            browser_type
                .path_names()
                .iter()
                .find_map(|name| which::which(name).ok())
        });

        if let Some(path) = path {
            found.push(BrowserInfo::new(browser_type, path).with_version());
        }
    }

    found
}

fn browser_candidates() -> Vec<(BrowserType, Vec<&'static str>)> {
    #[cfg(target_os = "macos")]
    {
        vec![
            (
                BrowserType::Chromium,
                vec![
                    "/Applications/Chromium.app/Contents/MacOS/Chromium",
                    "~/Applications/Chromium.app/Contents/MacOS/Chromium",
                ],
            ),
            (
                BrowserType::Chrome,
                vec![
                    "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
                    "/Applications/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing",
                ],
            ),
            (
                BrowserType::Brave,
                vec!["/Applications/Brave Browser.app/Contents/MacOS/Brave Browser"],
            ),
            (
                BrowserType::Edge,
                vec!["/Applications/Microsoft Edge.app/Contents/MacOS/Microsoft Edge"],
            ),
        ]
    }

    #[cfg(target_os = "linux")]
    {
        vec![
            (
                BrowserType::Chromium,
                vec![
                    "/usr/bin/chromium",
                    "/usr/bin/chromium-browser",
                    "/snap/bin/chromium",
                ],
            ),
            (
                BrowserType::Chrome,
                vec!["/usr/bin/google-chrome", "/usr/bin/google-chrome-stable"],
            ),
            (
                BrowserType::Brave,
                vec!["/usr/bin/brave-browser", "/usr/bin/brave"],
            ),
            (
                BrowserType::Edge,
                vec!["/usr/bin/microsoft-edge", "/usr/bin/microsoft-edge-stable"],
            ),
        ]
    }

    #[cfg(target_os = "windows")]
    {
        vec![
            (
                BrowserType::Chrome,
                vec![
                    r"C:\Program Files\Google\Chrome\Application\chrome.exe",
                    r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
                ],
            ),
            (
                BrowserType::Brave,
                vec![r"C:\Program Files\BraveSoftware\Brave-Browser\Application\brave.exe"],
            ),
            (
                BrowserType::Edge,
                vec![
                    r"C:\Program Files\Microsoft\Edge\Application\msedge.exe",
                    r"C:\Program Files (x86)\Microsoft\Edge\Application\msedge.exe",
                ],
            ),
        ]
    }

    #[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
    {
        vec![]
    }
}

fn detect_version(path: &Path) -> Option<String> {
    let output = Command::new(path).arg("--version").output().ok()?;

    if !output.status.success() {
        return None;
    }

    // "Chromium 124.0.6367.91 snap" / "Google Chrome 120.0.6099.109"
    let text = String::from_utf8_lossy(&output.stdout);
    parse_version_output(&text)
}

fn parse_version_output(text: &str) -> Option<String> {
    text.split_whitespace()
        .find(|word| {
            word.chars().next().is_some_and(|c| c.is_ascii_digit()) && word.contains('.')
        })
        .map(|s| s.to_string())
}
