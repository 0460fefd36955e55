use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::{parse_version, WalletConfig};
use crate::error::{BridgeError, Result};

const USER_AGENT: &str = concat!("walletbridge/", env!("CARGO_PKG_VERSION"));
/// Maximum download size for the extension zip (64 MB compressed)
const MAX_DOWNLOAD_SIZE: usize = 64 * 1024 * 1024;
/// Maximum total uncompressed size (256 MB, zip bomb protection)
const MAX_UNCOMPRESSED_SIZE: u64 = 256 * 1024 * 1024;
const MANIFEST_FILE: &str = "manifest.json";

/// An unpacked extension ready to be loaded by the browser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledExtension {
    /// Directory containing `manifest.json`
    pub path: PathBuf,
    /// Manifest `name`, with `__MSG_*__` placeholders resolved
    pub declared_name: String,
    pub version: String,
}

/// Keeps pinned wallet extension versions in the on-disk cache:
/// `{cache_root}/{version}.zip` and `{cache_root}/{version}/`.
#[derive(Debug, Clone)]
pub struct ExtensionInstaller {
    cache_root: PathBuf,
    wallet_name: String,
    url_template: String,
    allowed_hosts: Vec<String>,
}

impl ExtensionInstaller {
    pub fn new(cache_root: impl Into<PathBuf>, wallet: &WalletConfig) -> Self {
        Self {
            cache_root: cache_root.into(),
            wallet_name: wallet.name.clone(),
            url_template: wallet.download_url.clone(),
            allowed_hosts: wallet.allowed_hosts.clone(),
        }
    }

    pub fn cache_root(&self) -> &Path {
        &self.cache_root
    }

    pub fn archive_path(&self, version: &str) -> PathBuf {
        self.cache_root.join(format!("{}.zip", version))
    }

    pub fn unpacked_dir(&self, version: &str) -> PathBuf {
        self.cache_root.join(version)
    }

    /// Make `version` available unpacked, downloading on a cache miss.
    ///
    /// Download failures are returned as-is; nothing is retried and a
    /// partially written archive never lands at the cache path.
    pub async fn ensure(&self, version: &str) -> Result<InstalledExtension> {
        let version = parse_version(version)?;
        let unpacked = self.unpacked_dir(&version);

        if unpacked.is_dir() {
            match resolve_extension_root(&unpacked, &self.wallet_name) {
                Ok((path, declared_name)) => {
                    tracing::debug!("Extension v{} cache hit at {}", version, path.display());
                    return Ok(InstalledExtension {
                        path,
                        declared_name,
                        version,
                    });
                }
                Err(e) => {
                    tracing::warn!(
                        "Discarding unusable unpacked extension at {}: {}",
                        unpacked.display(),
                        e
                    );
                    fs::remove_dir_all(&unpacked)?;
                }
            }
        }

        let archive = self.archive_path(&version);
        let bytes = if archive.is_file() {
            tracing::debug!("Unpacking cached archive {}", archive.display());
            fs::read(&archive)?
        } else {
            let url = self.download_url(&version)?;
            tracing::info!("Downloading wallet extension v{} from {}", version, url);
            let bytes = download_asset(&url).await?;
            self.write_archive(&archive, &bytes)?;
            bytes
        };

        self.unpack(&version, &bytes)
    }

    /// Versions with a usable unpacked directory, oldest first.
    pub fn installed_versions(&self) -> Result<Vec<String>> {
        if !self.cache_root.is_dir() {
            return Ok(Vec::new());
        }

        let mut versions = Vec::new();
        for entry in fs::read_dir(&self.cache_root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            let Ok(parsed) = semver::Version::parse(&name) else {
                continue;
            };
            if resolve_extension_root(&entry.path(), &self.wallet_name).is_ok() {
                versions.push(parsed);
            }
        }

        versions.sort();
        Ok(versions.into_iter().map(|v| v.to_string()).collect())
    }

    /// Remove the archive and unpacked directory of `version`.
    /// Returns `false` when nothing was cached.
    pub fn remove(&self, version: &str) -> Result<bool> {
        let version = parse_version(version)?;
        let mut removed = false;

        let dir = self.unpacked_dir(&version);
        if dir.exists() {
            fs::remove_dir_all(&dir).map_err(|e| {
                BridgeError::ExtensionError(format!("Failed to remove {}: {}", dir.display(), e))
            })?;
            removed = true;
        }

        let archive = self.archive_path(&version);
        if archive.exists() {
            fs::remove_file(&archive)?;
            removed = true;
        }

        Ok(removed)
    }

    fn download_url(&self, version: &str) -> Result<String> {
        let url = self.url_template.replace("{version}", version);
        validate_download_url(&url, &self.allowed_hosts)?;
        Ok(url)
    }

    fn write_archive(&self, archive: &Path, bytes: &[u8]) -> Result<()> {
        fs::create_dir_all(&self.cache_root)?;

        let mut tmp = tempfile::NamedTempFile::new_in(&self.cache_root)?;
        tmp.write_all(bytes)?;
        tmp.flush()?;
        tmp.persist(archive).map_err(|e| {
            BridgeError::ExtensionError(format!(
                "Failed to store archive at {}: {}",
                archive.display(),
                e.error
            ))
        })?;
        Ok(())
    }

    /// Extract into a temp directory next to the target, verify a manifest is
    /// resolvable, then move into place.
    fn unpack(&self, version: &str, bytes: &[u8]) -> Result<InstalledExtension> {
        fs::create_dir_all(&self.cache_root)?;
        let tmp_dir = tempfile::Builder::new()
            .prefix(&format!(".{}-", version))
            .tempdir_in(&self.cache_root)?;

        extract_zip(bytes, tmp_dir.path())?;
        resolve_extension_root(tmp_dir.path(), &self.wallet_name)?;

        let target = self.unpacked_dir(version);
        match fs::remove_dir_all(&target) {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(BridgeError::ExtensionError(format!(
                    "Failed to clean existing install at {}: {}",
                    target.display(),
                    e
                )));
            }
        }

        // Persist the temp dir (prevent auto-cleanup) and rename into place
        let tmp_path = tmp_dir.keep();
        fs::rename(&tmp_path, &target).map_err(|e| {
            BridgeError::ExtensionError(format!(
                "Failed to move extracted extension to {}: {}",
                target.display(),
                e
            ))
        })?;

        let (path, declared_name) = resolve_extension_root(&target, &self.wallet_name)?;
        tracing::info!(
            "Installed {} v{} at {}",
            declared_name,
            version,
            path.display()
        );

        Ok(InstalledExtension {
            path,
            declared_name,
            version: version.to_string(),
        })
    }
}

/// Locate the real extension root inside an unpacked archive.
///
/// A manifest at `dir` wins. Otherwise the immediate subdirectories are
/// checked in name order; one whose declared name contains `wallet_name`
/// (case-insensitive) is preferred over the first manifest found.
pub fn resolve_extension_root(dir: &Path, wallet_name: &str) -> Result<(PathBuf, String)> {
    if dir.join(MANIFEST_FILE).is_file() {
        let name = read_manifest_name(dir)?;
        return Ok((dir.to_path_buf(), name));
    }

    let mut subdirs: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|t| t.is_dir()).unwrap_or(false))
        .map(|entry| entry.path())
        .filter(|path| path.join(MANIFEST_FILE).is_file())
        .collect();
    subdirs.sort();

    let wanted = wallet_name.to_lowercase();
    let mut first: Option<(PathBuf, String)> = None;

    for subdir in subdirs {
        let name = match read_manifest_name(&subdir) {
            Ok(name) => name,
            Err(e) => {
                tracing::debug!("Skipping {}: {}", subdir.display(), e);
                continue;
            }
        };
        if !wanted.is_empty() && name.to_lowercase().contains(&wanted) {
            return Ok((subdir, name));
        }
        if first.is_none() {
            first = Some((subdir, name));
        }
    }

    first.ok_or_else(|| {
        BridgeError::ExtensionError(format!(
            "No manifest.json found in {} or its subdirectories",
            dir.display()
        ))
    })
}

/// Read the manifest's declared name, resolving `__MSG_key__` through
/// `_locales/{default_locale}/messages.json`.
pub fn read_manifest_name(dir: &Path) -> Result<String> {
    let manifest_path = dir.join(MANIFEST_FILE);
    let content = fs::read_to_string(&manifest_path).map_err(|e| {
        BridgeError::ExtensionError(format!(
            "Failed to read {}: {}",
            manifest_path.display(),
            e
        ))
    })?;
    let manifest: serde_json::Value = serde_json::from_str(&content).map_err(|e| {
        BridgeError::ExtensionError(format!(
            "{} is invalid JSON: {}",
            manifest_path.display(),
            e
        ))
    })?;

    let name = manifest
        .get("name")
        .and_then(|v| v.as_str())
        .ok_or_else(|| {
            BridgeError::ExtensionError(format!(
                "{} is missing 'name' field",
                manifest_path.display()
            ))
        })?;

    let Some(key) = name
        .strip_prefix("__MSG_")
        .and_then(|rest| rest.strip_suffix("__"))
    else {
        return Ok(name.to_string());
    };

    let locale = manifest
        .get("default_locale")
        .and_then(|v| v.as_str())
        .unwrap_or("en");
    let messages_path = dir.join("_locales").join(locale).join("messages.json");

    let resolved = fs::read_to_string(&messages_path)
        .ok()
        .and_then(|raw| serde_json::from_str::<serde_json::Value>(&raw).ok())
        .and_then(|messages| {
            // Message keys are case-insensitive
            messages.as_object().and_then(|map| {
                map.iter()
                    .find(|(k, _)| k.eq_ignore_ascii_case(key))
                    .and_then(|(_, v)| v.get("message"))
                    .and_then(|m| m.as_str())
                    .map(|m| m.to_string())
            })
        });

    Ok(resolved.unwrap_or_else(|| name.to_string()))
}

/// Build a reqwest client with HTTPS-only and timeouts.
fn build_http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .https_only(true)
        .timeout(Duration::from_secs(120))
        .connect_timeout(Duration::from_secs(10))
        .build()
        .map_err(|e| BridgeError::ExtensionError(format!("Failed to create HTTP client: {}", e)))
}

/// Validate that a download URL is HTTPS and points to an allowed host.
fn validate_download_url(url: &str, allowed_hosts: &[String]) -> Result<()> {
    let parsed = reqwest::Url::parse(url)
        .map_err(|e| BridgeError::ExtensionError(format!("Invalid download URL: {}", e)))?;

    if parsed.scheme() != "https" {
        return Err(BridgeError::ExtensionError(
            "Download URL must use HTTPS".to_string(),
        ));
    }

    let host = parsed.host_str().unwrap_or("");
    let allowed = allowed_hosts
        .iter()
        .any(|allowed| host == allowed || host.ends_with(&format!(".{}", allowed)));
    if !allowed {
        return Err(BridgeError::ExtensionError(format!(
            "Download URL host '{}' is not in wallet.allowed_hosts",
            host
        )));
    }

    Ok(())
}

/// Download a file from a URL, returning the bytes.
///
/// Enforces a maximum download size to prevent resource exhaustion.
async fn download_asset(url: &str) -> Result<Vec<u8>> {
    let client = build_http_client()?;

    let resp = client
        .get(url)
        .header("User-Agent", USER_AGENT)
        .send()
        .await
        .map_err(|e| BridgeError::ExtensionError(format!("Failed to download extension: {}", e)))?;

    if !resp.status().is_success() {
        return Err(BridgeError::ExtensionError(format!(
            "Download failed with status {} for {}",
            resp.status(),
            url
        )));
    }

    if let Some(content_length) = resp.content_length() {
        if content_length > MAX_DOWNLOAD_SIZE as u64 {
            return Err(BridgeError::ExtensionError(format!(
                "Extension download too large ({} bytes, max {} bytes)",
                content_length, MAX_DOWNLOAD_SIZE
            )));
        }
    }

    let bytes = resp.bytes().await.map_err(|e| {
        BridgeError::ExtensionError(format!("Failed to read download response: {}", e))
    })?;

    if bytes.len() > MAX_DOWNLOAD_SIZE {
        return Err(BridgeError::ExtensionError(format!(
            "Extension download too large ({} bytes, max {} bytes)",
            bytes.len(),
            MAX_DOWNLOAD_SIZE
        )));
    }

    Ok(bytes.to_vec())
}

/// Extract a zip archive to a target directory.
///
/// Rejects entries escaping the target (`enclosed_name`) and stops once the
/// total uncompressed size passes the cap.
pub fn extract_zip(bytes: &[u8], target_dir: &Path) -> Result<()> {
    let cursor = std::io::Cursor::new(bytes);
    let mut archive = zip::ZipArchive::new(cursor).map_err(|e| {
        BridgeError::ExtensionError(format!("Extension archive appears corrupted: {}", e))
    })?;

    fs::create_dir_all(target_dir)?;

    let mut total_uncompressed: u64 = 0;

    for i in 0..archive.len() {
        let mut file = archive.by_index(i)?;

        total_uncompressed = total_uncompressed.saturating_add(file.size());
        if total_uncompressed > MAX_UNCOMPRESSED_SIZE {
            return Err(BridgeError::ExtensionError(format!(
                "Total uncompressed size exceeds {} bytes",
                MAX_UNCOMPRESSED_SIZE
            )));
        }

        let entry_path = file
            .enclosed_name()
            .ok_or_else(|| {
                BridgeError::ExtensionError(format!(
                    "Zip entry '{}' has an unsafe path",
                    file.name()
                ))
            })?
            .to_path_buf();

        let out_path = target_dir.join(&entry_path);

        if file.is_dir() {
            fs::create_dir_all(&out_path)?;
            continue;
        }

        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut buf = Vec::with_capacity(file.size() as usize);
        file.read_to_end(&mut buf)?;
        fs::write(&out_path, &buf)?;
    }

    Ok(())
}
