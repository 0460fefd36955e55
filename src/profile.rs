use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::{CacheConfig, Config, NetworkConfig};
use crate::error::{BridgeError, Result};

/// Hex characters kept from the setup digest.
const FINGERPRINT_LEN: usize = 20;

/// Browser files that tie a profile to one running process.
const SINGLETON_FILES: &[&str] = &[
    "SingletonLock",
    "SingletonSocket",
    "SingletonCookie",
    "lockfile",
    "DevToolsActivePort",
];

/// Everything the pre-bake step does to a fresh wallet. Identical setups
/// produce identical fingerprints and share one cached profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletSetup {
    pub seed_phrase: String,
    pub password: String,
    pub networks: Vec<NetworkConfig>,
}

impl WalletSetup {
    pub fn from_config(config: &Config) -> Self {
        Self {
            seed_phrase: config.wallet.seed_phrase.trim().to_string(),
            password: config.wallet.password.clone(),
            networks: vec![config.network.clone()],
        }
    }

    pub fn fingerprint(&self) -> Fingerprint {
        // Field order is fixed by the struct, so the JSON is canonical
        let canonical = serde_json::to_vec(self).unwrap_or_default();
        let digest = Sha256::digest(&canonical);
        let mut hex = hex::encode(digest);
        hex.truncate(FINGERPRINT_LEN);
        Fingerprint(hex)
    }
}

/// Cache key of a pre-baked profile: `{cache_root}/{fingerprint}/`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Creates per-test profile directories and manages the pre-baked cache.
#[derive(Debug, Clone)]
pub struct ProfileManager {
    cache_root: PathBuf,
    temp_root: PathBuf,
}

impl ProfileManager {
    pub fn new(cache_root: impl Into<PathBuf>, temp_root: impl Into<PathBuf>) -> Self {
        Self {
            cache_root: cache_root.into(),
            temp_root: temp_root.into(),
        }
    }

    pub fn from_config(cache: &CacheConfig) -> Self {
        Self::new(cache.root_dir(), cache.temp_dir())
    }

    pub fn cache_dir(&self, fingerprint: &Fingerprint) -> PathBuf {
        self.cache_root.join(fingerprint.as_str())
    }

    pub fn has_prebaked(&self, fingerprint: &Fingerprint) -> bool {
        self.cache_dir(fingerprint).is_dir()
    }

    /// Create a fresh `{temp_root}/{engine}-{test id}-{random}` directory
    /// seeded from the pre-baked cache of `fingerprint`.
    pub fn acquire(
        &self,
        engine: &str,
        test_id: &str,
        fingerprint: &Fingerprint,
    ) -> Result<ProfileDir> {
        fs::create_dir_all(&self.temp_root)?;

        let prefix = format!("{}-{}-", sanitize(engine), sanitize(test_id));
        let path = tempfile::Builder::new()
            .prefix(&prefix)
            .tempdir_in(&self.temp_root)?
            .keep();
        let profile = ProfileDir::new(path);

        let source = self.cache_dir(fingerprint);
        if !source.is_dir() {
            // Dropping `profile` removes the directory just created
            return Err(BridgeError::ProfileCacheMissing {
                fingerprint: fingerprint.to_string(),
            });
        }

        copy_profile_tree(&source, profile.path()).map_err(|e| {
            BridgeError::Other(format!(
                "Failed to seed profile from {}: {}",
                source.display(),
                e
            ))
        })?;

        tracing::debug!(
            "Seeded profile {} from {}",
            profile.path().display(),
            source.display()
        );
        Ok(profile)
    }

    /// An empty per-test directory, for the pre-bake step and diagnostics.
    pub fn scratch(&self, engine: &str, test_id: &str) -> Result<ProfileDir> {
        fs::create_dir_all(&self.temp_root)?;
        let prefix = format!("{}-{}-", sanitize(engine), sanitize(test_id));
        let path = tempfile::Builder::new()
            .prefix(&prefix)
            .tempdir_in(&self.temp_root)?
            .keep();
        Ok(ProfileDir::new(path))
    }

    /// Store a prepared profile under `fingerprint`. Existing entries are
    /// kept unless `force` is set.
    pub fn store_prebaked(
        &self,
        source: &Path,
        fingerprint: &Fingerprint,
        force: bool,
    ) -> Result<PathBuf> {
        let target = self.cache_dir(fingerprint);
        if target.is_dir() && !force {
            tracing::info!("Pre-baked profile {} already cached", fingerprint);
            return Ok(target);
        }

        fs::create_dir_all(&self.cache_root)?;
        let staging = tempfile::Builder::new()
            .prefix(&format!(".{}-", fingerprint))
            .tempdir_in(&self.cache_root)?;
        copy_profile_tree(source, staging.path())?;

        match fs::remove_dir_all(&target) {
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        fs::rename(staging.keep(), &target)?;

        tracing::info!("Stored pre-baked profile {} at {}", fingerprint, target.display());
        Ok(target)
    }
}

/// A per-test profile directory, removed on [`ProfileDir::release`] or drop.
#[derive(Debug)]
pub struct ProfileDir {
    path: PathBuf,
    released: bool,
}

impl ProfileDir {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            released: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn release(mut self) {
        self.remove();
    }

    fn remove(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        match fs::remove_dir_all(&self.path) {
            Ok(_) => tracing::debug!("Removed profile {}", self.path.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(
                "Failed to remove profile {}: {}",
                self.path.display(),
                e
            ),
        }
    }
}

impl Drop for ProfileDir {
    fn drop(&mut self) {
        self.remove();
    }
}

fn sanitize(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .take(48)
        .collect();

    if cleaned.is_empty() {
        "test".to_string()
    } else {
        cleaned
    }
}

/// Recursively copy a profile tree, skipping singleton locks, sockets and
/// symlinks.
fn copy_profile_tree(src: &Path, dst: &Path) -> io::Result<()> {
    fs::create_dir_all(dst)?;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let name = entry.file_name();
        if SINGLETON_FILES.iter().any(|s| name == *s) {
            continue;
        }

        let src_path = entry.path();
        let dst_path = dst.join(&name);
        let file_type = entry.file_type()?;

        if file_type.is_dir() {
            copy_profile_tree(&src_path, &dst_path)?;
        } else if file_type.is_file() {
            fs::copy(&src_path, &dst_path)?;
        } else {
            tracing::trace!("Skipping special file {}", src_path.display());
        }
    }
    Ok(())
}
