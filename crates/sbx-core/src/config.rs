use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{SbxError, SbxResult};
use crate::types::UserId;

/// Top-level client configuration (loaded from sbx.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SbxConfig {
    pub user: UserConfig,
    pub storage: StorageConfig,
    pub keystore: KeystoreConfig,
    pub session: SessionConfig,
    pub logging: LoggingConfig,
    /// Warn if the config file is world-readable (default: true)
    #[serde(default = "default_true")]
    pub config_file_mode_check: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct UserConfig {
    /// Identity of the local user in the backend's key directory
    pub identity: String,
}

impl UserConfig {
    pub fn user_id(&self) -> SbxResult<UserId> {
        let id = UserId::new(&self.identity);
        if id.is_empty() {
            return Err(SbxError::Config(
                "user.identity is not set (e.g. identity = \"alice@example.com\")".into(),
            ));
        }
        Ok(id)
    }
}

/// Which OpenDAL service backs the object store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    S3,
    Fs,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// S3 endpoint
    pub endpoint: String,
    /// S3 region (default: us-east-1)
    pub region: String,
    /// Bucket name
    pub bucket: String,
    /// Root directory for the filesystem backend
    pub root: PathBuf,
    /// Enforce HTTPS for S3 connections (warn/error on HTTP endpoints)
    pub enforce_tls: bool,
}

/// Where the local private key lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeystoreBackend {
    File,
    Keychain,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KeystoreConfig {
    pub backend: KeystoreBackend,
    /// Directory for the file keystore
    pub dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Clear the local key after this many idle seconds (0 = never)
    pub idle_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (default: info)
    pub level: String,
    /// Log format: "json" or "text"
    pub format: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::S3,
            endpoint: "http://localhost:9000".into(),
            region: "us-east-1".into(),
            bucket: "strongbox".into(),
            root: PathBuf::from("~/.local/share/strongbox/store"),
            enforce_tls: false,
        }
    }
}

impl Default for KeystoreConfig {
    fn default() -> Self {
        Self {
            backend: KeystoreBackend::File,
            dir: PathBuf::from("~/.config/strongbox/keys"),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: 600,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

impl SbxConfig {
    /// Load configuration from a TOML file, falling back to defaults when the
    /// file does not exist.
    pub fn load(path: &Path) -> SbxResult<Self> {
        if !path.exists() {
            tracing::warn!("config file not found: {}  (using defaults)", path.display());
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| SbxError::Config(format!("parsing {}: {e}", path.display())))?;
        if config.config_file_mode_check {
            warn_if_world_readable(path);
        }
        Ok(config)
    }
}

#[cfg(unix)]
fn warn_if_world_readable(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    if let Ok(meta) = std::fs::metadata(path) {
        if meta.permissions().mode() & 0o004 != 0 {
            tracing::warn!(path = %path.display(), "config file is world-readable");
        }
    }
}

#[cfg(not(unix))]
fn warn_if_world_readable(_path: &Path) {}

/// Expand `~` in path to the user's home directory
pub fn expand_tilde(path: &Path) -> PathBuf {
    let s = path.to_string_lossy();
    if let Some(rest) = s.strip_prefix("~/") {
        let home = std::env::var("HOME").unwrap_or_default();
        PathBuf::from(home).join(rest)
    } else {
        path.to_path_buf()
    }
}
