use std::io::ErrorKind;
use std::num::{NonZeroU32, NonZeroUsize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Mirror settings, read from TOML. Every field has a default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MirrorConfig {
    /// Base URL of the repository being mirrored.
    pub upstream_url:         String,
    pub cache_dir:            PathBuf,
    /// Location of the expiry ledger database. Keep it outside `cache_dir`.
    pub expired_db:           PathBuf,
    /// Grace period before a superseded file may be deleted.
    pub expire_minutes:       u32,
    pub max_connections:      usize,
    pub generate_gz:          bool,
    pub user_agent:           String,
    pub request_timeout_secs: u64,
    pub proxy:                Option<String>,
    pub max_passes:           u32,
    pub lockfile:             PathBuf,
    /// Public URL of the mirror, shown in the generated report.
    pub display_url:          Option<String>,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            upstream_url:         "https://packagist.org".into(),
            cache_dir:            PathBuf::from("cache"),
            expired_db:           PathBuf::from("expired.db"),
            expire_minutes:       24 * 60,
            max_connections:      4,
            generate_gz:          true,
            user_agent:           concat!("pkgmirror/", env!("CARGO_PKG_VERSION")).into(),
            request_timeout_secs: 60,
            proxy:                None,
            max_passes:           10,
            lockfile:             PathBuf::from("pkgmirror.lock"),
            display_url:          None,
        }
    }
}

impl MirrorConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Read `path`; a file that does not exist yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(s) => Self::from_toml_str(&s),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "config file not found, using defaults");
                Ok(Self::default())
            }
            Err(source) => Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_connections == 0 {
            return Err(ConfigError::Invalid("max_connections must be at least 1".into()));
        }
        if self.max_passes == 0 {
            return Err(ConfigError::Invalid("max_passes must be at least 1".into()));
        }
        let scheme_ok = ["http://", "https://"]
            .iter()
            .any(|scheme| self.upstream_url.len() > scheme.len() && self.upstream_url.starts_with(scheme));
        if !scheme_ok {
            return Err(ConfigError::Invalid(format!(
                "upstream_url '{}' must be an http(s) URL",
                self.upstream_url
            )));
        }
        Ok(())
    }

    pub fn grace(&self) -> TimeDelta { TimeDelta::minutes(i64::from(self.expire_minutes)) }

    pub fn request_timeout(&self) -> Duration { Duration::from_secs(self.request_timeout_secs) }

    /// The URL shown to mirror users, falling back to the upstream.
    pub fn display_url(&self) -> &str { self.display_url.as_deref().unwrap_or(&self.upstream_url) }

    pub fn mirror_options(&self) -> Result<MirrorOptions, ConfigError> {
        self.validate()?;
        let invalid = |field: &str| ConfigError::Invalid(format!("{field} must be at least 1"));
        Ok(MirrorOptions {
            max_connections: NonZeroUsize::new(self.max_connections).ok_or_else(|| invalid("max_connections"))?,
            max_passes:      NonZeroU32::new(self.max_passes).ok_or_else(|| invalid("max_passes"))?,
            grace:           self.grace(),
            generate_gz:     self.generate_gz,
        })
    }
}

/// The validated subset of [`MirrorConfig`] the crawler runs with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MirrorOptions {
    pub max_connections: NonZeroUsize,
    pub max_passes:      NonZeroU32,
    pub grace:           TimeDelta,
    pub generate_gz:     bool,
}

impl Default for MirrorOptions {
    fn default() -> Self {
        Self {
            max_connections: NonZeroUsize::new(4).unwrap_or(NonZeroUsize::MIN),
            max_passes:      NonZeroU32::new(10).unwrap_or(NonZeroU32::MIN),
            grace:           TimeDelta::minutes(24 * 60),
            generate_gz:     true,
        }
    }
}
