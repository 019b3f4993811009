//! Correlator configuration
//!
//! Loaded from a TOML file; every key is optional.
//!
//! ```toml
//! request-timeout-ms = 30000
//! max-pending = 1024
//! id-scheme = "uuid"
//! framing = "lines"
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use wire::Framing;

use crate::ids::{IdGenerator, RandomIds, SequentialIds};

pub const DEFAULT_MAX_PENDING: usize = 8192;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parsing configuration: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Which [`IdGenerator`] a correlator uses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IdScheme {
    #[default]
    Sequential,
    Uuid,
}

impl IdScheme {
    pub(crate) fn generator(self) -> Arc<dyn IdGenerator> {
        match self {
            IdScheme::Sequential => Arc::new(SequentialIds::new()),
            IdScheme::Uuid => Arc::new(RandomIds),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct CorrelatorConfig {
    /// Unset means calls wait for their response forever.
    pub request_timeout_ms: Option<u64>,
    pub max_pending: usize,
    pub id_scheme: IdScheme,
    pub framing: Framing,
}

impl Default for CorrelatorConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: None,
            max_pending: DEFAULT_MAX_PENDING,
            id_scheme: IdScheme::default(),
            framing: Framing::default(),
        }
    }
}

impl CorrelatorConfig {
    /// Per-call timeout, if one is configured.
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms.map(Duration::from_millis)
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_ms = Some(timeout.as_millis().try_into().unwrap_or(u64::MAX));
        self
    }

    /// Parse TOML; missing keys take their defaults.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    /// Read and parse the file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    /// `<config dir>/streamrpc/config.toml`, if the platform has a config dir.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("streamrpc").join("config.toml"))
    }

    /// Load from [`default_path`](Self::default_path), falling back to the
    /// defaults when the file does not exist.
    pub fn load_or_default() -> Result<Self, ConfigError> {
        match Self::default_path() {
            Some(path) if path.is_file() => {
                tracing::debug!(path = %path.display(), "loading configuration");
                Self::load(path)
            }
            _ => Ok(Self::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_file_gives_defaults() {
        let config = CorrelatorConfig::from_toml_str("").unwrap();
        assert_eq!(config, CorrelatorConfig::default());
        assert_eq!(config.request_timeout(), None);
        assert_eq!(config.max_pending, DEFAULT_MAX_PENDING);
    }

    #[test]
    fn parses_all_keys() {
        let config = CorrelatorConfig::from_toml_str(
            r#"
            request-timeout-ms = 1500
            max-pending = 16
            id-scheme = "uuid"
            framing = "lines"
            "#,
        )
        .unwrap();

        assert_eq!(config.request_timeout(), Some(Duration::from_millis(1500)));
        assert_eq!(config.max_pending, 16);
        assert_eq!(config.id_scheme, IdScheme::Uuid);
        assert_eq!(config.framing, Framing::Lines);
    }

    #[test]
    fn rejects_unknown_keys() {
        let err = CorrelatorConfig::from_toml_str("max-pendin = 3").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "request-timeout-ms = 250").unwrap();

        let config = CorrelatorConfig::load(file.path()).unwrap();
        assert_eq!(config.request_timeout(), Some(Duration::from_millis(250)));
    }

    #[test]
    fn missing_file_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope.toml");

        let err = CorrelatorConfig::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Io { path: p, .. } if p == path));
    }
}
