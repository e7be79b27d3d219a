use affect_core::analytics::{DEFAULT_KEY_MOMENT_THRESHOLD, DEFAULT_TREND_INTERVAL_SECS};
use affect_core::types::{DEFAULT_DESCRIPTOR_DIM, DEFAULT_MATCH_THRESHOLD};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("bad config file {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Daemon configuration.
///
/// An optional TOML file (path in `AFFECT_CONFIG`) is the base layer;
/// `AFFECT_*` environment variables override it.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Listen address (default: 0.0.0.0:3001).
    pub bind_addr: SocketAddr,
    /// Euclidean distance under which a probe matches an identity.
    pub match_threshold: f64,
    /// Length every descriptor must have.
    pub descriptor_dim: usize,
    /// Minimum strongest-expression value for a key moment.
    pub key_moment_threshold: f64,
    /// Width of a trend bucket in seconds.
    pub trend_interval_secs: f64,
    /// Maximum accepted request body.
    pub body_limit_bytes: usize,
    /// Sigmoid-sharpen incoming expression vectors before storing them.
    pub sharpen_expressions: bool,
    /// Allowed CORS origins. Empty allows any origin.
    pub cors_origins: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 3001)),
            match_threshold: DEFAULT_MATCH_THRESHOLD,
            descriptor_dim: DEFAULT_DESCRIPTOR_DIM,
            key_moment_threshold: DEFAULT_KEY_MOMENT_THRESHOLD,
            trend_interval_secs: DEFAULT_TREND_INTERVAL_SECS,
            body_limit_bytes: 10 * 1024 * 1024,
            sharpen_expressions: false,
            cors_origins: Vec::new(),
        }
    }
}

impl Config {
    /// Load the file layer (if any), apply environment overrides and validate.
    pub fn load() -> Result<Self, ConfigError> {
        let base = match std::env::var("AFFECT_CONFIG") {
            Ok(path) => Self::from_file(Path::new(&path))?,
            Err(_) => Self::default(),
        };
        let config = base.with_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let display = path.display().to_string();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: display.clone(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: display,
            source,
        })
    }

    /// Apply `AFFECT_*` overrides from `lookup`. Unparseable values keep the current setting.
    pub fn with_overrides(self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let cors_origins = match lookup("AFFECT_CORS_ORIGINS") {
            Some(v) => v
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect(),
            None => self.cors_origins,
        };

        Self {
            bind_addr: parsed(&lookup, "AFFECT_BIND_ADDR", self.bind_addr),
            match_threshold: parsed(&lookup, "AFFECT_MATCH_THRESHOLD", self.match_threshold),
            descriptor_dim: parsed(&lookup, "AFFECT_DESCRIPTOR_DIM", self.descriptor_dim),
            key_moment_threshold: parsed(
                &lookup,
                "AFFECT_KEY_MOMENT_THRESHOLD",
                self.key_moment_threshold,
            ),
            trend_interval_secs: parsed(
                &lookup,
                "AFFECT_TREND_INTERVAL_SECS",
                self.trend_interval_secs,
            ),
            body_limit_bytes: parsed(&lookup, "AFFECT_BODY_LIMIT_BYTES", self.body_limit_bytes),
            sharpen_expressions: lookup("AFFECT_SHARPEN_EXPRESSIONS")
                .map(|v| v != "0" && !v.eq_ignore_ascii_case("false"))
                .unwrap_or(self.sharpen_expressions),
            cors_origins,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.match_threshold.is_finite() || self.match_threshold <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "match_threshold must be positive, got {}",
                self.match_threshold
            )));
        }
        if self.descriptor_dim == 0 {
            return Err(ConfigError::Invalid("descriptor_dim must be at least 1".into()));
        }
        if !self.trend_interval_secs.is_finite() || self.trend_interval_secs <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "trend_interval_secs must be positive, got {}",
                self.trend_interval_secs
            )));
        }
        if !self.key_moment_threshold.is_finite() {
            return Err(ConfigError::Invalid("key_moment_threshold must be a number".into()));
        }
        if self.body_limit_bytes == 0 {
            return Err(ConfigError::Invalid("body_limit_bytes must be at least 1".into()));
        }
        Ok(())
    }
}

fn parsed<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    current: T,
) -> T {
    match lookup(key) {
        Some(raw) => match raw.trim().parse() {
            Ok(v) => v,
            Err(_) => {
                tracing::warn!(key, value = %raw, "ignoring unparseable config override");
                current
            }
        },
        None => current,
    }
}
