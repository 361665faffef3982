//! Policy configuration for maintenance passes.
//!
//! # Responsibility
//! - Hold the tunable policy constants of range resolution and reconciliation.
//! - Load them from an optional TOML file over stock defaults.
//!
//! # Invariants
//! - Every field has a default; a missing file or an empty file yields the
//!   stock policy.
//! - Unknown keys are rejected so typos do not silently fall back.
//!
//! ```toml
//! [reconcile]
//! max_tiebreak_distance = 50   # accept a closest match only below this many chars
//! context_chars = 40           # context shown around matches with --show-text
//!
//! [ranges]
//! boundary = "half_open"       # or "closed"
//! ```

use crate::model::line_code::BoundaryPolicy;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

/// Default proximity threshold for disambiguating repeated selections.
pub const DEFAULT_MAX_TIEBREAK_DISTANCE: u32 = 50;

/// Default context window (in characters) around a reported match.
pub const DEFAULT_CONTEXT_CHARS: usize = 40;

#[derive(Debug)]
pub enum ConfigError {
    Io { path: PathBuf, source: std::io::Error },
    Toml(toml::de::Error),
    Invalid(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "failed to read config `{}`: {source}", path.display())
            }
            Self::Toml(err) => write!(f, "invalid config: {err}"),
            Self::Invalid(message) => write!(f, "invalid config: {message}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Toml(err) => Some(err),
            Self::Invalid(_) => None,
        }
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(value: toml::de::Error) -> Self {
        Self::Toml(value)
    }
}

/// Root policy document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PolicyConfig {
    pub reconcile: ReconcileConfig,
    pub ranges: RangeConfig,
}

/// Annotation reconciliation policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReconcileConfig {
    /// A closest candidate is accepted only when strictly closer than this.
    pub max_tiebreak_distance: u32,
    /// Characters of context printed on each side of a match.
    pub context_chars: usize,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            max_tiebreak_distance: DEFAULT_MAX_TIEBREAK_DISTANCE,
            context_chars: DEFAULT_CONTEXT_CHARS,
        }
    }
}

/// Folio range policy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RangeConfig {
    pub boundary: BoundaryPolicy,
}

impl PolicyConfig {
    /// Rejects values that would disable a policy silently.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.reconcile.max_tiebreak_distance == 0 {
            return Err(ConfigError::Invalid(
                "reconcile.max_tiebreak_distance must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Parses and validates a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: PolicyConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }
}

/// Loads the policy from `path`, or the stock policy when `path` is `None`.
pub fn load_config(path: Option<&Path>) -> Result<PolicyConfig, ConfigError> {
    let Some(path) = path else {
        return Ok(PolicyConfig::default());
    };
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    PolicyConfig::from_toml_str(&content)
}

/// Stock policy rendered as TOML, for `lasfera gen-config`.
pub fn stock_config_toml() -> Result<String, toml::ser::Error> {
    toml::to_string_pretty(&PolicyConfig::default())
}

#[cfg(test)]
mod tests {
    use super::{load_config, stock_config_toml, ConfigError, PolicyConfig};
    use crate::model::line_code::BoundaryPolicy;
    use std::io::Write;

    #[test]
    fn empty_document_yields_defaults() {
        let config = PolicyConfig::from_toml_str("").unwrap();
        assert_eq!(config, PolicyConfig::default());
        assert_eq!(config.reconcile.max_tiebreak_distance, 50);
        assert_eq!(config.reconcile.context_chars, 40);
        assert_eq!(config.ranges.boundary, BoundaryPolicy::HalfOpen);
    }

    #[test]
    fn partial_override_keeps_other_defaults() {
        let config = PolicyConfig::from_toml_str(
            r#"
            [ranges]
            boundary = "closed"
            "#,
        )
        .unwrap();
        assert_eq!(config.ranges.boundary, BoundaryPolicy::Closed);
        assert_eq!(config.reconcile.max_tiebreak_distance, 50);
    }

    #[test]
    fn unknown_keys_and_zero_threshold_are_rejected() {
        let err = PolicyConfig::from_toml_str("[reconcile]\nthreshold = 10\n").unwrap_err();
        assert!(matches!(err, ConfigError::Toml(_)));

        let err =
            PolicyConfig::from_toml_str("[reconcile]\nmax_tiebreak_distance = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn stock_toml_parses_back_to_defaults() {
        let stock = stock_config_toml().unwrap();
        assert!(stock.contains("max_tiebreak_distance"));
        assert_eq!(
            PolicyConfig::from_toml_str(&stock).unwrap(),
            PolicyConfig::default()
        );
    }

    #[test]
    fn load_config_reads_file_and_handles_absence() {
        assert_eq!(load_config(None).unwrap(), PolicyConfig::default());

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[reconcile]\nmax_tiebreak_distance = 80").unwrap();
        let config = load_config(Some(file.path())).unwrap();
        assert_eq!(config.reconcile.max_tiebreak_distance, 80);

        let missing = file.path().with_extension("missing");
        assert!(matches!(
            load_config(Some(&missing)).unwrap_err(),
            ConfigError::Io { .. }
        ));
    }
}
