//! Import file loading.
//!
//! Import files hold one array of records, as JSON (`.json`) or YAML
//! (`.yaml`/`.yml`). Records are deserialized into the typed import rows of
//! `lasfera_core`; a file that does not match the row schema is rejected as a
//! whole before any row reaches the store.

use serde::de::DeserializeOwned;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordFormat {
    Json,
    Yaml,
}

impl RecordFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        let extension = path.extension()?.to_str()?.to_ascii_lowercase();
        match extension.as_str() {
            "json" => Some(Self::Json),
            "yaml" | "yml" => Some(Self::Yaml),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub enum RecordError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    UnsupportedFormat(PathBuf),
    Json(serde_json::Error),
    Yaml(serde_yaml::Error),
}

impl Display for RecordError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => write!(f, "failed to read `{}`: {source}", path.display()),
            Self::UnsupportedFormat(path) => write!(
                f,
                "unsupported import file `{}`; expected .json, .yaml or .yml",
                path.display()
            ),
            Self::Json(err) => write!(f, "invalid JSON records: {err}"),
            Self::Yaml(err) => write!(f, "invalid YAML records: {err}"),
        }
    }
}

impl Error for RecordError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Json(err) => Some(err),
            Self::Yaml(err) => Some(err),
            Self::UnsupportedFormat(_) => None,
        }
    }
}

pub fn parse_records<T: DeserializeOwned>(
    content: &str,
    format: RecordFormat,
) -> Result<Vec<T>, RecordError> {
    match format {
        RecordFormat::Json => serde_json::from_str(content).map_err(RecordError::Json),
        RecordFormat::Yaml => serde_yaml::from_str(content).map_err(RecordError::Yaml),
    }
}

pub fn load_records<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, RecordError> {
    let format = RecordFormat::from_path(path)
        .ok_or_else(|| RecordError::UnsupportedFormat(path.to_path_buf()))?;
    let content = std::fs::read_to_string(path).map_err(|source| RecordError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_records(&content, format)
}
