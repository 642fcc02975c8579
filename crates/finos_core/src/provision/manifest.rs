//! Declarative list of bundled databases to provision at startup.
//!
//! JSON shape:
//! ```json
//! { "databases": [ { "asset": "finos.db", "len": 4096, "blake3": "<hex>" } ] }
//! ```
//! `database` defaults to the last segment of `asset`.

use super::provisioner::{ExpectedContent, ProvisionRequest};
use crate::layout::StorageLayout;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

/// One manifest entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Bundled asset name.
    pub asset: String,
    /// Database file name under `<private>/databases/`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    /// Expected content length in bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub len: Option<u64>,
    /// Expected BLAKE3 digest as 64 hex characters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blake3: Option<String>,
}

impl ManifestEntry {
    pub fn new(asset: impl Into<String>) -> Self {
        Self {
            asset: asset.into(),
            database: None,
            len: None,
            blake3: None,
        }
    }

    /// Database file name this entry provisions.
    pub fn database_name(&self) -> &str {
        match self.database.as_deref() {
            Some(name) => name,
            None => self.asset.rsplit('/').next().unwrap_or(self.asset.as_str()),
        }
    }
}

/// Startup provisioning manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisionManifest {
    pub databases: Vec<ManifestEntry>,
}

#[derive(Debug)]
pub enum ManifestError {
    Read { path: PathBuf, source: std::io::Error },
    Json(serde_json::Error),
    InvalidEntry { index: usize, message: String },
}

impl Display for ManifestError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Read { path, source } => {
                write!(f, "failed to read manifest `{}`: {source}", path.display())
            }
            Self::Json(err) => write!(f, "invalid manifest json: {err}"),
            Self::InvalidEntry { index, message } => {
                write!(f, "invalid manifest entry #{index}: {message}")
            }
        }
    }
}

impl Error for ManifestError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Read { source, .. } => Some(source),
            Self::Json(err) => Some(err),
            Self::InvalidEntry { .. } => None,
        }
    }
}

impl From<serde_json::Error> for ManifestError {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}

impl ProvisionManifest {
    /// Manifest with a single asset provisioned under its own name.
    pub fn single(asset: impl Into<String>) -> Self {
        Self {
            databases: vec![ManifestEntry::new(asset)],
        }
    }

    pub fn from_json_str(raw: &str) -> Result<Self, ManifestError> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ManifestError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ManifestError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    /// Resolves entries into requests against `layout`.
    ///
    /// # Errors
    /// - `InvalidEntry` for an unusable database name or malformed digest.
    pub fn to_requests(&self, layout: &StorageLayout) -> Result<Vec<ProvisionRequest>, ManifestError> {
        self.databases
            .iter()
            .enumerate()
            .map(|(index, entry)| {
                let destination = layout
                    .database_path(entry.database_name())
                    .map_err(|err| ManifestError::InvalidEntry {
                        index,
                        message: err.to_string(),
                    })?;
                let blake3 = entry
                    .blake3
                    .as_deref()
                    .map(|hex| {
                        blake3::Hash::from_hex(hex.trim()).map_err(|err| {
                            ManifestError::InvalidEntry {
                                index,
                                message: format!("bad blake3 digest `{hex}`: {err}"),
                            }
                        })
                    })
                    .transpose()?;
                Ok(ProvisionRequest::new(entry.asset.clone(), destination).with_expected(
                    ExpectedContent {
                        len: entry.len,
                        blake3,
                    },
                ))
            })
            .collect()
    }
}
