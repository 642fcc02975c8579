//! First-run provisioning of bundled database assets.
//!
//! # Responsibility
//! - Copy a read-only bundled asset into private writable storage once.
//! - Report typed failures instead of swallowing them.
//!
//! # Invariants
//! - An existing destination is never overwritten or re-copied.
//! - A destination is either absent or a complete copy, never partial.
//! - Asset and destination handles are released on every exit path.

use std::error::Error;
use std::fmt::{Display, Formatter};
use std::io;
use std::path::PathBuf;

pub mod asset;
mod copy;
pub mod manifest;
mod provisioner;

pub use asset::{validate_asset_name, AssetSource, DirAssetSource, EmbeddedAssetSource};
pub use manifest::{ManifestEntry, ManifestError, ProvisionManifest};
pub use provisioner::{
    ensure_provisioned, fingerprint_file, provision, AssetDatabaseProvisioner,
    ContentFingerprint, ExpectedContent, ProvisionOutcome, ProvisionRequest, ProvisionedFile,
};

pub type ProvisionResult<T> = Result<T, ProvisionError>;

/// Failure raised while provisioning one asset.
#[derive(Debug)]
pub enum ProvisionError {
    /// The named asset does not exist in the bundle.
    AssetNotFound { name: String },
    /// The asset name is empty, absolute, or escapes the bundle root.
    InvalidAssetName { name: String },
    /// Ancestor directories of the destination could not be created.
    DirectoryCreation { path: PathBuf, source: io::Error },
    /// The destination (or its staging file) could not be opened for writing.
    DestinationOpen { path: PathBuf, source: io::Error },
    /// Reading, writing, syncing or placing bytes failed.
    Io { path: PathBuf, source: io::Error },
    /// Provisioned or existing content does not match the expected fingerprint.
    ContentMismatch {
        path: PathBuf,
        expected: ExpectedContent,
        actual: ContentFingerprint,
    },
    /// Something other than a regular file occupies the destination path.
    DestinationNotAFile { path: PathBuf },
}

impl ProvisionError {
    /// Stable machine-readable code used in log lines and FFI envelopes.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::AssetNotFound { .. } => "asset_not_found",
            Self::InvalidAssetName { .. } => "invalid_asset_name",
            Self::DirectoryCreation { .. } => "directory_creation_failed",
            Self::DestinationOpen { .. } => "destination_open_failed",
            Self::Io { .. } => "io_failed",
            Self::ContentMismatch { .. } => "content_mismatch",
            Self::DestinationNotAFile { .. } => "destination_not_a_file",
        }
    }
}

impl Display for ProvisionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AssetNotFound { name } => write!(f, "bundled asset not found: `{name}`"),
            Self::InvalidAssetName { name } => write!(f, "invalid asset name: `{name}`"),
            Self::DirectoryCreation { path, source } => write!(
                f,
                "failed to create directory `{}`: {source}",
                path.display()
            ),
            Self::DestinationOpen { path, source } => write!(
                f,
                "failed to open destination `{}` for writing: {source}",
                path.display()
            ),
            Self::Io { path, source } => {
                write!(f, "i/o failure while provisioning `{}`: {source}", path.display())
            }
            Self::ContentMismatch {
                path,
                expected,
                actual,
            } => write!(
                f,
                "content of `{}` does not match: expected {expected}, got {actual}",
                path.display()
            ),
            Self::DestinationNotAFile { path } => {
                write!(f, "destination `{}` exists but is not a file", path.display())
            }
        }
    }
}

impl Error for ProvisionError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::DirectoryCreation { source, .. }
            | Self::DestinationOpen { source, .. }
            | Self::Io { source, .. } => Some(source),
            Self::AssetNotFound { .. }
            | Self::InvalidAssetName { .. }
            | Self::ContentMismatch { .. }
            | Self::DestinationNotAFile { .. } => None,
        }
    }
}
