//! Private-storage path layout.
//!
//! # Responsibility
//! - Resolve database file paths once from the app-private directory.
//!
//! # Invariants
//! - The private directory is absolute.
//! - Database paths are always `<private>/databases/<name>` with a single-segment name.

use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Component, Path, PathBuf};

const DATABASES_DIR: &str = "databases";

/// Default bundled database name shipped with the app.
pub const DEFAULT_DATABASE_NAME: &str = "finos.db";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayoutError {
    EmptyPrivateDir,
    RelativePrivateDir(PathBuf),
    InvalidDatabaseName(String),
}

impl Display for LayoutError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyPrivateDir => write!(f, "private_dir cannot be empty"),
            Self::RelativePrivateDir(path) => write!(
                f,
                "private_dir must be an absolute path, got `{}`",
                path.display()
            ),
            Self::InvalidDatabaseName(name) => {
                write!(f, "database name must be a single file name, got `{name}`")
            }
        }
    }
}

impl Error for LayoutError {}

/// App-private storage root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageLayout {
    private_dir: PathBuf,
}

impl StorageLayout {
    pub fn new(private_dir: impl AsRef<Path>) -> Result<Self, LayoutError> {
        let private_dir = private_dir.as_ref();
        if private_dir.as_os_str().is_empty() {
            return Err(LayoutError::EmptyPrivateDir);
        }
        if !private_dir.is_absolute() {
            return Err(LayoutError::RelativePrivateDir(private_dir.to_path_buf()));
        }
        Ok(Self {
            private_dir: private_dir.to_path_buf(),
        })
    }

    /// Parses a host-supplied string, trimming surrounding whitespace.
    pub fn from_str_path(private_dir: &str) -> Result<Self, LayoutError> {
        Self::new(Path::new(private_dir.trim()))
    }

    pub fn private_dir(&self) -> &Path {
        &self.private_dir
    }

    pub fn databases_dir(&self) -> PathBuf {
        self.private_dir.join(DATABASES_DIR)
    }

    /// Path of database `name` in private storage.
    pub fn database_path(&self, name: &str) -> Result<PathBuf, LayoutError> {
        let mut components = Path::new(name).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) => Ok(self.databases_dir().join(name)),
            _ => Err(LayoutError::InvalidDatabaseName(name.to_string())),
        }
    }
}
