//! Read-only asset bundles.
//!
//! # Responsibility
//! - Abstract the host's bundled-resource reader behind [`AssetSource`].
//! - Provide a directory-backed bundle and an in-memory bundle.
//!
//! # Invariants
//! - Asset names are relative, `/`-separated, and never escape the bundle root.
//! - Characters other than `\` and NUL are accepted in asset names.
//! - A missing asset is reported as `AssetNotFound`, never as a generic I/O error.

use super::{ProvisionError, ProvisionResult};
use once_cell::sync::Lazy;
use regex::Regex;
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, Cursor, Read};
use std::path::{Path, PathBuf};

// Why: bundle names may carry spaces, `+`, `@` or non-ASCII letters; only
// separators and NUL that could change path resolution are refused.
static FORBIDDEN_ASSET_CHARS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\\\x00]").expect("valid forbidden asset char regex"));

/// Capability to open bundled assets for sequential reading.
pub trait AssetSource {
    /// Opens the asset named `name`.
    ///
    /// # Errors
    /// - `InvalidAssetName` when `name` fails [`validate_asset_name`].
    /// - `AssetNotFound` when the bundle has no such asset.
    /// - `Io` when the asset exists but cannot be opened.
    fn open(&self, name: &str) -> ProvisionResult<Box<dyn Read + '_>>;
}

impl<T: AssetSource + ?Sized> AssetSource for &T {
    fn open(&self, name: &str) -> ProvisionResult<Box<dyn Read + '_>> {
        (**self).open(name)
    }
}

impl<T: AssetSource + ?Sized> AssetSource for Box<T> {
    fn open(&self, name: &str) -> ProvisionResult<Box<dyn Read + '_>> {
        (**self).open(name)
    }
}

/// Checks that `name` is a relative bundle path that stays inside the bundle.
///
/// Rejects empty names, `\` and NUL characters, and empty, `.` or `..`
/// segments. Any other character is allowed.
pub fn validate_asset_name(name: &str) -> ProvisionResult<()> {
    let invalid = || ProvisionError::InvalidAssetName {
        name: name.to_string(),
    };

    if name.is_empty() || FORBIDDEN_ASSET_CHARS_RE.is_match(name) {
        return Err(invalid());
    }
    // A leading `/` yields an empty first segment, so absolute names land here too.
    if name
        .split('/')
        .any(|segment| segment.is_empty() || segment == "." || segment == "..")
    {
        return Err(invalid());
    }
    Ok(())
}

/// Asset bundle backed by a directory tree on disk.
#[derive(Debug, Clone)]
pub struct DirAssetSource {
    root: PathBuf,
}

impl DirAssetSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, name: &str) -> PathBuf {
        name.split('/')
            .fold(self.root.clone(), |path, segment| path.join(segment))
    }
}

impl AssetSource for DirAssetSource {
    fn open(&self, name: &str) -> ProvisionResult<Box<dyn Read + '_>> {
        validate_asset_name(name)?;
        let path = self.resolve(name);

        match std::fs::metadata(&path) {
            Ok(meta) if meta.is_file() => {}
            Ok(_) => {
                return Err(ProvisionError::AssetNotFound {
                    name: name.to_string(),
                })
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(ProvisionError::AssetNotFound {
                    name: name.to_string(),
                })
            }
            Err(source) => return Err(ProvisionError::Io { path, source }),
        }

        let file = File::open(&path).map_err(|source| match source.kind() {
            io::ErrorKind::NotFound => ProvisionError::AssetNotFound {
                name: name.to_string(),
            },
            _ => ProvisionError::Io {
                path: path.clone(),
                source,
            },
        })?;
        Ok(Box::new(file))
    }
}

/// Asset bundle held in memory, e.g. assets compiled in with `include_bytes!`.
#[derive(Debug, Clone, Default)]
pub struct EmbeddedAssetSource {
    assets: BTreeMap<String, Cow<'static, [u8]>>,
}

impl EmbeddedAssetSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an asset and returns the bundle, for builder-style setup.
    pub fn with_asset(mut self, name: impl Into<String>, bytes: impl Into<Cow<'static, [u8]>>) -> Self {
        self.insert(name, bytes);
        self
    }

    /// Adds or replaces an asset.
    pub fn insert(&mut self, name: impl Into<String>, bytes: impl Into<Cow<'static, [u8]>>) {
        self.assets.insert(name.into(), bytes.into());
    }

    pub fn contains(&self, name: &str) -> bool {
        self.assets.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }
}

impl AssetSource for EmbeddedAssetSource {
    fn open(&self, name: &str) -> ProvisionResult<Box<dyn Read + '_>> {
        validate_asset_name(name)?;
        let bytes = self
            .assets
            .get(name)
            .ok_or_else(|| ProvisionError::AssetNotFound {
                name: name.to_string(),
            })?;
        Ok(Box::new(Cursor::new(bytes.as_ref())))
    }
}
