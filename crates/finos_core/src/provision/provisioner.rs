//! Asset-to-storage provisioning service.
//!
//! # Responsibility
//! - Decide whether a destination needs provisioning.
//! - Stage a full copy beside the destination and move it into place atomically.
//!
//! # Invariants
//! - Existing destinations are inspected, never written.
//! - Staged copies are removed on every failure path.
//! - `persist_noclobber` guarantees at most one concurrent caller places the file.

use super::copy::{copy_bounded, HashingWriter};
use super::{validate_asset_name, AssetSource, ProvisionError, ProvisionResult};
use log::{error, info, warn};
use std::fmt::{Display, Formatter};
use std::fs::{self, File};
use std::io::{self, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tempfile::NamedTempFile;

// Why: dot-prefixed staging names stay hidden from engines that scan the
// databases directory and never collide with a real database name.
const STAGING_PREFIX: &str = ".finos-provision-";
const STAGING_SUFFIX: &str = ".tmp";

/// Length and BLAKE3 digest of a file's content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentFingerprint {
    pub len: u64,
    pub blake3: blake3::Hash,
}

impl Display for ContentFingerprint {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "len={} blake3={}", self.len, self.blake3.to_hex())
    }
}

/// Optional expectations a provisioned file must satisfy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExpectedContent {
    pub len: Option<u64>,
    pub blake3: Option<blake3::Hash>,
}

impl ExpectedContent {
    pub fn is_empty(&self) -> bool {
        self.len.is_none() && self.blake3.is_none()
    }

    pub fn matches(&self, actual: &ContentFingerprint) -> bool {
        self.len.map_or(true, |len| len == actual.len)
            && self.blake3.map_or(true, |hash| hash == actual.blake3)
    }
}

impl Display for ExpectedContent {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match (self.len, self.blake3) {
            (Some(len), Some(hash)) => write!(f, "len={len} blake3={}", hash.to_hex()),
            (Some(len), None) => write!(f, "len={len}"),
            (None, Some(hash)) => write!(f, "blake3={}", hash.to_hex()),
            (None, None) => write!(f, "any content"),
        }
    }
}

/// One asset to place at one destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionRequest {
    /// Logical name of the bundled asset.
    pub asset_name: String,
    /// Absolute path of the writable copy.
    pub destination: PathBuf,
    /// Fingerprint checked before placement and against an existing file.
    pub expected: ExpectedContent,
}

impl ProvisionRequest {
    pub fn new(asset_name: impl Into<String>, destination: impl Into<PathBuf>) -> Self {
        Self {
            asset_name: asset_name.into(),
            destination: destination.into(),
            expected: ExpectedContent::default(),
        }
    }

    pub fn with_expected(mut self, expected: ExpectedContent) -> Self {
        self.expected = expected;
        self
    }
}

/// Successful provisioning result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionOutcome {
    /// The destination already existed; nothing was written.
    AlreadyPresent { len: u64 },
    /// The asset was copied into place.
    Copied { bytes: u64, digest: blake3::Hash },
}

impl ProvisionOutcome {
    pub fn was_copied(&self) -> bool {
        matches!(self, Self::Copied { .. })
    }
}

/// Filesystem view of a provisioned database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionedFile {
    pub destination_path: PathBuf,
    pub source_asset_name: String,
    pub exists: bool,
}

impl ProvisionedFile {
    /// Derives the entity from current filesystem state.
    ///
    /// `exists` is true only for a regular file (following symlinks), matching
    /// what [`provision`] accepts as already provisioned.
    pub fn inspect(source_asset_name: impl Into<String>, destination: impl Into<PathBuf>) -> Self {
        let destination_path = destination.into();
        let exists = destination_path.is_file();
        Self {
            destination_path,
            source_asset_name: source_asset_name.into(),
            exists,
        }
    }
}

/// Service form of [`provision`] owning its asset bundle.
#[derive(Debug, Clone)]
pub struct AssetDatabaseProvisioner<A: AssetSource> {
    assets: A,
}

impl<A: AssetSource> AssetDatabaseProvisioner<A> {
    pub fn new(assets: A) -> Self {
        Self { assets }
    }

    pub fn assets(&self) -> &A {
        &self.assets
    }

    /// Provisions one request. See [`provision`].
    pub fn ensure(&self, request: &ProvisionRequest) -> ProvisionResult<ProvisionOutcome> {
        provision(&self.assets, request)
    }

    /// Provisions every request in order, stopping at the first failure.
    ///
    /// Manifests feed in through [`ProvisionManifest::to_requests`](super::ProvisionManifest::to_requests).
    pub fn ensure_all(&self, requests: &[ProvisionRequest]) -> ProvisionResult<Vec<ProvisionOutcome>> {
        requests.iter().map(|request| self.ensure(request)).collect()
    }
}

/// Ensures `destination` holds a copy of the bundled asset `asset_name`.
///
/// Shorthand for [`provision`] without a content fingerprint.
pub fn ensure_provisioned<A: AssetSource + ?Sized>(
    assets: &A,
    asset_name: &str,
    destination: impl AsRef<Path>,
) -> ProvisionResult<ProvisionOutcome> {
    provision(
        assets,
        &ProvisionRequest::new(asset_name, destination.as_ref()),
    )
}

/// Provisions one asset into private storage.
///
/// # Contract
/// - Existing destination: returns `AlreadyPresent` without writing. With an
///   expected fingerprint, a mismatching file is reported as `ContentMismatch`.
/// - Missing destination: creates ancestors, streams the asset into a staging
///   file in the destination directory, syncs it, then renames it into place
///   without clobbering.
/// - Any failure leaves the destination absent and removes the staging file.
///
/// # Side effects
/// - Emits `asset_provision` logging events with duration and status.
pub fn provision<A: AssetSource + ?Sized>(
    assets: &A,
    request: &ProvisionRequest,
) -> ProvisionResult<ProvisionOutcome> {
    let started_at = Instant::now();
    info!(
        "event=asset_provision module=provision status=start asset={} destination={}",
        request.asset_name,
        request.destination.display()
    );

    let result = provision_inner(assets, request);
    let duration_ms = started_at.elapsed().as_millis();
    match &result {
        Ok(ProvisionOutcome::AlreadyPresent { len }) => info!(
            "event=asset_provision module=provision status=skip asset={} duration_ms={} len={}",
            request.asset_name, duration_ms, len
        ),
        Ok(ProvisionOutcome::Copied { bytes, digest }) => info!(
            "event=asset_provision module=provision status=ok asset={} duration_ms={} bytes={} blake3={}",
            request.asset_name,
            duration_ms,
            bytes,
            digest.to_hex()
        ),
        Err(err) => error!(
            "event=asset_provision module=provision status=error asset={} duration_ms={} error_code={} error={}",
            request.asset_name,
            duration_ms,
            err.error_code(),
            err
        ),
    }
    result
}

fn provision_inner<A: AssetSource + ?Sized>(
    assets: &A,
    request: &ProvisionRequest,
) -> ProvisionResult<ProvisionOutcome> {
    let destination = request.destination.as_path();

    if let Some(len) = existing_file_len(destination)? {
        if !request.expected.is_empty() {
            verify_existing(destination, &request.expected)?;
        }
        return Ok(ProvisionOutcome::AlreadyPresent { len });
    }

    // Why: the asset name only matters once a copy is needed, and it must be
    // rejected before any directory is created for it.
    validate_asset_name(&request.asset_name)?;

    // Why: mkdir runs before the asset is opened to keep the first-run order
    // of the bootstrap; a missing asset may leave an empty directory, never a file.
    let parent = destination_parent(destination)?;
    fs::create_dir_all(&parent).map_err(|source| ProvisionError::DirectoryCreation {
        path: parent.clone(),
        source,
    })?;

    let mut reader = assets.open(&request.asset_name)?;

    let mut staged = tempfile::Builder::new()
        .prefix(STAGING_PREFIX)
        .suffix(STAGING_SUFFIX)
        .tempfile_in(&parent)
        .map_err(|source| ProvisionError::DestinationOpen {
            path: destination.to_path_buf(),
            source,
        })?;

    let fingerprint = stage_copy(&mut reader, staged.as_file_mut())
        .and_then(|fingerprint| staged.as_file().sync_all().map(|()| fingerprint))
        .map_err(|source| ProvisionError::Io {
            path: destination.to_path_buf(),
            source,
        })?;
    drop(reader);

    if !request.expected.matches(&fingerprint) {
        return Err(ProvisionError::ContentMismatch {
            path: destination.to_path_buf(),
            expected: request.expected,
            actual: fingerprint,
        });
    }

    place(staged, destination, fingerprint)
}

fn stage_copy<W: Write>(reader: &mut dyn Read, staging: W) -> io::Result<ContentFingerprint> {
    let mut hasher = blake3::Hasher::new();
    let len = {
        let mut writer = HashingWriter::new(staging, &mut hasher);
        copy_bounded(reader, &mut writer)?;
        writer.written()
    };
    Ok(ContentFingerprint {
        len,
        blake3: hasher.finalize(),
    })
}

fn place(
    staged: NamedTempFile,
    destination: &Path,
    fingerprint: ContentFingerprint,
) -> ProvisionResult<ProvisionOutcome> {
    match staged.persist_noclobber(destination) {
        Ok(_file) => Ok(ProvisionOutcome::Copied {
            bytes: fingerprint.len,
            digest: fingerprint.blake3,
        }),
        Err(err) if err.error.kind() == ErrorKind::AlreadyExists => {
            // Why: a concurrent startup placed its copy first; that copy stands,
            // but only a readable regular file counts as provisioned.
            warn!(
                "event=asset_provision module=provision status=race destination={}",
                destination.display()
            );
            drop(err.file);
            match existing_file_len(destination)? {
                Some(len) => Ok(ProvisionOutcome::AlreadyPresent { len }),
                None => Err(ProvisionError::Io {
                    path: destination.to_path_buf(),
                    source: err.error,
                }),
            }
        }
        Err(err) => Err(ProvisionError::Io {
            path: destination.to_path_buf(),
            source: err.error,
        }),
    }
}

/// Length of the regular file at `destination`, or `None` when nothing is there.
///
/// Symlinks to regular files count as present. A dangling symlink or any other
/// non-file entry occupies the path and is reported as `DestinationNotAFile`.
fn existing_file_len(destination: &Path) -> ProvisionResult<Option<u64>> {
    let io_err = |source| ProvisionError::Io {
        path: destination.to_path_buf(),
        source,
    };
    let not_a_file = || ProvisionError::DestinationNotAFile {
        path: destination.to_path_buf(),
    };

    let entry = match fs::symlink_metadata(destination) {
        Ok(meta) => meta,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
        Err(source) => return Err(io_err(source)),
    };
    if !entry.file_type().is_symlink() {
        return if entry.is_file() {
            Ok(Some(entry.len()))
        } else {
            Err(not_a_file())
        };
    }

    match fs::metadata(destination) {
        Ok(target) if target.is_file() => Ok(Some(target.len())),
        Ok(_) => Err(not_a_file()),
        Err(err) if err.kind() == ErrorKind::NotFound => Err(not_a_file()),
        Err(source) => Err(io_err(source)),
    }
}

fn verify_existing(destination: &Path, expected: &ExpectedContent) -> ProvisionResult<()> {
    let actual = fingerprint_file(destination)?;
    if expected.matches(&actual) {
        return Ok(());
    }
    Err(ProvisionError::ContentMismatch {
        path: destination.to_path_buf(),
        expected: *expected,
        actual,
    })
}

/// Streams a file through BLAKE3 and returns its fingerprint.
pub fn fingerprint_file(path: &Path) -> ProvisionResult<ContentFingerprint> {
    let io_err = |source| ProvisionError::Io {
        path: path.to_path_buf(),
        source,
    };
    let mut file = File::open(path).map_err(io_err)?;
    let mut hasher = blake3::Hasher::new();
    let len = {
        let mut writer = HashingWriter::new(io::sink(), &mut hasher);
        copy_bounded(&mut file, &mut writer).map_err(io_err)?
    };
    Ok(ContentFingerprint {
        len,
        blake3: hasher.finalize(),
    })
}

fn destination_parent(destination: &Path) -> ProvisionResult<PathBuf> {
    if destination.file_name().is_none() {
        return Err(ProvisionError::DestinationOpen {
            path: destination.to_path_buf(),
            source: io::Error::new(
                ErrorKind::InvalidInput,
                "destination has no file name component",
            ),
        });
    }
    match destination.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => Ok(parent.to_path_buf()),
        _ => Ok(PathBuf::from(".")),
    }
}

#[cfg(test)]
mod tests {
    use super::{
        destination_parent, stage_copy, AssetDatabaseProvisioner, ExpectedContent,
        ProvisionOutcome, ProvisionRequest, STAGING_PREFIX,
    };
    use crate::provision::{ensure_provisioned, EmbeddedAssetSource, ProvisionError};
    use std::io::{self, Cursor, Write};
    use std::path::{Path, PathBuf};

    /// Writer that accepts `budget` bytes and then fails like a full disk.
    struct FullDisk<W: Write> {
        inner: W,
        budget: usize,
    }

    impl<W: Write> Write for FullDisk<W> {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.budget == 0 {
                return Err(io::Error::new(io::ErrorKind::Other, "no space left on device"));
            }
            let n = self.inner.write(&buf[..buf.len().min(self.budget)])?;
            self.budget -= n;
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            self.inner.flush()
        }
    }

    #[test]
    fn write_failure_midstream_leaves_no_destination_or_staging_file() {
        let data: Vec<u8> = (0..40 * 1024).map(|i| (i % 253) as u8).collect();
        for budget in [0usize, 1, 4096, 16 * 1024, 40 * 1024 - 1] {
            let dir = tempfile::tempdir().unwrap();
            let destination = dir.path().join("finos.db");
            let mut staged = tempfile::Builder::new()
                .prefix(STAGING_PREFIX)
                .tempfile_in(dir.path())
                .unwrap();

            let mut reader = Cursor::new(&data);
            let err = stage_copy(
                &mut reader,
                FullDisk {
                    inner: staged.as_file_mut(),
                    budget,
                },
            )
            .expect_err("write failure must propagate");
            assert_eq!(err.kind(), io::ErrorKind::Other);
            assert_eq!(staged.as_file().metadata().unwrap().len(), budget as u64);

            // The provisioner drops the staging file on this error path.
            drop(staged);
            assert!(!destination.exists(), "budget {budget}");
            assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
        }
    }

    #[test]
    fn destination_parent_rejects_root() {
        let err = destination_parent(Path::new("/")).expect_err("root has no file name");
        assert!(matches!(err, ProvisionError::DestinationOpen { .. }));
    }

    #[test]
    fn destination_parent_defaults_to_current_dir_for_bare_names() {
        assert_eq!(
            destination_parent(Path::new("finos.db")).unwrap(),
            PathBuf::from(".")
        );
    }

    #[test]
    fn expected_content_matches_partial_fingerprints() {
        let data = b"abc";
        let actual = super::ContentFingerprint {
            len: 3,
            blake3: blake3::hash(data),
        };
        assert!(ExpectedContent::default().matches(&actual));
        assert!(ExpectedContent {
            len: Some(3),
            blake3: None
        }
        .matches(&actual));
        assert!(!ExpectedContent {
            len: Some(4),
            blake3: None
        }
        .matches(&actual));
        assert!(!ExpectedContent {
            len: None,
            blake3: Some(blake3::hash(b"abd"))
        }
        .matches(&actual));
    }

    #[test]
    fn ensure_all_stops_at_first_failure() {
        let dir = tempfile::tempdir().unwrap();
        let provisioner = AssetDatabaseProvisioner::new(
            EmbeddedAssetSource::new().with_asset("finos.db", vec![2u8; 8]),
        );
        let requests = vec![
            ProvisionRequest::new("finos.db", dir.path().join("a/finos.db")),
            ProvisionRequest::new("absent.db", dir.path().join("b/absent.db")),
            ProvisionRequest::new("finos.db", dir.path().join("c/finos.db")),
        ];

        let err = provisioner.ensure_all(&requests).unwrap_err();

        assert!(matches!(err, ProvisionError::AssetNotFound { .. }));
        assert!(dir.path().join("a/finos.db").is_file());
        assert!(!dir.path().join("c/finos.db").exists());
    }

    #[test]
    fn staging_file_never_outlives_a_successful_copy() {
        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("finos.db");
        let assets = EmbeddedAssetSource::new().with_asset("finos.db", vec![1u8; 300]);

        let outcome = ensure_provisioned(&assets, "finos.db", &destination).unwrap();
        assert!(matches!(outcome, ProvisionOutcome::Copied { bytes: 300, .. }));

        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("finos.db")]);
    }
}
