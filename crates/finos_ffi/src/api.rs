//! FFI use-case API for the mobile shell.
//!
//! # Responsibility
//! - Expose the startup provisioning hook to the host lifecycle.
//! - Translate core errors into stable string envelopes.
//!
//! # Invariants
//! - Exported functions must not panic across the FFI boundary.
//! - `error_code` values mirror `ProvisionError::error_code`.

use finos_core::{
    core_version as core_version_inner, init_logging as init_logging_inner, ping as ping_inner,
    run_startup, AssetDatabaseProvisioner, AssetSource, DirAssetSource, EmbeddedAssetSource,
    FailurePolicy, ProvisionManifest, ProvisionOutcome, ProvisionRequest, StartupStatus,
    StorageLayout, DEFAULT_DATABASE_NAME,
};
use log::warn;

const PRIVATE_DIR_ENV: &str = "FINOS_PRIVATE_DIR";

/// Minimal health-check API for FRB smoke integration.
#[flutter_rust_bridge::frb(sync)]
pub fn ping() -> String {
    ping_inner().to_owned()
}

/// Core crate version.
#[flutter_rust_bridge::frb(sync)]
pub fn core_version() -> String {
    core_version_inner().to_owned()
}

/// Initializes Rust core logging once per process.
///
/// # FFI contract
/// - Safe to call repeatedly with the same `level + log_dir`.
/// - Returns empty string on success and error message on failure.
#[flutter_rust_bridge::frb(sync)]
pub fn init_logging(level: String, log_dir: String) -> String {
    match init_logging_inner(level.as_str(), log_dir.as_str()) {
        Ok(()) => String::new(),
        Err(err) => err,
    }
}

/// Result envelope for one provisioned database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionResponse {
    /// Whether the database file is ready at `database_path`.
    pub ok: bool,
    /// Whether this call copied the asset (first launch).
    pub copied: bool,
    /// Resolved destination path (empty when resolution failed).
    pub database_path: String,
    /// Stable error code; empty on success.
    pub error_code: String,
    /// Human-readable diagnostics.
    pub message: String,
    /// True when a failed item will be retried on the next launch.
    pub retry_on_next_launch: bool,
}

impl ProvisionResponse {
    fn ready(database_path: String, outcome: &ProvisionOutcome) -> Self {
        let message = match outcome {
            ProvisionOutcome::AlreadyPresent { .. } => "Database already provisioned.".to_string(),
            ProvisionOutcome::Copied { bytes, .. } => format!("Database provisioned ({bytes} bytes)."),
        };
        Self {
            ok: true,
            copied: outcome.was_copied(),
            database_path,
            error_code: String::new(),
            message,
            retry_on_next_launch: false,
        }
    }

    fn failure(
        database_path: String,
        error_code: &str,
        message: impl Into<String>,
        retry_on_next_launch: bool,
    ) -> Self {
        Self {
            ok: false,
            copied: false,
            database_path,
            error_code: error_code.to_string(),
            message: message.into(),
            retry_on_next_launch,
        }
    }
}

/// Provisions `asset_name` from an unpacked asset directory.
///
/// Input semantics:
/// - `asset_dir`: directory holding the bundled assets.
/// - `private_dir`: app-private root; empty falls back to `FINOS_PRIVATE_DIR`.
/// - `asset_name`: bundled asset; empty means `finos.db`.
///
/// # FFI contract
/// - Sync call, blocking file I/O; run before dependent features start.
/// - Never panics; failure is reported in the envelope.
#[flutter_rust_bridge::frb(sync)]
pub fn provision_database(
    asset_dir: String,
    private_dir: String,
    asset_name: String,
) -> ProvisionResponse {
    provision_one(DirAssetSource::new(asset_dir.trim()), &private_dir, &asset_name)
}

/// Provisions `asset_name` from bytes the host read out of its own bundle.
///
/// # FFI contract
/// - Same as [`provision_database`]; `asset_bytes` is only read when the
///   database is missing.
#[flutter_rust_bridge::frb(sync)]
pub fn provision_database_from_bytes(
    asset_name: String,
    asset_bytes: Vec<u8>,
    private_dir: String,
) -> ProvisionResponse {
    let name = normalize_asset_name(&asset_name);
    let assets = EmbeddedAssetSource::new().with_asset(name.clone(), asset_bytes);
    provision_one(assets, &private_dir, &name)
}

/// Runs a full startup pass from a JSON manifest.
///
/// An empty `manifest_json` provisions the default `finos.db`. With
/// `abort_on_error`, the first failure ends the pass.
///
/// # FFI contract
/// - Never panics; returns one envelope per attempted database.
#[flutter_rust_bridge::frb(sync)]
pub fn provision_on_startup(
    asset_dir: String,
    private_dir: String,
    manifest_json: String,
    abort_on_error: bool,
) -> Vec<ProvisionResponse> {
    let layout = match resolve_layout(&private_dir) {
        Ok(layout) => layout,
        Err(message) => {
            return vec![ProvisionResponse::failure(
                String::new(),
                "invalid_private_dir",
                message,
                true,
            )]
        }
    };

    let manifest = if manifest_json.trim().is_empty() {
        ProvisionManifest::single(DEFAULT_DATABASE_NAME)
    } else {
        match ProvisionManifest::from_json_str(&manifest_json) {
            Ok(manifest) => manifest,
            Err(err) => {
                return vec![ProvisionResponse::failure(
                    String::new(),
                    "invalid_manifest",
                    format!("provision_on_startup failed: {err}"),
                    true,
                )]
            }
        }
    };
    let requests = match manifest.to_requests(&layout) {
        Ok(requests) => requests,
        Err(err) => {
            return vec![ProvisionResponse::failure(
                String::new(),
                "invalid_manifest",
                format!("provision_on_startup failed: {err}"),
                true,
            )]
        }
    };

    let provisioner = AssetDatabaseProvisioner::new(DirAssetSource::new(asset_dir.trim()));
    let policy = if abort_on_error {
        FailurePolicy::Abort
    } else {
        FailurePolicy::Continue
    };

    match run_startup(&provisioner, &requests, policy) {
        Ok(report) => report
            .items
            .iter()
            .map(|item| {
                let path = item.destination.display().to_string();
                match &item.status {
                    StartupStatus::Ready(outcome) => ProvisionResponse::ready(path, outcome),
                    StartupStatus::Failed {
                        error,
                        retry_on_next_launch,
                    } => ProvisionResponse::failure(
                        path,
                        error.error_code(),
                        format!("provision_on_startup failed: {error}"),
                        *retry_on_next_launch,
                    ),
                }
            })
            .collect(),
        Err(err) => vec![ProvisionResponse::failure(
            String::new(),
            err.error_code(),
            format!("provision_on_startup aborted: {err}"),
            true,
        )],
    }
}

/// Resolves the database path without touching the filesystem.
///
/// Returns an empty string when `private_dir` or `name` is invalid.
#[flutter_rust_bridge::frb(sync)]
pub fn database_path(private_dir: String, name: String) -> String {
    resolve_layout(&private_dir)
        .ok()
        .and_then(|layout| layout.database_path(&normalize_asset_name(&name)).ok())
        .map(|path| path.display().to_string())
        .unwrap_or_default()
}

fn provision_one<A: AssetSource>(assets: A, private_dir: &str, asset_name: &str) -> ProvisionResponse {
    let asset_name = normalize_asset_name(asset_name);
    let layout = match resolve_layout(private_dir) {
        Ok(layout) => layout,
        Err(message) => {
            return ProvisionResponse::failure(String::new(), "invalid_private_dir", message, true)
        }
    };
    let database_name = asset_name.rsplit('/').next().unwrap_or(asset_name.as_str());
    let destination = match layout.database_path(database_name) {
        Ok(path) => path,
        Err(err) => {
            return ProvisionResponse::failure(
                String::new(),
                "invalid_database_name",
                err.to_string(),
                false,
            )
        }
    };
    let path = destination.display().to_string();

    let provisioner = AssetDatabaseProvisioner::new(assets);
    match provisioner.ensure(&ProvisionRequest::new(asset_name.as_str(), destination.clone())) {
        Ok(outcome) => ProvisionResponse::ready(path, &outcome),
        Err(err) => ProvisionResponse::failure(
            path,
            err.error_code(),
            format!("provision_database failed: {err}"),
            !destination.exists(),
        ),
    }
}

fn normalize_asset_name(asset_name: &str) -> String {
    let trimmed = asset_name.trim();
    if trimmed.is_empty() {
        DEFAULT_DATABASE_NAME.to_string()
    } else {
        trimmed.to_string()
    }
}

fn resolve_layout(private_dir: &str) -> Result<StorageLayout, String> {
    let trimmed = private_dir.trim();
    if !trimmed.is_empty() {
        return StorageLayout::from_str_path(trimmed).map_err(|err| err.to_string());
    }
    match std::env::var(PRIVATE_DIR_ENV) {
        Ok(raw) if !raw.trim().is_empty() => {
            StorageLayout::from_str_path(&raw).map_err(|err| err.to_string())
        }
        _ => {
            warn!("event=ffi_resolve module=ffi status=error error_code=private_dir_missing");
            Err(format!(
                "private_dir is empty and `{PRIVATE_DIR_ENV}` is not set"
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{
        core_version, database_path, init_logging, ping, provision_database,
        provision_database_from_bytes, provision_on_startup,
    };
    use std::fs;

    #[test]
    fn ping_returns_pong() {
        assert_eq!(ping(), "pong");
    }

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }

    #[test]
    fn init_logging_rejects_empty_log_dir() {
        assert!(!init_logging("info".to_string(), String::new()).is_empty());
    }

    #[test]
    fn init_logging_rejects_unsupported_level() {
        assert!(!init_logging("verbose".to_string(), "tmp/logs".to_string()).is_empty());
    }

    #[test]
    fn database_path_uses_databases_subdir() {
        let dir = tempfile::tempdir().unwrap();
        let private = dir.path().to_str().unwrap().to_string();
        let resolved = database_path(private, String::new());
        assert_eq!(
            resolved,
            dir.path().join("databases").join("finos.db").display().to_string()
        );
        assert!(database_path("relative/dir".to_string(), "finos.db".to_string()).is_empty());
    }

    #[test]
    fn provision_database_copies_then_skips() {
        let dir = tempfile::tempdir().unwrap();
        let assets = dir.path().join("assets");
        fs::create_dir_all(&assets).unwrap();
        fs::write(assets.join("finos.db"), vec![5u8; 4096]).unwrap();
        let private = dir.path().join("private").to_str().unwrap().to_string();
        let asset_dir = assets.to_str().unwrap().to_string();

        let first = provision_database(asset_dir.clone(), private.clone(), "finos.db".to_string());
        assert!(first.ok, "{}", first.message);
        assert!(first.copied);
        assert_eq!(fs::read(&first.database_path).unwrap().len(), 4096);

        let second = provision_database(asset_dir, private, "finos.db".to_string());
        assert!(second.ok);
        assert!(!second.copied);
        assert_eq!(second.database_path, first.database_path);
    }

    #[test]
    fn provision_database_reports_missing_asset() {
        let dir = tempfile::tempdir().unwrap();
        let private = dir.path().join("private").to_str().unwrap().to_string();
        let asset_dir = dir.path().join("empty").to_str().unwrap().to_string();

        let response = provision_database(asset_dir, private, String::new());

        assert!(!response.ok);
        assert_eq!(response.error_code, "asset_not_found");
        assert!(response.retry_on_next_launch);
        assert!(!std::path::Path::new(&response.database_path).exists());
    }

    #[test]
    fn provision_from_bytes_writes_exact_content() {
        let dir = tempfile::tempdir().unwrap();
        let private = dir.path().to_str().unwrap().to_string();

        let response =
            provision_database_from_bytes("finos.db".to_string(), b"seed".to_vec(), private);

        assert!(response.ok, "{}", response.message);
        assert_eq!(fs::read(&response.database_path).unwrap(), b"seed");
    }

    #[test]
    fn provision_on_startup_rejects_bad_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let private = dir.path().to_str().unwrap().to_string();

        let responses = provision_on_startup(
            dir.path().to_str().unwrap().to_string(),
            private,
            "{ not json".to_string(),
            false,
        );

        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].error_code, "invalid_manifest");
    }

    #[test]
    fn provision_on_startup_defaults_to_finos_db() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("finos.db"), b"bundled").unwrap();
        let private = dir.path().join("private").to_str().unwrap().to_string();

        let responses = provision_on_startup(
            dir.path().to_str().unwrap().to_string(),
            private,
            String::new(),
            true,
        );

        assert_eq!(responses.len(), 1);
        assert!(responses[0].ok, "{}", responses[0].message);
        assert!(responses[0].copied);
    }
}
