//! Core logic for FinOS local storage bootstrap.
//! Provisions bundled database assets into private storage on first launch.

pub mod layout;
pub mod logging;
pub mod provision;
pub mod startup;

pub use layout::{LayoutError, StorageLayout, DEFAULT_DATABASE_NAME};
pub use logging::{init_logging, logging_status, LogLevel};
pub use provision::{
    ensure_provisioned, fingerprint_file, provision, AssetDatabaseProvisioner, AssetSource,
    ContentFingerprint, DirAssetSource, EmbeddedAssetSource, ExpectedContent, ManifestEntry,
    ManifestError, ProvisionError, ProvisionManifest, ProvisionOutcome, ProvisionRequest,
    ProvisionResult, ProvisionedFile,
};
pub use startup::{run_startup, FailurePolicy, StartupItem, StartupReport, StartupStatus};

/// Minimal health-check API for host integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
