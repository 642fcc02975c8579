//! Startup hook invoked once by the host application lifecycle.
//!
//! # Responsibility
//! - Run every provisioning request before dependent features start.
//! - Turn provisioning failures into an explicit continue/abort decision.
//!
//! # Invariants
//! - Requests run sequentially in the given order.
//! - A failed item never leaves a destination behind, so the next launch retries it.

use crate::provision::{
    AssetDatabaseProvisioner, AssetSource, ProvisionError, ProvisionOutcome, ProvisionRequest,
    ProvisionResult,
};
use log::{info, warn};
use std::path::PathBuf;

/// What the host does when one request fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Record the failure and keep starting up.
    #[default]
    Continue,
    /// Stop at the first failure and return it.
    Abort,
}

#[derive(Debug)]
pub enum StartupStatus {
    Ready(ProvisionOutcome),
    Failed {
        error: ProvisionError,
        /// Destination is still absent; the next launch will try again.
        retry_on_next_launch: bool,
    },
}

#[derive(Debug)]
pub struct StartupItem {
    pub asset_name: String,
    pub destination: PathBuf,
    pub status: StartupStatus,
}

impl StartupItem {
    pub fn is_ready(&self) -> bool {
        matches!(self.status, StartupStatus::Ready(_))
    }
}

/// Per-request results of one startup pass.
#[derive(Debug, Default)]
pub struct StartupReport {
    pub items: Vec<StartupItem>,
}

impl StartupReport {
    pub fn all_ready(&self) -> bool {
        self.items.iter().all(StartupItem::is_ready)
    }

    pub fn copied_count(&self) -> usize {
        self.items
            .iter()
            .filter(|item| matches!(&item.status, StartupStatus::Ready(outcome) if outcome.was_copied()))
            .count()
    }

    pub fn failures(&self) -> impl Iterator<Item = &StartupItem> {
        self.items.iter().filter(|item| !item.is_ready())
    }
}

/// Provisions `requests` in order under `policy`.
///
/// # Errors
/// - With `FailurePolicy::Abort`, returns the first `ProvisionError`.
/// - With `FailurePolicy::Continue`, never fails; failures land in the report.
pub fn run_startup<A: AssetSource>(
    provisioner: &AssetDatabaseProvisioner<A>,
    requests: &[ProvisionRequest],
    policy: FailurePolicy,
) -> ProvisionResult<StartupReport> {
    let mut report = StartupReport::default();

    for request in requests {
        let status = match provisioner.ensure(request) {
            Ok(outcome) => StartupStatus::Ready(outcome),
            Err(error) if policy == FailurePolicy::Abort => return Err(error),
            Err(error) => {
                let retry_on_next_launch = !request.destination.exists();
                warn!(
                    "event=startup_provision module=startup status=degraded asset={} error_code={} retry_on_next_launch={}",
                    request.asset_name,
                    error.error_code(),
                    retry_on_next_launch
                );
                StartupStatus::Failed {
                    error,
                    retry_on_next_launch,
                }
            }
        };
        report.items.push(StartupItem {
            asset_name: request.asset_name.clone(),
            destination: request.destination.clone(),
            status,
        });
    }

    info!(
        "event=startup_provision module=startup status=done items={} copied={} failed={}",
        report.items.len(),
        report.copied_count(),
        report.failures().count()
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::{run_startup, FailurePolicy, StartupStatus};
    use crate::provision::{
        AssetDatabaseProvisioner, EmbeddedAssetSource, ProvisionError, ProvisionRequest,
    };

    fn requests(root: &std::path::Path) -> Vec<ProvisionRequest> {
        vec![
            ProvisionRequest::new("missing.db", root.join("databases/missing.db")),
            ProvisionRequest::new("finos.db", root.join("databases/finos.db")),
        ]
    }

    #[test]
    fn continue_policy_records_failure_and_provisions_the_rest() {
        let dir = tempfile::tempdir().unwrap();
        let provisioner = AssetDatabaseProvisioner::new(
            EmbeddedAssetSource::new().with_asset("finos.db", vec![9u8; 64]),
        );

        let report = run_startup(&provisioner, &requests(dir.path()), FailurePolicy::Continue)
            .expect("continue policy never fails");

        assert!(!report.all_ready());
        assert_eq!(report.copied_count(), 1);
        let failed: Vec<_> = report.failures().collect();
        assert_eq!(failed.len(), 1);
        match &failed[0].status {
            StartupStatus::Failed {
                error,
                retry_on_next_launch,
            } => {
                assert!(matches!(error, ProvisionError::AssetNotFound { .. }));
                assert!(*retry_on_next_launch);
            }
            StartupStatus::Ready(_) => panic!("missing asset must fail"),
        }
        assert!(dir.path().join("databases/finos.db").is_file());
    }

    #[test]
    fn abort_policy_stops_at_first_failure() {
        let dir = tempfile::tempdir().unwrap();
        let provisioner = AssetDatabaseProvisioner::new(
            EmbeddedAssetSource::new().with_asset("finos.db", vec![9u8; 64]),
        );

        let err = run_startup(&provisioner, &requests(dir.path()), FailurePolicy::Abort)
            .expect_err("abort policy must surface the failure");

        assert!(matches!(err, ProvisionError::AssetNotFound { .. }));
        assert!(!dir.path().join("databases/finos.db").exists());
    }

    #[test]
    fn second_startup_copies_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let provisioner = AssetDatabaseProvisioner::new(
            EmbeddedAssetSource::new().with_asset("finos.db", vec![1u8; 16]),
        );
        let plan = vec![ProvisionRequest::new(
            "finos.db",
            dir.path().join("databases/finos.db"),
        )];

        let first = run_startup(&provisioner, &plan, FailurePolicy::Abort).unwrap();
        let second = run_startup(&provisioner, &plan, FailurePolicy::Abort).unwrap();

        assert_eq!(first.copied_count(), 1);
        assert_eq!(second.copied_count(), 0);
        assert!(second.all_ready());
    }
}
