//! KPI tree runner: the publication workflow and its concrete collaborators.
//!
//! This crate builds on `kpitree-core` to provide:
//! - TOML configuration and the deployment context it resolves against
//! - Execution policy (interactive vs. unattended fatality rules)
//! - Adapters: gsutil and local-directory object stores, the subprocess report
//!   generator, Sheets and file query stores, the terminal confirmation gate
//! - Artifact verification, publication and calendar index maintenance
//! - The workflow orchestrator and its run summary
//! - Wiring from configuration to concrete collaborators

pub mod adapters;
pub mod calendar_updater;
pub mod config;
pub mod context;
pub mod credentials;
pub mod policy;
pub mod publisher;
pub mod setup;
pub mod summary;
pub mod verify;
pub mod workflow;

pub use adapters::{
    FileQueryStore, GcloudTokenSource, GsutilStore, LocalDirStore, ProcessGenerator,
    SheetsQueryStore, StaticToken, StdinGate, TokenSource,
};
pub use calendar_updater::{
    BackupStatus, CalendarError, CalendarIndexUpdater, CalendarUpdate, RepublishStatus,
    UpdateReport,
};
pub use config::{ConfigError, PublishConfig, QueryBackend, StorageBackend};
pub use context::{DeploymentContext, DeploymentKind};
pub use credentials::{load_service_account, CredentialError, ServiceAccountKey};
pub use policy::{
    ExecutionPolicy, MismatchAction, PolicyOverrides, RefreshWait, RunMode, Severity,
};
pub use publisher::{ArtifactPublisher, PublishError, PublishReport, UploadStatus, UploadTarget};
pub use setup::Collaborators;
pub use summary::{LocationState, PublishedLocation, RunStatus, RunSummary, Stage, StepOutcome};
pub use verify::{verify_artifact, VerifyError, VerifyOutcome};
pub use workflow::{Workflow, WorkflowSettings};

#[cfg(test)]
mod send_sync_checks {
    use super::*;

    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}

    #[test]
    fn config_is_send_sync() {
        assert_send::<PublishConfig>();
        assert_sync::<PublishConfig>();
        assert_send::<DeploymentContext>();
        assert_sync::<DeploymentContext>();
    }

    #[test]
    fn policy_is_send_sync() {
        assert_send::<ExecutionPolicy>();
        assert_sync::<ExecutionPolicy>();
    }

    #[test]
    fn reports_are_send_sync() {
        assert_send::<RunSummary>();
        assert_sync::<RunSummary>();
        assert_send::<PublishReport>();
        assert_sync::<PublishReport>();
        assert_send::<UpdateReport>();
        assert_sync::<UpdateReport>();
    }

    #[test]
    fn adapters_are_send_sync() {
        assert_send::<GsutilStore>();
        assert_sync::<GsutilStore>();
        assert_send::<LocalDirStore>();
        assert_sync::<LocalDirStore>();
        assert_send::<ProcessGenerator>();
        assert_sync::<ProcessGenerator>();
        assert_send::<FileQueryStore>();
        assert_sync::<FileQueryStore>();
        assert_send::<SheetsQueryStore>();
        assert_sync::<SheetsQueryStore>();
    }

    #[test]
    fn errors_are_send_sync() {
        assert_send::<CalendarError>();
        assert_sync::<CalendarError>();
        assert_send::<ConfigError>();
        assert_sync::<ConfigError>();
        assert_send::<PublishError>();
        assert_sync::<PublishError>();
    }
}
