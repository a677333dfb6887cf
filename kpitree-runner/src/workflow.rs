//! Workflow orchestrator.
//!
//! `Validate -> ParameterizeQuery -> AwaitExternalDataRefresh -> Generate ->
//! VerifyArtifact -> Publish -> UpdateCalendar`. Each stage reports an outcome;
//! only this module decides, through the [`ExecutionPolicy`], whether a
//! failure aborts the run. The date is validated before any collaborator is
//! touched.

use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

use kpitree_core::collab::{HumanGate, ObjectStore, QueryStore, QueryStoreError, ReportGenerator};
use kpitree_core::date::{DateMarker, DateStrictness, TargetDate};
use kpitree_core::paths::{ObjectUri, PublicationPaths, DEFAULT_ALIAS_KEY};
use kpitree_core::query::{parameterize, ParamStatus};

use crate::calendar_updater::{CalendarError, CalendarIndexUpdater, CalendarUpdate, RepublishStatus};
use crate::credentials::load_service_account;
use crate::policy::{ExecutionPolicy, MismatchAction, RefreshWait, Severity};
use crate::publisher::{ArtifactPublisher, PublishError, UploadStatus};
use crate::summary::{RunStatus, RunSummary, Stage, StepOutcome};
use crate::verify::{verify_artifact, VerifyOutcome};

/// Run-wide settings resolved from configuration and the command line.
#[derive(Debug, Clone)]
pub struct WorkflowSettings {
    pub base: ObjectUri,
    pub alias_key: String,
    /// Also publish the "today" alias.
    pub publish_alias: bool,
    pub calendar_index: PathBuf,
    pub marker: DateMarker,
    pub strictness: DateStrictness,
    pub refresh_instructions: Vec<String>,
}

impl WorkflowSettings {
    pub fn new(base: ObjectUri, calendar_index: impl Into<PathBuf>) -> Self {
        Self {
            base,
            alias_key: DEFAULT_ALIAS_KEY.to_string(),
            publish_alias: false,
            calendar_index: calendar_index.into(),
            marker: DateMarker::default(),
            strictness: DateStrictness::Shape,
            refresh_instructions: Vec::new(),
        }
    }
}

/// `Break` stops the run; the summary already records why.
type Flow<T = ()> = ControlFlow<(), T>;

pub struct Workflow<'a> {
    query_store: &'a dyn QueryStore,
    generator: &'a dyn ReportGenerator,
    object_store: &'a dyn ObjectStore,
    gate: &'a dyn HumanGate,
    policy: ExecutionPolicy,
    settings: WorkflowSettings,
}

impl<'a> Workflow<'a> {
    pub fn new(
        query_store: &'a dyn QueryStore,
        generator: &'a dyn ReportGenerator,
        object_store: &'a dyn ObjectStore,
        gate: &'a dyn HumanGate,
        policy: ExecutionPolicy,
        settings: WorkflowSettings,
    ) -> Self {
        Self {
            query_store,
            generator,
            object_store,
            gate,
            policy,
            settings,
        }
    }

    pub fn policy(&self) -> &ExecutionPolicy {
        &self.policy
    }

    pub fn settings(&self) -> &WorkflowSettings {
        &self.settings
    }

    pub fn paths(&self, date: &TargetDate) -> PublicationPaths {
        let alias = self
            .settings
            .publish_alias
            .then_some(self.settings.alias_key.as_str());
        PublicationPaths::derive(&self.settings.base, date, alias)
    }

    /// Execute one run for `raw_date`. Never panics past this point; every
    /// outcome, including aborts, is in the returned summary.
    pub fn run(&self, raw_date: &str) -> RunSummary {
        let mut summary = RunSummary::new(raw_date, self.policy.mode);
        info!(date = raw_date, mode = %self.policy.mode, "starting KPI tree publication");

        let date = match TargetDate::parse_with(raw_date, self.settings.strictness) {
            Ok(date) => date,
            Err(e) => {
                error!(stage = %Stage::Validate, error = %e, "rejecting input date");
                summary.abort(Stage::Validate, e.to_string());
                return summary.finish();
            }
        };
        if date.is_calendar_valid() {
            summary.record(Stage::Validate, StepOutcome::Succeeded(date.to_string()));
        } else {
            warn!(%date, "date has the right shape but is not a calendar date");
            summary.record(
                Stage::Validate,
                StepOutcome::Warning(format!("{date} is not a calendar date; shape check only")),
            );
        }
        summary.paths = Some(self.paths(&date));

        if self.run_stages(&date, &mut summary).is_break() {
            debug_assert!(summary.is_aborted());
        }

        match &summary.status {
            RunStatus::Completed => info!(%date, "run completed"),
            RunStatus::Aborted { stage, reason } => error!(%date, %stage, %reason, "run aborted"),
        }
        summary.finish()
    }

    fn run_stages(&self, date: &TargetDate, summary: &mut RunSummary) -> Flow {
        self.parameterize_query(date, summary)?;
        self.await_refresh(summary)?;
        let artifact = self.generate(date, summary)?;
        self.verify(date, summary, &artifact)?;
        self.publish(date, summary, &artifact)?;
        self.update_calendar(date, summary)
    }

    /// Record a failure as fatal or skipped according to `severity`.
    fn fail_with(
        &self,
        summary: &mut RunSummary,
        stage: Stage,
        severity: Severity,
        reason: String,
    ) -> Flow {
        match severity {
            Severity::Fatal => {
                error!(%stage, %reason, "fatal");
                summary.abort(stage, reason);
                ControlFlow::Break(())
            }
            Severity::Skip => {
                warn!(%stage, %reason, "skipping");
                summary.record(stage, StepOutcome::Skipped(reason));
                ControlFlow::Continue(())
            }
        }
    }

    fn parameterize_query(&self, date: &TargetDate, summary: &mut RunSummary) -> Flow {
        let stage = Stage::ParameterizeQuery;
        if let Some(path) = self.query_store.credential_path() {
            if let Err(e) = load_service_account(path) {
                return self.fail_with(summary, stage, self.policy.missing_credential, e.to_string());
            }
        }

        let stored = match self.query_store.load() {
            Ok(q) => q,
            Err(e) => return self.query_store_failure(summary, e),
        };
        let result = parameterize(&stored.text, date);
        match result.status {
            ParamStatus::TemplateNotMatched => {
                warn!(%stage, location = %stored.location, "no `SET target_date = DATE` statement found");
                return self.manual_query_edit(
                    summary,
                    format!("template not matched at {}", stored.location),
                );
            }
            ParamStatus::Rewritten => info!(
                %stage,
                previous = result.previous.as_deref().unwrap_or(""),
                %date,
                "rewrote target date"
            ),
            ParamStatus::AlreadyCurrent => info!(%stage, %date, "query already targets this date"),
        }

        if result.changed() || !self.query_store.saves_in_place() {
            if let Err(e) = self.query_store.save(&stored, &result.text) {
                return self.query_store_failure(summary, e);
            }
        }
        let detail = match result.status {
            ParamStatus::AlreadyCurrent => format!("already set to {date} ({})", self.query_store.name()),
            _ => format!("set to {date} ({})", self.query_store.name()),
        };
        summary.record(stage, StepOutcome::Succeeded(detail));
        ControlFlow::Continue(())
    }

    fn query_store_failure(&self, summary: &mut RunSummary, err: QueryStoreError) -> Flow {
        warn!(stage = %Stage::ParameterizeQuery, store = self.query_store.name(), error = %err, "query store failed");
        match err {
            QueryStoreError::Credential(reason) => self.fail_with(
                summary,
                Stage::ParameterizeQuery,
                self.policy.missing_credential,
                format!("credential: {reason}"),
            ),
            other => self.manual_query_edit(summary, other.to_string()),
        }
    }

    fn manual_query_edit(&self, summary: &mut RunSummary, reason: String) -> Flow {
        let stage = Stage::ParameterizeQuery;
        if !self.policy.manual_query_fallback {
            summary.record(stage, StepOutcome::Warning(format!("{reason}; query left unchanged")));
            return ControlFlow::Continue(());
        }
        let prompt = format!(
            "Set the target date by hand at {} and confirm to continue",
            self.query_store.manual_location()
        );
        if self.gate.confirm(&prompt) {
            summary.record(stage, StepOutcome::Warning(format!("{reason}; edited manually")));
            ControlFlow::Continue(())
        } else {
            summary.abort(stage, format!("{reason}; operator declined manual edit"));
            ControlFlow::Break(())
        }
    }

    fn await_refresh(&self, summary: &mut RunSummary) -> Flow {
        let stage = Stage::AwaitExternalDataRefresh;
        match self.policy.refresh {
            RefreshWait::Proceed => {
                info!(%stage, "not waiting for the external refresh; data may be stale");
                summary.record(
                    stage,
                    StepOutcome::Skipped("unattended: proceeding without confirmation".into()),
                );
                ControlFlow::Continue(())
            }
            RefreshWait::Confirm => {
                for (i, line) in self.settings.refresh_instructions.iter().enumerate() {
                    info!(%stage, "{}. {line}", i + 1);
                }
                if self.gate.confirm("Has the external data refresh completed?") {
                    summary.record(stage, StepOutcome::Succeeded("operator confirmed".into()));
                    ControlFlow::Continue(())
                } else {
                    summary.abort(stage, "operator did not confirm the data refresh");
                    ControlFlow::Break(())
                }
            }
        }
    }

    fn generate(&self, date: &TargetDate, summary: &mut RunSummary) -> Flow<PathBuf> {
        let stage = Stage::Generate;
        info!(%stage, generator = self.generator.name(), %date, "generating report");
        match self.generator.generate(date) {
            Ok(path) => {
                summary.record(stage, StepOutcome::Succeeded(path.display().to_string()));
                ControlFlow::Continue(path)
            }
            Err(e) => {
                summary.abort(stage, e.to_string());
                ControlFlow::Break(())
            }
        }
    }

    fn verify(&self, date: &TargetDate, summary: &mut RunSummary, artifact: &Path) -> Flow {
        let stage = Stage::VerifyArtifact;
        match verify_artifact(artifact, date, &self.settings.marker) {
            Err(e) => {
                summary.abort(stage, e.to_string());
                ControlFlow::Break(())
            }
            Ok(VerifyOutcome::MarkerPresent) => {
                info!(%stage, "artifact carries the expected date marker");
                summary.record(stage, StepOutcome::Succeeded("date marker present".into()));
                ControlFlow::Continue(())
            }
            Ok(VerifyOutcome::MarkerMissing { expected }) => {
                warn!(%stage, %expected, "artifact does not contain the expected date marker");
                let reason = format!("date marker '{expected}' not found");
                match self.policy.date_mismatch {
                    MismatchAction::Continue => {
                        summary.record(stage, StepOutcome::Warning(reason));
                        ControlFlow::Continue(())
                    }
                    MismatchAction::Prompt => {
                        if self.gate.confirm(&format!("{reason}. Publish anyway?")) {
                            summary.record(stage, StepOutcome::Warning(format!("{reason}; operator chose to continue")));
                            ControlFlow::Continue(())
                        } else {
                            summary.abort(stage, format!("{reason}; operator aborted"));
                            ControlFlow::Break(())
                        }
                    }
                }
            }
        }
    }

    fn publish(&self, date: &TargetDate, summary: &mut RunSummary, artifact: &Path) -> Flow {
        let stage = Stage::Publish;
        if !self.object_store.is_available() {
            let reason = format!("storage client '{}' not available", self.object_store.name());
            return self.fail_with(summary, stage, self.policy.missing_storage_tool, reason);
        }

        let publisher = ArtifactPublisher::new(
            self.object_store,
            self.settings.base.clone(),
            self.settings.alias_key.clone(),
        )
        .stop_on_first_failure(self.policy.stop_on_first_upload_failure());

        let report = match publisher.publish(artifact, date, self.settings.publish_alias) {
            Ok(report) => report,
            Err(e @ PublishError::Unauthorized(_)) => {
                return self.fail_with(summary, stage, self.policy.publish_failure, e.to_string());
            }
            Err(e @ PublishError::ArtifactUnreadable { .. }) => {
                summary.abort(stage, e.to_string());
                return ControlFlow::Break(());
            }
        };
        summary.artifact_blake3 = Some(report.digest.clone());
        summary.uploads = report.uploads.clone();

        if report.all_uploaded() {
            summary.record(
                stage,
                StepOutcome::Succeeded(format!("{} objects uploaded", report.uploads.len())),
            );
            return ControlFlow::Continue(());
        }
        let failed: Vec<String> = report
            .uploads
            .iter()
            .filter_map(|u| match &u.status {
                UploadStatus::Uploaded => None,
                UploadStatus::Failed(reason) => Some(format!("{}: {reason}", u.target)),
                UploadStatus::NotAttempted => Some(format!("{}: not attempted", u.target)),
            })
            .collect();
        let reason = failed.join("; ");
        match self.policy.publish_failure {
            Severity::Fatal => {
                summary.abort(stage, reason);
                ControlFlow::Break(())
            }
            Severity::Skip => {
                warn!(%stage, %reason, "some uploads failed; continuing");
                summary.record(stage, StepOutcome::Failed(reason));
                ControlFlow::Continue(())
            }
        }
    }

    fn update_calendar(&self, date: &TargetDate, summary: &mut RunSummary) -> Flow {
        let stage = Stage::UpdateCalendar;
        let index = self.settings.calendar_index.clone();
        let updater = if self.object_store.is_available() {
            let uri = self.paths(date).calendar;
            CalendarIndexUpdater::new(index, self.object_store, uri)
        } else {
            CalendarIndexUpdater::local_only(
                index,
                format!("storage client '{}' not available", self.object_store.name()),
            )
        }
        .backup_failure(self.policy.calendar_backup_failure);

        let report = match updater.update(date) {
            Ok(report) => report,
            Err(e @ CalendarError::Backup { .. }) => {
                summary.abort(stage, e.to_string());
                return ControlFlow::Break(());
            }
            Err(e) => {
                warn!(%stage, error = %e, "calendar update failed");
                summary.record(stage, StepOutcome::Failed(e.to_string()));
                return ControlFlow::Continue(());
            }
        };

        summary.calendar = Some(report.update.clone());
        let mut notes: Vec<String> = report.repairs.iter().map(|r| format!("repaired: {r}")).collect();
        let outcome = match report.update {
            CalendarUpdate::AlreadyPresent => {
                notes.insert(0, "already present; index unchanged".into());
                StepOutcome::Succeeded(notes.join("; "))
            }
            CalendarUpdate::Added { republish } => {
                notes.insert(0, format!("added ({} dates)", report.total_dates));
                match republish {
                    RepublishStatus::Published => StepOutcome::Succeeded(notes.join("; ")),
                    RepublishStatus::Skipped(reason) => {
                        notes.push(format!("republish skipped: {reason}"));
                        StepOutcome::Warning(notes.join("; "))
                    }
                    RepublishStatus::Failed(reason) => {
                        notes.push(format!("republish failed: {reason}"));
                        StepOutcome::Warning(notes.join("; "))
                    }
                }
            }
        };
        summary.record(stage, outcome);
        ControlFlow::Continue(())
    }
}
