//! Run summary: every stage's outcome plus the resolved publication locations
//! and whether each one was actually written.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

use kpitree_core::paths::{ObjectUri, PublicationPaths};

use crate::calendar_updater::{CalendarUpdate, RepublishStatus};
use crate::policy::RunMode;
use crate::publisher::{UploadReport, UploadStatus, UploadTarget};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Validate,
    ParameterizeQuery,
    AwaitExternalDataRefresh,
    Generate,
    VerifyArtifact,
    Publish,
    UpdateCalendar,
}

impl Stage {
    pub const ALL: [Stage; 7] = [
        Stage::Validate,
        Stage::ParameterizeQuery,
        Stage::AwaitExternalDataRefresh,
        Stage::Generate,
        Stage::VerifyArtifact,
        Stage::Publish,
        Stage::UpdateCalendar,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Stage::Validate => "validate",
            Stage::ParameterizeQuery => "parameterize query",
            Stage::AwaitExternalDataRefresh => "await data refresh",
            Stage::Generate => "generate",
            Stage::VerifyArtifact => "verify artifact",
            Stage::Publish => "publish",
            Stage::UpdateCalendar => "update calendar",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum StepOutcome {
    Succeeded(String),
    Warning(String),
    Skipped(String),
    Failed(String),
}

impl StepOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            StepOutcome::Succeeded(_) => "ok",
            StepOutcome::Warning(_) => "warning",
            StepOutcome::Skipped(_) => "skipped",
            StepOutcome::Failed(_) => "FAILED",
        }
    }

    pub fn detail(&self) -> &str {
        match self {
            StepOutcome::Succeeded(d)
            | StepOutcome::Warning(d)
            | StepOutcome::Skipped(d)
            | StepOutcome::Failed(d) => d,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepRecord {
    pub stage: Stage,
    #[serde(flatten)]
    pub outcome: StepOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    Aborted { stage: Stage, reason: String },
}

/// What this run did to a publication location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationState {
    Published,
    /// Left as the previous run published it.
    Unchanged,
    NotPublished,
}

impl LocationState {
    pub fn label(&self) -> &'static str {
        match self {
            LocationState::Published => "published",
            LocationState::Unchanged => "unchanged",
            LocationState::NotPublished => "not published",
        }
    }
}

/// One resolved publication location, with its public URL when the scheme has one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublishedLocation {
    pub label: &'static str,
    pub uri: ObjectUri,
    pub public_url: Option<String>,
    pub state: LocationState,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// The date as given on input; it may be the malformed string that aborted the run.
    pub date: String,
    pub mode: RunMode,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub steps: Vec<StepRecord>,
    pub paths: Option<PublicationPaths>,
    pub artifact_blake3: Option<String>,
    /// Per-target results of the publish stage; empty when it did not upload.
    pub uploads: Vec<UploadReport>,
    pub calendar: Option<CalendarUpdate>,
    pub status: RunStatus,
}

impl RunSummary {
    pub fn new(date: impl Into<String>, mode: RunMode) -> Self {
        Self {
            date: date.into(),
            mode,
            started_at: Utc::now(),
            finished_at: None,
            steps: Vec::new(),
            paths: None,
            artifact_blake3: None,
            uploads: Vec::new(),
            calendar: None,
            status: RunStatus::Completed,
        }
    }

    pub fn record(&mut self, stage: Stage, outcome: StepOutcome) {
        self.steps.push(StepRecord { stage, outcome });
    }

    pub fn abort(&mut self, stage: Stage, reason: impl Into<String>) {
        let reason = reason.into();
        self.record(stage, StepOutcome::Failed(reason.clone()));
        self.status = RunStatus::Aborted { stage, reason };
    }

    pub fn finish(mut self) -> Self {
        self.finished_at = Some(Utc::now());
        self
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self.status, RunStatus::Aborted { .. })
    }

    pub fn exit_code(&self) -> i32 {
        if self.is_aborted() {
            1
        } else {
            0
        }
    }

    /// Outcome of `stage`, if it ran. A stage recorded more than once reports its last outcome.
    pub fn outcome(&self, stage: Stage) -> Option<&StepOutcome> {
        self.steps
            .iter()
            .rev()
            .find(|s| s.stage == stage)
            .map(|s| &s.outcome)
    }

    pub fn locations(&self) -> Vec<PublishedLocation> {
        let Some(paths) = &self.paths else {
            return Vec::new();
        };
        let mut out = vec![
            ("latest", &paths.latest, self.upload_state(UploadTarget::Latest)),
            ("archive", &paths.archive, self.upload_state(UploadTarget::Archive)),
        ];
        if let Some(alias) = &paths.alias {
            out.push(("today", alias, self.upload_state(UploadTarget::Alias)));
        }
        let calendar = match &self.calendar {
            Some(CalendarUpdate::Added {
                republish: RepublishStatus::Published,
            }) => LocationState::Published,
            Some(CalendarUpdate::AlreadyPresent) => LocationState::Unchanged,
            _ => LocationState::NotPublished,
        };
        out.push(("calendar", &paths.calendar, calendar));
        out.into_iter()
            .map(|(label, uri, state)| PublishedLocation {
                label,
                uri: uri.clone(),
                public_url: uri.public_url(),
                state,
            })
            .collect()
    }

    fn upload_state(&self, target: UploadTarget) -> LocationState {
        let uploaded = self
            .uploads
            .iter()
            .any(|u| u.target == target && u.status == UploadStatus::Uploaded);
        if uploaded {
            LocationState::Published
        } else {
            LocationState::NotPublished
        }
    }

    /// Fixed-width table of every step, followed by the publication locations.
    pub fn render_table(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("=== KPI tree run: {} ({}) ===\n", self.date, self.mode));
        out.push_str(&format!("{:<20} {:<8} {}\n", "Step", "Result", "Detail"));
        out.push_str(&format!("{}\n", "-".repeat(60)));
        for step in &self.steps {
            out.push_str(&format!(
                "{:<20} {:<8} {}\n",
                step.stage.label(),
                step.outcome.label(),
                step.outcome.detail()
            ));
        }
        for stage in Stage::ALL {
            if self.outcome(stage).is_none() {
                out.push_str(&format!("{:<20} {:<8}\n", stage.label(), "not run"));
            }
        }

        let locations = self.locations();
        if !locations.is_empty() {
            out.push('\n');
            for loc in &locations {
                let line = format!("{:<9} {:<14} {}", loc.label, loc.state.label(), loc.uri);
                match &loc.public_url {
                    Some(url) => out.push_str(&format!("{line}  ({url})\n")),
                    None => out.push_str(&format!("{line}\n")),
                }
            }
        }
        if let Some(digest) = &self.artifact_blake3 {
            out.push_str(&format!("{:<9} {digest}\n", "blake3"));
        }

        out.push('\n');
        match &self.status {
            RunStatus::Completed => out.push_str("Status: completed\n"),
            RunStatus::Aborted { stage, reason } => {
                out.push_str(&format!("Status: ABORTED at {stage}: {reason}\n"))
            }
        }
        out
    }
}
