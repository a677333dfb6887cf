//! Execution policy: per-stage fatality rules for interactive and unattended runs.
//!
//! The orchestrator is the only place that decides whether a failure aborts
//! the run; it asks the policy. Missing generator executables and missing
//! artifacts abort in every mode and are deliberately absent from this table.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Base execution mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    /// An operator is present and can confirm or abort.
    Interactive,
    /// Scheduled/automated runs; more failures are tolerated.
    Unattended,
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunMode::Interactive => write!(f, "interactive"),
            RunMode::Unattended => write!(f, "unattended"),
        }
    }
}

impl FromStr for RunMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "interactive" => Ok(RunMode::Interactive),
            "unattended" => Ok(RunMode::Unattended),
            other => Err(format!(
                "unknown mode '{other}'. Valid: interactive, unattended"
            )),
        }
    }
}

/// Whether a failure aborts the run or is logged and skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Fatal,
    Skip,
}

/// Behaviour of the wait-for-external-refresh step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshWait {
    /// Block on operator confirmation (no timeout).
    Confirm,
    /// Do not wait; proceed whether or not the refresh completed.
    Proceed,
}

/// Behaviour when the artifact lacks the expected date marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MismatchAction {
    /// Ask the operator whether to continue; a decline aborts.
    Prompt,
    /// Log a warning and continue.
    Continue,
}

/// Per-stage rules for one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionPolicy {
    pub mode: RunMode,
    /// Credential file for the query store absent or unreadable.
    pub missing_credential: Severity,
    /// Query store failures (unreachable, no matching statement). When true the
    /// operator is asked to make the edit by hand and confirm.
    pub manual_query_fallback: bool,
    pub refresh: RefreshWait,
    pub date_mismatch: MismatchAction,
    /// Storage client not installed.
    pub missing_storage_tool: Severity,
    /// Authorization probe or any upload failing.
    pub publish_failure: Severity,
    /// Backing up the calendar index failing.
    pub calendar_backup_failure: Severity,
}

impl ExecutionPolicy {
    pub fn interactive() -> Self {
        Self {
            mode: RunMode::Interactive,
            missing_credential: Severity::Fatal,
            manual_query_fallback: true,
            refresh: RefreshWait::Confirm,
            date_mismatch: MismatchAction::Prompt,
            missing_storage_tool: Severity::Fatal,
            publish_failure: Severity::Fatal,
            calendar_backup_failure: Severity::Fatal,
        }
    }

    pub fn unattended() -> Self {
        Self {
            mode: RunMode::Unattended,
            missing_credential: Severity::Skip,
            manual_query_fallback: false,
            refresh: RefreshWait::Proceed,
            date_mismatch: MismatchAction::Continue,
            missing_storage_tool: Severity::Skip,
            publish_failure: Severity::Skip,
            calendar_backup_failure: Severity::Skip,
        }
    }

    pub fn for_mode(mode: RunMode) -> Self {
        match mode {
            RunMode::Interactive => Self::interactive(),
            RunMode::Unattended => Self::unattended(),
        }
    }

    /// Apply optional overrides from configuration.
    pub fn with_overrides(mut self, o: &PolicyOverrides) -> Self {
        if let Some(v) = o.missing_credential {
            self.missing_credential = v;
        }
        if let Some(v) = o.manual_query_fallback {
            self.manual_query_fallback = v;
        }
        if let Some(v) = o.refresh {
            self.refresh = v;
        }
        if let Some(v) = o.date_mismatch {
            self.date_mismatch = v;
        }
        if let Some(v) = o.missing_storage_tool {
            self.missing_storage_tool = v;
        }
        if let Some(v) = o.publish_failure {
            self.publish_failure = v;
        }
        if let Some(v) = o.calendar_backup_failure {
            self.calendar_backup_failure = v;
        }
        self
    }

    /// Stop at the first failed upload instead of attempting the rest.
    pub fn stop_on_first_upload_failure(&self) -> bool {
        self.publish_failure == Severity::Fatal
    }
}

/// Optional per-field overrides, read from the `[policy]` config section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PolicyOverrides {
    pub missing_credential: Option<Severity>,
    pub manual_query_fallback: Option<bool>,
    pub refresh: Option<RefreshWait>,
    pub date_mismatch: Option<MismatchAction>,
    pub missing_storage_tool: Option<Severity>,
    pub publish_failure: Option<Severity>,
    pub calendar_backup_failure: Option<Severity>,
}
