//! Collaborator traits and their structured error types.
//!
//! Everything that touches the outside world sits behind one of these traits:
//! the report generator process, object storage, the store holding the
//! analytical query, and the operator. The runner crate provides real
//! implementations; tests substitute in-memory ones.

use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::date::TargetDate;
use crate::paths::ObjectUri;

/// Errors from invoking the report generator.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("generator executable '{0}' not found")]
    ExecutableMissing(String),

    #[error("generator exited unsuccessfully ({status})")]
    Failed { status: String },

    #[error("failed to launch generator: {0}")]
    Launch(String),

    #[error("could not clear stale artifact {path}: {reason}")]
    StaleArtifact { path: PathBuf, reason: String },
}

/// Renders the HTML report for a date.
///
/// On success the artifact is expected at the returned path; the caller
/// verifies that it exists. A generator that cannot be launched reports
/// [`GenerationError::ExecutableMissing`] from `generate`.
pub trait ReportGenerator {
    /// Human-readable name, used in logs.
    fn name(&self) -> &str;

    fn generate(&self, date: &TargetDate) -> Result<PathBuf, GenerationError>;
}

/// Errors from object storage.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage tool '{0}' is not available")]
    ToolMissing(String),

    #[error("not authorized for {uri}: {reason}")]
    Unauthorized { uri: String, reason: String },

    #[error("upload to {uri} failed: {reason}")]
    UploadFailed { uri: String, reason: String },

    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Remote object storage.
pub trait ObjectStore {
    fn name(&self) -> &str;

    /// Whether the backing client (CLI tool, SDK) is present.
    fn is_available(&self) -> bool;

    /// Check that `base` is reachable and writable by the current identity.
    fn probe(&self, base: &ObjectUri) -> Result<(), StorageError>;

    /// Copy a local file to `dest`, overwriting.
    fn upload(&self, source: &Path, dest: &ObjectUri) -> Result<(), StorageError>;
}

/// Errors from the store holding the analytical query.
#[derive(Debug, Error)]
pub enum QueryStoreError {
    #[error("credential unavailable: {0}")]
    Credential(String),

    #[error("query store unreachable: {0}")]
    Unreachable(String),

    #[error("query store rejected the request ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("no query containing the target_date assignment was found in {0}")]
    QueryNotFound(String),

    #[error("query store I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A query as read from its store, with enough location detail to write it back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredQuery {
    pub text: String,
    /// Where the text lives (a cell reference, a file path).
    pub location: String,
}

/// Where the parameterized query is read from and written to.
pub trait QueryStore {
    fn name(&self) -> &str;

    /// Credential file this store needs, if any.
    fn credential_path(&self) -> Option<&Path> {
        None
    }

    fn load(&self) -> Result<StoredQuery, QueryStoreError>;

    /// Persist the rewritten text for the query previously loaded.
    fn save(&self, query: &StoredQuery, text: &str) -> Result<(), QueryStoreError>;

    /// Whether `save` overwrites the text `load` read. Such a store already
    /// holds an unchanged query, so saving it again is skipped.
    fn saves_in_place(&self) -> bool {
        false
    }

    /// Human-facing link or path for manual edits.
    fn manual_location(&self) -> String;
}

/// The one blocking, operator-paced step: ask a human to confirm.
pub trait HumanGate {
    /// Present `prompt` and return whether the operator confirmed.
    fn confirm(&self, prompt: &str) -> bool;
}

/// Gate that answers without asking; used by unattended runs.
#[derive(Debug, Clone, Copy)]
pub struct AutoGate {
    pub answer: bool,
}

impl AutoGate {
    pub fn approve() -> Self {
        Self { answer: true }
    }

    pub fn decline() -> Self {
        Self { answer: false }
    }
}

impl HumanGate for AutoGate {
    fn confirm(&self, _prompt: &str) -> bool {
        self.answer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auto_gate_answers_fixed() {
        assert!(AutoGate::approve().confirm("continue?"));
        assert!(!AutoGate::decline().confirm("continue?"));
    }

    #[test]
    fn errors_are_displayable() {
        let e = StorageError::Unauthorized {
            uri: "gs://b".into(),
            reason: "AccessDenied".into(),
        };
        assert_eq!(e.to_string(), "not authorized for gs://b: AccessDenied");
        let e = GenerationError::ExecutableMissing("node".into());
        assert_eq!(e.to_string(), "generator executable 'node' not found");
    }
}
