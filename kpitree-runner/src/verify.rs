//! Post-generation checks on the report artifact.

use std::path::{Path, PathBuf};
use thiserror::Error;

use kpitree_core::date::{DateMarker, TargetDate};

#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("generated artifact not found at {0}")]
    MissingArtifact(PathBuf),

    #[error("cannot read artifact {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyOutcome {
    MarkerPresent,
    MarkerMissing { expected: String },
}

/// Check that `artifact` exists and whether it carries the date marker.
///
/// The content is decoded lossily; a generator emitting a stray invalid byte
/// should not hide an otherwise correct marker.
pub fn verify_artifact(
    artifact: &Path,
    date: &TargetDate,
    marker: &DateMarker,
) -> Result<VerifyOutcome, VerifyError> {
    if !artifact.is_file() {
        return Err(VerifyError::MissingArtifact(artifact.to_path_buf()));
    }
    let bytes = std::fs::read(artifact).map_err(|source| VerifyError::Unreadable {
        path: artifact.to_path_buf(),
        source,
    })?;
    let content = String::from_utf8_lossy(&bytes);
    if marker.is_present_in(&content, date) {
        Ok(VerifyOutcome::MarkerPresent)
    } else {
        Ok(VerifyOutcome::MarkerMissing {
            expected: marker.render(date),
        })
    }
}
