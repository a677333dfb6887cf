//! Artifact publication: latest, archive, and optional "today" alias uploads.
//!
//! The authorization probe runs first; if it fails nothing is uploaded. After
//! that each upload is independent and reported on its own. With
//! `stop_on_first_failure` the remaining uploads are marked not attempted.

use serde::Serialize;
use std::fmt;
use std::path::Path;
use thiserror::Error;
use tracing::{info, warn};

use kpitree_core::collab::{ObjectStore, StorageError};
use kpitree_core::date::TargetDate;
use kpitree_core::paths::{ObjectUri, PublicationPaths};

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("publish unauthorized: {0}")]
    Unauthorized(StorageError),

    #[error("cannot read artifact {path}: {source}")]
    ArtifactUnreadable {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadTarget {
    Latest,
    Archive,
    Alias,
}

impl fmt::Display for UploadTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UploadTarget::Latest => write!(f, "latest"),
            UploadTarget::Archive => write!(f, "archive"),
            UploadTarget::Alias => write!(f, "today alias"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum UploadStatus {
    Uploaded,
    Failed(String),
    NotAttempted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadReport {
    pub target: UploadTarget,
    pub uri: ObjectUri,
    pub status: UploadStatus,
}

/// Outcome of one publish call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublishReport {
    pub paths: PublicationPaths,
    /// BLAKE3 hex digest of the artifact bytes.
    pub digest: String,
    pub size_bytes: u64,
    pub uploads: Vec<UploadReport>,
}

impl PublishReport {
    pub fn all_uploaded(&self) -> bool {
        self.uploads.iter().all(|u| u.status == UploadStatus::Uploaded)
    }

    pub fn failures(&self) -> impl Iterator<Item = &UploadReport> {
        self.uploads
            .iter()
            .filter(|u| matches!(u.status, UploadStatus::Failed(_)))
    }
}

pub struct ArtifactPublisher<'a> {
    store: &'a dyn ObjectStore,
    base: ObjectUri,
    alias_key: String,
    stop_on_first_failure: bool,
}

impl<'a> ArtifactPublisher<'a> {
    pub fn new(store: &'a dyn ObjectStore, base: ObjectUri, alias_key: impl Into<String>) -> Self {
        Self {
            store,
            base,
            alias_key: alias_key.into(),
            stop_on_first_failure: false,
        }
    }

    pub fn stop_on_first_failure(mut self, stop: bool) -> Self {
        self.stop_on_first_failure = stop;
        self
    }

    pub fn paths(&self, date: &TargetDate, alias: bool) -> PublicationPaths {
        PublicationPaths::derive(&self.base, date, alias.then_some(self.alias_key.as_str()))
    }

    pub fn publish(
        &self,
        artifact: &Path,
        date: &TargetDate,
        alias: bool,
    ) -> Result<PublishReport, PublishError> {
        let bytes = std::fs::read(artifact).map_err(|source| PublishError::ArtifactUnreadable {
            path: artifact.display().to_string(),
            source,
        })?;
        let digest = blake3::hash(&bytes).to_hex().to_string();
        let paths = self.paths(date, alias);

        self.store
            .probe(&self.base)
            .map_err(PublishError::Unauthorized)?;

        let mut targets = vec![
            (UploadTarget::Latest, paths.latest.clone()),
            (UploadTarget::Archive, paths.archive.clone()),
        ];
        if let Some(alias_uri) = &paths.alias {
            targets.push((UploadTarget::Alias, alias_uri.clone()));
        }

        let mut uploads = Vec::with_capacity(targets.len());
        let mut halted = false;
        for (target, uri) in targets {
            if halted {
                uploads.push(UploadReport {
                    target,
                    uri,
                    status: UploadStatus::NotAttempted,
                });
                continue;
            }
            info!(%target, %uri, "uploading report");
            let status = match self.store.upload(artifact, &uri) {
                Ok(()) => UploadStatus::Uploaded,
                Err(e) => {
                    warn!(%target, %uri, error = %e, "upload failed");
                    halted = self.stop_on_first_failure;
                    UploadStatus::Failed(e.to_string())
                }
            };
            uploads.push(UploadReport { target, uri, status });
        }

        Ok(PublishReport {
            paths,
            digest,
            size_bytes: bytes.len() as u64,
            uploads,
        })
    }
}
