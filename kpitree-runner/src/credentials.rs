//! Service-account credential material.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("credential file {0} not found")]
    Missing(PathBuf),

    #[error("failed to read credential file {path}: {reason}")]
    Unreadable { path: PathBuf, reason: String },

    #[error("credential file {path} is not a service-account key: {reason}")]
    Invalid { path: PathBuf, reason: String },
}

/// The fields of a service-account key file this tool relies on.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServiceAccountKey {
    #[serde(rename = "type")]
    pub key_type: String,
    pub project_id: String,
    pub client_email: String,
}

/// Load and sanity-check a service-account key.
pub fn load_service_account(path: &Path) -> Result<ServiceAccountKey, CredentialError> {
    if !path.exists() {
        return Err(CredentialError::Missing(path.to_path_buf()));
    }
    let text = std::fs::read_to_string(path).map_err(|e| CredentialError::Unreadable {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    let key: ServiceAccountKey =
        serde_json::from_str(&text).map_err(|e| CredentialError::Invalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
    if key.key_type != "service_account" {
        return Err(CredentialError::Invalid {
            path: path.to_path_buf(),
            reason: format!("type is '{}', expected 'service_account'", key.key_type),
        });
    }
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("key.json");
        assert!(matches!(
            load_service_account(&path),
            Err(CredentialError::Missing(p)) if p == path
        ));
    }

    #[test]
    fn valid_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("key.json");
        std::fs::write(
            &path,
            r#"{"type":"service_account","project_id":"p","client_email":"svc@p.iam.gserviceaccount.com","private_key":"x"}"#,
        )
        .unwrap();
        let key = load_service_account(&path).unwrap();
        assert_eq!(key.project_id, "p");
        assert_eq!(key.client_email, "svc@p.iam.gserviceaccount.com");
    }

    #[test]
    fn wrong_type_or_shape() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("key.json");
        std::fs::write(
            &path,
            r#"{"type":"authorized_user","project_id":"p","client_email":"e"}"#,
        )
        .unwrap();
        assert!(matches!(
            load_service_account(&path),
            Err(CredentialError::Invalid { .. })
        ));
        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(
            load_service_account(&path),
            Err(CredentialError::Invalid { .. })
        ));
    }
}
