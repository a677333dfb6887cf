//! Object store backed by the `gsutil` command-line tool.
//!
//! Authentication is whatever the tool is configured with (`gcloud auth
//! login` or an activated service account). Calls block until the tool exits;
//! no timeout is imposed here.

use std::path::Path;
use std::process::Command;
use tracing::debug;

use kpitree_core::collab::{ObjectStore, StorageError};
use kpitree_core::paths::ObjectUri;

use super::{display_command, failure_reason, tool_responds};

#[derive(Debug, Clone)]
pub struct GsutilStore {
    program: String,
}

impl GsutilStore {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for GsutilStore {
    fn default() -> Self {
        Self::new("gsutil")
    }
}

impl ObjectStore for GsutilStore {
    fn name(&self) -> &str {
        "gsutil"
    }

    fn is_available(&self) -> bool {
        tool_responds(&self.program)
    }

    fn probe(&self, base: &ObjectUri) -> Result<(), StorageError> {
        let args = ["ls".to_string(), base.to_string()];
        debug!(command = %display_command(&self.program, &args), "probing storage");
        let output = Command::new(&self.program)
            .args(&args)
            .output()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => StorageError::ToolMissing(self.program.clone()),
                _ => StorageError::Io(e),
            })?;
        if output.status.success() {
            Ok(())
        } else {
            Err(StorageError::Unauthorized {
                uri: base.to_string(),
                reason: failure_reason(&output),
            })
        }
    }

    fn upload(&self, source: &Path, dest: &ObjectUri) -> Result<(), StorageError> {
        let args = [
            "cp".to_string(),
            source.display().to_string(),
            dest.to_string(),
        ];
        debug!(command = %display_command(&self.program, &args), "uploading");
        let output = Command::new(&self.program)
            .args(&args)
            .output()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => StorageError::ToolMissing(self.program.clone()),
                _ => StorageError::Io(e),
            })?;
        if output.status.success() {
            Ok(())
        } else {
            Err(StorageError::UploadFailed {
                uri: dest.to_string(),
                reason: failure_reason(&output),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_binary_is_tool_missing() {
        let store = GsutilStore::new("kpitree-no-such-gsutil");
        assert!(!store.is_available());
        let base = ObjectUri::parse("gs://b").unwrap();
        assert!(matches!(store.probe(&base), Err(StorageError::ToolMissing(_))));
        assert!(matches!(
            store.upload(Path::new("x.html"), &base.join("x.html")),
            Err(StorageError::ToolMissing(_))
        ));
    }
}
