//! Object store that mirrors `scheme://bucket/key` into a local directory.
//!
//! `gs://viewer/reports/20250509.html` lands at
//! `<root>/viewer/reports/20250509.html`. Useful for staging a publication
//! before pointing it at a real bucket.

use std::path::{Path, PathBuf};

use kpitree_core::collab::{ObjectStore, StorageError};
use kpitree_core::paths::ObjectUri;

#[derive(Debug, Clone)]
pub struct LocalDirStore {
    root: PathBuf,
}

impl LocalDirStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Local file backing an object.
    pub fn object_path(&self, uri: &ObjectUri) -> PathBuf {
        let mut path = self.root.join(uri.bucket());
        for part in uri.key().split('/').filter(|p| !p.is_empty() && *p != "..") {
            path.push(part);
        }
        path
    }
}

impl ObjectStore for LocalDirStore {
    fn name(&self) -> &str {
        "local"
    }

    fn is_available(&self) -> bool {
        true
    }

    fn probe(&self, base: &ObjectUri) -> Result<(), StorageError> {
        let dir = self.object_path(base);
        std::fs::create_dir_all(&dir).map_err(|e| StorageError::Unauthorized {
            uri: base.to_string(),
            reason: format!("cannot create {}: {e}", dir.display()),
        })
    }

    fn upload(&self, source: &Path, dest: &ObjectUri) -> Result<(), StorageError> {
        let target = self.object_path(dest);
        let result = target
            .parent()
            .map(std::fs::create_dir_all)
            .transpose()
            .and_then(|_| std::fs::copy(source, &target));
        result.map(|_| ()).map_err(|e| StorageError::UploadFailed {
            uri: dest.to_string(),
            reason: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upload_mirrors_key_layout() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalDirStore::new(dir.path().join("mirror"));
        let src = dir.path().join("index.html");
        std::fs::write(&src, "<html>report</html>").unwrap();

        let base = ObjectUri::parse("gs://viewer").unwrap();
        store.probe(&base).unwrap();
        let dest = base.join("reports/20250509.html");
        store.upload(&src, &dest).unwrap();

        let landed = dir.path().join("mirror/viewer/reports/20250509.html");
        assert_eq!(store.object_path(&dest), landed);
        assert_eq!(std::fs::read_to_string(landed).unwrap(), "<html>report</html>");
    }

    #[test]
    fn upload_of_missing_source_fails() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalDirStore::new(dir.path());
        let dest = ObjectUri::parse("gs://viewer/index.html").unwrap();
        assert!(matches!(
            store.upload(&dir.path().join("nope.html"), &dest),
            Err(StorageError::UploadFailed { .. })
        ));
    }

    #[test]
    fn parent_segments_are_ignored() {
        let store = LocalDirStore::new("/mirror");
        let uri = ObjectUri::parse("gs://b/../../etc/passwd").unwrap();
        assert_eq!(store.object_path(&uri), PathBuf::from("/mirror/b/etc/passwd"));
    }
}
