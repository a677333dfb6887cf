//! Query store backed by a local SQL template.
//!
//! The template is read-only; the parameterized query is written to a separate
//! file that downstream tooling executes.

use std::path::{Path, PathBuf};

use kpitree_core::collab::{QueryStore, QueryStoreError, StoredQuery};

#[derive(Debug, Clone)]
pub struct FileQueryStore {
    template: PathBuf,
    rendered: PathBuf,
}

impl FileQueryStore {
    pub fn new(template: impl Into<PathBuf>, rendered: impl Into<PathBuf>) -> Self {
        Self {
            template: template.into(),
            rendered: rendered.into(),
        }
    }

    pub fn rendered(&self) -> &Path {
        &self.rendered
    }
}

impl QueryStore for FileQueryStore {
    fn name(&self) -> &str {
        "file"
    }

    fn load(&self) -> Result<StoredQuery, QueryStoreError> {
        let text = std::fs::read_to_string(&self.template)?;
        Ok(StoredQuery {
            text,
            location: self.template.display().to_string(),
        })
    }

    fn save(&self, _query: &StoredQuery, text: &str) -> Result<(), QueryStoreError> {
        if let Some(parent) = self.rendered.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.rendered, text)?;
        Ok(())
    }

    fn manual_location(&self) -> String {
        self.rendered.display().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_is_never_rewritten() {
        let dir = tempfile::tempdir().unwrap();
        let template = dir.path().join("sql/report.sql");
        let rendered = dir.path().join("out/report.sql");
        std::fs::create_dir_all(template.parent().unwrap()).unwrap();
        std::fs::write(&template, "SET target_date = DATE '2025-05-09';").unwrap();

        let store = FileQueryStore::new(&template, &rendered);
        assert!(!store.saves_in_place());
        let query = store.load().unwrap();
        store
            .save(&query, "SET target_date = DATE '2025-06-01';")
            .unwrap();

        assert_eq!(
            std::fs::read_to_string(&template).unwrap(),
            "SET target_date = DATE '2025-05-09';"
        );
        assert_eq!(
            std::fs::read_to_string(&rendered).unwrap(),
            "SET target_date = DATE '2025-06-01';"
        );
    }

    #[test]
    fn missing_template_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileQueryStore::new(dir.path().join("nope.sql"), dir.path().join("out.sql"));
        assert!(matches!(store.load(), Err(QueryStoreError::Io(_))));
    }
}
