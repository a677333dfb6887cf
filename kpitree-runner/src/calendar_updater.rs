//! Calendar index maintenance: backup, lenient load, insert-if-absent, atomic
//! write and republish.
//!
//! Runs against one index are serialized with an advisory lock file next to
//! the index (`<index>.lock`). The lock is released when the update returns.

use serde::Serialize;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

use kpitree_core::calendar::{CalendarIndex, Insert, Repair};
use kpitree_core::collab::ObjectStore;
use kpitree_core::date::TargetDate;
use kpitree_core::paths::ObjectUri;

use crate::policy::Severity;

#[derive(Debug, Error)]
pub enum CalendarError {
    #[error("calendar index {0} is locked by another run")]
    Locked(PathBuf),

    #[error("cannot back up calendar index to {path}: {source}")]
    Backup {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot read calendar index {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot write calendar index {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum BackupStatus {
    Created(PathBuf),
    /// No index existed yet, or nothing was written.
    NotNeeded,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum RepublishStatus {
    Published,
    Skipped(String),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum CalendarUpdate {
    Added { republish: RepublishStatus },
    AlreadyPresent,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateReport {
    pub update: CalendarUpdate,
    pub backup: BackupStatus,
    pub repairs: Vec<Repair>,
    /// Number of dates in the index after the update.
    pub total_dates: usize,
}

enum Republish<'a> {
    To {
        store: &'a dyn ObjectStore,
        uri: ObjectUri,
    },
    Disabled(String),
}

pub struct CalendarIndexUpdater<'a> {
    index_path: PathBuf,
    republish: Republish<'a>,
    backup_failure: Severity,
}

impl<'a> CalendarIndexUpdater<'a> {
    /// Updater that republishes the index to `uri` after each change.
    pub fn new(index_path: impl Into<PathBuf>, store: &'a dyn ObjectStore, uri: ObjectUri) -> Self {
        Self {
            index_path: index_path.into(),
            republish: Republish::To { store, uri },
            backup_failure: Severity::Skip,
        }
    }

    /// Updater that only writes locally; republish is reported as skipped.
    pub fn local_only(index_path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self {
            index_path: index_path.into(),
            republish: Republish::Disabled(reason.into()),
            backup_failure: Severity::Skip,
        }
    }

    pub fn backup_failure(mut self, severity: Severity) -> Self {
        self.backup_failure = severity;
        self
    }

    pub fn index_path(&self) -> &Path {
        &self.index_path
    }

    pub fn backup_path(&self) -> PathBuf {
        with_suffix(&self.index_path, ".bak")
    }

    pub fn lock_path(&self) -> PathBuf {
        with_suffix(&self.index_path, ".lock")
    }

    /// Read the index without taking the lock or repairing the file on disk.
    pub fn load(&self) -> Result<CalendarIndex, CalendarError> {
        match fs::read_to_string(&self.index_path) {
            Ok(text) => Ok(CalendarIndex::from_json_lenient(&text)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(CalendarIndex::empty()),
            Err(source) => Err(CalendarError::Read {
                path: self.index_path.clone(),
                source,
            }),
        }
    }

    pub fn update(&self, date: &TargetDate) -> Result<UpdateReport, CalendarError> {
        if let Some(parent) = self.index_path.parent() {
            fs::create_dir_all(parent).map_err(|source| CalendarError::Write {
                path: self.index_path.clone(),
                source,
            })?;
        }
        let _lock = IndexLock::acquire(self.lock_path())?;

        let mut index = self.load()?;
        for repair in index.repairs() {
            warn!(index = %self.index_path.display(), %repair, "repaired calendar index");
        }
        let repairs = index.repairs().to_vec();

        if index.insert(date) == Insert::AlreadyPresent {
            info!(%date, "date already in calendar index; nothing to write");
            return Ok(UpdateReport {
                update: CalendarUpdate::AlreadyPresent,
                backup: BackupStatus::NotNeeded,
                repairs,
                total_dates: index.len(),
            });
        }

        let backup = self.backup()?;
        self.write_atomic(&index)?;
        info!(%date, total = index.len(), "calendar index updated");

        let republish = self.republish();
        Ok(UpdateReport {
            update: CalendarUpdate::Added { republish },
            backup,
            repairs,
            total_dates: index.len(),
        })
    }

    fn backup(&self) -> Result<BackupStatus, CalendarError> {
        if !self.index_path.exists() {
            return Ok(BackupStatus::NotNeeded);
        }
        let backup_path = self.backup_path();
        match fs::copy(&self.index_path, &backup_path) {
            Ok(_) => {
                debug!(backup = %backup_path.display(), "calendar index backed up");
                Ok(BackupStatus::Created(backup_path))
            }
            Err(source) => match self.backup_failure {
                Severity::Fatal => Err(CalendarError::Backup {
                    path: backup_path,
                    source,
                }),
                Severity::Skip => {
                    warn!(backup = %backup_path.display(), error = %source, "calendar backup failed; continuing");
                    Ok(BackupStatus::Failed(source.to_string()))
                }
            },
        }
    }

    fn write_atomic(&self, index: &CalendarIndex) -> Result<(), CalendarError> {
        let tmp = with_suffix(&self.index_path, ".tmp");
        let write = |path: &Path| -> io::Result<()> {
            let mut file = fs::File::create(path)?;
            file.write_all(index.to_json_pretty().as_bytes())?;
            file.sync_all()
        };
        write(&tmp)
            .and_then(|()| fs::rename(&tmp, &self.index_path))
            .map_err(|source| {
                let _ = fs::remove_file(&tmp);
                CalendarError::Write {
                    path: self.index_path.clone(),
                    source,
                }
            })
    }

    fn republish(&self) -> RepublishStatus {
        match &self.republish {
            Republish::Disabled(reason) => {
                info!(%reason, "calendar index republish skipped");
                RepublishStatus::Skipped(reason.clone())
            }
            Republish::To { store, uri } => match store.upload(&self.index_path, uri) {
                Ok(()) => {
                    info!(%uri, "calendar index republished");
                    RepublishStatus::Published
                }
                Err(e) => {
                    warn!(%uri, error = %e, "calendar index republish failed; local index already updated");
                    RepublishStatus::Failed(e.to_string())
                }
            },
        }
    }
}

/// Advisory lock held for the duration of one update.
struct IndexLock {
    path: PathBuf,
}

impl IndexLock {
    fn acquire(path: PathBuf) -> Result<Self, CalendarError> {
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                let _ = writeln!(file, "{}", std::process::id());
                Ok(Self { path })
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Err(CalendarError::Locked(path)),
            Err(source) => Err(CalendarError::Write { path, source }),
        }
    }
}

impl Drop for IndexLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut s = path.as_os_str().to_owned();
    s.push(suffix);
    PathBuf::from(s)
}

#[cfg(test)]
mod tests {
    use super::*;
    use kpitree_core::collab::StorageError;
    use std::cell::RefCell;

    struct FakeStore {
        fail: bool,
        uploads: RefCell<Vec<(String, String)>>,
    }

    impl FakeStore {
        fn new(fail: bool) -> Self {
            Self {
                fail,
                uploads: RefCell::new(Vec::new()),
            }
        }
    }

    impl ObjectStore for FakeStore {
        fn name(&self) -> &str {
            "fake"
        }
        fn is_available(&self) -> bool {
            true
        }
        fn probe(&self, _base: &ObjectUri) -> Result<(), StorageError> {
            Ok(())
        }
        fn upload(&self, source: &Path, dest: &ObjectUri) -> Result<(), StorageError> {
            if self.fail {
                return Err(StorageError::UploadFailed {
                    uri: dest.to_string(),
                    reason: "offline".into(),
                });
            }
            let body = fs::read_to_string(source)?;
            self.uploads.borrow_mut().push((dest.to_string(), body));
            Ok(())
        }
    }

    fn uri() -> ObjectUri {
        ObjectUri::parse("gs://viewer/static/calendar-data.json").unwrap()
    }

    fn date(s: &str) -> TargetDate {
        TargetDate::parse(s).unwrap()
    }

    #[test]
    fn empty_index_gets_first_date() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("static/calendar-data.json");
        let store = FakeStore::new(false);
        let updater = CalendarIndexUpdater::new(&path, &store, uri());

        let report = updater.update(&date("2025-05-09")).unwrap();
        assert_eq!(
            report.update,
            CalendarUpdate::Added {
                republish: RepublishStatus::Published
            }
        );
        assert_eq!(report.backup, BackupStatus::NotNeeded);
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "{\n  \"datesWithData\": [\n    \"2025-05-09\"\n  ]\n}\n"
        );
        assert_eq!(store.uploads.borrow().len(), 1);
        assert!(!updater.lock_path().exists());
    }

    #[test]
    fn already_present_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("calendar-data.json");
        let original = "{\"datesWithData\": [\"2025-05-08\", \"2025-05-09\"]}";
        fs::write(&path, original).unwrap();
        let store = FakeStore::new(false);

        let report = CalendarIndexUpdater::new(&path, &store, uri())
            .update(&date("2025-05-09"))
            .unwrap();
        assert_eq!(report.update, CalendarUpdate::AlreadyPresent);
        assert_eq!(report.backup, BackupStatus::NotNeeded);
        assert_eq!(report.total_dates, 2);
        assert_eq!(fs::read_to_string(&path).unwrap(), original);
        assert!(!dir.path().join("calendar-data.json.bak").exists());
        assert!(store.uploads.borrow().is_empty());
    }

    #[test]
    fn backup_holds_previous_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("calendar-data.json");
        fs::write(&path, "{\"datesWithData\": [\"2025-05-08\"]}").unwrap();

        let updater = CalendarIndexUpdater::local_only(&path, "disabled");
        let report = updater.update(&date("2025-05-09")).unwrap();
        assert_eq!(report.backup, BackupStatus::Created(updater.backup_path()));
        assert_eq!(
            fs::read_to_string(updater.backup_path()).unwrap(),
            "{\"datesWithData\": [\"2025-05-08\"]}"
        );
        assert_eq!(
            report.update,
            CalendarUpdate::Added {
                republish: RepublishStatus::Skipped("disabled".into())
            }
        );
        let index = updater.load().unwrap();
        assert_eq!(index.dates().collect::<Vec<_>>(), ["2025-05-08", "2025-05-09"]);
    }

    #[test]
    fn repairs_non_list_field() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("calendar-data.json");
        fs::write(&path, "{\"datesWithData\": \"not-a-list\"}").unwrap();

        let report = CalendarIndexUpdater::local_only(&path, "off")
            .update(&date("2025-05-09"))
            .unwrap();
        assert_eq!(report.repairs, [Repair::FieldNotAList]);
        let written: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written, serde_json::json!({"datesWithData": ["2025-05-09"]}));
    }

    #[test]
    fn backup_failure_follows_severity() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("calendar-data.json");
        let original = "{\"datesWithData\": [\"2025-05-08\"]}";
        fs::write(&path, original).unwrap();
        let blocked = CalendarIndexUpdater::local_only(&path, "off");
        fs::create_dir(blocked.backup_path()).unwrap();

        let err = CalendarIndexUpdater::local_only(&path, "off")
            .backup_failure(Severity::Fatal)
            .update(&date("2025-05-09"))
            .unwrap_err();
        assert!(matches!(err, CalendarError::Backup { .. }));
        assert_eq!(fs::read_to_string(&path).unwrap(), original);
        assert!(!blocked.lock_path().exists());

        // A date already present needs no backup, so the blocked path is irrelevant.
        let present = CalendarIndexUpdater::local_only(&path, "off")
            .backup_failure(Severity::Fatal)
            .update(&date("2025-05-08"))
            .unwrap();
        assert_eq!(present.update, CalendarUpdate::AlreadyPresent);

        let report = CalendarIndexUpdater::local_only(&path, "off")
            .backup_failure(Severity::Skip)
            .update(&date("2025-05-09"))
            .unwrap();
        assert!(matches!(report.backup, BackupStatus::Failed(_)));
        assert_eq!(report.total_dates, 2);
    }

    #[test]
    fn republish_failure_keeps_local_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("calendar-data.json");
        let store = FakeStore::new(true);

        let updater = CalendarIndexUpdater::new(&path, &store, uri());
        let report = updater.update(&date("2025-05-09")).unwrap();
        assert!(matches!(
            report.update,
            CalendarUpdate::Added {
                republish: RepublishStatus::Failed(_)
            }
        ));
        assert!(updater.load().unwrap().contains(&date("2025-05-09")));

        // The next run sees the date and does not retry the republish.
        let again = updater.update(&date("2025-05-09")).unwrap();
        assert_eq!(again.update, CalendarUpdate::AlreadyPresent);
    }

    #[test]
    fn held_lock_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("calendar-data.json");
        let updater = CalendarIndexUpdater::local_only(&path, "off");
        fs::write(updater.lock_path(), "4242").unwrap();

        let err = updater.update(&date("2025-05-09")).unwrap_err();
        assert!(matches!(err, CalendarError::Locked(_)));
        assert!(!path.exists());
        // A foreign lock is left in place.
        assert!(updater.lock_path().exists());
    }

    #[test]
    fn lock_released_after_update() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("calendar-data.json");
        let updater = CalendarIndexUpdater::local_only(&path, "off");
        updater.update(&date("2025-05-09")).unwrap();
        updater.update(&date("2025-05-10")).unwrap();
        assert_eq!(updater.load().unwrap().len(), 2);
        assert!(!updater.lock_path().exists());
        assert!(!with_suffix(&path, ".tmp").exists());
    }
}
