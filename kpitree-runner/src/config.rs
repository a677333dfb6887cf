//! Serializable publishing configuration (TOML).
//!
//! Every field has a default, so a run works without a config file. Relative
//! paths are resolved against the `DeploymentContext` root.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use kpitree_core::date::{DateMarker, DateStrictness};
use kpitree_core::paths::{ObjectUri, DEFAULT_ALIAS_KEY};

use crate::policy::PolicyOverrides;

/// Errors from loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Top-level configuration document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PublishConfig {
    pub storage: StorageSection,
    pub generator: GeneratorSection,
    pub query: QuerySection,
    pub calendar: CalendarSection,
    pub credentials: CredentialsSection,
    pub policy: PolicyOverrides,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    /// Shell out to `gsutil`.
    Gsutil,
    /// Mirror objects into a local directory.
    Local,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageSection {
    pub backend: StorageBackend,
    pub base: ObjectUri,
    /// Program name for the gsutil backend.
    pub gsutil: String,
    /// Mirror directory for the local backend.
    pub local_root: PathBuf,
    /// Key of the "today" alias, relative to `base`.
    pub today_alias: String,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Gsutil,
            base: ObjectUri::parse("gs://kpi-tree-viewer").expect("default base URI is valid"),
            gsutil: "gsutil".into(),
            local_root: PathBuf::from("bucket-mirror"),
            today_alias: DEFAULT_ALIAS_KEY.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GeneratorSection {
    pub program: String,
    /// Arguments; `{config}` and `{date}` are substituted.
    pub args: Vec<String>,
    /// Generator configuration reference passed as `{config}`.
    pub config: String,
    /// Where the generator writes the HTML report.
    pub artifact: PathBuf,
    pub marker: DateMarker,
}

impl Default for GeneratorSection {
    fn default() -> Self {
        Self {
            program: "node".into(),
            args: vec![
                "src/generator.js".into(),
                "{config}".into(),
                "--date".into(),
                "{date}".into(),
            ],
            config: "config/index.yaml".into(),
            artifact: PathBuf::from("output/index.html"),
            marker: DateMarker::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryBackend {
    /// Google Sheets cell holding the query (data connector source).
    Sheets,
    /// Local SQL template rendered to a separate file.
    File,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct QuerySection {
    pub backend: QueryBackend,
    pub spreadsheet_id: String,
    /// A1 range searched for the assignment statement.
    pub range: String,
    pub template: PathBuf,
    /// Output of the file backend; the template itself is never rewritten.
    pub rendered: PathBuf,
    pub strict_dates: bool,
    /// Shown to the operator while waiting for the external data refresh.
    pub refresh_instructions: Vec<String>,
}

impl Default for QuerySection {
    fn default() -> Self {
        Self {
            backend: QueryBackend::File,
            spreadsheet_id: String::new(),
            range: "データソース!A1:D10".into(),
            template: PathBuf::from("sql/daily_kpi_tree_report.sql"),
            rendered: PathBuf::from("output/daily_kpi_tree_report.sql"),
            strict_dates: false,
            refresh_instructions: vec![
                "Open the spreadsheet that hosts the data connector.".into(),
                "Select the data source sheet and run the connector refresh.".into(),
                "Check that the extracted-data and generator sheets were updated.".into(),
            ],
        }
    }
}

impl QuerySection {
    pub fn strictness(&self) -> DateStrictness {
        if self.strict_dates {
            DateStrictness::Calendar
        } else {
            DateStrictness::Shape
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CalendarSection {
    pub index: PathBuf,
}

impl Default for CalendarSection {
    fn default() -> Self {
        Self {
            index: PathBuf::from("static/calendar-data.json"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CredentialsSection {
    pub service_account: PathBuf,
    /// Program used to mint access tokens.
    pub gcloud: String,
}

impl Default for CredentialsSection {
    fn default() -> Self {
        Self {
            service_account: PathBuf::from("keys/service-account-key.json"),
            gcloud: "gcloud".into(),
        }
    }
}

impl PublishConfig {
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Self::parse_at(text, Path::new("<inline>"))
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse_at(&text, path)
    }

    /// Load `explicit` if given, else `fallback` if it exists, else defaults.
    pub fn load(explicit: Option<&Path>, fallback: &Path) -> Result<Self, ConfigError> {
        match explicit {
            Some(path) => Self::from_file(path),
            None if fallback.exists() => Self::from_file(fallback),
            None => Ok(Self::default()),
        }
    }

    fn parse_at(text: &str, path: &Path) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.generator.program.trim().is_empty() {
            return Err(ConfigError::Invalid("generator.program is empty".into()));
        }
        if !self.generator.args.iter().any(|a| a.contains("{date}")) {
            return Err(ConfigError::Invalid(
                "generator.args must pass the date via a {date} placeholder".into(),
            ));
        }
        if self.query.backend == QueryBackend::Sheets && self.query.spreadsheet_id.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "query.spreadsheet_id is required for the sheets backend".into(),
            ));
        }
        if self.storage.today_alias.trim_matches('/').is_empty() {
            return Err(ConfigError::Invalid("storage.today_alias is empty".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = PublishConfig::default();
        config.validate().unwrap();
        assert_eq!(config.storage.base.to_string(), "gs://kpi-tree-viewer");
        assert_eq!(config.query.backend, QueryBackend::File);
        assert_eq!(config.query.strictness(), DateStrictness::Shape);
    }

    #[test]
    fn empty_toml_is_defaults() {
        assert_eq!(PublishConfig::from_toml("").unwrap(), PublishConfig::default());
    }

    #[test]
    fn parses_full_document() {
        let text = r#"
[storage]
backend = "local"
base = "gs://viewer-prod/kpi"
local_root = "/tmp/mirror"

[generator]
program = "/usr/bin/node"
args = ["gen.js", "--date", "{date}"]
artifact = "out/report.html"
marker = "Data as of {year}-{month}-{day}"

[query]
backend = "sheets"
spreadsheet_id = "abc123"
strict_dates = true

[calendar]
index = "/srv/calendar.json"

[policy]
publish_failure = "fatal"
refresh = "proceed"
"#;
        let config = PublishConfig::from_toml(text).unwrap();
        assert_eq!(config.storage.backend, StorageBackend::Local);
        assert_eq!(config.storage.base.to_string(), "gs://viewer-prod/kpi");
        assert_eq!(config.generator.marker.template(), "Data as of {year}-{month}-{day}");
        assert_eq!(config.query.backend, QueryBackend::Sheets);
        assert_eq!(config.query.strictness(), DateStrictness::Calendar);
        assert_eq!(config.calendar.index, PathBuf::from("/srv/calendar.json"));
        assert_eq!(
            config.policy.publish_failure,
            Some(crate::policy::Severity::Fatal)
        );
    }

    #[test]
    fn rejects_unknown_fields_and_bad_uri() {
        assert!(matches!(
            PublishConfig::from_toml("[storage]\nbucket = \"x\""),
            Err(ConfigError::Parse { .. })
        ));
        assert!(matches!(
            PublishConfig::from_toml("[storage]\nbase = \"not-a-uri\""),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn sheets_backend_needs_spreadsheet() {
        let err = PublishConfig::from_toml("[query]\nbackend = \"sheets\"").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn generator_args_need_date() {
        let err = PublishConfig::from_toml("[generator]\nargs = [\"gen.js\"]").unwrap_err();
        assert!(err.to_string().contains("{date}"));
    }

    #[test]
    fn load_falls_back_to_defaults() {
        let missing = Path::new("/definitely/not/here/kpitree.toml");
        assert_eq!(
            PublishConfig::load(None, missing).unwrap(),
            PublishConfig::default()
        );
        assert!(matches!(
            PublishConfig::load(Some(missing), missing),
            Err(ConfigError::Io { .. })
        ));
    }
}
