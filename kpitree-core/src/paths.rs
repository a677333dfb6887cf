//! Object storage URIs and the publication layout derived from a target date.
//!
//! Layout under the base location:
//! - `index.html`: latest report, overwritten every run
//! - `reports/<YYYYMMDD>.html`: permanent archive for one date
//! - `static/calendar-data.json`: mirror of the calendar index
//! - optional "today" alias, relative path configurable

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::date::TargetDate;

pub const LATEST_KEY: &str = "index.html";
pub const ARCHIVE_PREFIX: &str = "reports";
pub const CALENDAR_KEY: &str = "static/calendar-data.json";
pub const DEFAULT_ALIAS_KEY: &str = "today.html";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UriError {
    #[error("object URI must look like scheme://bucket[/prefix], got '{0}'")]
    Malformed(String),
}

/// An object storage location such as `gs://bucket/prefix/key`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ObjectUri {
    scheme: String,
    bucket: String,
    key: String,
}

impl ObjectUri {
    pub fn parse(s: &str) -> Result<Self, UriError> {
        let (scheme, rest) = s
            .split_once("://")
            .ok_or_else(|| UriError::Malformed(s.to_string()))?;
        let rest = rest.trim_end_matches('/');
        let (bucket, key) = match rest.split_once('/') {
            Some((b, k)) => (b, k.trim_matches('/')),
            None => (rest, ""),
        };
        if scheme.is_empty() || bucket.is_empty() {
            return Err(UriError::Malformed(s.to_string()));
        }
        Ok(Self {
            scheme: scheme.to_string(),
            bucket: bucket.to_string(),
            key: key.to_string(),
        })
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Object key relative to the bucket; empty for the bucket root.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Append a relative key, normalizing slashes.
    pub fn join(&self, relative: &str) -> Self {
        let relative = relative.trim_matches('/');
        let key = match (self.key.is_empty(), relative.is_empty()) {
            (_, true) => self.key.clone(),
            (true, false) => relative.to_string(),
            (false, false) => format!("{}/{}", self.key, relative),
        };
        Self {
            scheme: self.scheme.clone(),
            bucket: self.bucket.clone(),
            key,
        }
    }

    /// Public HTTPS form for Google Cloud Storage objects; `None` for other schemes.
    pub fn public_url(&self) -> Option<String> {
        (self.scheme == "gs").then(|| {
            if self.key.is_empty() {
                format!("https://storage.googleapis.com/{}", self.bucket)
            } else {
                format!("https://storage.googleapis.com/{}/{}", self.bucket, self.key)
            }
        })
    }
}

impl fmt::Display for ObjectUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.key.is_empty() {
            write!(f, "{}://{}", self.scheme, self.bucket)
        } else {
            write!(f, "{}://{}/{}", self.scheme, self.bucket, self.key)
        }
    }
}

impl TryFrom<String> for ObjectUri {
    type Error = UriError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ObjectUri> for String {
    fn from(uri: ObjectUri) -> Self {
        uri.to_string()
    }
}

/// Every remote location a run writes to, derived from the date and base.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicationPaths {
    pub base: ObjectUri,
    pub latest: ObjectUri,
    pub archive: ObjectUri,
    pub alias: Option<ObjectUri>,
    pub calendar: ObjectUri,
}

impl PublicationPaths {
    /// Derive paths for `date`. `alias_key` is set only when the run also
    /// publishes the "today" alias.
    pub fn derive(base: &ObjectUri, date: &TargetDate, alias_key: Option<&str>) -> Self {
        Self {
            base: base.clone(),
            latest: base.join(LATEST_KEY),
            archive: base.join(&archive_key(date)),
            alias: alias_key.map(|k| base.join(k)),
            calendar: base.join(CALENDAR_KEY),
        }
    }
}

/// `reports/<YYYYMMDD>.html`
pub fn archive_key(date: &TargetDate) -> String {
    format!("{ARCHIVE_PREFIX}/{}.html", date.compact())
}
