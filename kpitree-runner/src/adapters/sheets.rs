//! Query store backed by a Google Sheets cell (the data connector's query).
//!
//! Reads a configured A1 range through the Sheets v4 values API, locates the
//! first cell holding the `SET target_date = DATE` statement, and writes the
//! rewritten query back to that same cell.

use reqwest::blocking::Client;
use reqwest::Url;
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::debug;

use kpitree_core::collab::{QueryStore, QueryStoreError, StoredQuery};
use kpitree_core::query::ASSIGNMENT_NEEDLE;

use super::failure_reason;

pub const SHEETS_API_BASE: &str = "https://sheets.googleapis.com/v4/spreadsheets";

/// Supplies OAuth bearer tokens.
pub trait TokenSource: Send + Sync {
    fn access_token(&self) -> Result<String, QueryStoreError>;
}

/// Fixed token, e.g. from an environment variable.
#[derive(Debug, Clone)]
pub struct StaticToken(pub String);

impl TokenSource for StaticToken {
    fn access_token(&self) -> Result<String, QueryStoreError> {
        Ok(self.0.clone())
    }
}

/// Mints tokens with `gcloud auth print-access-token`, pointing gcloud at the
/// service-account key through `CLOUDSDK_AUTH_CREDENTIAL_FILE_OVERRIDE`.
#[derive(Debug, Clone)]
pub struct GcloudTokenSource {
    program: String,
    credential: PathBuf,
}

impl GcloudTokenSource {
    pub fn new(program: impl Into<String>, credential: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            credential: credential.into(),
        }
    }
}

impl TokenSource for GcloudTokenSource {
    fn access_token(&self) -> Result<String, QueryStoreError> {
        let output = Command::new(&self.program)
            .args(["auth", "print-access-token"])
            .env("CLOUDSDK_AUTH_CREDENTIAL_FILE_OVERRIDE", &self.credential)
            .output()
            .map_err(|e| QueryStoreError::Credential(format!("cannot run {}: {e}", self.program)))?;
        if !output.status.success() {
            return Err(QueryStoreError::Credential(failure_reason(&output)));
        }
        let token = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if token.is_empty() {
            return Err(QueryStoreError::Credential(
                "gcloud returned an empty access token".into(),
            ));
        }
        Ok(token)
    }
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    range: Option<String>,
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

pub struct SheetsQueryStore {
    client: Client,
    api_base: String,
    spreadsheet_id: String,
    range: String,
    credential: PathBuf,
    token: Box<dyn TokenSource>,
}

impl SheetsQueryStore {
    pub fn new(
        spreadsheet_id: impl Into<String>,
        range: impl Into<String>,
        credential: impl Into<PathBuf>,
        token: Box<dyn TokenSource>,
    ) -> Result<Self, QueryStoreError> {
        let client = Client::builder()
            .build()
            .map_err(|e| QueryStoreError::Unreachable(e.to_string()))?;
        Ok(Self {
            client,
            api_base: SHEETS_API_BASE.to_string(),
            spreadsheet_id: spreadsheet_id.into(),
            range: range.into(),
            credential: credential.into(),
            token,
        })
    }

    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into();
        self
    }

    /// `<api_base>/<id>/values/<range>` with the range percent-encoded.
    pub fn values_url(&self, range: &str) -> Result<Url, QueryStoreError> {
        let mut url = Url::parse(&self.api_base)
            .map_err(|e| QueryStoreError::Unreachable(format!("bad API base: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| QueryStoreError::Unreachable("API base cannot hold a path".into()))?
            .pop_if_empty()
            .push(&self.spreadsheet_id)
            .push("values")
            .push(range);
        Ok(url)
    }

    fn check(resp: reqwest::blocking::Response) -> Result<reqwest::blocking::Response, QueryStoreError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().unwrap_or_default();
        Err(QueryStoreError::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}

impl QueryStore for SheetsQueryStore {
    fn name(&self) -> &str {
        "sheets"
    }

    fn credential_path(&self) -> Option<&Path> {
        Some(&self.credential)
    }

    fn load(&self) -> Result<StoredQuery, QueryStoreError> {
        let token = self.token.access_token()?;
        let url = self.values_url(&self.range)?;
        debug!(%url, "reading query range");
        let resp = self
            .client
            .get(url)
            .bearer_auth(token)
            .send()
            .map_err(|e| QueryStoreError::Unreachable(e.to_string()))?;
        let body: ValueRange = Self::check(resp)?
            .json()
            .map_err(|e| QueryStoreError::Unreachable(format!("unexpected response: {e}")))?;

        let range = body.range.as_deref().unwrap_or(&self.range);
        locate_query(range, &body.values).ok_or_else(|| QueryStoreError::QueryNotFound(range.to_string()))
    }

    fn save(&self, query: &StoredQuery, text: &str) -> Result<(), QueryStoreError> {
        let token = self.token.access_token()?;
        let mut url = self.values_url(&query.location)?;
        url.query_pairs_mut().append_pair("valueInputOption", "RAW");
        debug!(%url, "writing query cell");
        let resp = self
            .client
            .put(url)
            .bearer_auth(token)
            .json(&json!({
                "range": query.location,
                "majorDimension": "ROWS",
                "values": [[text]],
            }))
            .send()
            .map_err(|e| QueryStoreError::Unreachable(e.to_string()))?;
        Self::check(resp)?;
        Ok(())
    }

    fn saves_in_place(&self) -> bool {
        true
    }

    fn manual_location(&self) -> String {
        format!(
            "https://docs.google.com/spreadsheets/d/{}/edit",
            self.spreadsheet_id
        )
    }
}

/// Find the first cell holding the assignment statement and return it with
/// its absolute A1 address.
fn locate_query(range: &str, values: &[Vec<Value>]) -> Option<StoredQuery> {
    let (sheet, start_col, start_row) = parse_a1_start(range)?;
    values.iter().enumerate().find_map(|(i, row)| {
        row.iter().enumerate().find_map(|(j, cell)| match cell {
            Value::String(s) if s.contains(ASSIGNMENT_NEEDLE) => Some(StoredQuery {
                text: s.clone(),
                location: format!(
                    "{sheet}!{}{}",
                    column_letters(start_col + j as u32),
                    start_row + i as u32
                ),
            }),
            _ => None,
        })
    })
}

/// Split `Sheet!B3:D10` into (`Sheet`, zero-based column 1, row 3).
fn parse_a1_start(range: &str) -> Option<(String, u32, u32)> {
    let (sheet, cells) = range.rsplit_once('!')?;
    let start = cells.split(':').next()?;
    let letters: String = start.chars().take_while(|c| c.is_ascii_alphabetic()).collect();
    let digits = &start[letters.len()..];
    if letters.is_empty() {
        return None;
    }
    let col = letters
        .to_ascii_uppercase()
        .bytes()
        .fold(0u32, |acc, b| acc * 26 + (b - b'A' + 1) as u32)
        - 1;
    let row = if digits.is_empty() { 1 } else { digits.parse().ok()? };
    Some((sheet.to_string(), col, row))
}

/// Zero-based column index to letters: 0 -> A, 25 -> Z, 26 -> AA.
fn column_letters(mut index: u32) -> String {
    let mut out = Vec::new();
    loop {
        out.push(b'A' + (index % 26) as u8);
        if index < 26 {
            break;
        }
        index = index / 26 - 1;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}
