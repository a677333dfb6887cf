//! Date parameterization of the stored analytical query.
//!
//! The query template carries a single assignment statement of the form
//! `SET target_date = DATE '<date>';`. Parameterizing rewrites the date
//! literal of the first such statement and leaves every other byte untouched.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

use crate::date::{DateError, DateStrictness, TargetDate};

/// Marker text used to locate the assignment statement in a cell or file.
pub const ASSIGNMENT_NEEDLE: &str = "SET target_date = DATE";

fn assignment_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"SET\s+target_date\s*=\s*DATE\s*'([^']*)'\s*;")
            .expect("assignment pattern is a valid regex")
    })
}

/// What parameterization did to the template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamStatus {
    /// The date literal was replaced.
    Rewritten,
    /// The statement already carried this date; the text is unchanged.
    AlreadyCurrent,
    /// No assignment statement was found; the text is unchanged.
    TemplateNotMatched,
}

/// Parameterized query text and how it was derived.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameterized {
    pub text: String,
    pub status: ParamStatus,
    /// Date literal found in the template before rewriting, if any.
    pub previous: Option<String>,
}

impl Parameterized {
    pub fn changed(&self) -> bool {
        self.status == ParamStatus::Rewritten
    }
}

/// Substitute `date` into the template's assignment statement.
///
/// Pure and idempotent: applying it twice with the same date yields the same
/// text as applying it once.
pub fn parameterize(template: &str, date: &TargetDate) -> Parameterized {
    let pattern = assignment_pattern();
    let Some(caps) = pattern.captures(template) else {
        return Parameterized {
            text: template.to_string(),
            status: ParamStatus::TemplateNotMatched,
            previous: None,
        };
    };

    let whole = caps.get(0).map(|m| m.range()).unwrap_or_default();
    let previous = caps.get(1).map(|m| m.as_str().to_string());
    let replacement = format!("SET target_date = DATE '{date}';");

    if &template[whole.clone()] == replacement {
        return Parameterized {
            text: template.to_string(),
            status: ParamStatus::AlreadyCurrent,
            previous,
        };
    }

    let mut text = String::with_capacity(template.len());
    text.push_str(&template[..whole.start]);
    text.push_str(&replacement);
    text.push_str(&template[whole.end..]);

    Parameterized {
        text,
        status: ParamStatus::Rewritten,
        previous,
    }
}

/// Validate a raw date string, then parameterize.
///
/// Fails with `DateError` before the template is looked at.
pub fn parameterize_str(
    template: &str,
    raw_date: &str,
    strictness: DateStrictness,
) -> Result<Parameterized, DateError> {
    let date = TargetDate::parse_with(raw_date, strictness)?;
    Ok(parameterize(template, &date))
}

/// Date literal currently assigned in the template, if the statement exists.
pub fn current_target(template: &str) -> Option<String> {
    assignment_pattern()
        .captures(template)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// True when the text contains something that looks like the assignment.
pub fn mentions_assignment(text: &str) -> bool {
    text.contains(ASSIGNMENT_NEEDLE) || assignment_pattern().is_match(text)
}
