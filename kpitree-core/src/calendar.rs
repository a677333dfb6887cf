//! Calendar index document: the dates that have a published report.
//!
//! On disk this is `{ "datesWithData": [ "<date>", ... ] }`. The list is kept
//! sorted ascending and de-duplicated after every mutation. Loading never
//! fails: a malformed document is repaired and the repairs are recorded so the
//! caller can log them.

use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::fmt;

use crate::date::TargetDate;

pub const DATES_FIELD: &str = "datesWithData";

/// A repair applied while loading a damaged index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Repair {
    /// The document was not valid JSON.
    Unparseable(String),
    /// The document was JSON but not an object.
    NotAnObject,
    /// `datesWithData` was absent.
    MissingField,
    /// `datesWithData` was present but not a list.
    FieldNotAList,
    /// Non-string entries were dropped from the list.
    DroppedEntries(usize),
    /// The list was out of order or contained duplicates.
    Resorted,
}

impl fmt::Display for Repair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Repair::Unparseable(e) => write!(f, "unparseable document reset to empty ({e})"),
            Repair::NotAnObject => write!(f, "document was not an object; reset to empty"),
            Repair::MissingField => write!(f, "missing '{DATES_FIELD}' field added"),
            Repair::FieldNotAList => write!(f, "'{DATES_FIELD}' was not a list; reset to []"),
            Repair::DroppedEntries(n) => write!(f, "dropped {n} non-string entries"),
            Repair::Resorted => write!(f, "entries re-sorted and de-duplicated"),
        }
    }
}

/// In-memory calendar index.
///
/// Fields other than `datesWithData` are carried through untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct CalendarIndex {
    dates: BTreeSet<String>,
    extra: Map<String, Value>,
    repairs: Vec<Repair>,
}

/// Result of inserting a date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Insert {
    Added,
    AlreadyPresent,
}

impl Default for CalendarIndex {
    fn default() -> Self {
        Self::empty()
    }
}

impl CalendarIndex {
    pub fn empty() -> Self {
        Self {
            dates: BTreeSet::new(),
            extra: Map::new(),
            repairs: Vec::new(),
        }
    }

    /// Parse index text, repairing whatever is broken.
    pub fn from_json_lenient(text: &str) -> Self {
        let value = match serde_json::from_str::<Value>(text) {
            Ok(v) => v,
            Err(e) => {
                let mut index = Self::empty();
                index.repairs.push(Repair::Unparseable(e.to_string()));
                return index;
            }
        };
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Self {
        let mut index = Self::empty();
        let mut object = match value {
            Value::Object(map) => map,
            _ => {
                index.repairs.push(Repair::NotAnObject);
                return index;
            }
        };

        match object.remove(DATES_FIELD) {
            None => index.repairs.push(Repair::MissingField),
            Some(Value::Array(items)) => {
                let total = items.len();
                let strings: Vec<String> = items
                    .into_iter()
                    .filter_map(|v| match v {
                        Value::String(s) => Some(s),
                        _ => None,
                    })
                    .collect();
                if strings.len() < total {
                    index.repairs.push(Repair::DroppedEntries(total - strings.len()));
                }
                let was_canonical = strings.windows(2).all(|w| w[0] < w[1]);
                if !was_canonical {
                    index.repairs.push(Repair::Resorted);
                }
                index.dates.extend(strings);
            }
            Some(_) => index.repairs.push(Repair::FieldNotAList),
        }

        index.extra = object;
        index
    }

    pub fn contains(&self, date: &TargetDate) -> bool {
        self.dates.contains(&date.to_string())
    }

    /// Insert-if-absent.
    pub fn insert(&mut self, date: &TargetDate) -> Insert {
        if self.dates.insert(date.to_string()) {
            Insert::Added
        } else {
            Insert::AlreadyPresent
        }
    }

    /// Dates in ascending order, without duplicates.
    pub fn dates(&self) -> impl Iterator<Item = &str> {
        self.dates.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn repairs(&self) -> &[Repair] {
        &self.repairs
    }

    pub fn was_repaired(&self) -> bool {
        !self.repairs.is_empty()
    }

    pub fn to_value(&self) -> Value {
        let mut object = Map::new();
        object.insert(
            DATES_FIELD.to_string(),
            Value::Array(self.dates.iter().cloned().map(Value::String).collect()),
        );
        for (k, v) in &self.extra {
            object.insert(k.clone(), v.clone());
        }
        Value::Object(object)
    }

    /// Two-space indented JSON with a trailing newline.
    pub fn to_json_pretty(&self) -> String {
        let mut out = serde_json::to_string_pretty(&self.to_value())
            .unwrap_or_else(|_| format!("{{\"{DATES_FIELD}\": []}}"));
        out.push('\n');
        out
    }
}
