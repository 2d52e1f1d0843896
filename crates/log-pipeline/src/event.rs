//! Parsed log events and condition parameters.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A typed field value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Str(v) => f.write_str(v),
        }
    }
}

/// Named parameters a capture condition is evaluated against.
pub type ConditionParams = HashMap<String, FieldValue>;

/// One log line that matched its source's pattern.
///
/// Immutable once built by the line parser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedEvent {
    pub source_name: String,
    pub source_path: PathBuf,
    pub description: String,
    pub severity: String,
    /// `timestamp` capture as written in the log
    pub timestamp_raw: String,
    /// Parsed instant, `None` when the raw text could not be parsed
    pub timestamp: Option<DateTime<Utc>>,
    pub status_code: String,
    pub execution_time: Option<f64>,
    /// Extra named groups; each also has an `int_<name>` entry when numeric
    pub fields: BTreeMap<String, FieldValue>,
}

impl ParsedEvent {
    /// Empty event for a source; the parser fills in the captures.
    pub fn new(source_name: impl Into<String>, source_path: impl Into<PathBuf>) -> Self {
        Self {
            source_name: source_name.into(),
            source_path: source_path.into(),
            description: String::new(),
            severity: String::new(),
            timestamp_raw: String::new(),
            timestamp: None,
            status_code: String::new(),
            execution_time: None,
            fields: BTreeMap::new(),
        }
    }

    /// Key used for per-path summaries.
    pub fn path_key(&self) -> String {
        self.source_path.display().to_string()
    }

    /// First `max_chars` characters of the description, for diagnostics.
    pub fn short_description(&self, max_chars: usize) -> &str {
        match self.description.char_indices().nth(max_chars) {
            Some((idx, _)) => &self.description[..idx],
            None => &self.description,
        }
    }

    /// Builds the parameter map capture conditions see.
    pub fn condition_params(&self) -> ConditionParams {
        let mut params = ConditionParams::with_capacity(self.fields.len() + 8);

        params.insert("severity".to_owned(), FieldValue::Str(self.severity.clone()));
        params.insert(
            "description".to_owned(),
            FieldValue::Str(self.description.clone()),
        );
        params.insert(
            "timestamp".to_owned(),
            FieldValue::Str(self.timestamp_raw.clone()),
        );
        params.insert(
            "statuscode".to_owned(),
            FieldValue::Str(self.status_code.clone()),
        );
        if let Ok(code) = self.status_code.trim().parse::<i64>() {
            params.insert("int_statuscode".to_owned(), FieldValue::Int(code));
        }
        if let Some(elapsed) = self.execution_time {
            params.insert("executiontime".to_owned(), FieldValue::Float(elapsed));
        }
        params.insert("name".to_owned(), FieldValue::Str(self.source_name.clone()));
        params.insert("path".to_owned(), FieldValue::Str(self.path_key()));

        for (key, value) in &self.fields {
            params.insert(key.clone(), value.clone());
        }
        params
    }
}
