//! Pattern registry -- log type name to extraction pattern.
//!
//! The registry file is a YAML mapping. A value is either a plain regex or a
//! mapping with `pattern` and an optional `timestamp_format`:
//!
//! ```yaml
//! nginx_error:
//!   pattern: '^(?P<timestamp>\S+ \S+) \[(?P<severity>\w+)\] (?P<description>.*)$'
//!   timestamp_format: '%Y/%m/%d %H:%M:%S'
//! syslog_plain: '^(?P<description>.*)$'
//! ```
//!
//! Entries that are malformed, empty or fail to compile are skipped with a
//! warning, and so are stray lines that break the YAML document. Only an
//! unreadable file or a top level that is not a mapping is an error.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use regex::{Regex, RegexBuilder};
use serde::Deserialize;

use crate::error::LogPipelineError;

const MAX_PATTERN_FILE_SIZE: u64 = 1024 * 1024;
const MAX_PATTERN_LENGTH: usize = 4096;
const REGEX_SIZE_LIMIT: usize = 1 << 20;

/// A compiled extraction pattern.
#[derive(Debug)]
pub struct PatternSpec {
    /// Registry key
    pub log_type: String,
    /// Compiled pattern; groups are read by name
    pub regex: Regex,
    /// chrono format for the `timestamp` group
    pub timestamp_format: Option<String>,
}

impl PatternSpec {
    /// Compiles a pattern.
    pub fn compile(
        log_type: impl Into<String>,
        pattern: &str,
        timestamp_format: Option<String>,
    ) -> Result<Self, LogPipelineError> {
        let log_type = log_type.into();

        if pattern.trim().is_empty() {
            return Err(LogPipelineError::Pattern {
                log_type,
                reason: "pattern is empty".to_owned(),
            });
        }
        if pattern.len() > MAX_PATTERN_LENGTH {
            return Err(LogPipelineError::Pattern {
                log_type,
                reason: format!("pattern longer than {MAX_PATTERN_LENGTH} bytes"),
            });
        }

        let regex = RegexBuilder::new(pattern)
            .size_limit(REGEX_SIZE_LIMIT)
            .build()
            .map_err(|e| LogPipelineError::Pattern {
                log_type: log_type.clone(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            log_type,
            regex,
            timestamp_format: timestamp_format.filter(|f| !f.trim().is_empty()),
        })
    }

    /// Names of the pattern's named groups.
    pub fn group_names(&self) -> impl Iterator<Item = &str> {
        self.regex.capture_names().flatten()
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawPatternEntry {
    Plain(String),
    Detailed {
        pattern: String,
        #[serde(default)]
        timestamp_format: Option<String>,
    },
}

/// Lookup table of compiled patterns.
#[derive(Debug, Default, Clone)]
pub struct PatternRegistry {
    patterns: HashMap<String, Arc<PatternSpec>>,
}

impl PatternRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads the registry file.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, LogPipelineError> {
        let path = path.as_ref();

        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| LogPipelineError::PatternLoad {
                path: path.display().to_string(),
                reason: format!("failed to read file metadata: {e}"),
            })?;

        if metadata.len() > MAX_PATTERN_FILE_SIZE {
            return Err(LogPipelineError::PatternLoad {
                path: path.display().to_string(),
                reason: format!(
                    "file too large: {} bytes (max: {MAX_PATTERN_FILE_SIZE})",
                    metadata.len()
                ),
            });
        }

        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            LogPipelineError::PatternLoad {
                path: path.display().to_string(),
                reason: format!("failed to read file: {e}"),
            }
        })?;

        let registry = Self::parse_yaml(&content, &path.display().to_string())?;
        tracing::info!(
            path = %path.display(),
            count = registry.len(),
            "loaded log patterns"
        );
        Ok(registry)
    }

    /// Parses registry YAML. `source` only labels diagnostics.
    ///
    /// When the document as a whole does not parse (a stray line, a
    /// duplicated key), each top-level entry is parsed on its own: broken
    /// entries are skipped and a repeated log type keeps its last value.
    pub fn parse_yaml(yaml_str: &str, source: &str) -> Result<Self, LogPipelineError> {
        let document: serde_yaml::Value = match serde_yaml::from_str(yaml_str) {
            Ok(document) => document,
            Err(e) => {
                tracing::warn!(source, error = %e, "pattern file is not valid YAML, parsing entries one by one");
                return Ok(Self::parse_entries(yaml_str, source));
            }
        };

        let mapping = match document {
            serde_yaml::Value::Null => return Ok(Self::new()),
            serde_yaml::Value::Mapping(mapping) => mapping,
            _ => {
                return Err(LogPipelineError::PatternLoad {
                    path: source.to_owned(),
                    reason: "top level must be a mapping of log type to pattern".to_owned(),
                });
            }
        };

        let mut registry = Self::new();
        for (key, value) in mapping {
            registry.add_entry(key, value, source);
        }
        Ok(registry)
    }

    fn parse_entries(yaml_str: &str, source: &str) -> Self {
        let mut registry = Self::new();

        for (line_no, block) in top_level_blocks(yaml_str) {
            match serde_yaml::from_str::<serde_yaml::Value>(&block) {
                Ok(serde_yaml::Value::Mapping(mapping)) => {
                    for (key, value) in mapping {
                        registry.add_entry(key, value, source);
                    }
                }
                Ok(_) => {
                    tracing::warn!(source, line = line_no, "pattern line is not a `type: pattern` entry, skipping");
                }
                Err(e) => {
                    tracing::warn!(source, line = line_no, error = %e, "malformed pattern line, skipping");
                }
            }
        }

        registry
    }

    fn add_entry(&mut self, key: serde_yaml::Value, value: serde_yaml::Value, source: &str) {
        let Some(log_type) = key.as_str().map(str::to_owned) else {
            tracing::warn!(source, "pattern key is not a string, skipping");
            return;
        };

        let entry = match serde_yaml::from_value::<RawPatternEntry>(value) {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(source, log_type = %log_type, error = %e, "malformed pattern entry, skipping");
                return;
            }
        };

        let (pattern, timestamp_format) = match entry {
            RawPatternEntry::Plain(pattern) => (pattern, None),
            RawPatternEntry::Detailed {
                pattern,
                timestamp_format,
            } => (pattern, timestamp_format),
        };

        if self.patterns.contains_key(&log_type) {
            tracing::warn!(source, log_type = %log_type, "log type defined twice, the later entry wins");
        }
        if let Err(e) = self.insert(&log_type, &pattern, timestamp_format) {
            tracing::warn!(source, error = %e, "unusable pattern, skipping");
        }
    }

    /// Compiles and registers a pattern, replacing any previous one.
    pub fn insert(
        &mut self,
        log_type: &str,
        pattern: &str,
        timestamp_format: Option<String>,
    ) -> Result<(), LogPipelineError> {
        let spec = PatternSpec::compile(log_type, pattern, timestamp_format)?;
        self.patterns.insert(log_type.to_owned(), Arc::new(spec));
        Ok(())
    }

    /// Pattern for a log type.
    pub fn get(&self, log_type: &str) -> Option<Arc<PatternSpec>> {
        self.patterns.get(log_type).cloned()
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Registered log type names.
    pub fn log_types(&self) -> impl Iterator<Item = &str> {
        self.patterns.keys().map(String::as_str)
    }
}

/// Splits a registry file into top-level entries.
///
/// An entry starts at an unindented line and takes the indented lines after
/// it. Returns the 1-based starting line of each entry.
fn top_level_blocks(text: &str) -> Vec<(usize, String)> {
    let mut blocks: Vec<(usize, String)> = Vec::new();

    for (idx, line) in text.lines().enumerate() {
        let trimmed = line.trim_start();
        if trimmed.is_empty() || trimmed.starts_with('#') || line.trim_end() == "---" {
            continue;
        }

        let indented = trimmed.len() != line.len();
        match blocks.last_mut() {
            Some((_, block)) if indented => {
                block.push('\n');
                block.push_str(line);
            }
            None if indented => {
                tracing::warn!(line = idx + 1, "indented pattern line without an entry, skipping");
            }
            _ => blocks.push((idx + 1, line.to_owned())),
        }
    }

    blocks
}

#[cfg(test)]
mod tests {
    use super::*;

    const REGISTRY: &str = r#"
nginx_error:
  pattern: '^(?P<timestamp>\d{4}/\d{2}/\d{2} \d{2}:\d{2}:\d{2}) \[(?P<severity>\w+)\] (?P<description>.*)$'
  timestamp_format: '%Y/%m/%d %H:%M:%S'
plain: '^(?P<description>.*)$'
"#;

    #[test]
    fn parses_plain_and_detailed_entries() {
        let registry = PatternRegistry::parse_yaml(REGISTRY, "test").unwrap();
        assert_eq!(registry.len(), 2);

        let nginx = registry.get("nginx_error").unwrap();
        assert_eq!(nginx.timestamp_format.as_deref(), Some("%Y/%m/%d %H:%M:%S"));
        let groups: Vec<&str> = nginx.group_names().collect();
        assert_eq!(groups, vec!["timestamp", "severity", "description"]);

        let plain = registry.get("plain").unwrap();
        assert!(plain.timestamp_format.is_none());
    }

    #[test]
    fn missing_type_returns_none() {
        let registry = PatternRegistry::parse_yaml(REGISTRY, "test").unwrap();
        assert!(registry.get("apache").is_none());
    }

    #[test]
    fn malformed_entries_are_skipped() {
        let yaml = r#"
good: '^(?P<description>.*)$'
broken_regex: '^(?P<description>.*$'
empty: ''
wrong_shape:
  - 1
  - 2
"#;
        let registry = PatternRegistry::parse_yaml(yaml, "test").unwrap();
        assert_eq!(registry.len(), 1);
        assert!(registry.get("good").is_some());
    }

    #[test]
    fn stray_line_does_not_reject_other_entries() {
        let yaml = r#"
nginx_error:
  pattern: '^(?P<severity>\w+) (?P<description>.*)$'
  timestamp_format: '%Y/%m/%d %H:%M:%S'
this line has no colon
plain: '^(?P<description>.*)$'
"#;
        let registry = PatternRegistry::parse_yaml(yaml, "test").unwrap();
        assert_eq!(registry.len(), 2);
        let nginx = registry.get("nginx_error").unwrap();
        assert_eq!(nginx.timestamp_format.as_deref(), Some("%Y/%m/%d %H:%M:%S"));
        assert!(registry.get("plain").is_some());
    }

    #[test]
    fn duplicate_log_type_keeps_last_entry() {
        let yaml = "a: '^(?P<severity>\\w+)$'\nb: '^(?P<description>.*)$'\na: '^(?P<description>.*)$'\n";
        let registry = PatternRegistry::parse_yaml(yaml, "test").unwrap();
        assert_eq!(registry.len(), 2);
        let binding = registry.get("a").unwrap();
        let groups: Vec<&str> = binding.group_names().collect();
        assert_eq!(groups, vec!["description"]);
    }

    #[test]
    fn top_level_blocks_group_indented_lines() {
        let blocks = top_level_blocks("# comment\na:\n  pattern: x\n\nb: y\n  orphan? no\n");
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0], (2, "a:\n  pattern: x".to_owned()));
        assert_eq!(blocks[1].0, 5);
    }

    #[test]
    fn empty_document_is_empty_registry() {
        let registry = PatternRegistry::parse_yaml("", "test").unwrap();
        assert!(registry.is_empty());
    }

    #[test]
    fn non_mapping_document_is_an_error() {
        let err = PatternRegistry::parse_yaml("- a\n- b\n", "test").unwrap_err();
        assert!(matches!(err, LogPipelineError::PatternLoad { .. }));
    }

    #[test]
    fn blank_timestamp_format_is_ignored() {
        let spec = PatternSpec::compile("x", "(?P<description>.*)", Some("  ".to_owned())).unwrap();
        assert!(spec.timestamp_format.is_none());
    }

    #[tokio::test]
    async fn load_missing_file_is_an_error() {
        let err = PatternRegistry::load("/nonexistent/log_formats.yaml")
            .await
            .unwrap_err();
        assert!(matches!(err, LogPipelineError::PatternLoad { .. }));
    }

    #[tokio::test]
    async fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log_formats.yaml");
        std::fs::write(&path, REGISTRY).unwrap();

        let registry = PatternRegistry::load(&path).await.unwrap();
        assert_eq!(registry.len(), 2);
    }
}
