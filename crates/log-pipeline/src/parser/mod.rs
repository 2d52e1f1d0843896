//! Line parser -- applies a source's pattern to one raw line.
//!
//! Named groups are matched by name. Reserved names ([`ReservedField`]) go to
//! dedicated [`ParsedEvent`] fields; every other group lands in the open
//! field map as a string plus an `int_<name>` shadow when it parses as an
//! integer.
//!
//! ```ignore
//! let parser = LineParser::new(spec, &source);
//! if let Some(event) = parser.parse("2024/01/01 00:00:01 [error] 1#1: disk failure") {
//!     assert_eq!(event.severity, "error");
//! }
//! ```

pub mod fields;
pub mod timestamp;

pub use fields::ReservedField;
pub use timestamp::parse_timestamp;

use std::path::PathBuf;
use std::sync::Arc;

use lorona_core::config::LogSourceConfig;

use crate::event::{FieldValue, ParsedEvent};
use crate::pattern::PatternSpec;

/// One named group of the pattern, resolved once.
#[derive(Debug, Clone)]
struct GroupSlot {
    index: usize,
    name: String,
    reserved: Option<ReservedField>,
}

/// Parser bound to one log source.
#[derive(Debug, Clone)]
pub struct LineParser {
    spec: Arc<PatternSpec>,
    source_name: String,
    source_path: PathBuf,
    timestamp_format: Option<String>,
    groups: Vec<GroupSlot>,
}

impl LineParser {
    /// Binds a pattern to a source.
    ///
    /// The source's explicit timestamp format wins over the pattern's.
    pub fn new(spec: Arc<PatternSpec>, source: &LogSourceConfig) -> Self {
        let groups = spec
            .regex
            .capture_names()
            .enumerate()
            .filter_map(|(index, name)| {
                name.map(|name| GroupSlot {
                    index,
                    name: name.to_owned(),
                    reserved: ReservedField::from_group_name(name),
                })
            })
            .collect();

        let timestamp_format = source
            .explicit_timestamp_format()
            .map(str::to_owned)
            .or_else(|| spec.timestamp_format.clone());

        Self {
            spec,
            source_name: source.display_name(),
            source_path: source.path.clone(),
            timestamp_format,
            groups,
        }
    }

    /// Log type this parser was built for.
    pub fn log_type(&self) -> &str {
        &self.spec.log_type
    }

    /// Parses one line (without its terminator). `None` means no match.
    pub fn parse(&self, line: &str) -> Option<ParsedEvent> {
        let captures = self.spec.regex.captures(line)?;
        let mut event = ParsedEvent::new(self.source_name.clone(), self.source_path.clone());

        for group in &self.groups {
            // optional groups that did not participate
            let Some(matched) = captures.get(group.index) else {
                continue;
            };
            let text = matched.as_str();

            match group.reserved {
                Some(ReservedField::Severity) => event.severity = text.to_owned(),
                Some(ReservedField::Description) => event.description = text.to_owned(),
                Some(ReservedField::Timestamp) => {
                    event.timestamp_raw = text.to_owned();
                    event.timestamp = parse_timestamp(text, self.timestamp_format.as_deref());
                }
                Some(ReservedField::StatusCode) => event.status_code = text.to_owned(),
                Some(ReservedField::ExecutionTime) => {
                    event.execution_time = text.trim().parse::<f64>().ok();
                }
                None => {
                    if let Ok(number) = text.trim().parse::<i64>() {
                        event
                            .fields
                            .insert(fields::int_shadow_name(&group.name), FieldValue::Int(number));
                    }
                    event
                        .fields
                        .insert(group.name.clone(), FieldValue::Str(text.to_owned()));
                }
            }
        }

        Some(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    const NGINX_ERROR: &str = r"^(?P<timestamp>\d{4}/\d{2}/\d{2} \d{2}:\d{2}:\d{2}) \[(?P<severity>\w+)\] (?P<pid>\d+)#(?P<tid>\d+): (?P<description>.*)$";

    fn parser(pattern: &str, ts_format: Option<&str>) -> LineParser {
        let spec = PatternSpec::compile("test", pattern, ts_format.map(str::to_owned)).unwrap();
        let mut source = LogSourceConfig::new("/var/log/test.log", "test");
        source.name = "test".to_owned();
        LineParser::new(Arc::new(spec), &source)
    }

    #[test]
    fn routes_reserved_groups() {
        let parser = parser(NGINX_ERROR, None);
        let event = parser
            .parse("2024/01/01 00:00:01 [error] 123#1: *9 disk failure")
            .unwrap();

        assert_eq!(event.severity, "error");
        assert_eq!(event.description, "*9 disk failure");
        assert_eq!(event.timestamp_raw, "2024/01/01 00:00:01");
        assert_eq!(
            event.timestamp,
            Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 1).unwrap())
        );
        assert_eq!(event.source_name, "test");
        assert_eq!(event.source_path, PathBuf::from("/var/log/test.log"));
    }

    #[test]
    fn extra_groups_get_int_shadows() {
        let parser = parser(NGINX_ERROR, None);
        let event = parser
            .parse("2024/01/01 00:00:01 [error] 123#1: boom")
            .unwrap();

        assert_eq!(event.fields["pid"], FieldValue::Str("123".to_owned()));
        assert_eq!(event.fields["int_pid"], FieldValue::Int(123));
        assert_eq!(event.fields["int_tid"], FieldValue::Int(1));
    }

    #[test]
    fn non_matching_line_is_none() {
        let parser = parser(NGINX_ERROR, None);
        assert!(parser.parse("\tat com.example.Foo.bar(Foo.java:42)").is_none());
    }

    #[test]
    fn unparsable_timestamp_keeps_raw_text() {
        let parser = parser(
            r"^(?P<timestamp>\S+) (?P<description>.*)$",
            Some("%Y-%m-%d"),
        );
        let event = parser.parse("not-a-date something happened").unwrap();
        assert_eq!(event.timestamp_raw, "not-a-date");
        assert!(event.timestamp.is_none());
    }

    #[test]
    fn status_and_execution_time() {
        let parser = parser(
            r"^(?P<statuscode>\d{3}) (?P<execution_time>[\d.]+)ms (?P<description>.*)$",
            None,
        );
        let event = parser.parse("503 12.5ms upstream timed out").unwrap();
        assert_eq!(event.status_code, "503");
        assert_eq!(event.execution_time, Some(12.5));
        assert!(event.fields.is_empty());
    }

    #[test]
    fn optional_groups_may_be_absent() {
        let parser = parser(r"^(?P<severity>\w+)(?: code=(?P<code>\d+))?: (?P<description>.*)$", None);
        let event = parser.parse("warn: low disk").unwrap();
        assert_eq!(event.severity, "warn");
        assert!(!event.fields.contains_key("code"));

        let event = parser.parse("warn code=7: low disk").unwrap();
        assert_eq!(event.fields["int_code"], FieldValue::Int(7));
    }

    #[test]
    fn source_timestamp_format_overrides_pattern() {
        let spec = PatternSpec::compile(
            "test",
            r"^(?P<timestamp>\S+) (?P<description>.*)$",
            Some("%Y/%m/%d".to_owned()),
        )
        .unwrap();
        let mut source = LogSourceConfig::new("/var/log/test.log", "test");
        source.timestamp_format = Some("%d.%m.%Y".to_owned());
        let parser = LineParser::new(Arc::new(spec), &source);

        let event = parser.parse("05.03.2024 rebooted").unwrap();
        assert_eq!(
            event.timestamp,
            Some(Utc.with_ymd_and_hms(2024, 3, 5, 0, 0, 0).unwrap())
        );
    }

    #[test]
    fn unnamed_source_uses_path_as_name() {
        let spec = PatternSpec::compile("t", r"(?P<description>.*)", None).unwrap();
        let source = LogSourceConfig::new("/var/log/x.log", "t");
        let parser = LineParser::new(Arc::new(spec), &source);
        let event = parser.parse("hello").unwrap();
        assert_eq!(event.source_name, "/var/log/x.log");
        assert_eq!(parser.log_type(), "t");
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn parse_arbitrary_line_does_not_panic(line in "\\PC{0,400}") {
                let parser = parser(NGINX_ERROR, Some("%Y/%m/%d %H:%M:%S"));
                let _ = parser.parse(&line);
            }

            #[test]
            fn parse_arbitrary_description_keeps_it(description in "[ -~]{0,200}") {
                let parser = parser(NGINX_ERROR, None);
                let line = format!("2024/01/01 00:00:01 [warn] 7#0: {description}");
                let event = parser.parse(&line);
                prop_assert!(event.is_some());
                prop_assert_eq!(event.unwrap().description, description);
            }
        }
    }
}
