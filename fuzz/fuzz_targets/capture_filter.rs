#![no_main]

use std::sync::Arc;

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use lorona_core::config::LogSourceConfig;
use lorona_log_pipeline::{CaptureFilter, LineParser, PatternSpec};

/// Structured input: condition texts plus the line they are evaluated against.
#[derive(Arbitrary, Debug)]
struct FuzzInput {
    conditions: Vec<String>,
    severity: String,
    statuscode: u16,
    description: String,
}

const PATTERN: &str = r"^(?P<severity>\S+) (?P<statuscode>\d+) (?P<description>.*)$";

fuzz_target!(|input: FuzzInput| {
    // keep compile time bounded
    if input.conditions.len() > 8 || input.conditions.iter().any(|c| c.len() > 256) {
        return;
    }
    let Ok(spec) = PatternSpec::compile("fuzz", PATTERN, None) else {
        return;
    };
    let source = LogSourceConfig::new("/var/log/fuzz.log", "fuzz");
    let parser = LineParser::new(Arc::new(spec), &source);

    let line = format!(
        "{} {} {}",
        input.severity.replace(char::is_whitespace, "_"),
        input.statuscode,
        input.description.replace('\n', " "),
    );
    let filter = CaptureFilter::compile(&input.conditions);
    if let Some(event) = parser.parse(&line) {
        let _ = filter.should_keep(&event.condition_params());
    }
});
