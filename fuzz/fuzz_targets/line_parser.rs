#![no_main]

use std::sync::Arc;

use libfuzzer_sys::fuzz_target;
use lorona_core::config::LogSourceConfig;
use lorona_log_pipeline::{LineParser, PatternSpec};

const NGINX_ERROR_PATTERN: &str = r"^(?P<timestamp>\d{4}/\d{2}/\d{2} \d{2}:\d{2}:\d{2}) \[(?P<severity>\w+)\] (?P<pid>\d+)#(?P<tid>\d+): (?P<description>.*)$";

fuzz_target!(|data: &[u8]| {
    let Ok(line) = std::str::from_utf8(data) else {
        return;
    };
    let Ok(spec) = PatternSpec::compile("nginx_error", NGINX_ERROR_PATTERN, None) else {
        return;
    };
    let source = LogSourceConfig::new("/var/log/fuzz.log", "nginx_error");
    let parser = LineParser::new(Arc::new(spec), &source);
    if let Some(event) = parser.parse(line) {
        let _ = event.condition_params();
    }
});
