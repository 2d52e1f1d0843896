#![no_main]

use libfuzzer_sys::fuzz_target;
use lorona_log_pipeline::PatternRegistry;

fuzz_target!(|data: &[u8]| {
    if let Ok(yaml) = std::str::from_utf8(data) {
        let _ = PatternRegistry::parse_yaml(yaml, "fuzz");
    }
});
