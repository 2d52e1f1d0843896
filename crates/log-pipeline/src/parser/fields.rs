//! Reserved capture group names.

/// Capture groups routed to dedicated [`ParsedEvent`](crate::event::ParsedEvent)
/// fields instead of the open field map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReservedField {
    Severity,
    Description,
    Timestamp,
    StatusCode,
    ExecutionTime,
}

impl ReservedField {
    /// Resolves a group name, ignoring ASCII case.
    ///
    /// `status_code` and `execution_time` are accepted as spellings of
    /// `statuscode` and `executiontime`.
    pub fn from_group_name(name: &str) -> Option<Self> {
        let lowered = name.to_ascii_lowercase();
        match lowered.as_str() {
            "severity" => Some(Self::Severity),
            "description" => Some(Self::Description),
            "timestamp" => Some(Self::Timestamp),
            "statuscode" | "status_code" => Some(Self::StatusCode),
            "executiontime" | "execution_time" => Some(Self::ExecutionTime),
            _ => None,
        }
    }
}

/// Name of the integer shadow of an extra field.
pub fn int_shadow_name(field: &str) -> String {
    format!("int_{field}")
}
