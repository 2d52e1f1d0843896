//! Capture filter -- decides whether a parsed event is kept.
//!
//! A source configures an ordered list of conditions. An empty list keeps
//! every event. Otherwise the event is kept when any condition evaluates to
//! `true`. Conditions that fail to compile never match, and evaluation errors
//! (unknown identifier, type mismatch) make a condition false for that event.
//!
//! A condition may end with `then <action>`. The action text is kept for
//! diagnostics only; it is never executed.

pub mod expr;
pub mod lexer;

pub use expr::{EvalError, Expr};

use lorona_core::metrics as m;

use crate::error::LogPipelineError;
use crate::event::ConditionParams;

const MAX_CONDITION_LENGTH: usize = 4096;

/// One compiled capture condition.
#[derive(Debug, Clone)]
pub struct CaptureCondition {
    source: String,
    expr: Expr,
    action: Option<String>,
}

impl CaptureCondition {
    /// Compiles a condition, stripping a trailing `then` clause.
    pub fn compile(text: &str) -> Result<Self, LogPipelineError> {
        if text.len() > MAX_CONDITION_LENGTH {
            return Err(LogPipelineError::Expression {
                position: MAX_CONDITION_LENGTH,
                reason: format!("condition longer than {MAX_CONDITION_LENGTH} bytes"),
            });
        }

        let (expression, action) = split_action(text);
        let expr = Expr::parse(expression)?;

        Ok(Self {
            source: text.to_owned(),
            expr,
            action: action.map(str::to_owned),
        })
    }

    /// Condition text as configured.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Stripped `then` clause, if any.
    pub fn action(&self) -> Option<&str> {
        self.action.as_deref()
    }

    pub fn evaluate(&self, params: &ConditionParams) -> Result<bool, EvalError> {
        self.expr.eval_bool(params)
    }
}

/// Splits `"<expr> then <action>"` at the first `then` word outside quotes.
pub fn split_action(text: &str) -> (&str, Option<&str>) {
    let bytes = text.as_bytes();
    let mut quote: Option<u8> = None;
    let mut escaped = false;

    for (idx, &b) in bytes.iter().enumerate() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == q {
                quote = None;
            }
            continue;
        }

        match b {
            b'\'' | b'"' => quote = Some(b),
            _ if is_then_at(bytes, idx) => {
                let action = text[idx + 4..].trim();
                return (
                    text[..idx].trim_end(),
                    (!action.is_empty()).then_some(action),
                );
            }
            _ => {}
        }
    }

    (text, None)
}

fn is_then_at(bytes: &[u8], idx: usize) -> bool {
    let Some(word) = bytes.get(idx..idx + 4) else {
        return false;
    };
    if !word.eq_ignore_ascii_case(b"then") {
        return false;
    }
    let before_ok = idx > 0 && bytes[idx - 1].is_ascii_whitespace();
    let after_ok = bytes.get(idx + 4).is_none_or(u8::is_ascii_whitespace);
    before_ok && after_ok
}

/// Compiled condition list of one source.
#[derive(Debug, Clone, Default)]
pub struct CaptureFilter {
    conditions: Vec<CaptureCondition>,
    configured: usize,
}

impl CaptureFilter {
    /// Compiles every condition; failures are logged and never match.
    pub fn compile<S: AsRef<str>>(conditions: &[S]) -> Self {
        let mut compiled = Vec::with_capacity(conditions.len());

        for text in conditions {
            let text = text.as_ref();
            match CaptureCondition::compile(text) {
                Ok(condition) => {
                    if let Some(action) = condition.action() {
                        tracing::warn!(
                            condition = %condition.source(),
                            action,
                            "capture condition action is not executed, only the condition is evaluated"
                        );
                    }
                    compiled.push(condition);
                }
                Err(e) => {
                    tracing::warn!(
                        condition = text,
                        error = %e,
                        "capture condition failed to compile, it will never match"
                    );
                }
            }
        }

        Self {
            conditions: compiled,
            configured: conditions.len(),
        }
    }

    /// `true` when no conditions were configured.
    pub fn accepts_all(&self) -> bool {
        self.configured == 0
    }

    /// Compiled (usable) conditions.
    pub fn conditions(&self) -> &[CaptureCondition] {
        &self.conditions
    }

    /// Keep/drop decision for one event.
    pub fn should_keep(&self, params: &ConditionParams) -> bool {
        if self.accepts_all() {
            return true;
        }

        self.conditions.iter().any(|condition| {
            match condition.evaluate(params) {
                Ok(keep) => keep,
                Err(e) => {
                    metrics::counter!(m::LOG_PIPELINE_CONDITION_ERRORS_TOTAL).increment(1);
                    tracing::debug!(condition = %condition.source(), error = %e, "condition evaluation failed");
                    false
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::FieldValue;

    fn params(severity: &str, status: i64) -> ConditionParams {
        let mut params = ConditionParams::new();
        params.insert("severity".to_owned(), FieldValue::Str(severity.to_owned()));
        params.insert("int_statuscode".to_owned(), FieldValue::Int(status));
        params
    }

    #[test]
    fn empty_list_accepts_everything() {
        let filter = CaptureFilter::compile::<&str>(&[]);
        assert!(filter.accepts_all());
        assert!(filter.should_keep(&ConditionParams::new()));
    }

    #[test]
    fn any_true_condition_keeps_event() {
        let filter = CaptureFilter::compile(&["severity == 'crit'", "int_statuscode >= 500"]);
        assert!(filter.should_keep(&params("error", 502)));
        assert!(filter.should_keep(&params("crit", 200)));
        assert!(!filter.should_keep(&params("info", 200)));
    }

    #[test]
    fn invalid_conditions_never_match() {
        let filter = CaptureFilter::compile(&["severity ==", "(("]);
        assert!(!filter.accepts_all());
        assert!(filter.conditions().is_empty());
        assert!(!filter.should_keep(&params("error", 500)));
    }

    #[test]
    fn invalid_condition_does_not_disable_valid_ones() {
        let filter = CaptureFilter::compile(&["severity ==", "int_statuscode == 404"]);
        assert!(filter.should_keep(&params("info", 404)));
    }

    #[test]
    fn eval_error_counts_as_no_match() {
        let filter = CaptureFilter::compile(&["upstream == 'api'", "severity == 'error'"]);
        assert!(filter.should_keep(&params("error", 200)));
        assert!(!filter.should_keep(&params("info", 200)));
    }

    #[test]
    fn then_clause_is_stripped() {
        let condition = CaptureCondition::compile("int_statuscode >= 500 then page oncall").unwrap();
        assert_eq!(condition.action(), Some("page oncall"));
        assert_eq!(condition.evaluate(&params("error", 503)), Ok(true));
    }

    #[test]
    fn split_action_ignores_then_inside_quotes_and_words() {
        assert_eq!(
            split_action("description == 'and then it broke'"),
            ("description == 'and then it broke'", None)
        );
        assert_eq!(split_action("authentic == true"), ("authentic == true", None));
        assert_eq!(
            split_action("severity == 'error' THEN notify"),
            ("severity == 'error'", Some("notify"))
        );
        assert_eq!(split_action("severity == 'error' then"), ("severity == 'error'", None));
    }

    #[test]
    fn overlong_condition_is_rejected() {
        let long = format!("severity == '{}'", "x".repeat(MAX_CONDITION_LENGTH));
        assert!(CaptureCondition::compile(&long).is_err());
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn compile_arbitrary_text_does_not_panic(text in "\\PC{0,300}") {
                if let Ok(condition) = CaptureCondition::compile(&text) {
                    let _ = condition.evaluate(&params("error", 500));
                }
            }

            #[test]
            fn compile_token_soup_does_not_panic(
                parts in prop::collection::vec(
                    prop::sample::select(vec![
                        "severity", "int_statuscode", "(", ")", "&&", "||", "!", "==", "!=",
                        "<", ">=", "=~", "'err.*'", "500", "-1.5", "true", "not", "then", "x",
                    ]),
                    0..40,
                )
            ) {
                let text = parts.join(" ");
                if let Ok(condition) = CaptureCondition::compile(&text) {
                    let _ = condition.evaluate(&params("error", 500));
                }
            }
        }
    }
}
