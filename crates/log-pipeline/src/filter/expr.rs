//! Expression tree, recursive-descent parser and evaluator.
//!
//! ```text
//! or      := and ( ("||" | "or") and )*
//! and     := not ( ("&&" | "and") not )*
//! not     := ("!" | "not") not | cmp
//! cmp     := primary ( op primary )?
//! primary := INT | FLOAT | STRING | true | false | IDENT | "-" number | "(" or ")"
//! ```
//!
//! Evaluation is pure: it only reads the parameter map.

use std::cmp::Ordering;
use std::fmt;

use regex::{Regex, RegexBuilder};

use super::lexer::{Token, TokenKind, tokenize};
use crate::error::LogPipelineError;
use crate::event::{ConditionParams, FieldValue};

const MAX_DEPTH: usize = 64;
const REGEX_SIZE_LIMIT: usize = 1 << 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        };
        f.write_str(symbol)
    }
}

impl CompareOp {
    fn holds(self, ordering: Ordering) -> bool {
        match self {
            Self::Eq => ordering == Ordering::Equal,
            Self::Ne => ordering != Ordering::Equal,
            Self::Lt => ordering == Ordering::Less,
            Self::Le => ordering != Ordering::Greater,
            Self::Gt => ordering == Ordering::Greater,
            Self::Ge => ordering != Ordering::Less,
        }
    }
}

/// Compiled expression.
#[derive(Debug, Clone)]
pub enum Expr {
    Literal(FieldValue),
    Ident(String),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Compare {
        op: CompareOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Matches {
        lhs: Box<Expr>,
        regex: Regex,
        negate: bool,
    },
}

/// Why an expression could not be evaluated for one event.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EvalError {
    #[error("unknown identifier '{0}'")]
    UnknownIdentifier(String),

    #[error("type mismatch: {lhs} {op} {rhs}")]
    TypeMismatch {
        op: String,
        lhs: &'static str,
        rhs: &'static str,
    },

    #[error("expected boolean, found {0}")]
    NotBoolean(&'static str),
}

fn type_name(value: &FieldValue) -> &'static str {
    match value {
        FieldValue::Bool(_) => "bool",
        FieldValue::Int(_) => "int",
        FieldValue::Float(_) => "float",
        FieldValue::Str(_) => "string",
    }
}

impl Expr {
    /// Parses a full expression.
    pub fn parse(input: &str) -> Result<Self, LogPipelineError> {
        let tokens = tokenize(input)?;
        if tokens.is_empty() {
            return Err(LogPipelineError::Expression {
                position: 0,
                reason: "empty expression".to_owned(),
            });
        }

        let mut parser = Parser {
            tokens,
            pos: 0,
            depth: 0,
            input_len: input.len(),
        };
        let expr = parser.parse_or()?;
        if let Some(token) = parser.peek() {
            return Err(LogPipelineError::Expression {
                position: token.position,
                reason: format!("unexpected trailing token {:?}", token.kind),
            });
        }
        Ok(expr)
    }

    /// Evaluates to a boolean.
    pub fn eval_bool(&self, params: &ConditionParams) -> Result<bool, EvalError> {
        match self.eval(params)? {
            FieldValue::Bool(b) => Ok(b),
            other => Err(EvalError::NotBoolean(type_name(&other))),
        }
    }

    fn eval(&self, params: &ConditionParams) -> Result<FieldValue, EvalError> {
        match self {
            Self::Literal(value) => Ok(value.clone()),
            Self::Ident(name) => params
                .get(name)
                .cloned()
                .ok_or_else(|| EvalError::UnknownIdentifier(name.clone())),
            Self::Not(inner) => Ok(FieldValue::Bool(!inner.eval_bool(params)?)),
            Self::And(lhs, rhs) => {
                Ok(FieldValue::Bool(lhs.eval_bool(params)? && rhs.eval_bool(params)?))
            }
            Self::Or(lhs, rhs) => {
                Ok(FieldValue::Bool(lhs.eval_bool(params)? || rhs.eval_bool(params)?))
            }
            Self::Compare { op, lhs, rhs } => {
                let lhs = lhs.eval(params)?;
                let rhs = rhs.eval(params)?;
                compare(*op, &lhs, &rhs).map(FieldValue::Bool)
            }
            Self::Matches { lhs, regex, negate } => match lhs.eval(params)? {
                FieldValue::Str(text) => Ok(FieldValue::Bool(regex.is_match(&text) != *negate)),
                other => Err(EvalError::TypeMismatch {
                    op: if *negate { "!~" } else { "=~" }.to_owned(),
                    lhs: type_name(&other),
                    rhs: "string",
                }),
            },
        }
    }
}

fn compare(op: CompareOp, lhs: &FieldValue, rhs: &FieldValue) -> Result<bool, EvalError> {
    let mismatch = || EvalError::TypeMismatch {
        op: op.to_string(),
        lhs: type_name(lhs),
        rhs: type_name(rhs),
    };

    let ordering = match (lhs, rhs) {
        (FieldValue::Int(a), FieldValue::Int(b)) => a.cmp(b),
        (FieldValue::Int(a), FieldValue::Float(b)) => {
            (*a as f64).partial_cmp(b).ok_or_else(mismatch)?
        }
        (FieldValue::Float(a), FieldValue::Int(b)) => {
            a.partial_cmp(&(*b as f64)).ok_or_else(mismatch)?
        }
        (FieldValue::Float(a), FieldValue::Float(b)) => a.partial_cmp(b).ok_or_else(mismatch)?,
        (FieldValue::Str(a), FieldValue::Str(b)) => a.cmp(b),
        (FieldValue::Bool(a), FieldValue::Bool(b)) => match op {
            CompareOp::Eq | CompareOp::Ne => a.cmp(b),
            _ => return Err(mismatch()),
        },
        _ => return Err(mismatch()),
    };

    Ok(op.holds(ordering))
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
    input_len: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_kind(&self) -> Option<&TokenKind> {
        self.peek().map(|t| &t.kind)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn error_here(&self, reason: impl Into<String>) -> LogPipelineError {
        LogPipelineError::Expression {
            position: self.peek().map_or(self.input_len, |t| t.position),
            reason: reason.into(),
        }
    }

    fn enter(&mut self) -> Result<(), LogPipelineError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(self.error_here(format!("expression nested deeper than {MAX_DEPTH}")));
        }
        Ok(())
    }

    fn parse_or(&mut self) -> Result<Expr, LogPipelineError> {
        self.enter()?;
        let mut lhs = self.parse_and()?;
        while self.peek_kind() == Some(&TokenKind::Or) {
            self.advance();
            let rhs = self.parse_and()?;
            lhs = Expr::Or(Box::new(lhs), Box::new(rhs));
        }
        self.depth -= 1;
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr, LogPipelineError> {
        let mut lhs = self.parse_not()?;
        while self.peek_kind() == Some(&TokenKind::And) {
            self.advance();
            let rhs = self.parse_not()?;
            lhs = Expr::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_not(&mut self) -> Result<Expr, LogPipelineError> {
        if self.peek_kind() == Some(&TokenKind::Not) {
            self.advance();
            self.enter()?;
            let inner = self.parse_not()?;
            self.depth -= 1;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.parse_cmp()
    }

    fn parse_cmp(&mut self) -> Result<Expr, LogPipelineError> {
        let lhs = self.parse_primary()?;

        let op = match self.peek_kind() {
            Some(TokenKind::Eq) => CompareOp::Eq,
            Some(TokenKind::Ne) => CompareOp::Ne,
            Some(TokenKind::Lt) => CompareOp::Lt,
            Some(TokenKind::Le) => CompareOp::Le,
            Some(TokenKind::Gt) => CompareOp::Gt,
            Some(TokenKind::Ge) => CompareOp::Ge,
            Some(TokenKind::Match | TokenKind::NotMatch) => return self.parse_match(lhs),
            _ => return Ok(lhs),
        };
        self.advance();

        let rhs = self.parse_primary()?;
        Ok(Expr::Compare {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        })
    }

    fn parse_match(&mut self, lhs: Expr) -> Result<Expr, LogPipelineError> {
        let negate = matches!(self.advance(), Some(Token { kind: TokenKind::NotMatch, .. }));

        let position = self.peek().map_or(self.input_len, |t| t.position);
        let pattern = match self.advance() {
            Some(Token {
                kind: TokenKind::Str(pattern),
                ..
            }) => pattern,
            _ => {
                return Err(LogPipelineError::Expression {
                    position,
                    reason: "regex operator needs a string literal on the right".to_owned(),
                });
            }
        };

        let regex = RegexBuilder::new(&pattern)
            .size_limit(REGEX_SIZE_LIMIT)
            .build()
            .map_err(|e| LogPipelineError::Expression {
                position,
                reason: format!("invalid regex: {e}"),
            })?;

        Ok(Expr::Matches {
            lhs: Box::new(lhs),
            regex,
            negate,
        })
    }

    fn parse_primary(&mut self) -> Result<Expr, LogPipelineError> {
        let Some(token) = self.advance() else {
            return Err(self.error_here("unexpected end of expression"));
        };

        match token.kind {
            TokenKind::Int(v) => Ok(Expr::Literal(FieldValue::Int(v))),
            TokenKind::Float(v) => Ok(Expr::Literal(FieldValue::Float(v))),
            TokenKind::Str(v) => Ok(Expr::Literal(FieldValue::Str(v))),
            TokenKind::True => Ok(Expr::Literal(FieldValue::Bool(true))),
            TokenKind::False => Ok(Expr::Literal(FieldValue::Bool(false))),
            TokenKind::Ident(name) => Ok(Expr::Ident(name)),
            TokenKind::Minus => match self.advance().map(|t| t.kind) {
                Some(TokenKind::Int(v)) => Ok(Expr::Literal(FieldValue::Int(-v))),
                Some(TokenKind::Float(v)) => Ok(Expr::Literal(FieldValue::Float(-v))),
                _ => Err(LogPipelineError::Expression {
                    position: token.position,
                    reason: "'-' must precede a number".to_owned(),
                }),
            },
            TokenKind::LParen => {
                let inner = self.parse_or()?;
                match self.advance() {
                    Some(Token {
                        kind: TokenKind::RParen,
                        ..
                    }) => Ok(inner),
                    _ => Err(LogPipelineError::Expression {
                        position: token.position,
                        reason: "unclosed '('".to_owned(),
                    }),
                }
            }
            other => Err(LogPipelineError::Expression {
                position: token.position,
                reason: format!("unexpected token {other:?}"),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> ConditionParams {
        let mut params = ConditionParams::new();
        params.insert("severity".to_owned(), FieldValue::Str("error".to_owned()));
        params.insert("statuscode".to_owned(), FieldValue::Str("502".to_owned()));
        params.insert("int_statuscode".to_owned(), FieldValue::Int(502));
        params.insert("executiontime".to_owned(), FieldValue::Float(1.5));
        params.insert(
            "description".to_owned(),
            FieldValue::Str("disk failure on sda".to_owned()),
        );
        params
    }

    fn eval(input: &str) -> Result<bool, EvalError> {
        Expr::parse(input).unwrap().eval_bool(&params())
    }

    #[test]
    fn comparisons() {
        assert_eq!(eval("int_statuscode >= 500"), Ok(true));
        assert_eq!(eval("int_statuscode < 500"), Ok(false));
        assert_eq!(eval("severity == 'error'"), Ok(true));
        assert_eq!(eval("severity != \"error\""), Ok(false));
        assert_eq!(eval("statuscode == '502'"), Ok(true));
    }

    #[test]
    fn mixed_numbers_compare_as_float() {
        assert_eq!(eval("executiontime > 1"), Ok(true));
        assert_eq!(eval("int_statuscode == 502.0"), Ok(true));
        assert_eq!(eval("executiontime <= -2"), Ok(false));
    }

    #[test]
    fn logic_and_precedence() {
        assert_eq!(eval("severity == 'info' || int_statuscode == 502"), Ok(true));
        assert_eq!(eval("severity == 'error' and int_statuscode == 200"), Ok(false));
        // && binds tighter than ||
        assert_eq!(
            eval("severity == 'info' && int_statuscode == 1 || true"),
            Ok(true)
        );
        assert_eq!(eval("!(severity == 'info')"), Ok(true));
        assert_eq!(eval("not true"), Ok(false));
    }

    #[test]
    fn short_circuit_skips_unknown_identifiers() {
        assert_eq!(eval("true || missing == 1"), Ok(true));
        assert_eq!(eval("false && missing == 1"), Ok(false));
    }

    #[test]
    fn regex_operators() {
        assert_eq!(eval("description =~ 'disk (failure|error)'"), Ok(true));
        assert_eq!(eval("description !~ '^disk'"), Ok(false));
    }

    #[test]
    fn unknown_identifier_is_an_eval_error() {
        assert_eq!(
            eval("upstream == 'api'"),
            Err(EvalError::UnknownIdentifier("upstream".to_owned()))
        );
    }

    #[test]
    fn type_mismatch_is_an_eval_error() {
        assert!(matches!(
            eval("statuscode == 502"),
            Err(EvalError::TypeMismatch { .. })
        ));
        assert!(matches!(eval("true < false"), Err(EvalError::TypeMismatch { .. })));
        assert!(matches!(
            eval("int_statuscode =~ '5..'"),
            Err(EvalError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn non_boolean_result_is_an_eval_error() {
        assert_eq!(eval("int_statuscode"), Err(EvalError::NotBoolean("int")));
        assert_eq!(eval("'text'"), Err(EvalError::NotBoolean("string")));
    }

    #[test]
    fn parse_errors() {
        assert!(Expr::parse("").is_err());
        assert!(Expr::parse("severity ==").is_err());
        assert!(Expr::parse("(severity == 'x'").is_err());
        assert!(Expr::parse("severity == 'x')").is_err());
        assert!(Expr::parse("a =~ b").is_err());
        assert!(Expr::parse("a =~ '('").is_err());
        assert!(Expr::parse("a == - b").is_err());
    }

    #[test]
    fn deep_nesting_is_rejected() {
        let deep = format!("{}true{}", "(".repeat(200), ")".repeat(200));
        assert!(Expr::parse(&deep).is_err());

        let nots = format!("{}true", "!".repeat(200));
        assert!(Expr::parse(&nots).is_err());
    }
}
