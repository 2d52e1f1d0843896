//! Tokenizer for capture condition expressions.

use crate::error::LogPipelineError;

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Int(i64),
    Float(f64),
    Str(String),
    Ident(String),
    True,
    False,
    And,
    Or,
    Not,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Match,
    NotMatch,
    Minus,
    LParen,
    RParen,
}

/// A token and its byte offset in the condition text.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub position: usize,
}

pub fn tokenize(input: &str) -> Result<Vec<Token>, LogPipelineError> {
    let bytes = input.as_bytes();
    let mut tokens = Vec::new();
    let mut pos = 0;

    while pos < bytes.len() {
        let start = pos;
        let c = bytes[pos];

        if c.is_ascii_whitespace() {
            pos += 1;
            continue;
        }

        let two = bytes.get(pos + 1).copied();
        let (kind, len) = match (c, two) {
            (b'&', Some(b'&')) => (TokenKind::And, 2),
            (b'|', Some(b'|')) => (TokenKind::Or, 2),
            (b'=', Some(b'=')) => (TokenKind::Eq, 2),
            (b'=', Some(b'~')) => (TokenKind::Match, 2),
            (b'!', Some(b'=')) => (TokenKind::Ne, 2),
            (b'!', Some(b'~')) => (TokenKind::NotMatch, 2),
            (b'<', Some(b'=')) => (TokenKind::Le, 2),
            (b'>', Some(b'=')) => (TokenKind::Ge, 2),
            (b'!', _) => (TokenKind::Not, 1),
            (b'<', _) => (TokenKind::Lt, 1),
            (b'>', _) => (TokenKind::Gt, 1),
            (b'-', _) => (TokenKind::Minus, 1),
            (b'(', _) => (TokenKind::LParen, 1),
            (b')', _) => (TokenKind::RParen, 1),
            (b'\'' | b'"', _) => {
                let (value, consumed) = read_string(input, pos)?;
                tokens.push(Token {
                    kind: TokenKind::Str(value),
                    position: start,
                });
                pos += consumed;
                continue;
            }
            (b'0'..=b'9', _) => {
                let (kind, consumed) = read_number(input, pos)?;
                tokens.push(Token {
                    kind,
                    position: start,
                });
                pos += consumed;
                continue;
            }
            (c, _) if c.is_ascii_alphabetic() || c == b'_' => {
                let end = bytes[pos..]
                    .iter()
                    .position(|b| !(b.is_ascii_alphanumeric() || *b == b'_'))
                    .map_or(bytes.len(), |offset| pos + offset);
                let word = &input[pos..end];
                let kind = match word.to_ascii_lowercase().as_str() {
                    "true" => TokenKind::True,
                    "false" => TokenKind::False,
                    "and" => TokenKind::And,
                    "or" => TokenKind::Or,
                    "not" => TokenKind::Not,
                    _ => TokenKind::Ident(word.to_owned()),
                };
                tokens.push(Token {
                    kind,
                    position: start,
                });
                pos = end;
                continue;
            }
            _ => {
                let ch = input[pos..].chars().next().unwrap_or('?');
                return Err(LogPipelineError::Expression {
                    position: pos,
                    reason: format!("unexpected character '{ch}'"),
                });
            }
        };

        tokens.push(Token {
            kind,
            position: start,
        });
        pos += len;
    }

    Ok(tokens)
}

/// Reads a quoted string starting at `start`; returns the value and bytes consumed.
fn read_string(input: &str, start: usize) -> Result<(String, usize), LogPipelineError> {
    let mut chars = input[start..].char_indices();
    let quote = match chars.next() {
        Some((_, q)) => q,
        None => {
            return Err(LogPipelineError::Expression {
                position: start,
                reason: "expected string".to_owned(),
            });
        }
    };

    let mut value = String::new();
    while let Some((offset, ch)) = chars.next() {
        match ch {
            '\\' => match chars.next() {
                Some((_, 'n')) => value.push('\n'),
                Some((_, 't')) => value.push('\t'),
                Some((_, other)) => value.push(other),
                None => break,
            },
            c if c == quote => return Ok((value, offset + c.len_utf8())),
            c => value.push(c),
        }
    }

    Err(LogPipelineError::Expression {
        position: start,
        reason: "unterminated string".to_owned(),
    })
}

fn read_number(input: &str, start: usize) -> Result<(TokenKind, usize), LogPipelineError> {
    let bytes = input.as_bytes();
    let mut end = start;
    let mut seen_dot = false;

    while end < bytes.len() {
        match bytes[end] {
            b'0'..=b'9' => end += 1,
            b'.' if !seen_dot && bytes.get(end + 1).is_some_and(u8::is_ascii_digit) => {
                seen_dot = true;
                end += 1;
            }
            _ => break,
        }
    }

    let text = &input[start..end];
    let kind = if seen_dot {
        text.parse::<f64>().map(TokenKind::Float).ok()
    } else {
        text.parse::<i64>().map(TokenKind::Int).ok()
    };

    kind.map(|kind| (kind, end - start))
        .ok_or_else(|| LogPipelineError::Expression {
            position: start,
            reason: format!("invalid number '{text}'"),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<TokenKind> {
        tokenize(input)
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn operators_and_literals() {
        assert_eq!(
            kinds("int_statuscode >= 500 && severity != 'info'"),
            vec![
                TokenKind::Ident("int_statuscode".to_owned()),
                TokenKind::Ge,
                TokenKind::Int(500),
                TokenKind::And,
                TokenKind::Ident("severity".to_owned()),
                TokenKind::Ne,
                TokenKind::Str("info".to_owned()),
            ]
        );
    }

    #[test]
    fn keywords_are_case_insensitive() {
        assert_eq!(
            kinds("NOT a Or TRUE"),
            vec![
                TokenKind::Not,
                TokenKind::Ident("a".to_owned()),
                TokenKind::Or,
                TokenKind::True,
            ]
        );
    }

    #[test]
    fn floats_and_regex_ops() {
        assert_eq!(
            kinds("executiontime > 1.25 || description =~ \"dis[kc]\""),
            vec![
                TokenKind::Ident("executiontime".to_owned()),
                TokenKind::Gt,
                TokenKind::Float(1.25),
                TokenKind::Or,
                TokenKind::Ident("description".to_owned()),
                TokenKind::Match,
                TokenKind::Str("dis[kc]".to_owned()),
            ]
        );
    }

    #[test]
    fn string_escapes() {
        assert_eq!(
            kinds(r#"'it\'s' "a\"b" 'x\\d'"#),
            vec![
                TokenKind::Str("it's".to_owned()),
                TokenKind::Str("a\"b".to_owned()),
                TokenKind::Str("x\\d".to_owned()),
            ]
        );
    }

    #[test]
    fn unterminated_string_is_an_error() {
        assert!(tokenize("severity == 'err").is_err());
    }

    #[test]
    fn unexpected_character_reports_position() {
        match tokenize("a == 1 # b") {
            Err(LogPipelineError::Expression { position, .. }) => assert_eq!(position, 7),
            other => panic!("expected expression error, got {other:?}"),
        }
    }

    #[test]
    fn integer_overflow_is_an_error() {
        assert!(tokenize("x > 99999999999999999999").is_err());
    }
}
