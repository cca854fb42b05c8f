//! Configuration string parser.
//!
//! The grammar is small:
//!
//! ```text
//! list  := item ( "," item )*
//! item  := <empty> | key | key "=" value
//! key   := bare | quoted
//! value := <empty> | bare | quoted | "(" list ")"
//! ```
//!
//! Parsing is iterative over an explicit stack of open groups, so nesting
//! depth is bounded only by memory.

use super::{ConfigValue, FormatDescriptor};
use crate::error::{ImportError, ImportResult};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Bare(String),
    Quoted(String),
    Comma,
    Equals,
    Open,
    Close,
    End,
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::Bare(s) => format!("'{}'", s),
            Token::Quoted(s) => format!("\"{}\"", s),
            Token::Comma => "','".to_string(),
            Token::Equals => "'='".to_string(),
            Token::Open => "'('".to_string(),
            Token::Close => "')'".to_string(),
            Token::End => "end of input".to_string(),
        }
    }
}

struct Lexer<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Lexer<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    /// Returns the next token and the byte offset it starts at.
    fn next_token(&mut self) -> ImportResult<(Token, usize)> {
        while self.peek().is_some_and(char::is_whitespace) {
            self.bump();
        }
        let start = self.pos;
        let Some(c) = self.peek() else {
            return Ok((Token::End, start));
        };
        let token = match c {
            ',' => {
                self.bump();
                Token::Comma
            }
            '=' => {
                self.bump();
                Token::Equals
            }
            '(' => {
                self.bump();
                Token::Open
            }
            ')' => {
                self.bump();
                Token::Close
            }
            '"' => {
                self.bump();
                Token::Quoted(self.quoted(start)?)
            }
            _ => {
                while self
                    .peek()
                    .is_some_and(|c| !matches!(c, ',' | '=' | '(' | ')' | '"'))
                {
                    self.bump();
                }
                Token::Bare(self.input[start..self.pos].trim_end().to_string())
            }
        };
        Ok((token, start))
    }

    fn quoted(&mut self, start: usize) -> ImportResult<String> {
        let mut out = String::new();
        loop {
            match self.bump() {
                None => return Err(malformed(start, "unterminated quoted string")),
                Some('"') => return Ok(out),
                Some('\\') => match self.bump() {
                    Some(c @ ('"' | '\\')) => out.push(c),
                    Some(c) => {
                        out.push('\\');
                        out.push(c);
                    }
                    None => return Err(malformed(start, "unterminated quoted string")),
                },
                Some(c) => out.push(c),
            }
        }
    }
}

fn malformed(position: usize, reason: impl Into<String>) -> ImportError {
    ImportError::MalformedConfig {
        position,
        reason: reason.into(),
    }
}

/// Interprets a bare value.
///
/// `true` and `false` are booleans; a decimal integer with an optional size
/// suffix (`b`, `k`, `kb`, `m`, `mb`, `g`, `gb`, `t`, `tb`, any case, powers of
/// 1024) is an integer; anything else is a string. An integer that does not
/// fit in 64 bits is an error.
pub(crate) fn classify_bare(s: &str) -> Result<ConfigValue, String> {
    match s {
        "true" => return Ok(ConfigValue::Bool(true)),
        "false" => return Ok(ConfigValue::Bool(false)),
        _ => {}
    }

    let (negative, body) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s),
    };
    let digits_end = body
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(body.len());
    if digits_end == 0 {
        return Ok(ConfigValue::Str(s.to_string()));
    }
    let shift = match body[digits_end..].to_ascii_lowercase().as_str() {
        "" | "b" => 0,
        "k" | "kb" => 10,
        "m" | "mb" => 20,
        "g" | "gb" => 30,
        "t" | "tb" => 40,
        _ => return Ok(ConfigValue::Str(s.to_string())),
    };

    let out_of_range = || format!("integer '{}' out of range", s);
    let magnitude: i128 = body[..digits_end].parse().map_err(|_| out_of_range())?;
    let scaled = magnitude.checked_mul(1i128 << shift).ok_or_else(out_of_range)?;
    let signed = if negative { -scaled } else { scaled };
    i64::try_from(signed)
        .map(ConfigValue::Int)
        .map_err(|_| out_of_range())
}

struct Frame {
    desc: FormatDescriptor,
    key: String,
    open_pos: usize,
}

enum State {
    Key,
    AfterKey(String),
    Value(String),
    AfterValue,
}

/// Parses a configuration string into a descriptor.
///
/// # Errors
///
/// Returns [`ImportError::MalformedConfig`] with the byte offset of the
/// offending token on unbalanced parentheses, unterminated quotes, empty
/// keys, or tokens out of place.
pub fn parse(input: &str) -> ImportResult<FormatDescriptor> {
    let mut lexer = Lexer::new(input);
    let mut stack: Vec<Frame> = Vec::new();
    let mut current = FormatDescriptor::new();
    let mut state = State::Key;

    loop {
        let (token, pos) = lexer.next_token()?;

        // Completes the pending item, if any, before a delimiter.
        let pending = match std::mem::replace(&mut state, State::Key) {
            State::AfterKey(key) if matches!(token, Token::Comma | Token::Close | Token::End) => {
                current.set(key, ConfigValue::Flag);
                None
            }
            State::Value(key) if matches!(token, Token::Comma | Token::Close | Token::End) => {
                current.set(key, ConfigValue::Str(String::new()));
                None
            }
            other => Some(other),
        };

        match (pending, token) {
            (None | Some(State::Key) | Some(State::AfterValue), Token::Comma) => {
                state = State::Key;
            }
            (None | Some(State::Key) | Some(State::AfterValue), Token::Close) => {
                let Some(frame) = stack.pop() else {
                    return Err(malformed(pos, "unbalanced ')'"));
                };
                let group = std::mem::replace(&mut current, frame.desc);
                current.set(frame.key, ConfigValue::Group(group));
                state = State::AfterValue;
            }
            (None | Some(State::Key) | Some(State::AfterValue), Token::End) => {
                if let Some(frame) = stack.last() {
                    return Err(malformed(frame.open_pos, "unclosed '('"));
                }
                return Ok(current);
            }
            (Some(State::Key), Token::Bare(key)) => {
                state = State::AfterKey(key);
            }
            (Some(State::Key), Token::Quoted(key)) => {
                if key.is_empty() {
                    return Err(malformed(pos, "empty key"));
                }
                state = State::AfterKey(key);
            }
            (Some(State::Key), Token::Equals) => {
                return Err(malformed(pos, "empty key"));
            }
            (Some(State::AfterKey(key)), Token::Equals) => {
                state = State::Value(key);
            }
            (Some(State::Value(key)), Token::Open) => {
                let outer = std::mem::take(&mut current);
                stack.push(Frame {
                    desc: outer,
                    key,
                    open_pos: pos,
                });
                state = State::Key;
            }
            (Some(State::Value(key)), Token::Bare(raw)) => {
                let value = classify_bare(&raw).map_err(|reason| malformed(pos, reason))?;
                current.set(key, value);
                state = State::AfterValue;
            }
            (Some(State::Value(key)), Token::Quoted(s)) => {
                current.set(key, ConfigValue::Str(s));
                state = State::AfterValue;
            }
            (Some(State::Value(_)), Token::Equals) => {
                return Err(malformed(pos, "unexpected '=' in value"));
            }
            (Some(State::AfterValue), token) => {
                return Err(malformed(
                    pos,
                    format!("expected ',' after value, found {}", token.describe()),
                ));
            }
            (_, token) => {
                return Err(malformed(pos, format!("unexpected {}", token.describe())));
            }
        }
    }
}
