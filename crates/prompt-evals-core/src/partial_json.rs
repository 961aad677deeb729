//! Prefix-tolerant JSON decoding for streamed structured output.
//!
//! A model streaming a JSON object emits it left to right, so every
//! intermediate snapshot is a prefix of the final document. `parse_partial`
//! decodes such a prefix into the value known so far:
//!
//! - unterminated objects and arrays are closed where the text stops
//! - an unterminated string value keeps the characters received so far
//! - a key, number or literal cut off mid-token is dropped
//!
//! Text that is not a prefix of any JSON document is a `Parse` error.

use serde_json::{Map, Number, Value};

use crate::domain::{PromptEvalsError, Result};

/// Decode a possibly truncated JSON document.
pub fn parse_partial(text: &str) -> Result<Value> {
    let mut parser = Parser::new(text);
    parser.skip_ws();
    if parser.at_end() {
        return Err(PromptEvalsError::Parse("empty document".to_string()));
    }
    match parser.value()? {
        Parsed::Missing => Err(PromptEvalsError::Parse(
            "no complete token in document".to_string(),
        )),
        Parsed::Partial(value) => Ok(value),
        Parsed::Complete(value) => {
            parser.skip_ws();
            if parser.at_end() {
                Ok(value)
            } else {
                Err(parser.error("trailing characters after document"))
            }
        }
    }
}

enum Parsed {
    /// Value and its closing delimiter were seen.
    Complete(Value),
    /// Input ended inside this value.
    Partial(Value),
    /// Input ended before anything usable.
    Missing,
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
}

impl Parser {
    fn new(text: &str) -> Self {
        Self {
            chars: text.chars().collect(),
            pos: 0,
        }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.chars.len()
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        Some(c)
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    fn error(&self, what: &str) -> PromptEvalsError {
        PromptEvalsError::Parse(format!("{} at offset {}", what, self.pos))
    }

    fn value(&mut self) -> Result<Parsed> {
        self.skip_ws();
        match self.peek() {
            None => Ok(Parsed::Missing),
            Some('{') => self.object(),
            Some('[') => self.array(),
            Some('"') => Ok(match self.string()? {
                (s, true) => Parsed::Complete(Value::String(s)),
                (s, false) => Parsed::Partial(Value::String(s)),
            }),
            Some('t') => self.literal("true", Value::Bool(true)),
            Some('f') => self.literal("false", Value::Bool(false)),
            Some('n') => self.literal("null", Value::Null),
            Some(c) if c == '-' || c.is_ascii_digit() => self.number(),
            Some(_) => Err(self.error("unexpected character")),
        }
    }

    fn object(&mut self) -> Result<Parsed> {
        self.bump();
        let mut map = Map::new();
        loop {
            self.skip_ws();
            match self.peek() {
                None => return Ok(Parsed::Partial(Value::Object(map))),
                Some('}') => {
                    self.bump();
                    return Ok(Parsed::Complete(Value::Object(map)));
                }
                Some('"') => {}
                Some(_) => return Err(self.error("expected object key")),
            }

            let (key, key_done) = self.string()?;
            if !key_done {
                return Ok(Parsed::Partial(Value::Object(map)));
            }
            self.skip_ws();
            match self.bump() {
                None => return Ok(Parsed::Partial(Value::Object(map))),
                Some(':') => {}
                Some(_) => return Err(self.error("expected ':'")),
            }

            match self.value()? {
                Parsed::Missing => return Ok(Parsed::Partial(Value::Object(map))),
                Parsed::Partial(v) => {
                    map.insert(key, v);
                    return Ok(Parsed::Partial(Value::Object(map)));
                }
                Parsed::Complete(v) => {
                    map.insert(key, v);
                }
            }

            self.skip_ws();
            match self.bump() {
                None => return Ok(Parsed::Partial(Value::Object(map))),
                Some(',') => {}
                Some('}') => return Ok(Parsed::Complete(Value::Object(map))),
                Some(_) => return Err(self.error("expected ',' or '}'")),
            }
        }
    }

    fn array(&mut self) -> Result<Parsed> {
        self.bump();
        let mut items = Vec::new();
        loop {
            self.skip_ws();
            match self.peek() {
                None => return Ok(Parsed::Partial(Value::Array(items))),
                Some(']') => {
                    self.bump();
                    return Ok(Parsed::Complete(Value::Array(items)));
                }
                Some(_) => {}
            }

            match self.value()? {
                Parsed::Missing => return Ok(Parsed::Partial(Value::Array(items))),
                Parsed::Partial(v) => {
                    items.push(v);
                    return Ok(Parsed::Partial(Value::Array(items)));
                }
                Parsed::Complete(v) => items.push(v),
            }

            self.skip_ws();
            match self.bump() {
                None => return Ok(Parsed::Partial(Value::Array(items))),
                Some(',') => {}
                Some(']') => return Ok(Parsed::Complete(Value::Array(items))),
                Some(_) => return Err(self.error("expected ',' or ']'")),
            }
        }
    }

    /// Returns the decoded text and whether the closing quote was seen.
    fn string(&mut self) -> Result<(String, bool)> {
        self.bump();
        let mut out = String::new();
        loop {
            match self.bump() {
                None => return Ok((out, false)),
                Some('"') => return Ok((out, true)),
                Some('\\') => match self.bump() {
                    None => return Ok((out, false)),
                    Some('"') => out.push('"'),
                    Some('\\') => out.push('\\'),
                    Some('/') => out.push('/'),
                    Some('b') => out.push('\u{8}'),
                    Some('f') => out.push('\u{c}'),
                    Some('n') => out.push('\n'),
                    Some('r') => out.push('\r'),
                    Some('t') => out.push('\t'),
                    Some('u') => match self.unicode_escape()? {
                        Some(c) => out.push(c),
                        None => return Ok((out, false)),
                    },
                    Some(_) => return Err(self.error("invalid escape")),
                },
                Some(c) => out.push(c),
            }
        }
    }

    /// Decode the hex digits after `\u`, joining surrogate pairs.
    /// `None` means the input ended inside the escape.
    fn unicode_escape(&mut self) -> Result<Option<char>> {
        let Some(high) = self.hex4()? else {
            return Ok(None);
        };
        if !(0xD800..0xDC00).contains(&high) {
            return Ok(Some(char::from_u32(high).unwrap_or(char::REPLACEMENT_CHARACTER)));
        }

        match (self.peek(), self.chars.get(self.pos + 1).copied()) {
            (None, _) | (Some('\\'), None) => return Ok(None),
            (Some('\\'), Some('u')) => {}
            _ => return Ok(Some(char::REPLACEMENT_CHARACTER)),
        }
        self.pos += 2;
        let Some(low) = self.hex4()? else {
            return Ok(None);
        };
        let combined = 0x10000 + ((high - 0xD800) << 10) + (low.wrapping_sub(0xDC00) & 0x3FF);
        Ok(Some(
            char::from_u32(combined).unwrap_or(char::REPLACEMENT_CHARACTER),
        ))
    }

    fn hex4(&mut self) -> Result<Option<u32>> {
        let mut code = 0u32;
        for _ in 0..4 {
            let Some(c) = self.bump() else {
                return Ok(None);
            };
            let digit = c
                .to_digit(16)
                .ok_or_else(|| self.error("invalid unicode escape"))?;
            code = code * 16 + digit;
        }
        Ok(Some(code))
    }

    fn literal(&mut self, word: &str, value: Value) -> Result<Parsed> {
        for expected in word.chars() {
            match self.bump() {
                None => return Ok(Parsed::Missing),
                Some(c) if c == expected => {}
                Some(_) => return Err(self.error("invalid literal")),
            }
        }
        Ok(Parsed::Complete(value))
    }

    fn number(&mut self) -> Result<Parsed> {
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|c| c.is_ascii_digit() || matches!(c, '-' | '+' | '.' | 'e' | 'E'))
        {
            self.pos += 1;
        }
        let token: String = self.chars[start..self.pos].iter().collect();
        let parsed = serde_json::from_str::<Number>(&token).ok().map(Value::Number);

        match (parsed, self.at_end()) {
            (Some(n), false) => Ok(Parsed::Complete(n)),
            (Some(n), true) => Ok(Parsed::Partial(n)),
            (None, true) => Ok(Parsed::Missing),
            (None, false) => Err(self.error("invalid number")),
        }
    }
}
