//! Recursive-descent JSON parser that records the span of every value.

use super::path::JsonPath;
use super::position::{Position, PositionIndex, Span};
use miette::{Diagnostic, SourceSpan};
use serde_json::{Map, Number, Value};
use std::cell::Cell;
use thiserror::Error;

/// Maximum nesting depth accepted before parsing is aborted.
pub const MAX_DEPTH: usize = 256;

/// Malformed JSON text.
#[derive(Debug, Clone, PartialEq, Eq, Error, Diagnostic)]
#[error("{message} at line {line}, column {column}")]
#[diagnostic(code(openapi_lint::parse))]
pub struct ParseError {
    /// What went wrong.
    pub message: String,
    /// Line of the offending character (1-indexed).
    pub line: usize,
    /// Column of the offending character (1-indexed).
    pub column: usize,
    /// Byte span of the offending character.
    #[label("here")]
    pub span: SourceSpan,
}

/// Parsed tree plus the position of every node in it.
#[derive(Debug, Clone)]
pub struct ParsedJson {
    /// The value tree.
    pub value: Value,
    /// Span of every structural path in `value`.
    pub positions: PositionIndex,
}

/// Parses `text` into a value tree and its position index.
///
/// # Errors
///
/// Returns a [`ParseError`] pointing at the first offending character.
pub fn parse(text: &str) -> Result<ParsedJson, ParseError> {
    let mut parser = Parser::new(text);
    parser.skip_bom();
    let value = parser.parse_value(&mut JsonPath::root(), 0)?;
    parser.skip_whitespace();
    if parser.peek().is_some() {
        return Err(parser.error("unexpected trailing characters"));
    }
    Ok(ParsedJson {
        value,
        positions: parser.positions,
    })
}

struct Parser<'a> {
    text: &'a str,
    bytes: &'a [u8],
    pos: usize,
    line: usize,
    line_start: usize,
    /// `(offset, column)` of the last position computed on the current line.
    column_cache: Cell<(usize, usize)>,
    positions: PositionIndex,
}

impl<'a> Parser<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            text,
            bytes: text.as_bytes(),
            pos: 0,
            line: 1,
            line_start: 0,
            column_cache: Cell::new((0, 0)),
            positions: PositionIndex::new(),
        }
    }

    fn skip_bom(&mut self) {
        if self.text.starts_with('\u{feff}') {
            self.pos = '\u{feff}'.len_utf8();
            self.line_start = self.pos;
        }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn eat(&mut self, byte: u8) -> bool {
        if self.peek() == Some(byte) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn skip_whitespace(&mut self) {
        while let Some(byte) = self.peek() {
            match byte {
                b' ' | b'\t' | b'\r' => self.pos += 1,
                b'\n' => {
                    self.pos += 1;
                    self.line += 1;
                    self.line_start = self.pos;
                }
                _ => break,
            }
        }
    }

    /// Position of `offset`, which must lie on the current line.
    ///
    /// Characters are counted from the last computed position when it lies
    /// before `offset` on the same line, so a single-line document is
    /// scanned once.
    fn position_at(&self, offset: usize) -> Position {
        let (cached_offset, cached_column) = self.column_cache.get();
        let (from, base) = if cached_offset >= self.line_start && cached_offset <= offset {
            (cached_offset, cached_column)
        } else {
            (self.line_start, 0)
        };
        let column = base
            + self
                .text
                .get(from..offset)
                .map_or(offset - from, |s| s.chars().count());
        self.column_cache.set((offset, column));
        Position::new(self.line, column + 1, offset)
    }

    fn position(&self) -> Position {
        self.position_at(self.pos)
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        self.error_at(self.pos, message)
    }

    fn error_at(&self, offset: usize, message: impl Into<String>) -> ParseError {
        let position = self.position_at(offset);
        let len = usize::from(offset < self.bytes.len());
        ParseError {
            message: message.into(),
            line: position.line,
            column: position.column,
            span: (offset, len).into(),
        }
    }

    fn parse_value(&mut self, path: &mut JsonPath, depth: usize) -> Result<Value, ParseError> {
        self.skip_whitespace();
        if depth > MAX_DEPTH {
            return Err(self.error(format!("nesting deeper than {MAX_DEPTH} levels")));
        }

        let start = self.position();
        let value = match self.peek() {
            None => return Err(self.error("unexpected end of input")),
            Some(b'{') => self.parse_object(path, depth)?,
            Some(b'[') => self.parse_array(path, depth)?,
            Some(b'"') => Value::String(self.parse_string()?),
            Some(b't') => self.parse_literal("true", Value::Bool(true))?,
            Some(b'f') => self.parse_literal("false", Value::Bool(false))?,
            Some(b'n') => self.parse_literal("null", Value::Null)?,
            Some(b'-' | b'0'..=b'9') => self.parse_number()?,
            Some(_) => {
                let found = self.text[self.pos..].chars().next().unwrap_or_default();
                return Err(self.error(format!("unexpected character '{found}'")));
            }
        };
        let end = self.position();

        self.positions.insert(path.clone(), Span::new(start, end));
        Ok(value)
    }

    fn parse_object(&mut self, path: &mut JsonPath, depth: usize) -> Result<Value, ParseError> {
        self.pos += 1;
        let mut map = Map::new();

        self.skip_whitespace();
        if self.eat(b'}') {
            return Ok(Value::Object(map));
        }

        loop {
            self.skip_whitespace();
            if self.peek() != Some(b'"') {
                return Err(self.error("expected string key"));
            }
            let key = self.parse_string()?;

            self.skip_whitespace();
            if !self.eat(b':') {
                return Err(self.error("expected ':' after object key"));
            }

            path.push(key.clone());
            if map.contains_key(&key) {
                // The last occurrence wins, positions included.
                self.positions.remove_subtree(path);
            }
            let value = self.parse_value(path, depth + 1);
            path.pop();
            map.insert(key, value?);

            self.skip_whitespace();
            match self.peek() {
                Some(b',') => self.pos += 1,
                Some(b'}') => {
                    self.pos += 1;
                    return Ok(Value::Object(map));
                }
                _ => return Err(self.error("expected ',' or '}' in object")),
            }
        }
    }

    fn parse_array(&mut self, path: &mut JsonPath, depth: usize) -> Result<Value, ParseError> {
        self.pos += 1;
        let mut items = Vec::new();

        self.skip_whitespace();
        if self.eat(b']') {
            return Ok(Value::Array(items));
        }

        loop {
            path.push(items.len());
            let value = self.parse_value(path, depth + 1);
            path.pop();
            items.push(value?);

            self.skip_whitespace();
            match self.peek() {
                Some(b',') => self.pos += 1,
                Some(b']') => {
                    self.pos += 1;
                    return Ok(Value::Array(items));
                }
                _ => return Err(self.error("expected ',' or ']' in array")),
            }
        }
    }

    fn parse_string(&mut self) -> Result<String, ParseError> {
        let start = self.pos;
        self.pos += 1;

        loop {
            match self.peek() {
                None => return Err(self.error_at(start, "unterminated string")),
                Some(b'"') => {
                    self.pos += 1;
                    break;
                }
                Some(b'\\') => self.pos += 2,
                Some(byte) if byte < 0x20 => {
                    return Err(self.error("control character in string"));
                }
                Some(_) => self.pos += 1,
            }
        }

        // Escapes are decoded by serde_json once the literal's extent is known.
        serde_json::from_str(&self.text[start..self.pos])
            .map_err(|e| self.error_at(start, format!("invalid string literal: {e}")))
    }

    fn parse_number(&mut self) -> Result<Value, ParseError> {
        let start = self.pos;
        while let Some(byte) = self.peek() {
            if byte.is_ascii_digit() || matches!(byte, b'-' | b'+' | b'.' | b'e' | b'E') {
                self.pos += 1;
            } else {
                break;
            }
        }

        let literal = &self.text[start..self.pos];
        serde_json::from_str::<Number>(literal)
            .map(Value::Number)
            .map_err(|_| self.error_at(start, format!("invalid number '{literal}'")))
    }

    fn parse_literal(&mut self, word: &str, value: Value) -> Result<Value, ParseError> {
        if self.text[self.pos..].starts_with(word) {
            self.pos += word.len();
            Ok(value)
        } else {
            Err(self.error("invalid literal"))
        }
    }
}
