//! Literal decoder for model output.
//!
//! Accepts Python data literals (strings in either quote style, numbers,
//! `True`/`False`/`None`, lists, tuples, sets and dicts) plus their JSON
//! spellings. Nothing is evaluated: names, calls and operators other
//! than a leading sign are rejected. Markdown code fences around the
//! literal and any text after it are tolerated.

use crate::error::{DigestError, Result};
use std::fmt;

/// Nesting limit for containers
const MAX_DEPTH: usize = 64;

/// A decoded data literal
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Literal>),
    Tuple(Vec<Literal>),
    Set(Vec<Literal>),
    Dict(Vec<(Literal, Literal)>),
}

impl Literal {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Literal::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Numeric value of an int or float literal
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Literal::Int(i) => Some(*i as f64),
            Literal::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Elements of a list, tuple or set
    pub fn into_items(self) -> Option<Vec<Literal>> {
        match self {
            Literal::List(items) | Literal::Tuple(items) | Literal::Set(items) => Some(items),
            _ => None,
        }
    }

    /// Look up a string key in a dict literal
    pub fn get(&self, key: &str) -> Option<&Literal> {
        match self {
            Literal::Dict(pairs) => pairs
                .iter()
                .rev()
                .find(|(k, _)| k.as_str() == Some(key))
                .map(|(_, v)| v),
            _ => None,
        }
    }

    pub fn is_dict(&self) -> bool {
        matches!(self, Literal::Dict(_))
    }

    /// Python `repr()` of the literal
    pub fn repr(&self) -> String {
        match self {
            Literal::Str(s) => quote(s),
            other => other.to_string(),
        }
    }
}

/// Renders like Python `str()`: strings bare, containers with reprs inside.
impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::None => write!(f, "None"),
            Literal::Bool(true) => write!(f, "True"),
            Literal::Bool(false) => write!(f, "False"),
            Literal::Int(i) => write!(f, "{}", i),
            Literal::Float(x) => {
                if x.is_finite() && x.fract() == 0.0 && x.abs() < 1e16 {
                    write!(f, "{:.1}", x)
                } else {
                    write!(f, "{}", x)
                }
            }
            Literal::Str(s) => write!(f, "{}", s),
            Literal::List(items) => write!(f, "[{}]", join_reprs(items)),
            Literal::Tuple(items) if items.len() == 1 => write!(f, "({},)", items[0].repr()),
            Literal::Tuple(items) => write!(f, "({})", join_reprs(items)),
            Literal::Set(items) if items.is_empty() => write!(f, "set()"),
            Literal::Set(items) => write!(f, "{{{}}}", join_reprs(items)),
            Literal::Dict(pairs) => {
                let body = pairs
                    .iter()
                    .map(|(k, v)| format!("{}: {}", k.repr(), v.repr()))
                    .collect::<Vec<_>>()
                    .join(", ");
                write!(f, "{{{}}}", body)
            }
        }
    }
}

fn join_reprs(items: &[Literal]) -> String {
    items
        .iter()
        .map(Literal::repr)
        .collect::<Vec<_>>()
        .join(", ")
}

fn quote(s: &str) -> String {
    let delim = if s.contains('\'') && !s.contains('"') { '"' } else { '\'' };
    let mut out = String::with_capacity(s.len() + 2);
    out.push(delim);
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c if c == delim => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out.push(delim);
    out
}

/// Decode the first literal in `text`.
pub fn parse_literal(text: &str) -> Result<Literal> {
    let body = strip_code_fence(text);
    let mut parser = Parser::new(body);
    parser.skip_ws();
    if parser.at_end() {
        return Err(parser.error("empty input"));
    }
    parser.value(0)
}

/// Drop a surrounding markdown fence such as ```` ```python ````.
fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = match rest.find('\n') {
        Some(nl) => &rest[nl + 1..],
        None => rest,
    };
    match rest.rfind("```") {
        Some(end) => rest[..end].trim(),
        None => rest.trim(),
    }
}

struct Parser<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(src: &'a str) -> Self {
        Self { src, pos: 0 }
    }

    fn error(&self, message: impl Into<String>) -> DigestError {
        DigestError::Literal {
            offset: self.pos,
            message: message.into(),
        }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.src.len()
    }

    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.pos += expected.len_utf8();
            true
        } else {
            false
        }
    }

    fn skip_ws(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_whitespace() {
                self.pos += c.len_utf8();
            } else {
                break;
            }
        }
    }

    fn value(&mut self, depth: usize) -> Result<Literal> {
        if depth > MAX_DEPTH {
            return Err(self.error("nesting too deep"));
        }
        self.skip_ws();
        match self.peek() {
            None => Err(self.error("unexpected end of input")),
            Some('[') => {
                self.bump();
                let items = self.sequence(']', depth)?;
                Ok(Literal::List(items))
            }
            Some('(') => self.paren(depth),
            Some('{') => self.brace(depth),
            Some('\'') | Some('"') => self.strings(),
            Some(c) if c == '-' || c == '+' || c == '.' || c.is_ascii_digit() => self.number(),
            Some(c) if c.is_alphabetic() || c == '_' => self.word(),
            Some(c) => Err(self.error(format!("unexpected '{}'", c))),
        }
    }

    /// Comma separated values up to `close`, trailing comma allowed.
    fn sequence(&mut self, close: char, depth: usize) -> Result<Vec<Literal>> {
        let mut items = Vec::new();
        loop {
            self.skip_ws();
            if self.eat(close) {
                return Ok(items);
            }
            items.push(self.value(depth + 1)?);
            self.skip_ws();
            if self.eat(',') {
                continue;
            }
            if self.eat(close) {
                return Ok(items);
            }
            return Err(self.error(format!("expected ',' or '{}'", close)));
        }
    }

    fn paren(&mut self, depth: usize) -> Result<Literal> {
        self.bump();
        self.skip_ws();
        if self.eat(')') {
            return Ok(Literal::Tuple(Vec::new()));
        }
        let first = self.value(depth + 1)?;
        self.skip_ws();
        if self.eat(')') {
            // plain parenthesised expression
            return Ok(first);
        }
        if !self.eat(',') {
            return Err(self.error("expected ',' or ')'"));
        }
        let mut items = vec![first];
        items.extend(self.sequence(')', depth)?);
        Ok(Literal::Tuple(items))
    }

    fn brace(&mut self, depth: usize) -> Result<Literal> {
        self.bump();
        self.skip_ws();
        if self.eat('}') {
            return Ok(Literal::Dict(Vec::new()));
        }
        let first = self.value(depth + 1)?;
        self.skip_ws();
        if !self.eat(':') {
            let mut items = vec![first];
            if self.eat(',') {
                items.extend(self.sequence('}', depth)?);
            } else if !self.eat('}') {
                return Err(self.error("expected ',', ':' or '}'"));
            }
            return Ok(Literal::Set(items));
        }

        let mut pairs = Vec::new();
        let mut key = first;
        loop {
            let value = self.value(depth + 1)?;
            pairs.push((key, value));
            self.skip_ws();
            if self.eat('}') {
                return Ok(Literal::Dict(pairs));
            }
            if !self.eat(',') {
                return Err(self.error("expected ',' or '}'"));
            }
            self.skip_ws();
            if self.eat('}') {
                return Ok(Literal::Dict(pairs));
            }
            key = self.value(depth + 1)?;
            self.skip_ws();
            if !self.eat(':') {
                return Err(self.error("expected ':'"));
            }
        }
    }

    fn word(&mut self) -> Result<Literal> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' {
                self.pos += c.len_utf8();
            } else {
                break;
            }
        }
        let word = &self.src[start..self.pos];

        // string prefixes: r'..', u"..", b'..', rb'..'
        if matches!(self.peek(), Some('\'') | Some('"'))
            && word.len() <= 2
            && word.chars().all(|c| matches!(c.to_ascii_lowercase(), 'r' | 'u' | 'b'))
        {
            self.pos = start;
            return self.strings();
        }

        match word {
            "True" | "true" => Ok(Literal::Bool(true)),
            "False" | "false" => Ok(Literal::Bool(false)),
            "None" | "null" => Ok(Literal::None),
            _ => {
                self.pos = start;
                Err(self.error(format!("'{}' is not a literal", word)))
            }
        }
    }

    /// One string, or several adjacent ones concatenated as Python does.
    fn strings(&mut self) -> Result<Literal> {
        let mut out = self.string()?;
        loop {
            let save = self.pos;
            self.skip_ws();
            let next_is_string = match self.peek() {
                Some('\'') | Some('"') => true,
                Some(c) if matches!(c.to_ascii_lowercase(), 'r' | 'u' | 'b') => {
                    let rest = &self.src[self.pos..];
                    rest.char_indices()
                        .take(3)
                        .find(|(_, c)| !matches!(c.to_ascii_lowercase(), 'r' | 'u' | 'b'))
                        .map(|(_, c)| c == '\'' || c == '"')
                        .unwrap_or(false)
                }
                _ => false,
            };
            if !next_is_string {
                self.pos = save;
                return Ok(Literal::Str(out));
            }
            out.push_str(&self.string()?);
        }
    }

    fn string(&mut self) -> Result<String> {
        let mut raw = false;
        while let Some(c) = self.peek() {
            match c.to_ascii_lowercase() {
                'r' => raw = true,
                'u' | 'b' => {}
                _ => break,
            }
            self.bump();
        }

        let quote = match self.bump() {
            Some(q @ ('\'' | '"')) => q,
            _ => return Err(self.error("expected quote")),
        };
        let triple = self.src[self.pos..].starts_with(&format!("{q}{q}", q = quote));
        if triple {
            self.pos += 2 * quote.len_utf8();
        }

        let mut out = String::new();
        loop {
            let c = self.bump().ok_or_else(|| self.error("unterminated string"))?;
            if c == quote {
                if !triple {
                    return Ok(out);
                }
                if self.src[self.pos..].starts_with(&format!("{q}{q}", q = quote)) {
                    self.pos += 2 * quote.len_utf8();
                    return Ok(out);
                }
                out.push(c);
                continue;
            }
            if c == '\n' && !triple {
                return Err(self.error("newline in single-quoted string"));
            }
            if c != '\\' {
                out.push(c);
                continue;
            }

            let esc = self.bump().ok_or_else(|| self.error("unterminated string"))?;
            if raw {
                out.push('\\');
                out.push(esc);
                continue;
            }
            match esc {
                '\n' => {}
                '\\' => out.push('\\'),
                '\'' => out.push('\''),
                '"' => out.push('"'),
                'n' => out.push('\n'),
                't' => out.push('\t'),
                'r' => out.push('\r'),
                '0' => out.push('\0'),
                'a' => out.push('\u{07}'),
                'b' => out.push('\u{08}'),
                'f' => out.push('\u{0C}'),
                'v' => out.push('\u{0B}'),
                'x' => out.push(self.hex_escape(2)?),
                'u' => out.push(self.hex_escape(4)?),
                'U' => out.push(self.hex_escape(8)?),
                other => {
                    out.push('\\');
                    out.push(other);
                }
            }
        }
    }

    fn hex_escape(&mut self, digits: usize) -> Result<char> {
        let end = self.pos + digits;
        let hex = self
            .src
            .get(self.pos..end)
            .ok_or_else(|| self.error("truncated escape"))?;
        let code = u32::from_str_radix(hex, 16).map_err(|_| self.error("bad hex escape"))?;
        self.pos = end;
        char::from_u32(code).ok_or_else(|| self.error("escape is not a valid character"))
    }

    fn number(&mut self) -> Result<Literal> {
        let start = self.pos;
        let negative = match self.peek() {
            Some('-') => {
                self.bump();
                true
            }
            Some('+') => {
                self.bump();
                false
            }
            _ => false,
        };
        self.skip_ws();

        let digits_start = self.pos;
        let mut is_float = false;
        while let Some(c) = self.peek() {
            match c {
                '0'..='9' | '_' => {}
                '.' => is_float = true,
                'e' | 'E' => {
                    is_float = true;
                    self.bump();
                    if matches!(self.peek(), Some('+') | Some('-')) {
                        self.bump();
                    }
                    continue;
                }
                _ => break,
            }
            self.bump();
        }

        let digits: String = self.src[digits_start..self.pos]
            .chars()
            .filter(|c| *c != '_')
            .collect();
        if !digits.chars().any(|c| c.is_ascii_digit()) {
            self.pos = start;
            return Err(self.error("expected a number"));
        }

        let sign = if negative { -1.0 } else { 1.0 };
        if !is_float {
            if let Ok(i) = digits.parse::<i64>() {
                return Ok(Literal::Int(if negative { -i } else { i }));
            }
        }
        digits
            .parse::<f64>()
            .map(|f| Literal::Float(sign * f))
            .map_err(|_| {
                self.pos = start;
                self.error(format!("invalid number '{}'", digits))
            })
    }
}
