//! `((name))` placeholder scanning and substitution.
//!
//! Scanning is a single left-to-right pass. Substituted text is never
//! rescanned, so a variable whose value itself looks like a placeholder is
//! inserted literally.

use serde_yaml::{Mapping, Value};

use crate::vars::VariablePool;

/// A piece of a scanned string
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Piece<'a> {
    /// Literal text
    Text(&'a str),
    /// Placeholder name, without the surrounding parentheses
    Token(&'a str),
}

/// Split `input` into literal text and placeholder tokens.
///
/// Identifiers are `[A-Za-z_][A-Za-z0-9_/.-]*`. Anything that opens with
/// `((` but does not form a valid token is kept as text.
pub fn scan(input: &str) -> Vec<Piece<'_>> {
    let bytes = input.as_bytes();
    let mut pieces = Vec::new();
    let mut text_start = 0;
    let mut i = 0;

    while i + 1 < bytes.len() {
        if bytes[i] == b'(' && bytes[i + 1] == b'(' {
            if let Some(end) = identifier_end(bytes, i + 2) {
                if bytes[end..].starts_with(b"))") {
                    if text_start < i {
                        pieces.push(Piece::Text(&input[text_start..i]));
                    }
                    pieces.push(Piece::Token(&input[i + 2..end]));
                    i = end + 2;
                    text_start = i;
                    continue;
                }
            }
        }
        i += 1;
    }

    if text_start < input.len() {
        pieces.push(Piece::Text(&input[text_start..]));
    }
    pieces
}

fn identifier_end(bytes: &[u8], start: usize) -> Option<usize> {
    let first = *bytes.get(start)?;
    if !(first.is_ascii_alphabetic() || first == b'_') {
        return None;
    }
    let mut end = start + 1;
    while let Some(&b) = bytes.get(end) {
        if b.is_ascii_alphanumeric() || matches!(b, b'_' | b'/' | b'.' | b'-') {
            end += 1;
        } else {
            break;
        }
    }
    Some(end)
}

/// Every placeholder name in `input`, in order of appearance
pub fn names(input: &str) -> impl Iterator<Item = &str> {
    scan(input).into_iter().filter_map(|piece| match piece {
        Piece::Token(name) => Some(name),
        Piece::Text(_) => None,
    })
}

/// One substitution pass over any number of documents sharing a pool.
///
/// Unresolved names are collected once each, in the order they were first
/// seen, and their tokens are left in place.
#[derive(Debug)]
pub struct Substitution<'p> {
    pool: &'p VariablePool,
    missing: Vec<String>,
    collisions: Vec<String>,
}

impl<'p> Substitution<'p> {
    pub fn new(pool: &'p VariablePool) -> Self {
        Self {
            pool,
            missing: Vec::new(),
            collisions: Vec::new(),
        }
    }

    /// Substitute every placeholder in `value`, keys included.
    pub fn apply(&mut self, value: Value) -> Value {
        match value {
            Value::String(s) => self.apply_str(s),
            Value::Sequence(items) => {
                Value::Sequence(items.into_iter().map(|item| self.apply(item)).collect())
            }
            Value::Mapping(mapping) => {
                let mut out = Mapping::with_capacity(mapping.len());
                for (key, value) in mapping {
                    let key = self.apply(key);
                    let value = self.apply(value);
                    if let Some(replaced) = out.insert(key.clone(), value) {
                        let key = stringify(&key);
                        tracing::warn!(%key, ?replaced, "substituted key collides with an existing key");
                        self.collisions.push(key);
                    }
                }
                Value::Mapping(out)
            }
            Value::Tagged(mut tagged) => {
                tagged.value = self.apply(tagged.value);
                Value::Tagged(tagged)
            }
            other => other,
        }
    }

    fn apply_str(&mut self, s: String) -> Value {
        let pieces = scan(&s);

        // A token spanning the whole scalar keeps the variable's type.
        if let [Piece::Token(name)] = pieces.as_slice() {
            return match self.pool.resolve(name) {
                Some(value) => value,
                None => {
                    self.record_missing(name);
                    Value::String(s)
                }
            };
        }
        if !pieces.iter().any(|p| matches!(p, Piece::Token(_))) {
            return Value::String(s);
        }

        let mut out = String::with_capacity(s.len());
        for piece in &pieces {
            match piece {
                Piece::Text(text) => out.push_str(text),
                Piece::Token(name) => match self.pool.resolve(name) {
                    Some(value) => out.push_str(&stringify(&value)),
                    None => {
                        self.record_missing(name);
                        out.push_str("((");
                        out.push_str(name);
                        out.push_str("))");
                    }
                },
            }
        }
        Value::String(out)
    }

    fn record_missing(&mut self, name: &str) {
        if !self.missing.iter().any(|m| m == name) {
            self.missing.push(name.to_string());
        }
    }

    /// Names that could not be resolved so far
    pub fn missing(&self) -> &[String] {
        &self.missing
    }

    pub fn into_missing(self) -> Vec<String> {
        self.missing
    }

    /// Mapping keys that two entries ended up sharing after substitution
    pub fn collisions(&self) -> &[String] {
        &self.collisions
    }
}

/// Render a value for embedding inside a larger string.
pub(crate) fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        other => serde_yaml::to_string(other)
            .map(|s| s.trim_end().to_string())
            .unwrap_or_default(),
    }
}
