//! Ordered patch operations (`replace`, `remove`, `test`) over a YAML document.
//!
//! Path grammar, one token per `/`-separated segment:
//!
//! | Token | Meaning |
//! |---|---|
//! | `name` | mapping key (`~1` escapes `/`, `~0` escapes `~`) |
//! | `3`, `-1` | sequence index, negative counts from the end |
//! | `-` | after the last element (replace only) |
//! | `key=value` | the single element whose `key` equals `value` |
//! | `*` | every element |
//!
//! A trailing `?` marks the token, and every token after it, optional:
//! missing containers are created by `replace` and missing targets are
//! ignored by `remove`.

use std::fmt;
use std::path::Path;

use serde_yaml::{Mapping, Value};

use crate::error::{ConfigError, Result};
use crate::placeholder::{stringify, Substitution};

/// One step of a path expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Key(String),
    Index(i64),
    AfterLast,
    Matching { key: String, value: String },
    Wildcard,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub step: Step,
    pub optional: bool,
}

/// Parsed path expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pointer {
    raw: String,
    tokens: Vec<Token>,
}

impl Pointer {
    pub fn parse(raw: &str) -> Result<Self> {
        if raw.is_empty() || raw == "/" {
            return Ok(Self {
                raw: raw.to_string(),
                tokens: Vec::new(),
            });
        }
        let invalid = |reason: &str| ConfigError::InvalidPath {
            path: raw.to_string(),
            reason: reason.to_string(),
        };
        let rest = raw
            .strip_prefix('/')
            .ok_or_else(|| invalid("expected to start with '/'"))?;

        let mut tokens = Vec::new();
        for segment in rest.split('/') {
            let (segment, optional) = match segment.strip_suffix('?') {
                Some(s) => (s, true),
                None => (segment, false),
            };
            let step = match segment {
                "" => return Err(invalid("empty path segment")),
                "-" => Step::AfterLast,
                "*" => Step::Wildcard,
                _ => {
                    if let Ok(index) = segment.parse::<i64>() {
                        Step::Index(index)
                    } else if let Some((key, value)) = segment.split_once('=') {
                        Step::Matching {
                            key: unescape(key),
                            value: unescape(value),
                        }
                    } else {
                        Step::Key(unescape(segment))
                    }
                }
            };
            tokens.push(Token { step, optional });
        }

        Ok(Self {
            raw: raw.to_string(),
            tokens,
        })
    }

    pub fn is_root(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    fn has_wildcard(&self) -> bool {
        self.tokens.iter().any(|t| t.step == Step::Wildcard)
    }
}

impl fmt::Display for Pointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

fn unescape(segment: &str) -> String {
    segment.replace("~1", "/").replace("~0", "~")
}

/// What a `test` operation expects at its path
#[derive(Debug, Clone, PartialEq)]
pub enum Expectation {
    Value(Value),
    Absent,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    Replace { path: Pointer, value: Value },
    Remove { path: Pointer },
    Test { path: Pointer, expect: Expectation },
}

impl Operation {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Replace { .. } => "replace",
            Self::Remove { .. } => "remove",
            Self::Test { .. } => "test",
        }
    }

    pub fn path(&self) -> &Pointer {
        match self {
            Self::Replace { path, .. } | Self::Remove { path } | Self::Test { path, .. } => path,
        }
    }
}

/// An ordered list of operations loaded from one ops file
#[derive(Debug, Clone)]
pub struct Overlay {
    origin: String,
    operations: Vec<Operation>,
}

impl Overlay {
    pub fn new(origin: impl Into<String>, operations: Vec<Operation>) -> Self {
        Self {
            origin: origin.into(),
            operations,
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&path.display().to_string(), &contents)
    }

    pub fn parse(origin: &str, contents: &str) -> Result<Self> {
        let doc: Value =
            serde_yaml::from_str(contents).map_err(|e| ConfigError::parse(origin, e))?;
        let entries = match doc {
            Value::Null => Vec::new(),
            Value::Sequence(entries) => entries,
            _ => return Err(ConfigError::parse(origin, "expected a sequence of operations")),
        };

        let operations = entries
            .into_iter()
            .enumerate()
            .map(|(index, raw)| parse_operation(origin, index, raw))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(origin, operations))
    }

    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    /// Run the same placeholder substitution over every operation value.
    pub fn substitute(mut self, substitution: &mut Substitution<'_>) -> Self {
        for op in &mut self.operations {
            match op {
                Operation::Replace { value, .. }
                | Operation::Test {
                    expect: Expectation::Value(value),
                    ..
                } => {
                    *value = substitution.apply(std::mem::take(value));
                }
                _ => {}
            }
        }
        self
    }

    /// Apply every operation in order. Stops at the first failure.
    pub fn apply(&self, doc: &mut Value) -> Result<()> {
        for (index, op) in self.operations.iter().enumerate() {
            let outcome = match op {
                Operation::Replace { path, value } => replace(doc, path.tokens(), value, false),
                Operation::Remove { path } => remove(doc, path.tokens(), false),
                Operation::Test { path, expect } => test(doc, path.tokens(), expect),
            };
            outcome.map_err(|reason| ConfigError::OperationFailed {
                origin: self.origin.clone(),
                index,
                kind: op.kind(),
                path: op.path().to_string(),
                reason,
            })?;
            tracing::trace!(origin = %self.origin, index, kind = op.kind(), "applied operation");
        }
        Ok(())
    }
}

fn parse_operation(origin: &str, index: usize, raw: Value) -> Result<Operation> {
    let invalid = |reason: String| ConfigError::InvalidOperation {
        origin: origin.to_string(),
        index,
        reason,
    };
    let Value::Mapping(mut fields) = raw else {
        return Err(invalid("expected a mapping".to_string()));
    };

    let kind = match fields.shift_remove("type") {
        Some(Value::String(kind)) => kind,
        _ => return Err(invalid("missing 'type'".to_string())),
    };
    let path = match fields.shift_remove("path") {
        Some(Value::String(path)) => Pointer::parse(&path)?,
        _ => return Err(invalid("missing 'path'".to_string())),
    };
    let value = fields.shift_remove("value");
    let absent = fields.shift_remove("absent");
    if let Some((key, _)) = fields.iter().next() {
        return Err(invalid(format!("unexpected field '{}'", stringify(key))));
    }

    match kind.as_str() {
        "replace" => match (value, absent) {
            (Some(value), None) => Ok(Operation::Replace { path, value }),
            _ => Err(invalid("replace requires 'value'".to_string())),
        },
        "remove" => match (value, absent) {
            (None, None) => Ok(Operation::Remove { path }),
            _ => Err(invalid("remove takes only 'path'".to_string())),
        },
        "test" => match (value, absent) {
            (Some(value), None) => Ok(Operation::Test {
                path,
                expect: Expectation::Value(value),
            }),
            (None, Some(Value::Bool(true))) => Ok(Operation::Test {
                path,
                expect: Expectation::Absent,
            }),
            _ => Err(invalid(
                "test requires either 'value' or 'absent: true'".to_string(),
            )),
        },
        other => Err(invalid(format!("unknown operation type '{}'", other))),
    }
}

/// Resolve `pointer` against `doc`.
///
/// Missing optional paths select null. A wildcard collects every match
/// into a sequence.
pub fn select(doc: &Value, pointer: &Pointer) -> std::result::Result<Value, String> {
    let found = select_all(doc, pointer.tokens(), false)?;
    if pointer.has_wildcard() {
        return Ok(Value::Sequence(found.into_iter().cloned().collect()));
    }
    Ok(found.first().map(|v| (*v).clone()).unwrap_or(Value::Null))
}

fn select_all<'a>(
    node: &'a Value,
    tokens: &[Token],
    optional: bool,
) -> std::result::Result<Vec<&'a Value>, String> {
    let Some((token, rest)) = tokens.split_first() else {
        return Ok(vec![node]);
    };
    let optional = optional || token.optional;
    let mut out = Vec::new();
    for child in step_into(node, &token.step, optional)? {
        out.extend(select_all(child, rest, optional)?);
    }
    Ok(out)
}

fn step_into<'a>(
    node: &'a Value,
    step: &Step,
    optional: bool,
) -> std::result::Result<Vec<&'a Value>, String> {
    match (step, node) {
        (Step::Key(key), Value::Mapping(m)) => found(m.get(key.as_str()), optional, || no_key(key)),
        (Step::Index(i), Value::Mapping(m)) => {
            let key = i.to_string();
            found(m.get(key.as_str()), optional, || no_key(&key))
        }
        (Step::Index(i), Value::Sequence(items)) => found(
            resolve_index(items.len(), *i).map(|pos| &items[pos]),
            optional,
            || out_of_bounds(*i, items.len()),
        ),
        (Step::Matching { key, value }, Value::Sequence(items)) => found(
            match_position(items, key, value)?.map(|pos| &items[pos]),
            optional,
            || no_match(key, value),
        ),
        (Step::Wildcard, Value::Sequence(items)) => Ok(items.iter().collect()),
        (Step::AfterLast, _) => Err(after_last()),
        (_, Value::Null) if optional => Ok(Vec::new()),
        (step, other) => Err(mismatch(step, other)),
    }
}

fn step_into_mut<'a>(
    node: &'a mut Value,
    step: &Step,
    optional: bool,
) -> std::result::Result<Vec<&'a mut Value>, String> {
    match (step, node) {
        (Step::Key(key), Value::Mapping(m)) => {
            found(m.get_mut(key.as_str()), optional, || no_key(key))
        }
        (Step::Index(i), Value::Mapping(m)) => {
            let key = i.to_string();
            found(m.get_mut(key.as_str()), optional, || no_key(&key))
        }
        (Step::Index(i), Value::Sequence(items)) => {
            let len = items.len();
            match resolve_index(len, *i) {
                Some(pos) => Ok(vec![&mut items[pos]]),
                None => found(None, optional, || out_of_bounds(*i, len)),
            }
        }
        (Step::Matching { key, value }, Value::Sequence(items)) => {
            match match_position(items, key, value)? {
                Some(pos) => Ok(vec![&mut items[pos]]),
                None => found(None, optional, || no_match(key, value)),
            }
        }
        (Step::Wildcard, Value::Sequence(items)) => Ok(items.iter_mut().collect()),
        (Step::AfterLast, _) => Err(after_last()),
        (_, Value::Null) if optional => Ok(Vec::new()),
        (step, other) => Err(mismatch(step, other)),
    }
}

fn replace(
    node: &mut Value,
    tokens: &[Token],
    value: &Value,
    optional: bool,
) -> std::result::Result<(), String> {
    let Some((token, rest)) = tokens.split_first() else {
        *node = value.clone();
        return Ok(());
    };
    let optional = optional || token.optional;
    if node.is_null() && optional {
        *node = match token.step {
            Step::Key(_) => Value::Mapping(Mapping::new()),
            _ => Value::Sequence(Vec::new()),
        };
    }

    match (&token.step, node) {
        (Step::Key(key), Value::Mapping(m)) => replace_entry(m, key, rest, value, optional),
        (Step::Index(i), Value::Mapping(m)) => {
            replace_entry(m, &i.to_string(), rest, value, optional)
        }
        (Step::Index(i), Value::Sequence(items)) => {
            let pos = resolve_index(items.len(), *i)
                .ok_or_else(|| out_of_bounds(*i, items.len()))?;
            replace(&mut items[pos], rest, value, optional)
        }
        (Step::AfterLast, Value::Sequence(items)) => {
            items.push(Value::Null);
            let last = items.len() - 1;
            replace(&mut items[last], rest, value, true)
        }
        (Step::Matching { key: mk, value: mv }, Value::Sequence(items)) => {
            match match_position(items, mk, mv)? {
                Some(pos) => replace(&mut items[pos], rest, value, optional),
                None if optional => {
                    if rest.is_empty() {
                        items.push(value.clone());
                        return Ok(());
                    }
                    let mut seed = Mapping::new();
                    seed.insert(Value::String(mk.clone()), Value::String(mv.clone()));
                    items.push(Value::Mapping(seed));
                    let last = items.len() - 1;
                    replace(&mut items[last], rest, value, optional)
                }
                None => Err(no_match(mk, mv)),
            }
        }
        (Step::Wildcard, Value::Sequence(items)) => {
            for item in items.iter_mut() {
                replace(item, rest, value, optional)?;
            }
            Ok(())
        }
        (step, other) => Err(mismatch(step, other)),
    }
}

fn replace_entry(
    mapping: &mut Mapping,
    key: &str,
    rest: &[Token],
    value: &Value,
    optional: bool,
) -> std::result::Result<(), String> {
    let present = mapping.contains_key(key);
    if rest.is_empty() {
        if !present && !optional {
            return Err(no_key(key));
        }
        // Insert keeps the position of an existing key.
        mapping.insert(Value::String(key.to_string()), value.clone());
        return Ok(());
    }
    if !present {
        if !optional {
            return Err(no_key(key));
        }
        mapping.insert(Value::String(key.to_string()), Value::Null);
    }
    match mapping.get_mut(key) {
        Some(child) => replace(child, rest, value, optional),
        None => Err(no_key(key)),
    }
}

fn remove(node: &mut Value, tokens: &[Token], optional: bool) -> std::result::Result<(), String> {
    let Some((token, rest)) = tokens.split_first() else {
        return Err("cannot remove the document root".to_string());
    };
    let optional = optional || token.optional;
    if !rest.is_empty() {
        for child in step_into_mut(node, &token.step, optional)? {
            remove(child, rest, optional)?;
        }
        return Ok(());
    }

    match (&token.step, node) {
        (Step::Key(key), Value::Mapping(m)) => {
            removed(m.shift_remove(key.as_str()).is_some(), optional, || no_key(key))
        }
        (Step::Index(i), Value::Mapping(m)) => {
            let key = i.to_string();
            removed(m.shift_remove(key.as_str()).is_some(), optional, || {
                no_key(&key)
            })
        }
        (Step::Index(i), Value::Sequence(items)) => match resolve_index(items.len(), *i) {
            Some(pos) => {
                items.remove(pos);
                Ok(())
            }
            None => removed(false, optional, || out_of_bounds(*i, items.len())),
        },
        (Step::Matching { key, value }, Value::Sequence(items)) => {
            match match_position(items, key, value)? {
                Some(pos) => {
                    items.remove(pos);
                    Ok(())
                }
                None => removed(false, optional, || no_match(key, value)),
            }
        }
        (Step::Wildcard, Value::Sequence(items)) => {
            items.clear();
            Ok(())
        }
        (Step::AfterLast, _) => Err(after_last()),
        (_, Value::Null) if optional => Ok(()),
        (step, other) => Err(mismatch(step, other)),
    }
}

fn test(doc: &Value, tokens: &[Token], expect: &Expectation) -> std::result::Result<(), String> {
    match expect {
        Expectation::Absent => {
            if select_all(doc, tokens, true)?.is_empty() {
                Ok(())
            } else {
                Err("expected path to be absent".to_string())
            }
        }
        Expectation::Value(expected) => {
            let found = select_all(doc, tokens, false)?;
            if found.is_empty() {
                return Err("expected path to exist".to_string());
            }
            match found.iter().find(|v| **v != expected) {
                None => Ok(()),
                Some(actual) => Err(format!(
                    "found {} but expected {}",
                    stringify(actual),
                    stringify(expected)
                )),
            }
        }
    }
}

fn found<T>(
    item: Option<T>,
    optional: bool,
    missing: impl FnOnce() -> String,
) -> std::result::Result<Vec<T>, String> {
    match item {
        Some(item) => Ok(vec![item]),
        None if optional => Ok(Vec::new()),
        None => Err(missing()),
    }
}

fn removed(
    hit: bool,
    optional: bool,
    missing: impl FnOnce() -> String,
) -> std::result::Result<(), String> {
    if hit || optional {
        Ok(())
    } else {
        Err(missing())
    }
}

fn resolve_index(len: usize, index: i64) -> Option<usize> {
    if index >= 0 {
        let index = usize::try_from(index).ok()?;
        (index < len).then_some(index)
    } else {
        let back = usize::try_from(index.unsigned_abs()).ok()?;
        (back <= len).then(|| len - back)
    }
}

fn match_position(
    items: &[Value],
    key: &str,
    expected: &str,
) -> std::result::Result<Option<usize>, String> {
    let mut hit = None;
    for (pos, item) in items.iter().enumerate() {
        let matches = item
            .get(key)
            .map(|v| stringify(v) == expected)
            .unwrap_or(false);
        if matches {
            if hit.is_some() {
                return Err(format!(
                    "expected to find exactly one element with {}={}",
                    key, expected
                ));
            }
            hit = Some(pos);
        }
    }
    Ok(hit)
}

fn no_key(key: &str) -> String {
    format!("expected to find a map key '{}'", key)
}

fn no_match(key: &str, value: &str) -> String {
    format!("expected to find an element with {}={}", key, value)
}

fn out_of_bounds(index: i64, len: usize) -> String {
    format!("index {} out of bounds for {} elements", index, len)
}

fn after_last() -> String {
    "'-' is only valid when adding an element".to_string()
}

fn mismatch(step: &Step, node: &Value) -> String {
    let wanted = match step {
        Step::Key(_) => "a mapping",
        _ => "a sequence",
    };
    let actual = match node {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Sequence(_) => "a sequence",
        Value::Mapping(_) => "a mapping",
        Value::Tagged(_) => "a tagged value",
    };
    format!("expected {} but found {}", wanted, actual)
}
