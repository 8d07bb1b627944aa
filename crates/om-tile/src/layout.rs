//! Byte spans of the manifest nodes a release replacement rewrites.
//!
//! Tile manifests are block-style YAML. [`Document`] locates top-level keys,
//! their single-line scalar values and the mapping entries of top-level
//! block sequences, so a rewrite can splice new text into exactly those
//! spans and leave every other byte alone. Sequence entries may be block
//! mappings or single-line flow mappings.

use std::ops::Range;

use serde_yaml::Value;

use crate::error::{Result, TileError};

/// Quoting of a scalar as written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Style {
    Plain,
    Single,
    Double,
}

/// A scalar and where its text sits in the document
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Scalar {
    pub span: Range<usize>,
    pub style: Style,
    /// Text as written, quotes removed and escapes resolved
    pub value: String,
}

/// One mapping entry of a top-level sequence
#[derive(Debug, Clone)]
pub(crate) struct Entry {
    /// From the mapping's first byte to the end of its last line of content
    pub span: Range<usize>,
    /// Column of the mapping's keys, `None` for a flow mapping
    pub column: Option<usize>,
    /// Keys with single-line scalar values, in document order
    pub fields: Vec<(String, Scalar)>,
}

impl Entry {
    pub fn get(&self, key: &str) -> Option<&Scalar> {
        self.fields.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }
}

struct Line<'a> {
    start: usize,
    text: &'a str,
}

impl Line<'_> {
    fn indent(&self) -> usize {
        self.text.len() - self.text.trim_start_matches(' ').len()
    }

    /// Empty or comment only
    fn is_blank(&self) -> bool {
        let rest = self.text.trim_start();
        rest.is_empty() || rest.starts_with('#')
    }

    fn content_end(&self) -> usize {
        self.start + self.text.trim_end().len()
    }
}

struct Key {
    name: String,
    line: usize,
    /// Offset into the line just past the colon
    after_colon: usize,
    /// First line past the key's value
    end: usize,
}

/// Line index of a block-style YAML document
pub(crate) struct Document<'a> {
    lines: Vec<Line<'a>>,
    keys: Vec<Key>,
    newline: &'static str,
}

impl<'a> Document<'a> {
    pub fn new(source: &'a str) -> Self {
        let newline = if source.contains("\r\n") { "\r\n" } else { "\n" };
        let mut lines = Vec::new();
        let mut start = 0;
        for raw in source.split_inclusive('\n') {
            let text = raw.trim_end_matches('\n').trim_end_matches('\r');
            lines.push(Line { start, text });
            start += raw.len();
        }

        let mut keys: Vec<Key> = Vec::new();
        for (index, line) in lines.iter().enumerate() {
            if line.is_blank() || line.indent() > 0 || is_dash(line.text, 0) {
                continue;
            }
            if is_marker(line.text) {
                if let Some(previous) = keys.last_mut() {
                    previous.end = previous.end.min(index);
                }
                continue;
            }
            let Some((name, after_colon)) = parse_key(line.text, 0) else {
                continue;
            };
            if let Some(previous) = keys.last_mut() {
                previous.end = previous.end.min(index);
            }
            keys.push(Key {
                name,
                line: index,
                after_colon,
                end: lines.len(),
            });
        }

        Self {
            lines,
            keys,
            newline,
        }
    }

    /// Line terminator used by the document
    pub fn newline(&self) -> &'static str {
        self.newline
    }

    fn key(&self, name: &str) -> Option<&Key> {
        self.keys.iter().find(|k| k.name == name)
    }

    pub fn has_key(&self, name: &str) -> bool {
        self.key(name).is_some()
    }

    /// Value of a top-level key when it is a scalar on the key's own line.
    pub fn scalar(&self, name: &str) -> Option<Scalar> {
        let key = self.key(name)?;
        let scalar = block_scalar(&self.lines[key.line], key.after_colon)?;
        let continued = self.lines[key.line + 1..key.end]
            .iter()
            .any(|l| !l.is_blank());
        (!continued).then_some(scalar)
    }

    /// Mapping entries of a top-level block sequence; empty when the key is
    /// absent, null or `[]`.
    pub fn sequence(&self, name: &str) -> Result<Vec<Entry>> {
        let Some(key) = self.key(name) else {
            return Ok(Vec::new());
        };
        let unsupported =
            || TileError::InvalidManifest(format!("`{}` must be a block sequence of mappings", name));

        let inline = self.lines[key.line].text[key.after_colon..].trim();
        if let Some(rest) = inline.strip_prefix("[]") {
            let rest = rest.trim_start();
            if rest.is_empty() || rest.starts_with('#') {
                return Ok(Vec::new());
            }
            return Err(unsupported());
        }
        if !(inline.is_empty() || inline.starts_with('#')) {
            return Err(unsupported());
        }

        let body = &self.lines[key.line + 1..key.end];
        let mut items: Vec<Range<usize>> = Vec::new();
        let mut column = None;
        for (index, line) in body.iter().enumerate() {
            if line.is_blank() {
                continue;
            }
            let indent = line.indent();
            let sequence = *column.get_or_insert(indent);
            if indent == sequence && is_dash(line.text, indent) {
                if let Some(last) = items.last_mut() {
                    last.end = index;
                }
                items.push(index..body.len());
            } else if indent <= sequence {
                return Err(unsupported());
            }
        }

        items
            .into_iter()
            .map(|range| entry(&body[range]).ok_or_else(unsupported))
            .collect()
    }
}

fn entry(lines: &[Line<'_>]) -> Option<Entry> {
    let dash = lines.first()?;
    let first = skip_spaces(dash.text, dash.indent() + 1);
    let end = lines.iter().rev().find(|l| !l.is_blank())?.content_end();
    let inline = &dash.text[first..];

    if inline.starts_with('{') {
        if lines[1..].iter().any(|l| !l.is_blank()) {
            return None;
        }
        let (fields, close) = flow_mapping(dash, first)?;
        let tail = dash.text[close..].trim_start();
        if !(tail.is_empty() || tail.starts_with('#')) {
            return None;
        }
        return Some(Entry {
            span: dash.start + first..dash.start + close,
            column: None,
            fields,
        });
    }

    let (column, rest) = if inline.is_empty() || inline.starts_with('#') {
        let next = lines[1..].iter().position(|l| !l.is_blank())? + 1;
        (lines[next].indent(), &lines[next..])
    } else {
        (first, lines)
    };

    let mut fields = Vec::new();
    let mut open = false;
    for (index, line) in rest.iter().enumerate() {
        if line.is_blank() {
            continue;
        }
        let indent = if index == 0 { column } else { line.indent() };
        if indent > column || (index > 0 && is_dash(line.text, column)) {
            // a scalar running onto further lines is not single-line
            if open {
                fields.pop();
                open = false;
            }
            continue;
        }
        if indent < column {
            return None;
        }
        let (key, after) = parse_key(line.text, column)?;
        match block_scalar(line, after) {
            Some(scalar) => {
                fields.push((key, scalar));
                open = true;
            }
            None => open = false,
        }
    }

    Some(Entry {
        span: rest[0].start + column..end,
        column: Some(column),
        fields,
    })
}

fn flow_mapping(line: &Line<'_>, open: usize) -> Option<(Vec<(String, Scalar)>, usize)> {
    let text = line.text;
    let mut fields = Vec::new();
    let mut at = open + 1;
    loop {
        at = skip_spaces(text, at);
        if text[at..].starts_with('}') {
            return Some((fields, at + 1));
        }
        let (key, after) = parse_key(text, at)?;
        let (style, value, span) = parse_scalar(text, after, true)?;
        at = skip_spaces(text, span.end);
        fields.push((
            key,
            Scalar {
                span: line.start + span.start..line.start + span.end,
                style,
                value,
            },
        ));
        if text[at..].starts_with(',') {
            at += 1;
        } else if !text[at..].starts_with('}') {
            return None;
        }
    }
}

fn block_scalar(line: &Line<'_>, at: usize) -> Option<Scalar> {
    let (style, value, span) = parse_scalar(line.text, at, false)?;
    let tail = line.text[span.end..].trim_start();
    if !(tail.is_empty() || tail.starts_with('#')) {
        return None;
    }
    Some(Scalar {
        span: line.start + span.start..line.start + span.end,
        style,
        value,
    })
}

/// A key starting at `at` and the offset just past its colon.
fn parse_key(text: &str, at: usize) -> Option<(String, usize)> {
    let rest = text.get(at..)?;
    let (name, after) = match rest.chars().next()? {
        '\'' | '"' => {
            let (_, value, span) = parse_scalar(text, at, true)?;
            (value, span.end)
        }
        _ => {
            let colon = find_colon(rest)?;
            let name = rest[..colon].trim_end();
            if name.is_empty() || name.starts_with(['#', '{', '[', '?']) || name.contains(" #") {
                return None;
            }
            (name.to_string(), at + colon)
        }
    };
    let colon = skip_spaces(text, after);
    (text[colon..].starts_with(':') && is_separator(text, colon + 1)).then_some((name, colon + 1))
}

/// One scalar starting at or after `at`: its style, value and span within
/// `text`. Flow scalars also end at `,`, `}` and `]`.
fn parse_scalar(text: &str, at: usize, flow: bool) -> Option<(Style, String, Range<usize>)> {
    let start = skip_spaces(text, at);
    let rest = &text[start..];
    match rest.chars().next()? {
        '\'' => {
            let mut value = String::new();
            let mut chars = rest.char_indices().skip(1).peekable();
            while let Some((i, c)) = chars.next() {
                if c != '\'' {
                    value.push(c);
                } else if matches!(chars.peek(), Some((_, '\''))) {
                    chars.next();
                    value.push('\'');
                } else {
                    return Some((Style::Single, value, start..start + i + 1));
                }
            }
            None
        }
        '"' => {
            let mut value = String::new();
            let mut chars = rest.char_indices().skip(1);
            while let Some((i, c)) = chars.next() {
                match c {
                    '"' => return Some((Style::Double, value, start..start + i + 1)),
                    '\\' => {
                        let (_, escaped) = chars.next()?;
                        value.push(match escaped {
                            'n' => '\n',
                            't' => '\t',
                            'r' => '\r',
                            '0' => '\0',
                            other => other,
                        });
                    }
                    _ => value.push(c),
                }
            }
            None
        }
        '#' | '{' | '[' | '&' | '*' | '!' | '|' | '>' | '%' | '@' | '`' => None,
        _ => {
            let mut end = rest.len();
            for (i, c) in rest.char_indices() {
                let after_space = rest[..i].ends_with([' ', '\t']);
                if (c == '#' && after_space) || (flow && matches!(c, ',' | '}' | ']')) {
                    end = i;
                    break;
                }
            }
            let value = rest[..end].trim_end();
            if value.is_empty() {
                return None;
            }
            Some((Style::Plain, value.to_string(), start..start + value.len()))
        }
    }
}

/// Index of the first `:` followed by whitespace or the end of the line
fn find_colon(text: &str) -> Option<usize> {
    text.match_indices(':')
        .map(|(i, _)| i)
        .find(|&i| is_separator(text, i + 1))
}

fn is_separator(text: &str, at: usize) -> bool {
    at >= text.len() || text[at..].starts_with([' ', '\t'])
}

fn is_dash(text: &str, at: usize) -> bool {
    text.get(at..)
        .and_then(|rest| rest.strip_prefix('-'))
        .map_or(false, |rest| rest.is_empty() || rest.starts_with([' ', '\t']))
}

fn is_marker(text: &str) -> bool {
    text.starts_with("---") || text.starts_with("...") || text.starts_with('%')
}

fn skip_spaces(text: &str, at: usize) -> usize {
    let rest = &text[at.min(text.len())..];
    text.len() - rest.trim_start_matches([' ', '\t']).len()
}

/// Text for `value` in `style`. Plain values that would not read back as
/// the same string are single-quoted.
pub(crate) fn render(value: &str, style: Style) -> String {
    match style {
        Style::Double => {
            let mut out = String::from('"');
            for c in value.chars() {
                match c {
                    '"' => out.push_str("\\\""),
                    '\\' => out.push_str("\\\\"),
                    '\n' => out.push_str("\\n"),
                    '\t' => out.push_str("\\t"),
                    c => out.push(c),
                }
            }
            out.push('"');
            out
        }
        Style::Plain if reads_back_plain(value) => value.to_string(),
        Style::Plain | Style::Single => format!("'{}'", value.replace('\'', "''")),
    }
}

fn reads_back_plain(value: &str) -> bool {
    let awkward = value.is_empty()
        || value != value.trim()
        || value.contains(['\n', ',', '[', ']', '{', '}', '#', '\'', '"'])
        || value.contains(": ")
        || value.ends_with(':')
        || value.starts_with(['-', '?', ':', '&', '*', '!', '|', '>', '%', '@', '`']);
    !awkward && matches!(serde_yaml::from_str::<Value>(value), Ok(Value::String(s)) if s == value)
}

/// Replace each span of `source` with its text.
pub(crate) fn splice(source: &str, mut edits: Vec<(Range<usize>, String)>) -> Result<String> {
    edits.sort_by_key(|(span, _)| span.start);
    let mut out = String::with_capacity(source.len());
    let mut at = 0;
    for (span, text) in edits {
        if span.start < at || span.end > source.len() {
            return Err(TileError::InvalidManifest(format!(
                "overlapping rewrite at byte {}",
                span.start
            )));
        }
        out.push_str(&source[at..span.start]);
        out.push_str(&text);
        at = span.end;
    }
    out.push_str(&source[at..]);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = "\
# header
name: example # product
product_version: '1.0'
empty:
description: a long
  description
releases:
  # first
  - name: a
    version: 1.10
    file: a.tgz
    notes: spans
      two lines
    jobs:
    - x
  -
    name: \"b\"
    version: v2
  - {name: c, version: '3', sha1: \"C\"}
---
";

    fn text<'a>(source: &'a str, scalar: &Scalar) -> &'a str {
        &source[scalar.span.clone()]
    }

    #[test]
    fn test_top_level_scalars() {
        let doc = Document::new(DOC);
        let name = doc.scalar("name").unwrap();
        assert_eq!(name.value, "example");
        assert_eq!(name.style, Style::Plain);
        assert_eq!(text(DOC, &name), "example");

        let version = doc.scalar("product_version").unwrap();
        assert_eq!(version.value, "1.0");
        assert_eq!(version.style, Style::Single);
        assert_eq!(text(DOC, &version), "'1.0'");

        assert!(doc.has_key("empty"));
        assert!(doc.scalar("empty").is_none());
        assert!(doc.scalar("description").is_none());
        assert!(!doc.has_key("first"));
    }

    #[test]
    fn test_sequence_entries() {
        let doc = Document::new(DOC);
        let entries = doc.sequence("releases").unwrap();
        assert_eq!(entries.len(), 3);

        let a = &entries[0];
        assert_eq!(a.column, Some(4));
        assert_eq!(a.get("version").unwrap().value, "1.10");
        assert_eq!(a.get("file").unwrap().value, "a.tgz");
        assert!(a.get("notes").is_none());
        assert!(a.get("jobs").is_none());
        assert!(DOC[a.span.clone()].starts_with("name: a\n"));
        assert!(DOC[a.span.clone()].ends_with("- x"));

        let b = &entries[1];
        assert_eq!(b.column, Some(4));
        assert_eq!(b.get("name").unwrap().style, Style::Double);
        assert_eq!(b.get("name").unwrap().value, "b");

        let c = &entries[2];
        assert_eq!(c.column, None);
        assert_eq!(&DOC[c.span.clone()], "{name: c, version: '3', sha1: \"C\"}");
        assert_eq!(c.get("version").unwrap().value, "3");
        assert_eq!(text(DOC, c.get("sha1").unwrap()), "\"C\"");
    }

    #[test]
    fn test_missing_and_empty_sequences() {
        let doc = Document::new("a: []\nb:\nc: 1\n");
        assert!(doc.sequence("a").unwrap().is_empty());
        assert!(doc.sequence("b").unwrap().is_empty());
        assert!(doc.sequence("missing").unwrap().is_empty());
        assert!(matches!(
            doc.sequence("c").unwrap_err(),
            TileError::InvalidManifest(_)
        ));
    }

    #[test]
    fn test_flow_sequences_are_rejected() {
        let doc = Document::new("releases: [{name: a}]\n");
        assert!(matches!(
            doc.sequence("releases").unwrap_err(),
            TileError::InvalidManifest(_)
        ));
    }

    #[test]
    fn test_quoted_scalars() {
        let (style, value, span) = parse_scalar("k: 'it''s' # c", 2, false).unwrap();
        assert_eq!((style, value.as_str(), span), (Style::Single, "it's", 3..10));
        let (style, value, _) = parse_scalar(r#"k: "a\"b\n""#, 2, false).unwrap();
        assert_eq!((style, value.as_str()), (Style::Double, "a\"b\n"));
        assert!(parse_scalar("k: 'open", 2, false).is_none());
        assert!(parse_scalar("k: |", 2, false).is_none());
    }

    #[test]
    fn test_render_keeps_strings_strings() {
        assert_eq!(render("1.0.1", Style::Plain), "1.0.1");
        assert_eq!(render("1.10", Style::Plain), "'1.10'");
        assert_eq!(render("true", Style::Plain), "'true'");
        assert_eq!(render("42", Style::Plain), "'42'");
        assert_eq!(render("a: b", Style::Plain), "'a: b'");
        assert_eq!(render("it's", Style::Single), "'it''s'");
        assert_eq!(render("1.0", Style::Double), "\"1.0\"");
    }

    #[test]
    fn test_splice() {
        let out = splice("abcdef", vec![(4..5, "E".into()), (0..2, "xy".into())]).unwrap();
        assert_eq!(out, "xycdEf");
        assert!(splice("abc", vec![(0..2, "x".into()), (1..3, "y".into())]).is_err());
    }
}
