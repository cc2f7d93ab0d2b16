//! Flat key/value codecs: Java-style properties and dotenv.

use serde_json::{Map, Value};

use crate::parser::tree::scalar_to_string;
use crate::parser::{ConfigFormat, ParseError, ParseResult};

pub fn parse_properties(content: &str) -> ParseResult<Value> {
    let mut map = Map::new();
    let mut pending = String::new();

    for raw in content.lines() {
        let line = if pending.is_empty() {
            trim_line_end(raw.trim_start())
        } else {
            raw.trim_start()
        };
        if pending.is_empty() && (line.is_empty() || line.starts_with('#') || line.starts_with('!')) {
            continue;
        }

        if ends_with_continuation(line) {
            pending.push_str(&line[..line.len() - 1]);
            continue;
        }
        pending.push_str(line);

        let logical = std::mem::take(&mut pending);
        let (key, value) = split_property(&logical);
        map.insert(unescape(key), Value::String(unescape(value)));
    }

    if !pending.is_empty() {
        let (key, value) = split_property(&pending);
        map.insert(unescape(key), Value::String(unescape(value)));
    }

    Ok(Value::Object(map))
}

pub fn parse_dotenv(content: &str) -> ParseResult<Value> {
    let mut map = Map::new();

    for (idx, raw) in content.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").map(str::trim_start).unwrap_or(line);

        let (key, value) = line.split_once('=').ok_or_else(|| ParseError::Syntax {
            format: ConfigFormat::Dotenv,
            line: idx + 1,
            message: "expected KEY=value".to_string(),
        })?;
        let key = key.trim();
        if key.is_empty() {
            return Err(ParseError::Syntax {
                format: ConfigFormat::Dotenv,
                line: idx + 1,
                message: "missing key".to_string(),
            });
        }
        map.insert(key.to_string(), Value::String(dotenv_value(value.trim())));
    }

    Ok(Value::Object(map))
}

pub fn marshal_properties(tree: &Value) -> ParseResult<String> {
    marshal_flat(tree, ConfigFormat::Properties)
}

pub fn marshal_dotenv(tree: &Value) -> ParseResult<String> {
    marshal_flat(tree, ConfigFormat::Dotenv)
}

fn marshal_flat(tree: &Value, format: ConfigFormat) -> ParseResult<String> {
    let map = tree.as_object().ok_or(ParseError::NotAMapping(format.as_str()))?;
    let mut out = String::new();
    for (key, value) in map {
        let Some(text) = scalar_to_string(value) else {
            continue;
        };
        let (key, text) = match format {
            ConfigFormat::Properties => (escape_key(key), escape_value(&text)),
            _ if text.contains(char::is_whitespace) => (
                key.clone(),
                format!("\"{}\"", text.replace('"', "\\\"").replace('\n', "\\n")),
            ),
            _ => (key.clone(), text),
        };
        out.push_str(&key);
        out.push('=');
        out.push_str(&text);
        out.push('\n');
    }
    Ok(out)
}

fn escape_char(c: char, out: &mut String) -> bool {
    match c {
        '\\' => out.push_str("\\\\"),
        '\n' => out.push_str("\\n"),
        '\t' => out.push_str("\\t"),
        '\r' => out.push_str("\\r"),
        _ => return false,
    }
    true
}

/// Inverse of `unescape` for keys: separators and whitespace are escaped,
/// as is a leading comment marker.
fn escape_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for (i, c) in key.chars().enumerate() {
        if escape_char(c, &mut out) {
            continue;
        }
        if matches!(c, '=' | ':' | ' ') || (i == 0 && matches!(c, '#' | '!')) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Inverse of `unescape` for values: only leading and trailing spaces need
/// escaping, since the parser trims both.
fn escape_value(value: &str) -> String {
    let last = value.chars().count().saturating_sub(1);
    let mut out = String::with_capacity(value.len());
    for (i, c) in value.chars().enumerate() {
        if escape_char(c, &mut out) {
            continue;
        }
        if c == ' ' && (i == 0 || i == last) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Trim trailing whitespace, keeping one whitespace char escaped by an odd
/// run of backslashes.
fn trim_line_end(line: &str) -> &str {
    let trimmed = line.trim_end();
    if trimmed.len() == line.len() || !ends_with_continuation(trimmed) {
        return trimmed;
    }
    let kept = line[trimmed.len()..].chars().next().map_or(0, char::len_utf8);
    &line[..trimmed.len() + kept]
}

fn ends_with_continuation(line: &str) -> bool {
    let trailing = line.chars().rev().take_while(|c| *c == '\\').count();
    trailing % 2 == 1
}

/// Split at the first unescaped `=`, `:` or whitespace.
fn split_property(line: &str) -> (&str, &str) {
    let mut escaped = false;
    for (pos, c) in line.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '=' | ':' => return (line[..pos].trim_end(), line[pos + 1..].trim_start()),
            c if c.is_whitespace() => {
                let rest = line[pos..].trim_start();
                let rest = rest
                    .strip_prefix(['=', ':'])
                    .map(str::trim_start)
                    .unwrap_or(rest);
                return (&line[..pos], rest);
            }
            _ => {}
        }
    }
    (line, "")
}

fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}

fn dotenv_value(value: &str) -> String {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            let inner = &value[1..value.len() - 1];
            return if quote == '"' {
                inner.replace("\\\"", "\"").replace("\\n", "\n")
            } else {
                inner.to_string()
            };
        }
    }
    // unquoted: strip trailing " # comment"
    match value.find(" #") {
        Some(pos) => value[..pos].trim_end().to_string(),
        None => value.to_string(),
    }
}
