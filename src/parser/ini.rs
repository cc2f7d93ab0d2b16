//! Ini (my.cnf style) codec.

use serde_json::{Map, Value};

use crate::parser::tree::scalar_to_string;
use crate::parser::{ConfigFormat, ParseError, ParseResult};

/// Section receiving keys that appear before any header.
pub const DEFAULT_SECTION: &str = "default";

pub fn parse(content: &str) -> ParseResult<Value> {
    let mut root = Map::new();
    let mut current = DEFAULT_SECTION.to_string();

    for (idx, raw) in content.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') || line.starts_with('!') {
            continue;
        }

        if let Some(rest) = line.strip_prefix('[') {
            let name = rest
                .strip_suffix(']')
                .ok_or_else(|| syntax(idx, "unterminated section header"))?
                .trim();
            if name.is_empty() {
                return Err(syntax(idx, "empty section name"));
            }
            current = name.to_string();
            root.entry(current.clone())
                .or_insert_with(|| Value::Object(Map::new()));
            continue;
        }

        let (key, value) = split_key_value(line);
        if key.is_empty() {
            return Err(syntax(idx, "missing key"));
        }
        let section = root
            .entry(current.clone())
            .or_insert_with(|| Value::Object(Map::new()));
        if let Value::Object(map) = section {
            map.insert(key.to_string(), Value::String(unquote(value).to_string()));
        }
    }

    Ok(Value::Object(root))
}

pub fn marshal(tree: &Value) -> ParseResult<String> {
    let root = tree
        .as_object()
        .ok_or(ParseError::NotAMapping(ConfigFormat::Ini.as_str()))?;

    let mut out = String::new();
    let mut loose = Vec::new();
    for (key, value) in root {
        if !value.is_object() {
            loose.push((key, value));
        }
    }
    for (key, value) in &loose {
        write_entry(&mut out, key, value);
    }

    for (name, section) in root {
        let Value::Object(entries) = section else {
            continue;
        };
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str(&format!("[{}]\n", name));
        for (key, value) in entries {
            write_entry(&mut out, key, value);
        }
    }
    Ok(out)
}

fn write_entry(out: &mut String, key: &str, value: &Value) {
    match scalar_to_string(value) {
        Some(v) if v.is_empty() => out.push_str(&format!("{}\n", key)),
        Some(v) => out.push_str(&format!("{}={}\n", key, v)),
        None => {}
    }
}

fn split_key_value(line: &str) -> (&str, &str) {
    match line.find(['=', ':']) {
        Some(pos) => (line[..pos].trim(), line[pos + 1..].trim()),
        None => (line, ""),
    }
}

fn unquote(value: &str) -> &str {
    let bytes = value.as_bytes();
    if bytes.len() >= 2 {
        let (first, last) = (bytes[0], bytes[bytes.len() - 1]);
        if (first == b'"' || first == b'\'') && first == last {
            return &value[1..value.len() - 1];
        }
    }
    value
}

fn syntax(idx: usize, message: &str) -> ParseError {
    ParseError::Syntax {
        format: ConfigFormat::Ini,
        line: idx + 1,
        message: message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const MY_CNF: &str = "\
# generated
[mysqld]
max_connections = 100
innodb_buffer_pool_size=128M
skip-name-resolve
log_error = '/var/log/mysql.err'

[client]
port: 3306
";

    #[test]
    fn test_parse_sections() {
        let tree = parse(MY_CNF).unwrap();
        assert_eq!(tree["mysqld"]["max_connections"], json!("100"));
        assert_eq!(tree["mysqld"]["skip-name-resolve"], json!(""));
        assert_eq!(tree["mysqld"]["log_error"], json!("/var/log/mysql.err"));
        assert_eq!(tree["client"]["port"], json!("3306"));
    }

    #[test]
    fn test_keys_before_header_go_to_default() {
        let tree = parse("a=1\n[s]\nb=2\n").unwrap();
        assert_eq!(tree[DEFAULT_SECTION]["a"], json!("1"));
        assert_eq!(tree["s"]["b"], json!("2"));
    }

    #[test]
    fn test_bad_header() {
        let err = parse("[mysqld\nx=1").unwrap_err();
        assert!(err.to_string().contains("line 1"));
    }

    #[test]
    fn test_marshal_reparses_to_same_tree() {
        let tree = parse(MY_CNF).unwrap();
        let text = marshal(&tree).unwrap();
        assert!(text.contains("[mysqld]\n"));
        assert!(text.contains("skip-name-resolve\n"));
        assert_eq!(parse(&text).unwrap(), tree);
    }
}
