//! Minimal XML codec for element-only configuration documents.
//!
//! Elements map to objects, text-only elements to strings and repeated
//! siblings to arrays. Declarations, comments, doctypes and attributes are
//! skipped.

use serde_json::{Map, Value};

use crate::parser::tree::scalar_to_string;
use crate::parser::{ConfigFormat, ParseError, ParseResult};

pub fn parse(content: &str) -> ParseResult<Value> {
    let mut reader = Reader::new(content);
    reader.skip_misc()?;
    if reader.at_end() {
        return Ok(Value::Object(Map::new()));
    }

    let (name, value) = reader.element()?;
    reader.skip_misc()?;
    if !reader.at_end() {
        return Err(reader.error("content after root element"));
    }

    let mut root = Map::new();
    root.insert(name, value);
    Ok(Value::Object(root))
}

pub fn marshal(tree: &Value) -> ParseResult<String> {
    let root = tree
        .as_object()
        .ok_or(ParseError::NotAMapping(ConfigFormat::Xml.as_str()))?;

    let mut out = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    for (name, value) in root {
        write_element(&mut out, name, value, 0);
    }
    Ok(out)
}

fn write_element(out: &mut String, name: &str, value: &Value, depth: usize) {
    let indent = "  ".repeat(depth);
    match value {
        Value::Array(items) => {
            for item in items {
                write_element(out, name, item, depth);
            }
        }
        Value::Object(children) => {
            out.push_str(&format!("{indent}<{name}>\n"));
            for (child, v) in children {
                write_element(out, child, v, depth + 1);
            }
            out.push_str(&format!("{indent}</{name}>\n"));
        }
        leaf => {
            let text = scalar_to_string(leaf).unwrap_or_default();
            out.push_str(&format!("{indent}<{name}>{}</{name}>\n", escape(&text)));
        }
    }
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn unescape(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

struct Reader<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(src: &'a str) -> Self {
        Self { src, pos: 0 }
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn at_end(&self) -> bool {
        self.pos >= self.src.len()
    }

    fn line(&self) -> usize {
        self.src[..self.pos].matches('\n').count() + 1
    }

    fn error(&self, message: &str) -> ParseError {
        ParseError::Syntax {
            format: ConfigFormat::Xml,
            line: self.line(),
            message: message.to_string(),
        }
    }

    fn skip_ws(&mut self) {
        let trimmed = self.rest().trim_start();
        self.pos = self.src.len() - trimmed.len();
    }

    /// Advance past `terminator`, returning the text before it.
    fn take_until(&mut self, terminator: &str) -> ParseResult<&'a str> {
        let rest = self.rest();
        let idx = rest
            .find(terminator)
            .ok_or_else(|| self.error(&format!("missing '{terminator}'")))?;
        self.pos += idx + terminator.len();
        Ok(&rest[..idx])
    }

    /// Skip whitespace, declarations, comments and doctypes.
    fn skip_misc(&mut self) -> ParseResult<()> {
        loop {
            self.skip_ws();
            let rest = self.rest();
            if rest.starts_with("<?") {
                self.take_until("?>")?;
            } else if rest.starts_with("<!--") {
                self.take_until("-->")?;
            } else if rest.starts_with("<!DOCTYPE") || rest.starts_with("<!doctype") {
                self.take_until(">")?;
            } else {
                return Ok(());
            }
        }
    }

    fn element(&mut self) -> ParseResult<(String, Value)> {
        if !self.rest().starts_with('<') {
            return Err(self.error("expected element"));
        }
        self.pos += 1;
        let tag = self.take_until(">")?;
        let self_closing = tag.ends_with('/');
        let tag = tag.trim_end_matches('/');
        let name = tag
            .split_whitespace()
            .next()
            .filter(|n| !n.is_empty())
            .ok_or_else(|| self.error("empty tag name"))?
            .to_string();

        if self_closing {
            return Ok((name, Value::String(String::new())));
        }

        let mut children: Map<String, Value> = Map::new();
        let mut text = String::new();
        loop {
            let rest = self.rest();
            if rest.is_empty() {
                return Err(self.error(&format!("unclosed element <{name}>")));
            }
            if rest.starts_with("</") {
                self.pos += 2;
                let closing = self.take_until(">")?.trim();
                if closing != name {
                    return Err(self.error(&format!("expected </{name}>, found </{closing}>")));
                }
                break;
            }
            if rest.starts_with("<!--") {
                self.take_until("-->")?;
            } else if rest.starts_with("<![CDATA[") {
                self.pos += "<![CDATA[".len();
                text.push_str(self.take_until("]]>")?);
            } else if rest.starts_with("<?") {
                self.take_until("?>")?;
            } else if rest.starts_with('<') {
                let (child, value) = self.element()?;
                insert_child(&mut children, child, value);
            } else {
                let end = rest.find('<').unwrap_or(rest.len());
                text.push_str(&unescape(&rest[..end]));
                self.pos += end;
            }
        }

        if children.is_empty() {
            Ok((name, Value::String(text.trim().to_string())))
        } else {
            Ok((name, Value::Object(children)))
        }
    }
}

fn insert_child(children: &mut Map<String, Value>, name: String, value: Value) {
    match children.get_mut(&name) {
        Some(Value::Array(items)) => items.push(value),
        Some(existing) => {
            let first = existing.take();
            *existing = Value::Array(vec![first, value]);
        }
        None => {
            children.insert(name, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const DOC: &str = r#"<?xml version="1.0"?>
<!-- clickhouse users -->
<clickhouse>
  <profiles>
    <default>
      <max_memory_usage>10000000000</max_memory_usage>
      <load_balancing>random</load_balancing>
    </default>
  </profiles>
  <listen_host>::</listen_host>
  <listen_host>0.0.0.0</listen_host>
  <logger level="trace"><console>1</console></logger>
  <empty/>
  <query><![CDATA[SELECT 1 < 2]]></query>
</clickhouse>
"#;

    #[test]
    fn test_parse_nested_document() {
        let tree = parse(DOC).unwrap();
        let root = &tree["clickhouse"];
        assert_eq!(
            root["profiles"]["default"]["max_memory_usage"],
            json!("10000000000")
        );
        assert_eq!(root["listen_host"], json!(["::", "0.0.0.0"]));
        assert_eq!(root["logger"]["console"], json!("1"));
        assert_eq!(root["empty"], json!(""));
        assert_eq!(root["query"], json!("SELECT 1 < 2"));
    }

    #[test]
    fn test_mismatched_close_tag() {
        let err = parse("<a><b>1</c></a>").unwrap_err();
        assert!(err.to_string().contains("expected </b>"));
    }

    #[test]
    fn test_marshal_reparses() {
        let tree = parse(DOC).unwrap();
        let text = marshal(&tree).unwrap();
        assert_eq!(parse(&text).unwrap(), tree);
    }
}
