//! Format-aware config file parsing.
//!
//! # Data Flow
//!
//! ```text
//! file bytes ──► ParsedConfig::parse(format) ──► serde_json::Value tree
//!                                                   │
//!                     sub_tree() (ini section) ◄────┤
//!                     update(dotted key)      ◄─────┤
//!                     marshal() ──► file bytes ◄────┘
//! ```
//!
//! # Design Decisions
//!
//! - Every format lands in the same `serde_json::Value` tree so diffing and
//!   classification never care where a parameter came from.
//! - yaml/json/toml go through their serde crates. ini, properties, dotenv
//!   and xml are small line- or tag-oriented grammars parsed in-crate.

pub mod format;
pub mod ini;
pub mod properties;
pub mod tree;
pub mod xml;

pub use format::{ConfigFormat, FormatterConfig, IniOptions};

use std::collections::BTreeMap;

use serde_json::{Map, Value};
use thiserror::Error;

use crate::diff::ConfigBundle;

/// Errors raised while parsing or rendering a config file.
#[derive(Debug, Error)]
pub enum ParseError {
    /// Grammar error in one of the in-crate codecs.
    #[error("{format} syntax error at line {line}: {message}")]
    Syntax {
        format: ConfigFormat,
        line: usize,
        message: String,
    },

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("toml render error: {0}")]
    TomlRender(#[from] toml::ser::Error),

    /// The document root is not a key/value mapping.
    #[error("{0} document root must be a mapping")]
    NotAMapping(&'static str),

    /// A dotted key walks through a non-object value.
    #[error("invalid parameter key '{0}'")]
    InvalidKey(String),

    #[error("unsupported config format: {0}")]
    UnsupportedFormat(String),

    #[error("file '{0}' not found in config bundle")]
    MissingFile(String),
}

pub type ParseResult<T> = Result<T, ParseError>;

/// One parsed config file.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedConfig {
    formatter: FormatterConfig,
    tree: Value,
}

impl ParsedConfig {
    pub fn parse(content: &str, formatter: &FormatterConfig) -> ParseResult<Self> {
        let tree = match formatter.format {
            ConfigFormat::Ini => ini::parse(content)?,
            ConfigFormat::Yaml => mapping_or_empty(serde_yaml::from_str(content)?, ConfigFormat::Yaml)?,
            ConfigFormat::Json => mapping_or_empty(serde_json::from_str(content)?, ConfigFormat::Json)?,
            ConfigFormat::Toml => toml::from_str(content)?,
            ConfigFormat::Properties => properties::parse_properties(content)?,
            ConfigFormat::Dotenv => properties::parse_dotenv(content)?,
            ConfigFormat::Xml => xml::parse(content)?,
        };

        Ok(Self {
            formatter: formatter.clone(),
            tree,
        })
    }

    pub fn format(&self) -> ConfigFormat {
        self.formatter.format
    }

    pub fn formatter(&self) -> &FormatterConfig {
        &self.formatter
    }

    /// The whole parameter tree.
    pub fn all_parameters(&self) -> &Value {
        &self.tree
    }

    /// The tree in diff scope: the configured ini section, or everything.
    ///
    /// A configured section that does not exist yields `{}`.
    pub fn sub_tree(&self) -> Value {
        match self.formatter.section() {
            Some(section) => self
                .tree
                .get(section)
                .cloned()
                .unwrap_or_else(tree::empty_object),
            None => self.tree.clone(),
        }
    }

    /// Look up a parameter by dotted key, resolved the same way as `update`.
    pub fn get(&self, key: &str) -> Option<&Value> {
        let path = self.key_path(key);
        let mut node = &self.tree;
        for segment in &path {
            node = node.get(segment.as_str())?;
        }
        Some(node)
    }

    /// Set one leaf, creating intermediate objects as needed.
    pub fn update(&mut self, key: &str, value: Value) -> ParseResult<()> {
        if key.is_empty() {
            return Err(ParseError::InvalidKey(key.to_string()));
        }
        let path = self.key_path(key);
        let (leaf, parents) = path
            .split_last()
            .ok_or_else(|| ParseError::InvalidKey(key.to_string()))?;

        let mut node = &mut self.tree;
        for segment in parents {
            let map = node
                .as_object_mut()
                .ok_or_else(|| ParseError::InvalidKey(key.to_string()))?;
            node = map
                .entry(segment.clone())
                .or_insert_with(|| Value::Object(Map::new()));
        }
        node.as_object_mut()
            .ok_or_else(|| ParseError::InvalidKey(key.to_string()))?
            .insert(leaf.clone(), value);
        Ok(())
    }

    /// Render back to the file's own format.
    pub fn marshal(&self) -> ParseResult<String> {
        match self.formatter.format {
            ConfigFormat::Ini => ini::marshal(&self.tree),
            ConfigFormat::Yaml => Ok(serde_yaml::to_string(&self.tree)?),
            ConfigFormat::Json => Ok(serde_json::to_string_pretty(&self.tree)?),
            ConfigFormat::Toml => Ok(toml::to_string(&self.tree)?),
            ConfigFormat::Properties => properties::marshal_properties(&self.tree),
            ConfigFormat::Dotenv => properties::marshal_dotenv(&self.tree),
            ConfigFormat::Xml => xml::marshal(&self.tree),
        }
    }

    fn key_path(&self, key: &str) -> Vec<String> {
        if self.formatter.format.is_flat() {
            return vec![key.to_string()];
        }
        if self.formatter.format == ConfigFormat::Ini {
            if let Some(section) = self.formatter.section() {
                return vec![section.to_string(), key.to_string()];
            }
            return match key.split_once('.') {
                Some((section, name)) => vec![section.to_string(), name.to_string()],
                None => vec![ini::DEFAULT_SECTION.to_string(), key.to_string()],
            };
        }
        key.split('.').map(str::to_string).collect()
    }
}

fn mapping_or_empty(value: Value, format: ConfigFormat) -> ParseResult<Value> {
    match value {
        Value::Null => Ok(tree::empty_object()),
        Value::Object(_) => Ok(value),
        _ => Err(ParseError::NotAMapping(format.as_str())),
    }
}

/// Apply parameter updates to one file of a bundle, returning the new bundle.
///
/// A `None` value removes nothing and is skipped; the bundle is otherwise
/// left untouched.
pub fn merge_parameters(
    bundle: &ConfigBundle,
    file: &str,
    params: &BTreeMap<String, Option<String>>,
    formatter: &FormatterConfig,
) -> ParseResult<ConfigBundle> {
    let content = bundle
        .files
        .get(file)
        .ok_or_else(|| ParseError::MissingFile(file.to_string()))?;

    let mut parsed = ParsedConfig::parse(content, formatter)?;
    for (key, value) in params {
        if let Some(value) = value {
            parsed.update(key, Value::String(value.clone()))?;
        }
    }

    let mut merged = bundle.clone();
    merged.files.insert(file.to_string(), parsed.marshal()?);
    Ok(merged)
}
