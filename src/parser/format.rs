//! Config file format descriptors.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::parser::ParseError;

/// On-disk format of a single configuration file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigFormat {
    #[default]
    Ini,
    Yaml,
    Json,
    Toml,
    Properties,
    Dotenv,
    Xml,
}

impl ConfigFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfigFormat::Ini => "ini",
            ConfigFormat::Yaml => "yaml",
            ConfigFormat::Json => "json",
            ConfigFormat::Toml => "toml",
            ConfigFormat::Properties => "properties",
            ConfigFormat::Dotenv => "dotenv",
            ConfigFormat::Xml => "xml",
        }
    }

    /// Flat formats keep dotted keys literal instead of nesting them.
    pub fn is_flat(&self) -> bool {
        matches!(self, ConfigFormat::Properties | ConfigFormat::Dotenv)
    }
}

impl fmt::Display for ConfigFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConfigFormat {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ini" | "cnf" => Ok(ConfigFormat::Ini),
            "yaml" | "yml" => Ok(ConfigFormat::Yaml),
            "json" => Ok(ConfigFormat::Json),
            "toml" => Ok(ConfigFormat::Toml),
            "properties" => Ok(ConfigFormat::Properties),
            "dotenv" | "env" => Ok(ConfigFormat::Dotenv),
            "xml" => Ok(ConfigFormat::Xml),
            other => Err(ParseError::UnsupportedFormat(other.to_string())),
        }
    }
}

/// Ini-specific options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IniOptions {
    /// Restrict diffing and updates to this section.
    #[serde(default)]
    pub section_name: Option<String>,
}

/// How a file is parsed and which part of it is in scope.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormatterConfig {
    #[serde(default)]
    pub format: ConfigFormat,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ini: Option<IniOptions>,
}

impl FormatterConfig {
    pub fn new(format: ConfigFormat) -> Self {
        Self { format, ini: None }
    }

    /// Scope an ini file to one section.
    pub fn with_section(mut self, section: impl Into<String>) -> Self {
        self.ini = Some(IniOptions {
            section_name: Some(section.into()),
        });
        self
    }

    /// The configured section, only meaningful for ini files.
    pub fn section(&self) -> Option<&str> {
        if self.format != ConfigFormat::Ini {
            return None;
        }
        self.ini
            .as_ref()
            .and_then(|opts| opts.section_name.as_deref())
            .filter(|s| !s.is_empty())
    }
}
