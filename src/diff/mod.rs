//! Config diff engine.
//!
//! # Data Flow
//!
//! ```text
//! ConfigBundle (old) ──► ConfigSnapshot ─┐
//!                                        ├─► diff() ──► ConfigPatch ──► classify::is_dynamic
//! ConfigBundle (new) ──► ConfigSnapshot ─┘                 │
//!                                                          └─► params::updated_parameters
//! ```
//!
//! # Design Decisions
//!
//! - Snapshots are immutable; re-parsing builds a new one.
//! - Common files are compared inside their diff scope (ini section or
//!   whole tree) with scalars normalized to strings, so `100` and `"100"`
//!   are the same value.
//! - Added and removed files carry their whole tree rather than a patch.

pub mod classify;
pub mod params;
pub mod patch;

pub use classify::{is_dynamic, touched_parameters, ParameterClassification};
pub use params::{changed_parameters, updated_parameters, ChangedFile, UpdateType};
pub use patch::{apply_merge_patch, create_merge_patch};

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::parser::tree::{is_empty_object, normalized};
use crate::parser::{FormatterConfig, ParseError, ParsedConfig};

/// Errors raised before any rollout work starts.
#[derive(Debug, Error)]
pub enum DiffError {
    /// A file in the bundle could not be parsed.
    #[error("failed to parse '{file}': {source}")]
    Parse {
        file: String,
        #[source]
        source: ParseError,
    },

    /// External validation rejected the bundle.
    #[error("config validation failed: {0}")]
    Validation(String),
}

pub type DiffResult<T> = Result<T, DiffError>;

/// Raw file contents of a named config object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigBundle {
    pub files: BTreeMap<String, String>,
}

impl ConfigBundle {
    pub fn new(files: BTreeMap<String, String>) -> Self {
        Self { files }
    }
}

/// Which files of a bundle are diffed and how they are parsed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigDescription {
    pub name: String,

    #[serde(default)]
    pub formatter: FormatterConfig,
}

impl ConfigDescription {
    pub fn new(name: impl Into<String>, formatter: FormatterConfig) -> Self {
        Self {
            name: name.into(),
            formatter,
        }
    }
}

/// External schema check, run before diffing.
pub trait ConfigValidator: Send + Sync {
    fn validate(&self, bundle: &ConfigBundle) -> Result<(), String>;
}

impl<F> ConfigValidator for F
where
    F: Fn(&ConfigBundle) -> Result<(), String> + Send + Sync,
{
    fn validate(&self, bundle: &ConfigBundle) -> Result<(), String> {
        self(bundle)
    }
}

/// Validator that accepts every bundle.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl ConfigValidator for AcceptAll {
    fn validate(&self, _bundle: &ConfigBundle) -> Result<(), String> {
        Ok(())
    }
}

/// Parsed, name-ordered view of a bundle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigSnapshot {
    files: BTreeMap<String, ParsedConfig>,
}

impl ConfigSnapshot {
    /// Parse every described file present in `bundle`.
    pub fn build(bundle: &ConfigBundle, descriptions: &[ConfigDescription]) -> DiffResult<Self> {
        let mut files = BTreeMap::new();
        for description in descriptions {
            let Some(content) = bundle.files.get(&description.name) else {
                continue;
            };
            let parsed = ParsedConfig::parse(content, &description.formatter).map_err(|source| {
                DiffError::Parse {
                    file: description.name.clone(),
                    source,
                }
            })?;
            files.insert(description.name.clone(), parsed);
        }
        Ok(Self { files })
    }

    /// Parse every file of `bundle` with the same formatter.
    pub fn build_uniform(bundle: &ConfigBundle, formatter: &FormatterConfig) -> DiffResult<Self> {
        let descriptions: Vec<_> = bundle
            .files
            .keys()
            .map(|name| ConfigDescription::new(name.clone(), formatter.clone()))
            .collect();
        Self::build(bundle, &descriptions)
    }

    pub fn get(&self, name: &str) -> Option<&ParsedConfig> {
        self.files.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Content hash a replica must converge to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConfigVersion(String);

impl ConfigVersion {
    const LEN: usize = 16;

    pub fn of(bundle: &ConfigBundle) -> Self {
        let mut hasher = Sha256::new();
        for (name, content) in &bundle.files {
            hasher.update(name.as_bytes());
            hasher.update([0u8]);
            hasher.update(content.as_bytes());
            hasher.update([0u8]);
        }
        let digest = hex::encode(hasher.finalize());
        Self(digest[..Self::LEN].to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ConfigVersion {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for ConfigVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Structured difference between two snapshots.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigPatch {
    pub is_modify: bool,
    pub add_config: BTreeMap<String, Value>,
    pub delete_config: BTreeMap<String, Value>,
    pub update_config: BTreeMap<String, Value>,
}

impl ConfigPatch {
    pub fn new(
        add_config: BTreeMap<String, Value>,
        delete_config: BTreeMap<String, Value>,
        update_config: BTreeMap<String, Value>,
    ) -> Self {
        let is_modify =
            !(add_config.is_empty() && delete_config.is_empty() && update_config.is_empty());
        Self {
            is_modify,
            add_config,
            delete_config,
            update_config,
        }
    }

    /// RFC 7396 bytes for one updated file.
    pub fn merge_patch_bytes(&self, file: &str) -> Option<Vec<u8>> {
        self.update_config
            .get(file)
            .and_then(|patch| serde_json::to_vec(patch).ok())
    }
}

/// Compute the patch that takes `old` to `new`.
pub fn diff(old: &ConfigSnapshot, new: &ConfigSnapshot) -> ConfigPatch {
    let mut add_config = BTreeMap::new();
    let mut delete_config = BTreeMap::new();
    let mut update_config = BTreeMap::new();

    for (name, parsed) in &new.files {
        if !old.files.contains_key(name) {
            add_config.insert(name.clone(), parsed.all_parameters().clone());
        }
    }

    for (name, old_parsed) in &old.files {
        let Some(new_parsed) = new.files.get(name) else {
            delete_config.insert(name.clone(), old_parsed.all_parameters().clone());
            continue;
        };

        let patch = create_merge_patch(
            &normalized(&old_parsed.sub_tree()),
            &normalized(&new_parsed.sub_tree()),
        );
        if !is_empty_object(&patch) {
            update_config.insert(name.clone(), patch);
        }
    }

    ConfigPatch::new(add_config, delete_config, update_config)
}

/// Parse both bundles with the same descriptions and diff them.
pub fn diff_bundles(
    old: &ConfigBundle,
    new: &ConfigBundle,
    descriptions: &[ConfigDescription],
) -> DiffResult<ConfigPatch> {
    let old = ConfigSnapshot::build(old, descriptions)?;
    let new = ConfigSnapshot::build(new, descriptions)?;
    Ok(diff(&old, &new))
}
