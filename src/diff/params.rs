//! Flattening a `ConfigPatch` into per-file parameter lists.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::diff::ConfigPatch;
use crate::parser::tree::flatten;

/// How a file appears in a patch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpdateType {
    Added,
    Deleted,
    Updated,
}

impl fmt::Display for UpdateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            UpdateType::Added => "added",
            UpdateType::Deleted => "deleted",
            UpdateType::Updated => "updated",
        };
        f.write_str(s)
    }
}

/// Parameters touched in one file. Removed keys carry `None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangedFile {
    pub file: String,
    pub update_type: UpdateType,
    pub parameters: Vec<(String, Option<String>)>,
}

/// Every touched parameter, file by file, added files first.
pub fn changed_parameters(patch: &ConfigPatch) -> Vec<ChangedFile> {
    let mut out = Vec::new();
    let groups = [
        (UpdateType::Added, &patch.add_config),
        (UpdateType::Deleted, &patch.delete_config),
        (UpdateType::Updated, &patch.update_config),
    ];
    for (update_type, files) in groups {
        for (file, tree) in files {
            out.push(ChangedFile {
                file: file.clone(),
                update_type,
                parameters: flatten(tree),
            });
        }
    }
    out
}

/// Parameters to push through an online update.
///
/// Only `Updated` files contribute, and removed keys are dropped.
pub fn updated_parameters(patch: &ConfigPatch) -> BTreeMap<String, String> {
    let mut params = BTreeMap::new();
    for tree in patch.update_config.values() {
        for (key, value) in flatten(tree) {
            if let Some(value) = value {
                params.insert(key, value);
            }
        }
    }
    params
}
