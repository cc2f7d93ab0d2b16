//! Parameter classifier: can a patch be applied without a restart?

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::diff::ConfigPatch;
use crate::parser::tree::leaf_names;

/// Static/dynamic allow-lists supplied by the parameter constraint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterClassification {
    #[serde(default)]
    pub static_parameters: BTreeSet<String>,

    #[serde(default)]
    pub dynamic_parameters: BTreeSet<String>,
}

impl ParameterClassification {
    pub fn is_dynamic(&self, patch: &ConfigPatch) -> bool {
        is_dynamic(patch, &self.static_parameters, &self.dynamic_parameters)
    }
}

/// Leaf names touched by the update section of a patch.
pub fn touched_parameters(patch: &ConfigPatch) -> BTreeSet<String> {
    patch
        .update_config
        .values()
        .flat_map(leaf_names)
        .collect()
}

/// Decide whether `patch` may go through an online update.
///
/// Any touched static name forces a restart, even when the static value
/// itself compares equal. Matching is by leaf name, not path.
pub fn is_dynamic(
    patch: &ConfigPatch,
    static_params: &BTreeSet<String>,
    dynamic_params: &BTreeSet<String>,
) -> bool {
    if !patch.add_config.is_empty() || !patch.delete_config.is_empty() {
        return false;
    }

    let touched = touched_parameters(patch);

    if !static_params.is_empty() && touched.iter().any(|p| static_params.contains(p)) {
        return false;
    }

    if !dynamic_params.is_empty() {
        return touched.iter().all(|p| dynamic_params.contains(p));
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn touching(keys: &[&str]) -> ConfigPatch {
        let mut tree = serde_json::Map::new();
        for key in keys {
            tree.insert(key.to_string(), json!("v"));
        }
        ConfigPatch::new(
            BTreeMap::new(),
            BTreeMap::new(),
            BTreeMap::from([("my.cnf".to_string(), serde_json::Value::Object(tree))]),
        )
    }

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_static_only_defaults_to_restart() {
        assert!(!is_dynamic(&touching(&["b"]), &set(&["a"]), &set(&[])));
    }

    #[test]
    fn test_all_dynamic() {
        assert!(is_dynamic(&touching(&["a", "b"]), &set(&[]), &set(&["a", "b"])));
    }

    #[test]
    fn test_one_unknown_is_not_dynamic() {
        assert!(!is_dynamic(&touching(&["a", "c"]), &set(&[]), &set(&["a", "b"])));
    }

    #[test]
    fn test_static_touch_wins_over_dynamic_list() {
        assert!(!is_dynamic(&touching(&["a", "s"]), &set(&["s"]), &set(&["a", "s"])));
    }

    #[test]
    fn test_added_file_is_never_dynamic() {
        let patch = ConfigPatch::new(
            BTreeMap::from([("extra.cnf".to_string(), json!({"a": "1"}))]),
            BTreeMap::new(),
            BTreeMap::new(),
        );
        assert!(!is_dynamic(&patch, &set(&[]), &set(&["a"])));
    }

    #[test]
    fn test_nested_names_match_by_leaf() {
        let patch = ConfigPatch::new(
            BTreeMap::new(),
            BTreeMap::new(),
            BTreeMap::from([("c.yaml".to_string(), json!({"storage": {"cache": {"size": "1"}}}))]),
        );
        let classification = ParameterClassification {
            static_parameters: set(&[]),
            dynamic_parameters: set(&["size"]),
        };
        assert!(classification.is_dynamic(&patch));
    }

    #[test]
    fn test_no_lists_means_restart() {
        assert!(!is_dynamic(&touching(&["a"]), &set(&[]), &set(&[])));
    }
}
