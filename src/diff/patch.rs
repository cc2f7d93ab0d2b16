//! RFC 7396 JSON merge patch: creation and application.

use serde_json::{Map, Value};

/// Build the merge patch that turns `old` into `new`.
///
/// Removed keys map to `null`, changed or added keys carry the new value,
/// unchanged keys are omitted. Identical inputs produce `{}`.
pub fn create_merge_patch(old: &Value, new: &Value) -> Value {
    match (old, new) {
        (Value::Object(old_map), Value::Object(new_map)) => {
            Value::Object(diff_objects(old_map, new_map))
        }
        _ if old == new => Value::Object(Map::new()),
        _ => new.clone(),
    }
}

fn diff_objects(old: &Map<String, Value>, new: &Map<String, Value>) -> Map<String, Value> {
    let mut patch = Map::new();

    for key in old.keys() {
        if !new.contains_key(key) {
            patch.insert(key.clone(), Value::Null);
        }
    }

    for (key, new_value) in new {
        match old.get(key) {
            Some(Value::Object(old_child)) => match new_value {
                Value::Object(new_child) => {
                    let child = diff_objects(old_child, new_child);
                    if !child.is_empty() {
                        patch.insert(key.clone(), Value::Object(child));
                    }
                }
                other => {
                    patch.insert(key.clone(), other.clone());
                }
            },
            Some(old_value) if old_value == new_value => {}
            _ => {
                patch.insert(key.clone(), new_value.clone());
            }
        }
    }

    patch
}

/// Apply `patch` to `target` in place.
pub fn apply_merge_patch(target: &mut Value, patch: &Value) {
    let Value::Object(patch_map) = patch else {
        *target = patch.clone();
        return;
    };

    if !target.is_object() {
        *target = Value::Object(Map::new());
    }
    if let Value::Object(target_map) = target {
        for (key, value) in patch_map {
            if value.is_null() {
                target_map.remove(key);
            } else {
                let slot = target_map.entry(key.clone()).or_insert(Value::Null);
                apply_merge_patch(slot, value);
            }
        }
    }
}
