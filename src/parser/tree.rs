//! Typed walks over parameter trees.
//!
//! A parsed config is a `serde_json::Value`: a closed sum of
//! null/bool/number/string/array/object. Arrays are treated as leaves;
//! parameters are addressed by their object key path.

use serde_json::{Map, Value};

/// Call `f` for every leaf with the key path leading to it.
pub fn walk_leaves<F>(value: &Value, f: &mut F)
where
    F: FnMut(&[String], &Value),
{
    let mut path = Vec::new();
    walk_inner(value, &mut path, f);
}

fn walk_inner<F>(value: &Value, path: &mut Vec<String>, f: &mut F)
where
    F: FnMut(&[String], &Value),
{
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                path.push(key.clone());
                walk_inner(child, path, f);
                path.pop();
            }
        }
        leaf => f(path, leaf),
    }
}

/// Rewrite every leaf in place.
pub fn rewrite_leaves<F>(value: &mut Value, f: &mut F)
where
    F: FnMut(&[String], &mut Value),
{
    let mut path = Vec::new();
    rewrite_inner(value, &mut path, f);
}

fn rewrite_inner<F>(value: &mut Value, path: &mut Vec<String>, f: &mut F)
where
    F: FnMut(&[String], &mut Value),
{
    match value {
        Value::Object(map) => {
            for (key, child) in map.iter_mut() {
                path.push(key.clone());
                rewrite_inner(child, path, f);
                path.pop();
            }
        }
        leaf => f(path, leaf),
    }
}

/// String form of a scalar; `None` for null.
///
/// Arrays and objects render as compact JSON.
pub fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        other => Some(other.to_string()),
    }
}

/// Copy of `value` with every non-null leaf replaced by its string form.
pub fn normalized(value: &Value) -> Value {
    let mut copy = value.clone();
    rewrite_leaves(&mut copy, &mut |_, leaf| {
        if let Some(s) = scalar_to_string(leaf) {
            *leaf = Value::String(s);
        }
    });
    copy
}

/// Collect the leaf key names (last path segment) of a tree.
pub fn leaf_names(value: &Value) -> Vec<String> {
    let mut names = Vec::new();
    walk_leaves(value, &mut |path, _| {
        if let Some(last) = path.last() {
            names.push(last.clone());
        }
    });
    names
}

/// Flatten a tree into `(dotted-path, string value)` pairs.
pub fn flatten(value: &Value) -> Vec<(String, Option<String>)> {
    let mut out = Vec::new();
    walk_leaves(value, &mut |path, leaf| {
        if !path.is_empty() {
            out.push((path.join("."), scalar_to_string(leaf)));
        }
    });
    out
}

/// Empty JSON object.
pub fn empty_object() -> Value {
    Value::Object(Map::new())
}

/// True for `{}`.
pub fn is_empty_object(value: &Value) -> bool {
    matches!(value, Value::Object(map) if map.is_empty())
}
