//! Structural Merge
//!
//! Applies a partial scene update ("diff") on top of existing content.
//! Merging is field-level last-writer-wins and recursive, so a client only
//! sends the fields that changed, at any depth, without clobbering siblings.
//!
//! Sequences merge positionally: index 0 of the diff merges into index 0 of
//! the base. Inserting or removing in the middle of a sequence misaligns the
//! trailing elements; elements are not matched by identity.

use std::collections::BTreeMap;

use super::value::SceneValue;

/// Merge `diff` into `base`, returning the merged value.
///
/// - A scalar diff (including null) replaces the base outright.
/// - An absent base (scalar, empty mapping, empty sequence) yields the diff.
/// - Otherwise fields present in both are merged recursively, base-only fields
///   are carried over and diff-only fields are inserted.
/// - If either side is a sequence the result is a sequence.
///
/// The function is pure and deterministic; receivers of a broadcast diff
/// apply the same merge locally and converge on the same content.
pub fn merge(base: &SceneValue, diff: &SceneValue) -> SceneValue {
    if diff.is_scalar() {
        return diff.clone();
    }
    if base.is_scalar() || base.is_empty_container() {
        return diff.clone();
    }

    match (base, diff) {
        (SceneValue::Mapping(base_fields), SceneValue::Mapping(diff_fields)) => {
            SceneValue::Mapping(merge_fields(base_fields, diff_fields))
        }
        (SceneValue::Sequence(base_items), SceneValue::Sequence(diff_items)) => {
            SceneValue::Sequence(merge_positional(base_items, diff_items))
        }
        // One side is a sequence, the other a mapping keyed by index
        _ => {
            let merged = merge_fields(&as_fields(base), &as_fields(diff));
            SceneValue::Sequence(linearize(merged))
        }
    }
}

fn merge_fields(
    base: &BTreeMap<String, SceneValue>,
    diff: &BTreeMap<String, SceneValue>,
) -> BTreeMap<String, SceneValue> {
    let mut result = base.clone();
    for (key, diff_value) in diff {
        let merged = match base.get(key) {
            Some(base_value) => merge(base_value, diff_value),
            None => diff_value.clone(),
        };
        result.insert(key.clone(), merged);
    }
    result
}

fn merge_positional(base: &[SceneValue], diff: &[SceneValue]) -> Vec<SceneValue> {
    let len = base.len().max(diff.len());
    (0..len)
        .filter_map(|i| match (base.get(i), diff.get(i)) {
            (Some(b), Some(d)) => Some(merge(b, d)),
            (Some(b), None) => Some(b.clone()),
            (None, Some(d)) => Some(d.clone()),
            (None, None) => None,
        })
        .collect()
}

/// View a container as a field map; sequence positions become string keys
fn as_fields(value: &SceneValue) -> BTreeMap<String, SceneValue> {
    match value {
        SceneValue::Mapping(fields) => fields.clone(),
        SceneValue::Sequence(items) => items
            .iter()
            .enumerate()
            .map(|(i, item)| (i.to_string(), item.clone()))
            .collect(),
        SceneValue::Scalar(_) => BTreeMap::new(),
    }
}

/// Order fields by the numeric value of their keys.
///
/// Keys that are not indices sort after all numeric keys, in key order.
fn linearize(fields: BTreeMap<String, SceneValue>) -> Vec<SceneValue> {
    let mut indexed = Vec::with_capacity(fields.len());
    let mut named = Vec::new();

    for (key, value) in fields {
        match key.parse::<u64>() {
            Ok(index) => indexed.push((index, value)),
            Err(_) => named.push(value),
        }
    }

    indexed.sort_by_key(|(index, _)| *index);
    indexed
        .into_iter()
        .map(|(_, value)| value)
        .chain(named)
        .collect()
}
