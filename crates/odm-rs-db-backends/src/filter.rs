//! Mongo-style filter evaluation, sorting, and projection over JSON documents.
//!
//! Supported filter forms:
//!
//! - `{}` matches everything
//! - `{"field": value}` equality; an array field also matches when it contains `value`
//! - `{"field": {"$eq" | "$ne" | "$in" | "$nin" | "$gt" | "$gte" | "$lt" | "$lte" | "$exists": ...}}`
//! - `{"$and" | "$or" | "$nor": [filter, ...]}`
//!
//! Field names may be dotted paths into embedded maps. An extended-JSON identifier
//! (`{"$oid": "..."}`) is a value, not an operator map.

use std::cmp::Ordering;

use serde_json::{Map, Value as JsonValue};
use thiserror::Error;

/// A filter the store cannot evaluate.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FilterError {
    /// The filter used an operator this store does not implement.
    #[error("unknown query operator '{0}'")]
    UnknownOperator(String),

    /// An operator received an operand of the wrong shape.
    #[error("malformed filter: {0}")]
    Malformed(String),
}

// ── Matching ────────────────────────────────────────────────────────────

/// Returns whether `document` satisfies `filter`.
///
/// # Errors
///
/// Returns a [`FilterError`] if the filter is not a map or uses an unknown
/// operator.
pub fn matches(document: &Map<String, JsonValue>, filter: &JsonValue) -> Result<bool, FilterError> {
    let JsonValue::Object(clauses) = filter else {
        return Err(FilterError::Malformed(format!(
            "expected a map, found {filter}"
        )));
    };
    for (key, condition) in clauses {
        let satisfied = match key.as_str() {
            "$and" => all_of(document, condition)?,
            "$or" => any_of(document, condition)?,
            "$nor" => !any_of(document, condition)?,
            op if op.starts_with('$') => return Err(FilterError::UnknownOperator(op.to_string())),
            path => matches_field(lookup(document, path), condition)?,
        };
        if !satisfied {
            return Ok(false);
        }
    }
    Ok(true)
}

fn branches<'a>(condition: &'a JsonValue, operator: &str) -> Result<&'a Vec<JsonValue>, FilterError> {
    condition
        .as_array()
        .ok_or_else(|| FilterError::Malformed(format!("{operator} expects an array")))
}

fn all_of(document: &Map<String, JsonValue>, condition: &JsonValue) -> Result<bool, FilterError> {
    for branch in branches(condition, "$and")? {
        if !matches(document, branch)? {
            return Ok(false);
        }
    }
    Ok(true)
}

fn any_of(document: &Map<String, JsonValue>, condition: &JsonValue) -> Result<bool, FilterError> {
    for branch in branches(condition, "$or")? {
        if matches(document, branch)? {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Resolves a dotted path inside a document.
pub fn lookup<'a>(document: &'a Map<String, JsonValue>, path: &str) -> Option<&'a JsonValue> {
    let mut segments = path.split('.');
    let mut current = document.get(segments.next()?)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

fn is_operator_map(condition: &JsonValue) -> bool {
    condition.as_object().is_some_and(|map| {
        !map.is_empty() && map.keys().all(|k| k.starts_with('$')) && !map.contains_key("$oid")
    })
}

fn matches_field(actual: Option<&JsonValue>, condition: &JsonValue) -> Result<bool, FilterError> {
    if !is_operator_map(condition) {
        return Ok(equals(actual, condition));
    }
    let Some(operators) = condition.as_object() else {
        return Ok(false);
    };
    for (operator, operand) in operators {
        let satisfied = match operator.as_str() {
            "$eq" => equals(actual, operand),
            "$ne" => !equals(actual, operand),
            "$in" => branches(operand, "$in")?.iter().any(|c| equals(actual, c)),
            "$nin" => !branches(operand, "$nin")?.iter().any(|c| equals(actual, c)),
            "$gt" => compare_with(actual, operand, Ordering::is_gt),
            "$gte" => compare_with(actual, operand, Ordering::is_ge),
            "$lt" => compare_with(actual, operand, Ordering::is_lt),
            "$lte" => compare_with(actual, operand, Ordering::is_le),
            "$exists" => {
                let wanted = operand.as_bool().ok_or_else(|| {
                    FilterError::Malformed("$exists expects a boolean".to_string())
                })?;
                actual.is_some() == wanted
            }
            other => return Err(FilterError::UnknownOperator(other.to_string())),
        };
        if !satisfied {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Equality with Mongo semantics: a missing field equals `null`, and an array
/// field matches when it equals the operand or contains it.
fn equals(actual: Option<&JsonValue>, expected: &JsonValue) -> bool {
    match actual {
        None => expected.is_null(),
        Some(value) if value == expected => true,
        Some(JsonValue::Array(items)) => items.iter().any(|item| item == expected),
        Some(value) => numbers_equal(value, expected),
    }
}

fn numbers_equal(a: &JsonValue, b: &JsonValue) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => (x - y).abs() < f64::EPSILON,
        _ => false,
    }
}

fn compare_with(
    actual: Option<&JsonValue>,
    operand: &JsonValue,
    accept: fn(Ordering) -> bool,
) -> bool {
    let Some(actual) = actual else {
        return false;
    };
    // Range operators only compare values of the same kind.
    if type_rank(actual) != type_rank(operand) {
        return false;
    }
    accept(compare_values(actual, operand))
}

// ── Ordering ────────────────────────────────────────────────────────────

const fn type_rank(value: &JsonValue) -> u8 {
    match value {
        JsonValue::Null => 0,
        JsonValue::Number(_) => 1,
        JsonValue::String(_) => 2,
        JsonValue::Object(_) => 3,
        JsonValue::Array(_) => 4,
        JsonValue::Bool(_) => 5,
    }
}

/// Total order over JSON values: null, numbers, strings, maps, arrays, booleans.
pub fn compare_values(a: &JsonValue, b: &JsonValue) -> Ordering {
    match (a, b) {
        (JsonValue::Number(x), JsonValue::Number(y)) => {
            let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (JsonValue::String(x), JsonValue::String(y)) => x.cmp(y),
        (JsonValue::Bool(x), JsonValue::Bool(y)) => x.cmp(y),
        (JsonValue::Array(x), JsonValue::Array(y)) => x
            .iter()
            .zip(y)
            .map(|(l, r)| compare_values(l, r))
            .find(|o| o.is_ne())
            .unwrap_or_else(|| x.len().cmp(&y.len())),
        (JsonValue::Object(_), JsonValue::Object(_)) => a.to_string().cmp(&b.to_string()),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

/// Sorts documents in place by `keys`; a leading `-` sorts descending.
///
/// The sort is stable, so documents equal under every key keep store order.
pub fn sort_documents(documents: &mut [Map<String, JsonValue>], keys: &[String]) {
    if keys.is_empty() {
        return;
    }
    documents.sort_by(|a, b| {
        for key in keys {
            let (path, descending) = match key.strip_prefix('-') {
                Some(path) => (path, true),
                None => (key.strip_prefix('+').unwrap_or(key), false),
            };
            let left = lookup(a, path).unwrap_or(&JsonValue::Null);
            let right = lookup(b, path).unwrap_or(&JsonValue::Null);
            let ordering = compare_values(left, right);
            if ordering.is_ne() {
                return if descending { ordering.reverse() } else { ordering };
            }
        }
        Ordering::Equal
    })
}

// ── Projection ──────────────────────────────────────────────────────────

fn truthy(value: &JsonValue) -> bool {
    match value {
        JsonValue::Bool(b) => *b,
        JsonValue::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        JsonValue::Null => false,
        _ => true,
    }
}

/// Applies an inclusion (`{"name": 1}`) or exclusion (`{"name": 0}`) projection.
///
/// Inclusion keeps `_id` unless it is explicitly excluded.
///
/// # Errors
///
/// Returns [`FilterError::Malformed`] if the projection is not a map or mixes
/// inclusion and exclusion of fields other than `_id`.
pub fn project(
    document: Map<String, JsonValue>,
    projection: &JsonValue,
) -> Result<Map<String, JsonValue>, FilterError> {
    let JsonValue::Object(fields) = projection else {
        return Err(FilterError::Malformed("projection must be a map".to_string()));
    };
    let include_id = fields.get("_id").map_or(true, truthy);
    let inclusive = fields
        .iter()
        .find(|(k, _)| k.as_str() != "_id")
        .is_some_and(|(_, first)| truthy(first));
    if fields
        .iter()
        .filter(|(k, _)| k.as_str() != "_id")
        .any(|(_, v)| truthy(v) != inclusive)
    {
        return Err(FilterError::Malformed(
            "projection cannot mix inclusion and exclusion".to_string(),
        ));
    }

    if inclusive {
        Ok(document
            .into_iter()
            .filter(|(key, _)| {
                if key == "_id" {
                    include_id
                } else {
                    fields.get(key).is_some_and(truthy)
                }
            })
            .collect())
    } else {
        Ok(document
            .into_iter()
            .filter(|(key, _)| {
                if key == "_id" {
                    include_id
                } else {
                    !fields.contains_key(key)
                }
            })
            .collect())
    }
}
