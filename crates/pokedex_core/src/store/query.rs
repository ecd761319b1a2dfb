//! Filter matching and update application for the embedded store.
//!
//! # Responsibility
//! - Decide whether a stored document satisfies an equality filter.
//! - Apply `$set` (including the positional `$`) and `$pull` to one document.
//!
//! # Invariants
//! - Evaluation never mutates the inspected document.
//! - A failed update leaves the document untouched.
//! - A positional `$` segment resolves to the first array element that
//!   satisfied the filter; updates using it fail when no element matched.
//! - Operators outside this set are rejected, never ignored.

use super::{Document, ID_FIELD};
use serde_json::{Map, Number, Value};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Most `null` slots a `$set` may insert before an out-of-range index.
pub const MAX_ARRAY_PADDING: usize = 1_500_000;

pub type QueryResult<T> = Result<T, QueryError>;

/// Rejection of a filter or update document by the embedded evaluator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    UnsupportedOperator(String),
    InvalidOperand { operator: String, message: String },
    /// Update document without any `$` operator.
    ReplacementUpdate,
    PositionalWithoutMatch(String),
    NotAnArray(String),
    ImmutableField(String),
    InvalidPath(String),
    IndexOutOfRange { path: String, index: usize },
}

impl Display for QueryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnsupportedOperator(operator) => write!(f, "unsupported operator `{operator}`"),
            Self::InvalidOperand { operator, message } => {
                write!(f, "invalid operand for `{operator}`: {message}")
            }
            Self::ReplacementUpdate => {
                write!(f, "update document must only contain `$` operators")
            }
            Self::PositionalWithoutMatch(path) => write!(
                f,
                "positional path `{path}` requires the filter to match an array element"
            ),
            Self::NotAnArray(path) => write!(f, "cannot apply `$pull` to non-array field `{path}`"),
            Self::ImmutableField(path) => write!(f, "field `{path}` is immutable"),
            Self::InvalidPath(path) => write!(f, "cannot traverse field path `{path}`"),
            Self::IndexOutOfRange { path, index } => write!(
                f,
                "index {index} in `{path}` is more than {MAX_ARRAY_PADDING} past the end of the array"
            ),
        }
    }
}

impl Error for QueryError {}

/// Outcome of a successful filter match.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MatchOutcome {
    /// Index of the first array element that satisfied a condition.
    pub positional: Option<usize>,
}

/// Evaluates `filter` against `document`.
///
/// Returns `Ok(None)` when the document does not match.
pub fn matches(document: &Document, filter: &Document) -> QueryResult<Option<MatchOutcome>> {
    let mut outcome = MatchOutcome::default();
    for (path, condition) in filter {
        if path.starts_with('$') {
            return Err(QueryError::UnsupportedOperator(path.clone()));
        }
        let expected = equality_operand(condition)?;

        let segments: Vec<&str> = path.split('.').collect();
        let mut candidates = Vec::new();
        collect_from_object(document, &segments, None, &mut candidates);

        if expected.is_null() && candidates.is_empty() {
            continue;
        }
        match candidates
            .iter()
            .find(|candidate| values_equal(candidate.value, expected))
        {
            Some(candidate) => outcome.positional = outcome.positional.or(candidate.index),
            None => return Ok(None),
        }
    }
    Ok(Some(outcome))
}

/// Applies an operator update document to `document`.
///
/// Returns whether the document changed.
pub fn apply_update(
    document: &mut Document,
    update: &Document,
    outcome: MatchOutcome,
) -> QueryResult<bool> {
    if update.is_empty() {
        return Err(invalid("update", "update document is empty"));
    }
    if !update.keys().all(|key| key.starts_with('$')) {
        return Err(QueryError::ReplacementUpdate);
    }

    let mut root = Value::Object(document.clone());
    for (operator, fields) in update {
        let fields = fields
            .as_object()
            .ok_or_else(|| invalid(operator, "expected a document of field paths"))?;
        if fields.is_empty() {
            return Err(invalid(operator, "field document is empty"));
        }

        for (path, operand) in fields {
            let segments = resolve_segments(path, outcome)?;
            if segments[0] == ID_FIELD {
                return Err(QueryError::ImmutableField(path.clone()));
            }

            match operator.as_str() {
                "$set" => set_path(&mut root, &segments, operand.clone(), path)?,
                "$pull" => pull_path(&mut root, &segments, operand, path)?,
                other => return Err(QueryError::UnsupportedOperator(other.to_string())),
            }
        }
    }

    let Value::Object(updated) = root else {
        return Err(QueryError::InvalidPath(String::new()));
    };
    let changed = updated != *document;
    *document = updated;
    Ok(changed)
}

/// Structural equality with numeric values compared by magnitude.
pub fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(left), Value::Number(right)) => numbers_equal(left, right),
        (Value::Array(left), Value::Array(right)) => {
            left.len() == right.len()
                && left
                    .iter()
                    .zip(right)
                    .all(|(left, right)| values_equal(left, right))
        }
        (Value::Object(left), Value::Object(right)) => {
            left.len() == right.len()
                && left.iter().zip(right.iter()).all(
                    |((left_key, left_value), (right_key, right_value))| {
                        left_key == right_key && values_equal(left_value, right_value)
                    },
                )
        }
        _ => left == right,
    }
}

/// `value` or `{ "$eq": value }`; any other operator document is rejected.
fn equality_operand(condition: &Value) -> QueryResult<&Value> {
    let Value::Object(object) = condition else {
        return Ok(condition);
    };
    let Some(first) = object.keys().next() else {
        return Ok(condition);
    };
    if !first.starts_with('$') {
        return Ok(condition);
    }
    match (object.len(), object.get("$eq")) {
        (1, Some(expected)) => Ok(expected),
        _ => {
            let operator = object
                .keys()
                .find(|key| key.as_str() != "$eq")
                .unwrap_or(first);
            Err(QueryError::UnsupportedOperator(operator.clone()))
        }
    }
}

/// One value reachable through a field path.
#[derive(Debug, Clone, Copy)]
struct Candidate<'v> {
    value: &'v Value,
    /// Index of the first array element crossed to reach `value`.
    index: Option<usize>,
}

fn collect_from_object<'v>(
    object: &'v Map<String, Value>,
    segments: &[&str],
    index: Option<usize>,
    out: &mut Vec<Candidate<'v>>,
) {
    let Some((head, rest)) = segments.split_first() else {
        return;
    };
    if let Some(child) = object.get(*head) {
        collect(child, rest, index, out);
    }
}

fn collect<'v>(
    value: &'v Value,
    segments: &[&str],
    index: Option<usize>,
    out: &mut Vec<Candidate<'v>>,
) {
    if segments.is_empty() {
        out.push(Candidate { value, index });
        if let Value::Array(items) = value {
            out.extend(items.iter().enumerate().map(|(position, item)| Candidate {
                value: item,
                index: index.or(Some(position)),
            }));
        }
        return;
    }

    match value {
        Value::Object(object) => collect_from_object(object, segments, index, out),
        Value::Array(items) => {
            if let Some(item) = segments[0]
                .parse::<usize>()
                .ok()
                .and_then(|position| items.get(position))
            {
                collect(item, &segments[1..], index, out);
            }
            for (position, item) in items.iter().enumerate() {
                if let Value::Object(object) = item {
                    collect_from_object(object, segments, index.or(Some(position)), out);
                }
            }
        }
        _ => {}
    }
}

fn numbers_equal(left: &Number, right: &Number) -> bool {
    match (left.as_i64(), right.as_i64()) {
        (Some(left), Some(right)) => left == right,
        _ => left.as_f64() == right.as_f64(),
    }
}

fn invalid(operator: &str, message: &str) -> QueryError {
    QueryError::InvalidOperand {
        operator: operator.to_string(),
        message: message.to_string(),
    }
}

fn resolve_segments(path: &str, outcome: MatchOutcome) -> QueryResult<Vec<String>> {
    path.split('.')
        .map(|segment| match segment {
            "" => Err(QueryError::InvalidPath(path.to_string())),
            "$" => outcome
                .positional
                .map(|index| index.to_string())
                .ok_or_else(|| QueryError::PositionalWithoutMatch(path.to_string())),
            other => Ok(other.to_string()),
        })
        .collect()
}

fn parse_index(segment: &str, path: &str) -> QueryResult<usize> {
    segment
        .parse()
        .map_err(|_| QueryError::InvalidPath(path.to_string()))
}

fn get_path<'v>(root: &'v Value, segments: &[String]) -> Option<&'v Value> {
    let mut current = root;
    for segment in segments {
        current = match current {
            Value::Object(map) => map.get(segment.as_str())?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Walks to the container of the last path segment, creating missing
/// intermediate fields as empty objects.
fn walk_mut<'v>(
    root: &'v mut Value,
    parents: &[String],
    path: &str,
) -> QueryResult<&'v mut Value> {
    let mut current = root;
    for segment in parents {
        current = match current {
            Value::Object(map) => map
                .entry(segment.clone())
                .or_insert_with(|| Value::Object(Map::new())),
            Value::Array(items) => {
                let index = parse_index(segment, path)?;
                items
                    .get_mut(index)
                    .ok_or_else(|| QueryError::InvalidPath(path.to_string()))?
            }
            _ => return Err(QueryError::InvalidPath(path.to_string())),
        };
    }
    Ok(current)
}

fn set_path(root: &mut Value, segments: &[String], value: Value, path: &str) -> QueryResult<()> {
    let (last, parents) = segments
        .split_last()
        .ok_or_else(|| QueryError::InvalidPath(path.to_string()))?;

    match walk_mut(root, parents, path)? {
        Value::Object(map) => {
            map.insert(last.clone(), value);
        }
        Value::Array(items) => {
            let index = parse_index(last, path)?;
            if index < items.len() {
                items[index] = value;
            } else if index - items.len() > MAX_ARRAY_PADDING {
                return Err(QueryError::IndexOutOfRange {
                    path: path.to_string(),
                    index,
                });
            } else {
                items.resize(index, Value::Null);
                items.push(value);
            }
        }
        _ => return Err(QueryError::InvalidPath(path.to_string())),
    }
    Ok(())
}

fn pull_path(root: &mut Value, segments: &[String], operand: &Value, path: &str) -> QueryResult<()> {
    let items = match get_path(root, segments) {
        None => return Ok(()),
        Some(Value::Array(items)) => items,
        Some(_) => return Err(QueryError::NotAnArray(path.to_string())),
    };

    let mut kept = Vec::with_capacity(items.len());
    for item in items {
        if !pull_matches(item, operand)? {
            kept.push(item.clone());
        }
    }

    if kept.len() == items.len() {
        return Ok(());
    }
    set_path(root, segments, Value::Array(kept), path)
}

/// A document condition matches object elements field by field; any other
/// operand is compared by value.
fn pull_matches(item: &Value, operand: &Value) -> QueryResult<bool> {
    match (item, operand) {
        (Value::Object(element), Value::Object(condition)) => {
            Ok(matches(element, condition)?.is_some())
        }
        (_, Value::Object(_)) => Ok(false),
        _ => Ok(values_equal(item, operand)),
    }
}
