//! Document queries
//!
//! The relay consults queries only through [`QueryPredicate`]. The default
//! evaluator, [`DocumentQuery`], understands document-style filters:
//!
//! ```text
//! {"status": "open"}                         field equality
//! {"meta.owner": "ana"}                      dotted paths
//! {"tags": "urgent"}                         array membership
//! {"size": {"$gte": 3, "$lt": 10}}           comparison operators
//! {"$or": [{"status": "open"}, {"pin": true}]}
//! ```
//!
//! Supported operators: `$eq $ne $gt $gte $lt $lte $in $nin $exists $not`
//! on fields and `$and $or $nor` at filter level. A `null` query matches
//! every document.

use crate::document::Document;
use crate::error::QueryError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::cmp::Ordering;

/// A subscription filter, kept as raw JSON
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Query(Value);

impl Query {
    /// Wrap a JSON filter
    pub fn new(filter: Value) -> Self {
        Self(filter)
    }

    /// The query that matches every document
    pub fn match_all() -> Self {
        Self(Value::Null)
    }

    /// True for `null` and `{}`
    pub fn is_match_all(&self) -> bool {
        match &self.0 {
            Value::Null => true,
            Value::Object(map) => map.is_empty(),
            _ => false,
        }
    }

    /// The raw filter
    pub fn as_value(&self) -> &Value {
        &self.0
    }
}

impl From<Value> for Query {
    fn from(filter: Value) -> Self {
        Self(filter)
    }
}

/// "Does document D satisfy query Q"
///
/// Implementations must be pure: the relay may call them any number of times
/// for the same pair, from any thread.
pub trait QueryPredicate: Send + Sync {
    /// Check one document against one query
    fn matches(&self, document: &Document, query: &Query) -> bool;
}

/// Default evaluator for document-style filters
#[derive(Debug, Clone, Copy, Default)]
pub struct DocumentQuery;

impl DocumentQuery {
    /// Evaluate, reporting malformed queries instead of folding them to `false`
    pub fn evaluate(&self, document: &Document, query: &Query) -> Result<bool, QueryError> {
        match query.as_value() {
            Value::Null => Ok(true),
            Value::Object(filter) => eval_filter(document.fields(), filter),
            _ => Err(QueryError::NotAnObject),
        }
    }
}

impl QueryPredicate for DocumentQuery {
    fn matches(&self, document: &Document, query: &Query) -> bool {
        match self.evaluate(document, query) {
            Ok(matched) => matched,
            Err(err) => {
                tracing::debug!(error = %err, "query evaluation failed, treating as no match");
                false
            }
        }
    }
}

fn eval_filter(document: &Map<String, Value>, filter: &Map<String, Value>) -> Result<bool, QueryError> {
    for (key, condition) in filter {
        let matched = match key.as_str() {
            "$and" => {
                let mut all = true;
                for branch in branches(key, condition)? {
                    if !eval_filter(document, branch)? {
                        all = false;
                        break;
                    }
                }
                all
            }
            "$or" | "$nor" => {
                let mut any = false;
                for branch in branches(key, condition)? {
                    if eval_filter(document, branch)? {
                        any = true;
                        break;
                    }
                }
                if key == "$or" {
                    any
                } else {
                    !any
                }
            }
            op if op.starts_with('$') => return Err(QueryError::UnknownOperator(op.to_string())),
            path => eval_field(lookup(document, path), condition)?,
        };

        if !matched {
            return Ok(false);
        }
    }
    Ok(true)
}

fn branches<'a>(op: &str, condition: &'a Value) -> Result<Vec<&'a Map<String, Value>>, QueryError> {
    let items = condition
        .as_array()
        .ok_or_else(|| QueryError::ExpectedFilters(op.to_string()))?;
    items
        .iter()
        .map(|item| {
            item.as_object()
                .ok_or_else(|| QueryError::ExpectedFilters(op.to_string()))
        })
        .collect()
}

/// Resolve a dotted path; numeric segments index into arrays
fn lookup<'a>(document: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let mut current = document.get(segments.next()?)?;
    for segment in segments {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

fn is_operator_object(map: &Map<String, Value>) -> bool {
    !map.is_empty() && map.keys().all(|key| key.starts_with('$'))
}

fn eval_field(value: Option<&Value>, condition: &Value) -> Result<bool, QueryError> {
    match condition {
        Value::Object(ops) if is_operator_object(ops) => {
            for (op, argument) in ops {
                if !eval_operator(value, op, argument)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        literal => Ok(equals(value, literal)),
    }
}

fn eval_operator(value: Option<&Value>, op: &str, argument: &Value) -> Result<bool, QueryError> {
    let matched = match op {
        "$eq" => equals(value, argument),
        "$ne" => !equals(value, argument),
        "$gt" => compare_any(value, argument, |o| o == Ordering::Greater),
        "$gte" => compare_any(value, argument, |o| o != Ordering::Less),
        "$lt" => compare_any(value, argument, |o| o == Ordering::Less),
        "$lte" => compare_any(value, argument, |o| o != Ordering::Greater),
        "$in" | "$nin" => {
            let candidates = argument
                .as_array()
                .ok_or_else(|| QueryError::ExpectedArray(op.to_string()))?;
            let found = candidates.iter().any(|candidate| equals(value, candidate));
            if op == "$in" {
                found
            } else {
                !found
            }
        }
        "$exists" => {
            let wanted = argument.as_bool().unwrap_or(!argument.is_null());
            value.is_some() == wanted
        }
        "$not" => !eval_field(value, argument)?,
        other => return Err(QueryError::UnknownOperator(other.to_string())),
    };
    Ok(matched)
}

/// Equality with array membership; a missing field equals `null`
fn equals(value: Option<&Value>, literal: &Value) -> bool {
    match value {
        None => literal.is_null(),
        Some(v) if json_eq(v, literal) => true,
        Some(Value::Array(items)) => items.iter().any(|item| json_eq(item, literal)),
        Some(_) => false,
    }
}

fn json_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

fn compare_any(value: Option<&Value>, argument: &Value, accept: impl Fn(Ordering) -> bool) -> bool {
    match value {
        None => false,
        Some(Value::Array(items)) if !argument.is_array() => items
            .iter()
            .any(|item| compare(item, argument).is_some_and(&accept)),
        Some(v) => compare(v, argument).is_some_and(&accept),
    }
}

fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        Document::from_value(value).unwrap()
    }

    fn check(document: &Document, query: Value) -> bool {
        DocumentQuery.matches(document, &Query::new(query))
    }

    #[test]
    fn test_match_all() {
        let d = doc(json!({"schemaType": "form"}));
        assert!(check(&d, Value::Null));
        assert!(check(&d, json!({})));
        assert!(Query::match_all().is_match_all());
        assert!(Query::default().is_match_all());
    }

    #[test]
    fn test_field_equality() {
        let d = doc(json!({"schemaType": "form", "status": "open", "id": 1}));
        assert!(check(&d, json!({"status": "open"})));
        assert!(check(&d, json!({"status": "open", "id": 1.0})));
        assert!(!check(&d, json!({"status": "closed"})));
        assert!(!check(&d, json!({"status": "open", "id": 2})));
        assert!(check(&d, json!({"missing": null})));
    }

    #[test]
    fn test_dotted_paths_and_arrays() {
        let d = doc(json!({
            "schemaType": "form",
            "meta": {"owner": "ana", "reviewers": ["bo", "cy"]},
            "tags": ["urgent", "new"]
        }));
        assert!(check(&d, json!({"meta.owner": "ana"})));
        assert!(check(&d, json!({"meta.reviewers.1": "cy"})));
        assert!(check(&d, json!({"tags": "urgent"})));
        assert!(!check(&d, json!({"tags": "old"})));
        assert!(!check(&d, json!({"meta.owner.name": "ana"})));
    }

    #[test]
    fn test_comparison_operators() {
        let d = doc(json!({"schemaType": "order", "size": 5, "name": "m", "scores": [1, 9]}));
        assert!(check(&d, json!({"size": {"$gte": 5, "$lt": 10}})));
        assert!(!check(&d, json!({"size": {"$gt": 5}})));
        assert!(check(&d, json!({"name": {"$lte": "n"}})));
        assert!(check(&d, json!({"scores": {"$gt": 8}})));
        assert!(!check(&d, json!({"size": {"$gt": "a"}})));
        assert!(!check(&d, json!({"absent": {"$lt": 1}})));
    }

    #[test]
    fn test_membership_and_existence() {
        let d = doc(json!({"schemaType": "form", "status": "open"}));
        assert!(check(&d, json!({"status": {"$in": ["open", "pending"]}})));
        assert!(check(&d, json!({"status": {"$nin": ["closed"]}})));
        assert!(check(&d, json!({"status": {"$exists": true}})));
        assert!(check(&d, json!({"owner": {"$exists": false}})));
        assert!(check(&d, json!({"status": {"$ne": "closed"}})));
        assert!(check(&d, json!({"status": {"$not": {"$eq": "closed"}}})));
    }

    #[test]
    fn test_logical_operators() {
        let d = doc(json!({"schemaType": "form", "status": "open", "pin": false}));
        assert!(check(&d, json!({"$or": [{"status": "closed"}, {"pin": false}]})));
        assert!(!check(&d, json!({"$and": [{"status": "open"}, {"pin": true}]})));
        assert!(check(&d, json!({"$nor": [{"status": "closed"}]})));
    }

    #[test]
    fn test_malformed_queries_do_not_match() {
        let d = doc(json!({"schemaType": "form", "status": "open"}));
        assert_eq!(
            DocumentQuery.evaluate(&d, &Query::new(json!("open"))),
            Err(QueryError::NotAnObject)
        );
        assert_eq!(
            DocumentQuery.evaluate(&d, &Query::new(json!({"status": {"$regex": "o"}}))),
            Err(QueryError::UnknownOperator("$regex".to_string()))
        );
        assert_eq!(
            DocumentQuery.evaluate(&d, &Query::new(json!({"status": {"$in": "open"}}))),
            Err(QueryError::ExpectedArray("$in".to_string()))
        );
        assert!(!check(&d, json!({"$or": {"status": "open"}})));
    }

    #[test]
    fn test_nested_object_literal_is_equality() {
        let d = doc(json!({"schemaType": "form", "meta": {"a": 1}}));
        assert!(check(&d, json!({"meta": {"a": 1}})));
        assert!(!check(&d, json!({"meta": {"a": 2}})));
    }
}
