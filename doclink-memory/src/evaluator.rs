//! Filter evaluation and ordering for in-memory documents.
//!
//! Filters are plain BSON documents in the usual query language: field equality (with array
//! membership), dotted paths, the comparison operators `$eq $ne $gt $gte $lt $lte $in $nin`,
//! `$exists`, `$not`, and the top-level combinators `$and $or $nor`.

use bson::{Bson, Document};
use std::{cmp::Ordering, collections::HashMap};

use doclink_core::error::{DocumentStoreError, DocumentStoreResult};

/// Type-erased, comparable representation of BSON values.
///
/// Numeric types are normalized to `f64` so that `Int32(5)` equals `Double(5.0)`.
#[derive(Debug)]
pub(crate) enum Comparable<'a> {
    Null,
    Bool(bool),
    Number(f64),
    DateTime(i64),
    String(&'a str),
    ObjectId([u8; 12]),
    Array(Vec<Comparable<'a>>),
    Map(HashMap<&'a str, Comparable<'a>>),
    /// Values with no useful ordering (binary, regex, code, ...).
    Opaque(&'a Bson),
}

impl<'a> From<&'a Bson> for Comparable<'a> {
    fn from(bson: &'a Bson) -> Self {
        match bson {
            Bson::Null | Bson::Undefined => Comparable::Null,
            Bson::Boolean(value) => Comparable::Bool(*value),
            Bson::Int32(value) => Comparable::Number(f64::from(*value)),
            Bson::Int64(value) => Comparable::Number(*value as f64),
            Bson::Double(value) => Comparable::Number(*value),
            Bson::DateTime(value) => Comparable::DateTime(value.timestamp_millis()),
            Bson::String(value) => Comparable::String(value),
            Bson::ObjectId(value) => Comparable::ObjectId(value.bytes()),
            Bson::Array(arr) => Comparable::Array(arr.iter().map(Comparable::from).collect()),
            Bson::Document(doc) => Comparable::Map(
                doc.iter()
                    .map(|(k, v)| (k.as_str(), Comparable::from(v)))
                    .collect(),
            ),
            other => Comparable::Opaque(other),
        }
    }
}

impl Comparable<'_> {
    /// Rank of the value's type in the cross-type sort order. Null sorts first.
    fn rank(&self) -> u8 {
        match self {
            Comparable::Null => 0,
            Comparable::Number(_) => 1,
            Comparable::String(_) => 2,
            Comparable::Map(_) => 3,
            Comparable::Array(_) => 4,
            Comparable::Opaque(_) => 5,
            Comparable::ObjectId(_) => 6,
            Comparable::Bool(_) => 7,
            Comparable::DateTime(_) => 8,
        }
    }

    /// Total order used when sorting: by type rank, then by value. NaN sorts after every
    /// other number.
    fn total_cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Comparable::Number(a), Comparable::Number(b)) => match (a.is_nan(), b.is_nan()) {
                (false, false) => a.total_cmp(b),
                (a_nan, b_nan) => a_nan.cmp(&b_nan),
            },
            _ => self
                .partial_cmp(other)
                .unwrap_or_else(|| self.rank().cmp(&other.rank())),
        }
    }
}

impl PartialEq for Comparable<'_> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => true,
            (Comparable::Bool(a), Comparable::Bool(b)) => a == b,
            (Comparable::Number(a), Comparable::Number(b)) => a == b,
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a == b,
            (Comparable::String(a), Comparable::String(b)) => a == b,
            (Comparable::ObjectId(a), Comparable::ObjectId(b)) => a == b,
            (Comparable::Array(a), Comparable::Array(b)) => a == b,
            (Comparable::Map(a), Comparable::Map(b)) => a == b,
            (Comparable::Opaque(a), Comparable::Opaque(b)) => a == b,
            _ => false,
        }
    }
}

impl PartialOrd for Comparable<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => Some(Ordering::Equal),
            (Comparable::Bool(a), Comparable::Bool(b)) => a.partial_cmp(b),
            (Comparable::Number(a), Comparable::Number(b)) => a.partial_cmp(b),
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a.partial_cmp(b),
            (Comparable::String(a), Comparable::String(b)) => a.partial_cmp(b),
            (Comparable::ObjectId(a), Comparable::ObjectId(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}

/// Resolves a dotted path inside a document. Numeric segments index into arrays.
pub(crate) fn resolve<'a>(document: &'a Document, path: &str) -> Option<&'a Bson> {
    let mut segments = path.split('.');
    let mut current = document.get(segments.next()?)?;

    for segment in segments {
        current = match current {
            Bson::Document(inner) => inner.get(segment)?,
            Bson::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }

    Some(current)
}

/// Compares two documents by a sort specification (`{ field: 1 | -1, ... }`).
///
/// Missing and null values sort before everything else in ascending order.
pub(crate) fn sort_cmp(left: &Document, right: &Document, sort: &Document) -> Ordering {
    for (field, direction) in sort {
        let descending = matches!(direction, Bson::Int32(d) if *d < 0)
            || matches!(direction, Bson::Int64(d) if *d < 0)
            || matches!(direction, Bson::Double(d) if *d < 0.0);

        let a = resolve(left, field).map(Comparable::from).unwrap_or(Comparable::Null);
        let b = resolve(right, field).map(Comparable::from).unwrap_or(Comparable::Null);

        let ordering = a.total_cmp(&b);
        let ordering = if descending { ordering.reverse() } else { ordering };

        if ordering != Ordering::Equal {
            return ordering;
        }
    }

    Ordering::Equal
}

/// Evaluates a filter document against one document.
pub(crate) struct DocumentEvaluator<'a> {
    document: &'a Document,
}

impl<'a> DocumentEvaluator<'a> {
    pub fn new(document: &'a Document) -> Self {
        Self { document }
    }

    /// Returns `true` when the document satisfies `filter`.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::InvalidOptions`] for unknown operators or malformed
    /// operator arguments.
    pub fn matches(&self, filter: &Document) -> DocumentStoreResult<bool> {
        for (key, condition) in filter {
            let matched = match key.as_str() {
                "$and" => self.all(condition)?,
                "$or" => self.any(condition)?,
                "$nor" => !self.any(condition)?,
                op if op.starts_with('$') => {
                    return Err(DocumentStoreError::InvalidOptions(format!(
                        "unknown top-level operator `{op}`"
                    )));
                }
                field => self.field_matches(field, condition)?,
            };

            if !matched {
                return Ok(false);
            }
        }

        Ok(true)
    }

    /// Returns the documents matching `filter`, preserving their order.
    pub fn filter_documents(
        documents: impl IntoIterator<Item = &'a Document>,
        filter: &Document,
    ) -> DocumentStoreResult<Vec<Document>> {
        let mut matched = Vec::new();

        for document in documents {
            if DocumentEvaluator::new(document).matches(filter)? {
                matched.push(document.clone());
            }
        }

        Ok(matched)
    }

    fn all(&self, clauses: &Bson) -> DocumentStoreResult<bool> {
        for clause in clause_list(clauses)? {
            if !self.matches(clause)? {
                return Ok(false);
            }
        }

        Ok(true)
    }

    fn any(&self, clauses: &Bson) -> DocumentStoreResult<bool> {
        for clause in clause_list(clauses)? {
            if self.matches(clause)? {
                return Ok(true);
            }
        }

        Ok(false)
    }

    fn field_matches(&self, field: &str, condition: &Bson) -> DocumentStoreResult<bool> {
        let value = resolve(self.document, field);

        match condition {
            Bson::Document(ops) if is_operator_document(ops) => {
                for (op, operand) in ops {
                    if !apply_operator(value, op, operand)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            expected => Ok(equals(value, expected)),
        }
    }
}

fn is_operator_document(document: &Document) -> bool {
    !document.is_empty() && document.keys().all(|key| key.starts_with('$'))
}

fn clause_list(clauses: &Bson) -> DocumentStoreResult<Vec<&Document>> {
    match clauses {
        Bson::Array(items) if !items.is_empty() => items
            .iter()
            .map(|item| {
                item.as_document().ok_or_else(|| {
                    DocumentStoreError::InvalidOptions(
                        "logical operators expect an array of filter documents".to_string(),
                    )
                })
            })
            .collect(),
        _ => Err(DocumentStoreError::InvalidOptions(
            "logical operators expect a non-empty array".to_string(),
        )),
    }
}

/// Equality with array membership; a missing field equals `null`.
fn equals(value: Option<&Bson>, expected: &Bson) -> bool {
    let expected = Comparable::from(expected);

    match value {
        None => expected == Comparable::Null,
        Some(value) => {
            let actual = Comparable::from(value);
            if actual == expected {
                return true;
            }
            match actual {
                Comparable::Array(items) => items.iter().any(|item| *item == expected),
                _ => false,
            }
        }
    }
}

fn compare(value: Option<&Bson>, operand: &Bson, accept: fn(Ordering) -> bool) -> bool {
    let Some(value) = value else {
        return false;
    };
    let operand = Comparable::from(operand);

    match Comparable::from(value) {
        Comparable::Array(items) => items
            .iter()
            .any(|item| item.partial_cmp(&operand).is_some_and(accept)),
        actual => actual.partial_cmp(&operand).is_some_and(accept),
    }
}

fn apply_operator(value: Option<&Bson>, op: &str, operand: &Bson) -> DocumentStoreResult<bool> {
    Ok(match op {
        "$eq" => equals(value, operand),
        "$ne" => !equals(value, operand),
        "$gt" => compare(value, operand, |o| o == Ordering::Greater),
        "$gte" => compare(value, operand, |o| o != Ordering::Less),
        "$lt" => compare(value, operand, |o| o == Ordering::Less),
        "$lte" => compare(value, operand, |o| o != Ordering::Greater),
        "$in" => in_list(value, op, operand)?,
        "$nin" => !in_list(value, op, operand)?,
        "$exists" => value.is_some() == truthy(operand),
        "$not" => match operand {
            Bson::Document(ops) if is_operator_document(ops) => {
                let mut all = true;
                for (inner, inner_operand) in ops {
                    all &= apply_operator(value, inner, inner_operand)?;
                }
                !all
            }
            _ => {
                return Err(DocumentStoreError::InvalidOptions(
                    "$not expects an operator document".to_string(),
                ));
            }
        },
        other => {
            return Err(DocumentStoreError::InvalidOptions(format!(
                "unsupported query operator `{other}`"
            )));
        }
    })
}

fn in_list(value: Option<&Bson>, op: &str, operand: &Bson) -> DocumentStoreResult<bool> {
    match operand {
        Bson::Array(candidates) => Ok(candidates
            .iter()
            .any(|candidate| equals(value, candidate))),
        _ => Err(DocumentStoreError::InvalidOptions(format!("{op} expects an array"))),
    }
}

fn truthy(value: &Bson) -> bool {
    match value {
        Bson::Boolean(flag) => *flag,
        Bson::Int32(n) => *n != 0,
        Bson::Int64(n) => *n != 0,
        Bson::Double(n) => *n != 0.0,
        Bson::Null | Bson::Undefined => false,
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::{doc, oid::ObjectId};

    fn event() -> Document {
        doc! {
            "ts": 5,
            "kind": "click",
            "tags": ["web", "beta"],
            "meta": { "source": "landing", "score": 2.5 },
        }
    }

    fn matches(filter: Document) -> bool {
        DocumentEvaluator::new(&event()).matches(&filter).unwrap()
    }

    #[test]
    fn equality_and_array_membership() {
        assert!(matches(doc! { "ts": 5 }));
        assert!(matches(doc! { "ts": 5.0 }));
        assert!(matches(doc! { "tags": "beta" }));
        assert!(!matches(doc! { "kind": "view" }));
        assert!(matches(doc! { "missing": null }));
    }

    #[test]
    fn dotted_paths_reach_nested_fields() {
        assert!(matches(doc! { "meta.source": "landing" }));
        assert!(matches(doc! { "meta.score": { "$gt": 2 } }));
        assert!(matches(doc! { "tags.0": "web" }));
    }

    #[test]
    fn comparison_and_set_operators() {
        assert!(matches(doc! { "ts": { "$gte": 5, "$lt": 6 } }));
        assert!(!matches(doc! { "ts": { "$gt": 5 } }));
        assert!(matches(doc! { "kind": { "$in": ["view", "click"] } }));
        assert!(matches(doc! { "kind": { "$nin": ["view"] } }));
        assert!(matches(doc! { "kind": { "$ne": "view" } }));
        assert!(matches(doc! { "missing": { "$exists": false } }));
        assert!(matches(doc! { "ts": { "$not": { "$gt": 10 } } }));
        assert!(!matches(doc! { "kind": { "$gt": 1 } }));
    }

    #[test]
    fn logical_combinators() {
        assert!(matches(doc! { "$or": [{ "ts": 1 }, { "kind": "click" }] }));
        assert!(!matches(doc! { "$and": [{ "ts": 5 }, { "kind": "view" }] }));
        assert!(matches(doc! { "$nor": [{ "ts": 1 }, { "kind": "view" }] }));
    }

    #[test]
    fn unknown_operators_are_invalid() {
        let evaluator_doc = event();
        let evaluator = DocumentEvaluator::new(&evaluator_doc);

        assert!(matches!(
            evaluator.matches(&doc! { "ts": { "$regex": "5" } }),
            Err(DocumentStoreError::InvalidOptions(_))
        ));
        assert!(matches!(
            evaluator.matches(&doc! { "$where": "true" }),
            Err(DocumentStoreError::InvalidOptions(_))
        ));
    }

    #[test]
    fn object_ids_are_ordered() {
        let first = ObjectId::new();
        let second = ObjectId::new();
        let document = doc! { "_id": second };

        assert!(
            DocumentEvaluator::new(&document)
                .matches(&doc! { "_id": { "$gt": first } })
                .unwrap()
        );
    }

    #[test]
    fn sort_puts_missing_values_first() {
        let a = doc! { "n": 2 };
        let b = doc! { "other": true };
        let c = doc! { "n": 1 };

        let mut docs = vec![a.clone(), b.clone(), c.clone()];
        docs.sort_by(|x, y| sort_cmp(x, y, &doc! { "n": 1 }));
        assert_eq!(docs, vec![b.clone(), c.clone(), a.clone()]);

        docs.sort_by(|x, y| sort_cmp(x, y, &doc! { "n": -1 }));
        assert_eq!(docs, vec![a, c, b]);
    }

    #[test]
    fn nan_sorts_after_numbers() {
        let nan = doc! { "n": f64::NAN };
        let one = doc! { "n": 1 };
        let two = doc! { "n": 2.5 };

        let mut docs = vec![nan.clone(), two.clone(), one.clone(), nan.clone()];
        docs.sort_by(|x, y| sort_cmp(x, y, &doc! { "n": 1 }));

        let values = docs
            .iter()
            .map(|document| document.get("n").cloned().unwrap())
            .collect::<Vec<_>>();
        assert_eq!(values[..2], [Bson::Int32(1), Bson::Double(2.5)]);
        assert!(values[2..].iter().all(|value| matches!(value, Bson::Double(n) if n.is_nan())));
        assert_eq!(sort_cmp(&nan, &nan, &doc! { "n": 1 }), Ordering::Equal);
    }
}
