//! Update expression evaluation for in-memory documents.

use bson::{Bson, Document};

use doclink_core::{
    error::{DocumentStoreError, DocumentStoreResult},
    query::ID_FIELD,
};

use crate::evaluator::Comparable;

/// Applies an update expression to `document` in place.
///
/// A document without operators is treated as a `$set` payload. `$setOnInsert` is only
/// applied when `inserting` is set.
///
/// # Errors
///
/// Returns [`DocumentStoreError::InvalidOptions`] for unknown operators and
/// [`DocumentStoreError::Validation`] when the update would change the primary id or
/// targets a value of the wrong type.
pub(crate) fn apply_update(
    document: &mut Document,
    update: &Document,
    inserting: bool,
) -> DocumentStoreResult<()> {
    let original_id = document.get(ID_FIELD).cloned();

    if !update.keys().any(|key| key.starts_with('$')) {
        set_all(document, update)?;
    } else {
        for (op, payload) in update {
            let fields = payload.as_document().ok_or_else(|| {
                DocumentStoreError::InvalidOptions(format!("{op} expects a document"))
            })?;

            match op.as_str() {
                "$set" => set_all(document, fields)?,
                "$setOnInsert" if inserting => set_all(document, fields)?,
                "$setOnInsert" => {}
                "$unset" => {
                    for path in fields.keys() {
                        unset_path(document, path);
                    }
                }
                "$inc" => {
                    for (path, amount) in fields {
                        increment(document, path, amount)?;
                    }
                }
                "$push" => {
                    for (path, value) in fields {
                        array_at(document, path)?.push(value.clone());
                    }
                }
                "$addToSet" => {
                    for (path, value) in fields {
                        let items = array_at(document, path)?;
                        let candidate = Comparable::from(value);
                        if !items.iter().any(|item| Comparable::from(item) == candidate) {
                            items.push(value.clone());
                        }
                    }
                }
                "$pull" => {
                    for (path, value) in fields {
                        if let Some(Bson::Array(items)) = get_path_mut(document, path) {
                            let candidate = Comparable::from(value);
                            items.retain(|item| Comparable::from(item) != candidate);
                        }
                    }
                }
                other => {
                    return Err(DocumentStoreError::InvalidOptions(format!(
                        "unsupported update operator `{other}`"
                    )));
                }
            }
        }
    }

    if original_id.is_some() && document.get(ID_FIELD) != original_id.as_ref() {
        return Err(DocumentStoreError::Validation(format!(
            "the immutable field `{ID_FIELD}` cannot be modified"
        )));
    }

    Ok(())
}

/// Builds the base of an upserted document from the equality conditions of a filter.
pub(crate) fn upsert_seed(filter: &Document) -> Document {
    let mut seed = Document::new();

    for (key, condition) in filter {
        if key.starts_with('$') {
            continue;
        }

        let value = match condition {
            Bson::Document(ops) if ops.keys().any(|op| op.starts_with('$')) => match ops.get("$eq") {
                Some(value) => value.clone(),
                None => continue,
            },
            value => value.clone(),
        };

        // Nested paths that cannot be created are simply left out of the seed.
        let _ = set_path(&mut seed, key, value);
    }

    seed
}

fn set_all(document: &mut Document, fields: &Document) -> DocumentStoreResult<()> {
    for (path, value) in fields {
        set_path(document, path, value.clone())?;
    }
    Ok(())
}

fn set_path(document: &mut Document, path: &str, value: Bson) -> DocumentStoreResult<()> {
    match path.split_once('.') {
        None => {
            document.insert(path, value);
            Ok(())
        }
        Some((head, rest)) => {
            let child = document
                .entry(head.to_string())
                .or_insert_with(|| Bson::Document(Document::new()));

            match child {
                Bson::Document(inner) => set_path(inner, rest, value),
                _ => Err(DocumentStoreError::Validation(format!(
                    "cannot create field `{rest}` inside non-document `{head}`"
                ))),
            }
        }
    }
}

fn unset_path(document: &mut Document, path: &str) {
    match path.split_once('.') {
        None => {
            document.remove(path);
        }
        Some((head, rest)) => {
            if let Some(Bson::Document(inner)) = document.get_mut(head) {
                unset_path(inner, rest);
            }
        }
    }
}

fn get_path_mut<'a>(document: &'a mut Document, path: &str) -> Option<&'a mut Bson> {
    match path.split_once('.') {
        None => document.get_mut(path),
        Some((head, rest)) => match document.get_mut(head)? {
            Bson::Document(inner) => get_path_mut(inner, rest),
            _ => None,
        },
    }
}

fn array_at<'a>(document: &'a mut Document, path: &str) -> DocumentStoreResult<&'a mut Vec<Bson>> {
    if get_path_mut(document, path).is_none() {
        set_path(document, path, Bson::Array(Vec::new()))?;
    }

    match get_path_mut(document, path) {
        Some(Bson::Array(items)) => Ok(items),
        _ => Err(DocumentStoreError::Validation(format!(
            "field `{path}` is not an array"
        ))),
    }
}

fn increment(document: &mut Document, path: &str, amount: &Bson) -> DocumentStoreResult<()> {
    let current = get_path_mut(document, path).cloned();

    let next = match (current, amount) {
        (None | Some(Bson::Null), amount) if is_number(amount) => amount.clone(),
        (Some(Bson::Int32(a)), Bson::Int32(b)) => match a.checked_add(*b) {
            Some(sum) => Bson::Int32(sum),
            None => Bson::Int64(i64::from(a) + i64::from(*b)),
        },
        (Some(Bson::Int32(a)), Bson::Int64(b)) => Bson::Int64(i64::from(a).saturating_add(*b)),
        (Some(Bson::Int64(a)), Bson::Int32(b)) => Bson::Int64(a.saturating_add(i64::from(*b))),
        (Some(Bson::Int64(a)), Bson::Int64(b)) => Bson::Int64(a.saturating_add(*b)),
        (Some(current), amount) if is_number(&current) && is_number(amount) => {
            Bson::Double(as_f64(&current) + as_f64(amount))
        }
        _ => {
            return Err(DocumentStoreError::Validation(format!(
                "cannot apply $inc to non-numeric field `{path}`"
            )));
        }
    };

    set_path(document, path, next)
}

fn is_number(value: &Bson) -> bool {
    matches!(value, Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_))
}

fn as_f64(value: &Bson) -> f64 {
    match value {
        Bson::Int32(n) => f64::from(*n),
        Bson::Int64(n) => *n as f64,
        Bson::Double(n) => *n,
        _ => 0.0,
    }
}
