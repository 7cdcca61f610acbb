//! Collection schema definitions.
//!
//! A [`Schema`] maps field names to a [`FieldSpec`]. Schemas are registered per collection
//! on a connection handle and bound into the driver's model for that collection, which
//! validates documents with [`Schema::validate_document`] and update expressions with
//! [`Schema::validate_update`].
//!
//! ```ignore
//! use doclink_core::schema::{FieldSpec, FieldType, Schema};
//!
//! let events = Schema::new()
//!     .field("ts", FieldSpec::new(FieldType::Number).required())
//!     .field("kind", FieldType::String)
//!     .field("tags", FieldSpec::new(FieldType::Array).default_value(bson::Bson::Array(vec![])));
//! ```

use bson::{Bson, Document};
use std::collections::BTreeMap;

use crate::{
    error::{DocumentStoreError, DocumentStoreResult},
    query::ID_FIELD,
};

/// The type a schema field accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    String,
    /// Any numeric BSON value (`Int32`, `Int64`, `Double`, `Decimal128`).
    Number,
    Boolean,
    Date,
    ObjectId,
    Array,
    Document,
    /// Accepts any value.
    Mixed,
}

impl FieldType {
    /// Returns `true` when `value` is acceptable for this type. `Null` is handled by the caller.
    pub fn accepts(&self, value: &Bson) -> bool {
        match self {
            FieldType::String => matches!(value, Bson::String(_)),
            FieldType::Number => matches!(
                value,
                Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) | Bson::Decimal128(_)
            ),
            FieldType::Boolean => matches!(value, Bson::Boolean(_)),
            FieldType::Date => matches!(value, Bson::DateTime(_) | Bson::Timestamp(_)),
            FieldType::ObjectId => matches!(value, Bson::ObjectId(_)),
            FieldType::Array => matches!(value, Bson::Array(_)),
            FieldType::Document => matches!(value, Bson::Document(_)),
            FieldType::Mixed => true,
        }
    }

    /// Whether dotted paths may reach inside values of this type.
    fn is_nested(&self) -> bool {
        matches!(self, FieldType::Array | FieldType::Document | FieldType::Mixed)
    }
}

/// Specification for one schema field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    pub kind: FieldType,
    pub required: bool,
    pub default: Option<Bson>,
}

impl FieldSpec {
    pub fn new(kind: FieldType) -> Self {
        Self { kind, required: false, default: None }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn default_value(mut self, value: impl Into<Bson>) -> Self {
        self.default = Some(value.into());
        self
    }

    fn check(&self, field: &str, value: &Bson) -> DocumentStoreResult<()> {
        match value {
            Bson::Null if self.required => Err(DocumentStoreError::Validation(format!(
                "field `{field}` is required"
            ))),
            Bson::Null => Ok(()),
            value if self.kind.accepts(value) => Ok(()),
            value => Err(DocumentStoreError::Validation(format!(
                "field `{field}` expects {:?}, got {:?}",
                self.kind,
                value.element_type()
            ))),
        }
    }
}

impl From<FieldType> for FieldSpec {
    fn from(kind: FieldType) -> Self {
        FieldSpec::new(kind)
    }
}

/// A collection schema: field name to field specification.
///
/// Strict schemas (the default) strip fields they do not declare; schemaless ones
/// keep them.
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    fields: BTreeMap<String, FieldSpec>,
    strict: bool,
}

impl Schema {
    pub fn new() -> Self {
        Self { fields: BTreeMap::new(), strict: true }
    }

    /// A schema that keeps undeclared fields.
    pub fn schemaless() -> Self {
        Self { fields: BTreeMap::new(), strict: false }
    }

    pub fn field(mut self, name: impl Into<String>, spec: impl Into<FieldSpec>) -> Self {
        self.fields.insert(name.into(), spec.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.get(name)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldSpec)> {
        self.fields
            .iter()
            .map(|(name, spec)| (name.as_str(), spec))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn is_strict(&self) -> bool {
        self.strict
    }

    /// Adds (or replaces) the fields of `other` in place.
    pub fn extend(&mut self, other: Schema) {
        self.fields.extend(other.fields);
    }

    /// Validates a document about to be created.
    ///
    /// Fills in defaults, rejects missing required fields and mistyped values, and strips
    /// undeclared fields when strict. The primary id is always kept.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::Validation`] describing the first offending field.
    pub fn validate_document(&self, document: Document) -> DocumentStoreResult<Document> {
        let mut validated = Document::new();

        for (key, value) in document {
            if key == ID_FIELD {
                validated.insert(key, value);
                continue;
            }

            match self.fields.get(&key) {
                Some(spec) => {
                    spec.check(&key, &value)?;
                    validated.insert(key, value);
                }
                None if self.strict => {
                    tracing::debug!(field = %key, "Stripping undeclared field");
                }
                None => {
                    validated.insert(key, value);
                }
            }
        }

        for (name, spec) in &self.fields {
            if validated.contains_key(name) {
                continue;
            }

            match (&spec.default, spec.required) {
                (Some(default), _) => {
                    validated.insert(name.clone(), default.clone());
                }
                (None, true) => {
                    return Err(DocumentStoreError::Validation(format!(
                        "field `{name}` is required"
                    )));
                }
                (None, false) => {}
            }
        }

        Ok(validated)
    }

    /// Validates an update expression.
    ///
    /// A document without operators is a plain field map and is checked like a `$set`
    /// payload. `$set` and `$setOnInsert` payloads are type-checked and stripped of
    /// undeclared fields; unsetting a required field is rejected; every other operator is
    /// forwarded untouched.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::Validation`] for rejected fields and
    /// [`DocumentStoreError::InvalidOptions`] when operators and plain fields are mixed.
    pub fn validate_update(&self, update: Document) -> DocumentStoreResult<Document> {
        let operators = update
            .keys()
            .filter(|key| key.starts_with('$'))
            .count();

        if operators == 0 {
            return self.validate_fields(update);
        }
        if operators != update.len() {
            return Err(DocumentStoreError::InvalidOptions(
                "update expression mixes operators and plain fields".to_string(),
            ));
        }

        let mut validated = Document::new();

        for (op, payload) in update {
            match (op.as_str(), payload) {
                ("$set" | "$setOnInsert", Bson::Document(fields)) => {
                    let fields = self.validate_fields(fields)?;
                    if !fields.is_empty() {
                        validated.insert(op, fields);
                    }
                }
                ("$unset", Bson::Document(fields)) => {
                    if let Some(name) = fields
                        .keys()
                        .find(|name| self.fields.get(*name).is_some_and(|spec| spec.required))
                    {
                        return Err(DocumentStoreError::Validation(format!(
                            "field `{name}` is required and cannot be unset"
                        )));
                    }
                    validated.insert(op, fields);
                }
                (_, payload) => {
                    validated.insert(op, payload);
                }
            }
        }

        Ok(validated)
    }

    fn validate_fields(&self, fields: Document) -> DocumentStoreResult<Document> {
        let mut validated = Document::new();

        for (key, value) in fields {
            let (top, nested) = match key.split_once('.') {
                Some((top, _)) => (top.to_string(), true),
                None => (key.clone(), false),
            };

            if top == ID_FIELD {
                validated.insert(key, value);
                continue;
            }

            match self.fields.get(&top) {
                Some(spec) if nested && spec.kind.is_nested() => {
                    validated.insert(key, value);
                }
                Some(_) if nested => {
                    return Err(DocumentStoreError::Validation(format!(
                        "field `{top}` has no nested path `{key}`"
                    )));
                }
                Some(spec) => {
                    spec.check(&key, &value)?;
                    validated.insert(key, value);
                }
                None if self.strict => {
                    tracing::debug!(field = %key, "Stripping undeclared field from update");
                }
                None => {
                    validated.insert(key, value);
                }
            }
        }

        Ok(validated)
    }
}

impl Default for Schema {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> FromIterator<(K, V)> for Schema
where
    K: Into<String>,
    V: Into<FieldSpec>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        iter.into_iter()
            .fold(Schema::new(), |schema, (name, spec)| schema.field(name, spec))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    fn events() -> Schema {
        Schema::new()
            .field("ts", FieldSpec::new(FieldType::Number).required())
            .field("kind", FieldType::String)
            .field("meta", FieldType::Document)
            .field("seen", FieldSpec::new(FieldType::Boolean).default_value(false))
    }

    #[test]
    fn valid_document_gets_defaults_and_loses_unknown_fields() {
        let doc = events()
            .validate_document(doc! { "ts": 5, "kind": "click", "extra": 1 })
            .unwrap();

        assert_eq!(doc, doc! { "ts": 5, "kind": "click", "seen": false });
    }

    #[test]
    fn missing_required_field_is_rejected() {
        let err = events()
            .validate_document(doc! { "kind": "click" })
            .unwrap_err();
        assert!(matches!(err, DocumentStoreError::Validation(_)));
    }

    #[test]
    fn wrong_type_is_rejected() {
        let err = events()
            .validate_document(doc! { "ts": "five" })
            .unwrap_err();
        assert!(matches!(err, DocumentStoreError::Validation(_)));
    }

    #[test]
    fn schemaless_keeps_everything() {
        let doc = Schema::schemaless()
            .validate_document(doc! { "anything": [1, 2] })
            .unwrap();
        assert_eq!(doc, doc! { "anything": [1, 2] });
    }

    #[test]
    fn plain_update_is_checked_and_stripped() {
        let update = events()
            .validate_update(doc! { "kind": "view", "bogus": true })
            .unwrap();
        assert_eq!(update, doc! { "kind": "view" });

        assert!(events().validate_update(doc! { "kind": 3 }).is_err());
    }

    #[test]
    fn operator_update_checks_set_and_unset() {
        let update = events()
            .validate_update(doc! { "$set": { "meta.source": "web" }, "$inc": { "ts": 1 } })
            .unwrap();
        assert_eq!(update, doc! { "$set": { "meta.source": "web" }, "$inc": { "ts": 1 } });

        let err = events()
            .validate_update(doc! { "$unset": { "ts": "" } })
            .unwrap_err();
        assert!(matches!(err, DocumentStoreError::Validation(_)));

        let err = events()
            .validate_update(doc! { "$set": { "kind.deep": 1 } })
            .unwrap_err();
        assert!(matches!(err, DocumentStoreError::Validation(_)));
    }

    #[test]
    fn mixed_update_is_invalid() {
        let err = events()
            .validate_update(doc! { "$set": { "kind": "a" }, "ts": 1 })
            .unwrap_err();
        assert!(matches!(err, DocumentStoreError::InvalidOptions(_)));
    }

    #[test]
    fn extend_adds_fields() {
        let mut schema = events();
        schema.extend(Schema::new().field("user", FieldType::ObjectId));

        assert_eq!(schema.len(), 5);
        assert_eq!(schema.get("user").unwrap().kind, FieldType::ObjectId);
    }
}
