//! Schema definition and validation.
//!
//! Schemas define the fields of each collection. They serve two purposes:
//! validating payloads before they are committed, and catching malformed
//! query specs (unknown predicate/sort/section fields) synchronously at
//! `perform_fetch` time, where they are programmer errors rather than
//! runtime conditions.

use crate::query::QuerySpec;
use crate::{error::Result, CollectionName, Error};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Field types supported in schemas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Int,
    Float,
    Bool,
    Timestamp,
    /// Arbitrary nested JSON
    Json,
}

impl FieldType {
    /// Whether values of this type have a meaningful total order.
    ///
    /// `Json` fields carry arbitrary nested structure and are rejected as
    /// sort keys.
    pub fn is_sortable(self) -> bool {
        !matches!(self, FieldType::Json)
    }

    fn matches(self, value: &serde_json::Value) -> bool {
        match self {
            FieldType::String => value.is_string(),
            FieldType::Int => value.is_i64() || value.is_u64(),
            FieldType::Float => value.is_f64() || value.is_i64() || value.is_u64(),
            FieldType::Bool => value.is_boolean(),
            FieldType::Timestamp => value.is_u64() || value.is_i64(),
            FieldType::Json => true,
        }
    }
}

impl std::fmt::Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldType::String => write!(f, "String"),
            FieldType::Int => write!(f, "Int"),
            FieldType::Float => write!(f, "Float"),
            FieldType::Bool => write!(f, "Bool"),
            FieldType::Timestamp => write!(f, "Timestamp"),
            FieldType::Json => write!(f, "Json"),
        }
    }
}

fn json_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "Null",
        serde_json::Value::Bool(_) => "Bool",
        serde_json::Value::Number(n) if n.is_i64() || n.is_u64() => "Int",
        serde_json::Value::Number(_) => "Float",
        serde_json::Value::String(_) => "String",
        serde_json::Value::Array(_) => "Array",
        serde_json::Value::Object(_) => "Object",
    }
}

/// Definition of a field in a collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDef {
    /// Field name
    pub name: String,
    /// Field type
    pub field_type: FieldType,
    /// Whether this field is required
    pub required: bool,
}

impl FieldDef {
    /// Create a new required field definition.
    pub fn required(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            required: true,
        }
    }

    /// Create a new optional field definition.
    pub fn optional(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            required: false,
        }
    }

    fn validate(&self, value: Option<&serde_json::Value>) -> Result<()> {
        match value {
            None | Some(serde_json::Value::Null) if self.required => {
                Err(Error::MissingRequiredField(self.name.clone()))
            }
            None | Some(serde_json::Value::Null) => Ok(()),
            Some(v) if self.field_type.matches(v) => Ok(()),
            Some(v) => Err(Error::TypeMismatch {
                field: self.name.clone(),
                expected: self.field_type.to_string(),
                got: json_type_name(v).to_string(),
            }),
        }
    }
}

/// Schema for a collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionSchema {
    /// Collection name
    pub name: CollectionName,
    /// Field definitions
    pub fields: Vec<FieldDef>,
}

impl CollectionSchema {
    /// Create a new collection schema.
    pub fn new(name: impl Into<CollectionName>, fields: Vec<FieldDef>) -> Self {
        Self {
            name: name.into(),
            fields,
        }
    }

    /// Look up a field definition by name.
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Validate a payload against this schema.
    pub fn validate_payload(&self, payload: &serde_json::Value) -> Result<()> {
        let obj = payload
            .as_object()
            .ok_or_else(|| Error::InvalidPayload("payload must be an object".into()))?;

        for field in &self.fields {
            field.validate(obj.get(&field.name))?;
        }

        Ok(())
    }

    fn require_field(&self, name: &str) -> Result<&FieldDef> {
        self.field(name).ok_or_else(|| Error::UnknownField {
            collection: self.name.clone(),
            field: name.to_string(),
        })
    }
}

/// Schema for the entire store.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schema {
    /// Collection schemas by name
    pub collections: HashMap<CollectionName, CollectionSchema>,
}

impl Schema {
    /// Create a new empty schema.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a collection to the schema.
    pub fn add_collection(&mut self, collection: CollectionSchema) -> &mut Self {
        self.collections.insert(collection.name.clone(), collection);
        self
    }

    /// Builder-style method to add a collection.
    pub fn with_collection(mut self, collection: CollectionSchema) -> Self {
        self.add_collection(collection);
        self
    }

    /// Get a collection schema by name.
    pub fn get_collection(&self, name: &str) -> Option<&CollectionSchema> {
        self.collections.get(name)
    }

    /// Validate a payload bound for a collection.
    pub fn validate_write(&self, collection: &str, payload: &serde_json::Value) -> Result<()> {
        let collection_schema = self
            .collections
            .get(collection)
            .ok_or_else(|| Error::CollectionNotFound(collection.to_string()))?;

        collection_schema.validate_payload(payload)
    }

    /// Validate a query spec: every referenced field must be defined, and
    /// every sort/section key must be sortable.
    pub fn validate_query(&self, spec: &QuerySpec) -> Result<()> {
        let collection = self
            .collections
            .get(&spec.collection)
            .ok_or_else(|| Error::CollectionNotFound(spec.collection.clone()))?;

        for descriptor in &spec.sort {
            let field = collection.require_field(&descriptor.field)?;
            if !field.field_type.is_sortable() {
                return Err(Error::UnsortableField {
                    collection: collection.name.clone(),
                    field: descriptor.field.clone(),
                });
            }
        }

        if let Some(key) = &spec.section_key {
            let field = collection.require_field(key)?;
            if !field.field_type.is_sortable() {
                return Err(Error::UnsortableField {
                    collection: collection.name.clone(),
                    field: key.clone(),
                });
            }
        }

        if let Some(predicate) = &spec.predicate {
            for field in predicate.referenced_fields() {
                collection.require_field(field)?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{Comparison, Predicate, SortDescriptor};
    use serde_json::json;

    fn test_schema() -> Schema {
        Schema::new().with_collection(CollectionSchema::new(
            "orders",
            vec![
                FieldDef::required("number", FieldType::Int),
                FieldDef::required("status", FieldType::String),
                FieldDef::optional("total", FieldType::Float),
                FieldDef::optional("lines", FieldType::Json),
            ],
        ))
    }

    #[test]
    fn validate_valid_payload() {
        let schema = test_schema();

        let payload = json!({"number": 1, "status": "open"});
        assert!(schema.validate_write("orders", &payload).is_ok());

        let with_optional = json!({"number": 1, "status": "open", "total": 9.5});
        assert!(schema.validate_write("orders", &with_optional).is_ok());
    }

    #[test]
    fn validate_missing_required_field() {
        let schema = test_schema();

        let payload = json!({"number": 1}); // missing status
        let result = schema.validate_write("orders", &payload);

        assert!(matches!(result, Err(Error::MissingRequiredField(f)) if f == "status"));
    }

    #[test]
    fn validate_null_required_field() {
        let schema = test_schema();

        let payload = json!({"number": 1, "status": null});
        let result = schema.validate_write("orders", &payload);

        assert!(matches!(result, Err(Error::MissingRequiredField(f)) if f == "status"));
    }

    #[test]
    fn validate_wrong_type() {
        let schema = test_schema();

        let payload = json!({"number": "one", "status": "open"});
        let result = schema.validate_write("orders", &payload);

        assert!(matches!(result, Err(Error::TypeMismatch { field, .. }) if field == "number"));
    }

    #[test]
    fn validate_unknown_collection() {
        let schema = test_schema();

        let result = schema.validate_write("products", &json!({}));
        assert!(matches!(result, Err(Error::CollectionNotFound(c)) if c == "products"));
    }

    #[test]
    fn validate_query_accepts_known_fields() {
        let schema = test_schema();
        let spec = QuerySpec::new("orders")
            .with_predicate(Predicate::compare("status", Comparison::Eq, json!("open")))
            .sorted_by(vec![SortDescriptor::ascending("number")])
            .with_section_key("status");

        assert!(schema.validate_query(&spec).is_ok());
    }

    #[test]
    fn validate_query_rejects_unknown_sort_key() {
        let schema = test_schema();
        let spec = QuerySpec::new("orders").sorted_by(vec![SortDescriptor::ascending("bogus")]);

        let result = schema.validate_query(&spec);
        assert!(matches!(result, Err(Error::UnknownField { field, .. }) if field == "bogus"));
    }

    #[test]
    fn validate_query_rejects_json_sort_key() {
        let schema = test_schema();
        let spec = QuerySpec::new("orders").sorted_by(vec![SortDescriptor::ascending("lines")]);

        let result = schema.validate_query(&spec);
        assert!(matches!(result, Err(Error::UnsortableField { field, .. }) if field == "lines"));
    }

    #[test]
    fn validate_query_rejects_unknown_predicate_field() {
        let schema = test_schema();
        let spec = QuerySpec::new("orders").with_predicate(Predicate::and(vec![
            Predicate::compare("status", Comparison::Eq, json!("open")),
            Predicate::compare("ghost", Comparison::Gt, json!(1)),
        ]));

        let result = schema.validate_query(&spec);
        assert!(matches!(result, Err(Error::UnknownField { field, .. }) if field == "ghost"));
    }

    #[test]
    fn validate_query_rejects_unknown_collection() {
        let schema = test_schema();
        let spec = QuerySpec::new("products");

        let result = schema.validate_query(&spec);
        assert!(matches!(result, Err(Error::CollectionNotFound(c)) if c == "products"));
    }

    #[test]
    fn field_type_display() {
        assert_eq!(FieldType::String.to_string(), "String");
        assert_eq!(FieldType::Int.to_string(), "Int");
        assert_eq!(FieldType::Json.to_string(), "Json");
    }

    #[test]
    fn schema_serialization() {
        let schema = test_schema();
        let json = serde_json::to_string(&schema).unwrap();
        let parsed: Schema = serde_json::from_str(&json).unwrap();
        assert_eq!(schema, parsed);
    }
}
