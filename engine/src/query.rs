//! Declarative query descriptions for live result sets.
//!
//! A [`QuerySpec`] names a collection and describes which records belong to
//! the result set (predicate), how they are ordered (sort descriptors,
//! with a record-id tie-break so ordering is a total order), how many rows
//! are materialized (limit), and how rows group into sections (section
//! key).

use crate::{CollectionName, Record};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Comparison operators usable in predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Comparison {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    /// Substring match for strings, membership for arrays
    Contains,
}

/// A boolean filter over record fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Predicate {
    Compare {
        field: String,
        op: Comparison,
        value: serde_json::Value,
    },
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    Not(Box<Predicate>),
}

impl Predicate {
    /// Build a field comparison.
    pub fn compare(
        field: impl Into<String>,
        op: Comparison,
        value: serde_json::Value,
    ) -> Self {
        Predicate::Compare {
            field: field.into(),
            op,
            value,
        }
    }

    /// All children must match.
    pub fn and(children: Vec<Predicate>) -> Self {
        Predicate::And(children)
    }

    /// At least one child must match.
    pub fn or(children: Vec<Predicate>) -> Self {
        Predicate::Or(children)
    }

    /// Negate a predicate.
    pub fn negate(inner: Predicate) -> Self {
        Predicate::Not(Box::new(inner))
    }

    /// Evaluate against a record's current field values.
    ///
    /// A comparison against a missing field never matches (even `Ne`); use
    /// `Not` for explicit absence checks.
    pub fn matches(&self, record: &Record) -> bool {
        match self {
            Predicate::Compare { field, op, value } => match record.field(field) {
                Some(actual) => compare_matches(actual, *op, value),
                None => false,
            },
            Predicate::And(children) => children.iter().all(|p| p.matches(record)),
            Predicate::Or(children) => children.iter().any(|p| p.matches(record)),
            Predicate::Not(inner) => !inner.matches(record),
        }
    }

    /// Every field name referenced anywhere in the tree.
    pub fn referenced_fields(&self) -> Vec<&str> {
        let mut fields = Vec::new();
        self.collect_fields(&mut fields);
        fields
    }

    fn collect_fields<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Predicate::Compare { field, .. } => out.push(field),
            Predicate::And(children) | Predicate::Or(children) => {
                for child in children {
                    child.collect_fields(out);
                }
            }
            Predicate::Not(inner) => inner.collect_fields(out),
        }
    }
}

fn compare_matches(actual: &serde_json::Value, op: Comparison, expected: &serde_json::Value) -> bool {
    match op {
        Comparison::Eq => actual == expected,
        Comparison::Ne => actual != expected,
        Comparison::Lt => compare_values(actual, expected) == Ordering::Less,
        Comparison::Le => compare_values(actual, expected) != Ordering::Greater,
        Comparison::Gt => compare_values(actual, expected) == Ordering::Greater,
        Comparison::Ge => compare_values(actual, expected) != Ordering::Less,
        Comparison::Contains => match actual {
            serde_json::Value::String(s) => expected
                .as_str()
                .map(|needle| s.contains(needle))
                .unwrap_or(false),
            serde_json::Value::Array(items) => items.contains(expected),
            _ => false,
        },
    }
}

/// Total order over JSON values: Null < Bool < Number < String < Array <
/// Object. Numbers compare numerically; composite values fall back to
/// their serialized form so the order stays deterministic.
pub fn compare_values(a: &serde_json::Value, b: &serde_json::Value) -> Ordering {
    use serde_json::Value::*;

    fn rank(value: &serde_json::Value) -> u8 {
        match value {
            Null => 0,
            Bool(_) => 1,
            Number(_) => 2,
            String(_) => 3,
            Array(_) => 4,
            Object(_) => 5,
        }
    }

    match (a, b) {
        (Null, Null) => Ordering::Equal,
        (Bool(x), Bool(y)) => x.cmp(y),
        (Number(x), Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(i), Some(j)) => i.cmp(&j),
            _ => x
                .as_f64()
                .partial_cmp(&y.as_f64())
                .unwrap_or(Ordering::Equal),
        },
        (String(x), String(y)) => x.cmp(y),
        (Array(_), Array(_)) | (Object(_), Object(_)) => {
            let x = a.to_string();
            let y = b.to_string();
            x.cmp(&y)
        }
        _ => rank(a).cmp(&rank(b)),
    }
}

/// A single sort instruction: field plus direction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SortDescriptor {
    /// Field to sort on
    pub field: String,
    /// Ascending when true, descending otherwise
    pub ascending: bool,
}

impl SortDescriptor {
    /// Sort ascending on a field.
    pub fn ascending(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            ascending: true,
        }
    }

    /// Sort descending on a field.
    pub fn descending(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            ascending: false,
        }
    }
}

/// Full description of a live query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuerySpec {
    /// Collection the query runs against
    pub collection: CollectionName,
    /// Optional row filter
    pub predicate: Option<Predicate>,
    /// Sort descriptors, applied in order
    pub sort: Vec<SortDescriptor>,
    /// Optional cap on the number of materialized rows (applied after sorting)
    pub limit: Option<usize>,
    /// Optional field whose value groups rows into sections
    pub section_key: Option<String>,
}

impl QuerySpec {
    /// Create a spec matching every record of a collection, ordered by id.
    pub fn new(collection: impl Into<CollectionName>) -> Self {
        Self {
            collection: collection.into(),
            predicate: None,
            sort: Vec::new(),
            limit: None,
            section_key: None,
        }
    }

    /// Builder-style predicate.
    pub fn with_predicate(mut self, predicate: Predicate) -> Self {
        self.predicate = Some(predicate);
        self
    }

    /// Builder-style sort order.
    pub fn sorted_by(mut self, sort: Vec<SortDescriptor>) -> Self {
        self.sort = sort;
        self
    }

    /// Builder-style row limit.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Builder-style section grouping key.
    pub fn with_section_key(mut self, key: impl Into<String>) -> Self {
        self.section_key = Some(key.into());
        self
    }

    /// Compare two records under this spec's sort descriptors.
    ///
    /// Records equal under every descriptor fall back to their id, so the
    /// resulting order is total and stable across recomputation.
    pub fn compare(&self, a: &Record, b: &Record) -> Ordering {
        for descriptor in &self.sort {
            let null = serde_json::Value::Null;
            let left = a.field(&descriptor.field).unwrap_or(&null);
            let right = b.field(&descriptor.field).unwrap_or(&null);

            let ordering = if descriptor.ascending {
                compare_values(left, right)
            } else {
                compare_values(right, left)
            };

            if ordering != Ordering::Equal {
                return ordering;
            }
        }

        a.entity_id.id.cmp(&b.entity_id.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Origin;
    use serde_json::json;

    fn order(id: &str, payload: serde_json::Value) -> Record {
        Record::new("orders", id, payload, 1000, Origin::Remote)
    }

    #[test]
    fn predicate_compare_eq() {
        let predicate = Predicate::compare("status", Comparison::Eq, json!("open"));

        assert!(predicate.matches(&order("a", json!({"status": "open"}))));
        assert!(!predicate.matches(&order("b", json!({"status": "closed"}))));
    }

    #[test]
    fn predicate_missing_field_never_matches() {
        let ne = Predicate::compare("status", Comparison::Ne, json!("open"));
        assert!(!ne.matches(&order("a", json!({"number": 1}))));

        // Explicit absence check goes through Not.
        let absent = Predicate::negate(Predicate::compare("status", Comparison::Eq, json!("open")));
        assert!(absent.matches(&order("a", json!({"number": 1}))));
    }

    #[test]
    fn predicate_numeric_ranges() {
        let predicate = Predicate::and(vec![
            Predicate::compare("total", Comparison::Ge, json!(10)),
            Predicate::compare("total", Comparison::Lt, json!(100)),
        ]);

        assert!(predicate.matches(&order("a", json!({"total": 10}))));
        assert!(predicate.matches(&order("b", json!({"total": 99.5}))));
        assert!(!predicate.matches(&order("c", json!({"total": 100}))));
        assert!(!predicate.matches(&order("d", json!({"total": 9}))));
    }

    #[test]
    fn predicate_contains() {
        let substring = Predicate::compare("note", Comparison::Contains, json!("rush"));
        assert!(substring.matches(&order("a", json!({"note": "rush delivery"}))));
        assert!(!substring.matches(&order("b", json!({"note": "standard"}))));

        let membership = Predicate::compare("tags", Comparison::Contains, json!("vip"));
        assert!(membership.matches(&order("c", json!({"tags": ["vip", "repeat"]}))));
        assert!(!membership.matches(&order("d", json!({"tags": ["repeat"]}))));
    }

    #[test]
    fn predicate_or() {
        let predicate = Predicate::or(vec![
            Predicate::compare("status", Comparison::Eq, json!("open")),
            Predicate::compare("status", Comparison::Eq, json!("pending")),
        ]);

        assert!(predicate.matches(&order("a", json!({"status": "pending"}))));
        assert!(!predicate.matches(&order("b", json!({"status": "closed"}))));
    }

    #[test]
    fn referenced_fields_walks_the_tree() {
        let predicate = Predicate::and(vec![
            Predicate::compare("status", Comparison::Eq, json!("open")),
            Predicate::negate(Predicate::compare("total", Comparison::Gt, json!(5))),
        ]);

        assert_eq!(predicate.referenced_fields(), vec!["status", "total"]);
    }

    #[test]
    fn value_ordering_across_types() {
        assert_eq!(
            compare_values(&json!(null), &json!(false)),
            Ordering::Less
        );
        assert_eq!(compare_values(&json!(1), &json!("a")), Ordering::Less);
        assert_eq!(compare_values(&json!(2), &json!(10)), Ordering::Less);
        assert_eq!(compare_values(&json!(2.5), &json!(2)), Ordering::Greater);
        assert_eq!(compare_values(&json!("a"), &json!("b")), Ordering::Less);
    }

    #[test]
    fn spec_compare_applies_descriptors_in_order() {
        let spec = QuerySpec::new("orders").sorted_by(vec![
            SortDescriptor::descending("status"),
            SortDescriptor::ascending("number"),
        ]);

        let a = order("a", json!({"status": "open", "number": 2}));
        let b = order("b", json!({"status": "open", "number": 1}));
        let c = order("c", json!({"status": "closed", "number": 0}));

        assert_eq!(spec.compare(&b, &a), Ordering::Less); // same status, lower number
        assert_eq!(spec.compare(&a, &c), Ordering::Less); // "open" > "closed", descending
    }

    #[test]
    fn spec_compare_ties_break_on_id() {
        let spec = QuerySpec::new("orders").sorted_by(vec![SortDescriptor::ascending("status")]);

        let a = order("a", json!({"status": "open"}));
        let b = order("b", json!({"status": "open"}));

        assert_eq!(spec.compare(&a, &b), Ordering::Less);
        assert_eq!(spec.compare(&b, &a), Ordering::Greater);
    }

    #[test]
    fn spec_compare_missing_sort_field_sorts_first() {
        let spec = QuerySpec::new("orders").sorted_by(vec![SortDescriptor::ascending("number")]);

        let missing = order("a", json!({}));
        let present = order("b", json!({"number": 0}));

        assert_eq!(spec.compare(&missing, &present), Ordering::Less);
    }

    #[test]
    fn serialization_roundtrip() {
        let spec = QuerySpec::new("orders")
            .with_predicate(Predicate::compare("status", Comparison::Eq, json!("open")))
            .sorted_by(vec![SortDescriptor::descending("number")])
            .with_limit(25)
            .with_section_key("status");

        let json = serde_json::to_string(&spec).unwrap();
        let parsed: QuerySpec = serde_json::from_str(&json).unwrap();

        assert_eq!(spec, parsed);
    }
}
