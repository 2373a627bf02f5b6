//! Field selection.
//!
//! A filter whose trailing segment names members (`$.items['name','id']`)
//! doubles as a projection: the trailing segment is popped, the rest of the
//! path runs as a query, and each resulting object keeps only the named
//! fields plus [`MANDATORY_FIELDS`].

use indexmap::IndexSet;
use inventory_storage::QueryDescriptor;
use serde_json::Value;

use crate::error::QueryError;
use crate::jsonpath::{JsonPath, Segment, Selector, UnionMember};

/// Fields that survive every projection.
pub const MANDATORY_FIELDS: [&str; 3] = ["id", "href", "@type"];

/// Returns the member names selected by the trailing segment of `filter`.
///
/// Only a bare member, a single string subscript or a union of string
/// subscripts count as a selection. Anything else, including an expression
/// that does not parse, yields an empty list.
#[must_use]
pub fn get_field_selection(filter: &str) -> Vec<String> {
    match JsonPath::parse(filter) {
        Ok(path) => trailing_selection(&path),
        Err(err) => {
            tracing::debug!(filter, error = %err, "filter is not a projection");
            Vec::new()
        }
    }
}

fn trailing_selection(path: &JsonPath) -> Vec<String> {
    match path.segments.last() {
        Some(Segment::Child(Selector::Name(name) | Selector::QuotedName(name))) => {
            vec![name.clone()]
        }
        Some(Segment::Child(Selector::Union(members))) => members
            .iter()
            .map(|m| match m {
                UnionMember::Name(name) => Some(name.clone()),
                UnionMember::Index(_) => None,
            })
            .collect::<Option<Vec<_>>>()
            .unwrap_or_default(),
        _ => Vec::new(),
    }
}

/// Requested fields for one query, plus the fields that are always kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectionSpec {
    pub fields: IndexSet<String>,
    pub mandatory_fields: IndexSet<String>,
}

impl Default for ProjectionSpec {
    fn default() -> Self {
        Self {
            fields: IndexSet::new(),
            mandatory_fields: MANDATORY_FIELDS.iter().map(ToString::to_string).collect(),
        }
    }
}

impl ProjectionSpec {
    /// Projection implied by a JSONPath filter alone.
    #[must_use]
    pub fn from_filter(filter: &str) -> Self {
        Self::default().with_fields(get_field_selection(filter))
    }

    /// Projection for a list request: `fields=` plus whatever the filter's
    /// trailing segment selects.
    #[must_use]
    pub fn from_query(query: &QueryDescriptor) -> Self {
        let from_filter = query
            .jsonpath
            .as_deref()
            .map(get_field_selection)
            .unwrap_or_default();
        Self::default()
            .with_fields(query.projected_fields().map(str::to_string))
            .with_fields(from_filter)
    }

    #[must_use]
    pub fn with_fields(mut self, fields: impl IntoIterator<Item = String>) -> Self {
        self.fields.extend(fields);
        self
    }

    /// `true` when no projection was requested and records pass whole.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    #[must_use]
    pub fn keeps(&self, key: &str) -> bool {
        self.fields.contains(key) || self.mandatory_fields.contains(key)
    }

    /// Drops every key outside `fields ∪ mandatory_fields`.
    ///
    /// No-op for an empty spec and for non-object values.
    pub fn apply(&self, record: &mut Value) {
        if self.is_empty() {
            return;
        }
        if let Value::Object(map) = record {
            map.retain(|key, _| self.keeps(key));
        }
    }
}

/// Runs `query` against `data`, applying a trailing projection if present.
///
/// # Errors
///
/// `QueryError::InvalidQuery` if the expression is malformed,
/// `QueryError::Internal` if evaluation fails.
pub fn apply_json_path(data: &Value, query: &str) -> Result<Vec<Value>, QueryError> {
    let path = JsonPath::parse(query)?;
    let fields = trailing_selection(&path);
    if fields.is_empty() {
        return Ok(path.evaluate(data)?.into_iter().cloned().collect());
    }

    let spec = ProjectionSpec::default().with_fields(fields);
    let (rest, _) = path
        .split_last()
        .ok_or_else(|| QueryError::Internal {
            message: "projection without a segment".into(),
        })?;
    let results = rest
        .evaluate(data)?
        .into_iter()
        .map(|node| {
            let mut node = node.clone();
            spec.apply(&mut node);
            node
        })
        .collect();
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_field_selection() {
        assert!(get_field_selection("$.store.book[0]").is_empty());
        assert_eq!(get_field_selection(r#"$.store["name"]"#), ["name"]);
        assert_eq!(get_field_selection(r#"$.store["name","id"]"#), ["name", "id"]);
        assert_eq!(get_field_selection("$.store.name"), ["name"]);
        assert!(get_field_selection("$.store[*]").is_empty());
        assert!(get_field_selection("$..name").is_empty());
        assert!(get_field_selection("$.a['x', 0]").is_empty());
        assert!(get_field_selection("$").is_empty());
        assert!(get_field_selection("$.a['broken").is_empty());
    }

    #[test]
    fn test_field_selection_of_deeply_nested_filter() {
        let filter = format!("$.a[?({}@.x{})]", "(".repeat(20_000), ")".repeat(20_000));
        assert!(get_field_selection(&filter).is_empty());
        assert!(apply_json_path(&json!({"a": []}), &filter).is_err());
    }

    #[test]
    fn test_projection_keeps_mandatory_fields() {
        let spec = ProjectionSpec::from_filter("$.items['name']");
        let mut record = json!({
            "id": "1", "href": "/r/1", "@type": "Router", "name": "r1", "vendor": "acme"
        });
        spec.apply(&mut record);
        assert_eq!(
            record,
            json!({"id": "1", "href": "/r/1", "@type": "Router", "name": "r1"})
        );
    }

    #[test]
    fn test_projection_is_idempotent() {
        let query = QueryDescriptor::new()
            .with_field("vendor")
            .with_jsonpath("$.items['name']");
        let spec = ProjectionSpec::from_query(&query);
        assert_eq!(
            spec.fields.iter().collect::<Vec<_>>(),
            ["vendor", "name"]
        );

        let mut once = json!({"id": "1", "name": "r1", "vendor": "acme", "extra": true});
        spec.apply(&mut once);
        let mut twice = once.clone();
        spec.apply(&mut twice);
        assert_eq!(once, twice);
        assert_eq!(once, json!({"id": "1", "name": "r1", "vendor": "acme"}));
    }

    #[test]
    fn test_empty_spec_passes_records_whole() {
        let spec = ProjectionSpec::from_query(&QueryDescriptor::new());
        let mut record = json!({"a": 1, "b": 2});
        spec.apply(&mut record);
        assert_eq!(record, json!({"a": 1, "b": 2}));
    }

    #[test]
    fn test_apply_json_path_with_projection() {
        let data = json!({
            "items": [
                {"id": "1", "@type": "Router", "name": "r1", "vendor": "acme"},
                {"id": "2", "@type": "Switch", "name": "s1", "vendor": "initech"}
            ]
        });

        let result = apply_json_path(&data, "$.items[*]['name']").unwrap();
        assert_eq!(
            result,
            vec![
                json!({"id": "1", "@type": "Router", "name": "r1"}),
                json!({"id": "2", "@type": "Switch", "name": "s1"}),
            ]
        );

        let result = apply_json_path(&data, "$.items[?(@.vendor == 'acme')]").unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0]["vendor"], "acme");
    }

    #[test]
    fn test_apply_json_path_rejects_bad_syntax() {
        let err = apply_json_path(&json!({}), "$.items[?(@.a = 1)]").unwrap_err();
        assert!(err.is_invalid_query());
    }
}
