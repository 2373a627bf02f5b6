//! Query-string parsing.
//!
//! ```text
//! ?fields=name,id&category=network&filter=$.items[?(@.x)]&offset=10&limit=5
//! ```
//!
//! `fields`, `offset`, `limit` and `filter` are reserved; every other pair
//! becomes an equality criterion.

use inventory_storage::QueryDescriptor;
use url::form_urlencoded;

use crate::error::QueryError;
use crate::jsonpath::JsonPath;

/// Parses a raw query string (with or without the leading `?`).
///
/// # Errors
///
/// `QueryError::InvalidParameter` for a non-numeric window value and
/// `QueryError::InvalidQuery` for a malformed `filter` expression.
pub fn parse_query_string(query: &str) -> Result<QueryDescriptor, QueryError> {
    let query = query.strip_prefix('?').unwrap_or(query);
    let mut descriptor = QueryDescriptor::new();

    for (key, value) in form_urlencoded::parse(query.as_bytes()) {
        match key.as_ref() {
            "fields" => {
                for field in value.split(',').map(str::trim).filter(|f| !f.is_empty()) {
                    descriptor.options.projection.insert(field.to_string(), 1);
                }
            }
            "offset" => descriptor.options.skip = parse_window_value("offset", &value)?,
            "limit" => descriptor.options.limit = parse_window_value("limit", &value)?,
            "filter" => {
                JsonPath::parse(&value)?;
                descriptor.jsonpath = Some(value.into_owned());
            }
            _ => {
                descriptor
                    .criteria
                    .insert(key.into_owned(), value.into_owned());
            }
        }
    }

    tracing::trace!(
        criteria = descriptor.criteria.len(),
        skip = descriptor.options.skip,
        limit = descriptor.options.limit,
        "parsed query string"
    );
    Ok(descriptor)
}

fn parse_window_value(name: &str, value: &str) -> Result<usize, QueryError> {
    value
        .trim()
        .parse()
        .map_err(|_| QueryError::InvalidParameter {
            name: name.to_string(),
            message: format!("expected a non-negative integer, got '{value}'"),
        })
}
