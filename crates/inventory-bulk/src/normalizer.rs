//! Per-record normalization applied during import.

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use crate::error::NormalizeError;

/// Request-scoped data passed to every normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizeContext {
    /// Collection URL the records are served from, without trailing slash.
    pub url: String,
}

impl NormalizeContext {
    /// Joins the public base URL with the request path, dropping any query.
    pub fn new(base_url: &str, path: &str) -> Self {
        let path = path.split_once('?').map_or(path, |(p, _)| p);
        Self {
            url: format!(
                "{}/{}",
                base_url.trim_end_matches('/'),
                path.trim_matches('/')
            ),
        }
    }
}

#[async_trait]
pub trait RecordNormalizer: Send + Sync {
    /// Produces the record to store. Implementations may complete in any
    /// order relative to each other.
    async fn normalize(
        &self,
        resource_type: &str,
        record: Value,
        ctx: &NormalizeContext,
    ) -> Result<Value, NormalizeError>;
}

/// Stamps the attributes every stored record carries: `id`, `@type`
/// and `href`.
#[derive(Debug, Clone, Copy, Default)]
pub struct CommonAttributes;

#[async_trait]
impl RecordNormalizer for CommonAttributes {
    async fn normalize(
        &self,
        resource_type: &str,
        mut record: Value,
        ctx: &NormalizeContext,
    ) -> Result<Value, NormalizeError> {
        let Value::Object(map) = &mut record else {
            return Err(NormalizeError::NotAnObject(record.to_string()));
        };

        let id = match map.get("id") {
            Some(Value::String(id)) => id.clone(),
            Some(Value::Null) | None => {
                let id = Uuid::new_v4().to_string();
                map.insert("id".into(), Value::String(id.clone()));
                id
            }
            Some(other) => other.to_string(),
        };
        if !map.contains_key("@type") {
            map.insert("@type".into(), Value::String(resource_type.to_string()));
        }
        map.insert("href".into(), Value::String(format!("{}/{id}", ctx.url)));

        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx() -> NormalizeContext {
        NormalizeContext::new("https://inv.example.com/api/", "/resource/?offset=0")
    }

    #[test]
    fn test_context_url() {
        assert_eq!(ctx().url, "https://inv.example.com/api/resource");
    }

    #[tokio::test]
    async fn test_stamps_missing_attributes() {
        let out = CommonAttributes
            .normalize("Resource", json!({"name": "r1"}), &ctx())
            .await
            .unwrap();

        let id = out["id"].as_str().unwrap();
        assert!(Uuid::parse_str(id).is_ok());
        assert_eq!(out["@type"], "Resource");
        assert_eq!(
            out["href"],
            format!("https://inv.example.com/api/resource/{id}")
        );
    }

    #[tokio::test]
    async fn test_keeps_existing_id_and_type() {
        let out = CommonAttributes
            .normalize(
                "Resource",
                json!({"id": "a", "@type": "Router", "href": "stale"}),
                &ctx(),
            )
            .await
            .unwrap();

        assert_eq!(out["id"], "a");
        assert_eq!(out["@type"], "Router");
        assert_eq!(out["href"], "https://inv.example.com/api/resource/a");
    }

    #[tokio::test]
    async fn test_rejects_non_objects() {
        let err = CommonAttributes
            .normalize("Resource", json!([1, 2]), &ctx())
            .await
            .unwrap_err();
        assert!(matches!(err, NormalizeError::NotAnObject(_)));
    }
}
