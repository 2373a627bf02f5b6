//! Request path to resource type resolution.

use crate::config::PathMapping;

/// Maps the API path a job was created for to the resource type its
/// records are stored under.
pub trait ResourceTypeResolver: Send + Sync {
    fn resolve(&self, path: &str) -> Option<String>;
}

/// Resolves by configured path prefix.
///
/// The query string and trailing slashes are ignored; when several
/// prefixes match, the longest one wins.
#[derive(Debug, Clone, Default)]
pub struct PathMappingResolver {
    mappings: Vec<PathMapping>,
}

impl PathMappingResolver {
    pub fn new(mappings: impl IntoIterator<Item = PathMapping>) -> Self {
        let mappings = mappings
            .into_iter()
            .map(|m| PathMapping {
                prefix: normalize(&m.prefix).to_string(),
                resource_type: m.resource_type,
            })
            .collect();
        Self { mappings }
    }

    pub fn with_mapping(mut self, prefix: &str, resource_type: &str) -> Self {
        self.mappings.push(PathMapping {
            prefix: normalize(prefix).to_string(),
            resource_type: resource_type.to_string(),
        });
        self
    }
}

fn normalize(path: &str) -> &str {
    let path = path.split_once('?').map_or(path, |(p, _)| p);
    path.trim_end_matches('/')
}

impl ResourceTypeResolver for PathMappingResolver {
    fn resolve(&self, path: &str) -> Option<String> {
        let path = normalize(path);
        self.mappings
            .iter()
            .filter(|m| {
                path.strip_prefix(m.prefix.as_str())
                    .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
            })
            .max_by_key(|m| m.prefix.len())
            .map(|m| m.resource_type.clone())
    }
}
