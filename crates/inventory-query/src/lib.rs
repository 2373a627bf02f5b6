//! Query introspection for the inventory API.
//!
//! - [`jsonpath`]: a JSONPath parser and evaluator
//! - [`projection`]: field-selection detection and application
//! - [`pagination`]: `Link` / count headers for windowed list responses
//! - [`params`]: query-string to [`QueryDescriptor`] parsing
//!
//! [`QueryDescriptor`]: inventory_storage::QueryDescriptor

pub mod error;
pub mod jsonpath;
pub mod pagination;
pub mod params;
pub mod projection;

pub use error::{QueryError, SyntaxKind};
pub use jsonpath::JsonPath;
pub use pagination::{
    LinkContext, PageLink, ResponseHeaders, build_page_links, generate_response_headers,
};
pub use params::parse_query_string;
pub use projection::{MANDATORY_FIELDS, ProjectionSpec, apply_json_path, get_field_selection};
