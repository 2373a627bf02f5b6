//! Response headers for windowed list requests.
//!
//! ```text
//! X-Total-Count: 10
//! X-Result-Count: 4
//! Link: <https://host/resource?offset=0&limit=4>; rel="self", <...offset=4&limit=4>; rel="next", ...
//! ```

use indexmap::IndexMap;
use inventory_storage::QueryDescriptor;
use url::form_urlencoded;

pub const TOTAL_COUNT_HEADER: &str = "X-Total-Count";
pub const RESULT_COUNT_HEADER: &str = "X-Result-Count";
pub const LINK_HEADER: &str = "Link";

/// Where the list request was served from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkContext {
    /// Scheme, host and optional prefix, e.g. `https://inventory.example.com/api`.
    pub base_url: String,
    /// Request path, e.g. `/resource`.
    pub path: String,
}

impl LinkContext {
    pub fn new(base_url: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            path: path.into(),
        }
    }
}

/// One entry of the `Link` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageLink {
    pub relation: String,
    pub url: String,
}

/// Header name to value, in emission order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseHeaders(IndexMap<&'static str, String>);

impl ResponseHeaders {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &str)> {
        self.0.iter().map(|(k, v)| (*k, v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Builds the count and `Link` headers for one page of results.
///
/// `total_size` is the number of records matching the criteria,
/// `result_count` the number returned in this page.
#[must_use]
pub fn generate_response_headers(
    context: &LinkContext,
    query: &QueryDescriptor,
    total_size: usize,
    result_count: usize,
) -> ResponseHeaders {
    let mut headers = IndexMap::new();
    if total_size > 0 {
        headers.insert(TOTAL_COUNT_HEADER, total_size.to_string());
    }
    if result_count > 0 {
        headers.insert(RESULT_COUNT_HEADER, result_count.to_string());
    }

    let links = build_page_links(context, query, total_size);
    if !links.is_empty() {
        let value = links
            .iter()
            .map(|link| format!("<{}>; rel=\"{}\"", link.url, link.relation))
            .collect::<Vec<_>>()
            .join(", ");
        headers.insert(LINK_HEADER, value);
    }

    ResponseHeaders(headers)
}

/// Pagination links for the window in `query`.
///
/// Empty when the request has no window (`offset` and `limit` both zero).
#[must_use]
pub fn build_page_links(
    context: &LinkContext,
    query: &QueryDescriptor,
    total: usize,
) -> Vec<PageLink> {
    let skip = query.options.skip;
    let limit = query.options.limit;
    if skip == 0 && limit == 0 {
        return Vec::new();
    }

    let link = |relation: &str, offset: usize, limit: usize| PageLink {
        relation: relation.to_string(),
        url: build_page_url(context, query, offset, limit),
    };

    let mut links = vec![link("self", skip, limit)];

    if limit > 0 && skip + limit < total {
        let next_offset = skip + limit;
        links.push(link("next", next_offset, limit.min(total - next_offset)));
        links.push(link("last", total - limit, limit));
    }

    if limit > 0 && skip > limit {
        links.push(link("prev", skip - limit, limit));
    } else if skip > 0 {
        links.push(link("prev", 0, skip));
    }

    links
}

/// Rebuilds the request URL for another window, keeping projection,
/// criteria and filter.
fn build_page_url(
    context: &LinkContext,
    query: &QueryDescriptor,
    offset: usize,
    limit: usize,
) -> String {
    let mut params = form_urlencoded::Serializer::new(String::new());

    let fields = query.projected_fields().collect::<Vec<_>>();
    if !fields.is_empty() {
        params.append_pair("fields", &fields.join(","));
    }
    for (field, value) in &query.criteria {
        params.append_pair(field, value);
    }
    if let Some(filter) = &query.jsonpath {
        params.append_pair("filter", filter);
    }
    params.append_pair("offset", &offset.to_string());
    if limit > 0 {
        params.append_pair("limit", &limit.to_string());
    }

    format!(
        "{}/{}?{}",
        context.base_url.trim_end_matches('/'),
        context.path.trim_start_matches('/'),
        params.finish()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> LinkContext {
        LinkContext::new("https://inv.example.com/api/", "/resource")
    }

    fn relations(links: &[PageLink]) -> Vec<&str> {
        links.iter().map(|l| l.relation.as_str()).collect()
    }

    fn url_of<'a>(links: &'a [PageLink], relation: &str) -> &'a str {
        &links
            .iter()
            .find(|l| l.relation == relation)
            .unwrap_or_else(|| panic!("no {relation} link"))
            .url
    }

    #[test]
    fn test_first_page() {
        let query = QueryDescriptor::new().with_window(0, 4);
        let links = build_page_links(&context(), &query, 10);

        assert_eq!(relations(&links), ["self", "next", "last"]);
        assert_eq!(
            url_of(&links, "self"),
            "https://inv.example.com/api/resource?offset=0&limit=4"
        );
        assert!(url_of(&links, "next").ends_with("offset=4&limit=4"));
        assert!(url_of(&links, "last").ends_with("offset=6&limit=4"));
    }

    #[test]
    fn test_last_page_has_no_next() {
        let query = QueryDescriptor::new().with_window(8, 4);
        let links = build_page_links(&context(), &query, 10);

        assert_eq!(relations(&links), ["self", "prev"]);
        assert!(url_of(&links, "prev").ends_with("offset=4&limit=4"));
    }

    #[test]
    fn test_short_next_window_and_partial_prev() {
        let query = QueryDescriptor::new().with_window(2, 4);
        let links = build_page_links(&context(), &query, 9);

        assert!(url_of(&links, "next").ends_with("offset=6&limit=3"));
        assert!(url_of(&links, "last").ends_with("offset=5&limit=4"));
        assert!(url_of(&links, "prev").ends_with("offset=0&limit=2"));
    }

    #[test]
    fn test_links_keep_query_state() {
        let query = QueryDescriptor::new()
            .with_field("name")
            .with_field("id")
            .with_criterion("category", "core network")
            .with_jsonpath("$.a")
            .with_window(0, 2);
        let links = build_page_links(&context(), &query, 5);

        for link in &links {
            assert!(
                link.url.contains("?fields=name%2Cid&category=core+network&filter=%24.a&offset="),
                "{}",
                link.url
            );
        }
    }

    #[test]
    fn test_headers() {
        let query = QueryDescriptor::new().with_window(0, 4);
        let headers = generate_response_headers(&context(), &query, 10, 4);

        assert_eq!(headers.get(TOTAL_COUNT_HEADER), Some("10"));
        assert_eq!(headers.get(RESULT_COUNT_HEADER), Some("4"));
        let link = headers.get(LINK_HEADER).unwrap();
        assert!(link.starts_with("<https://inv.example.com/api/resource?offset=0&limit=4>; rel=\"self\", <"));
        assert_eq!(link.matches("rel=").count(), 3);
    }

    #[test]
    fn test_no_window_no_link() {
        let headers = generate_response_headers(&context(), &QueryDescriptor::new(), 0, 0);
        assert!(headers.is_empty());

        let headers = generate_response_headers(&context(), &QueryDescriptor::new(), 3, 3);
        assert_eq!(headers.len(), 2);
        assert_eq!(headers.get(LINK_HEADER), None);
    }

    #[test]
    fn test_offset_only_window() {
        let query = QueryDescriptor::new().with_window(3, 0);
        let links = build_page_links(&context(), &query, 10);

        assert_eq!(relations(&links), ["self", "prev"]);
        assert!(url_of(&links, "self").ends_with("?offset=3"));
        assert!(url_of(&links, "prev").ends_with("offset=0&limit=3"));
    }
}
