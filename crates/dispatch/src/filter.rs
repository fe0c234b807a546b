//! Request predicates used to classify requests into request types.
//!
//! A request type (for example `"mobile"` or `"json"`) selects among sibling handlers of the
//! same route. The router evaluates its rules in registration order, and each rule is a
//! [`Filter`]:
//!
//! ```
//! use micro_dispatch::filter::{accept, any_filter, header_contains};
//! use micro_dispatch::Router;
//!
//! let mut mobile = any_filter();
//! mobile.or(header_contains(http::header::USER_AGENT, "iPhone")).or(header_contains(http::header::USER_AGENT, "Android"));
//!
//! let mut builder = Router::builder();
//! builder.request_type("mobile", mobile).request_type("json", accept(mime::APPLICATION_JSON));
//! ```
//!
//! All filters are `Send + Sync`, the frozen [`Router`](crate::Router) is shared by every
//! request-handling task.

use crate::RequestHeader;
use http::{HeaderName, HeaderValue};

/// Core trait for request filtering.
pub trait Filter: Send + Sync {
    /// Returns `true` if the request satisfies this filter.
    fn matches(&self, req: &RequestHeader) -> bool;
}

/// A filter that wraps a closure.
struct FnFilter<F: Fn(&RequestHeader) -> bool>(F);

impl<F: Fn(&RequestHeader) -> bool + Send + Sync> Filter for FnFilter<F> {
    fn matches(&self, req: &RequestHeader) -> bool {
        (self.0)(req)
    }
}

/// Creates a new filter from a closure.
///
/// ```
/// use micro_dispatch::filter::fn_filter;
///
/// let api = fn_filter(|req| req.path().starts_with("/api"));
/// ```
pub fn fn_filter<F>(f: F) -> impl Filter
where
    F: Fn(&RequestHeader) -> bool + Send + Sync,
{
    FnFilter(f)
}

/// Creates a new OR-composed filter chain.
pub fn any_filter() -> AnyFilter {
    AnyFilter::new()
}

/// Compose filters with OR logic.
///
/// An empty chain matches nothing: a rule built from it never classifies a request.
pub struct AnyFilter {
    filters: Vec<Box<dyn Filter>>,
}

impl AnyFilter {
    fn new() -> Self {
        Self { filters: vec![] }
    }

    pub fn or<F: Filter + 'static>(&mut self, filter: F) -> &mut Self {
        self.filters.push(Box::new(filter));
        self
    }
}

impl Filter for AnyFilter {
    fn matches(&self, req: &RequestHeader) -> bool {
        self.filters.iter().any(|filter| filter.matches(req))
    }
}

/// Creates a new AND-composed filter chain.
pub fn all_filter() -> AllFilter {
    AllFilter::new()
}

/// Compose filters with AND logic. An empty chain matches every request.
pub struct AllFilter {
    filters: Vec<Box<dyn Filter>>,
}

impl AllFilter {
    fn new() -> Self {
        Self { filters: vec![] }
    }

    pub fn and<F: Filter + 'static>(&mut self, filter: F) -> &mut Self {
        self.filters.push(Box::new(filter));
        self
    }
}

impl Filter for AllFilter {
    fn matches(&self, req: &RequestHeader) -> bool {
        self.filters.iter().all(|filter| filter.matches(req))
    }
}

/// Creates a filter that matches a specific header name and value exactly.
///
/// # Errors
///
/// Returns an error if the name or the value is not a valid header token.
pub fn header<K, V>(header_name: K, header_value: V) -> Result<HeaderFilter, http::Error>
where
    HeaderName: TryFrom<K>,
    <HeaderName as TryFrom<K>>::Error: Into<http::Error>,
    HeaderValue: TryFrom<V>,
    <HeaderValue as TryFrom<V>>::Error: Into<http::Error>,
{
    let name = <HeaderName as TryFrom<K>>::try_from(header_name).map_err(Into::into)?;
    let value = <HeaderValue as TryFrom<V>>::try_from(header_value).map_err(Into::into)?;
    Ok(HeaderFilter(name, value))
}

/// A filter that matches an HTTP header value exactly.
pub struct HeaderFilter(HeaderName, HeaderValue);

impl Filter for HeaderFilter {
    fn matches(&self, req: &RequestHeader) -> bool {
        req.headers().get(&self.0).is_some_and(|value| self.1.eq(value))
    }
}

/// Creates a filter that matches when any value of `header_name` contains `needle`.
pub fn header_contains(header_name: HeaderName, needle: impl Into<String>) -> HeaderContainsFilter {
    HeaderContainsFilter { name: header_name, needle: needle.into() }
}

pub struct HeaderContainsFilter {
    name: HeaderName,
    needle: String,
}

impl Filter for HeaderContainsFilter {
    fn matches(&self, req: &RequestHeader) -> bool {
        req.headers()
            .get_all(&self.name)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .any(|value| value.contains(self.needle.as_str()))
    }
}

/// Creates a filter that matches when the `Accept` header lists `mime`.
pub fn accept(mime: mime::Mime) -> HeaderContainsFilter {
    header_contains(http::header::ACCEPT, mime.essence_str())
}

#[cfg(test)]
mod tests {
    use super::{accept, all_filter, any_filter, fn_filter, header, header_contains, Filter};
    use crate::RequestHeader;
    use http::Request;

    fn request(user_agent: &str, accept: &str) -> RequestHeader {
        Request::builder()
            .uri("/api/items")
            .header(http::header::USER_AGENT, user_agent)
            .header(http::header::ACCEPT, accept)
            .body(())
            .unwrap()
            .into()
    }

    #[test]
    fn test_header_filters() {
        let req = request("Mozilla/5.0 (iPhone)", "application/json, text/plain");

        assert!(header(http::header::ACCEPT, "application/json, text/plain").unwrap().matches(&req));
        assert!(!header(http::header::ACCEPT, "application/json").unwrap().matches(&req));
        assert!(header_contains(http::header::USER_AGENT, "iPhone").matches(&req));
        assert!(accept(mime::APPLICATION_JSON).matches(&req));
        assert!(!accept(mime::TEXT_HTML).matches(&req));
    }

    #[test]
    fn test_invalid_header_filter() {
        assert!(header("bad header", "x").is_err());
    }

    #[test]
    fn test_composed_filters() {
        let req = request("Mozilla/5.0 (Android)", "text/html");

        let mut mobile = any_filter();
        mobile.or(header_contains(http::header::USER_AGENT, "iPhone")).or(header_contains(http::header::USER_AGENT, "Android"));
        assert!(mobile.matches(&req));

        let mut mobile_api = all_filter();
        mobile_api.and(mobile).and(fn_filter(|req| req.path().starts_with("/api")));
        assert!(mobile_api.matches(&req));

        assert!(!any_filter().matches(&req));
        assert!(all_filter().matches(&req));
    }
}
