//! HTTP request header handed to the dispatch layer by the serving substrate.
//!
//! The socket layer parses the request and buffers its body; the dispatch layer only
//! needs read access to the head, plus the ability to re-issue it with a different path
//! (see [`TrailingSlash`](crate::pipeline::TrailingSlash)).

use http::request::Parts;
use http::uri::PathAndQuery;
use http::{HeaderMap, Method, Request, Uri, Version};

#[derive(Debug)]
pub struct RequestHeader {
    inner: Request<()>,
}

impl AsRef<Request<()>> for RequestHeader {
    fn as_ref(&self) -> &Request<()> {
        &self.inner
    }
}

impl RequestHeader {
    pub fn into_inner(self) -> Request<()> {
        self.inner
    }

    pub fn method(&self) -> &Method {
        self.inner.method()
    }

    pub fn uri(&self) -> &Uri {
        self.inner.uri()
    }

    pub fn version(&self) -> Version {
        self.inner.version()
    }

    pub fn headers(&self) -> &HeaderMap {
        self.inner.headers()
    }

    pub fn path(&self) -> &str {
        self.inner.uri().path()
    }

    pub fn query(&self) -> Option<&str> {
        self.inner.uri().query()
    }

    /// Scheme of the request: the absolute-form uri scheme, then `X-Forwarded-Proto`, then `http`.
    pub fn scheme(&self) -> &str {
        if let Some(scheme) = self.uri().scheme_str() {
            return scheme;
        }

        self.headers()
            .get("x-forwarded-proto")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(',').next())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .unwrap_or("http")
    }

    /// Host of the request: the `Host` header, then the uri authority, then `localhost`.
    pub fn host(&self) -> &str {
        self.headers()
            .get(http::header::HOST)
            .and_then(|value| value.to_str().ok())
            .or_else(|| self.uri().authority().map(|authority| authority.as_str()))
            .unwrap_or("localhost")
    }

    /// Absolute form of a redirect `location`.
    ///
    /// A location that already starts with a scheme (`https:`, `mailto:`) is returned as is;
    /// anything else is joined to this request's scheme and host.
    pub fn absolute_location(&self, location: &str) -> String {
        if has_scheme(location) {
            return location.to_string();
        }
        let separator = if location.starts_with('/') { "" } else { "/" };
        format!("{}://{}{separator}{location}", self.scheme(), self.host())
    }

    /// Copies method, version and headers into a new header whose uri path is `path`.
    ///
    /// The query string and any absolute-form scheme/authority are kept. Extensions are not copied.
    pub fn with_path(&self, path: &str) -> Result<Self, http::Error> {
        let path_and_query = match self.query() {
            Some(query) => format!("{path}?{query}"),
            None => path.to_string(),
        };

        let mut uri_parts = self.uri().clone().into_parts();
        uri_parts.path_and_query = Some(PathAndQuery::try_from(path_and_query)?);
        let uri = Uri::from_parts(uri_parts)?;

        let mut builder = Request::builder().method(self.method().clone()).uri(uri).version(self.version());
        if let Some(headers) = builder.headers_mut() {
            headers.clone_from(self.headers());
        }

        Ok(Self { inner: builder.body(())? })
    }
}

fn has_scheme(location: &str) -> bool {
    location.split_once(':').is_some_and(|(scheme, _)| {
        scheme.starts_with(|ch: char| ch.is_ascii_alphabetic())
            && scheme.chars().all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '+' | '-' | '.'))
    })
}

impl From<Parts> for RequestHeader {
    #[inline]
    fn from(parts: Parts) -> Self {
        Self { inner: Request::from_parts(parts, ()) }
    }
}

impl From<Request<()>> for RequestHeader {
    #[inline]
    fn from(inner: Request<()>) -> Self {
        Self { inner }
    }
}
