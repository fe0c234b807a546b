use crate::body::ResponseBody;
use bytes::Bytes;
use http::{HeaderMap, HeaderValue, Method, Response, StatusCode};

/// The response under construction. Mutated freely while the request runs and turned into an
/// `http::Response` exactly once, by [`ResponseState::finish`].
#[derive(Debug, Default)]
pub struct ResponseState {
    status: Option<StatusCode>,
    headers: HeaderMap,
    body: ResponseBody,
}

impl ResponseState {
    pub fn new() -> Self {
        Self::default()
    }

    /// The status set so far, `None` when it will default to 200.
    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    pub fn set_status(&mut self, status: StatusCode) -> StatusCode {
        self.status = Some(status);
        status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// Shallow merge: every name present in `headers` replaces all values of that name.
    pub fn merge_headers(&mut self, headers: HeaderMap) -> &HeaderMap {
        let mut current = None;
        for (name, value) in headers {
            match name {
                Some(name) => {
                    self.headers.insert(name.clone(), value);
                    current = Some(name);
                }
                None => {
                    if let Some(name) = &current {
                        self.headers.append(name.clone(), value);
                    }
                }
            }
        }
        &self.headers
    }

    pub fn body(&self) -> &ResponseBody {
        &self.body
    }

    pub fn set_body(&mut self, body: impl Into<ResponseBody>) -> &ResponseBody {
        self.body = body.into();
        &self.body
    }

    pub(crate) fn apply(&mut self, args: HaltArgs) {
        if let Some(status) = args.status {
            self.set_status(status);
        }
        if let Some(headers) = args.headers {
            self.merge_headers(headers);
        }
        if let Some(body) = args.body {
            self.body = body;
        }
    }

    /// Builds the final response for a request made with `method`.
    ///
    /// The status defaults to 200. `Content-Length` is filled from the body when it is known,
    /// except for statuses that never carry a body. A `HEAD` response keeps its headers and
    /// drops the body.
    pub fn finish(self, method: &Method) -> Response<ResponseBody> {
        let status = self.status.unwrap_or(StatusCode::OK);
        let mut headers = self.headers;

        let bodiless = status.is_informational() || status == StatusCode::NO_CONTENT || status == StatusCode::NOT_MODIFIED;
        if !bodiless
            && !headers.contains_key(http::header::CONTENT_LENGTH)
            && let Some(len) = self.body.len()
        {
            headers.insert(http::header::CONTENT_LENGTH, HeaderValue::from(len));
        }

        let body = if method == Method::HEAD { ResponseBody::empty() } else { self.body };

        let mut response = Response::new(body);
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        response
    }
}

/// Arguments of [`Runner::halt`](crate::Runner::halt), recognized by type.
///
/// A status is a `StatusCode` or a `u16`, headers are a `HeaderMap`, and anything convertible
/// into a [`ResponseBody`] is a body. They combine as `(status, body)`, `(status, headers)`,
/// `(headers, body)` and `(status, headers, body)`; `()` sets nothing.
#[derive(Debug, Default)]
pub struct HaltArgs {
    pub status: Option<StatusCode>,
    pub headers: Option<HeaderMap>,
    pub body: Option<ResponseBody>,
}

/// Converts the status forms accepted by [`HaltArgs`].
pub trait IntoStatus {
    fn into_status(self) -> Option<StatusCode>;
}

impl IntoStatus for StatusCode {
    fn into_status(self) -> Option<StatusCode> {
        Some(self)
    }
}

/// Codes outside `100..=999` are ignored.
impl IntoStatus for u16 {
    fn into_status(self) -> Option<StatusCode> {
        StatusCode::from_u16(self).ok()
    }
}

impl From<()> for HaltArgs {
    fn from((): ()) -> Self {
        HaltArgs::default()
    }
}

impl From<StatusCode> for HaltArgs {
    fn from(status: StatusCode) -> Self {
        HaltArgs { status: status.into_status(), ..HaltArgs::default() }
    }
}

impl From<u16> for HaltArgs {
    fn from(status: u16) -> Self {
        HaltArgs { status: status.into_status(), ..HaltArgs::default() }
    }
}

impl From<HeaderMap> for HaltArgs {
    fn from(headers: HeaderMap) -> Self {
        HaltArgs { headers: Some(headers), ..HaltArgs::default() }
    }
}

impl<S: IntoStatus> From<(S, HeaderMap)> for HaltArgs {
    fn from((status, headers): (S, HeaderMap)) -> Self {
        HaltArgs { status: status.into_status(), headers: Some(headers), body: None }
    }
}

macro_rules! impl_halt_body {
    ($($body:ty),+ $(,)?) => {
        $(
            impl From<$body> for HaltArgs {
                fn from(body: $body) -> Self {
                    HaltArgs { body: Some(body.into()), ..HaltArgs::default() }
                }
            }

            impl<S: IntoStatus> From<(S, $body)> for HaltArgs {
                fn from((status, body): (S, $body)) -> Self {
                    HaltArgs { status: status.into_status(), headers: None, body: Some(body.into()) }
                }
            }

            impl From<(HeaderMap, $body)> for HaltArgs {
                fn from((headers, body): (HeaderMap, $body)) -> Self {
                    HaltArgs { status: None, headers: Some(headers), body: Some(body.into()) }
                }
            }

            impl<S: IntoStatus> From<(S, HeaderMap, $body)> for HaltArgs {
                fn from((status, headers, body): (S, HeaderMap, $body)) -> Self {
                    HaltArgs { status: status.into_status(), headers: Some(headers), body: Some(body.into()) }
                }
            }
        )+
    };
}

impl_halt_body!(ResponseBody, &'static str, String, Bytes, Vec<u8>, Vec<String>, Vec<&'static str>, Vec<Bytes>);

#[cfg(test)]
mod tests {
    use super::{HaltArgs, ResponseState};
    use crate::body::ResponseBody;
    use http::{HeaderMap, HeaderValue, Method, StatusCode};
    use http_body_util::BodyExt;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.append(*name, HeaderValue::from_static(value));
        }
        map
    }

    #[test]
    fn test_merge_headers_replaces_per_name() {
        let mut state = ResponseState::new();
        state.merge_headers(headers(&[("x-a", "1"), ("x-a", "2"), ("x-b", "keep")]));
        state.merge_headers(headers(&[("X-A", "3"), ("x-c", "4"), ("x-c", "5")]));

        let values = |name: &str| state.headers().get_all(name).iter().map(|v| v.to_str().unwrap()).collect::<Vec<_>>();
        assert_eq!(values("x-a"), ["3"]);
        assert_eq!(values("x-b"), ["keep"]);
        assert_eq!(values("x-c"), ["4", "5"]);
    }

    #[test]
    fn test_halt_args_by_type() {
        let args = HaltArgs::from(404);
        assert_eq!(args.status, Some(StatusCode::NOT_FOUND));
        assert!(args.body.is_none());

        let args = HaltArgs::from((StatusCode::CREATED, "made"));
        assert_eq!(args.status, Some(StatusCode::CREATED));
        assert_eq!(args.body.unwrap().len(), Some(4));

        let args = HaltArgs::from((headers(&[("x-a", "1")]), vec!["a", "b"]));
        assert!(args.status.is_none());
        assert_eq!(args.headers.unwrap().len(), 1);
        assert_eq!(args.body.unwrap().as_chunks().unwrap().count(), 2);

        let args = HaltArgs::from((503_u16, headers(&[("retry-after", "5")]), String::from("busy")));
        assert_eq!(args.status, Some(StatusCode::SERVICE_UNAVAILABLE));
        assert!(args.headers.is_some());
        assert!(args.body.is_some());

        let args = HaltArgs::from(());
        assert!(args.status.is_none() && args.headers.is_none() && args.body.is_none());
    }

    #[tokio::test]
    async fn test_finish_defaults() {
        let mut state = ResponseState::new();
        state.set_body(vec!["hello ", "world"]);

        let response = state.finish(&Method::GET);
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers().get(http::header::CONTENT_LENGTH).unwrap(), "11");
        assert_eq!(response.into_body().collect().await.unwrap().to_bytes(), "hello world");
    }

    #[tokio::test]
    async fn test_finish_head_and_bodiless_statuses() {
        let mut state = ResponseState::new();
        state.set_body("hello");
        let response = state.finish(&Method::HEAD);
        assert_eq!(response.headers().get(http::header::CONTENT_LENGTH).unwrap(), "5");
        assert!(response.into_body().collect().await.unwrap().to_bytes().is_empty());

        let mut state = ResponseState::new();
        state.set_status(StatusCode::NOT_MODIFIED);
        let response = state.finish(&Method::GET);
        assert!(response.headers().get(http::header::CONTENT_LENGTH).is_none());

        let mut state = ResponseState::new();
        state.headers_mut().insert(http::header::CONTENT_LENGTH, HeaderValue::from_static("99"));
        state.set_body(ResponseBody::empty());
        let response = state.finish(&Method::GET);
        assert_eq!(response.headers().get(http::header::CONTENT_LENGTH).unwrap(), "99");
    }
}
