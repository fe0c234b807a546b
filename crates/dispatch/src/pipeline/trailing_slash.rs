use super::{fallback, Pipeline};
use crate::body::ResponseBody;
use crate::decorator::Decorator;
use crate::error::RouteNotFound;
use crate::runner::ResponseState;
use crate::RequestHeader;
use async_trait::async_trait;
use bytes::Bytes;
use http::{header, HeaderValue, Response, StatusCode};
use serde::Deserialize;
use tracing::{debug, warn};

/// How a path that differs from a route only by a trailing `/` is treated.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrailingSlashPolicy {
    /// Redirect `/a/` to `/a` without dispatching.
    #[default]
    Strict,
    /// Dispatch as is, and once more with the slash toggled on a route miss.
    Permissive,
}

/// Wraps a [`Pipeline`] into a [`TrailingSlash`] with a fixed policy.
#[derive(Debug, Default, Clone, Copy)]
pub struct TrailingSlashDecorator {
    policy: TrailingSlashPolicy,
}

impl TrailingSlashDecorator {
    pub fn new(policy: TrailingSlashPolicy) -> Self {
        Self { policy }
    }
}

impl<P: Pipeline> Decorator<P> for TrailingSlashDecorator {
    type Out = TrailingSlash<P>;

    fn decorate(&self, raw: P) -> Self::Out {
        TrailingSlash { inner: raw, policy: self.policy }
    }
}

#[derive(Debug)]
pub struct TrailingSlash<P> {
    inner: P,
    policy: TrailingSlashPolicy,
}

impl<P> TrailingSlash<P> {
    pub fn policy(&self) -> TrailingSlashPolicy {
        self.policy
    }
}

#[async_trait]
impl<P: Pipeline> Pipeline for TrailingSlash<P> {
    async fn call(&self, req: &RequestHeader, body: &Bytes) -> Result<Response<ResponseBody>, RouteNotFound> {
        let path = req.path();
        if path == "/" {
            return self.inner.call(req, body).await;
        }

        match self.policy {
            TrailingSlashPolicy::Strict => match strict_redirect(req) {
                Some(response) => Ok(response),
                None => self.inner.call(req, body).await,
            },
            TrailingSlashPolicy::Permissive => {
                let not_found = match self.inner.call(req, body).await {
                    Err(not_found) => not_found,
                    found => return found,
                };

                let toggled = match path.strip_suffix('/') {
                    Some(stripped) => stripped.to_string(),
                    None => format!("{path}/"),
                };
                let Ok(retry) = req.with_path(&toggled) else {
                    return Err(not_found);
                };

                debug!(path, retry = retry.path(), "route missed, retrying with toggled trailing slash");
                self.inner.call(&retry, body).await
            }
        }
    }
}

/// The 302 to the slash-stripped path, or `None` when the path has no trailing slash.
fn strict_redirect(req: &RequestHeader) -> Option<Response<ResponseBody>> {
    let stripped = req.path().trim_end_matches('/');
    if stripped.len() == req.path().len() {
        return None;
    }

    let stripped = if stripped.is_empty() { "/" } else { stripped };
    let target = match req.query() {
        Some(query) => format!("{stripped}?{query}"),
        None => stripped.to_string(),
    };

    let Some(location) = location_value(req.absolute_location(&target), &target) else {
        warn!(path = req.path(), location = %target, "trailing slash redirect has no valid location");
        return Some(fallback(req, StatusCode::BAD_REQUEST));
    };

    debug!(path = req.path(), location = ?location, "redirecting to path without trailing slash");
    let mut response = ResponseState::new();
    response.set_status(StatusCode::FOUND);
    response.headers_mut().insert(header::LOCATION, location);
    Some(response.finish(req.method()))
}

/// `absolute` as a header value, else the relative `target`.
fn location_value(absolute: String, target: &str) -> Option<HeaderValue> {
    HeaderValue::try_from(absolute)
        .inspect_err(|e| warn!(location = target, error = %e, "absolute location is not a valid header, using the relative one"))
        .or_else(|_| HeaderValue::try_from(target))
        .ok()
}
