//! The dispatch pipeline: route lookup, handler resolution and execution.
//!
//! [`App::call`](crate::App::call) drives a `Box<dyn Pipeline>`. The innermost pipeline is the
//! [`Dispatcher`]; user decorators and [`TrailingSlash`] wrap it.

mod trailing_slash;

pub use trailing_slash::{TrailingSlash, TrailingSlashDecorator, TrailingSlashPolicy};

use crate::app::AppState;
use crate::body::ResponseBody;
use crate::error::{BoxError, RouteNotFound};
use crate::escalator::Failure;
use crate::router::{Route, RouteMatch};
use crate::runner::{params, ResponseState, Runner};
use crate::RequestHeader;
use async_trait::async_trait;
use bytes::Bytes;
use http::{header, HeaderValue, Response, StatusCode};
use std::sync::Arc;
use tracing::{debug, error};

/// A request-to-response function, fallible only with a route miss.
///
/// Any other failure is turned into a response before it leaves the pipeline.
#[async_trait]
pub trait Pipeline: Send + Sync {
    async fn call(&self, req: &RequestHeader, body: &Bytes) -> Result<Response<ResponseBody>, RouteNotFound>;
}

#[async_trait]
impl<P: Pipeline + ?Sized> Pipeline for Box<P> {
    async fn call(&self, req: &RequestHeader, body: &Bytes) -> Result<Response<ResponseBody>, RouteNotFound> {
        (**self).call(req, body).await
    }
}

#[async_trait]
impl<P: Pipeline + ?Sized> Pipeline for Arc<P> {
    async fn call(&self, req: &RequestHeader, body: &Bytes) -> Result<Response<ResponseBody>, RouteNotFound> {
        (**self).call(req, body).await
    }
}

/// Resolves the route and request type, then runs the handler in a fresh [`Runner`].
///
/// Application errors are escalated here, while the runner state is still available to
/// the recovery procs.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    state: Arc<AppState>,
}

impl Dispatcher {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }

    async fn dispatch(
        &self,
        runner: &mut Runner<'_>,
        matched: &RouteMatch<'_>,
        request_type: &str,
        body: &Bytes,
    ) -> Result<(), BoxError> {
        let state = &*self.state;
        let route: &Route = matched.route();

        let params = params::collect(
            runner.request(),
            body,
            matched.params(),
            matched.wildcards(),
            &state.settings().upload_detector,
        )?;
        runner.set_params(params);

        let proxy = state.router().proxy_for(route, request_type)?;
        let handler_type = proxy.resolve(state.registry())?;

        runner.execute(handler_type).await
    }
}

#[async_trait]
impl Pipeline for Dispatcher {
    async fn call(&self, req: &RequestHeader, body: &Bytes) -> Result<Response<ResponseBody>, RouteNotFound> {
        let state = &*self.state;
        let router = state.router();

        let matched = router.at(req.method(), req.path())?;
        let request_type = router.classify(req);
        debug!(route = matched.route().path(), request_type, "request classified");

        let mut runner = Runner::new(req, state);
        runner.bind_route(matched.route().path(), request_type, matched.wildcards().to_vec());

        match self.dispatch(&mut runner, &matched, request_type, body).await {
            Ok(()) => Ok(runner.finish()),
            Err(e) => {
                let message = e.to_string();
                let recovered = state.escalator().run(Failure::Error(e), &runner.error_context());
                Ok(recovered.unwrap_or_else(|| {
                    error!(method = %req.method(), path = req.path(), error = %message, "unhandled error");
                    fallback(req, StatusCode::INTERNAL_SERVER_ERROR)
                }))
            }
        }
    }
}

/// The plain-text response used when no recovery proc produces one.
pub(crate) fn fallback(req: &RequestHeader, status: StatusCode) -> Response<ResponseBody> {
    let mut response = ResponseState::new();
    response.set_status(status);
    response.headers_mut().insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
    response.set_body(status.canonical_reason().unwrap_or_default());
    response.finish(req.method())
}

#[cfg(test)]
mod tests {
    use super::{fallback, Dispatcher, Pipeline};
    use crate::app::AppState;
    use crate::handler::HandlerType;
    use crate::RequestHeader;
    use crate::Router;
    use bytes::Bytes;
    use http::{Method, Request, StatusCode};
    use http_body_util::BodyExt;
    use std::sync::Arc;

    fn request(method: Method, uri: &str) -> RequestHeader {
        Request::builder().method(method).uri(uri).body(()).unwrap().into()
    }

    fn dispatcher() -> Dispatcher {
        let mut builder = Router::builder();
        builder.get("/items/:id", "show").unwrap().get("/broken", "missing").unwrap();

        let mut state = AppState::new(builder.build().unwrap());
        state.registry_mut().register(
            HandlerType::from_fn("show", |runner| {
                let id = runner.param("id").and_then(|id| id.as_str()).unwrap_or_default().to_string();
                runner.set_body(format!("item {id}"));
                Ok(())
            })
            .build(),
        );
        Dispatcher::new(Arc::new(state))
    }

    #[tokio::test]
    async fn test_dispatch_to_handler() {
        let dispatcher = dispatcher();

        let response = dispatcher.call(&request(Method::GET, "/items/42"), &Bytes::new()).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.into_body().collect().await.unwrap().to_bytes(), "item 42");
    }

    #[tokio::test]
    async fn test_route_miss_is_returned() {
        let dispatcher = dispatcher();

        let not_found = dispatcher.call(&request(Method::GET, "/nothing"), &Bytes::new()).await.unwrap_err();

        assert_eq!(not_found.method, Method::GET);
        assert_eq!(not_found.path, "/nothing");
        assert!(dispatcher.call(&request(Method::DELETE, "/items/1"), &Bytes::new()).await.is_err());
    }

    #[tokio::test]
    async fn test_unresolved_handler_falls_back_to_500() {
        let dispatcher = dispatcher();

        let response = dispatcher.call(&request(Method::GET, "/broken"), &Bytes::new()).await.unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.into_body().collect().await.unwrap().to_bytes(), "Internal Server Error");
    }

    #[tokio::test]
    async fn test_fallback_for_head_has_no_body() {
        let response = fallback(&request(Method::HEAD, "/"), StatusCode::NOT_FOUND);

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(response.headers().get(http::header::CONTENT_LENGTH).unwrap(), "9");
        assert!(response.into_body().collect().await.unwrap().to_bytes().is_empty());
    }
}
