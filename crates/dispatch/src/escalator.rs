//! Ordered recovery from route misses and application errors.
//!
//! Recovery procs run most recent first. Each one may answer with a response, pass, or fail;
//! a failing proc does not stop the chain, its error becomes the failure the remaining procs
//! see and any response chosen so far is dropped.

use crate::body::ResponseBody;
use crate::error::{BoxError, RouteNotFound};
use crate::handler::Handler;
use crate::runner::{Params, ResponseState};
use crate::RequestHeader;
use http::Response;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt;
use std::ptr;
use std::sync::Arc;
use tracing::warn;

static NO_PARAMS: Params = BTreeMap::new();

/// What is being escalated.
#[derive(Debug)]
pub enum Failure {
    NotFound(RouteNotFound),
    Error(BoxError),
}

impl Failure {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Failure::NotFound(_))
    }

    pub fn as_error(&self) -> &(dyn Error + 'static) {
        match self {
            Failure::NotFound(not_found) => not_found,
            Failure::Error(error) => error.as_ref(),
        }
    }

    pub fn downcast_ref<E: Error + 'static>(&self) -> Option<&E> {
        self.as_error().downcast_ref::<E>()
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self.as_error(), f)
    }
}

/// Read-only view of the request being escalated, shared by every proc of one pass.
///
/// Equality compares the request, the response and the handler instance by identity and the
/// remaining fields by value.
#[derive(Clone, Copy)]
pub struct ErrorContext<'a> {
    pub request: &'a RequestHeader,
    pub response: &'a ResponseState,
    pub handler_name: Option<&'a str>,
    pub handler: Option<&'a dyn Handler>,
    pub params: &'a Params,
    pub wildcards: &'a [String],
    pub route_path: Option<&'a str>,
}

impl<'a> ErrorContext<'a> {
    /// A context for a request that never reached a handler.
    pub fn for_request(request: &'a RequestHeader, response: &'a ResponseState) -> Self {
        Self {
            request,
            response,
            handler_name: None,
            handler: None,
            params: &NO_PARAMS,
            wildcards: &[],
            route_path: None,
        }
    }
}

impl PartialEq for ErrorContext<'_> {
    fn eq(&self, other: &Self) -> bool {
        let same_handler = match (self.handler, other.handler) {
            (Some(a), Some(b)) => ptr::addr_eq(a, b),
            (None, None) => true,
            _ => false,
        };

        ptr::eq(self.request, other.request)
            && ptr::eq(self.response, other.response)
            && same_handler
            && self.handler_name == other.handler_name
            && self.params == other.params
            && self.wildcards == other.wildcards
            && self.route_path == other.route_path
    }
}

impl fmt::Debug for ErrorContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorContext")
            .field("method", self.request.method())
            .field("path", &self.request.path())
            .field("handler_name", &self.handler_name)
            .field("params", &self.params)
            .field("wildcards", &self.wildcards)
            .field("route_path", &self.route_path)
            .finish_non_exhaustive()
    }
}

pub type RecoveryResult = Result<Option<Response<ResponseBody>>, BoxError>;

pub type RecoveryProc = Arc<dyn Fn(&Failure, &ErrorContext<'_>) -> RecoveryResult + Send + Sync>;

#[derive(Default, Clone)]
pub struct ErrorEscalator {
    procs: Vec<RecoveryProc>,
}

impl ErrorEscalator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a proc that sees every failure.
    pub fn recover<F>(&mut self, proc: F) -> &mut Self
    where
        F: Fn(&Failure, &ErrorContext<'_>) -> RecoveryResult + Send + Sync + 'static,
    {
        self.procs.push(Arc::new(proc));
        self
    }

    /// Registers a proc that only sees route misses.
    pub fn not_found<F>(&mut self, proc: F) -> &mut Self
    where
        F: Fn(&RouteNotFound, &ErrorContext<'_>) -> RecoveryResult + Send + Sync + 'static,
    {
        self.recover(move |failure, context| match failure {
            Failure::NotFound(not_found) => proc(not_found, context),
            Failure::Error(_) => Ok(None),
        })
    }

    /// Registers a proc that only sees failures of type `E`.
    pub fn on_error<E, F>(&mut self, proc: F) -> &mut Self
    where
        E: Error + 'static,
        F: Fn(&E, &ErrorContext<'_>) -> RecoveryResult + Send + Sync + 'static,
    {
        self.recover(move |failure, context| match failure.downcast_ref::<E>() {
            Some(error) => proc(error, context),
            None => Ok(None),
        })
    }

    pub fn len(&self) -> usize {
        self.procs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.procs.is_empty()
    }

    /// Runs every proc, most recently registered first, and returns the surviving response.
    pub fn run(&self, failure: Failure, context: &ErrorContext<'_>) -> Option<Response<ResponseBody>> {
        let mut failure = failure;
        let mut candidate = None;

        for (index, proc) in self.procs.iter().enumerate().rev() {
            match proc(&failure, context) {
                Ok(Some(response)) => candidate = Some(response),
                Ok(None) => {}
                Err(e) => {
                    warn!(proc = index, failure = %failure, error = %e, "recovery proc failed");
                    candidate = None;
                    failure = Failure::Error(e);
                }
            }
        }

        candidate
    }
}

impl fmt::Debug for ErrorEscalator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorEscalator").field("procs", &self.procs.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::{ErrorContext, ErrorEscalator, Failure};
    use crate::body::ResponseBody;
    use crate::error::{BoxError, ParamsError, RouteNotFound};
    use crate::runner::ResponseState;
    use crate::RequestHeader;
    use http::{Method, Request, Response, StatusCode};
    use std::sync::{Arc, Mutex};

    fn respond(status: StatusCode) -> Option<Response<ResponseBody>> {
        let mut response = Response::new(ResponseBody::empty());
        *response.status_mut() = status;
        Some(response)
    }

    fn request() -> RequestHeader {
        Request::builder().uri("/boom").body(()).unwrap().into()
    }

    fn app_error(message: &str) -> Failure {
        Failure::Error(BoxError::from(message))
    }

    #[test]
    fn test_middle_proc_failure_propagates() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut escalator = ErrorEscalator::new();

        let first_seen = Arc::clone(&seen);
        escalator.recover(move |failure, _| {
            first_seen.lock().unwrap().push(failure.to_string());
            Ok(None)
        });
        escalator.recover(|_, _| Err(BoxError::from("second failed")));
        escalator.recover(|_, _| Ok(respond(StatusCode::IM_A_TEAPOT)));

        let (req, response) = (request(), ResponseState::new());
        let result = escalator.run(app_error("original"), &ErrorContext::for_request(&req, &response));

        assert!(result.is_none());
        assert_eq!(*seen.lock().unwrap(), ["second failed"]);
    }

    #[test]
    fn test_later_response_after_failure_wins() {
        let mut escalator = ErrorEscalator::new();
        escalator.recover(|failure, _| Ok(respond(if failure.to_string() == "third failed" {
            StatusCode::BAD_GATEWAY
        } else {
            StatusCode::OK
        })));
        escalator.recover(|_, _| Ok(None));
        escalator.recover(|_, _| Err(BoxError::from("third failed")));

        let (req, response) = (request(), ResponseState::new());
        let result = escalator.run(app_error("original"), &ErrorContext::for_request(&req, &response)).unwrap();

        assert_eq!(result.status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_most_recent_runs_first_and_earlier_response_overrides() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut escalator = ErrorEscalator::new();

        for (name, status) in [("a", StatusCode::CONFLICT), ("b", StatusCode::GONE)] {
            let order = Arc::clone(&order);
            escalator.recover(move |_, _| {
                order.lock().unwrap().push(name);
                Ok(respond(status))
            });
        }

        let (req, response) = (request(), ResponseState::new());
        let result = escalator.run(app_error("x"), &ErrorContext::for_request(&req, &response)).unwrap();

        assert_eq!(*order.lock().unwrap(), ["b", "a"]);
        assert_eq!(result.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn test_filtered_procs() {
        let mut escalator = ErrorEscalator::new();
        escalator
            .not_found(|not_found, _| {
                assert_eq!(not_found.path, "/boom");
                Ok(respond(StatusCode::NOT_FOUND))
            })
            .on_error::<ParamsError, _>(|_, _| Ok(respond(StatusCode::BAD_REQUEST)));
        assert_eq!(escalator.len(), 2);

        let (req, response) = (request(), ResponseState::new());
        let context = ErrorContext::for_request(&req, &response);

        let not_found = Failure::NotFound(RouteNotFound::new(Method::GET, "/boom"));
        assert!(not_found.is_not_found());
        assert_eq!(escalator.run(not_found, &context).unwrap().status(), StatusCode::NOT_FOUND);

        let params = Failure::Error(Box::new(ParamsError::invalid_query("bad")));
        assert_eq!(escalator.run(params, &context).unwrap().status(), StatusCode::BAD_REQUEST);

        assert!(escalator.run(app_error("other"), &context).is_none());
    }

    #[test]
    fn test_context_equality() {
        let (req, other_req) = (request(), request());
        let (response, other_response) = (ResponseState::new(), ResponseState::new());

        let context = ErrorContext::for_request(&req, &response);
        assert_eq!(context, ErrorContext::for_request(&req, &response));
        assert_ne!(context, ErrorContext::for_request(&other_req, &response));
        assert_ne!(context, ErrorContext::for_request(&req, &other_response));

        let wildcards = ["a".to_string()];
        let with_wildcards = ErrorContext { wildcards: &wildcards, ..context };
        assert_ne!(context, with_wildcards);
    }
}
