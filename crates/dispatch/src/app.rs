//! The assembled application and its builder.
//!
//! ```
//! use micro_dispatch::{App, HandlerType, Router};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut router = Router::builder();
//! router.get("/hello/:name", "hello")?;
//!
//! let app = App::builder()
//!     .router(router.build()?)
//!     .handler(HandlerType::from_fn("hello", |runner| runner.halt("hi")).build())
//!     .build()?;
//! # let _ = app;
//! # Ok(())
//! # }
//! ```

use crate::body::ResponseBody;
use crate::decorator::{Decorator, DecoratorComposer, IdentityDecorator};
use crate::error::{BuildError, ConfigurationError, RouteNotFound};
use crate::escalator::{ErrorContext, ErrorEscalator, Failure, RecoveryResult};
use crate::handler::{HandlerRegistry, HandlerType};
use crate::pipeline::{fallback, Dispatcher, Pipeline, TrailingSlashDecorator};
use crate::router::Router;
use crate::runner::ResponseState;
use crate::settings::Settings;
use crate::template::TemplateSource;
use crate::RequestHeader;
use bytes::Bytes;
use http::{Request, Response, StatusCode};
use std::error::Error;
use std::fmt;
use std::sync::Arc;
use tracing::warn;

/// Everything a request can read from the application, shared by every request.
#[derive(Debug)]
pub struct AppState {
    router: Router,
    registry: HandlerRegistry,
    templates: Option<TemplateSource>,
    settings: Settings,
    escalator: ErrorEscalator,
}

impl AppState {
    pub(crate) fn new(router: Router) -> Self {
        Self {
            router,
            registry: HandlerRegistry::new(),
            templates: None,
            settings: Settings::default(),
            escalator: ErrorEscalator::new(),
        }
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    #[cfg(test)]
    pub(crate) fn registry_mut(&mut self) -> &mut HandlerRegistry {
        &mut self.registry
    }

    pub fn templates(&self) -> Option<&TemplateSource> {
        self.templates.as_ref()
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn escalator(&self) -> &ErrorEscalator {
        &self.escalator
    }
}

/// A frozen application. [`App::call`] is the entry point of the serving substrate.
pub struct App {
    state: Arc<AppState>,
    pipeline: Box<dyn Pipeline>,
}

impl App {
    pub fn builder() -> AppBuilder<IdentityDecorator> {
        AppBuilder::new()
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Dispatches one request with a fully buffered body.
    ///
    /// Never fails: route misses and application errors become responses, through the
    /// recovery procs or the plain 404 and 500 fallbacks.
    pub async fn call(&self, req: Request<Bytes>) -> Response<ResponseBody> {
        let (parts, body) = req.into_parts();
        let header = RequestHeader::from(parts);

        match self.pipeline.call(&header, &body).await {
            Ok(response) => response,
            Err(not_found) => self.escalate_not_found(&header, not_found),
        }
    }

    fn escalate_not_found(&self, header: &RequestHeader, not_found: RouteNotFound) -> Response<ResponseBody> {
        let response = ResponseState::new();
        let context = ErrorContext::for_request(header, &response);

        let message = not_found.to_string();
        self.state.escalator().run(Failure::NotFound(not_found), &context).unwrap_or_else(|| {
            warn!(method = %header.method(), path = header.path(), error = %message, "route not found");
            fallback(header, StatusCode::NOT_FOUND)
        })
    }
}

impl fmt::Debug for App {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("App").field("state", &self.state).finish_non_exhaustive()
    }
}

pub struct AppBuilder<D> {
    router: Option<Router>,
    registry: HandlerRegistry,
    templates: Option<TemplateSource>,
    settings: Settings,
    escalator: ErrorEscalator,
    decorator: D,
}

impl AppBuilder<IdentityDecorator> {
    fn new() -> Self {
        Self {
            router: None,
            registry: HandlerRegistry::new(),
            templates: None,
            settings: Settings::default(),
            escalator: ErrorEscalator::new(),
            decorator: IdentityDecorator,
        }
    }
}

impl<D> AppBuilder<D> {
    #[must_use]
    pub fn router(mut self, router: Router) -> Self {
        self.router = Some(router);
        self
    }

    #[must_use]
    pub fn handler(mut self, handler_type: HandlerType) -> Self {
        self.registry.register(handler_type);
        self
    }

    #[must_use]
    pub fn handlers<I: IntoIterator<Item = HandlerType>>(mut self, handler_types: I) -> Self {
        for handler_type in handler_types {
            self.registry.register(handler_type);
        }
        self
    }

    #[must_use]
    pub fn templates(mut self, templates: TemplateSource) -> Self {
        self.templates = Some(templates);
        self
    }

    #[must_use]
    pub fn settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    /// See [`ErrorEscalator::recover`]. Procs registered later run first.
    #[must_use]
    pub fn recover<F>(mut self, proc: F) -> Self
    where
        F: Fn(&Failure, &ErrorContext<'_>) -> RecoveryResult + Send + Sync + 'static,
    {
        self.escalator.recover(proc);
        self
    }

    #[must_use]
    pub fn not_found<F>(mut self, proc: F) -> Self
    where
        F: Fn(&RouteNotFound, &ErrorContext<'_>) -> RecoveryResult + Send + Sync + 'static,
    {
        self.escalator.not_found(proc);
        self
    }

    #[must_use]
    pub fn on_error<E, F>(mut self, proc: F) -> Self
    where
        E: Error + 'static,
        F: Fn(&E, &ErrorContext<'_>) -> RecoveryResult + Send + Sync + 'static,
    {
        self.escalator.on_error(proc);
        self
    }

    /// Adds a pipeline decorator. Decorators added later wrap the earlier ones.
    pub fn with_decorator<D2>(self, decorator: D2) -> AppBuilder<DecoratorComposer<D, D2>>
    where
        D: Decorator<Box<dyn Pipeline>>,
        D2: Decorator<D::Out>,
    {
        AppBuilder {
            router: self.router,
            registry: self.registry,
            templates: self.templates,
            settings: self.settings,
            escalator: self.escalator,
            decorator: DecoratorComposer::new(self.decorator, decorator),
        }
    }

    /// Validates every handler reference and freezes the application.
    ///
    /// # Errors
    ///
    /// Fails without a router, or when a route names a handler that is not registered.
    pub fn build(self) -> Result<App, BuildError>
    where
        D: Decorator<Box<dyn Pipeline>>,
        D::Out: Pipeline + 'static,
    {
        let router = self.router.ok_or(ConfigurationError::MissingSetting("router"))?;
        router.validate(&self.registry)?;

        let trailing_slash = TrailingSlashDecorator::new(self.settings.trailing_slash);
        let state = Arc::new(AppState {
            router,
            registry: self.registry,
            templates: self.templates,
            settings: self.settings,
            escalator: self.escalator,
        });

        let dispatcher: Box<dyn Pipeline> = Box::new(Dispatcher::new(Arc::clone(&state)));
        let decorated: Box<dyn Pipeline> = Box::new(self.decorator.decorate(dispatcher));
        let pipeline = Box::new(trailing_slash.decorate(decorated));

        Ok(App { state, pipeline })
    }
}

impl<D> fmt::Debug for AppBuilder<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppBuilder")
            .field("router", &self.router)
            .field("registry", &self.registry)
            .field("templates", &self.templates)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::App;
    use crate::error::{BuildError, ConfigurationError};
    use crate::handler::HandlerType;
    use crate::Router;
    use bytes::Bytes;
    use http::{Request, StatusCode};
    use http_body_util::BodyExt;

    fn router() -> Router {
        let mut builder = Router::builder();
        builder.get("/", "home").unwrap();
        builder.build().unwrap()
    }

    #[test]
    fn test_build_requires_router() {
        let err = App::builder().build().unwrap_err();

        assert!(matches!(err, BuildError::Configuration(ConfigurationError::MissingSetting("router"))));
        assert_eq!(err.to_string(), "missing required setting: router");
    }

    #[test]
    fn test_build_validates_handlers() {
        let err = App::builder().router(router()).build().unwrap_err();

        match err {
            BuildError::HandlerResolution(err) => assert_eq!(err.name, "home"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_call_and_not_found_fallback() {
        let app = App::builder()
            .router(router())
            .handler(HandlerType::from_fn("home", |runner| runner.halt("home")).build())
            .build()
            .unwrap();

        let response = app.call(Request::get("/").body(Bytes::new()).unwrap()).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.into_body().collect().await.unwrap().to_bytes(), "home");

        let response = app.call(Request::get("/nowhere").body(Bytes::new()).unwrap()).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(response.into_body().collect().await.unwrap().to_bytes(), "Not Found");
    }
}
