//! Error types shared across the dispatch layer.
//!
//! Registration problems surface as [`ConfigurationError`] or [`HandlerResolutionError`]
//! and are fatal before serving starts. Everything that goes wrong while a request is
//! in flight is either a [`RouteNotFound`] or an application error carried as a
//! [`BoxError`]; both are routed through the [`ErrorEscalator`](crate::escalator::ErrorEscalator).

use http::Method;
use std::error::Error;
use std::io;
use thiserror::Error;

/// Boxed application error raised from handler code.
pub type BoxError = Box<dyn Error + Send + Sync>;

#[derive(Error, Debug)]
pub enum ConfigurationError {
    #[error("missing required setting: {0}")]
    MissingSetting(&'static str),

    #[error("url '{0}' is not declared")]
    UndeclaredUrl(String),

    #[error("url '{0}' is already declared")]
    DuplicateUrl(String),

    #[error("url '{name}' must be declared with a literal path, got a reference to url '{target}'")]
    NonLiteralPattern { name: String, target: String },

    #[error("route pattern '{pattern}' can not be matched: {reason}")]
    UnsupportedPattern { pattern: String, reason: &'static str },

    #[error("route '{path}' conflicts with an existing route: {reason}")]
    RouteConflict { path: String, reason: String },
}

impl ConfigurationError {
    pub fn unsupported_pattern<S: ToString>(pattern: S, reason: &'static str) -> Self {
        Self::UnsupportedPattern { pattern: pattern.to_string(), reason }
    }

    pub fn route_conflict<S: ToString, R: ToString>(path: S, reason: R) -> Self {
        Self::RouteConflict { path: path.to_string(), reason: reason.to_string() }
    }
}

/// A handler identifier that is not present in the [`HandlerRegistry`](crate::HandlerRegistry).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("handler '{name}' can not be resolved")]
pub struct HandlerResolutionError {
    pub name: String,
}

/// Errors returned by [`AppBuilder::build`](crate::AppBuilder::build).
#[derive(Error, Debug)]
pub enum BuildError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    HandlerResolution(#[from] HandlerResolutionError),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("no route matches {method} {path}")]
pub struct RouteNotFound {
    pub method: Method,
    pub path: String,
}

impl RouteNotFound {
    pub fn new<S: ToString>(method: Method, path: S) -> Self {
        Self { method, path: path.to_string() }
    }
}

/// A route matched, but it declares neither the classified request type nor the default one.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("no handler proxy for request type '{request_type}' on route '{path}'")]
pub struct ProxyNotFound {
    pub request_type: String,
    pub path: String,
}

#[derive(Error, Debug)]
pub enum ParamsError {
    #[error("invalid query string: {reason}")]
    InvalidQuery { reason: String },

    #[error("invalid form body: {reason}")]
    InvalidForm { reason: String },

    #[error("invalid json body: {source}")]
    InvalidJson {
        #[from]
        source: serde_json::Error,
    },
}

impl ParamsError {
    pub fn invalid_query<S: ToString>(str: S) -> Self {
        Self::InvalidQuery { reason: str.to_string() }
    }

    pub fn invalid_form<S: ToString>(str: S) -> Self {
        Self::InvalidForm { reason: str.to_string() }
    }
}

#[derive(Error, Debug)]
pub enum TemplateError {
    #[error("template '{0}' not found")]
    NotFound(String),

    #[error("template name '{0}' leaves the template root")]
    InvalidName(String),

    #[error("layout '{0}' nests itself")]
    LayoutCycle(String),

    #[error("template engine failed on '{template}': {source}")]
    Engine { template: String, source: BoxError },

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}
