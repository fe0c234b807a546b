use super::proxy::HandlerProxy;
use crate::handler::{Handler, Outcome};
use crate::runner::Runner;
use crate::url::UrlTemplate;
use async_trait::async_trait;
use http::Method;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

/// A declared (method, path) binding and its handler proxies keyed by request type.
pub struct Route {
    method: Method,
    path: String,
    matcher: RouteMatcher,
    proxies: HashMap<String, HandlerProxy>,
    default_type: String,
}

impl Route {
    pub(crate) fn new(
        method: Method,
        path: String,
        matcher: RouteMatcher,
        proxies: HashMap<String, HandlerProxy>,
        default_type: String,
    ) -> Self {
        Self { method, path, matcher, proxies, default_type }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// The path pattern, prefix included.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub(crate) fn matcher(&self) -> &RouteMatcher {
        &self.matcher
    }

    pub fn proxy(&self, request_type: &str) -> Option<&HandlerProxy> {
        self.proxies.get(request_type)
    }

    pub fn proxies(&self) -> impl Iterator<Item = (&str, &HandlerProxy)> {
        self.proxies.iter().map(|(request_type, proxy)| (request_type.as_str(), proxy))
    }

    /// The default request type in force when the route was registered.
    pub fn default_type(&self) -> &str {
        &self.default_type
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("proxies", &self.proxies)
            .finish_non_exhaustive()
    }
}

/// How a route is found: through the matchit tree, or by walking its pattern tokens when
/// the tree syntax can not express it.
#[derive(Debug)]
pub(crate) enum RouteMatcher {
    Tree(String),
    Pattern(UrlTemplate),
}

impl RouteMatcher {
    pub(crate) fn compile(path: &str) -> Self {
        let template = UrlTemplate::new(path, path);
        match template.compile_matcher() {
            Ok(tree) => RouteMatcher::Tree(tree),
            Err(_) => RouteMatcher::Pattern(template),
        }
    }
}

/// Where a route or url pattern comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathRef {
    /// A literal path pattern.
    Path(String),
    /// The pattern of a declared url, by name.
    Url(String),
}

impl PathRef {
    pub fn url(name: impl Into<String>) -> Self {
        PathRef::Url(name.into())
    }
}

impl From<&str> for PathRef {
    fn from(path: &str) -> Self {
        PathRef::Path(path.to_string())
    }
}

impl From<String> for PathRef {
    fn from(path: String) -> Self {
        PathRef::Path(path)
    }
}

/// The handlers of a route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlerSpec {
    /// One handler, bound to the router's default request type.
    Single(String),
    /// Handlers by request type name.
    ByType(BTreeMap<String, String>),
}

impl From<&str> for HandlerSpec {
    fn from(name: &str) -> Self {
        HandlerSpec::Single(name.to_string())
    }
}

impl From<String> for HandlerSpec {
    fn from(name: String) -> Self {
        HandlerSpec::Single(name)
    }
}

impl<K: Into<String>, V: Into<String>, const N: usize> From<[(K, V); N]> for HandlerSpec {
    fn from(pairs: [(K, V); N]) -> Self {
        HandlerSpec::ByType(pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl From<BTreeMap<String, String>> for HandlerSpec {
    fn from(by_type: BTreeMap<String, String>) -> Self {
        HandlerSpec::ByType(by_type)
    }
}

/// Computes a redirect location for the current request.
pub type DynamicTarget = Arc<dyn Fn(&Runner<'_>) -> String + Send + Sync>;

#[derive(Clone)]
pub enum RedirectTarget {
    Path(String),
    /// A declared url, generated once at registration without arguments.
    Url(String),
    Dynamic(DynamicTarget),
}

impl RedirectTarget {
    pub fn path(path: impl Into<String>) -> Self {
        RedirectTarget::Path(path.into())
    }

    pub fn url(name: impl Into<String>) -> Self {
        RedirectTarget::Url(name.into())
    }

    pub fn dynamic<F>(f: F) -> Self
    where
        F: Fn(&Runner<'_>) -> String + Send + Sync + 'static,
    {
        RedirectTarget::Dynamic(Arc::new(f))
    }
}

impl fmt::Debug for RedirectTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RedirectTarget::Path(path) => f.debug_tuple("Path").field(path).finish(),
            RedirectTarget::Url(name) => f.debug_tuple("Url").field(name).finish(),
            RedirectTarget::Dynamic(_) => f.write_str("Dynamic"),
        }
    }
}

/// Handler installed by [`RouterBuilder::redirect`](super::RouterBuilder::redirect).
#[derive(Clone)]
pub(crate) enum RedirectHandler {
    Fixed(String),
    Dynamic(DynamicTarget),
}

#[async_trait]
impl Handler for RedirectHandler {
    async fn run(&mut self, runner: &mut Runner<'_>) -> Outcome {
        let location = match self {
            RedirectHandler::Fixed(location) => location.clone(),
            RedirectHandler::Dynamic(target) => target(runner),
        };
        runner.redirect(&location, ())
    }
}
