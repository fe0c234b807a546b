//! Route registry and request-type classification.
//!
//! Routes are declared on a [`RouterBuilder`] during startup and frozen by
//! [`RouterBuilder::build`] into an immutable [`Router`], shared by every request.
//!
//! ```
//! use micro_dispatch::router::{PathRef, RedirectTarget, UrlOptions};
//! use micro_dispatch::Router;
//!
//! # fn main() -> Result<(), micro_dispatch::error::ConfigurationError> {
//! let mut builder = Router::builder();
//! builder
//!     .url("post", "/posts/:id", UrlOptions::default())?
//!     .get(PathRef::url("post"), "show_post")?
//!     .post("/posts", "create_post")?
//!     .redirect("/latest", RedirectTarget::path("/posts/1"))?;
//!
//! let router = builder.build()?;
//! let matched = router.at(&http::Method::GET, "/posts/7").unwrap();
//! assert_eq!(matched.param("id"), Some("7"));
//! # Ok(())
//! # }
//! ```

mod proxy;
mod route;

pub use proxy::HandlerProxy;
pub use route::{DynamicTarget, HandlerSpec, PathRef, RedirectTarget, Route};

use crate::error::{ConfigurationError, HandlerResolutionError, ProxyNotFound, RouteNotFound};
use crate::filter::Filter;
use crate::handler::{HandlerRegistry, HandlerType};
use crate::url::{default_escape, EscapeFn, PathArgs, UrlTemplate};
use crate::RequestHeader;
use http::Method;
use route::{RedirectHandler, RouteMatcher};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

type InnerRouter<T> = matchit::Router<T>;

/// The request type used when no rule matches and none was configured.
pub const DEFAULT_REQUEST_TYPE: &str = "default";

struct RequestTypeRule {
    name: String,
    filter: Box<dyn Filter>,
}

/// Options of [`RouterBuilder::url`].
#[derive(Default, Clone)]
pub struct UrlOptions {
    escape: Option<EscapeFn>,
}

impl fmt::Debug for UrlOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UrlOptions").field("escape", &self.escape.is_some()).finish()
    }
}

impl UrlOptions {
    /// Overrides the router's escaping function for this url.
    #[must_use]
    pub fn escape(mut self, escape: EscapeFn) -> Self {
        self.escape = Some(escape);
        self
    }
}

/// A frozen route table.
pub struct Router {
    inner_router: InnerRouter<Vec<usize>>,
    patterns: Vec<(UrlTemplate, Vec<usize>)>,
    routes: Vec<Route>,
    urls: HashMap<String, UrlTemplate>,
    rules: Vec<RequestTypeRule>,
    default_type: String,
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router")
            .field("routes", &self.routes)
            .field("urls", &self.urls.values().collect::<Vec<_>>())
            .field("request_types", &self.rules.iter().map(|rule| rule.name.as_str()).collect::<Vec<_>>())
            .field("default_type", &self.default_type)
            .finish_non_exhaustive()
    }
}

/// The route selected for a request, with its path captures.
#[derive(Debug)]
pub struct RouteMatch<'router> {
    route: &'router Route,
    params: Vec<(String, String)>,
    wildcards: Vec<String>,
}

impl<'router> RouteMatch<'router> {
    pub fn route(&self) -> &'router Route {
        self.route
    }

    /// Named captures, in pattern order.
    pub fn params(&self) -> &[(String, String)] {
        &self.params
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.iter().find(|(key, _)| key == name).map(|(_, value)| value.as_str())
    }

    /// Wildcard captures.
    pub fn wildcards(&self) -> &[String] {
        &self.wildcards
    }
}

impl Router {
    pub fn builder() -> RouterBuilder {
        RouterBuilder::new()
    }

    /// Finds the route for `method` and `path`.
    ///
    /// Routes sharing a pattern are tried in registration order. A `HEAD` request falls back
    /// to the `GET` route of the same pattern. Routes the matchit tree can express are tried
    /// first; the others are then tried one pattern at a time, in registration order.
    pub fn at<'router>(&'router self, method: &Method, path: &str) -> Result<RouteMatch<'router>, RouteNotFound> {
        let matched = self.tree_match(method, path).or_else(|| self.pattern_match(method, path));

        match matched {
            Some(matched) => {
                debug!(method = %method, path, route = matched.route.path(), "route matched");
                Ok(matched)
            }
            None => Err(RouteNotFound::new(method.clone(), path)),
        }
    }

    fn tree_match<'router>(&'router self, method: &Method, path: &str) -> Option<RouteMatch<'router>> {
        let matched = self.inner_router.at(path).ok()?;
        let route = self.find_route(matched.value, method)?;

        let mut params = Vec::new();
        let mut wildcards = Vec::new();
        for (key, value) in matched.params.iter() {
            if key == "splat" {
                wildcards.push(value.to_string());
            } else {
                params.push((key.to_string(), value.to_string()));
            }
        }
        Some(RouteMatch { route, params, wildcards })
    }

    fn pattern_match<'router>(&'router self, method: &Method, path: &str) -> Option<RouteMatch<'router>> {
        self.patterns.iter().find_map(|(template, indexes)| {
            let route = self.find_route(indexes, method)?;
            let captures = template.captures(path)?;
            Some(RouteMatch { route, params: captures.params, wildcards: captures.wildcards })
        })
    }

    fn find_route(&self, indexes: &[usize], method: &Method) -> Option<&Route> {
        let find = |method: &Method| indexes.iter().map(|index| &self.routes[*index]).find(|route| route.method() == method);
        find(method).or_else(|| if *method == Method::HEAD { find(&Method::GET) } else { None })
    }

    /// Returns the name of the first request-type rule matching `req`, else the default type.
    pub fn classify(&self, req: &RequestHeader) -> &str {
        self.rules
            .iter()
            .find(|rule| rule.filter.matches(req))
            .map_or(self.default_type.as_str(), |rule| rule.name.as_str())
    }

    /// Picks the proxy of `route` for `request_type`, falling back to the default type.
    pub fn proxy_for<'router>(
        &'router self,
        route: &'router Route,
        request_type: &str,
    ) -> Result<&'router HandlerProxy, ProxyNotFound> {
        route
            .proxy(request_type)
            .or_else(|| route.proxy(&self.default_type))
            .or_else(|| route.proxy(route.default_type()))
            .ok_or_else(|| ProxyNotFound { request_type: request_type.to_string(), path: route.path().to_string() })
    }

    pub fn default_request_type(&self) -> &str {
        &self.default_type
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn url(&self, name: &str) -> Option<&UrlTemplate> {
        self.urls.get(name)
    }

    pub fn path_for(&self, name: &str, args: PathArgs) -> Result<String, ConfigurationError> {
        self.url(name)
            .map(|template| template.path_for(args))
            .ok_or_else(|| ConfigurationError::UndeclaredUrl(name.to_string()))
    }

    /// Resolves every handler proxy against `registry`, stopping at the first failure.
    pub fn validate(&self, registry: &HandlerRegistry) -> Result<(), HandlerResolutionError> {
        for route in &self.routes {
            for (_, proxy) in route.proxies() {
                proxy.resolve(registry)?;
            }
        }
        Ok(())
    }
}

/// Collects urls, routes and request-type rules.
///
/// The base prefix is applied when an entry is registered, so it only affects entries
/// registered after it is set.
pub struct RouterBuilder {
    routes: Vec<Route>,
    urls: HashMap<String, UrlTemplate>,
    rules: Vec<RequestTypeRule>,
    default_type: String,
    prefix: Option<String>,
    escape: EscapeFn,
}

macro_rules! method_route {
    ($($fn_name:ident => $method:expr),+ $(,)?) => {
        $(
            pub fn $fn_name(
                &mut self,
                path: impl Into<PathRef>,
                handlers: impl Into<HandlerSpec>,
            ) -> Result<&mut Self, ConfigurationError> {
                self.route($method, path, handlers)
            }
        )+
    };
}

impl RouterBuilder {
    fn new() -> Self {
        Self {
            routes: vec![],
            urls: HashMap::new(),
            rules: vec![],
            default_type: DEFAULT_REQUEST_TYPE.to_string(),
            prefix: None,
            escape: default_escape(),
        }
    }

    /// Declares a named url. Routes may then refer to it with [`PathRef::Url`].
    pub fn url(
        &mut self,
        name: impl Into<String>,
        pattern: impl Into<PathRef>,
        options: UrlOptions,
    ) -> Result<&mut Self, ConfigurationError> {
        let name = name.into();
        let pattern = match pattern.into() {
            PathRef::Path(pattern) => self.prefixed(&pattern),
            PathRef::Url(target) => return Err(ConfigurationError::NonLiteralPattern { name, target }),
        };
        if self.urls.contains_key(&name) {
            return Err(ConfigurationError::DuplicateUrl(name));
        }

        let escape = options.escape.unwrap_or_else(|| Arc::clone(&self.escape));
        let template = UrlTemplate::with_escape(name.clone(), pattern, escape);
        self.urls.insert(name, template);
        Ok(self)
    }

    pub fn route(
        &mut self,
        method: Method,
        path: impl Into<PathRef>,
        handlers: impl Into<HandlerSpec>,
    ) -> Result<&mut Self, ConfigurationError> {
        let path = self.resolve_path(path.into())?;
        let proxies = match handlers.into() {
            HandlerSpec::Single(name) => HashMap::from([(self.default_type.clone(), HandlerProxy::new(name))]),
            HandlerSpec::ByType(by_type) => {
                by_type.into_iter().map(|(request_type, name)| (request_type, HandlerProxy::new(name))).collect()
            }
        };
        self.push_route(method, path, proxies);
        Ok(self)
    }

    method_route! {
        get => Method::GET,
        post => Method::POST,
        put => Method::PUT,
        patch => Method::PATCH,
        delete => Method::DELETE,
    }

    /// Declares a `GET` route that always redirects to `target`.
    pub fn redirect(&mut self, from: impl Into<PathRef>, target: RedirectTarget) -> Result<&mut Self, ConfigurationError> {
        let path = self.resolve_path(from.into())?;
        let handler = match target {
            RedirectTarget::Path(location) => RedirectHandler::Fixed(location),
            RedirectTarget::Url(name) => {
                let template = self.urls.get(&name).ok_or(ConfigurationError::UndeclaredUrl(name))?;
                RedirectHandler::Fixed(template.path_for(PathArgs::new()))
            }
            RedirectTarget::Dynamic(target) => RedirectHandler::Dynamic(target),
        };

        let handler_type = HandlerType::builder(format!("redirect {path}"), move || handler.clone()).build();
        let proxies = HashMap::from([(self.default_type.clone(), HandlerProxy::resolved(Arc::new(handler_type)))]);
        self.push_route(Method::GET, path, proxies);
        Ok(self)
    }

    /// Appends a classification rule. Rules are evaluated in the order they were added.
    pub fn request_type<F: Filter + 'static>(&mut self, name: impl Into<String>, filter: F) -> &mut Self {
        self.rules.push(RequestTypeRule { name: name.into(), filter: Box::new(filter) });
        self
    }

    pub fn default_request_type(&mut self, name: impl Into<String>) -> &mut Self {
        self.default_type = name.into();
        self
    }

    pub fn prefix(&mut self, base: impl Into<String>) -> &mut Self {
        self.prefix = Some(base.into());
        self
    }

    pub fn no_prefix(&mut self) -> &mut Self {
        self.prefix = None;
        self
    }

    /// Sets the escaping function of urls declared afterwards without their own.
    pub fn escape(&mut self, escape: EscapeFn) -> &mut Self {
        self.escape = escape;
        self
    }

    pub fn build(self) -> Result<Router, ConfigurationError> {
        let mut groups: Vec<(&str, Vec<usize>)> = Vec::new();
        let mut patterns: Vec<(UrlTemplate, Vec<usize>)> = Vec::new();
        for (index, route) in self.routes.iter().enumerate() {
            match route.matcher() {
                RouteMatcher::Tree(tree) => match groups.iter_mut().find(|(matcher, _)| *matcher == tree.as_str()) {
                    Some((_, indexes)) => indexes.push(index),
                    None => groups.push((tree.as_str(), vec![index])),
                },
                RouteMatcher::Pattern(template) => {
                    match patterns.iter_mut().find(|(known, _)| known.pattern() == template.pattern()) {
                        Some((_, indexes)) => indexes.push(index),
                        None => patterns.push((template.clone(), vec![index])),
                    }
                }
            }
        }

        let mut inner_router = InnerRouter::new();
        for (matcher, indexes) in groups {
            inner_router.insert(matcher, indexes).map_err(|e| ConfigurationError::route_conflict(matcher, e))?;
        }

        Ok(Router {
            inner_router,
            patterns,
            routes: self.routes,
            urls: self.urls,
            rules: self.rules,
            default_type: self.default_type,
        })
    }

    fn resolve_path(&self, path: PathRef) -> Result<String, ConfigurationError> {
        match path {
            PathRef::Path(path) => Ok(self.prefixed(&path)),
            PathRef::Url(name) => self
                .urls
                .get(&name)
                .map(|template| template.pattern().to_string())
                .ok_or(ConfigurationError::UndeclaredUrl(name)),
        }
    }

    fn push_route(
        &mut self,
        method: Method,
        path: String,
        proxies: HashMap<String, HandlerProxy>,
    ) {
        let matcher = RouteMatcher::compile(&path);
        debug!(method = %method, path = %path, "route registered");
        self.routes.push(Route::new(method, path, matcher, proxies, self.default_type.clone()));
    }

    fn prefixed(&self, path: &str) -> String {
        match self.prefix.as_deref().map(|prefix| prefix.trim_end_matches('/')) {
            None | Some("") => path.to_string(),
            Some(prefix) if path == "/" || path.is_empty() => prefix.to_string(),
            Some(prefix) if path.starts_with('/') => format!("{prefix}{path}"),
            Some(prefix) => format!("{prefix}/{path}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{HandlerSpec, PathRef, RedirectTarget, Router, RouterBuilder, UrlOptions};
    use crate::error::{ConfigurationError, ProxyNotFound};
    use crate::filter::{fn_filter, header_contains};
    use crate::handler::{HandlerRegistry, HandlerType};
    use crate::url::PathArgs;
    use crate::RequestHeader;
    use http::{Method, Request};
    use std::sync::Arc;

    fn request(user_agent: &str) -> RequestHeader {
        Request::builder().uri("/").header(http::header::USER_AGENT, user_agent).body(()).unwrap().into()
    }

    fn router() -> Router {
        let mut builder = Router::builder();
        builder.request_type("mobile", header_contains(http::header::USER_AGENT, "iPhone"));
        builder
            .url("user", "/users/:id", UrlOptions::default())
            .unwrap()
            .get("/", [("default", "A"), ("mobile", "B")])
            .unwrap()
            .get(PathRef::url("user"), "show_user")
            .unwrap()
            .put(PathRef::url("user"), "update_user")
            .unwrap()
            .get("/files/*", "files")
            .unwrap()
            .get("/only-mobile", [("mobile", "M")])
            .unwrap();
        builder.build().unwrap()
    }

    fn proxy_name(router: &Router, path: &str, request_type: &str) -> Result<String, ProxyNotFound> {
        let matched = router.at(&Method::GET, path).unwrap();
        router.proxy_for(matched.route(), request_type).map(|proxy| proxy.name().to_string())
    }

    #[test]
    fn test_router_is_send_sync() {
        fn check<T: Send + Sync>() {}
        check::<Router>();
    }

    #[test]
    fn test_route_by_method() {
        let router = router();

        let matched = router.at(&Method::GET, "/users/42").unwrap();
        assert_eq!(matched.route().method(), Method::GET);
        assert_eq!(matched.param("id"), Some("42"));
        assert_eq!(matched.params(), [("id".to_string(), "42".to_string())]);

        let matched = router.at(&Method::PUT, "/users/42").unwrap();
        assert_eq!(matched.route().proxy("default").unwrap().name(), "update_user");

        let err = router.at(&Method::DELETE, "/users/42").unwrap_err();
        assert_eq!(err.method, Method::DELETE);
        assert!(router.at(&Method::GET, "/nowhere").is_err());
    }

    #[test]
    fn test_head_matches_get() {
        let router = router();

        let matched = router.at(&Method::HEAD, "/users/1").unwrap();
        assert_eq!(matched.route().method(), Method::GET);
    }

    #[test]
    fn test_wildcards() {
        let router = router();

        let matched = router.at(&Method::GET, "/files/a/b.txt").unwrap();
        assert_eq!(matched.wildcards(), ["a/b.txt".to_string()]);
        assert!(matched.params().is_empty());
    }

    #[test]
    fn test_classify_in_rule_order() {
        let mut builder = Router::builder();
        builder
            .request_type("first", fn_filter(|req| req.headers().contains_key("x-first")))
            .request_type("iphone", header_contains(http::header::USER_AGENT, "iPhone"))
            .request_type("mobile", header_contains(http::header::USER_AGENT, "Mobile"))
            .default_request_type("html");
        let router = builder.build().unwrap();

        assert_eq!(router.classify(&request("iPhone Mobile")), "iphone");
        assert_eq!(router.classify(&request("Android Mobile")), "mobile");
        assert_eq!(router.classify(&request("curl")), "html");
        assert_eq!(router.default_request_type(), "html");
    }

    #[test]
    fn test_proxy_for_falls_back_to_default() {
        let router = router();

        assert_eq!(proxy_name(&router, "/", "mobile").unwrap(), "B");
        assert_eq!(proxy_name(&router, "/", "default").unwrap(), "A");
        assert_eq!(proxy_name(&router, "/", "tablet").unwrap(), "A");

        let err = proxy_name(&router, "/only-mobile", "tablet").unwrap_err();
        assert_eq!(err.request_type, "tablet");
        assert_eq!(err.path, "/only-mobile");
    }

    #[test]
    fn test_url_errors() {
        let mut builder = Router::builder();
        builder.url("home", "/", UrlOptions::default()).unwrap();

        assert!(matches!(
            builder.url("home", "/home", UrlOptions::default()),
            Err(ConfigurationError::DuplicateUrl(name)) if name == "home"
        ));
        assert!(matches!(
            builder.url("alias", PathRef::url("home"), UrlOptions::default()),
            Err(ConfigurationError::NonLiteralPattern { .. })
        ));
        assert!(matches!(
            builder.get(PathRef::url("missing"), "x"),
            Err(ConfigurationError::UndeclaredUrl(name)) if name == "missing"
        ));
        assert!(matches!(
            builder.redirect("/old", RedirectTarget::url("missing")),
            Err(ConfigurationError::UndeclaredUrl(_))
        ));
    }

    #[test]
    fn test_multiple_and_mid_path_wildcards() {
        let mut builder = Router::builder();
        builder
            .get("/:a/:b/*/*", "deep")
            .unwrap()
            .get("/files/*/download", "download")
            .unwrap()
            .post("/files/*/download", "upload")
            .unwrap()
            .get("/files/*", "files")
            .unwrap();
        let router = builder.build().unwrap();

        let matched = router.at(&Method::GET, "/x/y/docs/guide/intro.md").unwrap();
        assert_eq!(matched.route().path(), "/:a/:b/*/*");
        assert_eq!(matched.params(), [("a".to_string(), "x".to_string()), ("b".to_string(), "y".to_string())]);
        assert_eq!(matched.wildcards(), ["docs".to_string(), "guide/intro.md".to_string()]);

        let matched = router.at(&Method::GET, "/files/a/b.txt/download").unwrap();
        assert_eq!(matched.route().proxy("default").unwrap().name(), "files");
        assert_eq!(matched.wildcards(), ["a/b.txt/download".to_string()]);

        let matched = router.at(&Method::POST, "/files/a/b.txt/download").unwrap();
        assert_eq!(matched.route().proxy("default").unwrap().name(), "upload");
        assert_eq!(matched.wildcards(), ["a/b.txt".to_string()]);

        let matched = router.at(&Method::HEAD, "/q/r/s/t").unwrap();
        assert_eq!(matched.route().method(), Method::GET);
        assert_eq!(matched.wildcards(), ["s".to_string(), "t".to_string()]);

        assert!(router.at(&Method::POST, "/files/a/b.txt").is_err());
        assert!(router.at(&Method::GET, "/x/y/z").is_err());
    }

    #[test]
    fn test_mid_path_wildcard_without_tree_overlap() {
        let mut builder = Router::builder();
        builder.get("/files/*/download", "download").unwrap().get("/posts/:id.json", "post_json").unwrap();
        let router = builder.build().unwrap();

        let matched = router.at(&Method::GET, "/files/reports/2024/download").unwrap();
        assert_eq!(matched.route().proxy("default").unwrap().name(), "download");
        assert_eq!(matched.wildcards(), ["reports/2024".to_string()]);

        let matched = router.at(&Method::GET, "/posts/7.json").unwrap();
        assert_eq!(matched.param("id"), Some("7"));
        assert!(matched.wildcards().is_empty());

        assert!(router.at(&Method::GET, "/files/reports/2024").is_err());
    }

    #[test]
    fn test_conflicting_routes() {
        let mut builder = Router::builder();
        builder.get("/users/:id", "a").unwrap().get("/users/:name", "b").unwrap();

        assert!(matches!(builder.build(), Err(ConfigurationError::RouteConflict { .. })));
    }

    #[test]
    fn test_prefix_applies_at_registration() {
        let mut builder: RouterBuilder = Router::builder();
        builder.get("/health", "health").unwrap();
        builder.prefix("/api/");
        builder.url("item", "/items/:id", UrlOptions::default()).unwrap().get("/", "index").unwrap();
        builder.prefix("/v2");
        builder.get(PathRef::url("item"), "item").unwrap();
        builder.no_prefix();
        builder.get("/about", "about").unwrap();
        let router = builder.build().unwrap();

        let paths = router.routes().iter().map(|route| route.path()).collect::<Vec<_>>();
        assert_eq!(paths, ["/health", "/api", "/api/items/:id", "/about"]);
        assert_eq!(router.path_for("item", PathArgs::new().arg(3)).unwrap(), "/api/items/3");
    }

    #[test]
    fn test_url_options_escape() {
        let mut builder = Router::builder();
        builder
            .url("search", "/search", UrlOptions::default().escape(Arc::new(|value: &str| value.replace(' ', "+"))))
            .unwrap()
            .url("find", "/find", UrlOptions::default())
            .unwrap();
        let router = builder.build().unwrap();

        assert_eq!(router.path_for("search", PathArgs::new().param("q", "a b")).unwrap(), "/search?q=a+b");
        assert_eq!(router.path_for("find", PathArgs::new().param("q", "a b")).unwrap(), "/find?q=a%20b");
        assert!(router.path_for("lost", PathArgs::new()).is_err());
    }

    #[test]
    fn test_validate() {
        let router = router();

        let mut registry = HandlerRegistry::new();
        for name in ["A", "B", "show_user", "update_user", "files"] {
            registry.register(HandlerType::from_fn(name, |runner| runner.halt(())).build());
        }
        assert_eq!(router.validate(&registry).unwrap_err().name, "M");

        registry.register(HandlerType::from_fn("M", |runner| runner.halt(())).build());
        let router = self::router();
        assert!(router.validate(&registry).is_ok());
        assert!(router.routes().iter().all(|route| route.proxies().all(|(_, proxy)| proxy.handler_type().is_ok())));
    }

    #[test]
    fn test_redirect_routes_are_pre_resolved() {
        let mut builder = Router::builder();
        builder
            .url("home", "/home", UrlOptions::default())
            .unwrap()
            .redirect("/", RedirectTarget::url("home"))
            .unwrap()
            .redirect("/old", RedirectTarget::dynamic(|runner| format!("/new{}", runner.request().path())))
            .unwrap();
        let router = builder.build().unwrap();

        assert!(router.validate(&HandlerRegistry::new()).is_ok());
        let matched = router.at(&Method::GET, "/").unwrap();
        assert_eq!(matched.route().proxy("default").unwrap().name(), "redirect /");
        assert_eq!(HandlerSpec::from("x"), HandlerSpec::Single("x".into()));
    }
}
