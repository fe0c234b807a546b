//! Handler implementations, handler types and the registry that names them.
//!
//! A [`HandlerType`] is what a route points at: a factory producing one fresh [`Handler`] per
//! request, plus the lifecycle callbacks frozen when the type was built. Routes only know a
//! handler by name; the [`HandlerRegistry`] maps names to types and is consulted once, when
//! the app is validated.

use crate::error::BoxError;
use crate::runner::Runner;
use async_trait::async_trait;
use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use std::sync::Arc;

/// Result of a lifecycle step.
pub type Outcome = Result<(), Interrupt>;

/// Why a lifecycle step stopped early.
#[derive(Debug)]
pub enum Interrupt {
    /// The response is complete. Execution resumes at the nearest enclosing scope boundary.
    Halt,
    /// An application error, escalated once the lifecycle has unwound.
    Error(BoxError),
}

impl Interrupt {
    pub fn error(error: impl Into<BoxError>) -> Self {
        Interrupt::Error(error.into())
    }

    pub fn is_halt(&self) -> bool {
        matches!(self, Interrupt::Halt)
    }
}

impl<E: Error + Send + Sync + 'static> From<E> for Interrupt {
    fn from(error: E) -> Self {
        Interrupt::Error(Box::new(error))
    }
}

/// A per-request handler instance.
///
/// `init` runs before `run`, and both see the same instance, so state set up in `init` is
/// visible to `run`.
#[async_trait]
pub trait Handler: Send {
    async fn init(&mut self, _runner: &mut Runner<'_>) -> Outcome {
        Ok(())
    }

    async fn run(&mut self, runner: &mut Runner<'_>) -> Outcome;
}

/// A lifecycle callback. Returning `Err(Interrupt::Halt)` aborts the current scope.
pub type Callback = Arc<dyn Fn(&mut Runner<'_>) -> Outcome + Send + Sync>;

type Factory = Arc<dyn Fn() -> Box<dyn Handler> + Send + Sync>;

/// A `Handler` backed by a plain closure, used for handlers that only need `run`.
pub struct FnHandler<F> {
    f: Arc<F>,
}

impl<F> Clone for FnHandler<F> {
    fn clone(&self) -> Self {
        Self { f: Arc::clone(&self.f) }
    }
}

pub fn handler_fn<F>(f: F) -> FnHandler<F>
where
    F: Fn(&mut Runner<'_>) -> Outcome + Send + Sync,
{
    FnHandler { f: Arc::new(f) }
}

#[async_trait]
impl<F> Handler for FnHandler<F>
where
    F: Fn(&mut Runner<'_>) -> Outcome + Send + Sync,
{
    async fn run(&mut self, runner: &mut Runner<'_>) -> Outcome {
        (self.f)(runner)
    }
}

pub struct HandlerType {
    name: String,
    factory: Factory,
    before: Vec<Callback>,
    before_init: Vec<Callback>,
    after_init: Vec<Callback>,
    before_run: Vec<Callback>,
    after_run: Vec<Callback>,
    after: Vec<Callback>,
}

impl HandlerType {
    /// Starts a handler type whose instances come from `factory`.
    pub fn builder<F, H>(name: impl Into<String>, factory: F) -> HandlerTypeBuilder
    where
        F: Fn() -> H + Send + Sync + 'static,
        H: Handler + 'static,
    {
        HandlerTypeBuilder {
            name: name.into(),
            factory: Arc::new(move || Box::new(factory()) as Box<dyn Handler>),
            before: vec![],
            before_init: vec![],
            after_init: vec![],
            before_run: vec![],
            after_run: vec![],
            after: vec![],
        }
    }

    /// Starts a handler type that creates instances with `H::default()`.
    pub fn of<H>(name: impl Into<String>) -> HandlerTypeBuilder
    where
        H: Handler + Default + 'static,
    {
        Self::builder(name, H::default)
    }

    /// Starts a handler type whose `run` is `f`.
    pub fn from_fn<F>(name: impl Into<String>, f: F) -> HandlerTypeBuilder
    where
        F: Fn(&mut Runner<'_>) -> Outcome + Send + Sync + 'static,
    {
        let handler = handler_fn(f);
        Self::builder(name, move || handler.clone())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn instantiate(&self) -> Box<dyn Handler> {
        (self.factory)()
    }

    pub(crate) fn before(&self) -> &[Callback] {
        &self.before
    }

    pub(crate) fn before_init(&self) -> &[Callback] {
        &self.before_init
    }

    pub(crate) fn after_init(&self) -> &[Callback] {
        &self.after_init
    }

    pub(crate) fn before_run(&self) -> &[Callback] {
        &self.before_run
    }

    pub(crate) fn after_run(&self) -> &[Callback] {
        &self.after_run
    }

    pub(crate) fn after(&self) -> &[Callback] {
        &self.after
    }
}

impl fmt::Debug for HandlerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerType").field("name", &self.name).finish_non_exhaustive()
    }
}

macro_rules! lifecycle_callback {
    ($($(#[$doc:meta])* $field:ident),+ $(,)?) => {
        $(
            $(#[$doc])*
            #[must_use]
            pub fn $field<F>(mut self, callback: F) -> Self
            where
                F: Fn(&mut Runner<'_>) -> Outcome + Send + Sync + 'static,
            {
                self.$field.push(Arc::new(callback));
                self
            }
        )+
    };
}

/// Collects the lifecycle callbacks of a [`HandlerType`]. Callbacks of one kind run in the
/// order they were added.
pub struct HandlerTypeBuilder {
    name: String,
    factory: Factory,
    before: Vec<Callback>,
    before_init: Vec<Callback>,
    after_init: Vec<Callback>,
    before_run: Vec<Callback>,
    after_run: Vec<Callback>,
    after: Vec<Callback>,
}

impl HandlerTypeBuilder {
    lifecycle_callback! {
        /// Runs first. A halt here ends the request: neither the handler nor `after` runs.
        before,
        before_init,
        after_init,
        before_run,
        after_run,
        /// Runs after the handler scope, even when the handler halted.
        after,
    }

    /// Applies a plugin, a function that adds callbacks to the builder.
    ///
    /// ```
    /// use micro_dispatch::{HandlerType, HandlerTypeBuilder};
    ///
    /// fn powered_by(builder: HandlerTypeBuilder) -> HandlerTypeBuilder {
    ///     builder.after(|runner| {
    ///         runner.headers_mut().insert("x-powered-by", http::HeaderValue::from_static("micro-dispatch"));
    ///         Ok(())
    ///     })
    /// }
    ///
    /// let home = HandlerType::from_fn("home", |runner| runner.halt("home")).apply(powered_by).build();
    /// assert_eq!(home.name(), "home");
    /// ```
    #[must_use]
    pub fn apply<P>(self, plugin: P) -> Self
    where
        P: FnOnce(Self) -> Self,
    {
        plugin(self)
    }

    pub fn build(self) -> HandlerType {
        HandlerType {
            name: self.name,
            factory: self.factory,
            before: self.before,
            before_init: self.before_init,
            after_init: self.after_init,
            before_run: self.before_run,
            after_run: self.after_run,
            after: self.after,
        }
    }
}

/// Handler types by name, filled once at startup.
#[derive(Default, Debug)]
pub struct HandlerRegistry {
    types: HashMap<String, Arc<HandlerType>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler_type` under its name, replacing an earlier type of the same name.
    pub fn register(&mut self, handler_type: HandlerType) -> &mut Self {
        self.types.insert(handler_type.name().to_string(), Arc::new(handler_type));
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<HandlerType>> {
        self.types.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}
