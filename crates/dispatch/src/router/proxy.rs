use crate::error::HandlerResolutionError;
use crate::handler::{HandlerRegistry, HandlerType};
use once_cell::sync::OnceCell;
use std::fmt;
use std::sync::Arc;

/// Defers resolving a route's handler name until the app is validated.
///
/// The first resolution is cached for the lifetime of the proxy, failures included.
pub struct HandlerProxy {
    name: String,
    resolved: OnceCell<Result<Arc<HandlerType>, HandlerResolutionError>>,
}

impl HandlerProxy {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), resolved: OnceCell::new() }
    }

    /// A proxy already bound to `handler_type`.
    pub fn resolved(handler_type: Arc<HandlerType>) -> Self {
        Self { name: handler_type.name().to_string(), resolved: OnceCell::with_value(Ok(handler_type)) }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn resolve(&self, registry: &HandlerRegistry) -> Result<&Arc<HandlerType>, HandlerResolutionError> {
        self.resolved
            .get_or_init(|| registry.get(&self.name).ok_or_else(|| HandlerResolutionError { name: self.name.clone() }))
            .as_ref()
            .map_err(Clone::clone)
    }

    /// The handler type, once resolved.
    pub fn handler_type(&self) -> Result<&Arc<HandlerType>, HandlerResolutionError> {
        match self.resolved.get() {
            Some(resolved) => resolved.as_ref().map_err(Clone::clone),
            None => Err(HandlerResolutionError { name: self.name.clone() }),
        }
    }
}

impl fmt::Debug for HandlerProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerProxy")
            .field("name", &self.name)
            .field("resolved", &self.resolved.get().map(Result::is_ok))
            .finish()
    }
}
