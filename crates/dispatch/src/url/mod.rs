//! Named url templates: path generation and route matcher compilation.
//!
//! A pattern is made of literal text, `:name` captures and `*` wildcards. The same
//! [`UrlTemplate`] generates concrete paths with [`UrlTemplate::path_for`] and, when it backs
//! a route, either compiles to the matchit syntax of the [`Router`](crate::Router) or matches
//! paths itself with [`UrlTemplate::captures`].

mod query;
mod template;

pub use query::default_escape;
pub(crate) use query::percent_encode;
pub use template::{PathCaptures, UrlTemplate};

use std::collections::BTreeMap;
use std::sync::Arc;

/// Escapes a single query key segment or value.
pub type EscapeFn = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// The trailing map of [`PathArgs`]. Keys iterate in sorted order.
pub type UrlParams = BTreeMap<String, UrlValue>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UrlValue {
    Scalar(String),
    List(Vec<UrlValue>),
    Map(UrlParams),
}

impl UrlValue {
    pub fn as_scalar(&self) -> Option<&str> {
        match self {
            UrlValue::Scalar(value) => Some(value.as_str()),
            _ => None,
        }
    }
}

impl From<&str> for UrlValue {
    fn from(value: &str) -> Self {
        UrlValue::Scalar(value.to_string())
    }
}

impl From<String> for UrlValue {
    fn from(value: String) -> Self {
        UrlValue::Scalar(value)
    }
}

impl<T: Into<UrlValue>> From<Vec<T>> for UrlValue {
    fn from(values: Vec<T>) -> Self {
        UrlValue::List(values.into_iter().map(Into::into).collect())
    }
}

impl From<UrlParams> for UrlValue {
    fn from(map: UrlParams) -> Self {
        UrlValue::Map(map)
    }
}

macro_rules! impl_url_value_display {
    ($($ty:ty),+) => {
        $(
            impl From<$ty> for UrlValue {
                fn from(value: $ty) -> Self {
                    UrlValue::Scalar(value.to_string())
                }
            }
        )+
    };
}

impl_url_value_display!(u16, u32, u64, usize, i32, i64, bool);

/// Arguments of a [`UrlTemplate::path_for`] call: positional values plus a trailing map.
///
/// ```
/// use micro_dispatch::url::{PathArgs, UrlTemplate};
///
/// let template = UrlTemplate::new("post", "/posts/:year/:slug");
/// let args = PathArgs::new().param("year", 2024).arg("hello").param("page", 2);
///
/// assert_eq!(template.path_for(args), "/posts/2024/hello?page=2");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathArgs {
    positional: Vec<String>,
    params: UrlParams,
}

impl PathArgs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a positional argument.
    #[must_use]
    pub fn arg(mut self, value: impl ToString) -> Self {
        self.positional.push(value.to_string());
        self
    }

    /// Sets a key of the trailing map.
    #[must_use]
    pub fn param(mut self, key: impl Into<String>, value: impl Into<UrlValue>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Sets the values used to fill `*` wildcards, left to right.
    #[must_use]
    pub fn splat<I, S>(self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let values = values.into_iter().map(|value| UrlValue::Scalar(value.into())).collect::<Vec<_>>();
        self.param("splat", UrlValue::List(values))
    }

    /// Sets the `#fragment` appended after the query.
    #[must_use]
    pub fn fragment(self, fragment: impl Into<String>) -> Self {
        self.param("#", UrlValue::Scalar(fragment.into()))
    }

    pub fn positional(&self) -> &[String] {
        &self.positional
    }

    pub fn params(&self) -> &UrlParams {
        &self.params
    }

    pub(crate) fn into_parts(self) -> (Vec<String>, UrlParams) {
        (self.positional, self.params)
    }
}

impl From<UrlParams> for PathArgs {
    fn from(params: UrlParams) -> Self {
        Self { positional: vec![], params }
    }
}
