//! Request dispatch and execution for the micro web stack.
//!
//! The serving substrate parses a request, buffers its body and hands it to [`App::call`].
//! From there a [`Router`] picks the route and the request type, a [`HandlerType`] is
//! resolved from the [`HandlerRegistry`], and a [`Runner`] drives the handler lifecycle
//! and builds the response. Route misses and application errors are turned into responses
//! by the [`ErrorEscalator`](escalator::ErrorEscalator).
//!
//! ```no_run
//! use bytes::Bytes;
//! use micro_dispatch::url::PathArgs;
//! use micro_dispatch::{App, HandlerType, Router};
//!
//! # async fn serve() -> Result<(), Box<dyn std::error::Error>> {
//! let mut router = Router::builder();
//! router.url("user", "/users/:id", Default::default())?.get("/users/:id", "user")?;
//!
//! let user = HandlerType::from_fn("user", |runner| {
//!     let link = runner.url_for("user", PathArgs::new().arg(7))?;
//!     runner.halt(format!("see also {link}"))
//! });
//!
//! let app = App::builder().router(router.build()?).handler(user.build()).build()?;
//!
//! let response = app.call(http::Request::get("/users/1").body(Bytes::new())?).await;
//! assert_eq!(response.status(), http::StatusCode::OK);
//! # Ok(())
//! # }
//! ```

mod app;
mod body;
mod handler;
mod request;
mod settings;

pub mod decorator;
pub mod error;
pub mod escalator;
pub mod filter;
pub mod pipeline;
pub mod router;
pub mod runner;
pub mod template;
pub mod url;

pub use app::App;
pub use app::AppBuilder;
pub use app::AppState;
pub use body::ResponseBody;
pub use handler::handler_fn;
pub use handler::Callback;
pub use handler::FnHandler;
pub use handler::Handler;
pub use handler::HandlerRegistry;
pub use handler::HandlerType;
pub use handler::HandlerTypeBuilder;
pub use handler::Interrupt;
pub use handler::Outcome;
pub use request::RequestHeader;
pub use router::Router;
pub use router::RouterBuilder;
pub use runner::Runner;
pub use settings::Settings;
