//! The per-request execution engine.
//!
//! A [`Runner`] is created for every dispatched request. It owns the response under
//! construction and drives the handler lifecycle through two nested scopes:
//!
//! ```text
//! before*
//! [ before_init*  init  after_init*  before_run*  run  after_run* ]   <- handler scope
//! after*
//! ```
//!
//! A halt inside the handler scope skips the rest of that scope only, so `after` callbacks
//! still run. A halt in `before` ends the request right away. Errors skip everything that is
//! left and are escalated by the caller.

pub mod content_type;
pub mod params;
pub mod send_file;
mod state;

pub use params::{Param, Params, UploadDetector};
pub use send_file::SendFileOptions;
pub use state::{HaltArgs, IntoStatus, ResponseState};

use crate::app::AppState;
use crate::body::ResponseBody;
use crate::error::{BoxError, ConfigurationError};
use crate::escalator::ErrorContext;
use crate::handler::{Callback, Handler, HandlerType, Interrupt, Outcome};
use crate::template::{Locals, RenderOptions};
use crate::url::PathArgs;
use crate::RequestHeader;
use content_type::content_type_value;
use http::header::{self, InvalidHeaderValue};
use http::{HeaderMap, HeaderValue, Response, StatusCode};
use send_file::{byte_range, content_disposition, http_date, FileWindowBody};
use std::path::Path;
use tracing::debug;

enum Hook {
    Init,
    Run,
}

pub struct Runner<'req> {
    request: &'req RequestHeader,
    state: &'req AppState,
    route_path: Option<&'req str>,
    request_type: String,
    params: Params,
    wildcards: Vec<String>,
    response: ResponseState,
    handler: Option<Box<dyn Handler>>,
    handler_name: Option<String>,
}

impl<'req> Runner<'req> {
    pub(crate) fn new(request: &'req RequestHeader, state: &'req AppState) -> Self {
        Self {
            request,
            state,
            route_path: None,
            request_type: state.router().default_request_type().to_string(),
            params: Params::new(),
            wildcards: vec![],
            response: ResponseState::new(),
            handler: None,
            handler_name: None,
        }
    }

    pub(crate) fn bind_route(&mut self, route_path: &'req str, request_type: &str, wildcards: Vec<String>) {
        self.route_path = Some(route_path);
        self.request_type = request_type.to_string();
        self.wildcards = wildcards;
    }

    pub(crate) fn set_params(&mut self, params: Params) {
        self.params = params;
    }

    pub fn request(&self) -> &'req RequestHeader {
        self.request
    }

    pub fn app(&self) -> &'req AppState {
        self.state
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn param(&self, name: &str) -> Option<&Param> {
        self.params.get(name)
    }

    pub fn wildcards(&self) -> &[String] {
        &self.wildcards
    }

    /// Pattern of the matched route.
    pub fn route_path(&self) -> Option<&'req str> {
        self.route_path
    }

    pub fn request_type(&self) -> &str {
        &self.request_type
    }

    pub fn handler_name(&self) -> Option<&str> {
        self.handler_name.as_deref()
    }

    pub fn response(&self) -> &ResponseState {
        &self.response
    }

    pub fn status(&self) -> Option<StatusCode> {
        self.response.status()
    }

    pub fn set_status(&mut self, status: StatusCode) -> StatusCode {
        self.response.set_status(status)
    }

    pub fn headers(&self) -> &HeaderMap {
        self.response.headers()
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        self.response.headers_mut()
    }

    pub fn merge_headers(&mut self, headers: HeaderMap) -> &HeaderMap {
        self.response.merge_headers(headers)
    }

    pub fn body(&self) -> &ResponseBody {
        self.response.body()
    }

    pub fn set_body(&mut self, body: impl Into<ResponseBody>) -> &ResponseBody {
        self.response.set_body(body)
    }

    /// Applies `args` and stops the current scope.
    ///
    /// ```ignore
    /// runner.halt(StatusCode::FORBIDDEN)?;
    /// runner.halt((404, "no such post"))?;
    /// ```
    pub fn halt(&mut self, args: impl Into<HaltArgs>) -> Outcome {
        self.response.apply(args.into());
        Err(Interrupt::Halt)
    }

    /// Answers `302 Found` with an absolute `Location`, then halts with `args`.
    pub fn redirect(&mut self, location: &str, args: impl Into<HaltArgs>) -> Outcome {
        self.set_status(StatusCode::FOUND);
        let location = self.request.absolute_location(location);
        self.headers_mut().insert(header::LOCATION, HeaderValue::from_str(&location)?);
        self.halt(args)
    }

    /// Sets `Content-Type` from an extension (`"html"`, `".png"`) or a mime type.
    pub fn content_type(&mut self, ext_or_mime: &str, params: &[(&str, &str)]) -> Result<HeaderValue, InvalidHeaderValue> {
        let value = content_type_value(ext_or_mime, params, &self.state.settings().default_charset);
        let value = HeaderValue::from_str(&value)?;
        self.headers_mut().insert(header::CONTENT_TYPE, value.clone());
        Ok(value)
    }

    pub fn url_for(&self, name: &str, args: PathArgs) -> Result<String, ConfigurationError> {
        self.state.router().path_for(name, args)
    }

    /// Serves a file, honoring `If-Modified-Since` and a single `Range`. Always halts.
    pub async fn send_file(&mut self, path: impl AsRef<Path>, options: SendFileOptions) -> Outcome {
        let path = path.as_ref();
        let metadata = match tokio::fs::metadata(path).await {
            Ok(metadata) if metadata.is_file() => metadata,
            _ => {
                debug!(path = %path.display(), "file not found");
                return self.halt((StatusCode::NOT_FOUND, ResponseBody::empty()));
            }
        };

        if let Ok(modified) = metadata.modified() {
            let last_modified = http_date(modified);
            let if_modified_since = self.request.headers().get(header::IF_MODIFIED_SINCE).and_then(|v| v.to_str().ok());
            if if_modified_since == Some(last_modified.as_str()) {
                return self.halt((StatusCode::NOT_MODIFIED, ResponseBody::empty()));
            }
            if !self.headers().contains_key(header::LAST_MODIFIED) {
                self.headers_mut().insert(header::LAST_MODIFIED, HeaderValue::from_str(&last_modified)?);
            }
        }

        if !self.headers().contains_key(header::CONTENT_TYPE) {
            let ext = path.extension().and_then(|ext| ext.to_str()).unwrap_or_default();
            self.content_type(options.content_type.as_deref().unwrap_or(ext), &[])?;
        }

        let size = metadata.len();
        let range = self
            .request
            .headers()
            .get(header::RANGE)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| byte_range(value, size));

        let (offset, len) = match range {
            Some((start, end)) => {
                let content_range = format!("bytes {start}-{end}/{size}");
                self.headers_mut().insert(header::CONTENT_RANGE, HeaderValue::from_str(&content_range)?);
                (start, end - start + 1)
            }
            None => (0, size),
        };

        if options.disposition.is_some() || options.filename.is_some() {
            let disposition = options.disposition.as_deref().unwrap_or("attachment");
            let filename = match options.filename.as_deref() {
                Some(filename) => filename.to_string(),
                None => path.file_name().map(|name| name.to_string_lossy().into_owned()).unwrap_or_default(),
            };
            let value = HeaderValue::from_str(&content_disposition(disposition, &filename))?;
            self.headers_mut().insert(header::CONTENT_DISPOSITION, value);
        }

        if !self.headers().contains_key(header::CONTENT_LENGTH) {
            self.headers_mut().insert(header::CONTENT_LENGTH, HeaderValue::from(len));
        }

        self.set_status(if range.is_some() { StatusCode::PARTIAL_CONTENT } else { StatusCode::OK });

        debug!(path = %path.display(), offset, len, size, "sending file window");
        let body = FileWindowBody::new(path, offset, len, self.state.settings().file_chunk_size);
        self.set_body(ResponseBody::stream(body));
        Err(Interrupt::Halt)
    }

    /// Renders a template, in its layout unless `options` say otherwise, into the body.
    pub async fn render(&mut self, name: &str, options: RenderOptions, locals: Locals) -> Outcome {
        let templates = self.state.templates().ok_or(ConfigurationError::MissingSetting("templates"))?;
        let rendered = templates.render(name, &options, locals).await?;

        if !self.headers().contains_key(header::CONTENT_TYPE) {
            self.content_type(&rendered.format, &[])?;
        }
        self.set_body(rendered.body);
        Ok(())
    }

    /// Renders the partial `dir/_name` without a layout and returns the output.
    pub async fn partial(&self, name: &str, locals: Locals) -> Result<String, Interrupt> {
        let templates = self.state.templates().ok_or(ConfigurationError::MissingSetting("templates"))?;
        Ok(templates.partial(name, locals).await?)
    }

    /// Runs the lifecycle of `handler_type` with a fresh handler instance.
    ///
    /// Halts are absorbed here; only application errors come back.
    pub(crate) async fn execute(&mut self, handler_type: &HandlerType) -> Result<(), BoxError> {
        self.handler_name = Some(handler_type.name().to_string());
        self.handler = Some(handler_type.instantiate());

        match self.run_request_scope(handler_type).await {
            Ok(()) => Ok(()),
            Err(Interrupt::Halt) => {
                debug!(handler = handler_type.name(), "request halted before the handler");
                Ok(())
            }
            Err(Interrupt::Error(e)) => Err(e),
        }
    }

    async fn run_request_scope(&mut self, handler_type: &HandlerType) -> Outcome {
        self.run_callbacks(handler_type.before())?;

        match self.run_handler_scope(handler_type).await {
            Ok(()) => {}
            Err(Interrupt::Halt) => debug!(handler = handler_type.name(), "handler halted"),
            Err(err) => return Err(err),
        }

        self.run_callbacks(handler_type.after())
    }

    async fn run_handler_scope(&mut self, handler_type: &HandlerType) -> Outcome {
        self.run_callbacks(handler_type.before_init())?;
        self.run_hook(Hook::Init).await?;
        self.run_callbacks(handler_type.after_init())?;
        self.run_callbacks(handler_type.before_run())?;
        self.run_hook(Hook::Run).await?;
        self.run_callbacks(handler_type.after_run())
    }

    fn run_callbacks(&mut self, callbacks: &[Callback]) -> Outcome {
        callbacks.iter().try_for_each(|callback| callback(self))
    }

    async fn run_hook(&mut self, hook: Hook) -> Outcome {
        let Some(mut handler) = self.handler.take() else {
            return Ok(());
        };

        let outcome = match hook {
            Hook::Init => handler.init(self).await,
            Hook::Run => handler.run(self).await,
        };

        self.handler = Some(handler);
        outcome
    }

    pub(crate) fn error_context(&self) -> ErrorContext<'_> {
        ErrorContext {
            request: self.request,
            response: &self.response,
            handler_name: self.handler_name.as_deref(),
            handler: self.handler.as_deref(),
            params: &self.params,
            wildcards: &self.wildcards,
            route_path: self.route_path,
        }
    }

    /// Finalizes the response. See [`ResponseState::finish`].
    pub fn finish(self) -> Response<ResponseBody> {
        self.response.finish(self.request.method())
    }
}
