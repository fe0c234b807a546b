//! Template lookup and layout nesting on top of pluggable rendering engines.
//!
//! Engines are keyed by file extension. A template `posts/show` is looked up as
//! `posts/show.<ext>` for each engine in registration order, and the extension before the
//! engine's (`show.html.tpl`) is the format of the output.

use crate::error::{BoxError, TemplateError};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

pub type Locals = serde_json::Map<String, Value>;

/// What an engine renders with: the caller's locals and, for a layout, the wrapped output.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderContext {
    pub locals: Locals,
    pub content: Option<String>,
}

#[cfg_attr(test, mockall::automock)]
pub trait TemplateEngine: Send + Sync {
    fn render(&self, source: &str, context: &RenderContext) -> Result<String, BoxError>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum LayoutChoice {
    /// The source's default layout, when it resolves.
    #[default]
    Default,
    None,
    /// A layout that must resolve.
    Named(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderOptions {
    pub layout: LayoutChoice,
}

impl RenderOptions {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn layout(mut self, layout: LayoutChoice) -> Self {
        self.layout = layout;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTemplate {
    pub path: PathBuf,
    pub engine_ext: String,
    pub format: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendered {
    pub body: String,
    pub format: String,
}

pub struct TemplateSource {
    root: PathBuf,
    engines: Vec<(String, Arc<dyn TemplateEngine>)>,
    layout: Option<String>,
    parents: HashMap<String, String>,
}

impl TemplateSource {
    pub fn builder(root: impl Into<PathBuf>) -> TemplateSourceBuilder {
        TemplateSourceBuilder {
            root: root.into(),
            engines: vec![],
            layout: Some("layout".to_string()),
            parents: HashMap::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn engine(&self, ext: &str) -> Option<&Arc<dyn TemplateEngine>> {
        self.engines.iter().find(|(engine_ext, _)| engine_ext == ext).map(|(_, engine)| engine)
    }

    /// Finds the file behind `name`, a relative path without `..` components.
    pub async fn resolve(&self, name: &str) -> Result<ResolvedTemplate, TemplateError> {
        if !Path::new(name).components().all(|component| matches!(component, Component::Normal(_) | Component::CurDir)) {
            return Err(TemplateError::InvalidName(name.to_string()));
        }

        let explicit = Path::new(name).extension().and_then(|ext| ext.to_str()).filter(|ext| self.engine(ext).is_some());

        let candidates = match explicit {
            Some(ext) => vec![(self.root.join(name), ext.to_string())],
            None => self
                .engines
                .iter()
                .map(|(ext, _)| (self.root.join(format!("{name}.{ext}")), ext.clone()))
                .collect(),
        };

        for (path, engine_ext) in candidates {
            if tokio::fs::metadata(&path).await.is_ok_and(|metadata| metadata.is_file()) {
                let format = format_of(&path);
                return Ok(ResolvedTemplate { path, engine_ext, format });
            }
        }

        Err(TemplateError::NotFound(name.to_string()))
    }

    async fn render_resolved(&self, name: &str, resolved: &ResolvedTemplate, context: &RenderContext) -> Result<String, TemplateError> {
        let engine = self.engine(&resolved.engine_ext).ok_or_else(|| TemplateError::NotFound(name.to_string()))?;
        let source = tokio::fs::read_to_string(&resolved.path).await?;
        debug!(template = name, path = %resolved.path.display(), "rendering template");
        engine.render(&source, context).map_err(|source| TemplateError::Engine { template: name.to_string(), source })
    }

    /// Renders `name` and wraps it in its layout chain.
    pub async fn render(&self, name: &str, options: &RenderOptions, locals: Locals) -> Result<Rendered, TemplateError> {
        let resolved = self.resolve(name).await?;
        let mut context = RenderContext { locals, content: None };
        let mut body = self.render_resolved(name, &resolved, &context).await?;

        let mut layout = match &options.layout {
            LayoutChoice::Default => match &self.layout {
                Some(layout) => self.resolve(layout).await.ok().map(|resolved| (layout.clone(), resolved)),
                None => None,
            },
            LayoutChoice::None => None,
            LayoutChoice::Named(layout) => Some((layout.clone(), self.resolve(layout).await?)),
        };

        let mut visited = HashSet::new();
        while let Some((layout_name, resolved_layout)) = layout {
            if !visited.insert(layout_name.clone()) {
                return Err(TemplateError::LayoutCycle(layout_name));
            }

            context.content = Some(body);
            body = self.render_resolved(&layout_name, &resolved_layout, &context).await?;

            layout = match self.parents.get(&layout_name) {
                Some(parent) => Some((parent.clone(), self.resolve(parent).await?)),
                None => None,
            };
        }

        Ok(Rendered { body, format: resolved.format })
    }

    /// Renders the partial `dir/_name` without a layout.
    pub async fn partial(&self, name: &str, locals: Locals) -> Result<String, TemplateError> {
        let partial_name = match name.rsplit_once('/') {
            Some((dir, base)) => format!("{dir}/_{base}"),
            None => format!("_{name}"),
        };
        let resolved = self.resolve(&partial_name).await?;
        self.render_resolved(&partial_name, &resolved, &RenderContext { locals, content: None }).await
    }
}

/// `index.html.tpl` has format `html`; a name without a format extension defaults to `html`.
fn format_of(path: &Path) -> String {
    path.file_stem()
        .map(Path::new)
        .and_then(Path::extension)
        .and_then(|ext| ext.to_str())
        .unwrap_or("html")
        .to_string()
}

impl fmt::Debug for TemplateSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TemplateSource")
            .field("root", &self.root)
            .field("engines", &self.engines.iter().map(|(ext, _)| ext.as_str()).collect::<Vec<_>>())
            .field("layout", &self.layout)
            .field("parents", &self.parents)
            .finish()
    }
}

pub struct TemplateSourceBuilder {
    root: PathBuf,
    engines: Vec<(String, Arc<dyn TemplateEngine>)>,
    layout: Option<String>,
    parents: HashMap<String, String>,
}

impl TemplateSourceBuilder {
    /// Registers `engine` for files ending in `.<ext>`. Earlier engines are tried first.
    #[must_use]
    pub fn engine(mut self, ext: impl Into<String>, engine: impl TemplateEngine + 'static) -> Self {
        let ext = ext.into().trim_start_matches('.').to_string();
        self.engines.push((ext, Arc::new(engine)));
        self
    }

    /// Sets the default layout, `layout` unless changed.
    #[must_use]
    pub fn layout(mut self, name: impl Into<String>) -> Self {
        self.layout = Some(name.into());
        self
    }

    #[must_use]
    pub fn no_layout(mut self) -> Self {
        self.layout = None;
        self
    }

    /// Renders the output of layout `child` inside layout `parent`.
    #[must_use]
    pub fn nest_layout(mut self, child: impl Into<String>, parent: impl Into<String>) -> Self {
        self.parents.insert(child.into(), parent.into());
        self
    }

    pub fn build(self) -> TemplateSource {
        TemplateSource { root: self.root, engines: self.engines, layout: self.layout, parents: self.parents }
    }
}
