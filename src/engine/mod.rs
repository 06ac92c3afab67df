//! Template engine: loads, compiles and renders templates
//!
//! An [`Engine`] pairs a [`TemplateLoader`] with an [`EngineConfig`]. Every
//! call to [`Engine::render`] or [`Engine::render_template`] is one render
//! pass with its own cache of templates resolved by name.

mod error;
mod include;
mod render;

pub use error::{EvalError, TemplateError};

use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::config::EngineConfig;
use crate::context::Context;
use crate::loader::{FileSystemLoader, TemplateLoader};
use crate::parser::{parse_named, Template};
use render::Renderer;

/// Loads and renders templates
pub struct Engine {
    loader: Box<dyn TemplateLoader>,
    config: EngineConfig,
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Create an engine with the default configuration
    pub fn new(loader: impl TemplateLoader + 'static) -> Self {
        Self::with_config(loader, EngineConfig::default())
    }

    /// Create an engine with a custom configuration
    pub fn with_config(loader: impl TemplateLoader + 'static, config: EngineConfig) -> Self {
        Self {
            loader: Box::new(loader),
            config,
        }
    }

    /// Create an engine reading templates from the configured directories
    pub fn from_config(config: EngineConfig) -> Self {
        let loader = FileSystemLoader::new(config.dirs.clone());
        Self::with_config(loader, config)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Load and compile the template called `name`
    pub fn get_template(&self, name: &str) -> Result<Arc<Template>, TemplateError> {
        debug!(name, "loading template");
        let source = self.loader.get_source(name)?;
        compile(&source, Some(name)).map(Arc::new)
    }

    /// Compile a template from source text; it has no name of its own
    pub fn from_string(&self, source: &str) -> Result<Arc<Template>, TemplateError> {
        compile(source, None).map(Arc::new)
    }

    /// Render the template called `name`
    ///
    /// # Example
    ///
    /// ```rust
    /// use dyninclude::{Context, Engine, MemoryLoader};
    ///
    /// let engine = Engine::new(
    ///     MemoryLoader::new()
    ///         .with_template("page.html", r#"[{% include_ "sub_{{ kind }}.html" fallback "default.html" %}]"#)
    ///         .with_template("sub_a.html", "A")
    ///         .with_template("default.html", "D"),
    /// );
    ///
    /// let mut ctx = Context::new().with("kind", "a");
    /// assert_eq!(engine.render("page.html", &mut ctx).unwrap(), "[A]");
    ///
    /// let mut ctx = Context::new().with("kind", "zzz");
    /// assert_eq!(engine.render("page.html", &mut ctx).unwrap(), "[D]");
    /// ```
    pub fn render(&self, name: &str, ctx: &mut Context) -> Result<String, TemplateError> {
        debug!(name, "rendering template");
        let mut renderer = Renderer::new(self);
        let template = renderer.load(name)?;
        renderer.render(&template, ctx)
    }

    /// Render an already compiled template
    pub fn render_template(&self, template: &Template, ctx: &mut Context) -> Result<String, TemplateError> {
        debug!(name = template.display_name(), "rendering template");
        Renderer::new(self).render(template, ctx)
    }
}

fn compile(source: &str, name: Option<&str>) -> Result<Template, TemplateError> {
    parse_named(source, name).map_err(|errors| TemplateError::Syntax {
        name: name.unwrap_or("<string>").to_string(),
        text: source.to_string(),
        errors,
    })
}
