//! dyninclude - Django-flavoured templates with dynamic includes
//!
//! This library provides a parser and renderer for a small template
//! language. Its `include_` tag accepts placeholders in the name of the
//! included template, resolved against the context on every render, and an
//! optional fallback template used when no template has the resolved name.
//!
//! # Example
//!
//! ```rust
//! use dyninclude::{render_str, Context};
//!
//! let mut ctx = Context::new().with("name", "world");
//! let out = render_str("Hello {{ name|upper }}!", &mut ctx).unwrap();
//! assert_eq!(out, "Hello WORLD!");
//! ```

pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod filters;
pub mod loader;
pub mod parser;

pub use config::{ConfigError, EngineConfig};
pub use context::{Context, ContextError, Value};
pub use engine::{Engine, EvalError, TemplateError};
pub use error::ParseError;
pub use loader::{FileSystemLoader, LoaderError, MemoryLoader, TemplateLoader};
pub use parser::{parse, Template};

/// Render template source against a context with the default configuration
///
/// Includes have no templates to load from here; use an [`Engine`] with a
/// loader for those.
///
/// # Example
///
/// ```rust
/// use dyninclude::{render_str, Context};
///
/// let mut ctx = Context::new().with("items", vec!["a", "b"]);
/// let out = render_str(
///     "{% for x in items %}{{ forloop.counter }}:{{ x }} {% endfor %}",
///     &mut ctx,
/// )
/// .unwrap();
/// assert_eq!(out, "1:a 2:b ");
/// ```
pub fn render_str(source: &str, ctx: &mut Context) -> Result<String, TemplateError> {
    let engine = Engine::new(MemoryLoader::new());
    let template = engine.from_string(source)?;
    engine.render_template(&template, ctx)
}
