//! Errors raised while loading and rendering templates

use thiserror::Error;

use crate::error::ParseError;
use crate::loader::LoaderError;

/// Errors from evaluating expressions against a context
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EvalError {
    /// A variable, or one of its dotted segments, is not bound
    #[error("undefined variable: {name}")]
    UndefinedVariable { name: String },

    /// A filter rejected its input or argument
    #[error("filter '{filter}' failed: {message}")]
    Filter { filter: String, message: String },

    /// `{% for %}` over a value that has no items
    #[error("'{name}' is not iterable (got {type_name})")]
    NotIterable {
        name: String,
        type_name: &'static str,
    },
}

/// Errors that can occur while getting or rendering a template
#[derive(Debug, Error)]
pub enum TemplateError {
    /// The loader has no template under this name
    #[error("template not found: {name}")]
    NotFound { name: String },

    /// The template source failed to compile
    #[error("syntax errors in template {name}: {}", format_parse_errors(.errors))]
    Syntax {
        name: String,
        /// Source text the error spans point into
        text: String,
        errors: Vec<ParseError>,
    },

    /// An expression could not be evaluated
    #[error("evaluation error: {0}")]
    Evaluation(#[from] EvalError),

    /// Template source exists but could not be read
    #[error("loader error: {0}")]
    Loader(LoaderError),

    /// Includes nested deeper than the configured limit
    #[error("include depth limit of {depth} exceeded while including {name}")]
    RecursionLimit { name: String, depth: usize },
}

impl From<LoaderError> for TemplateError {
    fn from(err: LoaderError) -> Self {
        match err {
            LoaderError::NotFound { name, .. } => TemplateError::NotFound { name },
            other => TemplateError::Loader(other),
        }
    }
}

impl TemplateError {
    /// True when this is a not-found error for exactly `name`
    ///
    /// A not-found for some other template, raised while rendering `name`,
    /// does not count.
    pub fn is_not_found_for(&self, name: &str) -> bool {
        matches!(self, TemplateError::NotFound { name: missing } if missing == name)
    }

    /// Human-readable report; syntax errors are shown with source context
    pub fn report(&self) -> String {
        match self {
            TemplateError::Syntax { name, text, errors } => errors
                .iter()
                .map(|e| e.format(text, name))
                .collect::<Vec<_>>()
                .join("\n"),
            other => other.to_string(),
        }
    }
}

fn format_parse_errors(errors: &[ParseError]) -> String {
    errors
        .iter()
        .map(|e| e.message().to_string())
        .collect::<Vec<_>>()
        .join("; ")
}
