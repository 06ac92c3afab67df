//! Template sources: where the engine finds templates by name

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};

use thiserror::Error;
use tracing::trace;

/// Errors that can occur while looking up template source
#[derive(Debug, Error)]
pub enum LoaderError {
    /// No source could be found under this name
    #[error("template not found: {name}")]
    NotFound { name: String, tried: Vec<String> },

    /// A candidate file exists but could not be read
    #[error("error reading template file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Something that can produce template source by name
pub trait TemplateLoader: Send + Sync {
    /// Return the source text of the template called `name`
    fn get_source(&self, name: &str) -> Result<String, LoaderError>;
}

/// Templates held in memory, keyed by name
#[derive(Debug, Clone, Default)]
pub struct MemoryLoader {
    templates: HashMap<String, String>,
}

impl MemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a template
    pub fn insert(&mut self, name: impl Into<String>, source: impl Into<String>) {
        self.templates.insert(name.into(), source.into());
    }

    /// Builder form of [`MemoryLoader::insert`]
    pub fn with_template(mut self, name: impl Into<String>, source: impl Into<String>) -> Self {
        self.insert(name, source);
        self
    }
}

impl TemplateLoader for MemoryLoader {
    fn get_source(&self, name: &str) -> Result<String, LoaderError> {
        self.templates
            .get(name)
            .cloned()
            .ok_or_else(|| LoaderError::NotFound {
                name: name.to_string(),
                tried: vec![format!("memory:{}", name)],
            })
    }
}

/// Templates read from an ordered list of directories; the first hit wins
#[derive(Debug, Clone, Default)]
pub struct FileSystemLoader {
    dirs: Vec<PathBuf>,
}

impl FileSystemLoader {
    pub fn new<I, P>(dirs: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            dirs: dirs.into_iter().map(Into::into).collect(),
        }
    }
}

/// Names must stay inside the template directories
fn is_safe_name(name: &str) -> bool {
    let path = Path::new(name);
    !name.is_empty()
        && path
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

impl TemplateLoader for FileSystemLoader {
    fn get_source(&self, name: &str) -> Result<String, LoaderError> {
        let mut tried = Vec::new();
        if !is_safe_name(name) {
            trace!(name, "refusing template name outside template directories");
            return Err(LoaderError::NotFound {
                name: name.to_string(),
                tried,
            });
        }

        for dir in &self.dirs {
            let path = dir.join(name);
            match std::fs::read_to_string(&path) {
                Ok(source) => {
                    trace!(name, path = %path.display(), "loaded template source");
                    return Ok(source);
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound || path.is_dir() => {
                    tried.push(path.display().to_string());
                }
                Err(source) => return Err(LoaderError::Io { path, source }),
            }
        }

        Err(LoaderError::NotFound {
            name: name.to_string(),
            tried,
        })
    }
}
