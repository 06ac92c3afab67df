//! `{% include %}` and the dynamic `{% include_ %}`

use std::sync::Arc;

use tracing::debug;

use super::render::{Evaluated, Renderer};
use super::TemplateError;
use crate::context::{Context, Value};
use crate::parser::{FilterCall, IncludeNode, IncludeTarget, Spanned, Template, TemplateReference};

impl Renderer<'_> {
    pub(super) fn render_include(
        &mut self,
        include: &IncludeNode,
        ctx: &mut Context,
        out: &mut String,
    ) -> Result<(), TemplateError> {
        match &include.target {
            IncludeTarget::Static(expr) => {
                let target = self.eval_output(expr, ctx)?.value;
                let template = self.lookup(target)?;
                self.render_included(&template, include, ctx, out)
            }
            IncludeTarget::Dynamic {
                reference,
                filters,
                fallback,
            } => self.resolve_and_render(reference, filters, fallback.as_ref(), include, ctx, out),
        }
    }

    /// Render the template named by `reference`, or by `fallback` if there
    /// is no template under the resolved name
    ///
    /// Only a not-found for the resolved name itself switches to the
    /// fallback. Errors raised while rendering the found template, including
    /// not-found errors from its own includes, are returned as they are.
    fn resolve_and_render(
        &mut self,
        reference: &TemplateReference,
        filters: &[FilterCall],
        fallback: Option<&Spanned<String>>,
        include: &IncludeNode,
        ctx: &mut Context,
        out: &mut String,
    ) -> Result<(), TemplateError> {
        let rendered = self.resolve_reference(reference, ctx)?;
        let resolved = if filters.is_empty() {
            rendered
        } else {
            let input = Evaluated {
                value: Value::String(rendered),
                safe: false,
            };
            self.apply_filters(filters, input, ctx)?.value.to_string()
        };
        debug!(reference = %reference.text, resolved = %resolved, "resolved dynamic include");

        let template = match self.lookup(Value::String(resolved.clone())) {
            Ok(template) => template,
            Err(err) if err.is_not_found_for(&resolved) => match fallback {
                Some(fallback) => {
                    debug!(missing = %resolved, fallback = %fallback.node, "using fallback template");
                    self.lookup(Value::String(fallback.node.clone()))?
                }
                None => return Err(err),
            },
            Err(err) => return Err(err),
        };

        self.render_included(&template, include, ctx, out)
    }

    /// Render the reference text against the context to get a template name
    ///
    /// Names are not HTML, so the reference is rendered without autoescaping.
    fn resolve_reference(
        &mut self,
        reference: &TemplateReference,
        ctx: &mut Context,
    ) -> Result<String, TemplateError> {
        let mut name = String::new();
        let autoescape = std::mem::replace(&mut self.autoescape, false);
        let result = self.render_nodes(&reference.compiled.nodes, ctx, &mut name);
        self.autoescape = autoescape;
        result?;
        Ok(name)
    }

    /// A template handle is used as is; anything else is a name to load
    fn lookup(&mut self, target: Value) -> Result<Arc<Template>, TemplateError> {
        match target {
            Value::Template(template) => Ok(template),
            Value::String(name) => self.load(&name),
            other => self.load(&other.to_string()),
        }
    }

    /// Render an included template with the tag's `with` bindings
    ///
    /// Output is buffered so that a failed include leaves `out` untouched.
    fn render_included(
        &mut self,
        template: &Template,
        include: &IncludeNode,
        ctx: &mut Context,
        out: &mut String,
    ) -> Result<(), TemplateError> {
        let max_depth = self.engine.config().max_include_depth;
        if self.depth >= max_depth {
            return Err(TemplateError::RecursionLimit {
                name: template.display_name().to_string(),
                depth: max_depth,
            });
        }

        let values = self.eval_bindings(&include.extra_context, ctx)?;
        let mut buf = String::new();

        self.depth += 1;
        let result = if include.isolated {
            let mut isolated = Context::isolated(values);
            self.render_nodes(&template.nodes, &mut isolated, &mut buf)
        } else {
            ctx.scoped(values, |ctx| self.render_nodes(&template.nodes, ctx, &mut buf))
        };
        self.depth -= 1;

        result?;
        out.push_str(&buf);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::MemoryLoader;
    use crate::Engine;
    use pretty_assertions::assert_eq;

    fn engine() -> Engine {
        Engine::new(
            MemoryLoader::new()
                .with_template("sub_a.html", "A")
                .with_template("default.html", "D")
                .with_template("escaped&name.html", "E"),
        )
    }

    #[test]
    fn test_resolved_name_not_escaped() {
        let engine = engine();
        let template = engine
            .from_string(r#"{% include_ "{{ name }}.html" %}"#)
            .unwrap();
        let mut ctx = Context::new().with("name", "escaped&name");
        assert_eq!(engine.render_template(&template, &mut ctx).unwrap(), "E");
    }

    #[test]
    fn test_failed_include_leaves_no_partial_output() {
        let engine = Engine::new(
            MemoryLoader::new().with_template("partial.html", "before{{ missing }}after"),
        );
        let template = engine
            .from_string(r#"x{% include "partial.html" %}"#)
            .unwrap();
        let mut renderer = Renderer::new(&engine);
        let mut out = String::new();
        let result = renderer.render_nodes(&template.nodes, &mut Context::new(), &mut out);
        assert!(result.is_err());
        assert_eq!(out, "x");
        assert_eq!(renderer.depth, 0);
    }

    #[test]
    fn test_autoescape_restored_after_reference() {
        let engine = engine();
        let template = engine
            .from_string(r#"{% include_ "sub_{{ k }}.html" %}{{ html }}"#)
            .unwrap();
        let mut ctx = Context::new().with("k", "a").with("html", "<b>");
        assert_eq!(
            engine.render_template(&template, &mut ctx).unwrap(),
            "A&lt;b&gt;"
        );
    }

    #[test]
    fn test_filters_apply_to_resolved_name() {
        let engine = engine();
        let template = engine
            .from_string(r#"{% include_ "sub_{{ kind }}.html"|lower fallback "default.html" %}"#)
            .unwrap();

        let mut ctx = Context::new().with("kind", "A");
        assert_eq!(engine.render_template(&template, &mut ctx).unwrap(), "A");

        let mut ctx = Context::new().with("kind", "B");
        assert_eq!(engine.render_template(&template, &mut ctx).unwrap(), "D");
    }

    #[test]
    fn test_whole_float_keeps_decimal_in_name() {
        let engine = Engine::new(MemoryLoader::new().with_template("v1.0.html", "one"));
        let template = engine
            .from_string(r#"{% include_ "v{{ ver }}.html" %}"#)
            .unwrap();
        let mut ctx = Context::new().with("ver", 1.0);
        assert_eq!(engine.render_template(&template, &mut ctx).unwrap(), "one");
    }
}
