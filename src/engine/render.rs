//! One render pass: walks compiled nodes against a context
//!
//! A [`Renderer`] lives for exactly one call to [`Engine::render`] or
//! [`Engine::render_template`]. It owns the templates resolved by name during
//! that pass, so the same name is loaded at most once per pass and never
//! shared with the next one.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tracing::{debug, trace};

use super::{Engine, EvalError, TemplateError};
use crate::context::{Context, Value};
use crate::filters::{self, MARKS_SAFE};
use crate::parser::{
    Binding, CompareOp, Condition, FilterCall, FilterExpr, Literal, Lookup, Node, Operand, Spanned,
    Template,
};

/// How an unbound variable at the base of an expression is treated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Undefined {
    /// Error, or empty text when strict variables are off
    Strict,
    /// Null, as in `{% if %}` conditions
    Null,
}

/// An evaluated expression and whether its text may skip autoescaping
#[derive(Debug, Clone)]
pub(super) struct Evaluated {
    pub value: Value,
    pub safe: bool,
}

pub(super) struct Renderer<'e> {
    pub(super) engine: &'e Engine,
    /// Templates loaded by name during this pass
    pub(super) cache: HashMap<String, Arc<Template>>,
    /// Current include nesting
    pub(super) depth: usize,
    pub(super) autoescape: bool,
}

impl<'e> Renderer<'e> {
    pub fn new(engine: &'e Engine) -> Self {
        Self {
            engine,
            cache: HashMap::new(),
            depth: 0,
            autoescape: engine.config().autoescape,
        }
    }

    /// Render a whole template into a fresh string
    pub fn render(&mut self, template: &Template, ctx: &mut Context) -> Result<String, TemplateError> {
        let mut out = String::new();
        self.render_nodes(&template.nodes, ctx, &mut out)?;
        Ok(out)
    }

    /// Load a template by name, through the per-pass cache
    pub fn load(&mut self, name: &str) -> Result<Arc<Template>, TemplateError> {
        if let Some(template) = self.cache.get(name) {
            trace!(name, "template cache hit");
            return Ok(Arc::clone(template));
        }
        let template = self.engine.get_template(name)?;
        self.cache.insert(name.to_string(), Arc::clone(&template));
        Ok(template)
    }

    pub fn render_nodes(
        &mut self,
        nodes: &[Spanned<Node>],
        ctx: &mut Context,
        out: &mut String,
    ) -> Result<(), TemplateError> {
        for node in nodes {
            self.render_node(&node.node, ctx, out)?;
        }
        Ok(())
    }

    fn render_node(&mut self, node: &Node, ctx: &mut Context, out: &mut String) -> Result<(), TemplateError> {
        match node {
            Node::Text(text) => out.push_str(text),
            Node::Output(expr) => {
                let evaluated = self.eval_expr(expr, ctx, Undefined::Strict)?;
                let text = evaluated.value.to_string();
                if self.autoescape && !evaluated.safe {
                    out.push_str(&filters::escape_html(&text));
                } else {
                    out.push_str(&text);
                }
            }
            Node::Include(include) => self.render_include(include, ctx, out)?,
            Node::If {
                condition,
                then_branch,
                else_branch,
            } => {
                if self.eval_condition(condition, ctx)? {
                    self.render_nodes(then_branch, ctx, out)?;
                } else if let Some(else_branch) = else_branch {
                    self.render_nodes(else_branch, ctx, out)?;
                }
            }
            Node::For {
                var,
                iterable,
                body,
                empty,
            } => {
                let value = self.eval_expr(iterable, ctx, Undefined::Strict)?.value;
                let items = match value {
                    Value::Null => Vec::new(),
                    other => other.iter_items().ok_or_else(|| EvalError::NotIterable {
                        name: describe_expr(iterable),
                        type_name: other.type_name(),
                    })?,
                };

                if items.is_empty() {
                    if let Some(empty) = empty {
                        self.render_nodes(empty, ctx, out)?;
                    }
                    return Ok(());
                }

                let count = items.len();
                for (i, item) in items.into_iter().enumerate() {
                    let scope = HashMap::from([
                        (var.node.to_string(), item),
                        ("forloop".to_string(), forloop(i, count)),
                    ]);
                    ctx.scoped(scope, |ctx| self.render_nodes(body, ctx, out))?;
                }
            }
            Node::With { bindings, body } => {
                let scope = self.eval_bindings(bindings, ctx)?;
                ctx.scoped(scope, |ctx| self.render_nodes(body, ctx, out))?;
            }
        }
        Ok(())
    }

    /// Evaluate `name=expr` bindings against the current context
    pub fn eval_bindings(
        &self,
        bindings: &[Binding],
        ctx: &Context,
    ) -> Result<HashMap<String, Value>, EvalError> {
        bindings
            .iter()
            .map(|b| {
                let value = self.eval_expr(&b.value, ctx, Undefined::Strict)?.value;
                Ok((b.name.node.to_string(), value))
            })
            .collect()
    }

    /// Evaluate an expression the way `{{ }}` output does
    pub fn eval_output(&self, expr: &FilterExpr, ctx: &Context) -> Result<Evaluated, EvalError> {
        self.eval_expr(expr, ctx, Undefined::Strict)
    }

    fn eval_expr(
        &self,
        expr: &FilterExpr,
        ctx: &Context,
        undefined: Undefined,
    ) -> Result<Evaluated, EvalError> {
        // `x|default:"y"` is how templates test for a missing value
        let tolerates_missing = expr
            .filters
            .first()
            .is_some_and(|f| matches!(f.name.node.as_str(), "default" | "default_if_none"));

        let (value, safe) = match &expr.base.node {
            Operand::Literal(lit) => (literal_value(lit), matches!(lit, Literal::String(_))),
            Operand::Variable(lookup) => match resolve_lookup(lookup, ctx) {
                Some(value) => (value, false),
                None if tolerates_missing || undefined == Undefined::Null => (Value::Null, false),
                None => (self.missing(lookup)?, false),
            },
        };

        self.apply_filters(&expr.filters, Evaluated { value, safe }, ctx)
    }

    /// Run a filter chain, tracking whether the result may skip autoescaping
    pub(super) fn apply_filters(
        &self,
        calls: &[FilterCall],
        input: Evaluated,
        ctx: &Context,
    ) -> Result<Evaluated, EvalError> {
        let Evaluated { mut value, mut safe } = input;
        for call in calls {
            let arg = match &call.arg {
                Some(arg) => Some(self.eval_operand(&arg.node, ctx)?),
                None => None,
            };
            let name = call.name.node.as_str();
            // A replacement takes its safety from the argument
            let replaced = match name {
                "default" => !value.is_truthy(),
                "default_if_none" => matches!(value, Value::Null),
                _ => false,
            };
            value = filters::apply(name, value, arg.as_ref())?;
            safe = if replaced {
                call.arg
                    .as_ref()
                    .is_some_and(|arg| matches!(arg.node, Operand::Literal(Literal::String(_))))
            } else if matches!(name, "default" | "default_if_none") {
                safe
            } else {
                MARKS_SAFE.contains(&name)
            };
        }

        Ok(Evaluated { value, safe })
    }

    fn eval_operand(&self, operand: &Operand, ctx: &Context) -> Result<Value, EvalError> {
        match operand {
            Operand::Literal(lit) => Ok(literal_value(lit)),
            Operand::Variable(lookup) => match resolve_lookup(lookup, ctx) {
                Some(value) => Ok(value),
                None => self.missing(lookup),
            },
        }
    }

    /// Value used for an unbound variable outside of conditions
    fn missing(&self, lookup: &Lookup) -> Result<Value, EvalError> {
        if self.engine.config().strict_variables {
            Err(EvalError::UndefinedVariable {
                name: lookup.dotted(),
            })
        } else {
            debug!(name = %lookup.dotted(), "undefined variable rendered as empty");
            Ok(Value::String(String::new()))
        }
    }

    /// Evaluate an `{% if %}` condition; unbound variables are falsy
    fn eval_condition(&self, condition: &Condition, ctx: &Context) -> Result<bool, EvalError> {
        Ok(match condition {
            Condition::Expr(expr) => self.eval_expr(expr, ctx, Undefined::Null)?.value.is_truthy(),
            Condition::Compare { left, op, right } => {
                let left = self.eval_expr(left, ctx, Undefined::Null)?.value;
                let right = self.eval_expr(right, ctx, Undefined::Null)?.value;
                match op {
                    CompareOp::Eq => left.loose_eq(&right),
                    CompareOp::NotEq => !left.loose_eq(&right),
                }
            }
            Condition::Not(inner) => !self.eval_condition(inner, ctx)?,
            Condition::And(a, b) => self.eval_condition(a, ctx)? && self.eval_condition(b, ctx)?,
            Condition::Or(a, b) => self.eval_condition(a, ctx)? || self.eval_condition(b, ctx)?,
        })
    }
}

fn literal_value(lit: &Literal) -> Value {
    match lit {
        Literal::String(s) => Value::String(s.clone()),
        Literal::Integer(n) => Value::Integer(*n),
        Literal::Float(x) => Value::Float(*x),
        Literal::Bool(b) => Value::Bool(*b),
        Literal::None => Value::Null,
    }
}

/// Follow a dotted lookup; `None` if any segment is unbound
fn resolve_lookup(lookup: &Lookup, ctx: &Context) -> Option<Value> {
    let mut current = ctx.get(lookup.root())?;
    for segment in &lookup.segments[1..] {
        current = current.get(segment)?;
    }
    Some(current.clone())
}

/// `forloop` variable of iteration `i` out of `count`
fn forloop(i: usize, count: usize) -> Value {
    let int = |n: usize| Value::Integer(n as i64);
    Value::Map(BTreeMap::from([
        ("counter".to_string(), int(i + 1)),
        ("counter0".to_string(), int(i)),
        ("revcounter".to_string(), int(count - i)),
        ("revcounter0".to_string(), int(count - i - 1)),
        ("first".to_string(), Value::Bool(i == 0)),
        ("last".to_string(), Value::Bool(i + 1 == count)),
    ]))
}

fn describe_expr(expr: &FilterExpr) -> String {
    match &expr.base.node {
        Operand::Variable(lookup) => lookup.dotted(),
        Operand::Literal(lit) => format!("{:?}", lit),
    }
}
