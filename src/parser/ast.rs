//! Abstract Syntax Tree types for the template language

/// Byte range in source text
pub type Span = std::ops::Range<usize>;

/// AST node with source location
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned<T> {
    pub node: T,
    pub span: Span,
}

impl<T> Spanned<T> {
    pub fn new(node: T, span: Span) -> Self {
        Self { node, span }
    }
}

/// Valid identifier (alphanumeric + underscore, starts with letter/_)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identifier(pub String);

impl Identifier {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Identifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A compiled template
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    /// Name the template was loaded under, `None` for templates built from strings
    pub name: Option<String>,
    pub nodes: Vec<Spanned<Node>>,
}

impl Template {
    /// Display name used in logs and errors
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("<string>")
    }
}

/// A piece of a template
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// Literal text, copied verbatim
    Text(String),
    /// Variable output: `{{ expr }}`
    Output(FilterExpr),
    /// `{% include %}` or `{% include_ %}`
    Include(IncludeNode),
    /// `{% if %} ... {% else %} ... {% endif %}`
    If {
        condition: Condition,
        then_branch: Vec<Spanned<Node>>,
        else_branch: Option<Vec<Spanned<Node>>>,
    },
    /// `{% for x in xs %} ... {% empty %} ... {% endfor %}`
    For {
        var: Spanned<Identifier>,
        iterable: FilterExpr,
        body: Vec<Spanned<Node>>,
        empty: Option<Vec<Spanned<Node>>>,
    },
    /// `{% with a=b %} ... {% endwith %}`
    With {
        bindings: Vec<Binding>,
        body: Vec<Spanned<Node>>,
    },
}

/// Constant value written in a template
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    String(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
    None,
}

/// Dotted variable lookup: `user.address.city`, `items.0`
#[derive(Debug, Clone, PartialEq)]
pub struct Lookup {
    pub segments: Vec<String>,
}

impl Lookup {
    /// The first segment, looked up in the context
    pub fn root(&self) -> &str {
        &self.segments[0]
    }

    /// Dotted form, as written in the template
    pub fn dotted(&self) -> String {
        self.segments.join(".")
    }
}

/// Base value of an expression
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Literal(Literal),
    Variable(Lookup),
}

/// `|name` or `|name:arg`
#[derive(Debug, Clone, PartialEq)]
pub struct FilterCall {
    pub name: Spanned<String>,
    pub arg: Option<Spanned<Operand>>,
}

/// An operand followed by a chain of filters: `name|lower|default:"x"`
#[derive(Debug, Clone, PartialEq)]
pub struct FilterExpr {
    pub base: Spanned<Operand>,
    pub filters: Vec<FilterCall>,
}

impl FilterExpr {
    /// The string literal this expression consists of, if it is nothing else
    pub fn as_string_literal(&self) -> Option<&str> {
        match &self.base.node {
            Operand::Literal(Literal::String(s)) if self.filters.is_empty() => Some(s),
            _ => None,
        }
    }
}

/// Comparison operators usable in `{% if %}`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    NotEq,
}

/// Condition of an `{% if %}` tag
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Expr(FilterExpr),
    Compare {
        left: FilterExpr,
        op: CompareOp,
        right: FilterExpr,
    },
    Not(Box<Condition>),
    And(Box<Condition>, Box<Condition>),
    Or(Box<Condition>, Box<Condition>),
}

/// `name=expr` binding used by `with` clauses
#[derive(Debug, Clone, PartialEq)]
pub struct Binding {
    pub name: Spanned<Identifier>,
    pub value: FilterExpr,
}

/// A template name that may embed placeholders, e.g. `sub_{{ kind }}.html`
///
/// Built once when the enclosing template is compiled and shared by every
/// render of it.
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateReference {
    /// Literal reference text
    pub text: String,
    /// The reference text compiled as a template of its own
    pub compiled: Template,
}

/// What an include tag renders
#[derive(Debug, Clone, PartialEq)]
pub enum IncludeTarget {
    /// Plain include: a literal name, or an expression yielding a name or template
    Static(FilterExpr),
    /// `include_` with placeholders in the name and an optional fallback name
    ///
    /// `filters` run on the rendered name before it is looked up.
    Dynamic {
        reference: TemplateReference,
        filters: Vec<FilterCall>,
        fallback: Option<Spanned<String>>,
    },
}

/// An include tag
#[derive(Debug, Clone, PartialEq)]
pub struct IncludeNode {
    pub target: IncludeTarget,
    /// Extra bindings from `with a=b`
    pub extra_context: Vec<Binding>,
    /// `only`: render in a context holding nothing but the extra bindings
    pub isolated: bool,
}
