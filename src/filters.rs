//! Built-in filters applied with `{{ value|filter:arg }}`

use crate::context::Value;
use crate::engine::EvalError;

/// Whether a filter takes an argument
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterArity {
    NoArg,
    Required,
}

/// Filters whose output is already safe for HTML and must not be escaped again
pub const MARKS_SAFE: &[&str] = &["safe", "escape"];

/// Arity of a built-in filter, `None` if no such filter exists
pub fn arity(name: &str) -> Option<FilterArity> {
    let arity = match name {
        "lower" | "upper" | "title" | "capfirst" | "length" | "slugify" | "first" | "last"
        | "safe" | "escape" => FilterArity::NoArg,
        "default" | "default_if_none" | "join" | "add" | "cut" => FilterArity::Required,
        _ => return None,
    };
    Some(arity)
}

/// Apply a built-in filter
pub fn apply(name: &str, value: Value, arg: Option<&Value>) -> Result<Value, EvalError> {
    let out = match name {
        "lower" => Value::String(value.to_string().to_lowercase()),
        "upper" => Value::String(value.to_string().to_uppercase()),
        "title" => Value::String(title(&value.to_string())),
        "capfirst" => Value::String(capfirst(&value.to_string())),
        "length" => Value::Integer(match &value {
            Value::String(s) => s.chars().count() as i64,
            Value::List(items) => items.len() as i64,
            Value::Map(map) => map.len() as i64,
            _ => 0,
        }),
        "slugify" => Value::String(slugify(&value.to_string())),
        "first" => first_or_last(&value, true),
        "last" => first_or_last(&value, false),
        "safe" => value,
        "escape" => Value::String(escape_html(&value.to_string())),
        "default" => {
            if value.is_truthy() {
                value
            } else {
                required(name, arg)?.clone()
            }
        }
        "default_if_none" => match value {
            Value::Null => required(name, arg)?.clone(),
            other => other,
        },
        "join" => join(value, required(name, arg)?)?,
        "add" => add(value, required(name, arg)?),
        "cut" => {
            let needle = required(name, arg)?.to_string();
            Value::String(value.to_string().replace(&needle, ""))
        }
        other => {
            return Err(EvalError::Filter {
                filter: other.to_string(),
                message: "unknown filter".to_string(),
            })
        }
    };
    Ok(out)
}

fn required<'v>(name: &str, arg: Option<&'v Value>) -> Result<&'v Value, EvalError> {
    arg.ok_or_else(|| EvalError::Filter {
        filter: name.to_string(),
        message: "missing argument".to_string(),
    })
}

/// HTML-escape text for output
pub fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}

fn capfirst(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) => c.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn title(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut at_word_start = true;
    for c in s.chars() {
        if c.is_alphanumeric() {
            if at_word_start {
                out.extend(c.to_uppercase());
            } else {
                out.extend(c.to_lowercase());
            }
            at_word_start = false;
        } else {
            out.push(c);
            at_word_start = c != '\'';
        }
    }
    out
}

fn slugify(s: &str) -> String {
    let mut slug = String::with_capacity(s.len());
    let mut pending_dash = false;
    for c in s.trim().chars() {
        if c.is_ascii_alphanumeric() || c == '_' {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c.to_ascii_lowercase());
        } else if c.is_whitespace() || c == '-' {
            pending_dash = true;
        }
    }
    slug
}

fn first_or_last(value: &Value, first: bool) -> Value {
    match value {
        Value::List(items) => {
            let item = if first { items.first() } else { items.last() };
            item.cloned().unwrap_or_else(|| Value::String(String::new()))
        }
        Value::String(s) => {
            let c = if first { s.chars().next() } else { s.chars().last() };
            Value::String(c.map(String::from).unwrap_or_default())
        }
        _ => Value::String(String::new()),
    }
}

fn join(value: Value, sep: &Value) -> Result<Value, EvalError> {
    let Value::String(sep) = sep else {
        return Err(EvalError::Filter {
            filter: "join".to_string(),
            message: format!("separator must be a string, got {}", sep.type_name()),
        });
    };
    match value {
        Value::List(items) => Ok(Value::String(
            items
                .iter()
                .map(|v| v.to_string())
                .collect::<Vec<_>>()
                .join(sep),
        )),
        other => Ok(other),
    }
}

/// Numeric addition, string or list concatenation; empty string when the
/// operands do not combine
fn add(value: Value, arg: &Value) -> Value {
    match (&value, arg) {
        (Value::Integer(a), Value::Integer(b)) => Value::Integer(a.saturating_add(*b)),
        (Value::Float(a), Value::Float(b)) => Value::Float(a + b),
        (Value::Integer(a), Value::Float(b)) | (Value::Float(b), Value::Integer(a)) => {
            Value::Float(*a as f64 + b)
        }
        (Value::List(a), Value::List(b)) => {
            Value::List(a.iter().chain(b.iter()).cloned().collect())
        }
        (Value::String(a), Value::String(b)) => {
            match (a.trim().parse::<i64>(), b.trim().parse::<i64>()) {
                (Ok(x), Ok(y)) => Value::Integer(x.saturating_add(y)),
                _ => Value::String(format!("{}{}", a, b)),
            }
        }
        (Value::String(a), Value::Integer(b)) | (Value::Integer(b), Value::String(a)) => {
            match a.trim().parse::<i64>() {
                Ok(x) => Value::Integer(x.saturating_add(*b)),
                Err(_) => Value::String(String::new()),
            }
        }
        _ => Value::String(String::new()),
    }
}
