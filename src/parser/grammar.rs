//! Parser implementation using chumsky
//!
//! Parsing runs in three steps:
//! 1. the segment lexer splits source into text, `{{ }}` and `{% %}` pieces;
//! 2. the inside of each tag is lexed and parsed into an [`Item`];
//! 3. the flat item list is parsed into a tree of [`Node`]s, pairing
//!    `if`/`endif`, `for`/`endfor` and `with`/`endwith`.

use chumsky::input::{Stream, ValueInput};
use chumsky::prelude::*;

use crate::error::ParseError;
use crate::filters::{arity as filter_arity, FilterArity};
use crate::parser::ast::*;
use crate::parser::lexer::{self, Segment, Token, DELIMITER_WIDTH};
use crate::parser::paths::resolve_relative;

/// Words that may open a `{% ... %}` tag
const TAG_NAMES: &[&str] = &[
    "include", "include_", "if", "else", "endif", "for", "empty", "endfor", "with", "endwith",
];

/// A single text run or tag, as seen by the tree parser
#[derive(Debug, Clone, PartialEq)]
enum Item {
    Text(String),
    Output(FilterExpr),
    Include(IncludeNode),
    If(Condition),
    Else,
    EndIf,
    For {
        var: Spanned<Identifier>,
        iterable: FilterExpr,
    },
    Empty,
    EndFor,
    With(Vec<Binding>),
    EndWith,
}

/// Options following the target of an include tag, validated by [`build_include`]
#[derive(Debug, Clone)]
enum IncludeOption {
    Fallback(Option<Spanned<String>>),
    With(Option<Vec<Binding>>),
    Only,
}

/// Result of parsing the contents of a `{% ... %}` tag
#[derive(Debug, Clone)]
enum Tag {
    Include {
        dynamic: bool,
        target: FilterExpr,
        options: Vec<Spanned<IncludeOption>>,
    },
    Other(Item),
}

/// Parse template source into a template without a name
pub fn parse(input: &str) -> Result<Template, Vec<ParseError>> {
    parse_named(input, None)
}

/// Parse template source loaded under `name`
///
/// The name anchors relative include paths such as `./part.html`.
pub fn parse_named(input: &str, name: Option<&str>) -> Result<Template, Vec<ParseError>> {
    let mut items = Vec::new();
    let mut errors = Vec::new();

    for (segment, span) in lexer::lex_segments(input) {
        let inner_start = span.start + DELIMITER_WIDTH;
        let item = match segment {
            Segment::Text(text) => Ok(Item::Text(text)),
            Segment::Variable(inner) => parse_variable_tag(&inner, inner_start),
            Segment::Tag(inner) => parse_block_tag(&inner, inner_start, name),
            Segment::Comment => continue,
        };
        match item {
            Ok(item) => items.push((item, span)),
            Err(errs) => errors.extend(errs),
        }
    }

    if !errors.is_empty() {
        return Err(errors);
    }

    let len = input.len();
    let item_stream = Stream::from_iter(items.into_iter().map(|(item, span)| (item, span.into())))
        .map((len..len).into(), |(t, s): (_, _)| (t, s));

    let nodes = tree_parser()
        .then_ignore(end())
        .parse(item_stream)
        .into_result()
        .map_err(|errs| {
            errs.into_iter()
                .map(|e| ParseError::from_rich(e, describe_item, "end of template"))
                .collect::<Vec<_>>()
        })?;

    Ok(Template {
        name: name.map(str::to_string),
        nodes,
    })
}

/// Lex the inside of a tag into a spanned token list
fn tag_tokens(inner: &str, offset: usize) -> Result<Vec<(Token, SimpleSpan)>, Vec<ParseError>> {
    let tokens = lexer::lex(inner, offset)
        .map_err(|span| vec![ParseError::syntax(span, "Unexpected character in tag")])?;
    Ok(tokens
        .into_iter()
        .map(|(tok, span)| (tok, span.into()))
        .collect())
}

fn parse_variable_tag(inner: &str, offset: usize) -> Result<Item, Vec<ParseError>> {
    if inner.trim().is_empty() {
        return Err(vec![ParseError::syntax(
            offset - DELIMITER_WIDTH..offset + inner.len() + DELIMITER_WIDTH,
            "Empty variable tag",
        )]);
    }

    let eoi = offset + inner.len();
    let token_stream = Stream::from_iter(tag_tokens(inner, offset)?.into_iter())
        .map((eoi..eoi).into(), |(t, s): (_, _)| (t, s));

    let expr = filter_expr_parser()
        .then_ignore(end())
        .parse(token_stream)
        .into_result()
        .map_err(|errs| errs.into_iter().map(ParseError::from).collect::<Vec<_>>())?;

    let mut errors = Vec::new();
    check_filters(&expr, &mut errors);
    if errors.is_empty() {
        Ok(Item::Output(expr))
    } else {
        Err(errors)
    }
}

fn parse_block_tag(inner: &str, offset: usize, origin: Option<&str>) -> Result<Item, Vec<ParseError>> {
    let tag_span = offset - DELIMITER_WIDTH..offset + inner.len() + DELIMITER_WIDTH;
    let tokens = tag_tokens(inner, offset)?;

    match tokens.first() {
        None => return Err(vec![ParseError::syntax(tag_span, "Empty block tag")]),
        Some((Token::Ident(name), span)) if !TAG_NAMES.contains(&name.as_str()) => {
            return Err(vec![ParseError::syntax(
                span.into_range(),
                format!("Invalid block tag '{}'", name),
            )])
        }
        Some(_) => {}
    }

    let eoi = offset + inner.len();
    let token_stream =
        Stream::from_iter(tokens.into_iter()).map((eoi..eoi).into(), |(t, s): (_, _)| (t, s));

    let tag = tag_parser()
        .parse(token_stream)
        .into_result()
        .map_err(|errs| errs.into_iter().map(ParseError::from).collect::<Vec<_>>())?;

    let item = match tag {
        Tag::Include {
            dynamic,
            target,
            options,
        } => Item::Include(build_include(dynamic, target, options, origin).map_err(|e| vec![e])?),
        Tag::Other(item) => item,
    };

    let mut errors = Vec::new();
    check_item_filters(&item, &mut errors);
    if errors.is_empty() {
        Ok(item)
    } else {
        Err(errors)
    }
}

fn check_filters(expr: &FilterExpr, errors: &mut Vec<ParseError>) {
    check_filter_calls(&expr.filters, errors);
}

/// Report unknown filters and filters called with the wrong number of arguments
fn check_filter_calls(filters: &[FilterCall], errors: &mut Vec<ParseError>) {
    for call in filters {
        let stop = call
            .arg
            .as_ref()
            .map(|arg| arg.span.end)
            .unwrap_or(call.name.span.end);
        let span = call.name.span.start..stop;
        let name = &call.name.node;
        let message = match filter_arity(name) {
            None => format!("Unknown filter '{}'", name),
            Some(FilterArity::Required) if call.arg.is_none() => {
                format!("Filter '{}' requires an argument", name)
            }
            Some(FilterArity::NoArg) if call.arg.is_some() => {
                format!("Filter '{}' does not take an argument", name)
            }
            _ => continue,
        };
        errors.push(ParseError::syntax(span, message));
    }
}

fn check_condition_filters(condition: &Condition, errors: &mut Vec<ParseError>) {
    match condition {
        Condition::Expr(expr) => check_filters(expr, errors),
        Condition::Compare { left, right, .. } => {
            check_filters(left, errors);
            check_filters(right, errors);
        }
        Condition::Not(inner) => check_condition_filters(inner, errors),
        Condition::And(a, b) | Condition::Or(a, b) => {
            check_condition_filters(a, errors);
            check_condition_filters(b, errors);
        }
    }
}

fn check_item_filters(item: &Item, errors: &mut Vec<ParseError>) {
    let check_bindings = |bindings: &[Binding], errors: &mut Vec<ParseError>| {
        for binding in bindings {
            check_filters(&binding.value, errors);
        }
    };
    match item {
        Item::Output(expr) => check_filters(expr, errors),
        Item::If(condition) => check_condition_filters(condition, errors),
        Item::For { iterable, .. } => check_filters(iterable, errors),
        Item::With(bindings) => check_bindings(bindings, errors),
        Item::Include(include) => {
            match &include.target {
                IncludeTarget::Static(expr) => check_filters(expr, errors),
                IncludeTarget::Dynamic { filters, .. } => check_filter_calls(filters, errors),
            }
            check_bindings(&include.extra_context, errors);
        }
        _ => {}
    }
}

/// Helper to extract span range from chumsky's MapExtra
fn span_range(e: &impl chumsky::span::Span<Offset = usize>) -> std::ops::Range<usize> {
    e.start()..e.end()
}

/// `operand|filter|filter:arg`
fn filter_expr_parser<'a, I>() -> impl Parser<'a, I, FilterExpr, extra::Err<Rich<'a, Token>>> + Clone
where
    I: ValueInput<'a, Token = Token, Span = SimpleSpan>,
{
    let literal = select! {
        Token::String(s) => Literal::String(s),
        Token::Integer(n) => Literal::Integer(n),
        Token::Float(x) => Literal::Float(x),
        Token::True => Literal::Bool(true),
        Token::False => Literal::Bool(false),
        Token::NoneLiteral => Literal::None,
    };

    // Segments after a dot: keys or list indices
    let segment = select! {
        Token::Ident(s) => s,
        Token::Integer(n) if n >= 0 => n.to_string(),
    };

    let variable = select! { Token::Ident(s) => s }
        .then(
            just(Token::Dot)
                .ignore_then(segment)
                .repeated()
                .collect::<Vec<_>>(),
        )
        .map(|(root, rest)| {
            let mut segments = vec![root];
            segments.extend(rest);
            Lookup { segments }
        });

    let operand = choice((
        literal.map(Operand::Literal),
        variable.map(Operand::Variable),
    ))
    .map_with(|op, e| Spanned::new(op, span_range(&e.span())));

    let filter_name =
        select! { Token::Ident(s) => s }.map_with(|s, e| Spanned::new(s, span_range(&e.span())));

    // Names and arity are checked after parsing so errors point at the call
    let filter_call = just(Token::Pipe)
        .ignore_then(filter_name)
        .then(just(Token::Colon).ignore_then(operand.clone()).or_not())
        .map(|(name, arg)| FilterCall { name, arg });

    operand
        .then(filter_call.repeated().collect::<Vec<_>>())
        .map(|(base, filters)| FilterExpr { base, filters })
        .boxed()
}

/// `{% if %}` condition: `not`, `==`/`!=`, then `and` binding tighter than `or`
fn condition_parser<'a, I>() -> impl Parser<'a, I, Condition, extra::Err<Rich<'a, Token>>> + Clone
where
    I: ValueInput<'a, Token = Token, Span = SimpleSpan>,
{
    let op = choice((
        just(Token::EqEq).to(CompareOp::Eq),
        just(Token::NotEq).to(CompareOp::NotEq),
    ));

    let comparison = filter_expr_parser()
        .then(op.then(filter_expr_parser()).or_not())
        .map(|(left, rhs)| match rhs {
            Some((op, right)) => Condition::Compare { left, op, right },
            None => Condition::Expr(left),
        });

    let negated = just(Token::Not)
        .repeated()
        .collect::<Vec<_>>()
        .then(comparison)
        .map(|(nots, cond)| {
            nots.iter()
                .fold(cond, |inner, _| Condition::Not(Box::new(inner)))
        });

    let conjunction = negated
        .clone()
        .then(
            just(Token::And)
                .ignore_then(negated)
                .repeated()
                .collect::<Vec<_>>(),
        )
        .map(|(first, rest)| {
            rest.into_iter().fold(first, |acc, c| {
                Condition::And(Box::new(acc), Box::new(c))
            })
        });

    conjunction
        .clone()
        .then(
            just(Token::Or)
                .ignore_then(conjunction)
                .repeated()
                .collect::<Vec<_>>(),
        )
        .map(|(first, rest)| {
            rest.into_iter()
                .fold(first, |acc, c| Condition::Or(Box::new(acc), Box::new(c)))
        })
}

/// `name=expr`
fn binding_parser<'a, I>() -> impl Parser<'a, I, Binding, extra::Err<Rich<'a, Token>>> + Clone
where
    I: ValueInput<'a, Token = Token, Span = SimpleSpan>,
{
    select! { Token::Ident(s) => Identifier::new(s) }
        .map_with(|id, e| Spanned::new(id, span_range(&e.span())))
        .then_ignore(just(Token::Equals))
        .then(filter_expr_parser())
        .map(|(name, value)| Binding { name, value })
}

/// A tag word; these are plain identifiers that only count in tag position
fn kw<'a, I>(word: &str) -> impl Parser<'a, I, Token, extra::Err<Rich<'a, Token>>> + Clone
where
    I: ValueInput<'a, Token = Token, Span = SimpleSpan>,
{
    just(Token::Ident(word.to_string()))
}

/// Contents of a `{% ... %}` tag
fn tag_parser<'a, I>() -> impl Parser<'a, I, Tag, extra::Err<Rich<'a, Token>>> + Clone
where
    I: ValueInput<'a, Token = Token, Span = SimpleSpan>,
{
    let identifier = select! { Token::Ident(s) => Identifier::new(s) }
        .map_with(|id, e| Spanned::new(id, span_range(&e.span())));

    let string_literal = select! { Token::String(s) => s }
        .map_with(|s, e| Spanned::new(s, span_range(&e.span())));

    let bindings = binding_parser()
        .repeated()
        .at_least(1)
        .collect::<Vec<_>>();

    let include_option = choice((
        kw("fallback")
            .ignore_then(string_literal.or_not())
            .map(IncludeOption::Fallback),
        kw("with")
            .ignore_then(bindings.clone().or_not())
            .map(IncludeOption::With),
        kw("only").to(IncludeOption::Only),
    ))
    .map_with(|opt, e| Spanned::new(opt, span_range(&e.span())));

    let include = choice((
        kw("include").to(false),
        kw("include_").to(true),
    ))
    .then(filter_expr_parser())
    .then(include_option.repeated().collect::<Vec<_>>())
    .map(|((dynamic, target), options)| Tag::Include {
        dynamic,
        target,
        options,
    });

    let if_tag = kw("if")
        .ignore_then(condition_parser())
        .map(Item::If);

    let for_tag = kw("for")
        .ignore_then(identifier)
        .then_ignore(kw("in"))
        .then(filter_expr_parser())
        .map(|(var, iterable)| Item::For { var, iterable });

    let with_tag = kw("with").ignore_then(bindings).map(Item::With);

    let other = choice((
        if_tag,
        for_tag,
        with_tag,
        kw("else").to(Item::Else),
        kw("endif").to(Item::EndIf),
        kw("empty").to(Item::Empty),
        kw("endfor").to(Item::EndFor),
        kw("endwith").to(Item::EndWith),
    ))
    .map(Tag::Other);

    choice((include, other)).then_ignore(end())
}

/// Validate include options and decide between static and dynamic inclusion
///
/// `include_` only differs from `include` when its name is a string literal
/// containing `{{`; otherwise it is a plain include, and a fallback is refused.
fn build_include(
    dynamic: bool,
    mut target: FilterExpr,
    options: Vec<Spanned<IncludeOption>>,
    origin: Option<&str>,
) -> Result<IncludeNode, ParseError> {
    let mut fallback: Option<Spanned<String>> = None;
    let mut extra_context: Option<Vec<Binding>> = None;
    let mut isolated = false;

    for option in options {
        let duplicate = |what: &str| {
            ParseError::syntax(
                option.span.clone(),
                format!("The '{}' option was specified more than once", what),
            )
        };
        match option.node {
            IncludeOption::Fallback(name) => {
                if fallback.is_some() {
                    return Err(duplicate("fallback"));
                }
                let name = name.ok_or_else(|| {
                    ParseError::syntax(
                        option.span.clone(),
                        "'fallback' must be followed by a quoted template name",
                    )
                })?;
                fallback = Some(name);
            }
            IncludeOption::With(bindings) => {
                if extra_context.is_some() {
                    return Err(duplicate("with"));
                }
                let bindings = bindings.ok_or_else(|| {
                    ParseError::syntax(
                        option.span.clone(),
                        "'with' must be followed by at least one name=value binding",
                    )
                })?;
                extra_context = Some(bindings);
            }
            IncludeOption::Only => {
                if isolated {
                    return Err(duplicate("only"));
                }
                isolated = true;
            }
        }
    }

    let target_span = target.base.span.clone();
    // Placeholders in the literal decide; filters after it apply to the resolved name
    let is_dynamic = dynamic
        && matches!(&target.base.node, Operand::Literal(Literal::String(name)) if name.contains("{{"));

    if let Operand::Literal(Literal::String(name)) = &mut target.base.node {
        *name = resolve_relative(origin, name)
            .map_err(|msg| ParseError::syntax(target_span.clone(), msg))?;
    }

    let target = match target.base.node {
        Operand::Literal(Literal::String(text)) if is_dynamic => {
            let compiled = parse(&text).map_err(|errs| match errs.into_iter().next() {
                // Point into the literal, past its opening quote
                Some(first) => {
                    let message = format!("Invalid template reference: {}", first.message());
                    let shifted = first.shifted(target_span.start + 1);
                    ParseError::syntax(shifted.span().clone(), message)
                }
                None => ParseError::syntax(target_span.clone(), "Invalid template reference"),
            })?;
            let fallback = match fallback {
                Some(fb) => {
                    let resolved = resolve_relative(origin, &fb.node)
                        .map_err(|msg| ParseError::syntax(fb.span.clone(), msg))?;
                    Some(Spanned::new(resolved, fb.span))
                }
                None => None,
            };
            IncludeTarget::Dynamic {
                reference: TemplateReference { text, compiled },
                filters: target.filters,
                fallback,
            }
        }
        base => {
            if let Some(fb) = fallback {
                return Err(ParseError::syntax(
                    fb.span,
                    "'fallback' is only supported by include_ with a template name containing placeholders",
                ));
            }
            IncludeTarget::Static(FilterExpr {
                base: Spanned::new(base, target_span),
                filters: target.filters,
            })
        }
    };

    Ok(IncludeNode {
        target,
        extra_context: extra_context.unwrap_or_default(),
        isolated,
    })
}

/// Pair block tags into a node tree
fn tree_parser<'a, I>() -> impl Parser<'a, I, Vec<Spanned<Node>>, extra::Err<Rich<'a, Item>>> + Clone
where
    I: ValueInput<'a, Token = Item, Span = SimpleSpan>,
{
    recursive(|nodes| {
        let leaf = select! {
            Item::Text(text) => Node::Text(text),
            Item::Output(expr) => Node::Output(expr),
            Item::Include(include) => Node::Include(include),
        };

        let if_block = select! { Item::If(condition) => condition }
            .then(nodes.clone())
            .then(just(Item::Else).ignore_then(nodes.clone()).or_not())
            .then_ignore(just(Item::EndIf))
            .map(|((condition, then_branch), else_branch)| Node::If {
                condition,
                then_branch,
                else_branch,
            });

        let for_block = select! { Item::For { var, iterable } => (var, iterable) }
            .then(nodes.clone())
            .then(just(Item::Empty).ignore_then(nodes.clone()).or_not())
            .then_ignore(just(Item::EndFor))
            .map(|(((var, iterable), body), empty)| Node::For {
                var,
                iterable,
                body,
                empty,
            });

        let with_block = select! { Item::With(bindings) => bindings }
            .then(nodes)
            .then_ignore(just(Item::EndWith))
            .map(|(bindings, body)| Node::With { bindings, body });

        choice((leaf, if_block, for_block, with_block))
            .map_with(|node, e| Spanned::new(node, span_range(&e.span())))
            .repeated()
            .collect::<Vec<_>>()
            .boxed()
    })
}

/// Format an item for human-readable error messages
fn describe_item(item: &Item) -> String {
    match item {
        Item::Text(_) => "text".to_string(),
        Item::Output(_) => "variable tag".to_string(),
        Item::Include(_) => "'include' tag".to_string(),
        Item::If(_) => "'if' tag".to_string(),
        Item::Else => "'{% else %}'".to_string(),
        Item::EndIf => "'{% endif %}'".to_string(),
        Item::For { .. } => "'for' tag".to_string(),
        Item::Empty => "'{% empty %}'".to_string(),
        Item::EndFor => "'{% endfor %}'".to_string(),
        Item::With(_) => "'with' tag".to_string(),
        Item::EndWith => "'{% endwith %}'".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn single(input: &str) -> Node {
        let tpl = parse(input).expect("Should parse");
        assert_eq!(tpl.nodes.len(), 1, "expected one node in {:?}", tpl.nodes);
        tpl.nodes.into_iter().next().unwrap().node
    }

    fn first_error(input: &str) -> String {
        let errs = parse(input).expect_err("Should fail");
        errs[0].message().to_string()
    }

    fn include(input: &str) -> IncludeNode {
        match single(input) {
            Node::Include(inc) => inc,
            other => panic!("Expected include, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_plain_text() {
        assert_eq!(single("hello"), Node::Text("hello".to_string()));
    }

    #[test]
    fn test_parse_variable_with_filters() {
        match single("{{ user.name|lower|default:'anon' }}") {
            Node::Output(expr) => {
                assert_eq!(
                    expr.base.node,
                    Operand::Variable(Lookup {
                        segments: vec!["user".to_string(), "name".to_string()]
                    })
                );
                assert_eq!(expr.filters.len(), 2);
                assert_eq!(expr.filters[0].name.node, "lower");
                assert_eq!(expr.filters[1].name.node, "default");
                assert!(matches!(
                    expr.filters[1].arg.as_ref().map(|a| &a.node),
                    Some(Operand::Literal(Literal::String(s))) if s == "anon"
                ));
            }
            other => panic!("Expected output, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_list_index_lookup() {
        match single("{{ items.0 }}") {
            Node::Output(expr) => assert_eq!(
                expr.base.node,
                Operand::Variable(Lookup {
                    segments: vec!["items".to_string(), "0".to_string()]
                })
            ),
            other => panic!("Expected output, got {:?}", other),
        }
    }

    #[test]
    fn test_node_spans_cover_tags() {
        let tpl = parse("ab{{ x }}").unwrap();
        assert_eq!(tpl.nodes[0].span, 0..2);
        assert_eq!(tpl.nodes[1].span, 2..9);
    }

    #[test]
    fn test_unknown_filter_rejected() {
        assert_eq!(first_error("{{ x|shout }}"), "Unknown filter 'shout'");
    }

    #[test]
    fn test_filter_arity_checked() {
        assert_eq!(
            first_error("{{ x|default }}"),
            "Filter 'default' requires an argument"
        );
        assert_eq!(
            first_error("{{ x|lower:'a' }}"),
            "Filter 'lower' does not take an argument"
        );
    }

    #[test]
    fn test_empty_variable_tag() {
        assert_eq!(first_error("{{ }}"), "Empty variable tag");
    }

    #[test]
    fn test_invalid_block_tag() {
        assert_eq!(first_error("{% block content %}"), "Invalid block tag 'block'");
    }

    #[test]
    fn test_reserved_keyword_as_variable() {
        assert!(first_error("{{ and }}").contains("reserved"));
    }

    #[test]
    fn test_tag_words_usable_as_variables() {
        let tpl = parse("{{ empty }}{{ only|default:fallback }}{% if with %}{% endif %}")
            .expect("Should parse");
        assert_eq!(tpl.nodes.len(), 3);
        assert!(matches!(
            &tpl.nodes[0].node,
            Node::Output(FilterExpr { base: Spanned { node: Operand::Variable(l), .. }, .. })
                if l.dotted() == "empty"
        ));
    }

    #[test]
    fn test_for_over_variable_named_like_tag_word() {
        match single("{% for in in only %}{{ in }}{% endfor %}") {
            Node::For { var, iterable, .. } => {
                assert_eq!(var.node.as_str(), "in");
                assert!(matches!(
                    iterable.base.node,
                    Operand::Variable(ref l) if l.dotted() == "only"
                ));
            }
            other => panic!("Expected for, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_if_else() {
        match single("{% if a and not b %}x{% else %}y{% endif %}") {
            Node::If {
                condition,
                then_branch,
                else_branch,
            } => {
                assert!(matches!(condition, Condition::And(_, ref rhs) if matches!(**rhs, Condition::Not(_))));
                assert_eq!(then_branch.len(), 1);
                assert_eq!(else_branch.map(|b| b.len()), Some(1));
            }
            other => panic!("Expected if, got {:?}", other),
        }
    }

    #[test]
    fn test_or_binds_looser_than_and() {
        match single("{% if a or b and c %}{% endif %}") {
            Node::If { condition, .. } => {
                assert!(matches!(condition, Condition::Or(_, ref rhs) if matches!(**rhs, Condition::And(_, _))));
            }
            other => panic!("Expected if, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_comparison() {
        match single("{% if kind == 'a' %}A{% endif %}") {
            Node::If { condition, .. } => {
                assert!(matches!(condition, Condition::Compare { op: CompareOp::Eq, .. }));
            }
            other => panic!("Expected if, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_nested_for_with_empty() {
        match single("{% for x in xs %}{% if x %}{{ x }}{% endif %}{% empty %}none{% endfor %}") {
            Node::For {
                var, body, empty, ..
            } => {
                assert_eq!(var.node.as_str(), "x");
                assert_eq!(body.len(), 1);
                assert!(matches!(body[0].node, Node::If { .. }));
                assert_eq!(empty.map(|e| e.len()), Some(1));
            }
            other => panic!("Expected for, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_with_block() {
        match single("{% with a=b c='d' %}{{ a }}{% endwith %}") {
            Node::With { bindings, body } => {
                assert_eq!(bindings.len(), 2);
                assert_eq!(bindings[1].name.node.as_str(), "c");
                assert_eq!(body.len(), 1);
            }
            other => panic!("Expected with, got {:?}", other),
        }
    }

    #[test]
    fn test_unclosed_block_rejected() {
        assert!(parse("{% if a %}open").is_err());
        assert!(parse("{% for x in xs %}").is_err());
    }

    #[test]
    fn test_stray_end_tag_rejected() {
        assert!(first_error("text{% endif %}").contains("endif"));
    }

    #[test]
    fn test_static_include() {
        let inc = include(r#"{% include "part.html" %}"#);
        assert!(matches!(
            inc.target,
            IncludeTarget::Static(ref e) if e.as_string_literal() == Some("part.html")
        ));
        assert!(inc.extra_context.is_empty());
        assert!(!inc.isolated);
    }

    #[test]
    fn test_include_with_variable_target() {
        let inc = include("{% include tpl_name %}");
        assert!(matches!(
            inc.target,
            IncludeTarget::Static(FilterExpr { base: Spanned { node: Operand::Variable(_), .. }, .. })
        ));
    }

    #[test]
    fn test_dynamic_include_with_fallback() {
        let inc = include(r#"{% include_ "sub_{{ kind }}.html" fallback "default.html" with a=1 only %}"#);
        match inc.target {
            IncludeTarget::Dynamic {
                reference,
                fallback,
                ..
            } => {
                assert_eq!(reference.text, "sub_{{ kind }}.html");
                assert_eq!(reference.compiled.nodes.len(), 3);
                assert_eq!(fallback.map(|f| f.node), Some("default.html".to_string()));
            }
            other => panic!("Expected dynamic include, got {:?}", other),
        }
        assert_eq!(inc.extra_context.len(), 1);
        assert!(inc.isolated);
    }

    #[test]
    fn test_options_in_any_order() {
        let inc = include(r#"{% include_ "a_{{ x }}.html" only with b=2 fallback "f.html" %}"#);
        assert!(inc.isolated);
        assert!(matches!(
            inc.target,
            IncludeTarget::Dynamic { fallback: Some(_), .. }
        ));
    }

    #[test]
    fn test_filtered_placeholder_reference_stays_dynamic() {
        let inc = include(r#"{% include_ "sub_{{ kind }}.html"|lower fallback "default.html" %}"#);
        match inc.target {
            IncludeTarget::Dynamic {
                reference,
                filters,
                fallback,
            } => {
                assert_eq!(reference.text, "sub_{{ kind }}.html");
                assert_eq!(filters.len(), 1);
                assert_eq!(filters[0].name.node, "lower");
                assert!(fallback.is_some());
            }
            other => panic!("Expected dynamic include, got {:?}", other),
        }
    }

    #[test]
    fn test_filters_on_dynamic_reference_checked() {
        assert_eq!(
            first_error(r#"{% include_ "a_{{ x }}.html"|shout %}"#),
            "Unknown filter 'shout'"
        );
    }

    #[test]
    fn test_placeholder_free_include_underscore_is_static() {
        let inc = include(r#"{% include_ "plain.html" %}"#);
        assert!(matches!(inc.target, IncludeTarget::Static(_)));
    }

    #[test]
    fn test_fallback_requires_name() {
        assert_eq!(
            first_error(r#"{% include_ "a_{{ x }}.html" fallback %}"#),
            "'fallback' must be followed by a quoted template name"
        );
    }

    #[test]
    fn test_fallback_on_static_include_rejected() {
        assert!(first_error(r#"{% include_ "plain.html" fallback "f.html" %}"#)
            .contains("only supported"));
        assert!(first_error(r#"{% include "plain.html" fallback "f.html" %}"#)
            .contains("only supported"));
    }

    #[test]
    fn test_duplicate_options_rejected() {
        assert!(first_error(r#"{% include "a.html" only only %}"#).contains("more than once"));
        assert!(
            first_error(r#"{% include "a.html" with a=1 with b=2 %}"#).contains("more than once")
        );
    }

    #[test]
    fn test_with_requires_bindings() {
        assert!(first_error(r#"{% include "a.html" with only %}"#).contains("binding"));
    }

    #[test]
    fn test_invalid_reference_rejected() {
        assert!(first_error(r#"{% include_ "a_{{ x|nope }}.html" %}"#)
            .contains("Invalid template reference"));
    }

    #[test]
    fn test_relative_names_resolved_against_origin() {
        let tpl = parse_named(
            r#"{% include "./part.html" %}{% include_ "../sub_{{ k }}.html" fallback "./d.html" %}"#,
            Some("pages/deep/index.html"),
        )
        .unwrap();
        match &tpl.nodes[0].node {
            Node::Include(IncludeNode {
                target: IncludeTarget::Static(e),
                ..
            }) => assert_eq!(e.as_string_literal(), Some("pages/deep/part.html")),
            other => panic!("Expected static include, got {:?}", other),
        }
        match &tpl.nodes[1].node {
            Node::Include(IncludeNode {
                target: IncludeTarget::Dynamic { reference, fallback, .. },
                ..
            }) => {
                assert_eq!(reference.text, "pages/sub_{{ k }}.html");
                assert_eq!(
                    fallback.as_ref().map(|f| f.node.as_str()),
                    Some("pages/deep/d.html")
                );
            }
            other => panic!("Expected dynamic include, got {:?}", other),
        }
    }

    #[test]
    fn test_relative_name_outside_root_rejected() {
        let errs = parse_named(r#"{% include "../x.html" %}"#, Some("index.html")).unwrap_err();
        assert!(errs[0].message().contains("points outside"));
    }

    #[test]
    fn test_errors_collected_across_tags() {
        let errs = parse("{{ a|nope }} {{ }} {% bogus %}").unwrap_err();
        assert_eq!(errs.len(), 3);
    }
}
