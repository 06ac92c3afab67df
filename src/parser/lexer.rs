//! Lexers for the template language using logos
//!
//! Lexing happens in two layers. [`Segment`] splits raw template source into
//! literal text, `{{ ... }}` variable tags and `{% ... %}` block tags. The
//! inside of each tag is then lexed with [`Token`].

use logos::Logos;

/// Byte range in source text
pub type Span = std::ops::Range<usize>;

/// Top-level pieces of a template source
#[derive(Logos, Debug, Clone, PartialEq)]
pub enum Segment {
    /// `{{ expr }}`, holding the text between the delimiters
    #[regex(r"\{\{([^}]|\}[^}])*\}\}", |lex| strip_delimiters(lex.slice()))]
    Variable(String),

    /// `{% tag ... %}`, holding the text between the delimiters
    #[regex(r"\{%([^%]|%[^}])*%\}", |lex| strip_delimiters(lex.slice()))]
    Tag(String),

    /// `{# ... #}` (skip)
    #[regex(r"\{#([^#]|#[^}])*#\}", logos::skip)]
    Comment,

    /// Literal text. A lone `{` that opens no tag is text as well.
    #[regex(r"[^{]+", |lex| lex.slice().to_string())]
    #[token("{", |lex| lex.slice().to_string())]
    Text(String),
}

/// Width of `{{`, `{%` and their closing counterparts
pub const DELIMITER_WIDTH: usize = 2;

fn strip_delimiters(slice: &str) -> String {
    slice[DELIMITER_WIDTH..slice.len() - DELIMITER_WIDTH].to_string()
}

/// Tokens found inside `{{ ... }}` and `{% ... %}`
///
/// Tag names and tag options (`include_`, `for`, `in`, `only`, ...) lex as
/// [`Token::Ident`] and only mean something in tag position, so they stay
/// usable as variable names. The boolean operators are reserved everywhere.
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\n\r]+")]
pub enum Token {
    // Boolean operators
    #[token("not")]
    Not,
    #[token("and")]
    And,
    #[token("or")]
    Or,

    // Constants
    #[token("True")]
    True,
    #[token("False")]
    False,
    #[token("None")]
    NoneLiteral,

    // Comparison operators (longer first)
    #[token("==")]
    EqEq,
    #[token("!=")]
    NotEq,
    #[token("=")]
    Equals,

    // Filters and lookups
    #[token("|")]
    Pipe,
    #[token(":")]
    Colon,
    #[token(".")]
    Dot,

    // Literals - identifiers must come after keywords
    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*", |lex| lex.slice().to_string(), priority = 1)]
    Ident(String),

    #[regex(r#""([^"\\]|\\.)*""#, |lex| unquote(lex.slice()))]
    #[regex(r#"'([^'\\]|\\.)*'"#, |lex| unquote(lex.slice()))]
    String(String),

    #[regex(r"-?[0-9]+", |lex| lex.slice().parse::<i64>().ok())]
    Integer(i64),

    #[regex(r"-?[0-9]+\.[0-9]+", |lex| lex.slice().parse::<f64>().ok())]
    Float(f64),
}

impl Token {
    /// The keyword text for reserved words, `None` for everything else
    pub fn keyword(&self) -> Option<&'static str> {
        let kw = match self {
            Token::Not => "not",
            Token::And => "and",
            Token::Or => "or",
            _ => return None,
        };
        Some(kw)
    }
}

/// Strip the surrounding quotes of a string literal and resolve escapes
fn unquote(slice: &str) -> String {
    let inner = &slice[1..slice.len() - 1];
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

/// Split template source into segments with spans
///
/// Adjacent text pieces are merged, so a stray `{` does not fragment the
/// surrounding text. A delimiter that is never closed is kept as text.
pub fn lex_segments(input: &str) -> Vec<(Segment, Span)> {
    let mut segments: Vec<(Segment, Span)> = Vec::new();
    let mut pos = 0;
    'relex: while pos < input.len() {
        for (seg, span) in Segment::lexer(&input[pos..]).spanned() {
            let span = span.start + pos..span.end + pos;
            match seg {
                Ok(seg) => push_segment(&mut segments, seg, span),
                Err(()) => {
                    // Unclosed `{{`, `{%` or `{#`: its opening brace is text
                    let end = span.start
                        + input[span.start..]
                            .chars()
                            .next()
                            .map_or(1, char::len_utf8);
                    let brace = Segment::Text(input[span.start..end].to_string());
                    push_segment(&mut segments, brace, span.start..end);
                    pos = end;
                    continue 'relex;
                }
            }
        }
        break;
    }
    segments
}

fn push_segment(segments: &mut Vec<(Segment, Span)>, seg: Segment, span: Span) {
    let contiguous_text = matches!(
        (&seg, segments.last()),
        (Segment::Text(_), Some((Segment::Text(_), prev))) if prev.end == span.start
    );
    if contiguous_text {
        if let (Segment::Text(next), Some((Segment::Text(prev), prev_span))) =
            (seg, segments.last_mut())
        {
            prev.push_str(&next);
            prev_span.end = span.end;
        }
        return;
    }
    segments.push((seg, span));
}

/// Lex the inside of a tag, shifting spans by `offset`
///
/// Returns the span of the first unrecognised character on failure.
pub fn lex(input: &str, offset: usize) -> Result<Vec<(Token, Span)>, Span> {
    Token::lexer(input)
        .spanned()
        .map(|(tok, span)| {
            let span = span.start + offset..span.end + offset;
            match tok {
                Ok(t) => Ok((t, span)),
                Err(()) => Err(span),
            }
        })
        .collect()
}
