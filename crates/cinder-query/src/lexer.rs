//! Query lexer using logos

use cinder_core::{Error, Result};
use logos::{Lexer, Logos};
use num_bigint::BigInt;
use std::ops::Range;

/// Numeric literal as written in the query
#[derive(Debug, Clone, PartialEq)]
pub enum Number {
    Integer(i64),
    /// Integer literal outside the `i64` range
    BigInteger(BigInt),
    Float(f64),
}

/// Query tokens
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n\f]+")]
pub enum Token {
    // Keywords
    #[token("and", |lex| keyword(lex, Token::And))]
    And,

    #[token("or", |lex| keyword(lex, Token::Or))]
    Or,

    #[token("not", |lex| keyword(lex, Token::Not))]
    Not,

    #[token("in", |lex| keyword(lex, Token::In))]
    In,

    #[token("true", |lex| keyword(lex, Token::True))]
    True,

    #[token("false", |lex| keyword(lex, Token::False))]
    False,

    #[token("null", |lex| keyword(lex, Token::Null))]
    Null,

    #[token("with", |lex| keyword(lex, Token::With))]
    With,

    #[token("sort", |lex| keyword(lex, Token::Sort))]
    Sort,

    #[token("limit", |lex| keyword(lex, Token::Limit))]
    Limit,

    // Symbols
    #[token("(")]
    LParen,

    #[token(")")]
    RParen,

    #[token("[")]
    LBracket,

    #[token("]")]
    RBracket,

    #[token("{")]
    LBrace,

    #[token("}")]
    RBrace,

    #[token(":")]
    Colon,

    #[token(",")]
    Comma,

    #[token("..")]
    DoubleDot,

    #[token("+")]
    Plus,

    // Comparison operators
    #[token("==")]
    EqualsEquals,

    #[token("=")]
    Equals,

    #[token("!=")]
    NotEquals,

    #[token("<")]
    LessThan,

    #[token("<=")]
    LessEquals,

    #[token(">")]
    GreaterThan,

    #[token(">=")]
    GreaterEquals,

    #[token("=~")]
    RegexMatch,

    #[token("~")]
    Tilde,

    #[token("!~")]
    RegexNotMatch,

    // Edge traversals
    #[token("-->")]
    ArrowRight,

    #[token("<--")]
    ArrowLeft,

    #[token("--")]
    DoubleDash,

    #[token("->")]
    DashArrowRight,

    #[token("<-")]
    ArrowLeftDash,

    #[token("-")]
    Minus,

    // Literals
    #[regex(r"[0-9]+", lex_number)]
    #[regex(r"\.[0-9]+", lex_fraction)]
    Number(Number),

    #[regex(r#""([^"\\]|\\.)*""#, lex_string)]
    String(String),

    // Identifiers and property paths: a.b[*].c, children[], /metadata.x
    #[regex(r"/?[A-Za-z_][A-Za-z0-9_]*", lex_word)]
    Word(String),
}

fn is_ident_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_'
}

fn is_ident_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// Length of an array marker ([], [*], [3]) at the start of `bytes`
fn array_marker_len(bytes: &[u8]) -> Option<usize> {
    if bytes.first() != Some(&b'[') {
        return None;
    }
    let inner = match bytes.get(1) {
        Some(b'*') => 1,
        _ => bytes[1..].iter().take_while(|b| b.is_ascii_digit()).count(),
    };
    (bytes.get(1 + inner) == Some(&b']')).then_some(inner + 2)
}

/// Length of the array markers and dotted segments continuing a path.
///
/// Only complete segments are counted, so `default[1:]` stays `default`
/// followed by a range.
fn path_tail_len(rest: &[u8]) -> usize {
    let mut len = array_marker_len(rest).unwrap_or(0);
    while rest.get(len) == Some(&b'.') && rest.get(len + 1).is_some_and(|b| is_ident_start(*b)) {
        len += 1 + rest[len + 1..].iter().take_while(|b| is_ident_char(**b)).count();
        len += array_marker_len(&rest[len..]).unwrap_or(0);
    }
    len
}

fn lex_word(lex: &mut Lexer<'_, Token>) -> String {
    let len = path_tail_len(lex.remainder().as_bytes());
    lex.bump(len);
    lex.slice().to_string()
}

/// A keyword followed by dotted segments is a path (`limit.max`, `in.x[*]`).
/// A bare array marker does not count, `in[1]` stays a membership test.
fn keyword(lex: &mut Lexer<'_, Token>, token: Token) -> Token {
    let rest = lex.remainder().as_bytes();
    let len = path_tail_len(rest);
    if len > array_marker_len(rest).unwrap_or(0) {
        lex.bump(len);
        return Token::Word(lex.slice().to_string());
    }
    token
}

/// Length of an exponent suffix (e10, E-3) at the start of `bytes`, or 0
fn exponent_len(bytes: &[u8]) -> usize {
    if !matches!(bytes.first(), Some(b'e' | b'E')) {
        return 0;
    }
    let mut len = 1;
    if matches!(bytes.get(len), Some(b'+' | b'-')) {
        len += 1;
    }
    let digits = bytes[len..].iter().take_while(|b| b.is_ascii_digit()).count();
    if digits == 0 { 0 } else { len + digits }
}

/// Extends an integer literal with an optional fraction and exponent.
///
/// `1.` and `1.5` are floats while `1..5` is a range.
fn lex_number(lex: &mut Lexer<'_, Token>) -> Option<Number> {
    let rest = lex.remainder().as_bytes();
    let mut extra = 0;
    let mut is_float = false;
    if rest.first() == Some(&b'.') && rest.get(1) != Some(&b'.') {
        extra = 1 + rest[1..].iter().take_while(|b| b.is_ascii_digit()).count();
        is_float = true;
    }
    let exponent = exponent_len(&rest[extra..]);
    extra += exponent;
    lex.bump(extra);

    let text = lex.slice();
    if is_float || exponent > 0 {
        text.parse::<f64>().ok().map(Number::Float)
    } else {
        match text.parse::<i64>() {
            Ok(i) => Some(Number::Integer(i)),
            Err(_) => text.parse::<BigInt>().ok().map(Number::BigInteger),
        }
    }
}

fn lex_fraction(lex: &mut Lexer<'_, Token>) -> Option<Number> {
    let exponent = exponent_len(lex.remainder().as_bytes());
    lex.bump(exponent);
    lex.slice().parse::<f64>().ok().map(Number::Float)
}

fn lex_string(lex: &mut Lexer<'_, Token>) -> Option<String> {
    let s = lex.slice();
    unescape(&s[1..s.len() - 1])
}

/// Decodes the escape sequences of a quoted string body
pub fn unescape(body: &str) -> Option<String> {
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        let decoded = match chars.next()? {
            '\\' => '\\',
            '/' => '/',
            '"' => '"',
            'b' => '\u{8}',
            'f' => '\u{c}',
            'n' => '\n',
            'r' => '\r',
            't' => '\t',
            'u' => {
                let hex: String = chars.by_ref().take(4).collect();
                if hex.len() != 4 {
                    return None;
                }
                char::from_u32(u32::from_str_radix(&hex, 16).ok()?)?
            }
            _ => return None,
        };
        out.push(decoded);
    }
    Some(out)
}

impl Token {
    /// Check if this token is a reserved word
    pub fn is_keyword(&self) -> bool {
        matches!(
            self,
            Token::And
                | Token::Or
                | Token::Not
                | Token::In
                | Token::True
                | Token::False
                | Token::Null
                | Token::With
                | Token::Sort
                | Token::Limit
        )
    }

    /// Check if this token is a comparison operator
    pub fn is_operator(&self) -> bool {
        matches!(
            self,
            Token::EqualsEquals
                | Token::Equals
                | Token::NotEquals
                | Token::LessThan
                | Token::LessEquals
                | Token::GreaterThan
                | Token::GreaterEquals
                | Token::RegexMatch
                | Token::Tilde
                | Token::RegexNotMatch
                | Token::In
                | Token::Not
        )
    }

    /// Check if this token starts an edge traversal
    pub fn is_navigation(&self) -> bool {
        matches!(
            self,
            Token::ArrowRight
                | Token::ArrowLeft
                | Token::DoubleDash
                | Token::ArrowLeftDash
                | Token::Minus
        )
    }
}

/// A token together with its byte range in the query text
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub span: Range<usize>,
}

/// Tokenize a query string
pub fn tokenize(input: &str) -> Result<Vec<Spanned>> {
    let mut lexer = Token::lexer(input);
    let mut tokens = Vec::new();
    while let Some(next) = lexer.next() {
        let span = lexer.span();
        match next {
            Ok(token) => tokens.push(Spanned { token, span }),
            Err(()) => {
                return Err(Error::parse(
                    span.start,
                    format!("unexpected input {:?}", &input[span.clone()]),
                ));
            }
        }
    }
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(input: &str) -> Vec<Token> {
        tokenize(input)
            .unwrap()
            .into_iter()
            .map(|s| s.token)
            .collect()
    }

    #[test]
    fn test_predicate() {
        assert_eq!(
            tokens("cpu > 4 and mem<=23"),
            vec![
                Token::Word("cpu".into()),
                Token::GreaterThan,
                Token::Number(Number::Integer(4)),
                Token::And,
                Token::Word("mem".into()),
                Token::LessEquals,
                Token::Number(Number::Integer(23)),
            ]
        );
    }

    #[test]
    fn test_paths() {
        assert_eq!(
            tokens("/metadata.b some.array[*].x children[] a[0].b"),
            vec![
                Token::Word("/metadata.b".into()),
                Token::Word("some.array[*].x".into()),
                Token::Word("children[]".into()),
                Token::Word("a[0].b".into()),
            ]
        );
        // keywords only match as whole words
        assert_eq!(tokens("android"), vec![Token::Word("android".into())]);
        assert_eq!(tokens("in_subnet"), vec![Token::Word("in_subnet".into())]);
    }

    #[test]
    fn test_keyword_paths() {
        assert_eq!(
            tokens("limit.max sort.order[*].by in[1] with"),
            vec![
                Token::Word("limit.max".into()),
                Token::Word("sort.order[*].by".into()),
                Token::In,
                Token::LBracket,
                Token::Number(Number::Integer(1)),
                Token::RBracket,
                Token::With,
            ]
        );
        assert!(Token::Limit.is_keyword());
        assert!(!Token::Word("limit".into()).is_keyword());
    }

    #[test]
    fn test_numbers() {
        assert_eq!(tokens("12.23"), vec![Token::Number(Number::Float(12.23))]);
        assert_eq!(tokens("1."), vec![Token::Number(Number::Float(1.0))]);
        assert_eq!(tokens(".5"), vec![Token::Number(Number::Float(0.5))]);
        assert_eq!(tokens("1e3"), vec![Token::Number(Number::Float(1000.0))]);
        assert_eq!(
            tokens("99999999999999999999"),
            vec![Token::Number(Number::BigInteger(
                "99999999999999999999".parse().unwrap()
            ))]
        );
        assert_eq!(
            tokens("9223372036854775807"),
            vec![Token::Number(Number::Integer(i64::MAX))]
        );
        assert_eq!(
            tokens("[1..3]"),
            vec![
                Token::LBracket,
                Token::Number(Number::Integer(1)),
                Token::DoubleDot,
                Token::Number(Number::Integer(3)),
                Token::RBracket,
            ]
        );
    }

    #[test]
    fn test_strings() {
        assert_eq!(
            tokens(r#""a\"b\\c\/d\nA""#),
            vec![Token::String("a\"b\\c/d\nA".into())]
        );
        assert!(tokenize(r#""bad \x escape""#).is_err());
        assert!(tokenize(r#""unterminated"#).is_err());
    }

    #[test]
    fn test_navigation() {
        assert_eq!(
            tokens("--> <-- -- -default[1:]-> <-delete-"),
            vec![
                Token::ArrowRight,
                Token::ArrowLeft,
                Token::DoubleDash,
                Token::Minus,
                Token::Word("default".into()),
                Token::LBracket,
                Token::Number(Number::Integer(1)),
                Token::Colon,
                Token::RBracket,
                Token::DashArrowRight,
                Token::ArrowLeftDash,
                Token::Word("delete".into()),
                Token::Minus,
            ]
        );
    }

    #[test]
    fn test_error_position() {
        match tokenize("a == 1 ; b") {
            Err(Error::QueryParse { position, .. }) => assert_eq!(position, 7),
            other => panic!("Expected parse error, got {other:?}"),
        }
    }
}
