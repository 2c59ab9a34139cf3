//! Lexer for the annotated-function source language using logos
//!
//! Supports tokens like:
//! - Keywords: fn, return, pass
//! - Identifiers: a, out, float32
//! - Numbers: 1, 2.5, 1e3
//! - Strings: "float32"
//! - Operators: +, *, -, /, =
//! - Punctuation: (, ), {, }, ,, :, ;

use logos::Logos;

use crate::error::{CompileError, CompileResult};

/// Token types for the source language
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"([ \t\n\r]+|//[^\n]*)")]
pub enum Token {
    // Literals
    #[regex(r"[0-9]+\.?[0-9]*([eE][+-]?[0-9]+)?", |lex| lex.slice().parse::<f64>().ok())]
    Number(f64),

    #[regex(r#""[^"]*""#, |lex| {
        let s = lex.slice();
        s[1..s.len() - 1].to_string()
    })]
    Str(String),

    // Keywords
    #[token("fn")]
    Fn,

    #[token("return")]
    Return,

    #[token("pass")]
    Pass,

    // Identifiers
    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*", |lex| lex.slice().to_string())]
    Ident(String),

    // Operators
    #[token("+")]
    Plus,

    #[token("*")]
    Star,

    #[token("-")]
    Minus,

    #[token("/")]
    Slash,

    #[token("=")]
    Equals,

    // Punctuation
    #[token("(")]
    LParen,

    #[token(")")]
    RParen,

    #[token("{")]
    LBrace,

    #[token("}")]
    RBrace,

    #[token(",")]
    Comma,

    #[token(":")]
    Colon,

    #[token(";")]
    Semicolon,
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::Number(n) => write!(f, "{}", n),
            Token::Str(s) => write!(f, "\"{}\"", s),
            Token::Fn => write!(f, "fn"),
            Token::Return => write!(f, "return"),
            Token::Pass => write!(f, "pass"),
            Token::Ident(s) => write!(f, "{}", s),
            Token::Plus => write!(f, "+"),
            Token::Star => write!(f, "*"),
            Token::Minus => write!(f, "-"),
            Token::Slash => write!(f, "/"),
            Token::Equals => write!(f, "="),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
            Token::LBrace => write!(f, "{{"),
            Token::RBrace => write!(f, "}}"),
            Token::Comma => write!(f, ","),
            Token::Colon => write!(f, ":"),
            Token::Semicolon => write!(f, ";"),
        }
    }
}

/// Lexer wrapper that surfaces unrecognized input as a lex error with its
/// source position
pub struct Lexer<'source> {
    inner: logos::Lexer<'source, Token>,
}

impl<'source> Lexer<'source> {
    pub fn new(source: &'source str) -> Self {
        Self {
            inner: Token::lexer(source),
        }
    }

    /// Get current position in source
    pub fn span(&self) -> std::ops::Range<usize> {
        self.inner.span()
    }

    /// Produce the next token, or None at end of input
    pub fn next_token(&mut self) -> CompileResult<Option<Token>> {
        match self.inner.next() {
            Some(Ok(tok)) => Ok(Some(tok)),
            Some(Err(())) => Err(CompileError::Lex {
                position: self.inner.span().start,
                message: format!("unrecognized input '{}'", self.inner.slice()),
            }),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokenize(source: &str) -> Vec<Token> {
        let mut lexer = Lexer::new(source);
        let mut tokens = Vec::new();
        while let Some(tok) = lexer.next_token().unwrap() {
            tokens.push(tok);
        }
        tokens
    }

    #[test]
    fn test_simple_tokens() {
        assert_eq!(
            tokenize("out = a + b"),
            vec![
                Token::Ident("out".to_string()),
                Token::Equals,
                Token::Ident("a".to_string()),
                Token::Plus,
                Token::Ident("b".to_string()),
            ]
        );
    }

    #[test]
    fn test_keywords() {
        assert_eq!(
            tokenize("fn f() { pass; return out; }"),
            vec![
                Token::Fn,
                Token::Ident("f".to_string()),
                Token::LParen,
                Token::RParen,
                Token::LBrace,
                Token::Pass,
                Token::Semicolon,
                Token::Return,
                Token::Ident("out".to_string()),
                Token::Semicolon,
                Token::RBrace,
            ]
        );
    }

    #[test]
    fn test_annotation_tokens() {
        assert_eq!(
            tokenize(r#"a: Tensor((2, 3), "float32")"#),
            vec![
                Token::Ident("a".to_string()),
                Token::Colon,
                Token::Ident("Tensor".to_string()),
                Token::LParen,
                Token::LParen,
                Token::Number(2.0),
                Token::Comma,
                Token::Number(3.0),
                Token::RParen,
                Token::Comma,
                Token::Str("float32".to_string()),
                Token::RParen,
            ]
        );
    }

    #[test]
    fn test_comments_skipped() {
        assert_eq!(
            tokenize("a // trailing comment\n+ b"),
            vec![
                Token::Ident("a".to_string()),
                Token::Plus,
                Token::Ident("b".to_string()),
            ]
        );
    }

    #[test]
    fn test_unrecognized_input() {
        let mut lexer = Lexer::new("a ? b");
        lexer.next_token().unwrap();
        let err = lexer.next_token().unwrap_err();
        assert!(matches!(err, CompileError::Lex { position: 2, .. }));
    }
}
