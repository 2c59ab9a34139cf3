//! Parser for annotated function definitions
//!
//! Parses compilation units like:
//!
//! ```text
//! fn add(a: Tensor((2, 3), float32), b: Tensor((2, 3), float32)) {
//!     out = a + b;
//!     return out;
//! }
//! ```
//!
//! The grammar is deliberately closed: straight-line assignments, a single
//! terminal return, `+`/`*`/`-`/`/` binary expressions, and `Tensor(...)`
//! parameter annotations. `-`, `/`, chained assignment targets, bare
//! expression statements, and calls all parse into AST nodes so the
//! translator can reject them with their dedicated errors.

use crate::ast::{
    AnnotExpr, BinOp, DimExpr, DtypeExpr, Expr, FunctionSpec, Param, SourceModule, Stmt,
};
use crate::error::{CompileError, CompileResult};
use crate::lexer::{Lexer, Token};

/// Recursive-descent parser over the token stream
pub struct Parser<'source> {
    lexer: Lexer<'source>,
    current: Option<Token>,
}

impl<'source> Parser<'source> {
    pub fn new(source: &'source str) -> CompileResult<Self> {
        let mut lexer = Lexer::new(source);
        let current = lexer.next_token()?;
        Ok(Self { lexer, current })
    }

    /// Advance to the next token, returning the one just consumed
    fn advance(&mut self) -> CompileResult<Option<Token>> {
        let prev = self.current.take();
        self.current = self.lexer.next_token()?;
        Ok(prev)
    }

    /// Check if the current token matches the expected kind
    fn check(&self, expected: &Token) -> bool {
        match &self.current {
            Some(tok) => std::mem::discriminant(tok) == std::mem::discriminant(expected),
            None => false,
        }
    }

    /// Consume the current token if it matches, otherwise error
    fn expect(&mut self, expected: Token) -> CompileResult<Token> {
        if self.check(&expected) {
            Ok(self.advance()?.expect("checked token present"))
        } else {
            Err(CompileError::parse_error(format!(
                "expected '{}', got {}",
                expected,
                self.describe_current()
            )))
        }
    }

    fn describe_current(&self) -> String {
        match &self.current {
            Some(tok) => format!("'{}'", tok),
            None => "end of input".to_string(),
        }
    }

    /// Parse a complete compilation unit (zero or more function definitions)
    pub fn parse_module(&mut self) -> CompileResult<SourceModule> {
        let mut functions = Vec::new();

        while self.current.is_some() {
            functions.push(self.parse_function()?);
        }

        Ok(SourceModule { functions })
    }

    /// Parse one function definition: `fn name(params) { body }`
    fn parse_function(&mut self) -> CompileResult<FunctionSpec> {
        self.expect(Token::Fn)?;
        let name = self.expect_ident()?;

        self.expect(Token::LParen)?;
        let params = self.parse_params()?;
        self.expect(Token::RParen)?;

        self.expect(Token::LBrace)?;
        let mut body = Vec::new();
        while !self.check(&Token::RBrace) {
            if self.current.is_none() {
                return Err(CompileError::parse_error(format!(
                    "unterminated body of function '{}'",
                    name
                )));
            }
            body.push(self.parse_stmt()?);
        }
        self.expect(Token::RBrace)?;

        Ok(FunctionSpec { name, params, body })
    }

    fn expect_ident(&mut self) -> CompileResult<String> {
        match self.advance()? {
            Some(Token::Ident(name)) => Ok(name),
            other => Err(CompileError::parse_error(format!(
                "expected identifier, got {}",
                match other {
                    Some(tok) => format!("'{}'", tok),
                    None => "end of input".to_string(),
                }
            ))),
        }
    }

    /// Parse the parameter list between the parentheses
    fn parse_params(&mut self) -> CompileResult<Vec<Param>> {
        let mut params = Vec::new();

        if !self.check(&Token::RParen) {
            params.push(self.parse_param()?);

            while self.check(&Token::Comma) {
                self.advance()?;
                if self.check(&Token::RParen) {
                    break; // Trailing comma
                }
                params.push(self.parse_param()?);
            }
        }

        Ok(params)
    }

    /// Parse a parameter: `name` or `name: annotation`
    ///
    /// A missing annotation is legal syntax; the translator rejects it.
    fn parse_param(&mut self) -> CompileResult<Param> {
        let name = self.expect_ident()?;

        let annotation = if self.check(&Token::Colon) {
            self.advance()?;
            Some(self.parse_annotation()?)
        } else {
            None
        };

        Ok(Param { name, annotation })
    }

    /// Parse an annotation expression: `Tensor(...)` or a bare context name
    fn parse_annotation(&mut self) -> CompileResult<AnnotExpr> {
        let name = self.expect_ident()?;

        if !self.check(&Token::LParen) {
            return Ok(AnnotExpr::Named(name));
        }
        if name != "Tensor" {
            return Err(CompileError::parse_error(format!(
                "unknown annotation constructor '{}'",
                name
            )));
        }

        self.expect(Token::LParen)?;

        // Optional `shape =` keyword before the dimension tuple
        if self.check(&Token::Ident(String::new())) {
            let keyword = self.expect_ident()?;
            if keyword != "shape" {
                return Err(CompileError::parse_error(format!(
                    "expected 'shape' keyword in annotation, got '{}'",
                    keyword
                )));
            }
            self.expect(Token::Equals)?;
        }

        self.expect(Token::LParen)?;
        let mut shape = vec![self.parse_dim()?];
        while self.check(&Token::Comma) {
            self.advance()?;
            if self.check(&Token::RParen) {
                break; // Trailing comma
            }
            shape.push(self.parse_dim()?);
        }
        self.expect(Token::RParen)?;

        self.expect(Token::Comma)?;
        let dtype = self.parse_dtype()?;
        self.expect(Token::RParen)?;

        Ok(AnnotExpr::Tensor { shape, dtype })
    }

    /// Parse one dimension: an integer literal or a free name
    fn parse_dim(&mut self) -> CompileResult<DimExpr> {
        match self.advance()? {
            Some(Token::Number(n)) => {
                if n.fract() != 0.0 || n < 0.0 {
                    return Err(CompileError::parse_error(format!(
                        "dimension must be a non-negative integer, got {}",
                        n
                    )));
                }
                Ok(DimExpr::Literal(n as usize))
            }
            Some(Token::Ident(name)) => Ok(DimExpr::Name(name)),
            other => Err(CompileError::parse_error(format!(
                "expected dimension, got {}",
                match other {
                    Some(tok) => format!("'{}'", tok),
                    None => "end of input".to_string(),
                }
            ))),
        }
    }

    /// Parse the dtype argument: `"float32"`, `float32`, `dt`, or
    /// `dtype=` followed by any of those
    fn parse_dtype(&mut self) -> CompileResult<DtypeExpr> {
        match self.advance()? {
            Some(Token::Str(s)) => Ok(DtypeExpr::Literal(s)),
            Some(Token::Ident(name)) => {
                if self.check(&Token::Equals) {
                    if name != "dtype" {
                        return Err(CompileError::parse_error(format!(
                            "expected 'dtype' keyword in annotation, got '{}'",
                            name
                        )));
                    }
                    self.advance()?;
                    return match self.advance()? {
                        Some(Token::Str(s)) => Ok(DtypeExpr::Literal(s)),
                        Some(Token::Ident(value)) => Ok(DtypeExpr::Name(value)),
                        other => Err(CompileError::parse_error(format!(
                            "expected dtype value, got {}",
                            match other {
                                Some(tok) => format!("'{}'", tok),
                                None => "end of input".to_string(),
                            }
                        ))),
                    };
                }
                Ok(DtypeExpr::Name(name))
            }
            other => Err(CompileError::parse_error(format!(
                "expected dtype, got {}",
                match other {
                    Some(tok) => format!("'{}'", tok),
                    None => "end of input".to_string(),
                }
            ))),
        }
    }

    /// Parse a single body statement
    fn parse_stmt(&mut self) -> CompileResult<Stmt> {
        if self.check(&Token::Pass) {
            self.advance()?;
            self.eat_semicolon()?;
            return Ok(Stmt::Pass);
        }

        if self.check(&Token::Return) {
            self.advance()?;
            let value = self.parse_expr()?;
            self.eat_semicolon()?;
            return Ok(Stmt::Return(value));
        }

        // Assignment or bare expression. `a = b = expr` collects every
        // left-hand name so the translator can reject the chain.
        let mut targets = Vec::new();
        let mut expr = self.parse_expr()?;
        while self.check(&Token::Equals) {
            match expr {
                Expr::Name(name) => targets.push(name),
                other => {
                    return Err(CompileError::parse_error(format!(
                        "invalid assignment target: {:?}",
                        other
                    )))
                }
            }
            self.advance()?;
            expr = self.parse_expr()?;
        }
        self.eat_semicolon()?;

        if targets.is_empty() {
            Ok(Stmt::Expr(expr))
        } else {
            Ok(Stmt::Assign { targets, value: expr })
        }
    }

    /// Optional statement separator
    fn eat_semicolon(&mut self) -> CompileResult<()> {
        if self.check(&Token::Semicolon) {
            self.advance()?;
        }
        Ok(())
    }

    /// Parse an expression (handles operator precedence)
    pub fn parse_expr(&mut self) -> CompileResult<Expr> {
        self.parse_additive()
    }

    /// Parse additive expressions: a + b, a - b
    fn parse_additive(&mut self) -> CompileResult<Expr> {
        let mut left = self.parse_multiplicative()?;

        loop {
            let op = if self.check(&Token::Plus) {
                BinOp::Add
            } else if self.check(&Token::Minus) {
                BinOp::Sub
            } else {
                break;
            };
            self.advance()?;
            let right = self.parse_multiplicative()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }

        Ok(left)
    }

    /// Parse multiplicative expressions: a * b, a / b
    fn parse_multiplicative(&mut self) -> CompileResult<Expr> {
        let mut left = self.parse_primary()?;

        loop {
            let op = if self.check(&Token::Star) {
                BinOp::Mul
            } else if self.check(&Token::Slash) {
                BinOp::Div
            } else {
                break;
            };
            self.advance()?;
            let right = self.parse_primary()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }

        Ok(left)
    }

    /// Parse primary expressions: literals, names, calls, parenthesized
    fn parse_primary(&mut self) -> CompileResult<Expr> {
        match &self.current {
            Some(Token::Number(n)) => {
                let n = *n;
                self.advance()?;
                Ok(Expr::Number(n))
            }

            Some(Token::Ident(name)) => {
                let name = name.clone();
                self.advance()?;

                if self.check(&Token::LParen) {
                    let args = self.parse_args()?;
                    return Ok(Expr::Call { name, args });
                }

                Ok(Expr::Name(name))
            }

            Some(Token::LParen) => {
                self.advance()?;
                let inner = self.parse_expr()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }

            None => Err(CompileError::parse_error("unexpected end of input")),

            other => Err(CompileError::parse_error(format!(
                "unexpected token: {:?}",
                other
            ))),
        }
    }

    /// Parse call arguments: (arg1, arg2, ...)
    fn parse_args(&mut self) -> CompileResult<Vec<Expr>> {
        self.expect(Token::LParen)?;

        let mut args = Vec::new();

        if !self.check(&Token::RParen) {
            args.push(self.parse_expr()?);

            while self.check(&Token::Comma) {
                self.advance()?;
                if self.check(&Token::RParen) {
                    break; // Trailing comma
                }
                args.push(self.parse_expr()?);
            }
        }

        self.expect(Token::RParen)?;
        Ok(args)
    }
}

/// Parse a source string into a compilation unit
pub fn parse_source(source: &str) -> CompileResult<SourceModule> {
    Parser::new(source)?.parse_module()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_function() {
        let module = parse_source(
            "fn add(a: Tensor((2, 3), float32), b: Tensor((2, 3), float32)) {
                out = a + b;
                return out;
            }",
        )
        .unwrap();

        assert_eq!(module.functions.len(), 1);
        let f = &module.functions[0];
        assert_eq!(f.name, "add");
        assert_eq!(f.params.len(), 2);
        assert_eq!(f.body.len(), 2);

        let annot = f.params[0].annotation.as_ref().unwrap();
        assert_eq!(
            annot,
            &AnnotExpr::Tensor {
                shape: vec![DimExpr::Literal(2), DimExpr::Literal(3)],
                dtype: DtypeExpr::Name("float32".to_string()),
            }
        );
    }

    #[test]
    fn test_parse_keyword_annotation() {
        let module = parse_source(
            r#"fn f(a: Tensor(shape=(m, n), dtype="float32")) { return a; }"#,
        )
        .unwrap();

        let annot = module.functions[0].params[0].annotation.as_ref().unwrap();
        assert_eq!(
            annot,
            &AnnotExpr::Tensor {
                shape: vec![
                    DimExpr::Name("m".to_string()),
                    DimExpr::Name("n".to_string())
                ],
                dtype: DtypeExpr::Literal("float32".to_string()),
            }
        );
    }

    #[test]
    fn test_parse_named_annotation() {
        let module = parse_source("fn f(a: ImageT) { return a; }").unwrap();
        assert_eq!(
            module.functions[0].params[0].annotation,
            Some(AnnotExpr::Named("ImageT".to_string()))
        );
    }

    #[test]
    fn test_parse_missing_annotation() {
        let module = parse_source("fn f(a) { return a; }").unwrap();
        assert_eq!(module.functions[0].params[0].annotation, None);
    }

    #[test]
    fn test_parse_precedence() {
        let module = parse_source("fn f(a: T, b: T) { return a + b * a; }").unwrap();

        if let Stmt::Return(Expr::Binary { op, right, .. }) = &module.functions[0].body[0] {
            assert_eq!(*op, BinOp::Add);
            assert!(matches!(
                right.as_ref(),
                Expr::Binary { op: BinOp::Mul, .. }
            ));
        } else {
            panic!("expected return of a binary expression");
        }
    }

    #[test]
    fn test_parse_chained_assignment() {
        let module = parse_source("fn f(a: T) { x = y = a; return x; }").unwrap();

        if let Stmt::Assign { targets, .. } = &module.functions[0].body[0] {
            assert_eq!(targets, &["x".to_string(), "y".to_string()]);
        } else {
            panic!("expected assignment");
        }
    }

    #[test]
    fn test_parse_pass_and_expr_stmt() {
        let module = parse_source("fn f(a: T) { pass; a + a; return a; }").unwrap();

        assert_eq!(module.functions[0].body.len(), 3);
        assert_eq!(module.functions[0].body[0], Stmt::Pass);
        assert!(matches!(module.functions[0].body[1], Stmt::Expr(_)));
    }

    #[test]
    fn test_parse_multiple_functions() {
        let module =
            parse_source("fn f(a: T) { return a; } fn g(b: T) { return b; }").unwrap();
        assert_eq!(module.functions.len(), 2);
    }

    #[test]
    fn test_parse_call_expr() {
        let module = parse_source("fn f(a: T) { return helper(a, 2); }").unwrap();

        if let Stmt::Return(Expr::Call { name, args }) = &module.functions[0].body[0] {
            assert_eq!(name, "helper");
            assert_eq!(args.len(), 2);
        } else {
            panic!("expected call expression");
        }
    }

    #[test]
    fn test_parse_error_on_bad_constructor() {
        let err = parse_source("fn f(a: Matrix((2, 2), float32)) { return a; }").unwrap_err();
        assert!(matches!(err, CompileError::Parse { .. }));
    }
}
