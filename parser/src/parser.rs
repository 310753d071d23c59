use std::rc::Rc;

use crate::ast::{
    AssignTarget, ClassDecl, Expr, ExprKind, InterpolationPart, LogicalOp,
    MethodDecl, MethodKind, Stmt,
};
use crate::lexer::Lexer;
use crate::span::{Pos, Span};
use crate::token::{StringPart, Token, TokenKind};

#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub message: String,
    pub span: Span,
}

impl ParseError {
    pub fn new(message: impl Into<String>, span: Span) -> Self {
        Self {
            message: message.into(),
            span,
        }
    }

    pub fn line(&self) -> usize {
        self.span.line()
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} at {}", self.message, self.span)
    }
}

impl std::error::Error for ParseError {}

type ParseResult<T> = Result<T, ParseError>;

/// Recursive-descent parser producing one top-level statement per
/// iteration. After an error it skips to the next top-level line so later
/// errors are still reported.
pub struct Parser<I: Iterator<Item = Token>> {
    tokens: std::iter::Peekable<I>,
    last_span: Span,
    /// Set when parsing an interpolated fragment, to report positions in
    /// the enclosing source.
    origin: Option<Pos>,
}

impl<I: Iterator<Item = Token>> Parser<I> {
    pub fn new(tokens: I) -> Self {
        Self {
            tokens: tokens.peekable(),
            last_span: Span::point(Pos::origin()),
            origin: None,
        }
    }

    fn with_origin(tokens: I, origin: Pos) -> Self {
        Self {
            origin: Some(origin),
            ..Self::new(tokens)
        }
    }

    fn peek_kind(&mut self) -> &TokenKind {
        match self.tokens.peek() {
            Some(tok) => &tok.kind,
            None => &TokenKind::Eof,
        }
    }

    fn peek_span(&mut self) -> Span {
        let origin = self.origin;
        match self.tokens.peek() {
            Some(tok) => match origin {
                Some(origin) => tok.span.rebase(origin),
                None => tok.span,
            },
            None => self.last_span,
        }
    }

    fn advance(&mut self) -> Token {
        match self.tokens.next() {
            Some(mut tok) => {
                if let Some(origin) = self.origin {
                    tok.span = tok.span.rebase(origin);
                }
                self.last_span = tok.span;
                tok
            }
            None => Token::new(TokenKind::Eof, self.last_span),
        }
    }

    fn check(&mut self, kind: &TokenKind) -> bool {
        self.peek_kind() == kind
    }

    fn matches(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> ParseResult<Token> {
        if self.check(&kind) {
            return Ok(self.advance());
        }
        Err(self.error_here(format!("Expect {} {}.", kind.name(), what)))
    }

    fn expect_name(&mut self, what: &str) -> ParseResult<(String, Span)> {
        let span = self.peek_span();
        match self.peek_kind().clone() {
            TokenKind::Name(name) => {
                self.advance();
                Ok((name, span))
            }
            _ => Err(self.error_here(format!("Expect {what}."))),
        }
    }

    fn error_here(&mut self, message: impl Into<String>) -> ParseError {
        let span = self.peek_span();
        if let TokenKind::Error(lex_message) = self.peek_kind() {
            return ParseError::new(lex_message.clone(), span);
        }
        ParseError::new(message, span)
    }

    fn skip_lines(&mut self) {
        while self.matches(&TokenKind::Line) {}
    }

    /// A statement ends at a newline, or right before `}` or end of input.
    fn expect_terminator(&mut self) -> ParseResult<()> {
        match self.peek_kind() {
            TokenKind::Line => {
                self.advance();
                Ok(())
            }
            TokenKind::RBrace | TokenKind::Eof => Ok(()),
            _ => Err(self.error_here("Expect newline after statement.")),
        }
    }

    /// Skip the rest of a broken top-level statement, including any
    /// braces it opened.
    fn synchronize(&mut self) {
        let mut depth = 0usize;
        loop {
            match self.peek_kind() {
                TokenKind::Eof => return,
                TokenKind::Line if depth == 0 => return,
                TokenKind::LBrace => depth += 1,
                TokenKind::RBrace => depth = depth.saturating_sub(1),
                _ => {}
            }
            self.advance();
        }
    }

    // ── declarations and statements ──────────────────────────────────

    fn declaration(&mut self) -> ParseResult<Stmt> {
        match self.peek_kind() {
            TokenKind::Class => {
                self.advance();
                self.class_decl(false)
            }
            TokenKind::Foreign => {
                self.advance();
                self.expect(TokenKind::Class, "after `foreign`")?;
                self.class_decl(true)
            }
            TokenKind::Import => self.import(),
            TokenKind::Var => self.var_decl(),
            _ => self.statement(),
        }
    }

    fn class_decl(&mut self, is_foreign: bool) -> ParseResult<Stmt> {
        let (name, span) = self.expect_name("class name")?;
        self.expect(TokenKind::LBrace, "before class body")?;

        let mut methods = Vec::new();
        loop {
            self.skip_lines();
            if self.matches(&TokenKind::RBrace) {
                break;
            }
            if self.check(&TokenKind::Eof) {
                return Err(self.error_here("Expect `}` after class body."));
            }
            methods.push(Rc::new(self.method()?));
            if !self.check(&TokenKind::RBrace) {
                self.expect(TokenKind::Line, "after method definition")?;
            }
        }

        Ok(Stmt::Class(Rc::new(ClassDecl {
            name,
            is_foreign,
            methods,
            span,
        })))
    }

    fn method(&mut self) -> ParseResult<MethodDecl> {
        let is_foreign = self.matches(&TokenKind::Foreign);
        let is_static = self.matches(&TokenKind::Static);

        let is_constructor = self.matches(&TokenKind::Construct);
        if is_constructor && (is_foreign || is_static) {
            return Err(self.error_here(
                "Constructors cannot be foreign or static.",
            ));
        }

        let (name, span) = self.expect_name("method name")?;

        let (kind, params) = if self.check(&TokenKind::LParen) {
            let params = self.parameters()?;
            let kind = if is_constructor {
                MethodKind::Constructor
            } else {
                MethodKind::Method
            };
            (kind, params)
        } else if is_constructor {
            return Err(self.error_here("Expect `(` after constructor name."));
        } else {
            (MethodKind::Getter, Vec::new())
        };

        let body = if is_foreign {
            None
        } else {
            Some(self.method_body()?)
        };

        Ok(MethodDecl {
            name,
            kind,
            params,
            is_static,
            is_foreign,
            body,
            span,
        })
    }

    fn parameters(&mut self) -> ParseResult<Vec<String>> {
        self.expect(TokenKind::LParen, "before parameters")?;
        let mut params = Vec::new();
        self.skip_lines();
        if !self.check(&TokenKind::RParen) {
            loop {
                let (param, _) = self.expect_name("parameter name")?;
                params.push(param);
                self.skip_lines();
                if !self.matches(&TokenKind::Comma) {
                    break;
                }
                self.skip_lines();
            }
        }
        self.expect(TokenKind::RParen, "after parameters")?;
        Ok(params)
    }

    /// A body written on one line, `{ expr }`, returns its expression.
    fn method_body(&mut self) -> ParseResult<Vec<Stmt>> {
        self.expect(TokenKind::LBrace, "before method body")?;
        if self.matches(&TokenKind::RBrace) {
            return Ok(Vec::new());
        }
        if !self.check(&TokenKind::Line) {
            let stmt = self.declaration()?;
            self.expect(TokenKind::RBrace, "after method body")?;
            let stmt = match stmt {
                Stmt::Expr(expr) => {
                    let span = expr.span;
                    Stmt::Return {
                        value: Some(expr),
                        span,
                    }
                }
                other => other,
            };
            return Ok(vec![stmt]);
        }
        self.block_rest()
    }

    /// Statements up to and including the closing `}`; the `{` is
    /// already consumed.
    fn block_rest(&mut self) -> ParseResult<Vec<Stmt>> {
        let mut stmts = Vec::new();
        loop {
            self.skip_lines();
            if self.matches(&TokenKind::RBrace) {
                return Ok(stmts);
            }
            if self.check(&TokenKind::Eof) {
                return Err(self.error_here("Expect `}` after block."));
            }
            stmts.push(self.declaration()?);
            self.expect_terminator()?;
        }
    }

    fn import(&mut self) -> ParseResult<Stmt> {
        let span = self.advance().span;
        let module = match self.peek_kind().clone() {
            TokenKind::String(parts) => match parts.as_slice() {
                [StringPart::Literal(name)] => {
                    self.advance();
                    name.clone()
                }
                _ => {
                    return Err(self.error_here(
                        "Module name cannot be interpolated.",
                    ));
                }
            },
            _ => return Err(self.error_here("Expect a string after `import`.")),
        };

        let mut names = Vec::new();
        if self.matches(&TokenKind::For) {
            loop {
                let (name, _) = self.expect_name("variable name")?;
                names.push(name);
                if !self.matches(&TokenKind::Comma) {
                    break;
                }
                self.skip_lines();
            }
        }

        Ok(Stmt::Import {
            module,
            names,
            span,
        })
    }

    fn var_decl(&mut self) -> ParseResult<Stmt> {
        let span = self.advance().span;
        let (name, _) = self.expect_name("variable name")?;
        let init = if self.matches(&TokenKind::Eq) {
            self.skip_lines();
            Some(self.expression()?)
        } else {
            None
        };
        Ok(Stmt::Var { name, init, span })
    }

    fn statement(&mut self) -> ParseResult<Stmt> {
        match self.peek_kind() {
            TokenKind::If => {
                self.advance();
                self.expect(TokenKind::LParen, "after `if`")?;
                self.skip_lines();
                let condition = self.expression()?;
                self.skip_lines();
                self.expect(TokenKind::RParen, "after if condition")?;
                let then_branch = Box::new(self.body()?);
                let else_branch = if self.matches(&TokenKind::Else) {
                    Some(Box::new(self.body()?))
                } else {
                    None
                };
                Ok(Stmt::If {
                    condition,
                    then_branch,
                    else_branch,
                })
            }
            TokenKind::While => {
                self.advance();
                self.expect(TokenKind::LParen, "after `while`")?;
                self.skip_lines();
                let condition = self.expression()?;
                self.skip_lines();
                self.expect(TokenKind::RParen, "after while condition")?;
                let body = Box::new(self.body()?);
                Ok(Stmt::While { condition, body })
            }
            TokenKind::For => {
                self.advance();
                self.expect(TokenKind::LParen, "after `for`")?;
                let (name, _) = self.expect_name("loop variable name")?;
                if !matches!(self.peek_kind(), TokenKind::Name(word) if word == "in")
                {
                    return Err(
                        self.error_here("Expect `in` after loop variable.")
                    );
                }
                self.advance();
                let sequence = self.expression()?;
                self.expect(TokenKind::RParen, "after loop expression")?;
                let body = Box::new(self.body()?);
                Ok(Stmt::For {
                    name,
                    sequence,
                    body,
                })
            }
            TokenKind::Return => {
                let span = self.advance().span;
                let value = match self.peek_kind() {
                    TokenKind::Line | TokenKind::RBrace | TokenKind::Eof => {
                        None
                    }
                    _ => Some(self.expression()?),
                };
                Ok(Stmt::Return { value, span })
            }
            TokenKind::Break => {
                let span = self.advance().span;
                Ok(Stmt::Break(span))
            }
            TokenKind::LBrace => {
                self.advance();
                Ok(Stmt::Block(self.block_rest()?))
            }
            _ => Ok(Stmt::Expr(self.expression()?)),
        }
    }

    /// The body of `if`/`while`/`for`: a block or a single statement.
    fn body(&mut self) -> ParseResult<Stmt> {
        if self.matches(&TokenKind::LBrace) {
            return Ok(Stmt::Block(self.block_rest()?));
        }
        self.statement()
    }

    // ── expressions ───────────────────────────────────────────────────

    pub fn expression(&mut self) -> ParseResult<Expr> {
        let target = self.or()?;
        if !self.check(&TokenKind::Eq) {
            return Ok(target);
        }
        let eq_span = self.advance().span;
        self.skip_lines();
        let value = self.expression()?;
        let span = target.span.merge(value.span);
        let target = match target.kind {
            ExprKind::Variable(name) => AssignTarget::Variable(name),
            ExprKind::Field(name) => AssignTarget::Field(name),
            _ => {
                return Err(ParseError::new(
                    "Invalid assignment target.",
                    eq_span,
                ));
            }
        };
        Ok(Expr::new(
            ExprKind::Assign {
                target,
                value: Box::new(value),
            },
            span,
        ))
    }

    fn logical(
        &mut self,
        token: TokenKind,
        op: LogicalOp,
        operand: fn(&mut Self) -> ParseResult<Expr>,
    ) -> ParseResult<Expr> {
        let mut lhs = operand(self)?;
        while self.matches(&token) {
            self.skip_lines();
            let rhs = operand(self)?;
            let span = lhs.span.merge(rhs.span);
            lhs = Expr::new(
                ExprKind::Logical {
                    op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                },
                span,
            );
        }
        Ok(lhs)
    }

    fn or(&mut self) -> ParseResult<Expr> {
        self.logical(TokenKind::PipePipe, LogicalOp::Or, Self::and)
    }

    fn and(&mut self) -> ParseResult<Expr> {
        self.logical(TokenKind::AmpAmp, LogicalOp::And, Self::equality)
    }

    fn binary(
        &mut self,
        tokens: &[TokenKind],
        operand: fn(&mut Self) -> ParseResult<Expr>,
    ) -> ParseResult<Expr> {
        let mut lhs = operand(self)?;
        loop {
            let kind = self.peek_kind().clone();
            if !tokens.contains(&kind) {
                return Ok(lhs);
            }
            let Some(op) = kind.operator() else {
                return Ok(lhs);
            };
            self.advance();
            self.skip_lines();
            let rhs = operand(self)?;
            let span = lhs.span.merge(rhs.span);
            lhs = Expr::new(
                ExprKind::Binary {
                    op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                },
                span,
            );
        }
    }

    fn equality(&mut self) -> ParseResult<Expr> {
        self.binary(&[TokenKind::EqEq, TokenKind::BangEq], Self::comparison)
    }

    fn comparison(&mut self) -> ParseResult<Expr> {
        self.binary(
            &[TokenKind::Lt, TokenKind::Gt, TokenKind::LtEq, TokenKind::GtEq],
            Self::term,
        )
    }

    fn term(&mut self) -> ParseResult<Expr> {
        self.binary(&[TokenKind::Plus, TokenKind::Minus], Self::factor)
    }

    fn factor(&mut self) -> ParseResult<Expr> {
        self.binary(
            &[TokenKind::Star, TokenKind::Slash, TokenKind::Percent],
            Self::unary,
        )
    }

    fn unary(&mut self) -> ParseResult<Expr> {
        let op = match self.peek_kind() {
            TokenKind::Minus => "-",
            TokenKind::Bang => "!",
            _ => return self.postfix(),
        };
        let start = self.advance().span;
        let operand = self.unary()?;
        let span = start.merge(operand.span);
        Ok(Expr::new(
            ExprKind::Unary {
                op,
                operand: Box::new(operand),
            },
            span,
        ))
    }

    fn postfix(&mut self) -> ParseResult<Expr> {
        let mut expr = self.primary()?;
        loop {
            if self.matches(&TokenKind::Dot) {
                let (name, name_span) = self.expect_name("method name after `.`")?;
                let args = self.call_arguments()?;
                let span = expr.span.merge(name_span).merge(self.last_span);
                expr = Expr::new(
                    ExprKind::Call {
                        receiver: Box::new(expr),
                        name,
                        args,
                    },
                    span,
                );
            } else if self.matches(&TokenKind::LBracket) {
                self.skip_lines();
                let index = self.expression()?;
                self.skip_lines();
                let end = self.expect(TokenKind::RBracket, "after subscript")?;
                let span = expr.span.merge(end.span);
                expr = Expr::new(
                    ExprKind::Subscript {
                        receiver: Box::new(expr),
                        index: Box::new(index),
                    },
                    span,
                );
            } else {
                return Ok(expr);
            }
        }
    }

    fn call_arguments(&mut self) -> ParseResult<Option<Vec<Expr>>> {
        if !self.matches(&TokenKind::LParen) {
            return Ok(None);
        }
        let mut args = Vec::new();
        self.skip_lines();
        if !self.check(&TokenKind::RParen) {
            loop {
                args.push(self.expression()?);
                self.skip_lines();
                if !self.matches(&TokenKind::Comma) {
                    break;
                }
                self.skip_lines();
            }
        }
        self.expect(TokenKind::RParen, "after arguments")?;
        Ok(Some(args))
    }

    fn primary(&mut self) -> ParseResult<Expr> {
        let span = self.peek_span();
        let kind = match self.peek_kind().clone() {
            TokenKind::Number(n) => ExprKind::Number(n),
            TokenKind::True => ExprKind::Bool(true),
            TokenKind::False => ExprKind::Bool(false),
            TokenKind::Null => ExprKind::Null,
            TokenKind::This => ExprKind::This,
            TokenKind::Field(name) => ExprKind::Field(name),
            TokenKind::String(parts) => {
                self.advance();
                return self.string(parts, span);
            }
            TokenKind::Name(name) => {
                self.advance();
                // `name(args)` inside a method calls a method on `this`.
                if self.check(&TokenKind::LParen) {
                    let args = self.call_arguments()?;
                    let span = span.merge(self.last_span);
                    return Ok(Expr::new(
                        ExprKind::Call {
                            receiver: Box::new(Expr::new(ExprKind::This, span)),
                            name,
                            args,
                        },
                        span,
                    ));
                }
                return Ok(Expr::new(ExprKind::Variable(name), span));
            }
            TokenKind::LParen => {
                self.advance();
                self.skip_lines();
                let expr = self.expression()?;
                self.skip_lines();
                self.expect(TokenKind::RParen, "after expression")?;
                return Ok(expr);
            }
            TokenKind::LBracket => {
                self.advance();
                let mut elements = Vec::new();
                self.skip_lines();
                while !self.check(&TokenKind::RBracket) {
                    elements.push(self.expression()?);
                    self.skip_lines();
                    if !self.matches(&TokenKind::Comma) {
                        break;
                    }
                    self.skip_lines();
                }
                let end = self.expect(TokenKind::RBracket, "after list elements")?;
                return Ok(Expr::new(ExprKind::List(elements), span.merge(end.span)));
            }
            _ => return Err(self.error_here("Expected expression.")),
        };
        self.advance();
        Ok(Expr::new(kind, span))
    }

    fn string(&mut self, parts: Vec<StringPart>, span: Span) -> ParseResult<Expr> {
        if let [StringPart::Literal(text)] = parts.as_slice() {
            return Ok(Expr::new(ExprKind::String(text.clone()), span));
        }

        let mut out = Vec::with_capacity(parts.len());
        for part in parts {
            match part {
                StringPart::Literal(text) => out.push(InterpolationPart::Literal(text)),
                StringPart::Code { source, start } => {
                    let origin = match self.origin {
                        Some(outer) => outer.rebase(start),
                        None => start,
                    };
                    let mut inner =
                        Parser::with_origin(Lexer::from_str(&source), origin);
                    inner.skip_lines();
                    let expr = inner.expression()?;
                    inner.skip_lines();
                    if !inner.check(&TokenKind::Eof) {
                        return Err(inner
                            .error_here("Expect `)` after interpolated expression."));
                    }
                    out.push(InterpolationPart::Expr(expr));
                }
            }
        }
        Ok(Expr::new(ExprKind::Interpolation(out), span))
    }
}

impl<I: Iterator<Item = Token>> Iterator for Parser<I> {
    type Item = ParseResult<Stmt>;

    fn next(&mut self) -> Option<Self::Item> {
        self.skip_lines();
        if self.check(&TokenKind::Eof) {
            return None;
        }
        let result = self
            .declaration()
            .and_then(|stmt| self.expect_terminator().map(|()| stmt));
        if result.is_err() {
            self.synchronize();
        }
        Some(result)
    }
}

/// Parse a whole module, collecting every error.
pub fn parse_module(source: &str) -> Result<Vec<Stmt>, Vec<ParseError>> {
    let results: Vec<_> = Parser::new(Lexer::from_str(source)).collect();
    let errors: Vec<ParseError> = results
        .iter()
        .filter_map(|r| r.as_ref().err())
        .cloned()
        .collect();
    if !errors.is_empty() {
        return Err(errors);
    }
    Ok(results.into_iter().filter_map(Result::ok).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(src: &str) -> Vec<Stmt> {
        match parse_module(src) {
            Ok(stmts) => stmts,
            Err(errors) => panic!("unexpected errors: {errors:?}"),
        }
    }

    fn single_expr(src: &str) -> Expr {
        match parse(src).pop() {
            Some(Stmt::Expr(expr)) => expr,
            other => panic!("Expected expression statement, got {other:?}"),
        }
    }

    #[test]
    fn parse_static_call_with_arguments() {
        let expr = single_expr("GoMath.add(2, 3)");
        match expr.kind {
            ExprKind::Call {
                receiver,
                name,
                args: Some(args),
            } => {
                assert_eq!(receiver.kind, ExprKind::Variable("GoMath".into()));
                assert_eq!(name, "add");
                assert_eq!(args.len(), 2);
            }
            other => panic!("Expected call, got {other:?}"),
        }
    }

    #[test]
    fn parse_getter_call_has_no_arguments() {
        match single_expr("list.count").kind {
            ExprKind::Call { args, .. } => assert!(args.is_none()),
            other => panic!("Expected call, got {other:?}"),
        }
    }

    #[test]
    fn multiplication_binds_tighter_than_addition() {
        match single_expr("1 + 2 * 3").kind {
            ExprKind::Binary { op, rhs, .. } => {
                assert_eq!(op, "+");
                assert!(matches!(rhs.kind, ExprKind::Binary { op: "*", .. }));
            }
            other => panic!("Expected binary, got {other:?}"),
        }
    }

    #[test]
    fn parse_foreign_class_members() {
        let stmts = parse(
            r#"
            foreign class God {
                construct new() {}
                foreign getMessage(name)
                foreign static create
            }
            "#,
        );
        let Some(Stmt::Class(class)) = stmts.first() else {
            panic!("Expected class");
        };
        assert!(class.is_foreign);
        assert_eq!(class.methods.len(), 3);
        assert_eq!(class.methods[0].kind, MethodKind::Constructor);
        assert_eq!(class.methods[0].signature(), "new()");
        assert!(class.methods[1].is_foreign);
        assert!(class.methods[1].body.is_none());
        assert_eq!(class.methods[1].signature(), "getMessage(_)");
        assert!(class.methods[2].is_static);
        assert_eq!(class.methods[2].signature(), "create");
    }

    #[test]
    fn one_line_body_returns_its_expression() {
        let stmts = parse("class A {\n  value { 42 }\n}");
        let Some(Stmt::Class(class)) = stmts.first() else {
            panic!("Expected class");
        };
        let body = class.methods[0].body.as_ref().map(Vec::as_slice);
        assert!(matches!(body, Some([Stmt::Return { value: Some(_), .. }])));
    }

    #[test]
    fn parse_interpolation() {
        match single_expr(r#""Flying to %(where)!""#).kind {
            ExprKind::Interpolation(parts) => {
                assert_eq!(parts.len(), 3);
                assert!(matches!(
                    &parts[1],
                    InterpolationPart::Expr(Expr {
                        kind: ExprKind::Variable(_),
                        ..
                    })
                ));
            }
            other => panic!("Expected interpolation, got {other:?}"),
        }
    }

    #[test]
    fn interpolated_spans_point_into_the_enclosing_source() {
        match single_expr("\n\"a %(b)\"").kind {
            ExprKind::Interpolation(parts) => match &parts[1] {
                InterpolationPart::Expr(expr) => {
                    assert_eq!(expr.span.start.line, 2);
                    assert_eq!(expr.span.start.column, 6);
                }
                other => panic!("Expected expression part, got {other:?}"),
            },
            other => panic!("Expected interpolation, got {other:?}"),
        }
    }

    #[test]
    fn parse_import_with_names() {
        let stmts = parse(r#"import "hello" for Hello, World"#);
        match &stmts[0] {
            Stmt::Import { module, names, .. } => {
                assert_eq!(module, "hello");
                assert_eq!(names, &["Hello".to_string(), "World".to_string()]);
            }
            other => panic!("Expected import, got {other:?}"),
        }
    }

    #[test]
    fn if_else_and_while() {
        let stmts = parse(
            "var i = 0\nwhile (i < 3) {\n  if (i == 1) i = 5 else i = i + 1\n}",
        );
        assert_eq!(stmts.len(), 2);
        assert!(matches!(stmts[1], Stmt::While { .. }));
    }

    #[test]
    fn invalid_assignment_target_is_an_error() {
        assert!(parse_module("1 = 2").is_err());
    }

    #[test]
    fn errors_are_collected_per_statement() {
        let errors = match parse_module("var = 1\nSystem.print(1)\n)") {
            Err(errors) => errors,
            Ok(_) => panic!("Expected errors"),
        };
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].line(), 1);
        assert_eq!(errors[1].line(), 3);
    }

    #[test]
    fn lexer_errors_surface_as_parse_errors() {
        let errors = match parse_module("Don't mind me") {
            Err(errors) => errors,
            Ok(_) => panic!("Expected errors"),
        };
        assert!(errors[0].message.starts_with("Invalid character"));
    }

    #[test]
    fn two_statements_on_one_line_is_an_error() {
        assert!(parse_module("var a = 1 var b = 2").is_err());
    }
}
