//! Havel Parser (spec component J)
//!
//! Pratt-style expression parser (lowest→highest: pipeline, ternary,
//! logical-or, logical-and, equality, comparison, additive,
//! multiplicative, unary, postfix) plus the full statement grammar.
//! Grounded on the original `Parser.cpp`'s statement dispatch and
//! recursive-descent-with-precedence-climbing expression parsing.

use crate::error::Diagnostic;
use crate::lang::ast::*;
use crate::lang::lexer::{Token, TokenKind};

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    diagnostics: Vec<Diagnostic>,
}

/// Parse a full program, collecting every diagnostic rather than
/// stopping at the first: a syntax error synchronises to the next
/// statement boundary so later errors are still reported in one pass.
pub fn parse(tokens: Vec<Token>) -> Result<Program, Vec<Diagnostic>> {
    let mut parser = Parser { tokens, pos: 0, diagnostics: Vec::new() };
    let mut statements = Vec::new();
    while !parser.check(&TokenKind::Eof) {
        match parser.statement() {
            Ok(stmt) => statements.push(stmt),
            Err(diag) => {
                parser.diagnostics.push(diag);
                parser.synchronize();
            }
        }
    }
    if parser.diagnostics.is_empty() {
        Ok(Program { statements })
    } else {
        Err(parser.diagnostics)
    }
}

impl Parser {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn check(&self, kind: &TokenKind) -> bool {
        std::mem::discriminant(&self.peek().kind) == std::mem::discriminant(kind)
    }

    fn advance(&mut self) -> Token {
        let tok = self.tokens[self.pos.min(self.tokens.len() - 1)].clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        tok
    }

    fn error(&self, message: impl Into<String>) -> Diagnostic {
        let tok = self.peek();
        Diagnostic::new(tok.line, tok.column, message.into())
    }

    fn expect(&mut self, kind: &TokenKind, what: &str) -> Result<Token, Diagnostic> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            Err(self.error(format!("expected {what}")))
        }
    }

    fn consume_identifier(&mut self) -> Result<String, Diagnostic> {
        match &self.peek().kind {
            TokenKind::Identifier(name) => {
                let name = name.clone();
                self.advance();
                Ok(name)
            }
            _ => Err(self.error("expected identifier")),
        }
    }

    /// Skip to the next statement boundary (`;` or an opening keyword)
    /// after recording a diagnostic, so subsequent statements still parse.
    fn synchronize(&mut self) {
        while !self.check(&TokenKind::Eof) {
            if matches!(self.peek().kind, TokenKind::Semicolon) {
                self.advance();
                return;
            }
            if matches!(
                self.peek().kind,
                TokenKind::Let | TokenKind::If | TokenKind::While | TokenKind::Fn | TokenKind::Return | TokenKind::LBrace
            ) {
                return;
            }
            self.advance();
        }
    }

    fn statement(&mut self) -> Result<Stmt, Diagnostic> {
        match &self.peek().kind {
            TokenKind::LBrace => self.block(),
            TokenKind::Let => self.let_stmt(),
            TokenKind::If => self.if_stmt(),
            TokenKind::While => self.while_stmt(),
            TokenKind::For => self.for_stmt(),
            TokenKind::Loop => self.loop_stmt(),
            TokenKind::Break => {
                self.advance();
                self.skip_semicolon();
                Ok(Stmt::Break)
            }
            TokenKind::Continue => {
                self.advance();
                self.skip_semicolon();
                Ok(Stmt::Continue)
            }
            TokenKind::Fn => self.function_stmt(),
            TokenKind::Return => self.return_stmt(),
            TokenKind::Import => self.import_stmt(),
            TokenKind::Config => self.record_block(TokenKind::Config, |pairs| Stmt::ConfigBlock(pairs)),
            TokenKind::Modes => self.record_block(TokenKind::Modes, Stmt::ModesBlock),
            TokenKind::Devices => self.devices_stmt(),
            TokenKind::On => self.on_off_mode(true),
            TokenKind::Off => self.on_off_mode(false),
            TokenKind::Hotkey(_) => self.hotkey_binding_stmt(),
            _ => {
                let expr = self.expression()?;
                self.skip_semicolon();
                Ok(Stmt::Expression(expr))
            }
        }
    }

    fn skip_semicolon(&mut self) {
        if self.check(&TokenKind::Semicolon) {
            self.advance();
        }
    }

    fn block(&mut self) -> Result<Stmt, Diagnostic> {
        self.expect(&TokenKind::LBrace, "`{`")?;
        let mut statements = Vec::new();
        while !self.check(&TokenKind::RBrace) && !self.check(&TokenKind::Eof) {
            statements.push(self.statement()?);
        }
        self.expect(&TokenKind::RBrace, "`}`")?;
        Ok(Stmt::Block(statements))
    }

    fn let_stmt(&mut self) -> Result<Stmt, Diagnostic> {
        self.advance();
        let name = self.consume_identifier()?;
        self.expect(&TokenKind::Assign, "`=`")?;
        let value = self.expression()?;
        self.skip_semicolon();
        Ok(Stmt::Let { name, value })
    }

    fn if_stmt(&mut self) -> Result<Stmt, Diagnostic> {
        self.advance();
        let condition = self.expression()?;
        let then_branch = Box::new(self.block()?);
        let else_branch = if self.check(&TokenKind::Else) {
            self.advance();
            Some(Box::new(if self.check(&TokenKind::If) { self.if_stmt()? } else { self.block()? }))
        } else {
            None
        };
        Ok(Stmt::If { condition, then_branch, else_branch })
    }

    fn while_stmt(&mut self) -> Result<Stmt, Diagnostic> {
        self.advance();
        let condition = self.expression()?;
        let body = Box::new(self.block()?);
        Ok(Stmt::While { condition, body })
    }

    fn for_stmt(&mut self) -> Result<Stmt, Diagnostic> {
        self.advance();
        let binding = self.consume_identifier()?;
        self.expect(&TokenKind::In, "`in`")?;
        let iterable = self.expression()?;
        let body = Box::new(self.block()?);
        Ok(Stmt::For { binding, iterable, body })
    }

    fn loop_stmt(&mut self) -> Result<Stmt, Diagnostic> {
        self.advance();
        let body = Box::new(self.block()?);
        Ok(Stmt::Loop { body })
    }

    fn function_stmt(&mut self) -> Result<Stmt, Diagnostic> {
        self.advance();
        let name = self.consume_identifier()?;
        self.expect(&TokenKind::LParen, "`(`")?;
        let mut params = Vec::new();
        while !self.check(&TokenKind::RParen) {
            params.push(self.consume_identifier()?);
            if self.check(&TokenKind::Comma) {
                self.advance();
            }
        }
        self.expect(&TokenKind::RParen, "`)`")?;
        let body = Box::new(self.block()?);
        Ok(Stmt::Function { name, params, body })
    }

    fn return_stmt(&mut self) -> Result<Stmt, Diagnostic> {
        self.advance();
        let value = if self.check(&TokenKind::Semicolon) || self.check(&TokenKind::RBrace) {
            None
        } else {
            Some(self.expression()?)
        };
        self.skip_semicolon();
        Ok(Stmt::Return(value))
    }

    fn import_stmt(&mut self) -> Result<Stmt, Diagnostic> {
        self.advance();
        let mut names = vec![self.consume_identifier()?];
        while self.check(&TokenKind::Comma) {
            self.advance();
            names.push(self.consume_identifier()?);
        }
        self.expect(&TokenKind::From, "`from`")?;
        let module = match &self.peek().kind {
            TokenKind::String(s) => {
                let s = s.clone();
                self.advance();
                s
            }
            _ => self.consume_identifier()?,
        };
        let alias = if self.check(&TokenKind::As) {
            self.advance();
            Some(self.consume_identifier()?)
        } else {
            None
        };
        self.skip_semicolon();
        Ok(Stmt::Import { names, module, alias })
    }

    /// Shared shape for `config { key: expr, ... }` and `modes { ... }`.
    fn record_block(&mut self, opener: TokenKind, build: impl Fn(Vec<(String, Expr)>) -> Stmt) -> Result<Stmt, Diagnostic> {
        self.expect(&opener, "block keyword")?;
        let pairs = self.record_body()?;
        Ok(build(pairs))
    }

    fn record_body(&mut self) -> Result<Vec<(String, Expr)>, Diagnostic> {
        self.expect(&TokenKind::LBrace, "`{`")?;
        let mut pairs = Vec::new();
        while !self.check(&TokenKind::RBrace) {
            let key = self.consume_identifier()?;
            self.expect(&TokenKind::Colon, "`:`")?;
            let value = self.expression()?;
            pairs.push((key, value));
            if self.check(&TokenKind::Comma) {
                self.advance();
            }
        }
        self.expect(&TokenKind::RBrace, "`}`")?;
        Ok(pairs)
    }

    fn devices_stmt(&mut self) -> Result<Stmt, Diagnostic> {
        self.advance();
        self.expect(&TokenKind::LBrace, "`{`")?;
        let mut items = Vec::new();
        while !self.check(&TokenKind::RBrace) {
            items.push(self.expression()?);
            if self.check(&TokenKind::Comma) {
                self.advance();
            }
        }
        self.expect(&TokenKind::RBrace, "`}`")?;
        Ok(Stmt::DevicesBlock(items))
    }

    fn on_off_mode(&mut self, is_on: bool) -> Result<Stmt, Diagnostic> {
        self.advance();
        self.expect(&TokenKind::Identifier("mode".into()), "`mode`")?;
        let mode = self.consume_identifier()?;
        let body = Box::new(self.block()?);
        Ok(if is_on { Stmt::OnMode { mode, body } } else { Stmt::OffMode { mode, body } })
    }

    /// `<hotkey> => <statement-or-expr>`: the raw atom becomes a
    /// `HotkeyLiteral`-shaped binding; `=>` is required.
    fn hotkey_binding_stmt(&mut self) -> Result<Stmt, Diagnostic> {
        let hotkey = match self.advance().kind {
            TokenKind::Hotkey(s) => s,
            _ => unreachable!(),
        };
        self.expect(&TokenKind::Arrow, "`=>`")?;
        let body = if self.check(&TokenKind::LBrace) {
            Box::new(self.block()?)
        } else {
            let expr = self.expression()?;
            self.skip_semicolon();
            Box::new(Stmt::Expression(expr))
        };
        Ok(Stmt::HotkeyBinding { hotkey, body })
    }

    // --- Expressions, precedence lowest to highest ---

    fn expression(&mut self) -> Result<Expr, Diagnostic> {
        self.assignment()
    }

    fn assignment(&mut self) -> Result<Expr, Diagnostic> {
        let expr = self.pipeline()?;
        if self.check(&TokenKind::Assign) {
            self.advance();
            let value = self.assignment()?;
            return Ok(Expr::Assign { target: Box::new(expr), value: Box::new(value) });
        }
        Ok(expr)
    }

    fn pipeline(&mut self) -> Result<Expr, Diagnostic> {
        let mut source = self.ternary()?;
        let mut stages = Vec::new();
        while self.check(&TokenKind::Pipe) {
            self.advance();
            stages.push(self.ternary()?);
        }
        if stages.is_empty() {
            Ok(source)
        } else {
            source = Expr::Pipeline { source: Box::new(source), stages };
            Ok(source)
        }
    }

    fn ternary(&mut self) -> Result<Expr, Diagnostic> {
        let condition = self.logical_or()?;
        if self.check(&TokenKind::Question) {
            self.advance();
            let if_true = self.expression()?;
            self.expect(&TokenKind::Colon, "`:`")?;
            let if_false = self.expression()?;
            return Ok(Expr::Ternary { condition: Box::new(condition), if_true: Box::new(if_true), if_false: Box::new(if_false) });
        }
        Ok(condition)
    }

    fn logical_or(&mut self) -> Result<Expr, Diagnostic> {
        let mut left = self.logical_and()?;
        while self.check(&TokenKind::OrOr) {
            self.advance();
            let right = self.logical_and()?;
            left = Expr::Binary { op: BinaryOp::Or, left: Box::new(left), right: Box::new(right) };
        }
        Ok(left)
    }

    fn logical_and(&mut self) -> Result<Expr, Diagnostic> {
        let mut left = self.equality()?;
        while self.check(&TokenKind::AndAnd) {
            self.advance();
            let right = self.equality()?;
            left = Expr::Binary { op: BinaryOp::And, left: Box::new(left), right: Box::new(right) };
        }
        Ok(left)
    }

    fn equality(&mut self) -> Result<Expr, Diagnostic> {
        let mut left = self.comparison()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Eq => BinaryOp::Eq,
                TokenKind::NotEq => BinaryOp::Neq,
                _ => break,
            };
            self.advance();
            let right = self.comparison()?;
            left = Expr::Binary { op, left: Box::new(left), right: Box::new(right) };
        }
        Ok(left)
    }

    fn comparison(&mut self) -> Result<Expr, Diagnostic> {
        let mut left = self.range()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Lt => BinaryOp::Lt,
                TokenKind::LtEq => BinaryOp::Lte,
                TokenKind::Gt => BinaryOp::Gt,
                TokenKind::GtEq => BinaryOp::Gte,
                _ => break,
            };
            self.advance();
            let right = self.range()?;
            left = Expr::Binary { op, left: Box::new(left), right: Box::new(right) };
        }
        Ok(left)
    }

    fn range(&mut self) -> Result<Expr, Diagnostic> {
        let mut left = self.additive()?;
        while self.check(&TokenKind::DotDot) {
            self.advance();
            let right = self.additive()?;
            left = Expr::Binary { op: BinaryOp::Range, left: Box::new(left), right: Box::new(right) };
        }
        Ok(left)
    }

    fn additive(&mut self) -> Result<Expr, Diagnostic> {
        let mut left = self.multiplicative()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => break,
            };
            self.advance();
            let right = self.multiplicative()?;
            left = Expr::Binary { op, left: Box::new(left), right: Box::new(right) };
        }
        Ok(left)
    }

    fn multiplicative(&mut self) -> Result<Expr, Diagnostic> {
        let mut left = self.unary()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                TokenKind::Percent => BinaryOp::Mod,
                TokenKind::Caret => BinaryOp::Pow,
                _ => break,
            };
            self.advance();
            let right = self.unary()?;
            left = Expr::Binary { op, left: Box::new(left), right: Box::new(right) };
        }
        Ok(left)
    }

    fn unary(&mut self) -> Result<Expr, Diagnostic> {
        match self.peek().kind {
            TokenKind::Minus => {
                self.advance();
                Ok(Expr::Unary { op: UnaryOp::Neg, operand: Box::new(self.unary()?) })
            }
            TokenKind::Not => {
                self.advance();
                Ok(Expr::Unary { op: UnaryOp::Not, operand: Box::new(self.unary()?) })
            }
            _ => self.postfix(),
        }
    }

    fn postfix(&mut self) -> Result<Expr, Diagnostic> {
        let mut expr = self.primary()?;
        loop {
            match self.peek().kind {
                TokenKind::LParen => {
                    self.advance();
                    let mut args = Vec::new();
                    while !self.check(&TokenKind::RParen) {
                        args.push(self.expression()?);
                        if self.check(&TokenKind::Comma) {
                            self.advance();
                        }
                    }
                    self.expect(&TokenKind::RParen, "`)`")?;
                    expr = Expr::Call { callee: Box::new(expr), args };
                }
                TokenKind::Dot => {
                    self.advance();
                    let property = self.consume_identifier()?;
                    expr = Expr::Member { object: Box::new(expr), property };
                }
                TokenKind::LBracket => {
                    self.advance();
                    let index = self.expression()?;
                    self.expect(&TokenKind::RBracket, "`]`")?;
                    expr = Expr::Index { object: Box::new(expr), index: Box::new(index) };
                }
                _ => break,
            }
        }
        // Command-style call with no parens: `send "Hi"`, `print 42`,
        // `print msg`. Only fires for a bare identifier callee directly
        // followed by something that can only be starting a new argument,
        // never an operator continuing the current expression, so
        // `a - b`/`a | b`/etc. stay binary expressions.
        if matches!(expr, Expr::Identifier(_)) && self.starts_implicit_call_arg() {
            let arg = self.unary()?;
            expr = Expr::Call { callee: Box::new(expr), args: vec![arg] };
        }
        Ok(expr)
    }

    fn starts_implicit_call_arg(&self) -> bool {
        matches!(
            self.peek().kind,
            TokenKind::Number(_)
                | TokenKind::String(_)
                | TokenKind::InterpolatedString(_)
                | TokenKind::Identifier(_)
                | TokenKind::Hotkey(_)
        )
    }

    fn primary(&mut self) -> Result<Expr, Diagnostic> {
        match self.peek().kind.clone() {
            TokenKind::Number(n) => {
                self.advance();
                Ok(Expr::Literal(Literal::Number(n)))
            }
            TokenKind::String(s) => {
                self.advance();
                Ok(Expr::Literal(Literal::String(s)))
            }
            TokenKind::InterpolatedString(raw) => {
                self.advance();
                Ok(Expr::Literal(Literal::InterpolatedString(parse_interpolation(&raw)?)))
            }
            TokenKind::Hotkey(atom) => {
                self.advance();
                Ok(Expr::Literal(Literal::Hotkey(atom)))
            }
            TokenKind::Identifier(name) => {
                self.advance();
                Ok(Expr::Identifier(name))
            }
            TokenKind::LParen => {
                self.advance();
                let expr = self.expression()?;
                self.expect(&TokenKind::RParen, "`)`")?;
                Ok(expr)
            }
            TokenKind::LBracket => {
                self.advance();
                let mut items = Vec::new();
                while !self.check(&TokenKind::RBracket) {
                    items.push(self.expression()?);
                    if self.check(&TokenKind::Comma) {
                        self.advance();
                    }
                }
                self.expect(&TokenKind::RBracket, "`]`")?;
                Ok(Expr::Array(items))
            }
            TokenKind::LBrace => {
                let pairs = self.record_body()?;
                Ok(Expr::Object(pairs))
            }
            TokenKind::Pipe => {
                // `|x, y| expr` lambda syntax, bracketed by the pipe
                // operator's own token (disambiguated by position: a
                // lambda only appears where an expression is expected).
                self.advance();
                let mut params = Vec::new();
                while !self.check(&TokenKind::Pipe) {
                    params.push(self.consume_identifier()?);
                    if self.check(&TokenKind::Comma) {
                        self.advance();
                    }
                }
                self.expect(&TokenKind::Pipe, "`|`")?;
                let body = if self.check(&TokenKind::LBrace) {
                    Box::new(self.block()?)
                } else {
                    Box::new(Stmt::Expression(self.expression()?))
                };
                Ok(Expr::Lambda { params, body })
            }
            TokenKind::Try => {
                self.advance();
                let body = Box::new(self.expression()?);
                self.expect(&TokenKind::Catch, "`catch`")?;
                let catch = Box::new(self.block()?);
                Ok(Expr::Try { body, catch })
            }
            _ => Err(self.error("expected an expression")),
        }
    }
}

/// Split an interpolated string's raw text (already carrying `${...}`
/// markers from the lexer) into alternating text/expression parts.
fn parse_interpolation(raw: &str) -> Result<Vec<InterpolationPart>, Diagnostic> {
    let mut parts = Vec::new();
    let chars: Vec<char> = raw.chars().collect();
    let mut i = 0;
    let mut text = String::new();
    while i < chars.len() {
        if chars[i] == '$' && chars.get(i + 1) == Some(&'{') {
            if !text.is_empty() {
                parts.push(InterpolationPart::Text(std::mem::take(&mut text)));
            }
            let mut depth = 1;
            let start = i + 2;
            let mut j = start;
            while j < chars.len() && depth > 0 {
                match chars[j] {
                    '{' => depth += 1,
                    '}' => depth -= 1,
                    _ => {}
                }
                if depth > 0 {
                    j += 1;
                }
            }
            let inner: String = chars[start..j].iter().collect();
            let tokens = crate::lang::lexer::tokenize(&inner).map_err(|d| d)?;
            let expr = parse_expression_only(tokens)?;
            parts.push(InterpolationPart::Expr(expr));
            i = j + 1;
        } else {
            text.push(chars[i]);
            i += 1;
        }
    }
    if !text.is_empty() {
        parts.push(InterpolationPart::Text(text));
    }
    Ok(parts)
}

fn parse_expression_only(mut tokens: Vec<Token>) -> Result<Expr, Diagnostic> {
    tokens.push(Token { kind: TokenKind::Eof, line: 0, column: 0 });
    let mut parser = Parser { tokens, pos: 0, diagnostics: Vec::new() };
    parser.expression()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lang::lexer::tokenize;

    fn parse_ok(src: &str) -> Program {
        parse(tokenize(src).unwrap()).unwrap()
    }

    #[test]
    fn parses_let_and_if_else() {
        let program = parse_ok("let x = 1\nif x > 0 { print(x) } else { print(0) }");
        assert_eq!(program.statements.len(), 2);
        assert!(matches!(program.statements[0], Stmt::Let { .. }));
        assert!(matches!(program.statements[1], Stmt::If { .. }));
    }

    #[test]
    fn pipeline_parses_as_source_plus_stages() {
        let program = parse_ok("a | upper | trim");
        match &program.statements[0] {
            Stmt::Expression(Expr::Pipeline { stages, .. }) => assert_eq!(stages.len(), 2),
            other => panic!("expected pipeline expression, got {other:?}"),
        }
    }

    #[test]
    fn hotkey_binding_with_block_body() {
        let program = parse_ok("@^W => { send(\"hi\") }");
        match &program.statements[0] {
            Stmt::HotkeyBinding { hotkey, body } => {
                assert_eq!(hotkey, "@^W");
                assert!(matches!(**body, Stmt::Block(_)));
            }
            other => panic!("expected hotkey binding, got {other:?}"),
        }
    }

    #[test]
    fn hotkey_binding_with_expression_body() {
        let program = parse_ok("@F5 => send(\"go\")");
        assert!(matches!(program.statements[0], Stmt::HotkeyBinding { .. }));
    }

    #[test]
    fn syntax_error_synchronizes_to_next_statement() {
        let tokens = tokenize("let = \nlet y = 2").unwrap();
        let result = parse(tokens);
        assert!(result.is_err());
        let diagnostics = result.unwrap_err();
        assert_eq!(diagnostics.len(), 1);
    }

    #[test]
    fn implicit_call_without_parens() {
        let program = parse_ok("print 42");
        match &program.statements[0] {
            Stmt::Expression(Expr::Call { callee, args }) => {
                assert!(matches!(**callee, Expr::Identifier(ref n) if n == "print"));
                assert_eq!(args.len(), 1);
                assert!(matches!(args[0], Expr::Literal(Literal::Number(n)) if n == 42.0));
            }
            other => panic!("expected implicit call, got {other:?}"),
        }
    }

    #[test]
    fn implicit_call_inside_hotkey_body() {
        let program = parse_ok("F1 => send \"Hi\"");
        match &program.statements[0] {
            Stmt::HotkeyBinding { body, .. } => match &**body {
                Stmt::Expression(Expr::Call { args, .. }) => {
                    assert!(matches!(args[0], Expr::Literal(Literal::String(ref s)) if s == "Hi"));
                }
                other => panic!("expected implicit call body, got {other:?}"),
            },
            other => panic!("expected hotkey binding, got {other:?}"),
        }
    }

    #[test]
    fn binary_operators_still_bind_instead_of_forming_implicit_calls() {
        let program = parse_ok("a - b");
        match &program.statements[0] {
            Stmt::Expression(Expr::Binary { op: BinaryOp::Sub, .. }) => {}
            other => panic!("expected binary subtraction, got {other:?}"),
        }
    }

    #[test]
    fn ternary_and_precedence() {
        let program = parse_ok("1 + 2 * 3 == 7 ? 1 : 0");
        assert!(matches!(program.statements[0], Stmt::Expression(Expr::Ternary { .. })));
    }
}
