//! Havel Lexer (spec component I)
//!
//! Streams Unicode source into tokens: comments (`//`, `/* */`, `#`),
//! numeric and string literals (with `${expr}`/`$ident` interpolation),
//! identifiers/keywords, hotkey atoms, and the compound operators.
//! Grounded on the original `Lexer.cpp`'s token set, narrowed to what
//! the parser actually consumes.

use crate::error::Diagnostic;

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Let,
    If,
    Else,
    While,
    For,
    In,
    Loop,
    Break,
    Continue,
    Fn,
    Return,
    Config,
    Devices,
    Modes,
    On,
    Off,
    Import,
    From,
    As,
    Try,
    Catch,

    Identifier(String),
    Number(f64),
    String(String),
    /// Raw text with `${expr}` / `$ident` markers not yet parsed; the
    /// parser re-lexes each interpolated span as its own expression.
    InterpolatedString(String),
    /// A hotkey atom: `F`+digits, or starting with any of `^+!#@~|*$`.
    Hotkey(String),

    Arrow,   // =>
    Eq,      // ==
    NotEq,   // !=
    LtEq,    // <=
    GtEq,    // >=
    AndAnd,  // &&
    OrOr,    // ||
    DotDot,  // ..
    PlusEq,  // +=
    MinusEq, // -=
    StarEq,  // *=
    SlashEq, // /=

    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Caret,
    Lt,
    Gt,
    Not,
    Assign,
    Pipe,
    Question,
    Colon,
    Semicolon,
    Comma,
    Dot,
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,

    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub line: usize,
    pub column: usize,
}

pub struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    column: usize,
    /// Line of the last-emitted token, and whether that token closes a
    /// statement. Together they tell `scan_token` whether the char it's
    /// looking at opens a new statement (and so may lead a hotkey atom)
    /// or sits mid-expression (and so must be an operator).
    prev_line: usize,
    prev_boundary: bool,
}

impl Lexer {
    pub fn new(source: &str) -> Self {
        Lexer {
            chars: source.chars().collect(),
            pos: 0,
            line: 1,
            column: 1,
            prev_line: 0,
            prev_boundary: true,
        }
    }

    pub fn tokenize(mut self) -> Result<Vec<Token>, Diagnostic> {
        let mut tokens = Vec::new();
        loop {
            self.skip_whitespace_and_comments();
            if self.is_at_end() {
                tokens.push(Token { kind: TokenKind::Eof, line: self.line, column: self.column });
                break;
            }
            let token = self.scan_token()?;
            self.prev_line = token.line;
            self.prev_boundary = matches!(
                token.kind,
                TokenKind::Semicolon | TokenKind::LBrace | TokenKind::RBrace | TokenKind::Arrow
            );
            tokens.push(token);
        }
        Ok(tokens)
    }

    fn is_at_end(&self) -> bool {
        self.pos >= self.chars.len()
    }

    fn peek(&self, offset: usize) -> char {
        self.chars.get(self.pos + offset).copied().unwrap_or('\0')
    }

    fn advance(&mut self) -> char {
        let c = self.chars[self.pos];
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        c
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            match self.peek(0) {
                ' ' | '\t' | '\r' | '\n' => {
                    self.advance();
                }
                '#' => {
                    while !self.is_at_end() && self.peek(0) != '\n' {
                        self.advance();
                    }
                }
                '/' if self.peek(1) == '/' => {
                    while !self.is_at_end() && self.peek(0) != '\n' {
                        self.advance();
                    }
                }
                '/' if self.peek(1) == '*' => {
                    self.advance();
                    self.advance();
                    while !self.is_at_end() && !(self.peek(0) == '*' && self.peek(1) == '/') {
                        self.advance();
                    }
                    if !self.is_at_end() {
                        self.advance();
                        self.advance();
                    }
                }
                _ => break,
            }
        }
    }

    fn scan_token(&mut self) -> Result<Token, Diagnostic> {
        let (line, column) = (self.line, self.column);
        let c = self.peek(0);
        // A leader char only opens a hotkey atom at a statement boundary;
        // mid-expression it's the operator it already denotes (`+`, `*`,
        // `|`, `^`, `!`). `F<digit>` has no competing operator meaning so
        // it stays unconditional.
        let at_stmt_start = self.prev_boundary || line > self.prev_line;

        if c.is_ascii_digit() {
            return Ok(Token { kind: self.scan_number(), line, column });
        }
        if c == '"' || c == '\'' {
            return self.scan_string(line, column);
        }
        if (c == 'F' && self.peek(1).is_ascii_digit()) || (at_stmt_start && is_hotkey_leader(c)) {
            return Ok(Token { kind: self.scan_hotkey(), line, column });
        }
        if c.is_alphabetic() || c == '_' {
            return Ok(Token { kind: self.scan_identifier(), line, column });
        }

        self.advance();
        let kind = match c {
            '=' if self.peek(0) == '=' => { self.advance(); TokenKind::Eq }
            '=' if self.peek(0) == '>' => { self.advance(); TokenKind::Arrow }
            '=' => TokenKind::Assign,
            '!' if self.peek(0) == '=' => { self.advance(); TokenKind::NotEq }
            '!' => TokenKind::Not,
            '<' if self.peek(0) == '=' => { self.advance(); TokenKind::LtEq }
            '<' => TokenKind::Lt,
            '>' if self.peek(0) == '=' => { self.advance(); TokenKind::GtEq }
            '>' => TokenKind::Gt,
            '&' if self.peek(0) == '&' => { self.advance(); TokenKind::AndAnd }
            '|' if self.peek(0) == '|' => { self.advance(); TokenKind::OrOr }
            '|' => TokenKind::Pipe,
            '.' if self.peek(0) == '.' => { self.advance(); TokenKind::DotDot }
            '.' => TokenKind::Dot,
            '+' if self.peek(0) == '=' => { self.advance(); TokenKind::PlusEq }
            '+' => TokenKind::Plus,
            '-' if self.peek(0) == '=' => { self.advance(); TokenKind::MinusEq }
            '-' => TokenKind::Minus,
            '*' if self.peek(0) == '=' => { self.advance(); TokenKind::StarEq }
            '*' => TokenKind::Star,
            '/' if self.peek(0) == '=' => { self.advance(); TokenKind::SlashEq }
            '/' => TokenKind::Slash,
            '%' => TokenKind::Percent,
            '^' => TokenKind::Caret,
            '?' => TokenKind::Question,
            ':' => TokenKind::Colon,
            ';' => TokenKind::Semicolon,
            ',' => TokenKind::Comma,
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '{' => TokenKind::LBrace,
            '}' => TokenKind::RBrace,
            '[' => TokenKind::LBracket,
            ']' => TokenKind::RBracket,
            other => return Err(Diagnostic::new(line, column, format!("unexpected character `{other}`"))),
        };
        Ok(Token { kind, line, column })
    }

    fn scan_number(&mut self) -> TokenKind {
        let start = self.pos;
        while self.peek(0).is_ascii_digit() {
            self.advance();
        }
        if self.peek(0) == '.' && self.peek(1).is_ascii_digit() {
            self.advance();
            while self.peek(0).is_ascii_digit() {
                self.advance();
            }
        }
        let text: String = self.chars[start..self.pos].iter().collect();
        TokenKind::Number(text.parse().unwrap_or(0.0))
    }

    /// Scans a quoted string, tracking `${...}` brace depth so object
    /// literals inside an interpolation parse correctly, and desugaring
    /// bare `$ident` to `${ident}` as it goes.
    fn scan_string(&mut self, line: usize, column: usize) -> Result<Token, Diagnostic> {
        let quote = self.advance();
        let mut raw = String::new();
        let mut has_interpolation = false;

        loop {
            if self.is_at_end() {
                return Err(Diagnostic::new(line, column, "unterminated string literal"));
            }
            let c = self.advance();
            if c == quote {
                break;
            }
            if c == '\\' {
                let escaped = self.advance();
                raw.push(match escaped {
                    'n' => '\n',
                    't' => '\t',
                    'r' => '\r',
                    other => other,
                });
                continue;
            }
            if c == '$' && self.peek(0) == '{' {
                has_interpolation = true;
                raw.push('$');
                raw.push(self.advance());
                let mut depth = 1;
                while depth > 0 && !self.is_at_end() {
                    let inner = self.advance();
                    if inner == '{' {
                        depth += 1;
                    } else if inner == '}' {
                        depth -= 1;
                    }
                    raw.push(inner);
                }
                continue;
            }
            if c == '$' && (self.peek(0).is_alphabetic() || self.peek(0) == '_') {
                has_interpolation = true;
                let mut ident = String::new();
                while self.peek(0).is_alphanumeric() || self.peek(0) == '_' {
                    ident.push(self.advance());
                }
                raw.push_str(&format!("${{{ident}}}"));
                continue;
            }
            raw.push(c);
        }

        let kind = if has_interpolation {
            TokenKind::InterpolatedString(raw)
        } else {
            TokenKind::String(raw)
        };
        Ok(Token { kind, line, column })
    }

    fn scan_identifier(&mut self) -> TokenKind {
        let start = self.pos;
        while self.peek(0).is_alphanumeric() || self.peek(0) == '_' {
            self.advance();
        }
        let text: String = self.chars[start..self.pos].iter().collect();
        match text.as_str() {
            "let" => TokenKind::Let,
            "if" => TokenKind::If,
            "else" => TokenKind::Else,
            "while" => TokenKind::While,
            "for" => TokenKind::For,
            "in" => TokenKind::In,
            "loop" => TokenKind::Loop,
            "break" => TokenKind::Break,
            "continue" => TokenKind::Continue,
            "fn" => TokenKind::Fn,
            "return" => TokenKind::Return,
            "config" => TokenKind::Config,
            "devices" => TokenKind::Devices,
            "modes" => TokenKind::Modes,
            "on" => TokenKind::On,
            "off" => TokenKind::Off,
            "import" => TokenKind::Import,
            "from" => TokenKind::From,
            "as" => TokenKind::As,
            "try" => TokenKind::Try,
            "catch" => TokenKind::Catch,
            "true" => TokenKind::Number(1.0),
            "false" => TokenKind::Number(0.0),
            _ => TokenKind::Identifier(text),
        }
    }

    /// A hotkey atom is greedy: prefix/modifier characters followed by
    /// alphanumeric atoms, possibly `&`-joined, possibly suffixed with
    /// `:down`/`:up`/`:NNN`. Consumed whole so the hotkey string parser
    /// (4.C) can re-tokenize it independently.
    fn scan_hotkey(&mut self) -> TokenKind {
        let start = self.pos;
        while matches!(self.peek(0), '@' | '~' | '|' | '*' | '$' | '^' | '+' | '!' | '#')
            || self.peek(0).is_alphanumeric()
            || self.peek(0) == '&'
            || (self.peek(0) == ':' && (self.peek(1).is_ascii_digit() || self.peek(1).is_alphabetic()))
        {
            self.advance();
        }
        let text: String = self.chars[start..self.pos].iter().collect();
        TokenKind::Hotkey(text)
    }
}

/// A prefix/modifier character that can open a hotkey atom, checked only
/// at statement boundaries (see `scan_token`'s `at_stmt_start`) since most
/// of these characters double as binary/unary operators.
fn is_hotkey_leader(c: char) -> bool {
    matches!(c, '^' | '+' | '!' | '#' | '@' | '~' | '|' | '*')
}

pub fn tokenize(source: &str) -> Result<Vec<Token>, Diagnostic> {
    Lexer::new(source).tokenize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenizes_let_binding() {
        let tokens = tokenize("let x = 5").unwrap();
        assert!(matches!(tokens[0].kind, TokenKind::Let));
        assert!(matches!(&tokens[1].kind, TokenKind::Identifier(s) if s == "x"));
        assert!(matches!(tokens[2].kind, TokenKind::Assign));
        assert!(matches!(tokens[3].kind, TokenKind::Number(n) if n == 5.0));
    }

    #[test]
    fn skips_all_comment_styles() {
        let tokens = tokenize("# c1\n// c2\n/* c3 */ let y = 1").unwrap();
        assert!(matches!(tokens[0].kind, TokenKind::Let));
    }

    #[test]
    fn interpolated_string_carries_raw_markers() {
        let tokens = tokenize(r#""hello ${name}!""#).unwrap();
        match &tokens[0].kind {
            TokenKind::InterpolatedString(raw) => assert!(raw.contains("${name}")),
            other => panic!("expected interpolated string, got {other:?}"),
        }
    }

    #[test]
    fn bare_dollar_ident_desugars_to_braced_form() {
        let tokens = tokenize(r#""hi $name""#).unwrap();
        match &tokens[0].kind {
            TokenKind::InterpolatedString(raw) => assert!(raw.contains("${name}")),
            other => panic!("expected interpolated string, got {other:?}"),
        }
    }

    #[test]
    fn hotkey_atom_is_captured_whole() {
        let tokens = tokenize("@^W:down =>").unwrap();
        assert!(matches!(&tokens[0].kind, TokenKind::Hotkey(s) if s == "@^W:down"));
        assert!(matches!(tokens[1].kind, TokenKind::Arrow));
    }

    #[test]
    fn compound_operators() {
        let tokens = tokenize("a == b && c != d || e..f").unwrap();
        let kinds: Vec<&TokenKind> = tokens.iter().map(|t| &t.kind).collect();
        assert!(kinds.contains(&&TokenKind::Eq));
        assert!(kinds.contains(&&TokenKind::AndAnd));
        assert!(kinds.contains(&&TokenKind::NotEq));
        assert!(kinds.contains(&&TokenKind::OrOr));
        assert!(kinds.contains(&&TokenKind::DotDot));
    }

    #[test]
    fn arithmetic_operators_are_not_stolen_by_hotkey_scanning() {
        let tokens = tokenize("2 + 3 * 4 ^ 5").unwrap();
        let kinds: Vec<&TokenKind> = tokens.iter().map(|t| &t.kind).collect();
        assert!(kinds.contains(&&TokenKind::Plus));
        assert!(kinds.contains(&&TokenKind::Star));
        assert!(kinds.contains(&&TokenKind::Caret));
        assert!(!kinds.iter().any(|k| matches!(k, TokenKind::Hotkey(_))));
    }

    #[test]
    fn pipeline_bar_is_not_stolen_mid_expression() {
        let tokens = tokenize("a | upper | trim").unwrap();
        let kinds: Vec<&TokenKind> = tokens.iter().map(|t| &t.kind).collect();
        assert_eq!(kinds.iter().filter(|k| matches!(k, TokenKind::Pipe)).count(), 2);
        assert!(!kinds.iter().any(|k| matches!(k, TokenKind::Hotkey(_))));
    }

    #[test]
    fn hotkey_leader_still_works_at_statement_start() {
        let tokens = tokenize("@^W => send(\"hi\")\n^!F5 => send(\"bye\")").unwrap();
        assert!(matches!(&tokens[0].kind, TokenKind::Hotkey(s) if s == "@^W"));
        let hotkey_count = tokens.iter().filter(|t| matches!(t.kind, TokenKind::Hotkey(_))).count();
        assert_eq!(hotkey_count, 2);
    }
}
