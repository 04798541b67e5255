//! Havel AST (spec component J)
//!
//! A discriminated tree lowered from tokens by the parser and consumed
//! by the bytecode compiler. Statements and expressions are kept as
//! separate enums, mirroring the original `AST.h`'s `Stmt`/`Expr` split.

#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub statements: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Block(Vec<Stmt>),
    Let {
        name: String,
        value: Expr,
    },
    If {
        condition: Expr,
        then_branch: Box<Stmt>,
        else_branch: Option<Box<Stmt>>,
    },
    While {
        condition: Expr,
        body: Box<Stmt>,
    },
    For {
        binding: String,
        iterable: Expr,
        body: Box<Stmt>,
    },
    Loop {
        body: Box<Stmt>,
    },
    Break,
    Continue,
    Function {
        name: String,
        params: Vec<String>,
        body: Box<Stmt>,
    },
    Return(Option<Expr>),
    /// `<hotkey> => <statement-or-expr>`; the raw hotkey atom is kept
    /// as written so it can be re-parsed by the hotkey string parser.
    HotkeyBinding {
        hotkey: String,
        body: Box<Stmt>,
    },
    TypeDecl {
        name: String,
        fields: Vec<String>,
    },
    Import {
        names: Vec<String>,
        module: String,
        alias: Option<String>,
    },
    ModesBlock(Vec<(String, Expr)>),
    OnMode {
        mode: String,
        body: Box<Stmt>,
    },
    OffMode {
        mode: String,
        body: Box<Stmt>,
    },
    ConfigBlock(Vec<(String, Expr)>),
    DevicesBlock(Vec<Expr>),
    Expression(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    /// `"text ${expr} more $ident"` — alternating literal/interpolated
    /// segments, already desugared from `$ident` to `${ident}` by the
    /// lexer.
    InterpolatedString(Vec<InterpolationPart>),
    /// A raw hotkey atom token, e.g. `"@^W"`, reparsed by 4.C at bind time.
    Hotkey(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum InterpolationPart {
    Text(String),
    Expr(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
    And,
    Or,
    Range,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Literal),
    Identifier(String),
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
    Member {
        object: Box<Expr>,
        property: String,
    },
    Index {
        object: Box<Expr>,
        index: Box<Expr>,
    },
    Array(Vec<Expr>),
    Object(Vec<(String, Expr)>),
    /// `a | f | g(args)`, left-to-right; desugared by the compiler into
    /// nested calls rather than carried as its own opcode.
    Pipeline {
        source: Box<Expr>,
        stages: Vec<Expr>,
    },
    Lambda {
        params: Vec<String>,
        body: Box<Stmt>,
    },
    Ternary {
        condition: Box<Expr>,
        if_true: Box<Expr>,
        if_false: Box<Expr>,
    },
    Try {
        body: Box<Expr>,
        catch: Box<Stmt>,
    },
    Assign {
        target: Box<Expr>,
        value: Box<Expr>,
    },
}
