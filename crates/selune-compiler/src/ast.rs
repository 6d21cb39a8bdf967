//! Abstract Syntax Tree (AST) definitions
//!
//! The parser produces this tree; the compiler lowers it. Both hierarchies
//! are closed variant sets, pattern-matched directly in lowering.

use crate::span::Span;
use serde::Serialize;

/// Top-level source unit: a single block compiled as the variadic `$main`
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub block: Block,
}

/// A sequence of statements
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub statements: Vec<Stmt>,
}

/// Statement node
#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: Span,
}

/// Statement kinds
#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    /// Lone `;`
    Empty,
    /// `t1, t2 = e1, e2`
    Assign {
        targets: Vec<Expr>,
        values: Vec<Expr>,
    },
    /// `local n1 <attr>, n2 = e1, e2`
    Local {
        names: Vec<AttribName>,
        values: Vec<Expr>,
    },
    /// `if … then … elseif … else … end`
    If {
        condition: Expr,
        body: Block,
        elseifs: Vec<ElseIf>,
        else_body: Option<Block>,
    },
    /// `while … do … end`
    While { condition: Expr, body: Block },
    /// `repeat … until …`
    Repeat { body: Block, condition: Expr },
    /// `for v = initial, limit [, step] do … end`
    NumericFor {
        control: String,
        initial: Expr,
        limit: Expr,
        step: Option<Expr>,
        body: Block,
    },
    /// `for v1, v2 in e1, e2 do … end`
    GenericFor {
        names: Vec<String>,
        values: Vec<Expr>,
        body: Block,
    },
    Break,
    /// `goto label`
    Goto { label: String },
    /// `::label::`
    Label { name: String },
    /// `return e1, e2`
    Return { values: Vec<Expr> },
    /// `function a.b.c() … end` / `function a:m() … end`
    FunctionDef { name: FuncName, body: FuncBody },
    /// `local function f() … end`
    LocalFunctionDef { name: String, body: FuncBody },
    /// A function or method call in statement position
    Call(Expr),
    /// `do … end`
    Do(Block),
}

/// One `elseif` branch
#[derive(Debug, Clone, PartialEq)]
pub struct ElseIf {
    pub condition: Expr,
    pub body: Block,
}

/// A declared name with its optional attribute
#[derive(Debug, Clone, PartialEq)]
pub struct AttribName {
    pub name: String,
    pub attribute: Option<String>,
    pub span: Span,
}

/// The dotted (and optionally method) path of a function statement
#[derive(Debug, Clone, PartialEq)]
pub struct FuncName {
    /// Path segments: `a.b.c` → `["a", "b", "c"]`, method name included
    pub names: Vec<String>,
    /// True for `function a:m()` — `self` is prepended to the parameters
    pub is_method: bool,
}

impl FuncName {
    /// Dotted display form used for prototype diagnostics
    pub fn joined(&self) -> String {
        self.names.join(".")
    }
}

/// Parameter list plus body of a function literal
#[derive(Debug, Clone, PartialEq)]
pub struct FuncBody {
    pub params: Vec<String>,
    pub is_variadic: bool,
    pub block: Block,
    pub span: Span,
}

/// Expression node
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

/// Expression kinds
#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Nil,
    True,
    False,
    /// Integer literal
    Integer(i64),
    /// Float literal; integral-valued floats stay floats
    Float(f64),
    /// Byte-string literal
    Str(Vec<u8>),
    /// `...` (multi-result)
    Varargs,
    /// Variable reference by name
    Name(String),
    /// `base.name`
    Dot { base: Box<Expr>, name: String },
    /// `base[key]`
    Index { base: Box<Expr>, key: Box<Expr> },
    /// `callee(args)` (multi-result)
    Call { callee: Box<Expr>, args: Vec<Expr> },
    /// `receiver:name(args)` (multi-result)
    MethodCall {
        receiver: Box<Expr>,
        name: String,
        args: Vec<Expr>,
    },
    /// Function literal
    Function(FuncBody),
    /// `{ … }`
    Table(Vec<Field>),
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Unary { op: UnaryOp, operand: Box<Expr> },
    /// Parenthesized expression: truncates a multi-result child to one value
    Paren(Box<Expr>),
}

impl Expr {
    pub fn new(kind: ExprKind, span: Span) -> Self {
        Self { kind, span }
    }

    /// True for literals usable as compile-time constants
    pub fn is_constant(&self) -> bool {
        matches!(
            self.kind,
            ExprKind::Nil
                | ExprKind::True
                | ExprKind::False
                | ExprKind::Integer(_)
                | ExprKind::Float(_)
                | ExprKind::Str(_)
        )
    }

    /// True for expressions that may produce a variable number of values
    pub fn is_multires(&self) -> bool {
        matches!(
            self.kind,
            ExprKind::Varargs | ExprKind::Call { .. } | ExprKind::MethodCall { .. }
        )
    }
}

/// One entry of a table constructor
#[derive(Debug, Clone, PartialEq)]
pub enum Field {
    /// `[key] = value`
    Keyed { key: Expr, value: Expr },
    /// `name = value`
    Named { name: String, value: Expr },
    /// Bare positional value
    Positional(Expr),
}

/// Binary operation kinds, in source evaluation order (left then right)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    IDiv,
    Mod,
    Pow,
    Concat,
    Eq,
    NotEq,
    Less,
    LessEq,
    Greater,
    GreaterEq,
    And,
    Or,
    BAnd,
    BOr,
    BXor,
    Shl,
    Shr,
}

/// Unary operation kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum UnaryOp {
    Neg,
    Not,
    Len,
    BNot,
}
