//! Expression and statement IR.
//!
//! Both trees are closed tagged unions; the evaluator dispatches with
//! `match` rather than virtual calls, and nodes are immutable once built.

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Number(f64),
    Str(String),
    Bool(bool),
    /// Interior of a `#...#` literal, interpreted at evaluation time.
    Date(String),
    Nothing,
    Null,
    Empty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    IntDiv,
    Mod,
    Pow,
    Concat,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    And,
    Or,
    Xor,
    Eqv,
    Imp,
    Is,
    Like,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Literal),
    Identifier(String),
    /// `object.member`; a `None` object reads the top of the With stack.
    Member {
        object: Option<Box<Expr>>,
        member: String,
    },
    /// Postfix parentheses on something that is not a name, e.g.
    /// `f(1)(2)`. Name-shaped targets become [`Expr::Call`] and the
    /// evaluator decides between invocation and indexing.
    Index {
        target: Box<Expr>,
        indexes: Vec<Expr>,
    },
    Call {
        target: Box<Expr>,
        args: Vec<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    New(String),
    /// `TypeOf value Is TypeName`.
    TypeOf {
        value: Box<Expr>,
        type_name: String,
    },
    Paren(Box<Expr>),
    /// An omitted argument slot, e.g. `Offset(, 1)`.
    Missing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopConditionKind {
    While,
    Until,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionPosition {
    Pre,
    Post,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitKind {
    Sub,
    Function,
    Property,
    For,
    Do,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ErrorHandling {
    ResumeNext,
    Goto0,
    Label(String),
}

/// One `Case` arm with its condition list.
#[derive(Debug, Clone, PartialEq)]
pub struct CaseArm {
    pub conditions: Vec<CaseCondition>,
    pub body: Vec<Stmt>,
}

/// Accepted `Case` condition syntax. Range and `Is` forms parse but the
/// evaluator currently treats all three as equality against the test
/// value.
#[derive(Debug, Clone, PartialEq)]
pub enum CaseCondition {
    Expr(Expr),
    Range { from: Expr, to: Expr },
    Is { op: BinaryOp, expr: Expr },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArrayDim {
    pub lower: Option<Expr>,
    pub upper: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DimVar {
    pub name: String,
    pub type_name: Option<String>,
    pub dims: Vec<ArrayDim>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Assign {
        target: Expr,
        value: Expr,
    },
    /// `Set target = value`.
    SetAssign {
        target: Expr,
        value: Expr,
    },
    Call(Expr),
    If {
        /// The `If` branch followed by any `ElseIf` branches.
        branches: Vec<(Expr, Vec<Stmt>)>,
        else_body: Vec<Stmt>,
    },
    SelectCase {
        test: Expr,
        cases: Vec<CaseArm>,
        else_body: Vec<Stmt>,
    },
    For {
        counter: String,
        start: Expr,
        end: Expr,
        step: Option<Expr>,
        body: Vec<Stmt>,
    },
    ForEach {
        element: String,
        collection: Expr,
        body: Vec<Stmt>,
    },
    DoLoop {
        condition: Option<(LoopConditionKind, Expr)>,
        position: ConditionPosition,
        body: Vec<Stmt>,
    },
    /// Legacy `While ... Wend`.
    While {
        condition: Expr,
        body: Vec<Stmt>,
    },
    Dim(Vec<DimVar>),
    Exit(ExitKind),
    OnError(ErrorHandling),
    With {
        object: Expr,
        body: Vec<Stmt>,
    },
    RaiseEvent {
        name: String,
        args: Vec<Expr>,
    },
}
