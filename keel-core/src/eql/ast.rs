use crate::Value;

/// Entity reference with its binding alias (`FROM User u`).
///
/// When the source text gives no alias, the entity name itself is the alias.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityTarget {
    pub entity: String,
    pub alias: String,
}

/// Join kind prefix; `INNER` when the source text gives none.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JoinKind {
    #[default]
    Inner,
    Left,
    Right,
}

/// Relationship join: `JOIN source.Property alias`.
#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub kind: JoinKind,
    pub source_alias: String,
    pub property: String,
    pub alias: String,
}

/// Aggregate function names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateFunction {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl AggregateFunction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AggregateFunction::Count => "COUNT",
            AggregateFunction::Sum => "SUM",
            AggregateFunction::Avg => "AVG",
            AggregateFunction::Min => "MIN",
            AggregateFunction::Max => "MAX",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
}

/// Right-hand side of `IN`: an explicit list or a single parameter expanded
/// at bind time.
#[derive(Debug, Clone, PartialEq)]
pub enum InList {
    Items(Vec<Expr>),
    Parameter(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CaseBranch {
    pub when: Expr,
    pub then: Expr,
}

/// Expression tree of the query language.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// A bare alias in projection position (`SELECT u`).
    Object(String),
    /// Qualified property path (`u.Username`).
    Column { alias: String, property: String },
    /// `:name` placeholder.
    Parameter(String),
    Literal(Value),
    Aggregate {
        function: AggregateFunction,
        distinct: bool,
        operand: Box<Expr>,
    },
    Function {
        name: String,
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
    In {
        operand: Box<Expr>,
        list: InList,
    },
    Between {
        operand: Box<Expr>,
        low: Box<Expr>,
        high: Box<Expr>,
    },
    Like {
        operand: Box<Expr>,
        pattern: Box<Expr>,
        negated: bool,
    },
    IsNull {
        operand: Box<Expr>,
        negated: bool,
    },
    Case {
        operand: Option<Box<Expr>>,
        branches: Vec<CaseBranch>,
        otherwise: Option<Box<Expr>>,
    },
}

/// One projection item with its optional output alias.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectItem {
    pub expr: Expr,
    pub alias: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderItem {
    pub expr: Expr,
    pub descending: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectStatement {
    pub distinct: bool,
    pub items: Vec<SelectItem>,
    pub from: EntityTarget,
    pub joins: Vec<Join>,
    pub where_clause: Option<Expr>,
    pub group_by: Vec<Expr>,
    pub having: Option<Expr>,
    pub order_by: Vec<OrderItem>,
}

/// `alias.Property = expr` assignment in an UPDATE.
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub alias: String,
    pub property: String,
    pub value: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateStatement {
    pub target: EntityTarget,
    pub assignments: Vec<Assignment>,
    pub where_clause: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeleteStatement {
    pub target: EntityTarget,
    pub where_clause: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Select(SelectStatement),
    Update(UpdateStatement),
    Delete(DeleteStatement),
}

/// Parse result: the statement plus the deduplicated parameter names in
/// first-occurrence order.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedQuery {
    pub statement: Statement,
    pub parameters: Vec<String>,
}

impl ParsedQuery {
    /// Root entity reference of the statement.
    pub fn root(&self) -> &EntityTarget {
        match &self.statement {
            Statement::Select(select) => &select.from,
            Statement::Update(update) => &update.target,
            Statement::Delete(delete) => &delete.target,
        }
    }

    pub fn is_select(&self) -> bool {
        matches!(self.statement, Statement::Select(..))
    }
}
