//! Statement and expression trees consumed by the planner and the script
//! interpreter.
//!
//! Parsing is out of scope for this crate; callers construct these trees
//! directly (or from their own front end) and hand them to
//! [`crate::plan::Planner`] or [`crate::script::ScriptExecutor`].

use serde::{Deserialize, Serialize};

use crate::value::Value;

/// Binary comparison and arithmetic operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
}

/// An expression evaluated against a context and, optionally, a row.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// A literal value.
    Literal(Value),
    /// A property of the current row.
    Property(String),
    /// A context variable, e.g. `$retries`.
    Variable(String),
    /// A binary operation.
    Binary { op: BinaryOp, left: Box<Expr>, right: Box<Expr> },
    /// A named function call.
    Call { name: String, args: Vec<Expr> },
}

impl Expr {
    /// Shorthand for a literal expression.
    #[must_use]
    pub fn literal(value: impl Into<Value>) -> Self {
        Self::Literal(value.into())
    }

    /// Shorthand for a property reference.
    #[must_use]
    pub fn property(name: impl Into<String>) -> Self {
        Self::Property(name.into())
    }

    /// Shorthand for a variable reference.
    #[must_use]
    pub fn variable(name: impl Into<String>) -> Self {
        Self::Variable(name.into())
    }

    /// Shorthand for a binary operation.
    #[must_use]
    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Self {
        Self::Binary { op, left: Box::new(left), right: Box::new(right) }
    }
}

/// Which direction an index is walked when it is the query target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexLookupKind {
    /// Plain key lookup order.
    Plain,
    /// Full walk in ascending key order.
    ValuesAsc,
    /// Full walk in descending key order.
    ValuesDesc,
}

/// The source a `SELECT` reads from.
#[derive(Debug, Clone, PartialEq)]
pub enum SelectTarget {
    /// A schema class.
    Class(String),
    /// An index, addressed by name.
    Index { name: String, kind: IndexLookupKind },
    /// A nested query whose output is the input stream.
    Subquery(Box<SelectStatement>),
}

/// The shape of a `SELECT` output.
#[derive(Debug, Clone, PartialEq)]
pub enum Projection {
    /// Every property of the matched records.
    All,
    /// `count(*)`, surfaced under the given alias.
    Count { alias: String },
    /// `expand(<expr>)`: unnest the expression's value into rows.
    Expand(Expr),
}

/// A call to a function backed by an index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedFunctionCall {
    /// Function name.
    pub function: String,
    /// Pre-evaluated arguments.
    pub args: Vec<Value>,
}

/// A condition of the form `fn(args) <op> rhs` where `fn` can be answered
/// by an index instead of a row-by-row scan. Serializable because planned
/// step payloads carrying one cross a serialization boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedFunctionCondition {
    /// The indexed function call on the left-hand side.
    pub call: IndexedFunctionCall,
    /// Comparison operator, e.g. `">"` or `"="`.
    pub operator: String,
    /// Right-hand side literal.
    pub rhs: Value,
}

/// A `WHERE` clause.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// A plain boolean expression over the row.
    Expr(Expr),
    /// An indexed-function condition.
    IndexedFunction(IndexedFunctionCondition),
}

/// A `SELECT` statement.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectStatement {
    pub target: SelectTarget,
    pub projection: Projection,
    pub condition: Option<Condition>,
    pub distinct: bool,
}

impl SelectStatement {
    /// A `SELECT *` over a class with no condition.
    #[must_use]
    pub fn from_class(class_name: impl Into<String>) -> Self {
        Self {
            target: SelectTarget::Class(class_name.into()),
            projection: Projection::All,
            condition: None,
            distinct: false,
        }
    }

    /// Sets the projection.
    #[must_use]
    pub fn with_projection(mut self, projection: Projection) -> Self {
        self.projection = projection;
        self
    }

    /// Sets the condition.
    #[must_use]
    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.condition = Some(condition);
        self
    }

    /// Marks the query distinct.
    #[must_use]
    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }
}

/// An `INSERT` statement.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertStatement {
    /// Target class.
    pub class_name: String,
    /// `SET` assignments, evaluated against the context.
    pub set_items: Vec<(String, Expr)>,
    /// When set, the target class must be this class or a subclass of it.
    pub require_base: Option<String>,
}

/// A `DELETE` statement.
#[derive(Debug, Clone, PartialEq)]
pub struct DeleteStatement {
    /// Class whose records are candidates for deletion.
    pub class_name: String,
    /// Optional filter over the candidates.
    pub condition: Option<Expr>,
}

/// The value bound by a `LET` statement.
#[derive(Debug, Clone, PartialEq)]
pub enum LetValue {
    /// An expression evaluated against the context.
    Expr(Expr),
    /// A query whose result rows are bound as a list of records.
    Query(SelectStatement),
}

/// A statement inside a script (or a standalone command).
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Select(SelectStatement),
    Insert(InsertStatement),
    Delete(DeleteStatement),
    /// Opens a transaction.
    Begin,
    /// Commits the open transaction. `retry` > 0 re-runs the whole
    /// transactional block on conflict, up to `retry` attempts. After
    /// exhaustion the `else_block` runs, then the conflict is re-raised
    /// unless `else_fail` is false.
    Commit { retry: u32, else_block: Option<Vec<Statement>>, else_fail: bool },
    /// Rolls back the open transaction.
    Rollback,
    /// Binds a context variable.
    Let { name: String, value: LetValue },
    /// Runs the block when the condition is truthy.
    If { condition: Expr, block: Vec<Statement> },
    /// Ends the script, optionally yielding a value.
    Return(Option<Expr>),
    /// A bare expression, evaluated for its value (and side effects).
    Expr(Expr),
}

impl Statement {
    /// A plain `COMMIT` with no retry clause.
    #[must_use]
    pub fn commit() -> Self {
        Self::Commit { retry: 0, else_block: None, else_fail: true }
    }

    /// `COMMIT RETRY n`, failing after exhaustion.
    #[must_use]
    pub fn commit_retry(retry: u32) -> Self {
        Self::Commit { retry, else_block: None, else_fail: true }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn select_builder() {
        let stmt = SelectStatement::from_class("Person")
            .with_condition(Condition::Expr(Expr::binary(
                BinaryOp::Eq,
                Expr::property("name"),
                Expr::literal("Alice"),
            )))
            .distinct();

        assert_eq!(stmt.target, SelectTarget::Class("Person".to_string()));
        assert!(stmt.distinct);
        assert!(stmt.condition.is_some());
    }

    #[test]
    fn commit_defaults_to_fail_on_exhaustion() {
        match Statement::commit_retry(3) {
            Statement::Commit { retry, else_block, else_fail } => {
                assert_eq!(retry, 3);
                assert!(else_block.is_none());
                assert!(else_fail);
            }
            other => panic!("unexpected statement: {other:?}"),
        }
    }

    #[test]
    fn indexed_function_condition_round_trips_through_json() {
        let cond = IndexedFunctionCondition {
            call: IndexedFunctionCall {
                function: "near".to_string(),
                args: vec![Value::Float(1.5), Value::Float(2.5)],
            },
            operator: ">".to_string(),
            rhs: Value::Int(10),
        };
        let json = serde_json::to_string(&cond).unwrap();
        let back: IndexedFunctionCondition = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cond);
    }
}
