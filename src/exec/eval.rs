//! Expression evaluation.
//!
//! Expressions are evaluated against a context and an optional row:
//! property references read the row, variable references read the context
//! chain, and numeric binary operations coerce `Int`/`Float` the usual
//! way. Missing properties and variables evaluate to `Null` rather than
//! erroring, matching how filters treat absent data.

use std::sync::Arc;

use crate::ast::{BinaryOp, Expr};
use crate::error::{ExecResult, ExecutionError};
use crate::exec::context::CommandContext;
use crate::row::Row;
use crate::value::Value;

/// Evaluates an expression.
pub fn evaluate(
    expr: &Expr,
    ctx: &Arc<CommandContext>,
    row: Option<&Row>,
) -> ExecResult<Value> {
    match expr {
        Expr::Literal(value) => Ok(value.clone()),
        Expr::Property(name) => Ok(row.and_then(|r| r.get(name)).unwrap_or(Value::Null)),
        Expr::Variable(name) => Ok(ctx.variable(name).unwrap_or(Value::Null)),
        Expr::Binary { op, left, right } => {
            let left = evaluate(left, ctx, row)?;
            let right = evaluate(right, ctx, row)?;
            apply_binary(*op, &left, &right)
        }
        Expr::Call { name, args } => {
            let mut evaluated = Vec::with_capacity(args.len());
            for arg in args {
                evaluated.push(evaluate(arg, ctx, row)?);
            }
            call_function(name, &evaluated)
        }
    }
}

fn apply_binary(op: BinaryOp, left: &Value, right: &Value) -> ExecResult<Value> {
    match op {
        BinaryOp::Eq => Ok(Value::Bool(values_equal(left, right))),
        BinaryOp::Ne => Ok(Value::Bool(!values_equal(left, right))),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            compare(op, left, right)
        }
        BinaryOp::Add | BinaryOp::Sub => arithmetic(op, left, right),
    }
}

/// Equality with `Int`/`Float` cross-type coercion.
fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => {
            (*a as f64) == *b
        }
        _ => left == right,
    }
}

fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Int(i) => Some(*i as f64),
        Value::Float(f) => Some(*f),
        _ => None,
    }
}

fn compare(op: BinaryOp, left: &Value, right: &Value) -> ExecResult<Value> {
    let ordering = match (left, right) {
        (Value::String(a), Value::String(b)) => a.partial_cmp(b),
        _ => match (as_f64(left), as_f64(right)) {
            (Some(a), Some(b)) => a.partial_cmp(&b),
            _ => None,
        },
    };
    let Some(ordering) = ordering else {
        // Incomparable operands: the condition is simply not satisfied.
        return Ok(Value::Bool(false));
    };
    let result = match op {
        BinaryOp::Lt => ordering.is_lt(),
        BinaryOp::Le => ordering.is_le(),
        BinaryOp::Gt => ordering.is_gt(),
        BinaryOp::Ge => ordering.is_ge(),
        _ => false,
    };
    Ok(Value::Bool(result))
}

fn arithmetic(op: BinaryOp, left: &Value, right: &Value) -> ExecResult<Value> {
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => Ok(Value::Int(match op {
            BinaryOp::Add => a.wrapping_add(*b),
            _ => a.wrapping_sub(*b),
        })),
        _ => match (as_f64(left), as_f64(right)) {
            (Some(a), Some(b)) => Ok(Value::Float(match op {
                BinaryOp::Add => a + b,
                _ => a - b,
            })),
            _ => Err(ExecutionError::Command(format!(
                "cannot apply {op:?} to {left:?} and {right:?}"
            ))),
        },
    }
}

fn call_function(name: &str, args: &[Value]) -> ExecResult<Value> {
    match name {
        // Deliberately raises a retryable conflict. Scripts use it to
        // force the retry machinery from inside a transactional block.
        "raise_conflict" => {
            let detail = args
                .first()
                .and_then(Value::as_str)
                .unwrap_or("raised by script");
            Err(ExecutionError::Conflict(detail.to_string()))
        }
        "coalesce" => Ok(args
            .iter()
            .find(|v| !v.is_null())
            .cloned()
            .unwrap_or(Value::Null)),
        _ => Err(ExecutionError::Command(format!("unknown function: {name}"))),
    }
}
