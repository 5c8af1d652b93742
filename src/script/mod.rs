//! Multi-statement script execution.
//!
//! A script runs statements in order inside one context. A `BEGIN` ..
//! `COMMIT RETRY n` block is the unit of conflict recovery: a retryable
//! conflict raised by any statement inside the block (including the
//! commit itself) rolls the transaction back and re-runs the whole block,
//! up to `n` attempts. Variables set before or during an attempt survive
//! into the next one; only transactional data changes are rolled back.

use std::sync::Arc;

use tracing::debug;

use crate::ast::{LetValue, Statement};
use crate::error::{ExecResult, ExecutionError};
use crate::exec::context::CommandContext;
use crate::exec::eval::evaluate;
use crate::exec::stream::ExecutionStream;
use crate::plan::Planner;
use crate::row::ProjectionRow;
use crate::value::Value;

/// The rows a script (or one statement) produced.
pub type ScriptOutput = Vec<ProjectionRow>;

enum Flow {
    /// Keep executing the following statements.
    Continue(ScriptOutput),
    /// `RETURN` was hit; the script ends with this output.
    Return(ScriptOutput),
}

/// Runs statement sequences against a context.
pub struct ScriptExecutor {
    planner: Planner,
}

impl ScriptExecutor {
    #[must_use]
    pub fn new() -> Self {
        Self { planner: Planner::new() }
    }

    /// Runs a script to completion. The output is the `RETURN` value when
    /// one is hit, otherwise the rows of the last executed statement.
    pub fn execute(
        &self,
        script: &[Statement],
        ctx: &Arc<CommandContext>,
    ) -> ExecResult<ScriptOutput> {
        match self.exec_sequence(script, ctx)? {
            Flow::Continue(output) | Flow::Return(output) => Ok(output),
        }
    }

    fn exec_sequence(
        &self,
        stmts: &[Statement],
        ctx: &Arc<CommandContext>,
    ) -> ExecResult<Flow> {
        let mut output = ScriptOutput::new();
        let mut i = 0;
        while i < stmts.len() {
            if let Statement::Begin = &stmts[i] {
                let end = find_matching_commit(stmts, i)?;
                if let Statement::Commit { retry, else_block, else_fail } = &stmts[end] {
                    if *retry > 0 {
                        match self.run_retry_block(
                            &stmts[i..=end],
                            *retry,
                            else_block.as_deref(),
                            *else_fail,
                            ctx,
                        )? {
                            Flow::Continue(rows) => output = rows,
                            flow @ Flow::Return(_) => return Ok(flow),
                        }
                        i = end + 1;
                        continue;
                    }
                }
            }
            match self.exec_statement(&stmts[i], ctx)? {
                Flow::Continue(rows) => output = rows,
                flow @ Flow::Return(_) => return Ok(flow),
            }
            i += 1;
        }
        Ok(Flow::Continue(output))
    }

    /// Runs a `BEGIN` .. `COMMIT RETRY n` block, re-running it on
    /// conflicts until it commits or the attempts are exhausted.
    fn run_retry_block(
        &self,
        block: &[Statement],
        retry: u32,
        else_block: Option<&[Statement]>,
        else_fail: bool,
        ctx: &Arc<CommandContext>,
    ) -> ExecResult<Flow> {
        let mut last_conflict = None;
        for attempt in 1..=retry {
            ctx.set_variable("$attempt", Value::Int(i64::from(attempt)));
            match self.try_block(block, ctx) {
                Ok(flow) => return Ok(flow),
                Err(ExecutionError::Conflict(detail)) => {
                    if ctx.session().in_transaction() {
                        ctx.session().rollback()?;
                    }
                    debug!(target: "script", attempt, %detail, "conflict, retrying");
                    last_conflict = Some(detail);
                }
                Err(other) => {
                    if ctx.session().in_transaction() {
                        ctx.session().rollback()?;
                    }
                    return Err(other);
                }
            }
        }

        let mut output = ScriptOutput::new();
        if let Some(else_block) = else_block {
            match self.exec_sequence(else_block, ctx)? {
                Flow::Continue(rows) => output = rows,
                // RETURN ends the whole script, even from an ELSE block.
                flow @ Flow::Return(_) => return Ok(flow),
            }
        }
        if else_fail {
            return Err(ExecutionError::Conflict(
                last_conflict.unwrap_or_else(|| "retries exhausted".to_string()),
            ));
        }
        Ok(Flow::Continue(output))
    }

    /// One attempt at a transactional block, commit included. A `RETURN`
    /// commits the open transaction, then ends the whole script; a
    /// conflict during that commit counts as a failed attempt.
    fn try_block(&self, block: &[Statement], ctx: &Arc<CommandContext>) -> ExecResult<Flow> {
        let mut output = ScriptOutput::new();
        for stmt in block {
            match self.exec_statement(stmt, ctx)? {
                Flow::Continue(rows) => output = rows,
                flow @ Flow::Return(_) => {
                    if ctx.session().in_transaction() {
                        ctx.session().commit()?;
                    }
                    return Ok(flow);
                }
            }
        }
        Ok(Flow::Continue(output))
    }

    fn exec_statement(&self, stmt: &Statement, ctx: &Arc<CommandContext>) -> ExecResult<Flow> {
        match stmt {
            Statement::Select(_) | Statement::Insert(_) | Statement::Delete(_) => {
                let mut plan = self.planner.plan(stmt, ctx)?;
                let mut stream = plan.start(ctx)?;
                let mut rows = ScriptOutput::new();
                while stream.has_next(ctx)? {
                    rows.push(stream.next(ctx)?.into_projection());
                }
                stream.close(ctx);
                plan.close(ctx);
                Ok(Flow::Continue(rows))
            }
            Statement::Begin => {
                if ctx.session().in_transaction() {
                    return Err(ExecutionError::IllegalState(
                        "transactions cannot nest".to_string(),
                    ));
                }
                ctx.session().begin()?;
                Ok(Flow::Continue(ScriptOutput::new()))
            }
            Statement::Commit { .. } => {
                ctx.session().commit()?;
                Ok(Flow::Continue(ScriptOutput::new()))
            }
            Statement::Rollback => {
                ctx.session().rollback()?;
                Ok(Flow::Continue(ScriptOutput::new()))
            }
            Statement::Let { name, value } => {
                let bound = match value {
                    LetValue::Expr(expr) => evaluate(expr, ctx, None)?,
                    LetValue::Query(select) => {
                        let mut plan = self.planner.plan_select(select, ctx)?;
                        let mut stream = plan.start(ctx)?;
                        let mut records = Vec::new();
                        while stream.has_next(ctx)? {
                            let row = stream.next(ctx)?.into_projection();
                            records.push(Value::Record(Box::new(row)));
                        }
                        stream.close(ctx);
                        plan.close(ctx);
                        Value::List(records)
                    }
                };
                ctx.set_variable(name.clone(), bound);
                Ok(Flow::Continue(ScriptOutput::new()))
            }
            Statement::If { condition, block } => {
                if evaluate(condition, ctx, None)?.is_truthy() {
                    self.exec_sequence(block, ctx)
                } else {
                    Ok(Flow::Continue(ScriptOutput::new()))
                }
            }
            Statement::Return(expr) => {
                let mut output = ScriptOutput::new();
                if let Some(expr) = expr {
                    let value = evaluate(expr, ctx, None)?;
                    let mut row = ProjectionRow::new();
                    row.set("value", value);
                    output.push(row);
                }
                Ok(Flow::Return(output))
            }
            Statement::Expr(expr) => {
                let value = evaluate(expr, ctx, None)?;
                let mut row = ProjectionRow::new();
                row.set("result", value);
                Ok(Flow::Continue(vec![row]))
            }
        }
    }
}

impl Default for ScriptExecutor {
    fn default() -> Self {
        Self::new()
    }
}

/// Finds the `COMMIT` closing the `BEGIN` at `start`, skipping over
/// nothing: transactions cannot nest, so the first commit at this level
/// terminates the block.
fn find_matching_commit(stmts: &[Statement], start: usize) -> ExecResult<usize> {
    for (offset, stmt) in stmts[start + 1..].iter().enumerate() {
        match stmt {
            Statement::Commit { .. } => return Ok(start + 1 + offset),
            Statement::Begin => {
                return Err(ExecutionError::IllegalState(
                    "transactions cannot nest".to_string(),
                ))
            }
            _ => {}
        }
    }
    Err(ExecutionError::IllegalState(
        "BEGIN without a matching COMMIT".to_string(),
    ))
}
