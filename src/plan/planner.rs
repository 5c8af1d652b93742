//! Turns statements into step chains.
//!
//! The planner applies a small set of shortcut rules before falling back
//! to a scan pipeline: `count(*)` over a bare class or index is answered
//! from metadata, an equality filter on an indexed property is answered
//! from the index, and an indexed-function condition is pushed down to
//! the session.

use std::sync::Arc;

use tracing::debug;

use crate::ast::{
    Condition, DeleteStatement, Expr, InsertStatement, Projection, SelectStatement,
    SelectTarget, Statement,
};
use crate::error::{ExecResult, ExecutionError};
use crate::exec::context::CommandContext;
use crate::exec::eval::evaluate;
use crate::exec::step::{copy_previous, with_previous, BoxedStep, ExecutionStep, StepBase};
use crate::exec::steps::{
    AggregateCountStep, CheckClassTypeStep, ConvertToProjectionStep, CountFromClassStep,
    CountFromIndexStep, CountFromIndexWithKeyStep, DeleteStep, DistinctStep, ExpandStep,
    FetchFromClassStep, FetchFromIndexedFunctionStep, FilterStep, GuaranteeEmptyCountStep,
    InsertStep, SubQueryStep,
};
use crate::exec::stream::{BoxedStream, ExecutionStream, VecStream};
use crate::plan::{ExecutionPlan, PipelinePlan};
use crate::row::Row;

/// Statement planner. One planner instance can serve many statements.
pub struct Planner {
    profiling: bool,
}

impl Planner {
    /// A planner producing non-profiled plans.
    #[must_use]
    pub fn new() -> Self {
        Self { profiling: false }
    }

    /// Enables per-step cost recording on planned steps.
    #[must_use]
    pub fn with_profiling(mut self, profiling: bool) -> Self {
        self.profiling = profiling;
        self
    }

    /// Plans a statement. `Begin`/`Commit`/`Rollback` and the other
    /// script-only statements have no plan shape and are rejected.
    pub fn plan(
        &self,
        stmt: &Statement,
        ctx: &Arc<CommandContext>,
    ) -> ExecResult<Box<dyn ExecutionPlan>> {
        match stmt {
            Statement::Select(select) => self.plan_select(select, ctx),
            Statement::Insert(insert) => self.plan_insert(insert),
            Statement::Delete(delete) => self.plan_delete(delete),
            other => Err(ExecutionError::IllegalState(format!(
                "statement has no execution plan: {other:?}"
            ))),
        }
    }

    /// Plans a `SELECT`.
    pub fn plan_select(
        &self,
        select: &SelectStatement,
        ctx: &Arc<CommandContext>,
    ) -> ExecResult<Box<dyn ExecutionPlan>> {
        if let Some(plan) = self.try_count_shortcut(select, ctx)? {
            debug!(target: "planner", "count shortcut applied");
            return Ok(plan);
        }

        let mut plan = PipelinePlan::new();
        self.chain_source(&mut plan, select, ctx)?;

        if let Some(Condition::Expr(expr)) = &select.condition {
            plan.chain(Box::new(FilterStep::new(expr.clone(), self.profiling)));
        }

        match &select.projection {
            Projection::All => {}
            Projection::Count { alias } => {
                plan.chain(Box::new(AggregateCountStep::new(alias.clone(), self.profiling)));
                plan.chain(Box::new(GuaranteeEmptyCountStep::new(
                    alias.clone(),
                    self.profiling,
                )));
            }
            Projection::Expand(expr) => {
                // The expand target is materialized per row before the
                // expand step unnests it.
                plan.chain(Box::new(ProjectExprStep::new(expr.clone(), self.profiling)));
                plan.chain(Box::new(ExpandStep::new(None, self.profiling)));
            }
        }

        if select.distinct {
            plan.chain(Box::new(DistinctStep::new(self.profiling)));
        }

        Ok(Box::new(plan))
    }

    fn chain_source(
        &self,
        plan: &mut PipelinePlan,
        select: &SelectStatement,
        ctx: &Arc<CommandContext>,
    ) -> ExecResult<()> {
        if let Some(Condition::IndexedFunction(condition)) = &select.condition {
            let class_name = match &select.target {
                SelectTarget::Class(name) => name.clone(),
                _ => {
                    return Err(ExecutionError::IllegalState(
                        "an indexed-function condition requires a class target".to_string(),
                    ))
                }
            };
            plan.chain(Box::new(FetchFromIndexedFunctionStep::from_condition(
                condition,
                &class_name,
                self.profiling,
            )?));
            return Ok(());
        }

        match &select.target {
            SelectTarget::Class(name) => {
                plan.chain(Box::new(FetchFromClassStep::new(name.clone(), self.profiling)));
            }
            SelectTarget::Index { name, .. } => {
                return Err(ExecutionError::IllegalState(format!(
                    "index {name} can only be targeted by count(*)"
                )));
            }
            SelectTarget::Subquery(inner) => {
                let sub_ctx = ctx.child();
                let sub_plan = self.plan_select(inner, &sub_ctx)?;
                plan.chain(Box::new(SubQueryStep::new(
                    sub_plan,
                    sub_ctx,
                    Arc::clone(ctx),
                    self.profiling,
                )));
            }
        }
        Ok(())
    }

    /// `count(*)` over a plain target can skip row production entirely.
    fn try_count_shortcut(
        &self,
        select: &SelectStatement,
        ctx: &Arc<CommandContext>,
    ) -> ExecResult<Option<Box<dyn ExecutionPlan>>> {
        let Projection::Count { alias } = &select.projection else {
            return Ok(None);
        };
        if select.distinct {
            return Ok(None);
        }

        let mut plan = PipelinePlan::new();
        match (&select.target, &select.condition) {
            (SelectTarget::Class(class), None) => {
                plan.chain(Box::new(CountFromClassStep::new(
                    class.clone(),
                    alias.clone(),
                    self.profiling,
                )));
            }
            (SelectTarget::Index { name, kind }, None) => {
                plan.chain(Box::new(CountFromIndexStep::new(
                    name.clone(),
                    *kind,
                    alias.clone(),
                    self.profiling,
                )));
            }
            (SelectTarget::Class(class), Some(Condition::Expr(expr))) => {
                let Some((index, key)) = indexed_equality(class, expr, ctx) else {
                    return Ok(None);
                };
                plan.chain(Box::new(CountFromIndexWithKeyStep::new(
                    index,
                    key,
                    alias.clone(),
                    self.profiling,
                )));
            }
            _ => return Ok(None),
        }
        Ok(Some(Box::new(plan)))
    }

    /// Plans an `INSERT`.
    pub fn plan_insert(&self, insert: &InsertStatement) -> ExecResult<Box<dyn ExecutionPlan>> {
        let mut plan = PipelinePlan::new();
        if let Some(base) = &insert.require_base {
            plan.chain(Box::new(CheckClassTypeStep::new(
                insert.class_name.clone(),
                base.clone(),
                self.profiling,
            )));
        }
        plan.chain(Box::new(InsertStep::new(
            insert.class_name.clone(),
            insert.set_items.clone(),
            self.profiling,
        )));
        plan.chain(Box::new(ConvertToProjectionStep::new(self.profiling)));
        Ok(Box::new(plan))
    }

    /// Plans a `DELETE`.
    pub fn plan_delete(&self, delete: &DeleteStatement) -> ExecResult<Box<dyn ExecutionPlan>> {
        let mut plan = PipelinePlan::new();
        plan.chain(Box::new(FetchFromClassStep::new(
            delete.class_name.clone(),
            self.profiling,
        )));
        if let Some(condition) = &delete.condition {
            plan.chain(Box::new(FilterStep::new(condition.clone(), self.profiling)));
        }
        plan.chain(Box::new(DeleteStep::new(self.profiling)));
        Ok(Box::new(plan))
    }
}

impl Default for Planner {
    fn default() -> Self {
        Self::new()
    }
}

/// Matches `property = <constant>` against an index on the property.
/// Returns the index name and the key expression.
fn indexed_equality(
    class_name: &str,
    expr: &Expr,
    ctx: &Arc<CommandContext>,
) -> Option<(String, Expr)> {
    let Expr::Binary { op: crate::ast::BinaryOp::Eq, left, right } = expr else {
        return None;
    };
    let (property, key) = match (left.as_ref(), right.as_ref()) {
        (Expr::Property(name), key @ Expr::Literal(_)) => (name, key),
        (key @ Expr::Literal(_), Expr::Property(name)) => (name, key),
        _ => return None,
    };
    let index = ctx.session().index_for_property(class_name, property)?;
    Some((index, key.clone()))
}

/// Evaluates an expression against each upstream row, emitting a
/// single-property row carrying the result. Feeds the expand step.
struct ProjectExprStep {
    base: StepBase,
    expr: Expr,
}

impl ProjectExprStep {
    fn new(expr: Expr, profiling: bool) -> Self {
        Self { base: StepBase::new(profiling), expr }
    }
}

impl ExecutionStep for ProjectExprStep {
    fn base(&self) -> &StepBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut StepBase {
        &mut self.base
    }

    fn name(&self) -> &'static str {
        "CALCULATE PROJECTIONS"
    }

    fn internal_start(&mut self, ctx: &Arc<CommandContext>) -> ExecResult<BoxedStream> {
        let mut upstream = self
            .base
            .start_previous_or(ctx, "projecting requires a previous step")?;
        let mut rows = Vec::new();
        while upstream.has_next(ctx)? {
            let row = upstream.next(ctx)?;
            let value = evaluate(&self.expr, ctx, Some(&row))?;
            rows.push(Row::projection(vec![("value".to_string(), value)]));
        }
        upstream.close(ctx);
        Ok(Box::new(VecStream::new(rows)))
    }

    fn copy(&self, ctx: &Arc<CommandContext>) -> ExecResult<BoxedStep> {
        let prev = copy_previous(&self.base, ctx)?;
        let step = Box::new(Self::new(self.expr.clone(), self.base.profiling()));
        Ok(with_previous(step, prev))
    }

    fn can_be_cached(&self) -> bool {
        true
    }
}
