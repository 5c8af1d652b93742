//! Execution plans: step chains plus the planner and plan cache.

pub mod cache;
pub mod planner;

use std::sync::Arc;

use crate::error::{ExecResult, ExecutionError};
use crate::exec::context::CommandContext;
use crate::exec::step::{BoxedStep, ExecutionStep};
use crate::exec::stream::BoxedStream;

pub use cache::{PlanCache, PlanCacheConfig};
pub use planner::Planner;

/// An executable plan. Plans are single-shot, like the steps they chain;
/// re-execution goes through [`ExecutionPlan::copy_plan`].
pub trait ExecutionPlan: Send {
    /// Starts the plan, producing its row stream.
    fn start(&mut self, ctx: &Arc<CommandContext>) -> ExecResult<BoxedStream>;

    /// Closes the plan's step chain.
    fn close(&mut self, ctx: &Arc<CommandContext>);

    /// Renders the plan, one line per step, outermost step first.
    fn pretty_print(&self, indent: usize) -> String;

    /// True when the plan may be cached and reused via copies.
    fn can_be_cached(&self) -> bool;

    /// A fresh, unstarted copy bound to `ctx`.
    fn copy_plan(&self, ctx: &Arc<CommandContext>) -> ExecResult<Box<dyn ExecutionPlan>>;
}

/// A plan over a single chain of steps.
pub struct PipelinePlan {
    root: Option<BoxedStep>,
}

impl PipelinePlan {
    /// An empty plan; steps are attached with [`PipelinePlan::chain`].
    #[must_use]
    pub fn new() -> Self {
        Self { root: None }
    }

    /// Appends a step to the top of the chain. The current root becomes
    /// the new step's upstream.
    pub fn chain(&mut self, mut step: BoxedStep) {
        if let Some(prev) = self.root.take() {
            step.set_previous(prev);
        }
        self.root = Some(step);
    }

    fn pretty_print_chain(step: &BoxedStep, depth: usize, indent: usize, out: &mut Vec<String>) {
        if let Some(prev) = step.base().prev() {
            Self::pretty_print_chain(prev, depth + 1, indent, out);
        }
        out.push(step.pretty_print(depth, indent));
    }
}

impl Default for PipelinePlan {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionPlan for PipelinePlan {
    fn start(&mut self, ctx: &Arc<CommandContext>) -> ExecResult<BoxedStream> {
        match self.root.as_mut() {
            Some(root) => root.start(ctx),
            None => Err(ExecutionError::IllegalState("empty plan".to_string())),
        }
    }

    fn close(&mut self, ctx: &Arc<CommandContext>) {
        if let Some(root) = self.root.as_mut() {
            root.close(ctx);
        }
    }

    fn pretty_print(&self, indent: usize) -> String {
        let mut lines = Vec::new();
        if let Some(root) = self.root.as_ref() {
            Self::pretty_print_chain(root, 0, indent, &mut lines);
        }
        // Outermost step first, sources indented underneath.
        lines.reverse();
        lines.join("\n")
    }

    fn can_be_cached(&self) -> bool {
        let mut current = self.root.as_ref();
        while let Some(step) = current {
            if !step.can_be_cached() {
                return false;
            }
            current = step.base().prev();
        }
        true
    }

    fn copy_plan(&self, ctx: &Arc<CommandContext>) -> ExecResult<Box<dyn ExecutionPlan>> {
        let root = self.root.as_ref().map(|r| r.copy(ctx)).transpose()?;
        Ok(Box::new(Self { root }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::steps::{DistinctStep, FetchFromClassStep};
    use crate::exec::stream::collect;
    use crate::memory::MemorySession;
    use crate::session::DatabaseSession;
    use crate::value::Value;

    fn seeded_ctx() -> Arc<CommandContext> {
        let session = Arc::new(MemorySession::new());
        session.create_class("Person", None).unwrap();
        session
            .create_record("Person", vec![("n".to_string(), Value::Int(1))])
            .unwrap();
        CommandContext::new(session)
    }

    #[test]
    fn chain_builds_bottom_up() {
        let ctx = seeded_ctx();
        let mut plan = PipelinePlan::new();
        plan.chain(Box::new(FetchFromClassStep::new("Person", false)));
        plan.chain(Box::new(DistinctStep::new(false)));

        let rows = collect(plan.start(&ctx).unwrap(), &ctx).unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn pretty_print_puts_the_outermost_step_first() {
        let mut plan = PipelinePlan::new();
        plan.chain(Box::new(FetchFromClassStep::new("Person", false)));
        plan.chain(Box::new(DistinctStep::new(false)));

        let rendered = plan.pretty_print(2);
        let lines: Vec<&str> = rendered.lines().collect();
        assert!(lines[0].starts_with("+ DISTINCT"));
        assert!(lines[1].starts_with("  + FETCH FROM CLASS"));
    }

    #[test]
    fn cacheability_requires_every_step() {
        let mut plan = PipelinePlan::new();
        plan.chain(Box::new(FetchFromClassStep::new("Person", false)));
        assert!(plan.can_be_cached());

        plan.chain(Box::new(crate::exec::steps::CountFromClassStep::new(
            "Person", "count", false,
        )));
        assert!(!plan.can_be_cached());
    }

    #[test]
    fn copies_are_independently_startable() {
        let ctx = seeded_ctx();
        let mut plan = PipelinePlan::new();
        plan.chain(Box::new(FetchFromClassStep::new("Person", false)));

        let rows = collect(plan.start(&ctx).unwrap(), &ctx).unwrap();
        assert_eq!(rows.len(), 1);

        let mut copy = plan.copy_plan(&ctx).unwrap();
        let rows = collect(copy.start(&ctx).unwrap(), &ctx).unwrap();
        assert_eq!(rows.len(), 1);
    }
}
