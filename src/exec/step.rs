//! The execution-step abstraction.
//!
//! A plan is a chain of steps. Starting a step starts its upstream first
//! (directly or on demand), closing cascades downward, and rows are pulled
//! through the resulting stream. Steps are single-shot: a started step must
//! be copied, not restarted, which is what plan caching relies on.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::error::{ExecResult, ExecutionError};
use crate::exec::context::CommandContext;
use crate::exec::stream::{BoxedStream, ExecutionStream, ProfiledStream};

/// A boxed step in a plan chain.
pub type BoxedStep = Box<dyn ExecutionStep>;

/// State shared by every step: the upstream link, profiling switches and
/// the accumulated cost counter.
pub struct StepBase {
    prev: Option<BoxedStep>,
    profiling: bool,
    cost_micros: Arc<AtomicU64>,
    started: bool,
}

impl StepBase {
    /// Creates a base with no upstream.
    #[must_use]
    pub fn new(profiling: bool) -> Self {
        Self {
            prev: None,
            profiling,
            cost_micros: Arc::new(AtomicU64::new(0)),
            started: false,
        }
    }

    /// True when profiling is enabled for this step.
    #[must_use]
    pub fn profiling(&self) -> bool {
        self.profiling
    }

    /// The upstream step, if any.
    #[must_use]
    pub fn prev(&self) -> Option<&BoxedStep> {
        self.prev.as_ref()
    }

    /// Mutable access to the upstream step.
    pub fn prev_mut(&mut self) -> Option<&mut BoxedStep> {
        self.prev.as_mut()
    }

    /// Starts the upstream step, failing with the given message when no
    /// upstream is attached.
    pub fn start_previous_or(
        &mut self,
        ctx: &Arc<CommandContext>,
        missing: &str,
    ) -> ExecResult<BoxedStream> {
        match self.prev.as_mut() {
            Some(prev) => prev.start(ctx),
            None => Err(ExecutionError::IllegalState(missing.to_string())),
        }
    }

    /// Starts and fully drains the upstream step, if one is attached.
    /// Upstream side effects still happen; the rows are discarded.
    pub fn drain_previous(&mut self, ctx: &Arc<CommandContext>) -> ExecResult<()> {
        if let Some(prev) = self.prev.as_mut() {
            let mut stream = prev.start(ctx)?;
            while stream.has_next(ctx)? {
                stream.next(ctx)?;
            }
            stream.close(ctx);
        }
        Ok(())
    }
}

/// One step of an execution plan.
///
/// Implementors provide `internal_start` (build the row stream, starting
/// upstream as needed) and `copy` (a fresh, unstarted clone of the whole
/// chain bound to a new context). The start-once guard, profiling wrapper
/// and close cascade are provided.
pub trait ExecutionStep: Send {
    /// Shared step state.
    fn base(&self) -> &StepBase;

    /// Shared step state, mutably.
    fn base_mut(&mut self) -> &mut StepBase;

    /// The step's display label, e.g. `"CALCULATE CLASS SIZE"`.
    fn name(&self) -> &'static str;

    /// Extra detail rendered after the label, e.g. the target class.
    fn target_detail(&self) -> Option<String> {
        None
    }

    /// Builds this step's row stream.
    fn internal_start(&mut self, ctx: &Arc<CommandContext>) -> ExecResult<BoxedStream>;

    /// A fresh, unstarted copy of this step (and its upstream chain),
    /// bound to `ctx`.
    fn copy(&self, ctx: &Arc<CommandContext>) -> ExecResult<BoxedStep>;

    /// True when a plan containing this step may be cached and its copies
    /// reused across executions.
    fn can_be_cached(&self) -> bool;

    /// Starts the step. A step starts at most once per plan execution.
    fn start(&mut self, ctx: &Arc<CommandContext>) -> ExecResult<BoxedStream> {
        if self.base().started {
            return Err(ExecutionError::IllegalState(format!(
                "step already started: {}",
                self.name()
            )));
        }
        self.base_mut().started = true;
        if self.base().profiling {
            let started = Instant::now();
            let stream = self.internal_start(ctx)?;
            let micros = u64::try_from(started.elapsed().as_micros()).unwrap_or(u64::MAX);
            self.base().cost_micros.fetch_add(micros, Ordering::Relaxed);
            let cost = Arc::clone(&self.base().cost_micros);
            Ok(Box::new(ProfiledStream::new(stream, cost)))
        } else {
            self.internal_start(ctx)
        }
    }

    /// Closes the step and cascades to the upstream chain.
    fn close(&mut self, ctx: &Arc<CommandContext>) {
        if let Some(prev) = self.base_mut().prev_mut() {
            prev.close(ctx);
        }
    }

    /// Attaches an upstream step.
    fn set_previous(&mut self, prev: BoxedStep) {
        self.base_mut().prev = Some(prev);
    }

    /// True when this step records per-pull cost.
    fn is_profiling_enabled(&self) -> bool {
        self.base().profiling
    }

    /// Microseconds spent in this step's start and row pulls so far.
    fn cost_micros(&self) -> u64 {
        self.base().cost_micros.load(Ordering::Relaxed)
    }

    /// Renders this step (not its upstream) as one explain line.
    fn pretty_print(&self, depth: usize, indent: usize) -> String {
        let mut line = format!("{}+ {}", " ".repeat(depth * indent), self.name());
        if let Some(detail) = self.target_detail() {
            line.push(' ');
            line.push_str(&detail);
        }
        if self.is_profiling_enabled() {
            line.push_str(&format!(" ({} \u{3bc}s)", self.cost_micros()));
        }
        line
    }
}

/// Copies an optional upstream chain while copying a step.
pub fn copy_previous(
    base: &StepBase,
    ctx: &Arc<CommandContext>,
) -> ExecResult<Option<BoxedStep>> {
    base.prev().map(|prev| prev.copy(ctx)).transpose()
}

/// Finishes a step copy: attaches the copied upstream, returns the step.
pub fn with_previous(mut step: BoxedStep, prev: Option<BoxedStep>) -> BoxedStep {
    if let Some(prev) = prev {
        step.set_previous(prev);
    }
    step
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::stream::VecStream;
    use crate::memory::MemorySession;
    use crate::row::Row;
    use crate::value::Value;

    struct OneRowStep {
        base: StepBase,
    }

    impl ExecutionStep for OneRowStep {
        fn base(&self) -> &StepBase {
            &self.base
        }

        fn base_mut(&mut self) -> &mut StepBase {
            &mut self.base
        }

        fn name(&self) -> &'static str {
            "ONE ROW"
        }

        fn internal_start(&mut self, _ctx: &Arc<CommandContext>) -> ExecResult<BoxedStream> {
            Ok(Box::new(VecStream::single(Row::projection(vec![(
                "n".to_string(),
                Value::Int(1),
            )]))))
        }

        fn copy(&self, _ctx: &Arc<CommandContext>) -> ExecResult<BoxedStep> {
            Ok(Box::new(Self { base: StepBase::new(self.base.profiling) }))
        }

        fn can_be_cached(&self) -> bool {
            true
        }
    }

    fn ctx() -> Arc<CommandContext> {
        CommandContext::new(Arc::new(MemorySession::new()))
    }

    #[test]
    fn start_twice_is_a_state_error() {
        let ctx = ctx();
        let mut step = OneRowStep { base: StepBase::new(false) };
        let stream = step.start(&ctx).unwrap();
        drop(stream);

        let err = step.start(&ctx).err().unwrap();
        assert!(matches!(err, ExecutionError::IllegalState(_)));
    }

    #[test]
    fn copy_is_startable_again() {
        let ctx = ctx();
        let mut step = OneRowStep { base: StepBase::new(false) };
        step.start(&ctx).unwrap();

        let mut copy = step.copy(&ctx).unwrap();
        assert!(copy.start(&ctx).is_ok());
    }

    #[test]
    fn pretty_print_indents_by_depth() {
        let step = OneRowStep { base: StepBase::new(false) };
        assert_eq!(step.pretty_print(0, 2), "+ ONE ROW");
        assert_eq!(step.pretty_print(2, 2), "    + ONE ROW");
    }

    #[test]
    fn profiling_wraps_the_stream() {
        let ctx = ctx();
        let mut step = OneRowStep { base: StepBase::new(true) };
        let mut stream = step.start(&ctx).unwrap();
        while stream.has_next(&ctx).unwrap() {
            stream.next(&ctx).unwrap();
        }
        assert!(step.pretty_print(0, 2).contains("\u{3bc}s"));
    }

    struct SlowStartStep {
        base: StepBase,
    }

    impl ExecutionStep for SlowStartStep {
        fn base(&self) -> &StepBase {
            &self.base
        }

        fn base_mut(&mut self) -> &mut StepBase {
            &mut self.base
        }

        fn name(&self) -> &'static str {
            "SLOW START"
        }

        fn internal_start(&mut self, _ctx: &Arc<CommandContext>) -> ExecResult<BoxedStream> {
            std::thread::sleep(std::time::Duration::from_millis(2));
            Ok(Box::new(VecStream::empty()))
        }

        fn copy(&self, _ctx: &Arc<CommandContext>) -> ExecResult<BoxedStep> {
            Ok(Box::new(Self { base: StepBase::new(self.base.profiling) }))
        }

        fn can_be_cached(&self) -> bool {
            true
        }
    }

    #[test]
    fn profiling_charges_time_spent_in_start() {
        let ctx = ctx();
        let mut step = SlowStartStep { base: StepBase::new(true) };
        let stream = step.start(&ctx).unwrap();
        drop(stream);

        // All the work happened before the stream was pulled.
        assert!(step.cost_micros() >= 2_000);
    }
}
