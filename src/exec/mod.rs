//! The pull-based execution pipeline: contexts, streams, steps and
//! expression evaluation.

pub mod context;
pub mod eval;
pub mod step;
pub mod steps;
pub mod stream;

pub use context::CommandContext;
pub use step::{BoxedStep, ExecutionStep, StepBase};
pub use stream::{BoxedStream, ExecutionStream, VecStream};
