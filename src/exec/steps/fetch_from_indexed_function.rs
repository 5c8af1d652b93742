//! Source step answering an indexed-function condition.
//!
//! The condition travels as a serialized payload (it crosses the command
//! boundary in remote deployments), so the step deserializes it once at
//! start and folds malformed payloads into a command error.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::ast::IndexedFunctionCondition;
use crate::error::ExecResult;
use crate::exec::context::CommandContext;
use crate::exec::step::{copy_previous, with_previous, BoxedStep, ExecutionStep, StepBase};
use crate::exec::stream::{BoxedStream, VecStream};
use crate::row::{ProjectionRow, Row};

/// The wire form of an indexed-function fetch: the condition plus the
/// class it runs against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexedFunctionPayload {
    pub condition: IndexedFunctionCondition,
    pub target_class: String,
}

impl IndexedFunctionPayload {
    /// Serializes the payload for embedding in a plan.
    pub fn encode(&self) -> ExecResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Fetches the records matching an indexed-function condition.
pub struct FetchFromIndexedFunctionStep {
    base: StepBase,
    payload: String,
}

impl FetchFromIndexedFunctionStep {
    #[must_use]
    pub fn new(payload: String, profiling: bool) -> Self {
        Self { base: StepBase::new(profiling), payload }
    }

    /// Builds the step from an in-memory condition.
    pub fn from_condition(
        condition: &IndexedFunctionCondition,
        target_class: &str,
        profiling: bool,
    ) -> ExecResult<Self> {
        let payload = IndexedFunctionPayload {
            condition: condition.clone(),
            target_class: target_class.to_string(),
        }
        .encode()?;
        Ok(Self::new(payload, profiling))
    }
}

impl ExecutionStep for FetchFromIndexedFunctionStep {
    fn base(&self) -> &StepBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut StepBase {
        &mut self.base
    }

    fn name(&self) -> &'static str {
        "FETCH FROM INDEXED FUNCTION"
    }

    fn internal_start(&mut self, ctx: &Arc<CommandContext>) -> ExecResult<BoxedStream> {
        self.base.drain_previous(ctx)?;
        let payload: IndexedFunctionPayload = serde_json::from_str(&self.payload)?;
        let rids = ctx
            .session()
            .evaluate_indexed_function(&payload.condition, &payload.target_class)?;

        // Identity-only rows: the index answer is a set of rids, and
        // loading is left to downstream consumers. A stale identity must
        // not abort the query here.
        let rows = rids
            .into_iter()
            .map(|rid| Row::Projection(ProjectionRow::with_rid(rid)))
            .collect();
        Ok(Box::new(VecStream::new(rows)))
    }

    fn copy(&self, ctx: &Arc<CommandContext>) -> ExecResult<BoxedStep> {
        let prev = copy_previous(&self.base, ctx)?;
        let step = Box::new(Self::new(self.payload.clone(), self.base.profiling()));
        Ok(with_previous(step, prev))
    }

    fn can_be_cached(&self) -> bool {
        false
    }
}
