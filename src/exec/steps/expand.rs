//! `expand()`: unnests the single value carried by each upstream row into
//! rows of its own.
//!
//! Dispatch is by runtime value shape. Links are resolved through the
//! session (missing targets are skipped, not errors), lists fan out one
//! row per element, maps fan out one row per entry, embedded records pass
//! through, and scalar noise is dropped. Rows backed by a live entity are
//! treated as already-expanded references to that entity.

use std::collections::VecDeque;
use std::sync::Arc;

use crate::error::{ExecResult, ExecutionError};
use crate::exec::context::CommandContext;
use crate::exec::step::{copy_previous, with_previous, BoxedStep, ExecutionStep, StepBase};
use crate::exec::stream::{BoxedStream, ExecutionStream};
use crate::row::{LiveRow, Row};
use crate::value::{RecordId, Value};

/// Unnests each upstream row's value into zero or more output rows.
pub struct ExpandStep {
    base: StepBase,
    /// When set, list elements land under this property name instead of
    /// being passed through or wrapped as `value`.
    alias: Option<String>,
}

impl ExpandStep {
    #[must_use]
    pub fn new(alias: Option<String>, profiling: bool) -> Self {
        Self { base: StepBase::new(profiling), alias }
    }
}

impl ExecutionStep for ExpandStep {
    fn base(&self) -> &StepBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut StepBase {
        &mut self.base
    }

    fn name(&self) -> &'static str {
        "EXPAND"
    }

    fn internal_start(&mut self, ctx: &Arc<CommandContext>) -> ExecResult<BoxedStream> {
        let upstream = self
            .base
            .start_previous_or(ctx, "cannot expand without a target")?;
        Ok(Box::new(ExpandStream {
            upstream,
            buffered: VecDeque::new(),
            alias: self.alias.clone(),
        }))
    }

    fn copy(&self, ctx: &Arc<CommandContext>) -> ExecResult<BoxedStep> {
        let prev = copy_previous(&self.base, ctx)?;
        let step = Box::new(Self::new(self.alias.clone(), self.base.profiling()));
        Ok(with_previous(step, prev))
    }

    fn can_be_cached(&self) -> bool {
        true
    }
}

struct ExpandStream {
    upstream: BoxedStream,
    buffered: VecDeque<Row>,
    alias: Option<String>,
}

impl ExpandStream {
    /// The single value an upstream row contributes, or `None` for rows
    /// that expand to nothing.
    fn extract_value(&self, row: &Row) -> ExecResult<Option<Value>> {
        if let Row::Live(live) = row {
            return Ok(Some(Value::Link(live.rid())));
        }
        let names = row.property_names();
        match names.len() {
            0 => Ok(None),
            1 => Ok(row.get(&names[0])),
            n => Err(ExecutionError::IllegalState(format!(
                "cannot expand a row with {n} properties"
            ))),
        }
    }

    fn resolve_link(
        &mut self,
        ctx: &Arc<CommandContext>,
        rid: RecordId,
    ) -> ExecResult<()> {
        if self.alias.is_some() {
            return Err(ExecutionError::Command(
                "cannot alias an expanded record link".to_string(),
            ));
        }
        match ctx.session().load_record(rid) {
            Ok(entity) => {
                self.buffered.push_back(Row::Live(LiveRow::new(entity)));
                Ok(())
            }
            // Dangling links degrade to a skip.
            Err(ExecutionError::RecordNotFound(_)) => Ok(()),
            Err(other) => Err(other),
        }
    }

    fn expand_element(&mut self, element: Value) {
        match (element, self.alias.as_ref()) {
            (Value::Record(record), None) => {
                self.buffered.push_back(Row::Projection(*record));
            }
            (value, Some(alias)) => {
                self.buffered
                    .push_back(Row::projection(vec![(alias.clone(), value)]));
            }
            (value, None) => {
                self.buffered
                    .push_back(Row::projection(vec![("value".to_string(), value)]));
            }
        }
    }

    fn expand_value(&mut self, ctx: &Arc<CommandContext>, value: Value) -> ExecResult<()> {
        match value {
            Value::Null => Ok(()),
            Value::Link(rid) => self.resolve_link(ctx, rid),
            Value::Record(record) => {
                self.buffered.push_back(Row::Projection(*record));
                Ok(())
            }
            Value::List(elements) => {
                for element in elements {
                    self.expand_element(element);
                }
                Ok(())
            }
            Value::Map(entries) => {
                if self.alias.is_some() {
                    return Err(ExecutionError::Command(
                        "cannot alias expanded map entries".to_string(),
                    ));
                }
                for (key, value) in entries {
                    self.buffered.push_back(Row::projection(vec![
                        ("key".to_string(), Value::String(key)),
                        ("value".to_string(), value),
                    ]));
                }
                Ok(())
            }
            // Bare scalars are not expandable; they contribute nothing.
            Value::Bool(_) | Value::Int(_) | Value::Float(_) | Value::String(_) => Ok(()),
        }
    }

    fn fill_buffer(&mut self, ctx: &Arc<CommandContext>) -> ExecResult<()> {
        while self.buffered.is_empty() && self.upstream.has_next(ctx)? {
            let row = self.upstream.next(ctx)?;
            if let Some(value) = self.extract_value(&row)? {
                self.expand_value(ctx, value)?;
            }
        }
        Ok(())
    }
}

impl ExecutionStream for ExpandStream {
    fn has_next(&mut self, ctx: &Arc<CommandContext>) -> ExecResult<bool> {
        self.fill_buffer(ctx)?;
        Ok(!self.buffered.is_empty())
    }

    fn next(&mut self, ctx: &Arc<CommandContext>) -> ExecResult<Row> {
        self.fill_buffer(ctx)?;
        self.buffered.pop_front().ok_or_else(|| {
            ExecutionError::IllegalState("next() called on an exhausted stream".to_string())
        })
    }

    fn close(&mut self, ctx: &Arc<CommandContext>) {
        self.buffered.clear();
        self.upstream.close(ctx);
    }
}
