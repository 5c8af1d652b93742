//! Query-execution core for a document/graph database.
//!
//! Two layers make up the crate:
//!
//! - a pull-based step pipeline ([`exec`], [`plan`]): statements are
//!   planned into chains of [`exec::ExecutionStep`]s, started top-down
//!   and pulled bottom-up as row streams, with a [`plan::PlanCache`]
//!   reusing compiled plans via copies;
//! - a transactional script interpreter ([`script`]): statement
//!   sequences with variables, control flow and `COMMIT RETRY` blocks
//!   that re-run on concurrent-modification conflicts.
//!
//! Storage sits behind the [`session::DatabaseSession`] trait;
//! [`memory::MemorySession`] is the built-in in-memory backend.
//!
//! ```
//! use std::sync::Arc;
//!
//! use wrendb_exec::ast::{Projection, SelectStatement};
//! use wrendb_exec::exec::CommandContext;
//! use wrendb_exec::exec::stream::collect;
//! use wrendb_exec::memory::MemorySession;
//! use wrendb_exec::plan::{ExecutionPlan, Planner};
//! use wrendb_exec::session::DatabaseSession;
//! use wrendb_exec::value::Value;
//!
//! let session = Arc::new(MemorySession::new());
//! session.create_class("Person", None).unwrap();
//! session
//!     .create_record("Person", vec![("name".to_string(), Value::from("Alice"))])
//!     .unwrap();
//!
//! let ctx = CommandContext::new(session);
//! let select = SelectStatement::from_class("Person")
//!     .with_projection(Projection::Count { alias: "count".to_string() });
//!
//! let mut plan = Planner::new().plan_select(&select, &ctx).unwrap();
//! let rows = collect(plan.start(&ctx).unwrap(), &ctx).unwrap();
//! assert_eq!(rows[0].get("count"), Some(Value::Int(1)));
//! ```

pub mod ast;
pub mod error;
pub mod exec;
pub mod memory;
pub mod plan;
pub mod row;
pub mod script;
pub mod session;
pub mod value;

pub use error::{ExecResult, ExecutionError};
pub use exec::CommandContext;
pub use row::{LiveRow, ProjectionRow, Row};
pub use script::ScriptExecutor;
pub use session::DatabaseSession;
pub use value::{Entity, RecordId, Value};
