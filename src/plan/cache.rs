//! Plan caching.
//!
//! Compiled plans for repeated statements are cached and handed out as
//! fresh copies bound to the caller's context. Only plans whose every step
//! reports itself cacheable are stored; the rest are rebuilt per request.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use tracing::trace;

use crate::ast::Statement;
use crate::error::ExecResult;
use crate::exec::context::CommandContext;
use crate::plan::{ExecutionPlan, Planner};

/// Cache tuning knobs.
#[derive(Debug, Clone)]
pub struct PlanCacheConfig {
    /// Maximum number of cached plans. Zero disables caching.
    pub max_entries: usize,
}

impl Default for PlanCacheConfig {
    fn default() -> Self {
        Self { max_entries: 256 }
    }
}

impl PlanCacheConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum number of cached plans.
    #[must_use]
    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries;
        self
    }
}

struct CacheState {
    plans: HashMap<String, Box<dyn ExecutionPlan>>,
    /// Keys in least-recently-used order, oldest first.
    lru: Vec<String>,
}

/// A statement-keyed cache of compiled plans.
pub struct PlanCache {
    config: PlanCacheConfig,
    planner: Planner,
    state: RwLock<CacheState>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl PlanCache {
    /// Creates a cache with the given configuration.
    #[must_use]
    pub fn new(config: PlanCacheConfig) -> Self {
        Self {
            config,
            planner: Planner::new(),
            state: RwLock::new(CacheState { plans: HashMap::new(), lru: Vec::new() }),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Cache hits so far.
    #[must_use]
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Cache misses so far.
    #[must_use]
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Number of cached plans.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .plans
            .len()
    }

    /// True when nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn cache_key(stmt: &Statement) -> String {
        format!("{stmt:?}")
    }

    /// Returns an executable plan for the statement: a copy of the cached
    /// plan when one exists, otherwise a freshly planned one (cached for
    /// next time when its shape allows it).
    pub fn get_or_plan(
        &self,
        stmt: &Statement,
        ctx: &Arc<CommandContext>,
    ) -> ExecResult<Box<dyn ExecutionPlan>> {
        let key = Self::cache_key(stmt);

        if let Some(copy) = self.lookup(&key, ctx)? {
            self.hits.fetch_add(1, Ordering::Relaxed);
            trace!(target: "plan_cache", "hit");
            return Ok(copy);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);

        let plan = self.planner.plan(stmt, ctx)?;
        if self.config.max_entries > 0 && plan.can_be_cached() {
            let stored = plan.copy_plan(ctx)?;
            self.store(key, stored);
        }
        Ok(plan)
    }

    fn lookup(
        &self,
        key: &str,
        ctx: &Arc<CommandContext>,
    ) -> ExecResult<Option<Box<dyn ExecutionPlan>>> {
        let mut state = self
            .state
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let Some(plan) = state.plans.get(key) else {
            return Ok(None);
        };
        let copy = plan.copy_plan(ctx)?;
        state.lru.retain(|k| k != key);
        state.lru.push(key.to_string());
        Ok(Some(copy))
    }

    fn store(&self, key: String, plan: Box<dyn ExecutionPlan>) {
        let mut state = self
            .state
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        while state.plans.len() >= self.config.max_entries && !state.lru.is_empty() {
            let evicted = state.lru.remove(0);
            state.plans.remove(&evicted);
        }
        state.lru.retain(|k| *k != key);
        state.lru.push(key.clone());
        state.plans.insert(key, plan);
    }

    /// Drops every cached plan.
    pub fn clear(&self) {
        let mut state = self
            .state
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        state.plans.clear();
        state.lru.clear();
    }
}

impl Default for PlanCache {
    fn default() -> Self {
        Self::new(PlanCacheConfig::default())
    }
}
