//! Access policy graph and evaluator for switchboard
//!
//! This crate provides:
//! - The in-memory policy graph (roles, topics, groups, permission edges,
//!   aliases, routes, conditional rules)
//! - Default-deny access evaluation with human-readable reasoning and graph
//!   paths
//! - SQLite persistence that materializes immutable graph snapshots

pub mod evaluator;
pub mod graph;
pub mod rules;
pub mod store;

// Re-export main types
pub use evaluator::{evaluate, evaluate_at, AccessDecision, Decision};
pub use graph::{AccessLevel, PermissionPath, PolicyGraph, GENERAL_SUPPORT};
pub use rules::{AccessRequest, Rule, RuleAction, RuleCondition};
pub use store::PolicyStore;

use std::sync::{Arc, RwLock};
use tracing::{info, warn};

/// Shared handle to the active policy snapshot.
///
/// Readers clone the inner `Arc` and query it without locking the graph
/// itself; [`PolicyHandle::replace`] swaps in a freshly loaded snapshot
/// atomically, so a request sees either the old graph or the new one, never
/// a half-updated state.
#[derive(Clone)]
pub struct PolicyHandle {
    inner: Arc<RwLock<Arc<PolicyGraph>>>,
}

impl PolicyHandle {
    pub fn new(graph: PolicyGraph) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(graph))),
        }
    }

    /// An empty handle. An empty graph has no permission edges and no rules,
    /// so every evaluation against it denies.
    pub fn empty() -> Self {
        Self::new(PolicyGraph::new())
    }

    /// Current snapshot.
    pub fn snapshot(&self) -> Arc<PolicyGraph> {
        match self.inner.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => {
                warn!("Policy handle lock was poisoned, recovering");
                Arc::clone(&poisoned.into_inner())
            }
        }
    }

    /// Atomically replace the active snapshot.
    pub fn replace(&self, graph: PolicyGraph) {
        let mut guard = match self.inner.write() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("Policy handle lock was poisoned, recovering");
                poisoned.into_inner()
            }
        };
        *guard = Arc::new(graph);
        info!(
            "Policy snapshot replaced: {} roles, {} topics",
            guard.role_count(),
            guard.topic_count()
        );
    }
}
