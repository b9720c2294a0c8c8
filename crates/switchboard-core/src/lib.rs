//! switchboard-core - the decision pipeline of the switchboard router
//!
//! This crate provides:
//! - The intent taxonomy with its derived keyword index, loaded as immutable
//!   snapshots
//! - Symbolic intent resolution with explainable scoring and disambiguation
//! - The neural classifier boundary (opaque model call, untrusted output)
//! - The agent registry and the handoff coordinator
//! - The bounded audit sink and the routing service tying it all together

pub mod audit;
pub mod classifier;
pub mod handoff;
pub mod registry;
pub mod resolver;
pub mod service;
pub mod taxonomy;
pub mod types;

// Re-export main types for convenience
pub use audit::{AuditRecord, AuditSink, DEFAULT_AUDIT_CAPACITY};
pub use classifier::{parse_route_json, Classifier, HttpClassifier, NeuralRoute};
pub use handoff::{HandoffEnvelope, HandoffTarget, HANDOFF_TTL_SECS};
pub use registry::{default_agents, AgentRegistry};
pub use resolver::{detect, DetectionContext, IntentDetectionResult};
pub use service::{RouteOutcome, RouterService};
pub use taxonomy::{
    default_catalog, ConfigError, Intent, TaxonomyHandle, TaxonomyIndex, UNKNOWN_INTENT,
};
pub use types::{AgentConnection, AgentDescriptor, AuthStrategy, Category, IdentityContext};
