//! Access evaluation over the policy graph.
//!
//! Every evaluation produces exactly one [`AccessDecision`] — there is no
//! "maybe" outcome. Absence of a permission edge and of a matching rule is a
//! denial, and that default holds even when the rest of the system is
//! degraded: an empty snapshot denies everything.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::graph::PolicyGraph;
use crate::rules::{AccessRequest, RuleAction};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Decision {
    Allow,
    Deny,
}

/// Outcome of a single permission check, with enough reasoning for a human
/// and enough structure (the graph path) for the audit visualizer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessDecision {
    pub decision: Decision,
    pub topic: String,
    pub role: String,
    pub reasoning: String,
    pub path: Vec<String>,
    /// Topics the role *can* reach, surfaced on denials.
    pub alternatives: Vec<String>,
    pub audit_id: String,
}

impl AccessDecision {
    pub fn is_allowed(&self) -> bool {
        self.decision == Decision::Allow
    }
}

/// Evaluate whether `role` may reach the topic named by `topic_text`
/// (free text, alias, or canonical id) at the current time.
pub fn evaluate(graph: &PolicyGraph, role: &str, topic_text: &str) -> AccessDecision {
    evaluate_at(graph, role, topic_text, Utc::now())
}

/// Evaluation with an explicit clock, so time-window rules are testable.
pub fn evaluate_at(
    graph: &PolicyGraph,
    role: &str,
    topic_text: &str,
    now: DateTime<Utc>,
) -> AccessDecision {
    // Role ids are stored lowercase; topic resolution handles its own case.
    let role = role.trim().to_lowercase();
    let role = role.as_str();
    let topic = graph.resolve_topic(topic_text);
    let audit_id = Uuid::new_v4().to_string();
    debug!("Evaluating access: role={} topic={} ({})", role, topic, audit_id);

    // 1. Explicit permission edge, direct or via group membership.
    if let Some(perm) = graph.has_permission(role, &topic) {
        return AccessDecision {
            decision: Decision::Allow,
            topic,
            role: role.to_string(),
            reasoning: format!("explicit permission found ({})", perm.level),
            path: perm.path,
            alternatives: Vec::new(),
            audit_id,
        };
    }

    // 2. Conditional rules, first enabled match by ascending priority.
    let request = AccessRequest {
        role: role.to_string(),
        topic: topic.clone(),
    };
    if let Some(rule) = graph.matching_rule(&request, now) {
        let path = vec![role.to_string(), format!("rule:{}", rule.id), topic.clone()];
        return match &rule.action {
            RuleAction::Allow => AccessDecision {
                decision: Decision::Allow,
                topic,
                role: role.to_string(),
                reasoning: rule.description.clone(),
                path,
                alternatives: Vec::new(),
                audit_id,
            },
            RuleAction::Deny => AccessDecision {
                decision: Decision::Deny,
                topic,
                role: role.to_string(),
                reasoning: rule.description.clone(),
                path,
                alternatives: graph.alternatives(role),
                audit_id,
            },
            RuleAction::Redirect { to } => {
                // Collapsed to a denial carrying the redirect target as the
                // first suggestion. The target is not re-evaluated.
                let mut alternatives = vec![to.clone()];
                for alt in graph.alternatives(role) {
                    if alt != *to {
                        alternatives.push(alt);
                    }
                }
                AccessDecision {
                    decision: Decision::Deny,
                    topic,
                    role: role.to_string(),
                    reasoning: format!("{} (redirected to {})", rule.description, to),
                    path,
                    alternatives,
                    audit_id,
                }
            }
        };
    }

    // 3. Default deny.
    AccessDecision {
        decision: Decision::Deny,
        topic,
        role: role.to_string(),
        reasoning: "no explicit permission or rule".to_string(),
        path: Vec::new(),
        alternatives: graph.alternatives(role),
        audit_id,
    }
}
