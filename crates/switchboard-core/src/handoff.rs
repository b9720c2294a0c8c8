//! Handoff coordination — the one-shot envelope that lets a caller connect
//! directly to its target agent.
//!
//! An envelope is only ever minted for an ALLOW decision. Expiry enforcement
//! is the receiving agent's job; the envelope just carries the deadline.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use switchboard_policy::AccessDecision;

use crate::types::{AgentDescriptor, AuthStrategy, IdentityContext};

/// How long a handoff envelope stays valid.
pub const HANDOFF_TTL_SECS: i64 = 300;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandoffTarget {
    pub id: String,
    pub endpoint: String,
    pub capabilities: Vec<String>,
}

/// One-shot connection descriptor handed to the caller. Ownership transfers
/// with the return value; the router keeps no copy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandoffEnvelope {
    #[serde(rename = "type")]
    pub kind: String,
    pub target: HandoffTarget,
    pub auth: HashMap<String, String>,
    pub trace_id: String,
    pub expiry: DateTime<Utc>,
}

/// Mint an envelope for an allowed decision, or refuse with `None`.
pub fn issue(
    decision: &AccessDecision,
    agent: &AgentDescriptor,
    identity: &IdentityContext,
) -> Option<HandoffEnvelope> {
    if !decision.is_allowed() {
        debug!(
            "Refusing handoff for denied decision (role={}, topic={})",
            decision.role, decision.topic
        );
        return None;
    }

    let trace_id = Uuid::new_v4().to_string();
    let auth = propagate_auth(agent, identity, &trace_id);

    Some(HandoffEnvelope {
        kind: "handoff".to_string(),
        target: HandoffTarget {
            id: agent.id.clone(),
            endpoint: agent.connection.url.clone(),
            capabilities: agent.capabilities.clone(),
        },
        auth,
        trace_id,
        expiry: Utc::now() + Duration::seconds(HANDOFF_TTL_SECS),
    })
}

/// Identity propagation: bearer-token delegation for bearer/oauth2 targets,
/// api-key substitution otherwise.
fn propagate_auth(
    agent: &AgentDescriptor,
    identity: &IdentityContext,
    trace_id: &str,
) -> HashMap<String, String> {
    let mut headers = HashMap::new();
    headers.insert("x-trace-id".to_string(), trace_id.to_string());

    match agent.connection.auth_strategy {
        AuthStrategy::Bearer | AuthStrategy::OAuth2 => match &identity.bearer_token {
            Some(token) => {
                headers.insert("authorization".to_string(), format!("Bearer {}", token));
            }
            None => {
                warn!(
                    "Agent '{}' expects a bearer token but the caller has none",
                    agent.id
                );
            }
        },
        AuthStrategy::ApiKey => match &identity.api_key {
            Some(key) => {
                headers.insert("x-api-key".to_string(), key.clone());
            }
            None => {
                warn!("Agent '{}' expects an api key but the caller has none", agent.id);
            }
        },
        AuthStrategy::None => {}
    }
    headers
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AgentConnection;
    use switchboard_policy::Decision;

    fn decision(decision: Decision) -> AccessDecision {
        AccessDecision {
            decision,
            topic: "IT_SUPPORT".to_string(),
            role: "employee".to_string(),
            reasoning: "test".to_string(),
            path: vec![],
            alternatives: vec![],
            audit_id: "audit-1".to_string(),
        }
    }

    fn agent(strategy: AuthStrategy) -> AgentDescriptor {
        AgentDescriptor {
            id: "agent_it".to_string(),
            name: "IT Desk".to_string(),
            connection: AgentConnection {
                protocol: "https".to_string(),
                url: "https://agents.internal/it".to_string(),
                auth_strategy: strategy,
            },
            capabilities: vec!["chat".to_string(), "tickets".to_string()],
            intent_triggers: vec![],
        }
    }

    fn identity() -> IdentityContext {
        IdentityContext {
            principal: "alice".to_string(),
            role: Some("employee".to_string()),
            bearer_token: Some("tok-123".to_string()),
            api_key: Some("key-456".to_string()),
        }
    }

    #[test]
    fn test_no_envelope_on_deny() {
        let result = issue(&decision(Decision::Deny), &agent(AuthStrategy::Bearer), &identity());
        assert!(result.is_none());
    }

    #[test]
    fn test_envelope_copies_target() {
        let envelope = issue(
            &decision(Decision::Allow),
            &agent(AuthStrategy::Bearer),
            &identity(),
        )
        .unwrap();
        assert_eq!(envelope.kind, "handoff");
        assert_eq!(envelope.target.id, "agent_it");
        assert_eq!(envelope.target.endpoint, "https://agents.internal/it");
        assert_eq!(envelope.target.capabilities.len(), 2);
        assert!(!envelope.trace_id.is_empty());
    }

    #[test]
    fn test_envelope_expiry_is_time_boxed() {
        let before = Utc::now();
        let envelope = issue(
            &decision(Decision::Allow),
            &agent(AuthStrategy::Bearer),
            &identity(),
        )
        .unwrap();
        let ttl = envelope.expiry - before;
        assert!(ttl <= Duration::seconds(HANDOFF_TTL_SECS + 1));
        assert!(ttl >= Duration::seconds(HANDOFF_TTL_SECS - 5));
    }

    #[test]
    fn test_bearer_delegation() {
        let envelope = issue(
            &decision(Decision::Allow),
            &agent(AuthStrategy::Bearer),
            &identity(),
        )
        .unwrap();
        assert_eq!(
            envelope.auth.get("authorization").map(String::as_str),
            Some("Bearer tok-123")
        );
        assert!(!envelope.auth.contains_key("x-api-key"));
    }

    #[test]
    fn test_oauth2_also_delegates_bearer() {
        let envelope = issue(
            &decision(Decision::Allow),
            &agent(AuthStrategy::OAuth2),
            &identity(),
        )
        .unwrap();
        assert!(envelope.auth.contains_key("authorization"));
    }

    #[test]
    fn test_api_key_substitution() {
        let envelope = issue(
            &decision(Decision::Allow),
            &agent(AuthStrategy::ApiKey),
            &identity(),
        )
        .unwrap();
        assert_eq!(
            envelope.auth.get("x-api-key").map(String::as_str),
            Some("key-456")
        );
        assert!(!envelope.auth.contains_key("authorization"));
    }

    #[test]
    fn test_no_auth_strategy_only_trace_header() {
        let envelope = issue(
            &decision(Decision::Allow),
            &agent(AuthStrategy::None),
            &identity(),
        )
        .unwrap();
        assert_eq!(envelope.auth.len(), 1);
        assert!(envelope.auth.contains_key("x-trace-id"));
    }

    #[test]
    fn test_missing_credentials_still_issue() {
        let envelope = issue(
            &decision(Decision::Allow),
            &agent(AuthStrategy::Bearer),
            &IdentityContext::anonymous(),
        )
        .unwrap();
        assert!(!envelope.auth.contains_key("authorization"));
    }

    #[test]
    fn test_trace_ids_unique_per_envelope() {
        let d = decision(Decision::Allow);
        let a = issue(&d, &agent(AuthStrategy::None), &identity()).unwrap();
        let b = issue(&d, &agent(AuthStrategy::None), &identity()).unwrap();
        assert_ne!(a.trace_id, b.trace_id);
    }
}
