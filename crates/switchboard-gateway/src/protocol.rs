//! Gateway wire protocol — JSON shapes exchanged with callers

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use switchboard_core::{HandoffTarget, IntentDetectionResult, RouteOutcome};

/// Echo of the resolver's verdict so callers can surface ambiguity instead
/// of committing silently.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentEcho {
    pub id: String,
    pub confidence: f64,
    pub is_ambiguous: bool,
    #[serde(default)]
    pub alternatives: Vec<String>,
}

impl From<&IntentDetectionResult> for IntentEcho {
    fn from(intent: &IntentDetectionResult) -> Self {
        Self {
            id: intent.intent.clone(),
            confidence: intent.confidence,
            is_ambiguous: intent.is_ambiguous,
            alternatives: intent.alternatives.clone(),
        }
    }
}

/// Response to `GET /v1/route`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RouteReply {
    Handoff {
        target: HandoffTarget,
        auth: HashMap<String, String>,
        trace_id: String,
        expiry: DateTime<Utc>,
        intent: IntentEcho,
    },
    Denied {
        reasoning: String,
        alternatives: Vec<String>,
        intent: IntentEcho,
    },
}

impl RouteReply {
    pub fn from_outcome(outcome: RouteOutcome) -> Self {
        match outcome {
            RouteOutcome::Handoff {
                envelope, intent, ..
            } => Self::Handoff {
                intent: IntentEcho::from(&intent),
                target: envelope.target,
                auth: envelope.auth,
                trace_id: envelope.trace_id,
                expiry: envelope.expiry,
            },
            RouteOutcome::Denied { intent, decision } => Self::Denied {
                intent: IntentEcho::from(&intent),
                reasoning: decision.reasoning,
                alternatives: decision.alternatives,
            },
        }
    }
}

/// Body of `POST /v1/symbolic/evaluate`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluateRequest {
    pub role: String,
    pub topic: String,
}

/// Reply to a successful agent registration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterReply {
    pub id: String,
    pub status: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_reply_handoff_tag() {
        let reply = RouteReply::Handoff {
            target: HandoffTarget {
                id: "agent_it".to_string(),
                endpoint: "https://agents.internal/it".to_string(),
                capabilities: vec!["chat".to_string()],
            },
            auth: HashMap::new(),
            trace_id: "trace-1".to_string(),
            expiry: Utc::now(),
            intent: IntentEcho {
                id: "IT_VPN".to_string(),
                confidence: 0.95,
                is_ambiguous: false,
                alternatives: vec![],
            },
        };
        let json = serde_json::to_string(&reply).unwrap();
        assert!(json.contains("\"type\":\"handoff\""));
        assert!(json.contains("\"trace_id\":\"trace-1\""));
    }

    #[test]
    fn test_route_reply_denied_tag() {
        let reply = RouteReply::Denied {
            reasoning: "no explicit permission or rule".to_string(),
            alternatives: vec!["SALES_REPORTS".to_string()],
            intent: IntentEcho {
                id: "HR_PAYROLL".to_string(),
                confidence: 0.7,
                is_ambiguous: false,
                alternatives: vec![],
            },
        };
        let json = serde_json::to_string(&reply).unwrap();
        assert!(json.contains("\"type\":\"denied\""));
        assert!(json.contains("SALES_REPORTS"));
    }

    #[test]
    fn test_evaluate_request_deserialize() {
        let req: EvaluateRequest =
            serde_json::from_str(r#"{"role": "hr_admin", "topic": "PAYROLL"}"#).unwrap();
        assert_eq!(req.role, "hr_admin");
        assert_eq!(req.topic, "PAYROLL");
    }
}
