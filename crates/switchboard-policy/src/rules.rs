//! Conditional access rules — typed predicates evaluated when no explicit
//! permission edge exists.
//!
//! Conditions are a closed set of matchers, not free-form expressions: a rule
//! can match on the requesting role, the requested topic, an exact
//! role + topic pair, or the hour of day. Rules are ordered by ascending
//! priority and the first enabled match wins.

use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};

/// A permission check request as seen by the rule engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessRequest {
    pub role: String,
    pub topic: String,
}

/// Typed rule predicate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuleCondition {
    /// Matches any request made by the given role.
    RoleEquals { role: String },
    /// Matches any request for the given topic.
    TopicEquals { topic: String },
    /// Matches an exact role + topic pair.
    RoleTopic { role: String, topic: String },
    /// Matches when the current UTC hour falls inside [start_hour, end_hour).
    /// A window with start > end wraps past midnight.
    TimeWindow { start_hour: u32, end_hour: u32 },
}

impl RuleCondition {
    /// Check whether this condition matches the request at the given time.
    pub fn matches(&self, request: &AccessRequest, now: DateTime<Utc>) -> bool {
        match self {
            Self::RoleEquals { role } => role.eq_ignore_ascii_case(&request.role),
            Self::TopicEquals { topic } => topic.eq_ignore_ascii_case(&request.topic),
            Self::RoleTopic { role, topic } => {
                role.eq_ignore_ascii_case(&request.role)
                    && topic.eq_ignore_ascii_case(&request.topic)
            }
            Self::TimeWindow {
                start_hour,
                end_hour,
            } => {
                let hour = now.hour();
                if start_hour <= end_hour {
                    hour >= *start_hour && hour < *end_hour
                } else {
                    // Overnight window, e.g. 22..6
                    hour >= *start_hour || hour < *end_hour
                }
            }
        }
    }
}

/// What a matching rule decides.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RuleAction {
    Allow,
    Deny,
    /// Redirect collapses to a denial that suggests the redirect topic first;
    /// the redirect target is never re-evaluated.
    Redirect { to: String },
}

/// A conditional rule node in the policy graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    pub id: String,
    pub description: String,
    pub condition: RuleCondition,
    pub action: RuleAction,
    /// Lower priority evaluates first.
    pub priority: i32,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl Rule {
    pub fn matches(&self, request: &AccessRequest, now: DateTime<Utc>) -> bool {
        self.enabled && self.condition.matches(request, now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn request(role: &str, topic: &str) -> AccessRequest {
        AccessRequest {
            role: role.to_string(),
            topic: topic.to_string(),
        }
    }

    fn at_hour(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, hour, 30, 0).unwrap()
    }

    #[test]
    fn test_role_equals() {
        let cond = RuleCondition::RoleEquals {
            role: "contractor".to_string(),
        };
        assert!(cond.matches(&request("contractor", "IT_SUPPORT"), at_hour(12)));
        assert!(cond.matches(&request("CONTRACTOR", "PAYROLL"), at_hour(12)));
        assert!(!cond.matches(&request("employee", "IT_SUPPORT"), at_hour(12)));
    }

    #[test]
    fn test_topic_equals() {
        let cond = RuleCondition::TopicEquals {
            topic: "CONTRACTS".to_string(),
        };
        assert!(cond.matches(&request("anyone", "CONTRACTS"), at_hour(12)));
        assert!(!cond.matches(&request("anyone", "PAYROLL"), at_hour(12)));
    }

    #[test]
    fn test_role_topic_pair() {
        let cond = RuleCondition::RoleTopic {
            role: "intern".to_string(),
            topic: "DATA_ANALYTICS".to_string(),
        };
        assert!(cond.matches(&request("intern", "DATA_ANALYTICS"), at_hour(12)));
        assert!(!cond.matches(&request("intern", "PAYROLL"), at_hour(12)));
        assert!(!cond.matches(&request("employee", "DATA_ANALYTICS"), at_hour(12)));
    }

    #[test]
    fn test_time_window() {
        let cond = RuleCondition::TimeWindow {
            start_hour: 9,
            end_hour: 17,
        };
        assert!(cond.matches(&request("any", "any"), at_hour(9)));
        assert!(cond.matches(&request("any", "any"), at_hour(16)));
        assert!(!cond.matches(&request("any", "any"), at_hour(17)));
        assert!(!cond.matches(&request("any", "any"), at_hour(3)));
    }

    #[test]
    fn test_time_window_overnight() {
        let cond = RuleCondition::TimeWindow {
            start_hour: 22,
            end_hour: 6,
        };
        assert!(cond.matches(&request("any", "any"), at_hour(23)));
        assert!(cond.matches(&request("any", "any"), at_hour(2)));
        assert!(!cond.matches(&request("any", "any"), at_hour(12)));
    }

    #[test]
    fn test_disabled_rule_never_matches() {
        let rule = Rule {
            id: "r1".to_string(),
            description: "disabled".to_string(),
            condition: RuleCondition::RoleEquals {
                role: "anyone".to_string(),
            },
            action: RuleAction::Allow,
            priority: 0,
            enabled: false,
        };
        assert!(!rule.matches(&request("anyone", "topic"), at_hour(12)));
    }

    #[test]
    fn test_condition_json_round_trip() {
        let cond = RuleCondition::RoleTopic {
            role: "hr_admin".to_string(),
            topic: "PAYROLL".to_string(),
        };
        let json = serde_json::to_string(&cond).unwrap();
        assert!(json.contains("\"type\":\"role_topic\""));
        let back: RuleCondition = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cond);
    }

    #[test]
    fn test_action_json_tagged() {
        let action = RuleAction::Redirect {
            to: "GENERAL_SUPPORT".to_string(),
        };
        let json = serde_json::to_string(&action).unwrap();
        assert!(json.contains("\"kind\":\"redirect\""));
        let back: RuleAction = serde_json::from_str(&json).unwrap();
        assert_eq!(back, action);
    }

    #[test]
    fn test_rule_enabled_defaults_true() {
        let json = r#"{
            "id": "r1",
            "description": "test",
            "condition": {"type": "role_equals", "role": "x"},
            "action": {"kind": "deny"},
            "priority": 5
        }"#;
        let rule: Rule = serde_json::from_str(json).unwrap();
        assert!(rule.enabled);
    }
}
