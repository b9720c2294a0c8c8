//! Shared types for switchboard-core

use serde::{Deserialize, Serialize};

/// Business category an intent belongs to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum Category {
    It,
    Hr,
    Sales,
    Finance,
    Marketing,
    Engineering,
    Security,
    General,
}

impl Category {
    /// Parse a category from a string (e.g., from a catalog file).
    pub fn from_string(s: &str) -> Self {
        match s.to_uppercase().as_str() {
            "IT" => Self::It,
            "HR" => Self::Hr,
            "SALES" => Self::Sales,
            "FINANCE" => Self::Finance,
            "MARKETING" => Self::Marketing,
            "ENGINEERING" => Self::Engineering,
            "SECURITY" => Self::Security,
            _ => Self::General,
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::It => write!(f, "IT"),
            Self::Hr => write!(f, "HR"),
            Self::Sales => write!(f, "SALES"),
            Self::Finance => write!(f, "FINANCE"),
            Self::Marketing => write!(f, "MARKETING"),
            Self::Engineering => write!(f, "ENGINEERING"),
            Self::Security => write!(f, "SECURITY"),
            Self::General => write!(f, "GENERAL"),
        }
    }
}

/// How a downstream agent authenticates its callers.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum AuthStrategy {
    Bearer,
    OAuth2,
    #[default]
    ApiKey,
    None,
}

/// Connection descriptor for a downstream agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConnection {
    /// Wire protocol the agent speaks, e.g. "https" or "grpc".
    pub protocol: String,
    pub url: String,
    #[serde(default)]
    pub auth_strategy: AuthStrategy,
}

/// A registered downstream agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentDescriptor {
    pub id: String,
    pub name: String,
    pub connection: AgentConnection,
    #[serde(default)]
    pub capabilities: Vec<String>,
    /// Intent ids this agent declares it can handle.
    #[serde(default)]
    pub intent_triggers: Vec<String>,
}

/// Caller identity as supplied out-of-band by the gateway.
///
/// Token verification happens upstream; this is the already-established
/// identity context, carried only so the handoff coordinator can propagate
/// credentials to the target agent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdentityContext {
    pub principal: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bearer_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl IdentityContext {
    pub fn anonymous() -> Self {
        Self {
            principal: "anonymous".to_string(),
            role: None,
            bearer_token: None,
            api_key: None,
        }
    }

    /// Role name used for policy evaluation, defaulting to "anonymous".
    pub fn role_or_anonymous(&self) -> &str {
        self.role.as_deref().unwrap_or("anonymous")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_round_trip() {
        assert_eq!(Category::from_string("it"), Category::It);
        assert_eq!(Category::from_string("SALES"), Category::Sales);
        assert_eq!(Category::from_string("whatever"), Category::General);
        assert_eq!(Category::Hr.to_string(), "HR");
    }

    #[test]
    fn test_category_serde_uppercase() {
        let json = serde_json::to_string(&Category::Engineering).unwrap();
        assert_eq!(json, "\"ENGINEERING\"");
        let back: Category = serde_json::from_str("\"SECURITY\"").unwrap();
        assert_eq!(back, Category::Security);
    }

    #[test]
    fn test_auth_strategy_serde() {
        let json = serde_json::to_string(&AuthStrategy::OAuth2).unwrap();
        assert_eq!(json, "\"oauth2\"");
        let back: AuthStrategy = serde_json::from_str("\"bearer\"").unwrap();
        assert_eq!(back, AuthStrategy::Bearer);
    }

    #[test]
    fn test_identity_role_default() {
        let identity = IdentityContext::anonymous();
        assert_eq!(identity.role_or_anonymous(), "anonymous");

        let identity = IdentityContext {
            role: Some("hr_admin".to_string()),
            ..IdentityContext::anonymous()
        };
        assert_eq!(identity.role_or_anonymous(), "hr_admin");
    }

    #[test]
    fn test_agent_descriptor_defaults() {
        let json = r#"{
            "id": "agent_it",
            "name": "IT Desk",
            "connection": {"protocol": "https", "url": "https://it.example.com"}
        }"#;
        let agent: AgentDescriptor = serde_json::from_str(json).unwrap();
        assert_eq!(agent.connection.auth_strategy, AuthStrategy::ApiKey);
        assert!(agent.capabilities.is_empty());
        assert!(agent.intent_triggers.is_empty());
    }
}
