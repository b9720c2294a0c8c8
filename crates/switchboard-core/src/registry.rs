//! Agent registry — the directory of downstream agents.
//!
//! Registration is last-write-wins per agent id. The registry always knows a
//! designated fallback agent so an ALLOW decision can be honored even when
//! the expected desk was never registered.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use tokio::sync::RwLock;
use tracing::{info, warn};
use url::Url;

use crate::types::{AgentConnection, AgentDescriptor, AuthStrategy};

pub struct AgentRegistry {
    agents: Arc<RwLock<HashMap<String, AgentDescriptor>>>,
    fallback_id: String,
}

impl AgentRegistry {
    pub fn new(fallback_id: impl Into<String>) -> Self {
        Self {
            agents: Arc::new(RwLock::new(HashMap::new())),
            fallback_id: fallback_id.into(),
        }
    }

    /// Register or replace an agent. The endpoint must be a valid absolute
    /// URL; a replaced registration is logged.
    pub async fn register(&self, agent: AgentDescriptor) -> Result<()> {
        if agent.id.trim().is_empty() {
            return Err(anyhow!("Agent id must not be empty"));
        }
        Url::parse(&agent.connection.url)
            .map_err(|e| anyhow!("Invalid endpoint URL '{}': {}", agent.connection.url, e))?;

        let mut agents = self.agents.write().await;
        if agents.insert(agent.id.clone(), agent.clone()).is_some() {
            warn!("Agent '{}' re-registered, previous entry replaced", agent.id);
        } else {
            info!("Registered agent '{}' at {}", agent.id, agent.connection.url);
        }
        Ok(())
    }

    pub async fn get(&self, id: &str) -> Option<AgentDescriptor> {
        self.agents.read().await.get(id).cloned()
    }

    /// All registered agents, sorted by id.
    pub async fn list(&self) -> Vec<AgentDescriptor> {
        let agents = self.agents.read().await;
        let mut list: Vec<AgentDescriptor> = agents.values().cloned().collect();
        list.sort_by(|a, b| a.id.cmp(&b.id));
        list
    }

    /// Agents declaring the given intent id among their triggers, sorted by id.
    pub async fn agents_for_intent(&self, intent_id: &str) -> Vec<AgentDescriptor> {
        let agents = self.agents.read().await;
        let mut list: Vec<AgentDescriptor> = agents
            .values()
            .filter(|a| a.intent_triggers.iter().any(|t| t == intent_id))
            .cloned()
            .collect();
        list.sort_by(|a, b| a.id.cmp(&b.id));
        list
    }

    /// The designated fallback agent, if registered.
    pub async fn fallback(&self) -> Option<AgentDescriptor> {
        self.get(&self.fallback_id).await
    }

    pub fn fallback_id(&self) -> &str {
        &self.fallback_id
    }

    pub async fn count(&self) -> usize {
        self.agents.read().await.len()
    }
}

/// The default desk agents for a fresh deployment.
pub fn default_agents() -> Vec<AgentDescriptor> {
    fn desk(id: &str, name: &str, url: &str, triggers: &[&str]) -> AgentDescriptor {
        AgentDescriptor {
            id: id.to_string(),
            name: name.to_string(),
            connection: AgentConnection {
                protocol: "https".to_string(),
                url: url.to_string(),
                auth_strategy: AuthStrategy::Bearer,
            },
            capabilities: vec!["chat".to_string()],
            intent_triggers: triggers.iter().map(|s| s.to_string()).collect(),
        }
    }

    vec![
        desk(
            "agent_it",
            "IT Desk",
            "https://agents.internal/it",
            &["IT_VPN", "IT_PASSWORD", "IT_HARDWARE", "IT_SOFTWARE"],
        ),
        desk(
            "agent_hr",
            "HR Desk",
            "https://agents.internal/hr",
            &["HR_PAYROLL", "HR_LEAVE", "HR_BENEFITS", "HR_ONBOARDING"],
        ),
        desk(
            "agent_sales",
            "Sales Desk",
            "https://agents.internal/sales",
            &["SALES_LEADS", "SALES_REPORTS", "SALES_CRM", "SALES_CONTRACTS"],
        ),
        desk(
            "agent_data",
            "Data Desk",
            "https://agents.internal/data",
            &["DATA_SQL", "DATA_DASHBOARD", "DATA_WAREHOUSE"],
        ),
        desk(
            "agent_general",
            "General Support Desk",
            "https://agents.internal/general",
            &[],
        ),
    ]
}
