//! In-memory access policy graph.
//!
//! Roles, topics, and groups are vertices; permission grants, group
//! memberships, and topic-to-agent routes are edges. The graph is an
//! immutable snapshot once built — request handling never mutates it, and
//! reloads swap the whole snapshot behind [`crate::PolicyHandle`].

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::rules::{AccessRequest, Rule};

/// Canonical topic every unresolvable alias falls back to.
pub const GENERAL_SUPPORT: &str = "GENERAL_SUPPORT";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleNode {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicNode {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupNode {
    pub id: String,
    pub name: String,
}

/// Access level carried by a permission edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AccessLevel {
    Read,
    Write,
    Admin,
}

impl AccessLevel {
    pub fn from_string(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "READ" => Some(Self::Read),
            "WRITE" => Some(Self::Write),
            "ADMIN" => Some(Self::Admin),
            _ => None,
        }
    }
}

impl std::fmt::Display for AccessLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Read => write!(f, "READ"),
            Self::Write => write!(f, "WRITE"),
            Self::Admin => write!(f, "ADMIN"),
        }
    }
}

/// Result of a successful permission lookup: the access level and the chain
/// of node ids that granted it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PermissionPath {
    pub level: AccessLevel,
    pub path: Vec<String>,
}

/// The policy graph snapshot.
#[derive(Debug, Clone, Default)]
pub struct PolicyGraph {
    roles: HashMap<String, RoleNode>,
    topics: HashMap<String, TopicNode>,
    groups: HashMap<String, GroupNode>,
    /// Permission edges keyed by (holder, topic). A holder is a role id or a
    /// group id. At most one edge per pair — inserting again overwrites.
    permissions: BTreeMap<(String, String), AccessLevel>,
    /// Role id -> group ids the role is a member of.
    memberships: HashMap<String, BTreeSet<String>>,
    /// Topic id -> agent id that serves it.
    routes: HashMap<String, String>,
    /// Lowercased alias text -> canonical topic id.
    aliases: HashMap<String, String>,
    /// Sorted by ascending priority at build time.
    rules: Vec<Rule>,
}

impl PolicyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Construction (store loader and tests) ──

    pub fn add_role(&mut self, id: impl Into<String>, name: impl Into<String>) {
        let id = id.into();
        self.roles.insert(
            id.clone(),
            RoleNode {
                id,
                name: name.into(),
            },
        );
    }

    pub fn add_topic(&mut self, id: impl Into<String>, name: impl Into<String>) {
        let id = id.into();
        self.topics.insert(
            id.clone(),
            TopicNode {
                id,
                name: name.into(),
            },
        );
    }

    pub fn add_group(&mut self, id: impl Into<String>, name: impl Into<String>) {
        let id = id.into();
        self.groups.insert(
            id.clone(),
            GroupNode {
                id,
                name: name.into(),
            },
        );
    }

    /// Add a MEMBER_OF edge from a role to a group.
    pub fn add_member(&mut self, role: impl Into<String>, group: impl Into<String>) {
        self.memberships
            .entry(role.into())
            .or_default()
            .insert(group.into());
    }

    /// Add a CAN_ACCESS edge. Last write wins for a (holder, topic) pair.
    pub fn grant(
        &mut self,
        holder: impl Into<String>,
        topic: impl Into<String>,
        level: AccessLevel,
    ) {
        let key = (holder.into(), topic.into());
        if let Some(previous) = self.permissions.insert(key.clone(), level) {
            debug!(
                "Permission edge ({}, {}) overwritten: {} -> {}",
                key.0, key.1, previous, level
            );
        }
    }

    /// Add a ROUTES_TO edge from a topic to the agent serving it.
    pub fn route_to(&mut self, topic: impl Into<String>, agent: impl Into<String>) {
        self.routes.insert(topic.into(), agent.into());
    }

    pub fn add_alias(&mut self, alias: impl Into<String>, topic: impl Into<String>) {
        self.aliases
            .insert(alias.into().trim().to_lowercase(), topic.into());
    }

    pub fn add_rule(&mut self, rule: Rule) {
        self.rules.push(rule);
        self.rules.sort_by_key(|r| r.priority);
    }

    // ── Queries ──

    pub fn role(&self, id: &str) -> Option<&RoleNode> {
        self.roles.get(id)
    }

    pub fn topic(&self, id: &str) -> Option<&TopicNode> {
        self.topics.get(id)
    }

    pub fn role_count(&self) -> usize {
        self.roles.len()
    }

    pub fn topic_count(&self) -> usize {
        self.topics.len()
    }

    /// Resolve free text or an alias to a canonical topic id.
    ///
    /// Exact topic ids resolve to themselves (case-insensitively), aliases
    /// resolve through the alias table, and anything else falls back to
    /// [`GENERAL_SUPPORT`]. Resolution is idempotent: resolving an already
    /// canonical id returns it unchanged.
    pub fn resolve_topic(&self, text: &str) -> String {
        let trimmed = text.trim();
        let upper = trimmed.to_uppercase();
        if self.topics.contains_key(&upper) {
            return upper;
        }
        if let Some(canonical) = self.aliases.get(&trimmed.to_lowercase()) {
            return canonical.clone();
        }
        GENERAL_SUPPORT.to_string()
    }

    /// Look up a permission edge for (role, topic): a direct edge first, then
    /// one inherited through a group the role is a member of.
    pub fn has_permission(&self, role: &str, topic: &str) -> Option<PermissionPath> {
        if let Some(level) = self
            .permissions
            .get(&(role.to_string(), topic.to_string()))
        {
            return Some(PermissionPath {
                level: *level,
                path: vec![role.to_string(), topic.to_string()],
            });
        }
        if let Some(groups) = self.memberships.get(role) {
            for group in groups {
                if let Some(level) = self
                    .permissions
                    .get(&(group.clone(), topic.to_string()))
                {
                    return Some(PermissionPath {
                        level: *level,
                        path: vec![role.to_string(), group.clone(), topic.to_string()],
                    });
                }
            }
        }
        None
    }

    /// First enabled rule, by ascending priority, whose condition matches.
    pub fn matching_rule(&self, request: &AccessRequest, now: DateTime<Utc>) -> Option<&Rule> {
        self.rules.iter().find(|r| r.matches(request, now))
    }

    /// Every topic the role can reach via a direct permission edge, in
    /// deterministic (lexicographic) order.
    pub fn alternatives(&self, role: &str) -> Vec<String> {
        self.permissions
            .keys()
            .filter(|(holder, _)| holder == role)
            .map(|(_, topic)| topic.clone())
            .collect()
    }

    /// Agent id the topic routes to, if any.
    pub fn route_for(&self, topic: &str) -> Option<&str> {
        self.routes.get(topic).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::{RuleAction, RuleCondition};

    fn sample_graph() -> PolicyGraph {
        let mut g = PolicyGraph::new();
        g.add_role("hr_admin", "HR Administrator");
        g.add_role("marketing", "Marketing");
        g.add_role("engineering", "Engineering");
        g.add_topic("PAYROLL", "Payroll");
        g.add_topic("SALES_REPORTS", "Sales Reports");
        g.add_topic("DATA_ANALYTICS", "Data Analytics");
        g.add_topic(GENERAL_SUPPORT, "General Support");
        g.add_group("tech_staff", "Technical Staff");
        g.add_member("engineering", "tech_staff");
        g.grant("hr_admin", "PAYROLL", AccessLevel::Admin);
        g.grant("marketing", "SALES_REPORTS", AccessLevel::Read);
        g.grant("tech_staff", "DATA_ANALYTICS", AccessLevel::Write);
        g.add_alias("payroll", "PAYROLL");
        g.add_alias("HR_PAYROLL", "PAYROLL");
        g.route_to("PAYROLL", "agent_hr");
        g
    }

    #[test]
    fn test_direct_permission() {
        let g = sample_graph();
        let perm = g.has_permission("hr_admin", "PAYROLL").unwrap();
        assert_eq!(perm.level, AccessLevel::Admin);
        assert_eq!(perm.path, vec!["hr_admin", "PAYROLL"]);
    }

    #[test]
    fn test_absent_permission() {
        let g = sample_graph();
        assert!(g.has_permission("marketing", "PAYROLL").is_none());
    }

    #[test]
    fn test_group_inherited_permission() {
        let g = sample_graph();
        let perm = g.has_permission("engineering", "DATA_ANALYTICS").unwrap();
        assert_eq!(perm.level, AccessLevel::Write);
        assert_eq!(perm.path, vec!["engineering", "tech_staff", "DATA_ANALYTICS"]);
    }

    #[test]
    fn test_grant_last_write_wins() {
        let mut g = sample_graph();
        g.grant("hr_admin", "PAYROLL", AccessLevel::Read);
        let perm = g.has_permission("hr_admin", "PAYROLL").unwrap();
        assert_eq!(perm.level, AccessLevel::Read);
    }

    #[test]
    fn test_resolve_topic_alias() {
        let g = sample_graph();
        assert_eq!(g.resolve_topic("payroll"), "PAYROLL");
        assert_eq!(g.resolve_topic("  HR_PAYROLL "), "PAYROLL");
    }

    #[test]
    fn test_resolve_topic_idempotent() {
        let g = sample_graph();
        let first = g.resolve_topic("hr_payroll");
        let second = g.resolve_topic(&first);
        assert_eq!(first, second);
        assert_eq!(second, "PAYROLL");
    }

    #[test]
    fn test_resolve_topic_fallback() {
        let g = sample_graph();
        assert_eq!(g.resolve_topic("something nobody registered"), GENERAL_SUPPORT);
    }

    #[test]
    fn test_alternatives_sorted_direct_only() {
        let mut g = sample_graph();
        g.grant("marketing", GENERAL_SUPPORT, AccessLevel::Read);
        let alts = g.alternatives("marketing");
        assert_eq!(alts, vec!["GENERAL_SUPPORT", "SALES_REPORTS"]);
        // Group-inherited edges are not listed as direct alternatives.
        assert!(g.alternatives("engineering").is_empty());
    }

    #[test]
    fn test_matching_rule_priority_order() {
        let mut g = sample_graph();
        g.add_rule(Rule {
            id: "later".to_string(),
            description: "catch-all deny".to_string(),
            condition: RuleCondition::RoleEquals {
                role: "intern".to_string(),
            },
            action: RuleAction::Deny,
            priority: 50,
            enabled: true,
        });
        g.add_rule(Rule {
            id: "first".to_string(),
            description: "interns get general support".to_string(),
            condition: RuleCondition::RoleEquals {
                role: "intern".to_string(),
            },
            action: RuleAction::Redirect {
                to: GENERAL_SUPPORT.to_string(),
            },
            priority: 10,
            enabled: true,
        });
        let req = AccessRequest {
            role: "intern".to_string(),
            topic: "PAYROLL".to_string(),
        };
        let matched = g.matching_rule(&req, Utc::now()).unwrap();
        assert_eq!(matched.id, "first");
    }

    #[test]
    fn test_route_for() {
        let g = sample_graph();
        assert_eq!(g.route_for("PAYROLL"), Some("agent_hr"));
        assert!(g.route_for("SALES_REPORTS").is_none());
    }

    #[test]
    fn test_access_level_round_trip() {
        assert_eq!(AccessLevel::from_string("admin"), Some(AccessLevel::Admin));
        assert_eq!(AccessLevel::from_string("READ"), Some(AccessLevel::Read));
        assert_eq!(AccessLevel::from_string("bogus"), None);
        assert_eq!(AccessLevel::Write.to_string(), "WRITE");
    }
}
