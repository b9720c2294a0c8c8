//! SQLite persistence for the policy graph.
//!
//! The store is the durable form of the graph: roles, topics (with aliases),
//! groups, memberships, permission edges, routes, and rules. Request
//! handling never touches SQLite — [`PolicyStore::load_graph`] materializes a
//! full in-memory snapshot that the evaluator queries.

use anyhow::{Context, Result};
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

use crate::graph::{AccessLevel, PolicyGraph, GENERAL_SUPPORT};
use crate::rules::{Rule, RuleAction, RuleCondition};

/// SQLite-backed policy store (thread-safe via Arc<Mutex>).
pub struct PolicyStore {
    conn: Arc<Mutex<Connection>>,
}

impl PolicyStore {
    /// Open (or create) the store and ensure the schema exists.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path.as_ref()).context("Failed to open policy database")?;
        info!("Initializing policy store at {:?}", path.as_ref());

        conn.execute("PRAGMA foreign_keys = ON", [])?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS roles (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL
            )",
            [],
        )?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS topics (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL
            )",
            [],
        )?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS topic_aliases (
                alias TEXT PRIMARY KEY,
                topic_id TEXT NOT NULL,
                FOREIGN KEY(topic_id) REFERENCES topics(id) ON DELETE CASCADE
            )",
            [],
        )?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS policy_groups (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL
            )",
            [],
        )?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS memberships (
                role_id TEXT NOT NULL,
                group_id TEXT NOT NULL,
                PRIMARY KEY (role_id, group_id),
                FOREIGN KEY(role_id) REFERENCES roles(id) ON DELETE CASCADE,
                FOREIGN KEY(group_id) REFERENCES policy_groups(id) ON DELETE CASCADE
            )",
            [],
        )?;
        // holder_id is a role id or group id; the pair is unique so a
        // re-grant overwrites the previous access level.
        conn.execute(
            "CREATE TABLE IF NOT EXISTS permissions (
                holder_id TEXT NOT NULL,
                topic_id TEXT NOT NULL,
                access_level TEXT NOT NULL,
                PRIMARY KEY (holder_id, topic_id),
                FOREIGN KEY(topic_id) REFERENCES topics(id) ON DELETE CASCADE
            )",
            [],
        )?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS routes (
                topic_id TEXT PRIMARY KEY,
                agent_id TEXT NOT NULL,
                FOREIGN KEY(topic_id) REFERENCES topics(id) ON DELETE CASCADE
            )",
            [],
        )?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS rules (
                id TEXT PRIMARY KEY,
                description TEXT NOT NULL,
                condition TEXT NOT NULL,
                action TEXT NOT NULL,
                priority INTEGER NOT NULL,
                enabled INTEGER NOT NULL DEFAULT 1
            )",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_permissions_holder ON permissions(holder_id)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_rules_priority ON rules(priority)",
            [],
        )?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock_conn(conn: &Arc<Mutex<Connection>>) -> std::sync::MutexGuard<'_, Connection> {
        conn.lock().unwrap_or_else(|poisoned| {
            warn!("Policy database mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    pub async fn upsert_role(&self, id: &str, name: &str) -> Result<()> {
        let conn = Arc::clone(&self.conn);
        let (id, name) = (id.to_owned(), name.to_owned());
        tokio::task::spawn_blocking(move || {
            let conn = Self::lock_conn(&conn);
            conn.execute(
                "INSERT OR REPLACE INTO roles (id, name) VALUES (?1, ?2)",
                params![&id, &name],
            )?;
            debug!("Upserted role {}", id);
            Ok(())
        })
        .await
        .context("spawn_blocking task panicked")?
    }

    pub async fn upsert_topic(&self, id: &str, name: &str) -> Result<()> {
        let conn = Arc::clone(&self.conn);
        let (id, name) = (id.to_owned(), name.to_owned());
        tokio::task::spawn_blocking(move || {
            let conn = Self::lock_conn(&conn);
            conn.execute(
                "INSERT OR REPLACE INTO topics (id, name) VALUES (?1, ?2)",
                params![&id, &name],
            )?;
            Ok(())
        })
        .await
        .context("spawn_blocking task panicked")?
    }

    pub async fn upsert_group(&self, id: &str, name: &str) -> Result<()> {
        let conn = Arc::clone(&self.conn);
        let (id, name) = (id.to_owned(), name.to_owned());
        tokio::task::spawn_blocking(move || {
            let conn = Self::lock_conn(&conn);
            conn.execute(
                "INSERT OR REPLACE INTO policy_groups (id, name) VALUES (?1, ?2)",
                params![&id, &name],
            )?;
            Ok(())
        })
        .await
        .context("spawn_blocking task panicked")?
    }

    pub async fn add_alias(&self, alias: &str, topic_id: &str) -> Result<()> {
        let conn = Arc::clone(&self.conn);
        let (alias, topic_id) = (alias.to_lowercase(), topic_id.to_owned());
        tokio::task::spawn_blocking(move || {
            let conn = Self::lock_conn(&conn);
            conn.execute(
                "INSERT OR REPLACE INTO topic_aliases (alias, topic_id) VALUES (?1, ?2)",
                params![&alias, &topic_id],
            )?;
            Ok(())
        })
        .await
        .context("spawn_blocking task panicked")?
    }

    pub async fn add_membership(&self, role_id: &str, group_id: &str) -> Result<()> {
        let conn = Arc::clone(&self.conn);
        let (role_id, group_id) = (role_id.to_owned(), group_id.to_owned());
        tokio::task::spawn_blocking(move || {
            let conn = Self::lock_conn(&conn);
            conn.execute(
                "INSERT OR IGNORE INTO memberships (role_id, group_id) VALUES (?1, ?2)",
                params![&role_id, &group_id],
            )?;
            Ok(())
        })
        .await
        .context("spawn_blocking task panicked")?
    }

    /// Grant access. INSERT OR REPLACE keeps the (holder, topic) pair unique
    /// with last-write-wins semantics.
    pub async fn grant(&self, holder_id: &str, topic_id: &str, level: AccessLevel) -> Result<()> {
        let conn = Arc::clone(&self.conn);
        let (holder_id, topic_id) = (holder_id.to_owned(), topic_id.to_owned());
        let level = level.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = Self::lock_conn(&conn);
            conn.execute(
                "INSERT OR REPLACE INTO permissions (holder_id, topic_id, access_level)
                 VALUES (?1, ?2, ?3)",
                params![&holder_id, &topic_id, &level],
            )?;
            debug!("Granted {} on {} to {}", level, topic_id, holder_id);
            Ok(())
        })
        .await
        .context("spawn_blocking task panicked")?
    }

    pub async fn set_route(&self, topic_id: &str, agent_id: &str) -> Result<()> {
        let conn = Arc::clone(&self.conn);
        let (topic_id, agent_id) = (topic_id.to_owned(), agent_id.to_owned());
        tokio::task::spawn_blocking(move || {
            let conn = Self::lock_conn(&conn);
            conn.execute(
                "INSERT OR REPLACE INTO routes (topic_id, agent_id) VALUES (?1, ?2)",
                params![&topic_id, &agent_id],
            )?;
            Ok(())
        })
        .await
        .context("spawn_blocking task panicked")?
    }

    pub async fn insert_rule(&self, rule: &Rule) -> Result<()> {
        let conn = Arc::clone(&self.conn);
        let rule = rule.clone();
        tokio::task::spawn_blocking(move || {
            let condition = serde_json::to_string(&rule.condition)?;
            let action = serde_json::to_string(&rule.action)?;
            let conn = Self::lock_conn(&conn);
            conn.execute(
                "INSERT OR REPLACE INTO rules (id, description, condition, action, priority, enabled)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    &rule.id,
                    &rule.description,
                    &condition,
                    &action,
                    rule.priority,
                    rule.enabled as i64,
                ],
            )?;
            Ok(())
        })
        .await
        .context("spawn_blocking task panicked")?
    }

    /// True when no roles have been defined yet (fresh database).
    pub async fn is_empty(&self) -> Result<bool> {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = Self::lock_conn(&conn);
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM roles", [], |row| row.get(0))?;
            Ok(count == 0)
        })
        .await
        .context("spawn_blocking task panicked")?
    }

    /// Materialize the full graph snapshot.
    ///
    /// Rules with malformed condition/action JSON are skipped with a warning
    /// rather than failing the whole load: a bad rule must never turn into a
    /// missing deny.
    pub async fn load_graph(&self) -> Result<PolicyGraph> {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = Self::lock_conn(&conn);
            let mut graph = PolicyGraph::new();

            let mut stmt = conn.prepare("SELECT id, name FROM roles")?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?;
            for row in rows {
                let (id, name) = row?;
                graph.add_role(id, name);
            }

            let mut stmt = conn.prepare("SELECT id, name FROM topics")?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?;
            for row in rows {
                let (id, name) = row?;
                graph.add_topic(id, name);
            }

            let mut stmt = conn.prepare("SELECT alias, topic_id FROM topic_aliases")?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?;
            for row in rows {
                let (alias, topic_id) = row?;
                graph.add_alias(alias, topic_id);
            }

            let mut stmt = conn.prepare("SELECT id, name FROM policy_groups")?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?;
            for row in rows {
                let (id, name) = row?;
                graph.add_group(id, name);
            }

            let mut stmt = conn.prepare("SELECT role_id, group_id FROM memberships")?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?;
            for row in rows {
                let (role_id, group_id) = row?;
                graph.add_member(role_id, group_id);
            }

            let mut stmt =
                conn.prepare("SELECT holder_id, topic_id, access_level FROM permissions")?;
            let rows = stmt.query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })?;
            for row in rows {
                let (holder, topic, level) = row?;
                match AccessLevel::from_string(&level) {
                    Some(level) => graph.grant(holder, topic, level),
                    None => warn!(
                        "Skipping permission ({}, {}) with unknown access level '{}'",
                        holder, topic, level
                    ),
                }
            }

            let mut stmt = conn.prepare("SELECT topic_id, agent_id FROM routes")?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?;
            for row in rows {
                let (topic_id, agent_id) = row?;
                graph.route_to(topic_id, agent_id);
            }

            let mut stmt = conn.prepare(
                "SELECT id, description, condition, action, priority, enabled
                 FROM rules ORDER BY priority ASC",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, i32>(4)?,
                    row.get::<_, i64>(5)?,
                ))
            })?;
            for row in rows {
                let (id, description, condition, action, priority, enabled) = row?;
                let condition: RuleCondition = match serde_json::from_str(&condition) {
                    Ok(c) => c,
                    Err(e) => {
                        warn!("Skipping rule {} with malformed condition: {}", id, e);
                        continue;
                    }
                };
                let action: RuleAction = match serde_json::from_str(&action) {
                    Ok(a) => a,
                    Err(e) => {
                        warn!("Skipping rule {} with malformed action: {}", id, e);
                        continue;
                    }
                };
                graph.add_rule(Rule {
                    id,
                    description,
                    condition,
                    action,
                    priority,
                    enabled: enabled != 0,
                });
            }

            info!(
                "Loaded policy graph: {} roles, {} topics",
                graph.role_count(),
                graph.topic_count()
            );
            Ok(graph)
        })
        .await
        .context("spawn_blocking task panicked")?
    }

    /// Seed the default deployment policy into an empty store.
    pub async fn seed_defaults(&self) -> Result<()> {
        info!("Seeding default policy");

        for (id, name) in [
            ("hr_admin", "HR Administrator"),
            ("it_support", "IT Support"),
            ("sales", "Sales"),
            ("marketing", "Marketing"),
            ("finance", "Finance"),
            ("engineering", "Engineering"),
            ("employee", "Employee"),
            ("intern", "Intern"),
        ] {
            self.upsert_role(id, name).await?;
        }

        for (id, name) in [
            ("PAYROLL", "Payroll"),
            ("BENEFITS", "Benefits"),
            ("LEAVE", "Leave & Holidays"),
            ("ONBOARDING", "Onboarding"),
            ("IT_SUPPORT", "IT Support"),
            ("SALES_REPORTS", "Sales Reports"),
            ("SALES_PIPELINE", "Sales Pipeline"),
            ("CONTRACTS", "Contracts"),
            ("DATA_ANALYTICS", "Data Analytics"),
            (GENERAL_SUPPORT, "General Support"),
        ] {
            self.upsert_topic(id, name).await?;
        }

        // Intent ids and common phrasings resolve to canonical topics.
        for (alias, topic) in [
            ("hr_payroll", "PAYROLL"),
            ("payroll", "PAYROLL"),
            ("salary", "PAYROLL"),
            ("hr_benefits", "BENEFITS"),
            ("hr_leave", "LEAVE"),
            ("hr_onboarding", "ONBOARDING"),
            ("it_vpn", "IT_SUPPORT"),
            ("it_password", "IT_SUPPORT"),
            ("it_hardware", "IT_SUPPORT"),
            ("it_software", "IT_SUPPORT"),
            ("vpn", "IT_SUPPORT"),
            ("sales_leads", "SALES_PIPELINE"),
            ("sales_crm", "SALES_PIPELINE"),
            ("sales_reports", "SALES_REPORTS"),
            ("sales_contracts", "CONTRACTS"),
            ("data_sql", "DATA_ANALYTICS"),
            ("data_dashboard", "DATA_ANALYTICS"),
            ("data_warehouse", "DATA_ANALYTICS"),
            ("unknown", GENERAL_SUPPORT),
            ("general support", GENERAL_SUPPORT),
        ] {
            self.add_alias(alias, topic).await?;
        }

        self.upsert_group("tech_staff", "Technical Staff").await?;
        self.add_membership("engineering", "tech_staff").await?;
        self.add_membership("it_support", "tech_staff").await?;

        for (holder, topic, level) in [
            ("hr_admin", "PAYROLL", AccessLevel::Admin),
            ("hr_admin", "BENEFITS", AccessLevel::Admin),
            ("hr_admin", "LEAVE", AccessLevel::Write),
            ("hr_admin", "ONBOARDING", AccessLevel::Write),
            ("it_support", "IT_SUPPORT", AccessLevel::Admin),
            ("sales", "SALES_REPORTS", AccessLevel::Write),
            ("sales", "SALES_PIPELINE", AccessLevel::Write),
            ("sales", "CONTRACTS", AccessLevel::Read),
            ("marketing", "SALES_REPORTS", AccessLevel::Read),
            ("finance", "PAYROLL", AccessLevel::Read),
            ("finance", "SALES_REPORTS", AccessLevel::Read),
            ("finance", "DATA_ANALYTICS", AccessLevel::Read),
            ("employee", "LEAVE", AccessLevel::Write),
            ("employee", "IT_SUPPORT", AccessLevel::Read),
            ("tech_staff", "DATA_ANALYTICS", AccessLevel::Write),
        ] {
            self.grant(holder, topic, level).await?;
        }
        // Everyone can reach the general support desk.
        for role in [
            "hr_admin",
            "it_support",
            "sales",
            "marketing",
            "finance",
            "engineering",
            "employee",
        ] {
            self.grant(role, GENERAL_SUPPORT, AccessLevel::Read).await?;
        }

        for (topic, agent) in [
            ("PAYROLL", "agent_hr"),
            ("BENEFITS", "agent_hr"),
            ("LEAVE", "agent_hr"),
            ("ONBOARDING", "agent_hr"),
            ("IT_SUPPORT", "agent_it"),
            ("SALES_REPORTS", "agent_sales"),
            ("SALES_PIPELINE", "agent_sales"),
            ("CONTRACTS", "agent_sales"),
            ("DATA_ANALYTICS", "agent_data"),
            (GENERAL_SUPPORT, "agent_general"),
        ] {
            self.set_route(topic, agent).await?;
        }

        self.insert_rule(&Rule {
            id: "intern_general_only".to_string(),
            description: "interns are redirected to general support".to_string(),
            condition: RuleCondition::RoleEquals {
                role: "intern".to_string(),
            },
            action: RuleAction::Redirect {
                to: GENERAL_SUPPORT.to_string(),
            },
            priority: 10,
            enabled: true,
        })
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::{evaluate, Decision};

    async fn store() -> (tempfile::TempDir, PolicyStore) {
        let temp = tempfile::TempDir::new().unwrap();
        let store = PolicyStore::new(temp.path().join("policy.db")).unwrap();
        (temp, store)
    }

    #[tokio::test]
    async fn test_empty_store_loads_empty_graph() -> Result<()> {
        let (_temp, store) = store().await;
        assert!(store.is_empty().await?);
        let graph = store.load_graph().await?;
        assert_eq!(graph.role_count(), 0);
        assert_eq!(graph.topic_count(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_seed_and_load_round_trip() -> Result<()> {
        let (_temp, store) = store().await;
        store.seed_defaults().await?;
        assert!(!store.is_empty().await?);

        let graph = store.load_graph().await?;
        assert!(graph.role("hr_admin").is_some());
        assert!(graph.topic("PAYROLL").is_some());

        let allow = evaluate(&graph, "hr_admin", "PAYROLL");
        assert_eq!(allow.decision, Decision::Allow);

        let deny = evaluate(&graph, "marketing", "PAYROLL");
        assert_eq!(deny.decision, Decision::Deny);
        assert!(deny.alternatives.contains(&"SALES_REPORTS".to_string()));
        Ok(())
    }

    #[tokio::test]
    async fn test_grant_overwrites_previous_level() -> Result<()> {
        let (_temp, store) = store().await;
        store.upsert_role("r1", "Role One").await?;
        store.upsert_topic("T1", "Topic One").await?;
        store.grant("r1", "T1", AccessLevel::Admin).await?;
        store.grant("r1", "T1", AccessLevel::Read).await?;

        let graph = store.load_graph().await?;
        let perm = graph.has_permission("r1", "T1").unwrap();
        assert_eq!(perm.level, AccessLevel::Read);
        Ok(())
    }

    #[tokio::test]
    async fn test_group_membership_survives_round_trip() -> Result<()> {
        let (_temp, store) = store().await;
        store.seed_defaults().await?;
        let graph = store.load_graph().await?;
        let perm = graph.has_permission("engineering", "DATA_ANALYTICS").unwrap();
        assert_eq!(perm.path, vec!["engineering", "tech_staff", "DATA_ANALYTICS"]);
        Ok(())
    }

    #[tokio::test]
    async fn test_rules_load_in_priority_order() -> Result<()> {
        let (_temp, store) = store().await;
        store.upsert_role("intern", "Intern").await?;
        store.upsert_topic("T1", "Topic").await?;
        store
            .insert_rule(&Rule {
                id: "b".to_string(),
                description: "second".to_string(),
                condition: RuleCondition::RoleEquals {
                    role: "intern".to_string(),
                },
                action: RuleAction::Deny,
                priority: 20,
                enabled: true,
            })
            .await?;
        store
            .insert_rule(&Rule {
                id: "a".to_string(),
                description: "first".to_string(),
                condition: RuleCondition::RoleEquals {
                    role: "intern".to_string(),
                },
                action: RuleAction::Allow,
                priority: 1,
                enabled: true,
            })
            .await?;

        let graph = store.load_graph().await?;
        let decision = evaluate(&graph, "intern", "T1");
        assert_eq!(decision.decision, Decision::Allow);
        assert_eq!(decision.reasoning, "first");
        Ok(())
    }

    #[tokio::test]
    async fn test_seeded_alias_resolution_idempotent() -> Result<()> {
        let (_temp, store) = store().await;
        store.seed_defaults().await?;
        let graph = store.load_graph().await?;
        let once = graph.resolve_topic("it_vpn");
        let twice = graph.resolve_topic(&once);
        assert_eq!(once, "IT_SUPPORT");
        assert_eq!(once, twice);
        Ok(())
    }
}
