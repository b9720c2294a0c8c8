//! Intent taxonomy — the symbolic catalog the resolver scores against.
//!
//! The catalog is loaded as an immutable snapshot: [`TaxonomyIndex::build`]
//! validates the whole catalog and derives the keyword index up front, and
//! [`TaxonomyHandle`] swaps snapshots atomically on reload. A rejected load
//! leaves the previous catalog active.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::types::Category;

/// Sentinel intent id returned when nothing in the catalog matches.
pub const UNKNOWN_INTENT: &str = "UNKNOWN";

/// A single intent in the catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Intent {
    pub id: String,
    pub name: String,
    pub category: Category,
    /// Ordered keyword list; order is meaningful for display, matching is
    /// set-based.
    pub keywords: Vec<String>,
    #[serde(default)]
    pub phrases: Vec<String>,
    /// Undirected relatedness to other intent ids, not ownership.
    #[serde(default)]
    pub related: Vec<String>,
    #[serde(default)]
    pub requires_context: bool,
    /// Agent that serves this intent by default.
    pub default_agent: String,
    /// 1 (open) to 4 (most restricted).
    pub sensitivity: u8,
}

impl Intent {
    /// True when `other` appears in this intent's related set.
    pub fn is_related_to(&self, other: &str) -> bool {
        self.related.iter().any(|r| r == other)
    }
}

/// Catalog validation failure. The previous catalog stays active.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("duplicate intent id '{0}' in catalog")]
    DuplicateIntent(String),
    #[error("intent '{0}' has no keywords or phrases")]
    EmptyIntent(String),
    #[error("intent '{0}' has sensitivity {1}, expected 1..=4")]
    SensitivityOutOfRange(String, u8),
}

/// Immutable catalog snapshot plus the derived keyword index.
#[derive(Debug, Default)]
pub struct TaxonomyIndex {
    intents: HashMap<String, Intent>,
    /// Lowercase token -> intent ids. Derived; rebuilt on every load.
    keyword_index: HashMap<String, BTreeSet<String>>,
}

impl TaxonomyIndex {
    /// Validate a catalog and build the index. All-or-nothing: any invalid
    /// intent rejects the whole catalog.
    pub fn build(intents: Vec<Intent>) -> Result<Self, ConfigError> {
        let mut map: HashMap<String, Intent> = HashMap::new();
        for intent in intents {
            if intent.keywords.is_empty() && intent.phrases.is_empty() {
                return Err(ConfigError::EmptyIntent(intent.id));
            }
            if !(1..=4).contains(&intent.sensitivity) {
                return Err(ConfigError::SensitivityOutOfRange(
                    intent.id,
                    intent.sensitivity,
                ));
            }
            if map.contains_key(&intent.id) {
                return Err(ConfigError::DuplicateIntent(intent.id));
            }
            map.insert(intent.id.clone(), intent);
        }

        let mut keyword_index: HashMap<String, BTreeSet<String>> = HashMap::new();
        for intent in map.values() {
            for keyword in &intent.keywords {
                keyword_index
                    .entry(keyword.to_lowercase())
                    .or_default()
                    .insert(intent.id.clone());
            }
            // Phrases are matched by their leading token.
            for phrase in &intent.phrases {
                if let Some(first) = phrase.split_whitespace().next() {
                    keyword_index
                        .entry(first.to_lowercase())
                        .or_default()
                        .insert(intent.id.clone());
                }
            }
        }

        Ok(Self {
            intents: map,
            keyword_index,
        })
    }

    pub fn lookup(&self, id: &str) -> Option<&Intent> {
        self.intents.get(id)
    }

    pub fn by_category(&self, category: Category) -> Vec<&Intent> {
        let mut intents: Vec<&Intent> = self
            .intents
            .values()
            .filter(|i| i.category == category)
            .collect();
        intents.sort_by(|a, b| a.id.cmp(&b.id));
        intents
    }

    /// Intent ids indexed under a lowercase token.
    pub fn intents_for_token(&self, token: &str) -> Option<&BTreeSet<String>> {
        self.keyword_index.get(token)
    }

    pub fn len(&self) -> usize {
        self.intents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intents.is_empty()
    }
}

/// Shared handle to the active taxonomy snapshot; replace-on-reload.
#[derive(Clone)]
pub struct TaxonomyHandle {
    inner: Arc<RwLock<Arc<TaxonomyIndex>>>,
}

impl TaxonomyHandle {
    /// Start with an empty catalog (every query resolves to UNKNOWN).
    pub fn empty() -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(TaxonomyIndex::default()))),
        }
    }

    /// Replace the entire catalog atomically. On error the previous catalog
    /// remains active.
    pub fn load(&self, intents: Vec<Intent>) -> Result<(), ConfigError> {
        let index = TaxonomyIndex::build(intents)?;
        let count = index.len();
        let mut guard = match self.inner.write() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("Taxonomy handle lock was poisoned, recovering");
                poisoned.into_inner()
            }
        };
        *guard = Arc::new(index);
        info!("Taxonomy loaded: {} intents", count);
        Ok(())
    }

    pub fn snapshot(&self) -> Arc<TaxonomyIndex> {
        match self.inner.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => {
                warn!("Taxonomy handle lock was poisoned, recovering");
                Arc::clone(&poisoned.into_inner())
            }
        }
    }
}

/// The built-in catalog covering the default deployment's desks.
pub fn default_catalog() -> Vec<Intent> {
    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    vec![
        Intent {
            id: "IT_VPN".to_string(),
            name: "VPN & Remote Access".to_string(),
            category: Category::It,
            keywords: strings(&["vpn", "tunnel", "remote", "network"]),
            phrases: strings(&["vpn access", "remote access", "can't connect"]),
            related: vec![],
            requires_context: false,
            default_agent: "agent_it".to_string(),
            sensitivity: 2,
        },
        Intent {
            id: "IT_PASSWORD".to_string(),
            name: "Password & Credentials".to_string(),
            category: Category::It,
            keywords: strings(&["password", "reset", "login", "locked", "credentials"]),
            phrases: strings(&["password reset", "locked out", "forgot my password"]),
            related: vec![],
            requires_context: false,
            default_agent: "agent_it".to_string(),
            sensitivity: 3,
        },
        Intent {
            id: "IT_HARDWARE".to_string(),
            name: "Laptop & Hardware Repair".to_string(),
            category: Category::It,
            keywords: strings(&["laptop", "repair", "keyboard", "screen", "device", "broken"]),
            phrases: strings(&["laptop repair", "replacement device"]),
            related: strings(&["IT_SOFTWARE"]),
            requires_context: false,
            default_agent: "agent_it".to_string(),
            sensitivity: 1,
        },
        Intent {
            id: "IT_SOFTWARE".to_string(),
            name: "Software & Licensing".to_string(),
            category: Category::It,
            keywords: strings(&["software", "license", "install", "upgrade", "application"]),
            phrases: strings(&["software license", "install software"]),
            related: strings(&["IT_HARDWARE"]),
            requires_context: false,
            default_agent: "agent_it".to_string(),
            sensitivity: 1,
        },
        Intent {
            id: "HR_PAYROLL".to_string(),
            name: "Payroll".to_string(),
            category: Category::Hr,
            keywords: strings(&["payroll", "salary", "paycheck", "payslip", "paid"]),
            phrases: strings(&["payroll issue", "wrong amount"]),
            related: strings(&["HR_BENEFITS"]),
            requires_context: true,
            default_agent: "agent_hr".to_string(),
            sensitivity: 4,
        },
        Intent {
            id: "HR_LEAVE".to_string(),
            name: "Leave & Holidays".to_string(),
            category: Category::Hr,
            keywords: strings(&["holiday", "vacation", "leave", "pto", "absence"]),
            phrases: strings(&["holiday request", "time off"]),
            related: vec![],
            requires_context: false,
            default_agent: "agent_hr".to_string(),
            sensitivity: 2,
        },
        Intent {
            id: "HR_BENEFITS".to_string(),
            name: "Benefits".to_string(),
            category: Category::Hr,
            keywords: strings(&["benefits", "insurance", "pension", "401k", "healthcare"]),
            phrases: strings(&["benefits question", "health insurance"]),
            related: strings(&["HR_PAYROLL"]),
            requires_context: true,
            default_agent: "agent_hr".to_string(),
            sensitivity: 3,
        },
        Intent {
            id: "HR_ONBOARDING".to_string(),
            name: "Onboarding".to_string(),
            category: Category::Hr,
            keywords: strings(&["onboarding", "orientation", "starter", "induction"]),
            phrases: strings(&["new hire", "first day"]),
            related: vec![],
            requires_context: false,
            default_agent: "agent_hr".to_string(),
            sensitivity: 2,
        },
        Intent {
            id: "SALES_LEADS".to_string(),
            name: "Leads & Prospects".to_string(),
            category: Category::Sales,
            keywords: strings(&["lead", "customer", "prospect", "pipeline"]),
            phrases: strings(&["customer lead", "new prospect"]),
            related: strings(&["SALES_CRM"]),
            requires_context: false,
            default_agent: "agent_sales".to_string(),
            sensitivity: 2,
        },
        Intent {
            id: "SALES_REPORTS".to_string(),
            name: "Sales Reports".to_string(),
            category: Category::Sales,
            keywords: strings(&["report", "quota", "revenue", "forecast", "quarterly"]),
            phrases: strings(&["sales report", "quarterly numbers"]),
            related: vec![],
            requires_context: false,
            default_agent: "agent_sales".to_string(),
            sensitivity: 2,
        },
        Intent {
            id: "SALES_CRM".to_string(),
            name: "CRM Updates".to_string(),
            category: Category::Sales,
            keywords: strings(&["crm", "salesforce", "account", "opportunity"]),
            phrases: strings(&["crm update", "update the account"]),
            related: strings(&["SALES_LEADS"]),
            requires_context: false,
            default_agent: "agent_sales".to_string(),
            sensitivity: 2,
        },
        Intent {
            id: "SALES_CONTRACTS".to_string(),
            name: "Contracts & Renewals".to_string(),
            category: Category::Sales,
            keywords: strings(&["contract", "renewal", "agreement", "terms"]),
            phrases: strings(&["contract renewal", "renewal date"]),
            related: vec![],
            requires_context: true,
            default_agent: "agent_sales".to_string(),
            sensitivity: 3,
        },
        Intent {
            id: "DATA_SQL".to_string(),
            name: "SQL & Queries".to_string(),
            category: Category::Engineering,
            keywords: strings(&["sql", "query", "database", "table"]),
            phrases: strings(&["sql query", "run a query"]),
            related: strings(&["DATA_WAREHOUSE"]),
            requires_context: false,
            default_agent: "agent_data".to_string(),
            sensitivity: 3,
        },
        Intent {
            id: "DATA_DASHBOARD".to_string(),
            name: "Dashboards & Metrics".to_string(),
            category: Category::Engineering,
            keywords: strings(&["dashboard", "chart", "metrics", "grafana"]),
            phrases: strings(&["dashboard access", "broken chart"]),
            related: vec![],
            requires_context: false,
            default_agent: "agent_data".to_string(),
            sensitivity: 2,
        },
        Intent {
            id: "DATA_WAREHOUSE".to_string(),
            name: "Data Warehouse".to_string(),
            category: Category::Engineering,
            keywords: strings(&["warehouse", "snowflake", "etl", "ingest"]),
            phrases: strings(&["data warehouse", "snowflake access"]),
            related: strings(&["DATA_SQL"]),
            requires_context: false,
            default_agent: "agent_data".to_string(),
            sensitivity: 3,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn intent(id: &str, keywords: &[&str]) -> Intent {
        Intent {
            id: id.to_string(),
            name: id.to_string(),
            category: Category::General,
            keywords: keywords.iter().map(|s| s.to_string()).collect(),
            phrases: vec![],
            related: vec![],
            requires_context: false,
            default_agent: "agent_general".to_string(),
            sensitivity: 1,
        }
    }

    #[test]
    fn test_build_and_lookup() {
        let index = TaxonomyIndex::build(vec![
            intent("A", &["alpha"]),
            intent("B", &["beta"]),
        ])
        .unwrap();
        assert_eq!(index.len(), 2);
        assert!(index.lookup("A").is_some());
        assert!(index.lookup("C").is_none());
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let err = TaxonomyIndex::build(vec![intent("A", &["alpha"]), intent("A", &["other"])])
            .unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateIntent(id) if id == "A"));
    }

    #[test]
    fn test_empty_intent_rejected() {
        let err = TaxonomyIndex::build(vec![intent("A", &[])]).unwrap_err();
        assert!(matches!(err, ConfigError::EmptyIntent(_)));
    }

    #[test]
    fn test_sensitivity_range_rejected() {
        let mut bad = intent("A", &["alpha"]);
        bad.sensitivity = 9;
        let err = TaxonomyIndex::build(vec![bad]).unwrap_err();
        assert!(matches!(err, ConfigError::SensitivityOutOfRange(_, 9)));
    }

    #[test]
    fn test_keyword_index_lowercased() {
        let index = TaxonomyIndex::build(vec![intent("A", &["Alpha", "BETA"])]).unwrap();
        assert!(index.intents_for_token("alpha").is_some());
        assert!(index.intents_for_token("beta").is_some());
        assert!(index.intents_for_token("Alpha").is_none());
    }

    #[test]
    fn test_phrase_leading_token_indexed() {
        let mut i = intent("A", &["alpha"]);
        i.phrases = vec!["reset everything now".to_string()];
        let index = TaxonomyIndex::build(vec![i]).unwrap();
        let ids = index.intents_for_token("reset").unwrap();
        assert!(ids.contains("A"));
    }

    #[test]
    fn test_by_category_sorted() {
        let mut a = intent("ZED", &["z"]);
        a.category = Category::It;
        let mut b = intent("ABLE", &["a"]);
        b.category = Category::It;
        let index = TaxonomyIndex::build(vec![a, b]).unwrap();
        let it = index.by_category(Category::It);
        assert_eq!(it[0].id, "ABLE");
        assert_eq!(it[1].id, "ZED");
        assert!(index.by_category(Category::Finance).is_empty());
    }

    #[test]
    fn test_handle_load_failure_keeps_previous() {
        let handle = TaxonomyHandle::empty();
        handle.load(vec![intent("A", &["alpha"])]).unwrap();
        assert_eq!(handle.snapshot().len(), 1);

        let result = handle.load(vec![intent("B", &["beta"]), intent("B", &["beta"])]);
        assert!(result.is_err());
        // Previous catalog still active, not the half-loaded one.
        let snapshot = handle.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert!(snapshot.lookup("A").is_some());
        assert!(snapshot.lookup("B").is_none());
    }

    #[test]
    fn test_default_catalog_valid() {
        let index = TaxonomyIndex::build(default_catalog()).unwrap();
        assert!(index.len() >= 12);
        // Relatedness is declared both ways where it exists.
        let hw = index.lookup("IT_HARDWARE").unwrap();
        let sw = index.lookup("IT_SOFTWARE").unwrap();
        assert!(hw.is_related_to("IT_SOFTWARE"));
        assert!(sw.is_related_to("IT_HARDWARE"));
    }

    #[test]
    fn test_default_catalog_vpn_password_overlap() {
        let index = TaxonomyIndex::build(default_catalog()).unwrap();
        // "password" and "vpn" index distinct intents; "reset" belongs to
        // the credentials intent.
        assert!(index.intents_for_token("vpn").unwrap().contains("IT_VPN"));
        assert!(index
            .intents_for_token("password")
            .unwrap()
            .contains("IT_PASSWORD"));
    }
}
