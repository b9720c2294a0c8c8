//! Symbolic intent resolution — keyword scoring over the taxonomy.
//!
//! Scoring is deliberately explainable: one point per catalog keyword (or
//! phrase-leading token) present in the query, no statistical weighting.
//! Disambiguation prefers the more specific of two mutually related intents,
//! then the caller role's usual desk; if neither rule settles it the result
//! is marked ambiguous and carries the full candidate list so the caller can
//! surface it instead of committing silently.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::taxonomy::{Intent, TaxonomyIndex, UNKNOWN_INTENT};
use crate::types::Category;

/// Role -> preferred desk, used when keyword overlap alone cannot decide.
/// Mirrors the default deployment's desk assignments; update alongside the
/// default catalog.
const ROLE_AGENT_AFFINITY: &[(&str, &str)] = &[
    ("hr_admin", "agent_hr"),
    ("hr", "agent_hr"),
    ("it_support", "agent_it"),
    ("engineering", "agent_it"),
    ("sales", "agent_sales"),
    ("marketing", "agent_sales"),
    ("finance", "agent_data"),
    ("data_analyst", "agent_data"),
];

fn affinity_agent(role: &str) -> Option<&'static str> {
    ROLE_AGENT_AFFINITY
        .iter()
        .find(|(r, _)| role.eq_ignore_ascii_case(r))
        .map(|(_, agent)| *agent)
}

/// Optional caller context for disambiguation.
#[derive(Debug, Clone, Default)]
pub struct DetectionContext {
    pub role: Option<String>,
}

impl DetectionContext {
    pub fn with_role(role: impl Into<String>) -> Self {
        Self {
            role: Some(role.into()),
        }
    }
}

/// Outcome of symbolic resolution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentDetectionResult {
    /// Resolved intent id, or [`UNKNOWN_INTENT`].
    pub intent: String,
    pub category: Category,
    /// Default agent for the resolved intent; None for the sentinel.
    pub agent: Option<String>,
    /// Always within [0.0, 1.0].
    pub confidence: f64,
    pub reasoning: String,
    pub is_ambiguous: bool,
    /// On an ambiguous result, every scored candidate in rank order
    /// (primary included) so callers can surface the full choice.
    pub alternatives: Vec<String>,
    /// Sensitivity of the resolved intent; on an ambiguous result the max
    /// across candidates, so ambiguity never loosens restriction.
    pub sensitivity: u8,
}

impl IntentDetectionResult {
    fn unknown() -> Self {
        Self {
            intent: UNKNOWN_INTENT.to_string(),
            category: Category::General,
            agent: None,
            confidence: 0.0,
            reasoning: "no_match".to_string(),
            is_ambiguous: false,
            alternatives: Vec::new(),
            sensitivity: 1,
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.intent == UNKNOWN_INTENT
    }
}

/// Resolve a free-text query against the catalog.
pub fn detect(
    index: &TaxonomyIndex,
    query: &str,
    context: &DetectionContext,
) -> IntentDetectionResult {
    let lower = query.to_lowercase();
    let tokens: BTreeSet<&str> = lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .collect();

    // One point per catalog token present in the query.
    let mut scores: BTreeMap<String, u32> = BTreeMap::new();
    for token in &tokens {
        if let Some(ids) = index.intents_for_token(token) {
            for id in ids {
                *scores.entry(id.clone()).or_insert(0) += 1;
            }
        }
    }

    if scores.is_empty() {
        debug!("No intent matched query: {:?}", query);
        return IntentDetectionResult::unknown();
    }

    // Rank by score descending, id ascending for determinism.
    let mut candidates: Vec<(String, u32)> = scores.into_iter().collect();
    candidates.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    if candidates.len() == 1 {
        let intent = index
            .lookup(&candidates[0].0)
            .expect("scored intent exists in index");
        return finish(resolved(intent, 0.95, "keyword_match"), intent, context);
    }

    // Disambiguation (a): two mutually related candidates — prefer the one
    // with the larger keyword set as the more specific of the pair.
    for i in 0..candidates.len() {
        for j in (i + 1)..candidates.len() {
            let a = index.lookup(&candidates[i].0).expect("candidate exists");
            let b = index.lookup(&candidates[j].0).expect("candidate exists");
            if a.is_related_to(&b.id) && b.is_related_to(&a.id) {
                let winner = if a.keywords.len() >= b.keywords.len() { a } else { b };
                debug!(
                    "Disambiguated {} vs {} by relatedness -> {}",
                    a.id, b.id, winner.id
                );
                return finish(resolved(winner, 0.85, "related_specificity"), winner, context);
            }
        }
    }

    // Disambiguation (b): the caller role's usual desk.
    if let Some(role) = context.role.as_deref() {
        if let Some(preferred) = affinity_agent(role) {
            if let Some((id, _)) = candidates
                .iter()
                .find(|(id, _)| {
                    index
                        .lookup(id)
                        .is_some_and(|i| i.default_agent == preferred)
                })
            {
                let intent = index.lookup(id).expect("candidate exists");
                debug!("Disambiguated via role affinity: {} -> {}", role, intent.id);
                return finish(resolved(intent, 0.85, "role_affinity"), intent, context);
            }
        }
    }

    // Still ambiguous: rank by literal keyword-substring matches against the
    // raw query and report the whole candidate set.
    let mut ranked: Vec<(&Intent, usize)> = candidates
        .iter()
        .map(|(id, _)| {
            let intent = index.lookup(id).expect("candidate exists");
            (intent, substring_matches(intent, &lower))
        })
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.id.cmp(&b.0.id)));

    let primary = ranked[0].0;
    let alternatives: Vec<String> = ranked.iter().map(|(i, _)| i.id.clone()).collect();
    let sensitivity = ranked.iter().map(|(i, _)| i.sensitivity).max().unwrap_or(1);
    debug!(
        "Ambiguous query {:?}: primary={} candidates={:?}",
        query, primary.id, alternatives
    );

    let mut result = resolved(primary, 0.5, "ambiguous_keyword_overlap");
    result.is_ambiguous = true;
    result.alternatives = alternatives;
    result.sensitivity = sensitivity;
    finish(result, primary, context)
}

fn resolved(intent: &Intent, confidence: f64, reasoning: &str) -> IntentDetectionResult {
    IntentDetectionResult {
        intent: intent.id.clone(),
        category: intent.category,
        agent: Some(intent.default_agent.clone()),
        confidence,
        reasoning: reasoning.to_string(),
        is_ambiguous: false,
        alternatives: Vec::new(),
        sensitivity: intent.sensitivity,
    }
}

/// Intents that need caller context resolve with reduced confidence when the
/// caller supplied none.
fn finish(
    mut result: IntentDetectionResult,
    primary: &Intent,
    context: &DetectionContext,
) -> IntentDetectionResult {
    if primary.requires_context && context.role.is_none() && result.confidence > 0.7 {
        result.confidence = 0.7;
        result.reasoning = format!("{}+context_required", result.reasoning);
    }
    debug_assert!((0.0..=1.0).contains(&result.confidence));
    result
}

fn substring_matches(intent: &Intent, lower_query: &str) -> usize {
    intent
        .keywords
        .iter()
        .filter(|k| lower_query.contains(&k.to_lowercase()))
        .count()
}
