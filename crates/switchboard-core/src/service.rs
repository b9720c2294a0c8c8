//! The routing service — composes resolution, evaluation, handoff, and audit.
//!
//! A request moves through: received -> intent resolved -> access evaluated
//! -> handoff issued or alternatives returned -> logged. The decision path
//! is stateless per request; the audit append is the only shared mutation
//! and it never blocks the response.

use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use switchboard_policy::{evaluate, AccessDecision, PolicyHandle};

use crate::audit::{AuditRecord, AuditSink};
use crate::classifier::{resolve_neural, Classifier, NeuralRoute};
use crate::handoff::{self, HandoffEnvelope};
use crate::registry::AgentRegistry;
use crate::resolver::{detect, DetectionContext, IntentDetectionResult};
use crate::taxonomy::TaxonomyHandle;
use crate::types::{AgentDescriptor, IdentityContext};

/// Classifier replies cached per normalized query.
const NEURAL_CACHE_SIZE: usize = 256;

/// Terminal outcome of one routing request.
#[derive(Debug, Clone)]
pub enum RouteOutcome {
    Handoff {
        envelope: HandoffEnvelope,
        intent: IntentDetectionResult,
        decision: AccessDecision,
    },
    Denied {
        intent: IntentDetectionResult,
        decision: AccessDecision,
    },
}

pub struct RouterService {
    taxonomy: TaxonomyHandle,
    policy: PolicyHandle,
    registry: Arc<AgentRegistry>,
    audit: AuditSink,
    classifier: Option<Arc<dyn Classifier>>,
    neural_cache: Mutex<LruCache<String, NeuralRoute>>,
}

impl RouterService {
    pub fn new(
        taxonomy: TaxonomyHandle,
        policy: PolicyHandle,
        registry: Arc<AgentRegistry>,
        audit: AuditSink,
    ) -> Self {
        Self {
            taxonomy,
            policy,
            registry,
            audit,
            classifier: None,
            neural_cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(NEURAL_CACHE_SIZE).unwrap(),
            )),
        }
    }

    /// Enable the neural layer.
    pub fn with_classifier(mut self, classifier: Arc<dyn Classifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    pub fn audit(&self) -> &AuditSink {
        &self.audit
    }

    pub fn registry(&self) -> &Arc<AgentRegistry> {
        &self.registry
    }

    pub fn taxonomy(&self) -> &TaxonomyHandle {
        &self.taxonomy
    }

    pub fn policy(&self) -> &PolicyHandle {
        &self.policy
    }

    /// Route a query for the given caller. Infallible by design: resolver
    /// failures resolve to the sentinel intent, policy unavailability denies,
    /// and audit problems are swallowed.
    pub async fn route(&self, query: &str, identity: &IdentityContext) -> RouteOutcome {
        let role = identity.role_or_anonymous().to_string();
        let context = DetectionContext {
            role: identity.role.clone(),
        };

        let intent = detect(&self.taxonomy.snapshot(), query, &context);
        debug!(
            "Resolved intent {} (confidence {:.2}, ambiguous {})",
            intent.intent, intent.confidence, intent.is_ambiguous
        );

        let graph = self.policy.snapshot();
        let decision = evaluate(&graph, &role, &intent.intent);

        if !decision.is_allowed() {
            info!(
                "Denied: role={} topic={} ({})",
                role, decision.topic, decision.reasoning
            );
            self.audit.append(AuditRecord::new(
                query,
                decision.topic.clone(),
                intent.confidence,
                "denied",
            ));
            return RouteOutcome::Denied { intent, decision };
        }

        let agent = match self.select_agent(query, &intent, &decision.topic).await {
            Some(agent) => agent,
            None => {
                // Even the fallback desk is unregistered; refuse rather than
                // hand out a dangling endpoint.
                warn!("Allowed but no agent registered for topic {}", decision.topic);
                self.audit.append(AuditRecord::new(
                    query,
                    decision.topic.clone(),
                    intent.confidence,
                    "denied",
                ));
                let mut decision = decision;
                decision.decision = switchboard_policy::Decision::Deny;
                decision.reasoning = "no agent available for allowed topic".to_string();
                return RouteOutcome::Denied { intent, decision };
            }
        };

        let envelope = handoff::issue(&decision, &agent, identity)
            .expect("allowed decision always yields an envelope");
        info!(
            "Handoff: role={} topic={} -> {} (trace {})",
            role, decision.topic, agent.id, envelope.trace_id
        );
        self.audit.append(AuditRecord::new(
            query,
            agent.id.clone(),
            intent.confidence,
            "handoff",
        ));

        RouteOutcome::Handoff {
            envelope,
            intent,
            decision,
        }
    }

    /// Direct symbolic evaluation, bypassing intent resolution.
    pub async fn evaluate_direct(&self, role: &str, topic: &str) -> AccessDecision {
        let graph = self.policy.snapshot();
        let decision = evaluate(&graph, role, topic);
        self.audit.append(AuditRecord::new(
            format!("{} -> {}", role, topic),
            decision.topic.clone(),
            1.0,
            "evaluate",
        ));
        decision
    }

    /// Pick the agent serving the resolved intent.
    ///
    /// Registry triggers win; when several registered agents implement the
    /// same intent the neural layer breaks the tie (and only that — it never
    /// overrides the access decision). Unregistered targets fall back to the
    /// topic route and finally the designated fallback agent.
    async fn select_agent(
        &self,
        query: &str,
        intent: &IntentDetectionResult,
        topic: &str,
    ) -> Option<AgentDescriptor> {
        let candidates = self.registry.agents_for_intent(&intent.intent).await;
        match candidates.len() {
            1 => return Some(candidates.into_iter().next().unwrap()),
            n if n > 1 => {
                if let Some(classifier) = &self.classifier {
                    let neural = self.cached_neural(classifier.as_ref(), query).await;
                    if let Some(chosen) = candidates.iter().find(|a| a.id == neural.target) {
                        debug!(
                            "Neural layer selected {} among {} candidates",
                            chosen.id, n
                        );
                        return Some(chosen.clone());
                    }
                }
                return Some(candidates.into_iter().next().unwrap());
            }
            _ => {}
        }

        // No trigger matches: the intent's default desk, then the topic
        // route, then the fallback agent.
        if let Some(agent_id) = &intent.agent {
            if let Some(agent) = self.registry.get(agent_id).await {
                return Some(agent);
            }
        }
        let graph = self.policy.snapshot();
        if let Some(agent_id) = graph.route_for(topic) {
            if let Some(agent) = self.registry.get(agent_id).await {
                return Some(agent);
            }
        }
        self.registry.fallback().await
    }

    async fn cached_neural(&self, classifier: &dyn Classifier, query: &str) -> NeuralRoute {
        let key = query.trim().to_lowercase();
        {
            let mut cache = self.neural_cache.lock().await;
            if let Some(route) = cache.get(&key) {
                debug!("Neural cache hit for {:?}", key);
                return route.clone();
            }
        }
        let route = resolve_neural(classifier, query, self.registry.fallback_id()).await;
        self.neural_cache.lock().await.put(key, route.clone());
        route
    }
}
