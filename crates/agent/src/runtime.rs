use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use emsbot_core::audit::{AuditContext, AuditSink, TracingAuditSink};
use emsbot_core::config::AppConfig;
use emsbot_core::domain::intent::Intent;
use emsbot_db::RuleStore;

use crate::domains::{CreateDomain, DomainKind, InfoDomain, UpdateDomain};
use crate::engine::{AgentLoop, LoopSettings};
use crate::llm::DecisionService;
use crate::router::{IntentRouter, RouterOutcome, RouterSettings};

const RUNTIME_ACTOR: &str = "emsbot-runtime";

/// The public answer for a single query.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ClassificationReport {
    pub intent: Intent,
    pub confidence: f64,
    pub reasoning: String,
    pub final_response: String,
}

impl From<&RouterOutcome> for ClassificationReport {
    fn from(outcome: &RouterOutcome) -> Self {
        Self {
            intent: outcome.classification.intent,
            confidence: outcome.classification.confidence,
            reasoning: outcome.classification.reasoning.clone(),
            final_response: outcome.final_response.clone(),
        }
    }
}

/// Wires the decision service, the rule store and the audit sink into one
/// router. Each call owns its own run state, so distinct queries may be
/// handled concurrently against the same runtime.
pub struct AgentRuntime {
    router: IntentRouter,
}

impl AgentRuntime {
    pub fn new(
        service: Arc<dyn DecisionService>,
        store: Arc<dyn RuleStore>,
        config: &AppConfig,
    ) -> Self {
        Self::with_audit(service, store, Arc::new(TracingAuditSink), config)
    }

    pub fn with_audit(
        service: Arc<dyn DecisionService>,
        store: Arc<dyn RuleStore>,
        audit: Arc<dyn AuditSink>,
        config: &AppConfig,
    ) -> Self {
        let create = AgentLoop::new(
            CreateDomain,
            service.clone(),
            store.clone(),
            audit.clone(),
            LoopSettings::for_domain(DomainKind::Create, config),
        );
        let update = AgentLoop::new(
            UpdateDomain,
            service.clone(),
            store.clone(),
            audit.clone(),
            LoopSettings::for_domain(DomainKind::Update, config),
        );
        let info = AgentLoop::new(
            InfoDomain,
            service.clone(),
            store,
            audit.clone(),
            LoopSettings::for_domain(DomainKind::Info, config),
        );
        let settings = RouterSettings {
            model: config.llm.model.clone(),
            temperature: config.llm.response_temperature,
        };

        Self { router: IntentRouter::new(service, audit, settings, create, update, info) }
    }

    pub async fn classify(&self, query: &str) -> ClassificationReport {
        ClassificationReport::from(&self.handle(query).await)
    }

    /// Same as [`AgentRuntime::classify`] but keeps the analysis and loop trace.
    pub async fn handle(&self, query: &str) -> RouterOutcome {
        let audit = AuditContext::new(None, Uuid::new_v4().to_string(), RUNTIME_ACTOR);
        self.router.route(query.trim(), &audit).await
    }
}
