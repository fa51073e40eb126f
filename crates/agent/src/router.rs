use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use emsbot_core::audit::{AuditContext, AuditSink};
use emsbot_core::domain::intent::Intent;
use emsbot_core::flows::{FlowEngine, IntentRouterFlow, RouterEvent, RouterState};

use crate::domains::{AgentDomain, CreateDomain, InfoDomain, UpdateDomain};
use crate::engine::{AgentLoop, RunState};
use crate::extract::parse_or;
use crate::knowledge::{RF_KNOWLEDGE, SCHEMA_KNOWLEDGE};
use crate::llm::{DecisionService, InferenceRequest};

pub const ANALYZE_PURPOSE: &str = "analyze";
pub const CLASSIFY_PURPOSE: &str = "classify";
pub const GENERIC_PURPOSE: &str = "generic";

pub const UNKNOWN_RESPONSE: &str =
    "Sorry, I could not understand your request or may be your request not relevant";
const CLASSIFY_PARSE_FAILURE: &str = "Parse error, defaulting to GENERIC";
const GENERIC_UNAVAILABLE: &str =
    "The assistant could not reach the decision service to answer this question. Please try again later.";

fn lenient_bool<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Bool(flag)) => flag,
        Some(Value::String(text)) => text.trim().eq_ignore_ascii_case("true"),
        _ => false,
    })
}

fn string_list<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    let raw = Option::<Value>::deserialize(deserializer)?;
    let Some(Value::Array(items)) = raw else {
        return Ok(Vec::new());
    };
    Ok(items
        .into_iter()
        .filter_map(|item| match item {
            Value::String(text) => Some(text),
            Value::Null => None,
            other => Some(other.to_string()),
        })
        .collect())
}

/// Entities the analyzer spotted in the query. Only used as prompt context.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectedEntities {
    #[serde(default, deserialize_with = "string_list")]
    pub frequency_ranges: Vec<String>,
    #[serde(default, deserialize_with = "string_list")]
    pub signal_types: Vec<String>,
    #[serde(default, deserialize_with = "string_list")]
    pub action_types: Vec<String>,
    #[serde(default, deserialize_with = "string_list")]
    pub condition_types: Vec<String>,
    #[serde(default, deserialize_with = "string_list")]
    pub table_references: Vec<String>,
}

impl DetectedEntities {
    pub fn is_empty(&self) -> bool {
        self.frequency_ranges.is_empty()
            && self.signal_types.is_empty()
            && self.action_types.is_empty()
            && self.condition_types.is_empty()
            && self.table_references.is_empty()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryAnalysis {
    #[serde(default, deserialize_with = "lenient_bool")]
    pub requires_schema_knowledge: bool,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub requires_rf_knowledge: bool,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub requires_database_queries: bool,
    #[serde(default)]
    pub detected_entities: DetectedEntities,
}

impl QueryAnalysis {
    pub fn wants_schema(&self) -> bool {
        self.requires_schema_knowledge || self.requires_database_queries
    }

    /// Knowledge blocks to splice into the classification prompt.
    pub fn context(&self) -> String {
        let mut sections = Vec::new();
        if self.wants_schema() {
            sections.push(SCHEMA_KNOWLEDGE);
        }
        if self.requires_rf_knowledge {
            sections.push(RF_KNOWLEDGE);
        }
        sections.join("\n\n")
    }
}

#[derive(Deserialize)]
struct ClassificationReply {
    #[serde(default)]
    intent: Option<String>,
    #[serde(default)]
    confidence: Option<Value>,
    #[serde(default)]
    reasoning: String,
    #[serde(default, deserialize_with = "string_list")]
    key_indicators: Vec<String>,
    #[serde(default)]
    extracted_info: Option<BTreeMap<String, Value>>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct IntentClassification {
    pub intent: Intent,
    pub confidence: f64,
    pub reasoning: String,
    pub key_indicators: Vec<String>,
    pub extracted_info: BTreeMap<String, Value>,
}

impl IntentClassification {
    fn parse_failure() -> Self {
        Self {
            intent: Intent::Generic,
            confidence: 0.3,
            reasoning: CLASSIFY_PARSE_FAILURE.to_string(),
            key_indicators: Vec::new(),
            extracted_info: BTreeMap::new(),
        }
    }

    fn from_reply(reply: ClassificationReply) -> Self {
        let intent = reply.intent.as_deref().and_then(Intent::from_label).unwrap_or(Intent::Generic);
        let confidence = match reply.confidence {
            Some(Value::Number(number)) => number.as_f64().unwrap_or(0.0),
            Some(Value::String(text)) => text.trim().parse::<f64>().unwrap_or(0.0),
            _ => 0.0,
        };
        Self {
            intent,
            confidence: if confidence.is_finite() { confidence.clamp(0.0, 1.0) } else { 0.0 },
            reasoning: reply.reasoning,
            key_indicators: reply.key_indicators,
            extracted_info: reply.extracted_info.unwrap_or_default(),
        }
    }
}

/// Condensed view of a domain loop run.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LoopTrace {
    pub domain: &'static str,
    pub iterations: u32,
    pub tools_called: Vec<String>,
    pub validation_errors: Vec<String>,
    pub completion_reason: Option<String>,
}

impl LoopTrace {
    fn from_run<D: AgentDomain>(domain: &D, run: &RunState<D>) -> Self {
        Self {
            domain: domain.kind().label(),
            iterations: run.iteration,
            tools_called: run.tools_called().into_iter().map(str::to_string).collect(),
            validation_errors: run.validation_errors.clone(),
            completion_reason: run.completion_reason.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RouterOutcome {
    pub analysis: QueryAnalysis,
    pub classification: IntentClassification,
    pub final_response: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace: Option<LoopTrace>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RouterSettings {
    pub model: String,
    pub temperature: f32,
}

pub struct IntentRouter {
    service: Arc<dyn DecisionService>,
    audit: Arc<dyn AuditSink>,
    settings: RouterSettings,
    engine: FlowEngine<IntentRouterFlow>,
    create: AgentLoop<CreateDomain>,
    update: AgentLoop<UpdateDomain>,
    info: AgentLoop<InfoDomain>,
}

impl IntentRouter {
    pub fn new(
        service: Arc<dyn DecisionService>,
        audit: Arc<dyn AuditSink>,
        settings: RouterSettings,
        create: AgentLoop<CreateDomain>,
        update: AgentLoop<UpdateDomain>,
        info: AgentLoop<InfoDomain>,
    ) -> Self {
        Self { service, audit, settings, engine: FlowEngine::new(IntentRouterFlow), create, update, info }
    }

    pub async fn route(&self, query: &str, audit: &AuditContext) -> RouterOutcome {
        let mut state = self.engine.initial_state();

        let analysis = self.analyze(query, audit).await;
        state = self.advance(state, RouterEvent::ContextSelected, audit);

        let classification = if state == RouterState::Classifying {
            self.classify(query, &analysis, audit).await
        } else {
            IntentClassification::parse_failure()
        };
        state = self.advance(state, RouterEvent::Classified(classification.intent), audit);

        let (final_response, trace) = match state {
            RouterState::CreateLoop => {
                let run = self.create.run(query, audit).await;
                let trace = LoopTrace::from_run(self.create.domain(), &run);
                (run.final_response, Some(trace))
            }
            RouterState::UpdateLoop => {
                let run = self.update.run(query, audit).await;
                let trace = LoopTrace::from_run(self.update.domain(), &run);
                (run.final_response, Some(trace))
            }
            RouterState::InfoLoop => {
                let run = self.info.run(query, audit).await;
                let trace = LoopTrace::from_run(self.info.domain(), &run);
                (run.final_response, Some(trace))
            }
            RouterState::Generic => (self.answer_generic(query, audit).await, None),
            RouterState::Error
            | RouterState::Analyzing
            | RouterState::Classifying
            | RouterState::Terminal => (UNKNOWN_RESPONSE.to_string(), None),
        };
        self.advance(state, RouterEvent::HandlerCompleted, audit);

        info!(
            event_name = "router.completed",
            correlation_id = %audit.correlation_id,
            intent = classification.intent.label(),
            confidence = classification.confidence,
            "query routed"
        );
        RouterOutcome { analysis, classification, final_response, trace }
    }

    fn advance(&self, current: RouterState, event: RouterEvent, audit: &AuditContext) -> RouterState {
        match self.engine.apply_with_audit(&current, &event, self.audit.as_ref(), audit) {
            Ok(outcome) => outcome.to,
            Err(error) => {
                warn!(
                    event_name = "router.invalid_transition",
                    correlation_id = %audit.correlation_id,
                    error = %error,
                    "invalid router transition"
                );
                RouterState::Error
            }
        }
    }

    async fn analyze(&self, query: &str, audit: &AuditContext) -> QueryAnalysis {
        let request = InferenceRequest::new(
            ANALYZE_PURPOSE,
            self.settings.model.clone(),
            self.settings.temperature,
            ANALYZER_BRIEF,
        )
        .with_user(format!("Query: {query}"));

        let analysis = match self.service.infer(&request).await {
            Ok(reply) => parse_or(&reply, QueryAnalysis::default()).value,
            Err(error) => {
                warn!(
                    event_name = "router.analyze.failed",
                    correlation_id = %audit.correlation_id,
                    error = %error,
                    "analysis unavailable, continuing without context"
                );
                QueryAnalysis::default()
            }
        };
        info!(
            event_name = "router.analyzed",
            correlation_id = %audit.correlation_id,
            schema = analysis.wants_schema(),
            rf = analysis.requires_rf_knowledge,
            "query analyzed"
        );
        analysis
    }

    async fn classify(
        &self,
        query: &str,
        analysis: &QueryAnalysis,
        audit: &AuditContext,
    ) -> IntentClassification {
        let request = InferenceRequest::new(
            CLASSIFY_PURPOSE,
            self.settings.model.clone(),
            self.settings.temperature,
            classifier_brief(&analysis.context()),
        )
        .with_user(format!("User Query: {query}"));

        let reply = match self.service.infer(&request).await {
            Ok(reply) => reply,
            Err(error) => {
                warn!(
                    event_name = "router.classify.failed",
                    correlation_id = %audit.correlation_id,
                    error = %error,
                    "classification unavailable"
                );
                return IntentClassification::parse_failure();
            }
        };

        let parsed = parse_or::<Option<ClassificationReply>>(&reply, None);
        match parsed.value {
            Some(reply) if parsed.ok => IntentClassification::from_reply(reply),
            _ => IntentClassification::parse_failure(),
        }
    }

    async fn answer_generic(&self, query: &str, audit: &AuditContext) -> String {
        let request = InferenceRequest::new(
            GENERIC_PURPOSE,
            self.settings.model.clone(),
            self.settings.temperature,
            format!("{GENERIC_BRIEF}\n\n{SCHEMA_KNOWLEDGE}\n\n{RF_KNOWLEDGE}"),
        )
        .with_user(format!("User Query: {query}"));

        match self.service.infer(&request).await {
            Ok(reply) if !reply.trim().is_empty() => reply.trim().to_string(),
            Ok(_) => GENERIC_UNAVAILABLE.to_string(),
            Err(error) => {
                warn!(
                    event_name = "router.generic.failed",
                    correlation_id = %audit.correlation_id,
                    error = %error,
                    "generic answer unavailable"
                );
                GENERIC_UNAVAILABLE.to_string()
            }
        }
    }
}

const ANALYZER_BRIEF: &str = "\
You are a query analyzer for an RF spectrum automation system.

Decide whether the query needs:
1. Schema knowledge: questions about the automation database structure, its tables and fields.
2. RF knowledge: general RF concepts, signal types, frequencies or spectrum analysis.
3. Database queries: operations against automation rules, conditions or actions.

Respond ONLY with valid JSON:
{
    \"requires_schema_knowledge\": true/false,
    \"requires_rf_knowledge\": true/false,
    \"requires_database_queries\": true/false,
    \"detected_entities\": {
        \"frequency_ranges\": [],
        \"signal_types\": [],
        \"action_types\": [],
        \"condition_types\": [],
        \"table_references\": []
    }
}";

const GENERIC_BRIEF: &str = "\
You are an RF spectrum management assistant. Answer general questions with educational \
explanations of RF concepts, what the automation system can do and how its records are \
structured. Include short examples of requests the user could make. Do not claim to have \
changed or looked up any rule.";

fn classifier_brief(context: &str) -> String {
    format!(
        "You classify queries for an RF spectrum automation assistant.

{context}

Pick exactly ONE intent:
1. CREATE: creating new automation rules, conditions or actions.
2. UPDATE: enabling, disabling or changing existing rules, conditions or actions.
3. INFO: retrieving existing rules, conditions or actions.
4. GENERIC: general questions about RF spectrum, supported values, the schema or the system itself.
5. UNKNOWN: anything outside the categories above.

Respond ONLY with valid JSON:
{{
    \"intent\": \"CREATE|UPDATE|INFO|GENERIC|UNKNOWN\",
    \"confidence\": 0.0-1.0,
    \"reasoning\": \"why this intent\",
    \"key_indicators\": [\"keyword\"],
    \"extracted_info\": {{\"table_involved\": \"rule|condition|action|none\", \"operation\": \"operation if any\"}}
}}"
    )
}

#[cfg(test)]
mod tests {
    use emsbot_core::domain::intent::Intent;

    use super::{ClassificationReply, IntentClassification, QueryAnalysis};
    use crate::extract::parse_or;
    use crate::knowledge::{RF_KNOWLEDGE, SCHEMA_KNOWLEDGE};

    fn classify(raw: &str) -> IntentClassification {
        let parsed = parse_or::<Option<ClassificationReply>>(raw, None);
        match parsed.value {
            Some(reply) if parsed.ok => IntentClassification::from_reply(reply),
            _ => IntentClassification::parse_failure(),
        }
    }

    #[test]
    fn database_flag_pulls_in_schema_context() {
        let parsed = parse_or(
            "{\"requires_database_queries\": true, \"requires_rf_knowledge\": \"false\"}",
            QueryAnalysis::default(),
        );

        assert!(parsed.ok);
        let context = parsed.value.context();
        assert!(context.contains(SCHEMA_KNOWLEDGE));
        assert!(!context.contains(RF_KNOWLEDGE));
    }

    #[test]
    fn analysis_entities_tolerate_missing_and_odd_values() {
        let parsed = parse_or(
            "{\"detected_entities\": {\"signal_types\": [\"LTE\", null, 5], \"frequency_ranges\": null}}",
            QueryAnalysis::default(),
        );

        assert_eq!(parsed.value.detected_entities.signal_types, vec!["LTE", "5"]);
        assert!(parsed.value.detected_entities.frequency_ranges.is_empty());
        assert!(parsed.value.context().is_empty());
    }

    #[test]
    fn prose_classification_defaults_to_generic() {
        let classification = classify("I think this is about rules.");

        assert_eq!(classification.intent, Intent::Generic);
        assert_eq!(classification.confidence, 0.3);
        assert_eq!(classification.reasoning, "Parse error, defaulting to GENERIC");
    }

    #[test]
    fn unrecognized_label_routes_to_generic_and_confidence_is_clamped() {
        let classification = classify("{\"intent\": \"DELETE\", \"confidence\": 4.2}");
        assert_eq!(classification.intent, Intent::Generic);
        assert_eq!(classification.confidence, 1.0);

        let classification = classify("```json\n{\"intent\": \"info\", \"confidence\": \"0.9\", \"key_indicators\": [\"show\"]}\n```");
        assert_eq!(classification.intent, Intent::Info);
        assert_eq!(classification.confidence, 0.9);
        assert_eq!(classification.key_indicators, vec!["show"]);
    }
}
