//! The planner / executor / responder loop shared by every record domain.
//!
//! Each run owns its [`RunState`]. The loop walks the [`AgentLoopFlow`] state
//! machine: every planning step increments the iteration counter by one, and
//! the run stops at the first forced or signalled completion. Decision service
//! failures and unparseable replies degrade to a forced completion instead of
//! an error.

use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use emsbot_core::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use emsbot_core::config::AppConfig;
use emsbot_core::domain::Parameters;
use emsbot_core::flows::{AgentLoopFlow, FlowEngine, LoopEvent, LoopState};
use emsbot_db::RuleStore;

use crate::dispatch::dispatch;
use crate::domains::{AgentDomain, DomainKind, Eligibility, EntityAccumulator};
use crate::extract::parse_or;
use crate::llm::{DecisionService, InferenceRequest};
use crate::tools::{render_tools, CallId, ToolCallRecord};

pub const PLAN_PURPOSE: &str = "plan";
pub const RESPOND_PURPOSE: &str = "respond";

const CEILING_REACHED: &str = "Iteration ceiling reached";
const PARSE_FAILURE: &str = "Parse error - could not extract valid JSON from response";
const NO_TOOLS_LEFT: &str = "No tools are available at this step";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", from = "Option<String>")]
pub enum NextAction {
    CallTool,
    Respond,
}

impl From<Option<String>> for NextAction {
    fn from(raw: Option<String>) -> Self {
        match raw.as_deref().map(|value| value.trim().to_ascii_lowercase()).as_deref() {
            Some("call_tool" | "invoke_tool") => Self::CallTool,
            _ => Self::Respond,
        }
    }
}

fn default_next_action() -> NextAction {
    NextAction::Respond
}

fn lenient_flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Bool(flag)) => flag,
        Some(Value::String(text)) => text.trim().eq_ignore_ascii_case("true"),
        _ => false,
    })
}

fn lenient_confidence<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
    let raw = match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Number(number)) => number.as_f64(),
        Some(Value::String(text)) => text.trim().parse::<f64>().ok(),
        _ => None,
    };
    Ok(raw.map(|value| value.clamp(0.0, 1.0)))
}

fn null_as_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Parameters, D::Error> {
    Ok(Option::<Parameters>::deserialize(deserializer)?.unwrap_or_default())
}

/// One planning step's verdict. Completion flag spellings used by the
/// individual planner prompts are read alongside `completed`; any one set
/// marks the decision as complete.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "WireDecision")]
pub struct PlanningDecision {
    pub next_action: NextAction,
    pub reasoning: String,
    pub completed: bool,
    pub selected_tool: Option<String>,
    pub tool_parameters: Parameters,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

#[derive(Deserialize)]
struct WireDecision {
    #[serde(default = "default_next_action")]
    next_action: NextAction,
    #[serde(default)]
    reasoning: String,
    #[serde(default, deserialize_with = "lenient_flag")]
    completed: bool,
    #[serde(default, deserialize_with = "lenient_flag")]
    has_completed_creation: bool,
    #[serde(default, deserialize_with = "lenient_flag")]
    has_completed_update: bool,
    #[serde(default, deserialize_with = "lenient_flag")]
    has_sufficient_data: bool,
    #[serde(default)]
    selected_tool: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    tool_parameters: Parameters,
    #[serde(default, deserialize_with = "lenient_confidence")]
    confidence: Option<f64>,
}

impl From<WireDecision> for PlanningDecision {
    fn from(wire: WireDecision) -> Self {
        Self {
            next_action: wire.next_action,
            reasoning: wire.reasoning,
            completed: wire.completed
                || wire.has_completed_creation
                || wire.has_completed_update
                || wire.has_sufficient_data,
            selected_tool: wire.selected_tool,
            tool_parameters: wire.tool_parameters,
            confidence: wire.confidence,
        }
    }
}

impl PlanningDecision {
    pub fn finish(reasoning: impl Into<String>) -> Self {
        Self {
            next_action: NextAction::Respond,
            reasoning: reasoning.into(),
            completed: true,
            selected_tool: None,
            tool_parameters: Parameters::new(),
            confidence: None,
        }
    }

    pub fn wants_tool(&self) -> bool {
        !self.completed && self.next_action == NextAction::CallTool
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct LoopSettings {
    pub model: String,
    pub planning_temperature: f32,
    pub response_temperature: f32,
    pub max_iterations: u32,
}

impl LoopSettings {
    pub fn for_domain(kind: DomainKind, config: &AppConfig) -> Self {
        let max_iterations = match kind {
            DomainKind::Create => config.agent.create_max_iterations,
            DomainKind::Update => config.agent.update_max_iterations,
            DomainKind::Info => config.agent.info_max_iterations,
        };
        Self {
            model: config.llm.model.clone(),
            planning_temperature: config.llm.planning_temperature,
            response_temperature: config.llm.response_temperature,
            max_iterations,
        }
    }

    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
        self
    }
}

#[derive(Debug)]
pub struct RunState<D: AgentDomain> {
    pub run_id: String,
    pub query: String,
    pub state: LoopState,
    pub iteration: u32,
    pub max_iterations: u32,
    pub history: Vec<ToolCallRecord<D::Outcome>>,
    pub entities: EntityAccumulator<D::Entities>,
    pub last_decision: Option<PlanningDecision>,
    pub validation_errors: Vec<String>,
    pub final_response: String,
    pub completed: bool,
    pub completion_reason: Option<String>,
    eligible: Vec<D::Tool>,
}

impl<D: AgentDomain> RunState<D> {
    fn new(query: &str, max_iterations: u32) -> Self {
        Self {
            run_id: Uuid::new_v4().to_string(),
            query: query.to_string(),
            state: LoopState::Planning,
            iteration: 0,
            max_iterations,
            history: Vec::new(),
            entities: EntityAccumulator::default(),
            last_decision: None,
            validation_errors: Vec::new(),
            final_response: String::new(),
            completed: false,
            completion_reason: None,
            eligible: Vec::new(),
        }
    }

    pub fn tools_called(&self) -> Vec<&str> {
        self.history.iter().map(|record| record.tool.as_str()).collect()
    }

    pub fn entities(&self) -> &D::Entities {
        self.entities.entities()
    }

    fn history_text(&self) -> String {
        if self.history.is_empty() {
            "None".to_string()
        } else {
            self.history.iter().map(ToolCallRecord::history_line).collect::<Vec<_>>().join("\n")
        }
    }

    fn entities_text(&self) -> String {
        match serde_json::to_value(&self.entities) {
            Ok(Value::Object(map)) if map.is_empty() => "None".to_string(),
            Ok(value) => {
                serde_json::to_string_pretty(&value).unwrap_or_else(|_| value.to_string())
            }
            Err(_) => "None".to_string(),
        }
    }

    fn errors_text(&self) -> String {
        if self.validation_errors.is_empty() {
            "None".to_string()
        } else {
            self.validation_errors.iter().map(|error| format!("- {error}")).collect::<Vec<_>>().join("\n")
        }
    }

    /// Best-effort answer when the responder cannot be reached.
    fn fallback_response(&self) -> String {
        let mut lines = vec!["Here is what happened with your request:".to_string()];
        if self.history.is_empty() {
            lines.push("- No operations were performed.".to_string());
        } else {
            lines.extend(self.history.iter().map(|record| format!("- {}", record.summary)));
        }
        if !self.validation_errors.is_empty() {
            lines.push("Errors:".to_string());
            lines.extend(self.validation_errors.iter().map(|error| format!("- {error}")));
        }
        if let Some(reason) = &self.completion_reason {
            lines.push(format!("Stopped because: {reason}"));
        }
        lines.join("\n")
    }
}

pub struct AgentLoop<D: AgentDomain> {
    domain: D,
    service: Arc<dyn DecisionService>,
    store: Arc<dyn RuleStore>,
    audit: Arc<dyn AuditSink>,
    settings: LoopSettings,
    engine: FlowEngine<AgentLoopFlow>,
}

impl<D: AgentDomain> AgentLoop<D> {
    pub fn new(
        domain: D,
        service: Arc<dyn DecisionService>,
        store: Arc<dyn RuleStore>,
        audit: Arc<dyn AuditSink>,
        settings: LoopSettings,
    ) -> Self {
        let engine = FlowEngine::new(AgentLoopFlow::new(domain.kind().flow_type()));
        Self { domain, service, store, audit, settings, engine }
    }

    pub fn domain(&self) -> &D {
        &self.domain
    }

    pub async fn run(&self, query: &str, parent: &AuditContext) -> RunState<D> {
        let kind = self.domain.kind();
        let audit = parent.for_domain(kind.label(), kind.actor());
        let mut run = RunState::<D>::new(query, self.settings.max_iterations);

        info!(
            event_name = "agent.loop.start",
            correlation_id = %audit.correlation_id,
            run_id = %run.run_id,
            domain = kind.label(),
            max_iterations = run.max_iterations,
            "starting domain loop"
        );

        loop {
            let event = match run.state {
                LoopState::Planning => self.plan(&mut run, &audit).await,
                LoopState::Executing => {
                    self.execute(&mut run, &audit).await;
                    LoopEvent::ToolExecuted
                }
                LoopState::Responding => {
                    self.respond(&mut run, &audit).await;
                    LoopEvent::ResponseProduced
                }
                LoopState::Terminal => break,
            };
            run.state = self.advance(run.state, event, &audit);
        }

        info!(
            event_name = "agent.loop.finished",
            correlation_id = %audit.correlation_id,
            run_id = %run.run_id,
            domain = kind.label(),
            iterations = run.iteration,
            tool_calls = run.history.len(),
            errors = run.validation_errors.len(),
            reason = run.completion_reason.as_deref().unwrap_or("none"),
            "domain loop finished"
        );
        run
    }

    fn advance(&self, current: LoopState, event: LoopEvent, audit: &AuditContext) -> LoopState {
        match self.engine.apply_with_audit(&current, &event, self.audit.as_ref(), audit) {
            Ok(outcome) => outcome.to,
            Err(error) => {
                warn!(
                    event_name = "agent.loop.invalid_transition",
                    correlation_id = %audit.correlation_id,
                    error = %error,
                    "invalid loop transition, winding the run down"
                );
                match current {
                    LoopState::Responding | LoopState::Terminal => LoopState::Terminal,
                    LoopState::Planning | LoopState::Executing => LoopState::Responding,
                }
            }
        }
    }

    fn force(
        &self,
        run: &mut RunState<D>,
        reasoning: impl Into<String>,
        audit: &AuditContext,
    ) -> LoopEvent {
        let reasoning = reasoning.into();
        info!(
            event_name = "agent.plan.forced",
            correlation_id = %audit.correlation_id,
            run_id = %run.run_id,
            iteration = run.iteration,
            reasoning = %reasoning,
            "forcing completion"
        );
        run.completed = true;
        run.completion_reason = Some(reasoning.clone());
        run.last_decision = Some(PlanningDecision::finish(reasoning));
        LoopEvent::CompletionForced
    }

    async fn plan(&self, run: &mut RunState<D>, audit: &AuditContext) -> LoopEvent {
        if run.iteration >= run.max_iterations {
            return self.force(run, CEILING_REACHED, audit);
        }
        run.iteration += 1;

        if let Some(reason) = run.entities.completion() {
            return self.force(run, reason, audit);
        }

        let eligible = match self.domain.eligible_tools(run.entities()) {
            Eligibility::Exhausted { reasoning } => return self.force(run, reasoning, audit),
            Eligibility::Tools(tools) if tools.is_empty() => {
                return self.force(run, NO_TOOLS_LEFT, audit)
            }
            Eligibility::Tools(tools) => tools,
        };

        let request = self.planning_request(run, &eligible);
        let reply = match self.service.infer(&request).await {
            Ok(reply) => reply,
            Err(error) => {
                warn!(
                    event_name = "agent.plan.service_failed",
                    correlation_id = %audit.correlation_id,
                    run_id = %run.run_id,
                    service = self.service.name(),
                    error = %error,
                    "decision service failed during planning"
                );
                let message = format!("Decision service unavailable: {error}");
                run.validation_errors.push(message.clone());
                return self.force(run, message, audit);
            }
        };

        let parsed = parse_or(&reply, PlanningDecision::finish(PARSE_FAILURE));
        if !parsed.ok {
            warn!(
                event_name = "agent.plan.parse_failed",
                correlation_id = %audit.correlation_id,
                run_id = %run.run_id,
                reply_len = reply.len(),
                "could not extract a planning decision"
            );
            return self.force(run, PARSE_FAILURE, audit);
        }

        let decision = parsed.value;
        info!(
            event_name = "agent.plan.decided",
            correlation_id = %audit.correlation_id,
            run_id = %run.run_id,
            iteration = run.iteration,
            next_action = ?decision.next_action,
            tool = decision.selected_tool.as_deref().unwrap_or("none"),
            completed = decision.completed,
            tier = ?parsed.tier,
            "planning decision parsed"
        );

        let event = if decision.wants_tool() {
            run.eligible = eligible;
            LoopEvent::ToolSelected
        } else {
            run.completed = true;
            run.completion_reason = Some(decision.reasoning.clone());
            LoopEvent::CompletionSignaled
        };
        run.last_decision = Some(decision);
        event
    }

    fn planning_request(&self, run: &RunState<D>, eligible: &[D::Tool]) -> InferenceRequest {
        let mut system = format!(
            "{}\n\nAvailable tools for this step:\n{}\n",
            self.domain.planner_brief(),
            render_tools(eligible)
        );
        if let Some(notes) = self.domain.planning_notes(run.entities()) {
            system.push_str(&format!("\n{notes}\n"));
        }
        if let Some(schema) = self.domain.parameter_schema() {
            system.push_str(&format!("\nParameter schema for conditions and actions:\n{schema}\n"));
        }
        system.push_str(&format!(
            "\nTools already called:\n{}\n\nEntities gathered so far:\n{}\n\n{}",
            run.history_text(),
            run.entities_text(),
            DECISION_FORMAT
        ));

        InferenceRequest::new(
            PLAN_PURPOSE,
            self.settings.model.clone(),
            self.settings.planning_temperature,
            system,
        )
        .with_user(format!("User Query: {}", run.query))
    }

    async fn execute(&self, run: &mut RunState<D>, audit: &AuditContext) {
        let decision = run.last_decision.clone().unwrap_or_else(|| PlanningDecision::finish(""));
        let call_id = CallId(run.history.len());
        let record = dispatch(
            &self.domain,
            self.store.as_ref(),
            call_id,
            decision.selected_tool.as_deref(),
            &decision.tool_parameters,
            &run.eligible,
        )
        .await;

        let outcome = match record.error() {
            Some(error) => {
                warn!(
                    event_name = "agent.tool.failed",
                    correlation_id = %audit.correlation_id,
                    run_id = %run.run_id,
                    tool = %record.tool,
                    error = %error,
                    "tool call failed"
                );
                run.validation_errors.push(error.to_string());
                AuditOutcome::Failed
            }
            None => {
                info!(
                    event_name = "agent.tool.executed",
                    correlation_id = %audit.correlation_id,
                    run_id = %run.run_id,
                    tool = %record.tool,
                    summary = %record.summary,
                    "tool call succeeded"
                );
                AuditOutcome::Success
            }
        };
        self.audit.emit(
            AuditEvent::new(audit, "tool.executed", AuditCategory::Tooling, outcome)
                .with_metadata("tool", record.tool.clone())
                .with_metadata("call_id", call_id.0.to_string())
                .with_metadata("summary", record.summary.clone()),
        );

        run.entities.merge(&record, &run.query);
        run.history.push(record);
    }

    async fn respond(&self, run: &mut RunState<D>, audit: &AuditContext) {
        let system = format!(
            "{}\n\nTools called:\n{}\n\nEntities:\n{}\n\nValidation errors:\n{}",
            self.domain.responder_brief(),
            run.history_text(),
            run.entities_text(),
            run.errors_text()
        );
        let request = InferenceRequest::new(
            RESPOND_PURPOSE,
            self.settings.model.clone(),
            self.settings.response_temperature,
            system,
        )
        .with_user(format!("User Query: {}", run.query));

        run.final_response = match self.service.infer(&request).await {
            Ok(reply) if !reply.trim().is_empty() => reply.trim().to_string(),
            Ok(_) => run.fallback_response(),
            Err(error) => {
                warn!(
                    event_name = "agent.respond.service_failed",
                    correlation_id = %audit.correlation_id,
                    run_id = %run.run_id,
                    error = %error,
                    "responder unavailable, using summary fallback"
                );
                run.fallback_response()
            }
        };
        self.audit.emit(
            AuditEvent::new(audit, "response.produced", AuditCategory::Response, AuditOutcome::Success)
                .with_metadata("chars", run.final_response.len().to_string()),
        );
    }
}

const DECISION_FORMAT: &str = "\
Respond ONLY with valid JSON:
{
    \"next_action\": \"call_tool|respond\",
    \"reasoning\": \"why this is the next step\",
    \"completed\": true/false,
    \"selected_tool\": \"tool name or null\",
    \"tool_parameters\": {\"param\": \"value\"},
    \"confidence\": 0.0-1.0
}";

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{NextAction, PlanningDecision};
    use crate::extract::{extract, parse_or, ExtractTier};

    #[test]
    fn decision_survives_serialize_then_parse() {
        let decision = PlanningDecision {
            next_action: NextAction::CallTool,
            reasoning: "resolve the rule name first".to_string(),
            completed: false,
            selected_tool: Some("list_automation_rules".to_string()),
            tool_parameters: json!({ "rule_id": "rule-002" }).as_object().cloned().unwrap_or_default(),
            confidence: Some(0.85),
        };

        let wire = serde_json::to_string(&decision).expect("serialize");
        let (parsed, tier) = extract::<PlanningDecision>(&wire).expect("parse");
        assert_eq!(parsed, decision);
        assert_eq!(tier, ExtractTier::Direct);
    }

    #[test]
    fn domain_specific_completion_flags_are_aliases() {
        let parsed = parse_or(
            "{\"next_action\": \"respond\", \"has_completed_update\": true}",
            PlanningDecision::finish("default"),
        );

        assert!(parsed.ok);
        assert!(parsed.value.completed);
        assert!(!parsed.value.wants_tool());
    }

    #[test]
    fn generic_and_domain_completion_flags_may_appear_together() {
        let parsed = parse_or(
            "{\"next_action\": \"call_tool\", \"selected_tool\": \"list_automation_rules\", \
             \"completed\": false, \"has_completed_update\": false}",
            PlanningDecision::finish("default"),
        );
        assert!(parsed.ok);
        assert!(parsed.value.wants_tool());
        assert_eq!(parsed.value.selected_tool.as_deref(), Some("list_automation_rules"));

        let parsed = parse_or(
            "{\"next_action\": \"call_tool\", \"completed\": false, \"has_sufficient_data\": true}",
            PlanningDecision::finish("default"),
        );
        assert!(parsed.ok);
        assert!(parsed.value.completed);
        assert!(!parsed.value.wants_tool());
    }

    #[test]
    fn loose_model_output_is_normalized() {
        let raw = "```json\n{\"next_action\": \"CALL_TOOL\", \"selected_tool\": \"get_automation_rule\", \
                   \"tool_parameters\": null, \"has_sufficient_data\": \"false\", \"confidence\": \"1.7\"}\n```";

        let parsed = parse_or(raw, PlanningDecision::finish("default"));
        assert!(parsed.ok);
        assert_eq!(parsed.value.next_action, NextAction::CallTool);
        assert!(parsed.value.tool_parameters.is_empty());
        assert_eq!(parsed.value.confidence, Some(1.0));
        assert!(parsed.value.wants_tool());
    }

    #[test]
    fn unknown_next_action_means_respond() {
        let parsed = parse_or("{\"next_action\": \"confirm\"}", PlanningDecision::finish("default"));

        assert_eq!(parsed.value.next_action, NextAction::Respond);
        assert_eq!(
            serde_json::to_value(NextAction::CallTool).expect("serialize"),
            json!("call_tool")
        );
    }
}
