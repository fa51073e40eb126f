use async_trait::async_trait;
use serde::Serialize;

use emsbot_core::domain::action::{ActionId, ActionPatch, ActionUpdate};
use emsbot_core::domain::condition::{ConditionId, ConditionPatch, ConditionUpdate};
use emsbot_core::domain::rule::{ActivationReceipt, ActivationStatus, AutomationRule, RuleId};
use emsbot_core::domain::Parameters;
use emsbot_db::RuleStore;

use super::{Accumulator, AgentDomain, DomainKind, Eligibility};
use crate::knowledge::UPDATE_PARAMETER_SCHEMA;
use crate::tools::{ParamKind, ParamSpec, ToolArgs, ToolContract, ToolError, ToolId};

const LIST_RULES: ToolContract = ToolContract {
    name: "list_automation_rules",
    description: "Lists all automation rules. Call this first whenever the user refers to a rule \
                  by name instead of by ID.",
    parameters: &[],
    example: "list_automation_rules()",
};

const ACTIVATE_RULE: ToolContract = ToolContract {
    name: "activate_automation_rule",
    description: "Enables an existing rule so it starts monitoring. It never creates rules.",
    parameters: &[ParamSpec::required("rule_id", ParamKind::String, "ID of the rule to activate")],
    example: "activate_automation_rule(rule_id=\"rule-001\")",
};

const DEACTIVATE_RULE: ToolContract = ToolContract {
    name: "deactivate_automation_rule",
    description: "Disables an existing rule so it stops monitoring. It never deletes rules; the \
                  configuration is kept.",
    parameters: &[ParamSpec::required("rule_id", ParamKind::String, "ID of the rule to deactivate")],
    example: "deactivate_automation_rule(rule_id=\"rule-001\")",
};

const UPDATE_CONDITION: ToolContract = ToolContract {
    name: "update_condition",
    description: "Changes an existing condition of a rule: frequency range, signal type or \
                  threshold. Only rule_id is required.",
    parameters: &[
        ParamSpec::required("rule_id", ParamKind::String, "ID of the rule owning the condition"),
        ParamSpec::optional(
            "condition_id",
            ParamKind::String,
            "condition to change; the rule's first condition when omitted",
        ),
        ParamSpec::optional(
            "condition_type",
            ParamKind::String,
            "signalDetection or spectralEnergy, only when the type changes",
        ),
        ParamSpec::optional(
            "parameters",
            ParamKind::Object,
            "condition fields to change, see the parameter schema; partial updates are fine",
        ),
        ParamSpec::optional("description", ParamKind::String, "new human readable description"),
    ],
    example: "update_condition(rule_id=\"rule-001\", parameters={\"minFrequencyMHz\": 3500, \
              \"maxFrequencyMHz\": 3700})",
};

const UPDATE_ACTION: ToolContract = ToolContract {
    name: "update_action",
    description: "Changes an existing action of a rule: message, sensor IDs or algorithm. Only \
                  rule_id is required.",
    parameters: &[
        ParamSpec::required("rule_id", ParamKind::String, "ID of the rule owning the action"),
        ParamSpec::optional(
            "action_id",
            ParamKind::String,
            "action to change; the rule's first action when omitted",
        ),
        ParamSpec::optional(
            "action_type",
            ParamKind::String,
            "frequencyScanRequest, geolocationRequest or userNotification, only when the type changes",
        ),
        ParamSpec::optional(
            "parameters",
            ParamKind::Object,
            "action fields to change, see the parameter schema; partial updates are fine",
        ),
        ParamSpec::optional("description", ParamKind::String, "new human readable description"),
    ],
    example: "update_action(rule_id=\"rule-001\", parameters={\"message\": \"Updated alert message!\"})",
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpdateTool {
    ListRules,
    ActivateRule,
    DeactivateRule,
    UpdateCondition,
    UpdateAction,
}

impl ToolId for UpdateTool {
    const ALL: &'static [Self] = &[
        Self::ListRules,
        Self::ActivateRule,
        Self::DeactivateRule,
        Self::UpdateCondition,
        Self::UpdateAction,
    ];

    fn contract(self) -> &'static ToolContract {
        match self {
            Self::ListRules => &LIST_RULES,
            Self::ActivateRule => &ACTIVATE_RULE,
            Self::DeactivateRule => &DEACTIVATE_RULE,
            Self::UpdateCondition => &UPDATE_CONDITION,
            Self::UpdateAction => &UPDATE_ACTION,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum UpdateCall {
    ListRules,
    SetEnabled { rule_id: RuleId, enabled: bool },
    UpdateCondition { rule_id: RuleId, condition_id: Option<ConditionId>, patch: ConditionPatch },
    UpdateAction { rule_id: RuleId, action_id: Option<ActionId>, patch: ActionPatch },
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum UpdateOutcome {
    Listed(Vec<AutomationRule>),
    Activation(ActivationReceipt),
    ConditionUpdated(ConditionUpdate),
    ActionUpdated(ActionUpdate),
}

impl UpdateOutcome {
    fn rule_ref(&self) -> Option<(&RuleId, Option<&str>)> {
        match self {
            Self::Listed(_) => None,
            Self::Activation(receipt) => Some((&receipt.rule_id, Some(receipt.rule_name.as_str()))),
            Self::ConditionUpdated(update) => Some((&update.rule_id, None)),
            Self::ActionUpdated(update) => Some((&update.rule_id, None)),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct UpdateEntities {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retrieved_rules: Option<Vec<AutomationRule>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_rule_id: Option<RuleId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_rule_name: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub activations: Vec<ActivationReceipt>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub deactivations: Vec<ActivationReceipt>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<ConditionUpdate>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<ActionUpdate>,
}

impl UpdateEntities {
    pub fn mutation_count(&self) -> usize {
        self.activations.len() + self.deactivations.len() + self.conditions.len() + self.actions.len()
    }

    fn remember_target(&mut self, id: &RuleId, name: Option<&str>) {
        if self.target_rule_id.is_none() {
            self.target_rule_id = Some(id.clone());
            self.target_rule_name = name.map(str::to_string);
        }
    }
}

impl Accumulator for UpdateEntities {
    type Outcome = UpdateOutcome;

    fn absorb(&mut self, outcome: &UpdateOutcome, query: &str) {
        if let Some((id, name)) = outcome.rule_ref() {
            self.remember_target(id, name);
        }

        match outcome {
            UpdateOutcome::Listed(rules) => {
                if self.target_rule_id.is_none() {
                    if let Some(rule) = rules.iter().find(|rule| rule.is_named_in(query)) {
                        self.remember_target(&rule.id, Some(&rule.name));
                    }
                }
                self.retrieved_rules.get_or_insert_with(|| rules.clone());
            }
            UpdateOutcome::Activation(receipt) if receipt.is_enabled => {
                self.activations.push(receipt.clone());
            }
            UpdateOutcome::Activation(receipt) => self.deactivations.push(receipt.clone()),
            UpdateOutcome::ConditionUpdated(update) => self.conditions.push(update.clone()),
            UpdateOutcome::ActionUpdated(update) => self.actions.push(update.clone()),
        }
    }

    fn completion(&self) -> Option<&'static str> {
        (self.mutation_count() > 0).then_some("Updates are complete")
    }
}

const UNRESOLVED_TARGET: &str = "Unable to find the rule to update the information.";

const PLANNER_BRIEF: &str = "\
You are the update planner for an RF spectrum automation system.
Work out what the user wants changed (activate a rule, deactivate a rule, change a
condition or change an action), review what has been done, then either pick the next
tool with parameters taken from the query or finish.

Rules:
- When the rule is referenced by NAME, call list_automation_rules first to find its ID.
- Activation and deactivation use activate_automation_rule / deactivate_automation_rule.
  Activation never creates rules and deactivation never deletes them.
- Condition and action changes use update_condition / update_action with the rule_id.
- Respond once the update is done or when more information is needed from the user.";

const RESPONDER_BRIEF: &str = "\
You are the response writer for an RF spectrum automation system.
The user asked for an update and the operations below were executed.
Confirm what changed with rule names and IDs, list any errors, suggest next steps when
useful, and keep a friendly tone. For deactivation mention that the rule's configuration
is preserved. For condition or action changes name the type and the new values.
Do not mention tool names. Reply in plain text, not JSON.";

#[derive(Clone, Copy, Debug, Default)]
pub struct UpdateDomain;

#[async_trait]
impl AgentDomain for UpdateDomain {
    type Tool = UpdateTool;
    type Call = UpdateCall;
    type Outcome = UpdateOutcome;
    type Entities = UpdateEntities;

    fn kind(&self) -> DomainKind {
        DomainKind::Update
    }

    fn planner_brief(&self) -> &'static str {
        PLANNER_BRIEF
    }

    fn parameter_schema(&self) -> Option<&'static str> {
        Some(UPDATE_PARAMETER_SCHEMA)
    }

    fn responder_brief(&self) -> &'static str {
        RESPONDER_BRIEF
    }

    fn eligible_tools(&self, entities: &UpdateEntities) -> Eligibility<UpdateTool> {
        match (&entities.retrieved_rules, &entities.target_rule_id) {
            (Some(_), None) => Eligibility::Exhausted { reasoning: UNRESOLVED_TARGET },
            (_, Some(_)) => Eligibility::Tools(
                UpdateTool::ALL.iter().copied().filter(|tool| *tool != UpdateTool::ListRules).collect(),
            ),
            (None, None) => Eligibility::Tools(UpdateTool::ALL.to_vec()),
        }
    }

    fn planning_notes(&self, entities: &UpdateEntities) -> Option<String> {
        Some(match &entities.target_rule_id {
            Some(id) => format!(
                "Target rule: {} (ID: {id}). Select activate_automation_rule, \
                 deactivate_automation_rule, update_condition or update_action with this \
                 rule_id, or respond when done.",
                entities.target_rule_name.as_deref().map_or("unnamed".to_string(), |name| format!("'{name}'")),
            ),
            None => "If the query does not give a rule ID, call list_automation_rules to find it."
                .to_string(),
        })
    }

    fn prepare(&self, tool: UpdateTool, params: &Parameters) -> Result<UpdateCall, ToolError> {
        let args = ToolArgs::new(tool.contract(), params);
        let rule_id = || args.required_text("rule_id").map(RuleId);

        Ok(match tool {
            UpdateTool::ListRules => UpdateCall::ListRules,
            UpdateTool::ActivateRule => UpdateCall::SetEnabled { rule_id: rule_id()?, enabled: true },
            UpdateTool::DeactivateRule => {
                UpdateCall::SetEnabled { rule_id: rule_id()?, enabled: false }
            }
            UpdateTool::UpdateCondition => UpdateCall::UpdateCondition {
                rule_id: rule_id()?,
                condition_id: args.text("condition_id")?.map(ConditionId),
                patch: ConditionPatch::from_parameters(
                    args.text("condition_type")?.as_deref(),
                    &args.object("parameters")?,
                    args.text("description")?,
                )?,
            },
            UpdateTool::UpdateAction => UpdateCall::UpdateAction {
                rule_id: rule_id()?,
                action_id: args.text("action_id")?.map(ActionId),
                patch: ActionPatch::from_parameters(
                    args.text("action_type")?.as_deref(),
                    &args.object("parameters")?,
                    args.text("description")?,
                )?,
            },
        })
    }

    async fn execute(
        &self,
        store: &dyn RuleStore,
        call: UpdateCall,
    ) -> Result<UpdateOutcome, ToolError> {
        Ok(match call {
            UpdateCall::ListRules => UpdateOutcome::Listed(store.list_rules().await?),
            UpdateCall::SetEnabled { rule_id, enabled } => {
                UpdateOutcome::Activation(store.set_rule_enabled(&rule_id, enabled).await?)
            }
            UpdateCall::UpdateCondition { rule_id, condition_id, patch } => {
                UpdateOutcome::ConditionUpdated(
                    store.update_condition(&rule_id, condition_id.as_ref(), patch).await?,
                )
            }
            UpdateCall::UpdateAction { rule_id, action_id, patch } => UpdateOutcome::ActionUpdated(
                store.update_action(&rule_id, action_id.as_ref(), patch).await?,
            ),
        })
    }

    fn summarize(&self, outcome: &UpdateOutcome) -> String {
        match outcome {
            UpdateOutcome::Listed(rules) => format!("Retrieved {} rules", rules.len()),
            UpdateOutcome::Activation(receipt) => {
                let ActivationReceipt { rule_id, rule_name, .. } = receipt;
                match receipt.status {
                    ActivationStatus::Activated => {
                        format!("Activated rule '{rule_name}' (ID: {rule_id})")
                    }
                    ActivationStatus::Deactivated => {
                        format!("Deactivated rule '{rule_name}' (ID: {rule_id})")
                    }
                    ActivationStatus::AlreadyActive => {
                        format!("Rule '{rule_name}' (ID: {rule_id}) was already active")
                    }
                    ActivationStatus::AlreadyInactive => {
                        format!("Rule '{rule_name}' (ID: {rule_id}) was already inactive")
                    }
                }
            }
            UpdateOutcome::ConditionUpdated(update) => changed_fields(
                format!(
                    "Updated {} condition (ID: {})",
                    update.condition.spec.condition_type().label(),
                    update.condition_id
                ),
                &update.updates_made,
            ),
            UpdateOutcome::ActionUpdated(update) => changed_fields(
                format!(
                    "Updated {} action (ID: {})",
                    update.action.spec.action_type().label(),
                    update.action_id
                ),
                &update.updates_made,
            ),
        }
    }
}

fn changed_fields(head: String, fields: &[String]) -> String {
    if fields.is_empty() {
        format!("{head}: no changes were made")
    } else {
        format!("{head}: {}", fields.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use emsbot_core::domain::rule::RuleId;
    use emsbot_core::domain::Parameters;
    use emsbot_db::InMemoryRuleStore;

    use super::{UpdateCall, UpdateDomain, UpdateEntities, UpdateTool};
    use crate::domains::{Accumulator, AgentDomain, Eligibility};
    use crate::tools::{ToolError, ToolId};

    fn params(value: serde_json::Value) -> Parameters {
        value.as_object().cloned().unwrap_or_default()
    }

    const QUERY: &str = "Disable the rule named Energy Threshold Alert";

    #[tokio::test]
    async fn listing_resolves_named_target_and_drops_listing() {
        let store = InMemoryRuleStore::seeded();
        let domain = UpdateDomain;
        let mut entities = UpdateEntities::default();

        let listed = domain.execute(&store, UpdateCall::ListRules).await.expect("list");
        assert_eq!(domain.summarize(&listed), "Retrieved 3 rules");
        entities.absorb(&listed, QUERY);

        assert_eq!(entities.target_rule_id, Some(RuleId("rule-003".to_string())));
        assert_eq!(entities.target_rule_name.as_deref(), Some("Energy Threshold Alert"));
        match domain.eligible_tools(&entities) {
            Eligibility::Tools(tools) => {
                assert_eq!(tools.len(), UpdateTool::ALL.len() - 1);
                assert!(!tools.contains(&UpdateTool::ListRules));
            }
            Eligibility::Exhausted { reasoning } => panic!("unexpected exhaustion: {reasoning}"),
        }
        assert!(entities.completion().is_none());
    }

    #[tokio::test]
    async fn unmatched_name_exhausts_the_tool_set() {
        let store = InMemoryRuleStore::seeded();
        let domain = UpdateDomain;
        let mut entities = UpdateEntities::default();

        let listed = domain.execute(&store, UpdateCall::ListRules).await.expect("list");
        entities.absorb(&listed, "Disable the Wideband Sweep rule");

        assert_eq!(
            domain.eligible_tools(&entities),
            Eligibility::Exhausted { reasoning: "Unable to find the rule to update the information." }
        );
    }

    #[tokio::test]
    async fn deactivation_completes_the_run() {
        let store = InMemoryRuleStore::seeded();
        let domain = UpdateDomain;
        let mut entities = UpdateEntities::default();

        let call = domain
            .prepare(UpdateTool::DeactivateRule, &params(json!({ "rule_id": "rule-001" })))
            .expect("prepare");
        let receipt = domain.execute(&store, call).await.expect("deactivate");
        assert_eq!(domain.summarize(&receipt), "Deactivated rule '5G Monitor' (ID: rule-001)");

        entities.absorb(&receipt, "turn off rule-001");
        assert_eq!(entities.deactivations.len(), 1);
        assert!(entities.activations.is_empty());
        assert_eq!(entities.completion(), Some("Updates are complete"));
        assert_eq!(entities.target_rule_id, Some(RuleId("rule-001".to_string())));
    }

    #[tokio::test]
    async fn condition_update_summary_lists_changed_fields() {
        let store = InMemoryRuleStore::seeded();
        let domain = UpdateDomain;

        let call = domain
            .prepare(
                UpdateTool::UpdateCondition,
                &params(json!({
                    "rule_id": "rule-002",
                    "parameters": { "minFrequencyMHz": 1700, "maxFrequencyMHz": 2200 }
                })),
            )
            .expect("prepare");
        let outcome = domain.execute(&store, call).await.expect("update");

        let summary = domain.summarize(&outcome);
        assert!(summary.starts_with("Updated signalDetection condition (ID: cond-002): "));
        assert!(summary.contains("minFrequencyMHz"));
    }

    #[test]
    fn out_of_range_frequency_is_rejected_while_preparing() {
        let error = UpdateDomain
            .prepare(
                UpdateTool::UpdateCondition,
                &params(json!({ "rule_id": "rule-002", "parameters": { "maxFrequencyMHz": 9000 } })),
            )
            .expect_err("out of range");

        assert!(matches!(error, ToolError::Domain(_)));
        assert!(error.to_string().starts_with("Frequency out of range"));
    }

    #[test]
    fn activation_requires_rule_id() {
        let error = UpdateDomain
            .prepare(UpdateTool::ActivateRule, &Parameters::new())
            .expect_err("missing id");

        assert!(matches!(
            error,
            ToolError::MissingParameter { tool: "activate_automation_rule", parameter: "rule_id" }
        ));
    }
}
