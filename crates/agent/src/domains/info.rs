use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use serde::Serialize;

use emsbot_core::domain::action::Action;
use emsbot_core::domain::condition::Condition;
use emsbot_core::domain::rule::{AutomationRule, RuleId};
use emsbot_core::domain::Parameters;
use emsbot_db::RuleStore;

use super::{Accumulator, AgentDomain, DomainKind, Eligibility};
use crate::tools::{ParamKind, ParamSpec, ToolArgs, ToolContract, ToolError, ToolId};

const RULE_ID: ParamSpec = ParamSpec::required("rule_id", ParamKind::String, "ID of the rule");

const LIST_RULES: ToolContract = ToolContract {
    name: "list_automation_rules",
    description: "Lists every automation rule in the system. It returns all rules at once.",
    parameters: &[],
    example: "list_automation_rules()",
};

const GET_RULE: ToolContract = ToolContract {
    name: "get_automation_rule",
    description: "Gets the details of one automation rule by ID.",
    parameters: &[RULE_ID],
    example: "get_automation_rule(rule_id=\"rule-001\")",
};

const LIST_CONDITIONS: ToolContract = ToolContract {
    name: "list_conditions_for_rule",
    description: "Lists the conditions attached to one rule.",
    parameters: &[RULE_ID],
    example: "list_conditions_for_rule(rule_id=\"rule-001\")",
};

const LIST_ACTIONS: ToolContract = ToolContract {
    name: "list_actions_for_rule",
    description: "Lists the actions attached to one rule.",
    parameters: &[RULE_ID],
    example: "list_actions_for_rule(rule_id=\"rule-001\")",
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InfoTool {
    ListRules,
    GetRule,
    ListConditions,
    ListActions,
}

impl ToolId for InfoTool {
    const ALL: &'static [Self] =
        &[Self::ListRules, Self::GetRule, Self::ListConditions, Self::ListActions];

    fn contract(self) -> &'static ToolContract {
        match self {
            Self::ListRules => &LIST_RULES,
            Self::GetRule => &GET_RULE,
            Self::ListConditions => &LIST_CONDITIONS,
            Self::ListActions => &LIST_ACTIONS,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InfoCall {
    ListRules,
    GetRule(RuleId),
    ListConditions(RuleId),
    ListActions(RuleId),
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum InfoOutcome {
    Listed(Vec<AutomationRule>),
    Rule(AutomationRule),
    Conditions { rule_id: RuleId, conditions: Vec<Condition> },
    Actions { rule_id: RuleId, actions: Vec<Action> },
}

impl InfoOutcome {
    fn item_count(&self) -> usize {
        match self {
            Self::Listed(rules) => rules.len(),
            Self::Rule(_) => 1,
            Self::Conditions { conditions, .. } => conditions.len(),
            Self::Actions { actions, .. } => actions.len(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct InfoEntities {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub all_rules: Option<Vec<AutomationRule>>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub rules: BTreeMap<RuleId, AutomationRule>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub conditions: BTreeMap<RuleId, Vec<Condition>>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub actions: BTreeMap<RuleId, Vec<Action>>,
}

impl InfoEntities {
    pub fn listed_rule_ids(&self) -> Vec<&RuleId> {
        self.all_rules.iter().flatten().map(|rule| &rule.id).collect()
    }

    pub fn known_rule_ids(&self) -> BTreeSet<&RuleId> {
        self.listed_rule_ids()
            .into_iter()
            .chain(self.rules.keys())
            .chain(self.conditions.keys())
            .chain(self.actions.keys())
            .collect()
    }
}

impl Accumulator for InfoEntities {
    type Outcome = InfoOutcome;

    fn absorb(&mut self, outcome: &InfoOutcome, _query: &str) {
        match outcome {
            InfoOutcome::Listed(rules) => {
                self.all_rules.get_or_insert_with(|| rules.clone());
            }
            InfoOutcome::Rule(rule) => {
                self.rules.insert(rule.id.clone(), rule.clone());
            }
            InfoOutcome::Conditions { rule_id, conditions } => {
                self.conditions.insert(rule_id.clone(), conditions.clone());
            }
            InfoOutcome::Actions { rule_id, actions } => {
                self.actions.insert(rule_id.clone(), actions.clone());
            }
        }
    }

    /// Read-only runs finish when the planner says so.
    fn completion(&self) -> Option<&'static str> {
        None
    }
}

const PLANNER_BRIEF: &str = "\
You are the information retrieval planner for an RF spectrum automation system.
Work out what the user is asking for, review what has been gathered, then either
pick the next tool with its parameters or finish.

Typical sequences:
- Rule by ID: get_automation_rule, optionally list_conditions_for_rule and list_actions_for_rule.
- Rule by name: list_automation_rules to find the ID, then get_automation_rule.
- All rules: list_automation_rules, then respond.
- Rules by condition type, signal type or frequency: list_automation_rules, then
  list_conditions_for_rule for each rule ID, one at a time.
- Rules by action type: list_automation_rules, then list_actions_for_rule for each rule ID.
- Everything about a rule: get_automation_rule, list_conditions_for_rule, list_actions_for_rule.

Rules:
- list_automation_rules returns every rule; never call it twice.
- Handle one rule ID per call.
- Respond once the gathered data answers the question.";

const RESPONDER_BRIEF: &str = "\
You are the response writer for an RF spectrum automation system.
The user asked for information and the data below has been gathered.
Answer the question directly, organize the data so it is easy to read, use bullet
points where they help, and keep a friendly tone. Do not mention tool names or
implementation details.";

fn id_list(ids: &[&RuleId]) -> String {
    ids.iter().map(|id| id.as_str()).collect::<Vec<_>>().join(", ")
}

#[derive(Clone, Copy, Debug, Default)]
pub struct InfoDomain;

#[async_trait]
impl AgentDomain for InfoDomain {
    type Tool = InfoTool;
    type Call = InfoCall;
    type Outcome = InfoOutcome;
    type Entities = InfoEntities;

    fn kind(&self) -> DomainKind {
        DomainKind::Info
    }

    fn planner_brief(&self) -> &'static str {
        PLANNER_BRIEF
    }

    fn parameter_schema(&self) -> Option<&'static str> {
        None
    }

    fn responder_brief(&self) -> &'static str {
        RESPONDER_BRIEF
    }

    fn eligible_tools(&self, entities: &InfoEntities) -> Eligibility<InfoTool> {
        if entities.all_rules.is_some() || !entities.known_rule_ids().is_empty() {
            Eligibility::Tools(vec![InfoTool::GetRule, InfoTool::ListConditions, InfoTool::ListActions])
        } else {
            Eligibility::Tools(InfoTool::ALL.to_vec())
        }
    }

    fn planning_notes(&self, entities: &InfoEntities) -> Option<String> {
        let listed = entities.listed_rule_ids();
        if listed.is_empty() {
            return Some(
                "Rule IDs retrieved: none yet. Call list_automation_rules first when the \
                 question spans several rules."
                    .to_string(),
            );
        }

        let with_conditions: Vec<&RuleId> = entities.conditions.keys().collect();
        let with_actions: Vec<&RuleId> = entities.actions.keys().collect();
        let pending_conditions: Vec<&RuleId> =
            listed.iter().copied().filter(|id| !entities.conditions.contains_key(*id)).collect();
        let pending_actions: Vec<&RuleId> =
            listed.iter().copied().filter(|id| !entities.actions.contains_key(*id)).collect();

        let or_none = |ids: &[&RuleId]| if ids.is_empty() { "none".to_string() } else { id_list(ids) };
        Some(format!(
            "Rule IDs retrieved: {}\n\
             Conditions already fetched for: {}\n\
             Conditions still pending for: {}\n\
             Actions already fetched for: {}\n\
             Actions still pending for: {}",
            id_list(&listed),
            or_none(&with_conditions),
            or_none(&pending_conditions),
            or_none(&with_actions),
            or_none(&pending_actions),
        ))
    }

    fn prepare(&self, tool: InfoTool, params: &Parameters) -> Result<InfoCall, ToolError> {
        let args = ToolArgs::new(tool.contract(), params);
        let rule_id = || args.required_text("rule_id").map(RuleId);
        Ok(match tool {
            InfoTool::ListRules => InfoCall::ListRules,
            InfoTool::GetRule => InfoCall::GetRule(rule_id()?),
            InfoTool::ListConditions => InfoCall::ListConditions(rule_id()?),
            InfoTool::ListActions => InfoCall::ListActions(rule_id()?),
        })
    }

    async fn execute(
        &self,
        store: &dyn RuleStore,
        call: InfoCall,
    ) -> Result<InfoOutcome, ToolError> {
        Ok(match call {
            InfoCall::ListRules => InfoOutcome::Listed(store.list_rules().await?),
            InfoCall::GetRule(id) => InfoOutcome::Rule(store.get_rule(&id).await?),
            InfoCall::ListConditions(rule_id) => {
                let conditions = store.list_conditions(&rule_id).await?;
                InfoOutcome::Conditions { rule_id, conditions }
            }
            InfoCall::ListActions(rule_id) => {
                let actions = store.list_actions(&rule_id).await?;
                InfoOutcome::Actions { rule_id, actions }
            }
        })
    }

    fn summarize(&self, outcome: &InfoOutcome) -> String {
        format!("Retrieved {} item(s)", outcome.item_count())
    }
}
