use async_trait::async_trait;
use serde::Serialize;

use emsbot_core::domain::action::{Action, ActionId, ActionSpec, NewAction};
use emsbot_core::domain::condition::{Condition, ConditionId, ConditionSpec, NewCondition};
use emsbot_core::domain::rule::{AutomationRule, CreatedRule, NewRule, RuleDraft, RuleId};
use emsbot_core::domain::Parameters;
use emsbot_db::RuleStore;

use super::{Accumulator, AgentDomain, DomainKind, Eligibility};
use crate::knowledge::CREATE_PARAMETER_SCHEMA;
use crate::tools::{ParamKind, ParamSpec, ToolArgs, ToolContract, ToolError, ToolId};

macro_rules! rule_fields {
    ($($extra:expr),* $(,)?) => {
        &[
            ParamSpec::required("name", ParamKind::String, "human readable name for the rule"),
            ParamSpec::optional("description", ParamKind::String, "what the rule is about"),
            ParamSpec::optional("is_enabled", ParamKind::Boolean, "whether the rule is active, default false"),
            ParamSpec::optional("max_executions", ParamKind::Integer, "limit on rule triggers"),
            ParamSpec::optional("start_time", ParamKind::String, "ISO datetime"),
            ParamSpec::optional("end_time", ParamKind::String, "ISO datetime"),
            $($extra,)*
        ]
    };
}

const CONDITION_TYPE: ParamSpec =
    ParamSpec::required("condition_type", ParamKind::String, "'signalDetection' or 'spectralEnergy'");
const CONDITION_PARAMETERS: ParamSpec = ParamSpec::required(
    "condition_parameters",
    ParamKind::Object,
    "condition fields for the type; minFrequencyMHz/maxFrequencyMHz default to 10-6000",
);
const CONDITION_DESCRIPTION: ParamSpec =
    ParamSpec::optional("condition_description", ParamKind::String, "description of the condition");
const ACTION_TYPE: ParamSpec = ParamSpec::required(
    "action_type",
    ParamKind::String,
    "'frequencyScanRequest', 'geolocationRequest' or 'userNotification'",
);
const ACTION_PARAMETERS: ParamSpec =
    ParamSpec::required("action_parameters", ParamKind::Object, "action fields for the type");
const ACTION_DESCRIPTION: ParamSpec =
    ParamSpec::optional("action_description", ParamKind::String, "description of the action");

const LIST_RULES: ToolContract = ToolContract {
    name: "list_automation_rules",
    description: "Lists all automation rules, for example to check whether a similar rule exists.",
    parameters: &[],
    example: "list_automation_rules()",
};

const CREATE_RULE: ToolContract = ToolContract {
    name: "create_automation_rule",
    description: "Creates a bare rule with no condition or action. Use only when the query has \
                  neither condition nor action details. Rules start disabled.",
    parameters: rule_fields!(),
    example: "create_automation_rule(name=\"5G Alert\", description=\"Monitor 5G signals\", \
              is_enabled=false)",
};

const CREATE_RULE_CONDITION: ToolContract = ToolContract {
    name: "create_rule_condition",
    description: "Creates a rule together with one condition. Use when the query gives condition \
                  details (signal type, threshold or frequency range) but no action.",
    parameters: rule_fields!(CONDITION_TYPE, CONDITION_PARAMETERS, CONDITION_DESCRIPTION),
    example: "create_rule_condition(name=\"5G Monitor\", condition_type=\"signalDetection\", \
              condition_parameters={\"minFrequencyMHz\": 3400, \"maxFrequencyMHz\": 3600, \
              \"signalType\": \"5G\"})",
};

const CREATE_RULE_ACTION: ToolContract = ToolContract {
    name: "create_rule_action",
    description: "Creates a rule together with one action. Use when the query gives action \
                  details (message, sensor IDs or algorithm) but no condition.",
    parameters: rule_fields!(ACTION_TYPE, ACTION_PARAMETERS, ACTION_DESCRIPTION),
    example: "create_rule_action(name=\"Alert Rule\", action_type=\"userNotification\", \
              action_parameters={\"message\": \"Signal detected!\"})",
};

const CREATE_RULE_CONDITION_ACTION: ToolContract = ToolContract {
    name: "create_rule_condition_action",
    description: "Creates a rule with both a condition and an action in one call. This is the \
                  most complete creation tool and is preferred whenever both are described.",
    parameters: rule_fields!(
        CONDITION_TYPE,
        CONDITION_PARAMETERS,
        CONDITION_DESCRIPTION,
        ACTION_TYPE,
        ACTION_PARAMETERS,
        ACTION_DESCRIPTION,
    ),
    example: "create_rule_condition_action(name=\"5G Monitor with Alert\", \
              condition_type=\"signalDetection\", condition_parameters={\"signalType\": \"5G\"}, \
              action_type=\"userNotification\", action_parameters={\"message\": \"5G detected!\"})",
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CreateTool {
    ListRules,
    CreateRule,
    CreateRuleCondition,
    CreateRuleAction,
    CreateRuleConditionAction,
}

impl CreateTool {
    fn with_condition(self) -> bool {
        matches!(self, Self::CreateRuleCondition | Self::CreateRuleConditionAction)
    }

    fn with_action(self) -> bool {
        matches!(self, Self::CreateRuleAction | Self::CreateRuleConditionAction)
    }
}

impl ToolId for CreateTool {
    const ALL: &'static [Self] = &[
        Self::ListRules,
        Self::CreateRule,
        Self::CreateRuleCondition,
        Self::CreateRuleAction,
        Self::CreateRuleConditionAction,
    ];

    fn contract(self) -> &'static ToolContract {
        match self {
            Self::ListRules => &LIST_RULES,
            Self::CreateRule => &CREATE_RULE,
            Self::CreateRuleCondition => &CREATE_RULE_CONDITION,
            Self::CreateRuleAction => &CREATE_RULE_ACTION,
            Self::CreateRuleConditionAction => &CREATE_RULE_CONDITION_ACTION,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum CreateCall {
    ListRules,
    Create(NewRule),
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CreateOutcome {
    Listed(Vec<AutomationRule>),
    Created(CreatedRule),
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct CreateEntities {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub rules: Vec<AutomationRule>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<Action>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_rule_id: Option<RuleId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_condition_id: Option<ConditionId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_action_id: Option<ActionId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retrieved_rules: Option<Vec<AutomationRule>>,
}

impl Accumulator for CreateEntities {
    type Outcome = CreateOutcome;

    fn absorb(&mut self, outcome: &CreateOutcome, _query: &str) {
        match outcome {
            CreateOutcome::Listed(rules) => {
                self.retrieved_rules.get_or_insert_with(|| rules.clone());
            }
            CreateOutcome::Created(created) => {
                self.last_rule_id = Some(created.rule.id.clone());
                self.rules.push(created.rule.clone());
                if let Some(condition) = &created.condition {
                    self.last_condition_id = Some(condition.id.clone());
                    self.conditions.push(condition.clone());
                }
                if let Some(action) = &created.action {
                    self.last_action_id = Some(action.id.clone());
                    self.actions.push(action.clone());
                }
            }
        }
    }

    /// One creation per query: any created rule ends the run.
    fn completion(&self) -> Option<&'static str> {
        if self.rules.is_empty() {
            None
        } else if !self.conditions.is_empty() || !self.actions.is_empty() {
            Some("Rule with condition or action has been created successfully")
        } else {
            Some("Rule created. No sufficient information for conditions or actions.")
        }
    }
}

const PLANNER_BRIEF: &str = "\
You are the creation planner for an RF spectrum automation system.
Read the query, extract every relevant parameter and select the most complete tool the
information supports.

Tool priority:
1. create_rule_condition_action when the query describes a condition (signal type,
   threshold or frequency range) AND an action (message, sensor IDs or algorithm).
2. create_rule_condition when it describes a condition but no action.
3. create_rule_action when it describes an action but no condition.
4. create_automation_rule only when it describes neither.
5. list_automation_rules when the query refers to an existing rule by name.

Rules:
- Create rules with is_enabled=false unless the user explicitly asks otherwise.
- The frequency range is optional and defaults to 10-6000 MHz.
- Create exactly one rule per query.";

const RESPONDER_BRIEF: &str = "\
You are the response writer for an RF spectrum automation system.
The user asked to create automation records and the operations below were executed.
Confirm what was created with IDs, list any errors, and suggest next steps where useful,
for example that a new rule is disabled until it is enabled. Keep it structured and
friendly. Do not mention tool names. Reply in plain text, not JSON.";

fn rule_draft(args: &ToolArgs<'_>) -> Result<NewRule, ToolError> {
    let draft = RuleDraft {
        name: args.required_text("name")?,
        description: args.text("description")?,
        is_enabled: args.flag("is_enabled")?,
        max_executions: args.count("max_executions")?,
        start_time: args.text("start_time")?,
        end_time: args.text("end_time")?,
    };
    Ok(draft.validate()?)
}

fn condition(args: &ToolArgs<'_>) -> Result<NewCondition, ToolError> {
    let kind = args.required_text("condition_type")?;
    Ok(NewCondition {
        spec: ConditionSpec::from_parameters(&kind, &args.object("condition_parameters")?)?,
        description: args.text("condition_description")?,
    })
}

fn action(args: &ToolArgs<'_>) -> Result<NewAction, ToolError> {
    let kind = args.required_text("action_type")?;
    Ok(NewAction {
        spec: ActionSpec::from_parameters(&kind, &args.object("action_parameters")?)?,
        description: args.text("action_description")?,
    })
}

#[derive(Clone, Copy, Debug, Default)]
pub struct CreateDomain;

#[async_trait]
impl AgentDomain for CreateDomain {
    type Tool = CreateTool;
    type Call = CreateCall;
    type Outcome = CreateOutcome;
    type Entities = CreateEntities;

    fn kind(&self) -> DomainKind {
        DomainKind::Create
    }

    fn planner_brief(&self) -> &'static str {
        PLANNER_BRIEF
    }

    fn parameter_schema(&self) -> Option<&'static str> {
        Some(CREATE_PARAMETER_SCHEMA)
    }

    fn responder_brief(&self) -> &'static str {
        RESPONDER_BRIEF
    }

    fn eligible_tools(&self, entities: &CreateEntities) -> Eligibility<CreateTool> {
        let listing_done = entities.retrieved_rules.is_some() || entities.last_rule_id.is_some();
        Eligibility::Tools(
            CreateTool::ALL
                .iter()
                .copied()
                .filter(|tool| !(listing_done && *tool == CreateTool::ListRules))
                .collect(),
        )
    }

    fn planning_notes(&self, entities: &CreateEntities) -> Option<String> {
        entities.retrieved_rules.as_ref().map(|rules| {
            let names: Vec<&str> = rules.iter().map(|rule| rule.name.as_str()).collect();
            format!(
                "Existing rules are already retrieved ({}). Pick a creation tool or respond.",
                names.join(", ")
            )
        })
    }

    fn prepare(&self, tool: CreateTool, params: &Parameters) -> Result<CreateCall, ToolError> {
        if tool == CreateTool::ListRules {
            return Ok(CreateCall::ListRules);
        }

        let args = ToolArgs::new(tool.contract(), params);
        let mut rule = rule_draft(&args)?;
        if tool.with_condition() {
            rule = rule.with_condition(condition(&args)?);
        }
        if tool.with_action() {
            rule = rule.with_action(action(&args)?);
        }
        Ok(CreateCall::Create(rule))
    }

    async fn execute(
        &self,
        store: &dyn RuleStore,
        call: CreateCall,
    ) -> Result<CreateOutcome, ToolError> {
        Ok(match call {
            CreateCall::ListRules => CreateOutcome::Listed(store.list_rules().await?),
            CreateCall::Create(rule) => CreateOutcome::Created(store.create_rule(rule).await?),
        })
    }

    fn summarize(&self, outcome: &CreateOutcome) -> String {
        match outcome {
            CreateOutcome::Listed(rules) => format!("Retrieved {} rules", rules.len()),
            CreateOutcome::Created(created) => {
                let mut parts = Vec::new();
                if let Some(condition) = &created.condition {
                    parts.push(format!(
                        "{} condition (ID: {})",
                        condition.spec.condition_type().label(),
                        condition.id
                    ));
                }
                if let Some(action) = &created.action {
                    parts.push(format!(
                        "{} action (ID: {})",
                        action.spec.action_type().label(),
                        action.id
                    ));
                }

                let head = format!("Created rule '{}' (ID: {})", created.rule.name, created.rule.id);
                if parts.is_empty() {
                    head
                } else {
                    format!("{head} with {}", parts.join(" and "))
                }
            }
        }
    }
}
