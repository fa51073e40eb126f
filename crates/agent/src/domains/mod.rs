use std::collections::BTreeSet;
use std::fmt::Debug;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use emsbot_core::domain::Parameters;
use emsbot_core::flows::FlowType;
use emsbot_db::RuleStore;

use crate::tools::{CallId, ToolCallRecord, ToolContract, ToolError, ToolId, ToolResult};

pub mod create;
pub mod info;
pub mod update;

pub use create::{CreateDomain, CreateEntities, CreateOutcome, CreateTool};
pub use info::{InfoDomain, InfoEntities, InfoOutcome, InfoTool};
pub use update::{UpdateDomain, UpdateEntities, UpdateOutcome, UpdateTool};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DomainKind {
    Create,
    Update,
    Info,
}

impl DomainKind {
    pub const ALL: [Self; 3] = [Self::Create, Self::Update, Self::Info];

    pub fn label(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Info => "info",
        }
    }

    pub fn flow_type(self) -> FlowType {
        match self {
            Self::Create => FlowType::CreateLoop,
            Self::Update => FlowType::UpdateLoop,
            Self::Info => FlowType::InfoLoop,
        }
    }

    pub fn actor(self) -> &'static str {
        match self {
            Self::Create => "create-loop",
            Self::Update => "update-loop",
            Self::Info => "info-loop",
        }
    }

    /// Full registry for the domain, in presentation order.
    pub fn contracts(self) -> Vec<&'static ToolContract> {
        fn all<T: ToolId>() -> Vec<&'static ToolContract> {
            T::ALL.iter().map(|tool| tool.contract()).collect()
        }
        match self {
            Self::Create => all::<CreateTool>(),
            Self::Update => all::<UpdateTool>(),
            Self::Info => all::<InfoTool>(),
        }
    }
}

impl FromStr for DomainKind {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let wanted = raw.trim();
        Self::ALL
            .into_iter()
            .find(|kind| kind.label().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| format!("unknown domain `{wanted}` (expected create, update or info)"))
    }
}

pub fn lookup(domain: DomainKind, tool_name: &str) -> Option<&'static ToolContract> {
    let wanted = tool_name.trim();
    domain.contracts().into_iter().find(|contract| contract.name == wanted)
}

/// The subset of tools the planner may pick from at this step.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Eligibility<T> {
    Tools(Vec<T>),
    /// A prerequisite cannot be met; the run must stop with this reasoning.
    Exhausted { reasoning: &'static str },
}

/// Domain-shaped record of everything a run has gathered.
pub trait Accumulator: Default + Serialize + Send + Sync {
    type Outcome;

    fn absorb(&mut self, outcome: &Self::Outcome, query: &str);

    /// `Some(reasoning)` once the run needs no further tool calls.
    fn completion(&self) -> Option<&'static str>;
}

/// Wraps a domain accumulator so each call record is folded in at most once.
#[derive(Clone, Debug, Default, Serialize)]
pub struct EntityAccumulator<A> {
    #[serde(skip)]
    merged: BTreeSet<CallId>,
    #[serde(flatten)]
    entities: A,
}

impl<A: Accumulator> EntityAccumulator<A> {
    /// Returns `true` when the record changed the accumulator.
    pub fn merge(&mut self, record: &ToolCallRecord<A::Outcome>, query: &str) -> bool {
        if !self.merged.insert(record.call_id) {
            return false;
        }
        match &record.result {
            ToolResult::Success(outcome) => {
                self.entities.absorb(outcome, query);
                true
            }
            ToolResult::Failure { .. } => false,
        }
    }

    pub fn entities(&self) -> &A {
        &self.entities
    }

    pub fn completion(&self) -> Option<&'static str> {
        self.entities.completion()
    }
}

/// Everything that differs between the create, update and info loops.
#[async_trait]
pub trait AgentDomain: Send + Sync {
    type Tool: ToolId;
    type Call: Debug + Send;
    type Outcome: Serialize + Clone + Debug + Send + Sync;
    type Entities: Accumulator<Outcome = Self::Outcome> + Clone + Debug;

    fn kind(&self) -> DomainKind;

    /// Role and selection rules for the planner prompt.
    fn planner_brief(&self) -> &'static str;

    fn parameter_schema(&self) -> Option<&'static str>;

    fn responder_brief(&self) -> &'static str;

    fn eligible_tools(&self, entities: &Self::Entities) -> Eligibility<Self::Tool>;

    /// Extra state-dependent guidance appended to the planner prompt.
    fn planning_notes(&self, entities: &Self::Entities) -> Option<String>;

    fn prepare(&self, tool: Self::Tool, params: &Parameters) -> Result<Self::Call, ToolError>;

    async fn execute(
        &self,
        store: &dyn RuleStore,
        call: Self::Call,
    ) -> Result<Self::Outcome, ToolError>;

    fn summarize(&self, outcome: &Self::Outcome) -> String;
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use emsbot_core::domain::Parameters;
    use emsbot_db::InMemoryRuleStore;

    use super::{lookup, CreateDomain, CreateEntities, CreateTool, DomainKind, EntityAccumulator};
    use crate::dispatch::dispatch;
    use crate::tools::{CallId, ToolId};

    fn params(value: serde_json::Value) -> Parameters {
        value.as_object().cloned().unwrap_or_default()
    }

    #[tokio::test]
    async fn merging_a_record_twice_keeps_one_entry() {
        let store = InMemoryRuleStore::seeded();
        let record = dispatch(
            &CreateDomain,
            &store,
            CallId(0),
            Some("create_automation_rule"),
            &params(json!({ "name": "Merge Once" })),
            CreateTool::ALL,
        )
        .await;
        assert!(record.success);

        let mut accumulator = EntityAccumulator::<CreateEntities>::default();
        assert!(accumulator.merge(&record, "create a rule called Merge Once"));
        assert!(!accumulator.merge(&record, "create a rule called Merge Once"));

        assert_eq!(accumulator.entities().rules.len(), 1);
        assert_eq!(accumulator.entities().rules[0].name, "Merge Once");
    }

    #[tokio::test]
    async fn failed_record_is_consumed_without_changing_entities() {
        let store = InMemoryRuleStore::seeded();
        let failed = dispatch(
            &CreateDomain,
            &store,
            CallId(1),
            Some("create_automation_rule"),
            &Parameters::new(),
            CreateTool::ALL,
        )
        .await;
        assert!(!failed.success);

        let mut accumulator = EntityAccumulator::<CreateEntities>::default();
        assert!(!accumulator.merge(&failed, "create a rule"));
        assert_eq!(accumulator.entities(), &CreateEntities::default());

        let succeeded = dispatch(
            &CreateDomain,
            &store,
            CallId(1),
            Some("create_automation_rule"),
            &params(json!({ "name": "Late Arrival" })),
            CreateTool::ALL,
        )
        .await;
        assert!(succeeded.success);
        assert!(!accumulator.merge(&succeeded, "create a rule"));
        assert!(accumulator.entities().rules.is_empty());
    }

    #[test]
    fn lookup_is_scoped_to_the_domain() {
        assert!(lookup(DomainKind::Update, "deactivate_automation_rule").is_some());
        assert!(lookup(DomainKind::Info, "deactivate_automation_rule").is_none());
        assert!(lookup(DomainKind::Create, " list_automation_rules ").is_some());
    }

    #[test]
    fn registries_have_unique_names() {
        for kind in DomainKind::ALL {
            let mut names: Vec<&str> =
                kind.contracts().iter().map(|contract| contract.name).collect();
            let total = names.len();
            names.sort_unstable();
            names.dedup();
            assert_eq!(names.len(), total, "{} registry has duplicates", kind.label());
        }
    }

    #[test]
    fn domain_labels_parse_case_insensitively() {
        assert_eq!("Info".parse::<DomainKind>(), Ok(DomainKind::Info));
        assert!("delete".parse::<DomainKind>().is_err());
    }
}
