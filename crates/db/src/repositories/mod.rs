use async_trait::async_trait;
use thiserror::Error;

use emsbot_core::domain::action::{Action, ActionId, ActionPatch, ActionUpdate};
use emsbot_core::domain::condition::{Condition, ConditionId, ConditionPatch, ConditionUpdate};
use emsbot_core::domain::rule::{ActivationReceipt, AutomationRule, CreatedRule, NewRule, RuleId};
use emsbot_core::errors::DomainError;

pub mod memory;

pub use memory::InMemoryRuleStore;

#[derive(Clone, Debug, Error, PartialEq)]
pub enum StoreError {
    #[error("Rule with ID {0} not found")]
    RuleNotFound(RuleId),
    #[error("Condition with ID {condition_id} not found for rule {rule_id}")]
    ConditionNotFound { rule_id: RuleId, condition_id: ConditionId },
    #[error("Action with ID {action_id} not found for rule {rule_id}")]
    ActionNotFound { rule_id: RuleId, action_id: ActionId },
    #[error("No conditions found for rule {0}")]
    NoConditions(RuleId),
    #[error("No actions found for rule {0}")]
    NoActions(RuleId),
    #[error(transparent)]
    Domain(#[from] DomainError),
}

/// Persistence seam for automation rules and their sub-records.
///
/// Implementations must serialize writes to the same rule so that a
/// read-decide-write sequence inside one call observes a stable record.
#[async_trait]
pub trait RuleStore: Send + Sync {
    /// All rules in creation order.
    async fn list_rules(&self) -> Result<Vec<AutomationRule>, StoreError>;

    async fn get_rule(&self, id: &RuleId) -> Result<AutomationRule, StoreError>;

    /// Conditions of `rule_id`; an unknown rule yields an empty list.
    async fn list_conditions(&self, rule_id: &RuleId) -> Result<Vec<Condition>, StoreError>;

    /// Actions of `rule_id`; an unknown rule yields an empty list.
    async fn list_actions(&self, rule_id: &RuleId) -> Result<Vec<Action>, StoreError>;

    async fn create_rule(&self, rule: NewRule) -> Result<CreatedRule, StoreError>;

    async fn set_rule_enabled(
        &self,
        id: &RuleId,
        enabled: bool,
    ) -> Result<ActivationReceipt, StoreError>;

    /// Partial update; without `condition_id` the rule's first condition is targeted.
    async fn update_condition(
        &self,
        rule_id: &RuleId,
        condition_id: Option<&ConditionId>,
        patch: ConditionPatch,
    ) -> Result<ConditionUpdate, StoreError>;

    /// Partial update; without `action_id` the rule's first action is targeted.
    async fn update_action(
        &self,
        rule_id: &RuleId,
        action_id: Option<&ActionId>,
        patch: ActionPatch,
    ) -> Result<ActionUpdate, StoreError>;
}
