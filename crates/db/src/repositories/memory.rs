use chrono::Utc;
use tokio::sync::RwLock;

use emsbot_core::domain::action::{Action, ActionId, ActionPatch, ActionUpdate};
use emsbot_core::domain::condition::{Condition, ConditionId, ConditionPatch, ConditionUpdate};
use emsbot_core::domain::rule::{
    ActivationReceipt, ActivationStatus, AutomationRule, CreatedRule, NewRule, RuleId,
};

use super::{RuleStore, StoreError};
use crate::fixtures::SeedRecords;

const NO_CHANGES: &str = "No changes were made";

#[derive(Default)]
struct StoreState {
    rules: Vec<AutomationRule>,
    conditions: Vec<Condition>,
    actions: Vec<Action>,
}

impl StoreState {
    fn rule_index(&self, id: &RuleId) -> Result<usize, StoreError> {
        self.rules
            .iter()
            .position(|rule| &rule.id == id)
            .ok_or_else(|| StoreError::RuleNotFound(id.clone()))
    }
}

/// Process-local store; every operation holds one lock for its whole read-decide-write.
#[derive(Default)]
pub struct InMemoryRuleStore {
    state: RwLock<StoreState>,
}

impl InMemoryRuleStore {
    pub fn from_records(records: SeedRecords) -> Self {
        Self {
            state: RwLock::new(StoreState {
                rules: records.rules,
                conditions: records.conditions,
                actions: records.actions,
            }),
        }
    }

    pub fn seeded() -> Self {
        Self::from_records(SeedRecords::build(Utc::now()))
    }
}

#[async_trait::async_trait]
impl RuleStore for InMemoryRuleStore {
    async fn list_rules(&self) -> Result<Vec<AutomationRule>, StoreError> {
        let state = self.state.read().await;
        Ok(state.rules.clone())
    }

    async fn get_rule(&self, id: &RuleId) -> Result<AutomationRule, StoreError> {
        let state = self.state.read().await;
        let index = state.rule_index(id)?;
        Ok(state.rules[index].clone())
    }

    async fn list_conditions(&self, rule_id: &RuleId) -> Result<Vec<Condition>, StoreError> {
        let state = self.state.read().await;
        Ok(state.conditions.iter().filter(|c| &c.rule_id == rule_id).cloned().collect())
    }

    async fn list_actions(&self, rule_id: &RuleId) -> Result<Vec<Action>, StoreError> {
        let state = self.state.read().await;
        Ok(state.actions.iter().filter(|a| &a.rule_id == rule_id).cloned().collect())
    }

    async fn create_rule(&self, mut rule: NewRule) -> Result<CreatedRule, StoreError> {
        let now = Utc::now();
        let rule_id = RuleId::generate();
        let condition = rule
            .condition
            .take()
            .map(|draft| Condition::new(ConditionId::generate(), rule_id.clone(), draft, now));
        let action = rule
            .action
            .take()
            .map(|draft| Action::new(ActionId::generate(), rule_id.clone(), draft, now));
        let created = AutomationRule::new(rule_id, &rule, now);

        let mut state = self.state.write().await;
        state.rules.push(created.clone());
        if let Some(condition) = &condition {
            state.conditions.push(condition.clone());
        }
        if let Some(action) = &action {
            state.actions.push(action.clone());
        }

        Ok(CreatedRule { rule: created, condition, action })
    }

    async fn set_rule_enabled(
        &self,
        id: &RuleId,
        enabled: bool,
    ) -> Result<ActivationReceipt, StoreError> {
        let mut state = self.state.write().await;
        let index = state.rule_index(id)?;

        let status = match (state.rules[index].is_enabled, enabled) {
            (true, true) => ActivationStatus::AlreadyActive,
            (false, false) => ActivationStatus::AlreadyInactive,
            (false, true) => ActivationStatus::Activated,
            (true, false) => ActivationStatus::Deactivated,
        };

        if status.changed() {
            let now = Utc::now();
            let rule = &mut state.rules[index];
            rule.is_enabled = enabled;
            rule.updated_at = now;

            if status == ActivationStatus::Activated {
                for condition in state.conditions.iter_mut().filter(|c| &c.rule_id == id) {
                    condition.reset_satisfaction();
                    condition.updated_at = now;
                }
            }
        }

        Ok(ActivationReceipt::for_rule(&state.rules[index], status))
    }

    async fn update_condition(
        &self,
        rule_id: &RuleId,
        condition_id: Option<&ConditionId>,
        patch: ConditionPatch,
    ) -> Result<ConditionUpdate, StoreError> {
        let mut state = self.state.write().await;
        state.rule_index(rule_id)?;

        let mut owned = state.conditions.iter_mut().filter(|c| &c.rule_id == rule_id).peekable();
        if owned.peek().is_none() {
            return Err(StoreError::NoConditions(rule_id.clone()));
        }
        let condition = match condition_id {
            Some(wanted) => owned.find(|c| &c.id == wanted).ok_or_else(|| {
                StoreError::ConditionNotFound {
                    rule_id: rule_id.clone(),
                    condition_id: wanted.clone(),
                }
            })?,
            None => owned.next().ok_or_else(|| StoreError::NoConditions(rule_id.clone()))?,
        };

        let changed = condition.apply_patch(&patch, Utc::now())?;
        let message = if changed.is_empty() {
            NO_CHANGES.to_string()
        } else {
            format!("Condition updated successfully: {}", changed.join(", "))
        };

        Ok(ConditionUpdate {
            rule_id: rule_id.clone(),
            condition_id: condition.id.clone(),
            updates_made: changed.into_iter().map(str::to_string).collect(),
            message,
            condition: condition.clone(),
        })
    }

    async fn update_action(
        &self,
        rule_id: &RuleId,
        action_id: Option<&ActionId>,
        patch: ActionPatch,
    ) -> Result<ActionUpdate, StoreError> {
        let mut state = self.state.write().await;
        state.rule_index(rule_id)?;

        let mut owned = state.actions.iter_mut().filter(|a| &a.rule_id == rule_id).peekable();
        if owned.peek().is_none() {
            return Err(StoreError::NoActions(rule_id.clone()));
        }
        let action = match action_id {
            Some(wanted) => owned.find(|a| &a.id == wanted).ok_or_else(|| {
                StoreError::ActionNotFound { rule_id: rule_id.clone(), action_id: wanted.clone() }
            })?,
            None => owned.next().ok_or_else(|| StoreError::NoActions(rule_id.clone()))?,
        };

        let changed = action.apply_patch(&patch, Utc::now())?;
        let message = if changed.is_empty() {
            NO_CHANGES.to_string()
        } else {
            format!("Action updated successfully: {}", changed.join(", "))
        };

        Ok(ActionUpdate {
            rule_id: rule_id.clone(),
            action_id: action.id.clone(),
            updates_made: changed.into_iter().map(str::to_string).collect(),
            message,
            action: action.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use emsbot_core::domain::action::{ActionPatch, ActionSpec, NewAction};
    use emsbot_core::domain::condition::{
        ConditionId, ConditionPatch, ConditionSpec, FrequencyBand, NewCondition, SignalType,
    };
    use emsbot_core::domain::rule::{ActivationStatus, RuleDraft, RuleId};
    use emsbot_core::errors::DomainError;

    use crate::repositories::{InMemoryRuleStore, RuleStore, StoreError};

    fn rule_id(raw: &str) -> RuleId {
        RuleId(raw.to_string())
    }

    #[tokio::test]
    async fn seeded_store_lists_rules_in_creation_order() {
        let store = InMemoryRuleStore::seeded();

        let rules = store.list_rules().await.expect("list rules");
        let ids: Vec<&str> = rules.iter().map(|rule| rule.id.as_str()).collect();

        assert_eq!(ids, vec!["rule-001", "rule-002", "rule-003"]);
    }

    #[tokio::test]
    async fn get_unknown_rule_is_not_found() {
        let store = InMemoryRuleStore::seeded();

        let error = store.get_rule(&rule_id("rule-404")).await.expect_err("missing rule");

        assert_eq!(error, StoreError::RuleNotFound(rule_id("rule-404")));
        assert_eq!(error.to_string(), "Rule with ID rule-404 not found");
    }

    #[tokio::test]
    async fn sub_records_of_unknown_rule_are_empty() {
        let store = InMemoryRuleStore::seeded();

        assert!(store.list_conditions(&rule_id("rule-404")).await.expect("conditions").is_empty());
        assert!(store.list_actions(&rule_id("rule-404")).await.expect("actions").is_empty());
    }

    #[tokio::test]
    async fn create_rule_writes_bundle_and_defaults_to_disabled() {
        let store = InMemoryRuleStore::default();
        let band = FrequencyBand::new(700.0, 800.0).expect("band");
        let rule = RuleDraft::named("Band 12 Watch")
            .validate()
            .expect("draft")
            .with_condition(NewCondition {
                spec: ConditionSpec::signal_detection(band, SignalType::Lte),
                description: None,
            })
            .with_action(NewAction {
                spec: ActionSpec::notification("LTE seen on band 12").expect("notification"),
                description: None,
            });

        let created = store.create_rule(rule).await.expect("create rule");

        assert!(!created.rule.is_enabled);
        let condition = created.condition.expect("condition");
        assert_eq!(condition.rule_id, created.rule.id);
        let conditions = store.list_conditions(&created.rule.id).await.expect("conditions");
        let actions = store.list_actions(&created.rule.id).await.expect("actions");
        assert_eq!(conditions, vec![condition]);
        assert_eq!(actions.len(), 1);
    }

    #[tokio::test]
    async fn activation_reports_status_and_resets_conditions() {
        let store = InMemoryRuleStore::seeded();
        let target = rule_id("rule-003");

        let receipt = store.set_rule_enabled(&target, true).await.expect("activate");
        assert_eq!(receipt.status, ActivationStatus::Activated);
        assert!(receipt.is_enabled);
        assert_eq!(receipt.message, "Rule 'Energy Threshold Alert' has been activated");

        let again = store.set_rule_enabled(&target, true).await.expect("activate again");
        assert_eq!(again.status, ActivationStatus::AlreadyActive);

        let conditions = store.list_conditions(&target).await.expect("conditions");
        assert!(conditions.iter().all(|condition| !condition.is_satisfied));
    }

    #[tokio::test]
    async fn deactivating_inactive_rule_is_reported_without_change() {
        let store = InMemoryRuleStore::seeded();

        let receipt =
            store.set_rule_enabled(&rule_id("rule-003"), false).await.expect("deactivate");

        assert_eq!(receipt.status, ActivationStatus::AlreadyInactive);
        assert!(!receipt.status.changed());
    }

    #[tokio::test]
    async fn update_condition_targets_first_condition_by_default() {
        let store = InMemoryRuleStore::seeded();
        let params = json!({ "minFrequencyMHz": 3300, "maxFrequencyMHz": 3800 });
        let patch = ConditionPatch::from_parameters(
            None,
            params.as_object().expect("object"),
            None,
        )
        .expect("patch");

        let update =
            store.update_condition(&rule_id("rule-001"), None, patch).await.expect("update");

        assert_eq!(update.condition_id, ConditionId("cond-001".to_string()));
        assert_eq!(update.updates_made, vec!["minFrequencyMHz", "maxFrequencyMHz"]);
        assert_eq!(update.condition.spec.band().max_mhz, 3800.0);
    }

    #[tokio::test]
    async fn empty_condition_patch_reports_no_changes() {
        let store = InMemoryRuleStore::seeded();

        let update = store
            .update_condition(&rule_id("rule-002"), None, ConditionPatch::default())
            .await
            .expect("update");

        assert!(update.updates_made.is_empty());
        assert_eq!(update.message, "No changes were made");
    }

    #[tokio::test]
    async fn update_condition_with_foreign_id_is_not_found() {
        let store = InMemoryRuleStore::seeded();
        let foreign = ConditionId("cond-003".to_string());

        let error = store
            .update_condition(&rule_id("rule-001"), Some(&foreign), ConditionPatch::default())
            .await
            .expect_err("condition belongs to another rule");

        assert!(matches!(error, StoreError::ConditionNotFound { .. }));
    }

    #[tokio::test]
    async fn switching_action_type_requires_new_fields() {
        let store = InMemoryRuleStore::seeded();
        let patch = ActionPatch {
            action_type: Some(emsbot_core::domain::action::ActionType::GeolocationRequest),
            ..ActionPatch::default()
        };

        // rule-001 notifies, so a geolocation switch has neither algorithm nor sensors.
        let error = store
            .update_action(&rule_id("rule-001"), None, patch)
            .await
            .expect_err("missing algorithm");

        assert_eq!(error, StoreError::Domain(DomainError::MissingParameter("algorithm")));
        let actions = store.list_actions(&rule_id("rule-001")).await.expect("actions");
        assert!(matches!(actions[0].spec, ActionSpec::UserNotification { .. }));
    }

    #[tokio::test]
    async fn update_on_rule_without_actions_is_reported() {
        let store = InMemoryRuleStore::default();
        let created = store
            .create_rule(RuleDraft::named("Bare").validate().expect("draft"))
            .await
            .expect("create");

        let error = store
            .update_action(&created.rule.id, None, ActionPatch::default())
            .await
            .expect_err("no actions");

        assert_eq!(error, StoreError::NoActions(created.rule.id));
    }
}
