use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::action::{Action, NewAction};
use crate::domain::condition::{Condition, NewCondition};
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleId(pub String);

impl RuleId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutomationRule {
    pub id: RuleId,
    pub name: String,
    pub description: Option<String>,
    pub is_enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_triggered_at: Option<DateTime<Utc>>,
    pub max_executions: Option<u32>,
    pub executions_remaining: Option<u32>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

impl AutomationRule {
    pub fn new(id: RuleId, draft: &NewRule, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            name: draft.name.clone(),
            description: draft.description.clone(),
            is_enabled: draft.is_enabled,
            created_at,
            updated_at: created_at,
            last_triggered_at: None,
            max_executions: draft.max_executions,
            executions_remaining: draft.max_executions,
            start_time: draft.start_time,
            end_time: draft.end_time,
        }
    }

    /// Case-insensitive containment of the rule name in free text.
    pub fn is_named_in(&self, text: &str) -> bool {
        let name = self.name.trim().to_lowercase();
        !name.is_empty() && text.to_lowercase().contains(&name)
    }
}

/// Unvalidated rule fields exactly as a caller supplies them.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RuleDraft {
    pub name: String,
    pub description: Option<String>,
    pub is_enabled: Option<bool>,
    pub max_executions: Option<u32>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
}

impl RuleDraft {
    pub fn named(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Self::default() }
    }

    pub fn validate(self) -> Result<NewRule, DomainError> {
        let name = self.name.trim().to_string();
        if name.is_empty() {
            return Err(DomainError::EmptyRuleName);
        }

        let start_time =
            self.start_time.as_deref().map(|raw| parse_timestamp("start_time", raw)).transpose()?;
        let end_time =
            self.end_time.as_deref().map(|raw| parse_timestamp("end_time", raw)).transpose()?;
        if let (Some(start), Some(end)) = (start_time, end_time) {
            if start >= end {
                return Err(DomainError::InvalidSchedule);
            }
        }

        Ok(NewRule {
            name,
            description: self.description.filter(|text| !text.trim().is_empty()),
            is_enabled: self.is_enabled.unwrap_or(false),
            max_executions: self.max_executions,
            start_time,
            end_time,
            condition: None,
            action: None,
        })
    }
}

/// A validated rule bundle ready to be written in one step.
#[derive(Clone, Debug, PartialEq)]
pub struct NewRule {
    pub name: String,
    pub description: Option<String>,
    pub is_enabled: bool,
    pub max_executions: Option<u32>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub condition: Option<NewCondition>,
    pub action: Option<NewAction>,
}

impl NewRule {
    pub fn with_condition(mut self, condition: NewCondition) -> Self {
        self.condition = Some(condition);
        self
    }

    pub fn with_action(mut self, action: NewAction) -> Self {
        self.action = Some(action);
        self
    }
}

/// Accepts RFC 3339, or a naive ISO date/datetime read as UTC.
pub fn parse_timestamp(field: &'static str, raw: &str) -> Result<DateTime<Utc>, DomainError> {
    let trimmed = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(parsed.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Ok(Utc.from_utc_datetime(&naive));
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        if let Some(midnight) = date.and_hms_opt(0, 0, 0) {
            return Ok(Utc.from_utc_datetime(&midnight));
        }
    }
    Err(DomainError::InvalidTimestamp { field, value: trimmed.to_string() })
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CreatedRule {
    pub rule: AutomationRule,
    pub condition: Option<Condition>,
    pub action: Option<Action>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivationStatus {
    Activated,
    AlreadyActive,
    Deactivated,
    AlreadyInactive,
}

impl ActivationStatus {
    pub fn changed(self) -> bool {
        matches!(self, Self::Activated | Self::Deactivated)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivationReceipt {
    pub rule_id: RuleId,
    pub rule_name: String,
    pub is_enabled: bool,
    pub status: ActivationStatus,
    pub message: String,
}

impl ActivationReceipt {
    pub fn for_rule(rule: &AutomationRule, status: ActivationStatus) -> Self {
        let message = match status {
            ActivationStatus::Activated => format!("Rule '{}' has been activated", rule.name),
            ActivationStatus::AlreadyActive => format!("Rule '{}' is already active", rule.name),
            ActivationStatus::Deactivated => format!(
                "Rule '{}' has been deactivated; its configuration is preserved",
                rule.name
            ),
            ActivationStatus::AlreadyInactive => {
                format!("Rule '{}' is already inactive", rule.name)
            }
        };
        Self {
            rule_id: rule.id.clone(),
            rule_name: rule.name.clone(),
            is_enabled: rule.is_enabled,
            status,
            message,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Datelike, Timelike, Utc};

    use super::{parse_timestamp, ActivationStatus, AutomationRule, RuleDraft, RuleId};
    use crate::errors::DomainError;

    #[test]
    fn draft_requires_non_blank_name() {
        assert_eq!(RuleDraft::named("   ").validate(), Err(DomainError::EmptyRuleName));
    }

    #[test]
    fn draft_defaults_to_disabled() {
        let rule = RuleDraft::named(" 5G Alert ").validate().expect("valid draft");

        assert_eq!(rule.name, "5G Alert");
        assert!(!rule.is_enabled);
        assert!(rule.condition.is_none());
    }

    #[test]
    fn draft_rejects_inverted_schedule() {
        let draft = RuleDraft {
            start_time: Some("2026-05-02T00:00:00Z".to_string()),
            end_time: Some("2026-05-01".to_string()),
            ..RuleDraft::named("Window")
        };

        assert_eq!(draft.validate(), Err(DomainError::InvalidSchedule));
    }

    #[test]
    fn timestamps_accept_naive_iso_forms() {
        let parsed = parse_timestamp("start_time", "2026-03-04T05:06:07").expect("naive iso");
        assert_eq!((parsed.year(), parsed.month(), parsed.day()), (2026, 3, 4));
        assert_eq!(parsed.hour(), 5);

        assert!(matches!(
            parse_timestamp("end_time", "next tuesday"),
            Err(DomainError::InvalidTimestamp { field: "end_time", .. })
        ));
    }

    #[test]
    fn name_matching_is_case_insensitive_containment() {
        let draft = RuleDraft::named("Energy Threshold Alert").validate().expect("draft");
        let rule = AutomationRule::new(RuleId("rule-003".to_string()), &draft, Utc::now());

        assert!(rule.is_named_in("Disable the rule named energy threshold ALERT please"));
        assert!(!rule.is_named_in("Disable the LTE Detector"));
    }

    #[test]
    fn only_real_transitions_count_as_changes() {
        assert!(ActivationStatus::Deactivated.changed());
        assert!(!ActivationStatus::AlreadyInactive.changed());
    }
}
