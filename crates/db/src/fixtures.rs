use chrono::{DateTime, Duration, Utc};

use emsbot_core::domain::action::{Action, ActionId, ActionSpec, GeolocationAlgorithm, NewAction};
use emsbot_core::domain::condition::{
    Condition, ConditionId, ConditionSpec, NewCondition, SignalType,
};
use emsbot_core::domain::rule::{AutomationRule, NewRule, RuleId};

/// Canonical demo dataset: one rule per condition/action pairing the assistant is tested against.
pub const SEED_RULES: &[SeedRule] = &[
    SeedRule {
        rule_id: "rule-001",
        name: "5G Monitor",
        description: "Watch the 3.5 GHz mid-band for 5G activity",
        is_enabled: true,
        condition_id: "cond-001",
        condition: ConditionSpec::SignalDetection {
            min_frequency_mhz: 3400.0,
            max_frequency_mhz: 3600.0,
            signal_type: SignalType::FiveG,
        },
        condition_description: "5G signal between 3400 and 3600 MHz",
        action_id: "act-001",
        action: SeedAction::Notify("5G signal detected in mid-band"),
        action_description: "Notify the operator",
    },
    SeedRule {
        rule_id: "rule-002",
        name: "LTE Detector",
        description: "Detect LTE carriers in the 1800-2100 MHz range",
        is_enabled: true,
        condition_id: "cond-002",
        condition: ConditionSpec::SignalDetection {
            min_frequency_mhz: 1800.0,
            max_frequency_mhz: 2100.0,
            signal_type: SignalType::Lte,
        },
        condition_description: "LTE signal between 1800 and 2100 MHz",
        action_id: "act-002",
        action: SeedAction::Scan(&["sensor-01", "sensor-02"]),
        action_description: "Scan the band with two sensors",
    },
    SeedRule {
        rule_id: "rule-003",
        name: "Energy Threshold Alert",
        description: "Locate strong emitters in the 2.4 GHz ISM band",
        is_enabled: false,
        condition_id: "cond-003",
        condition: ConditionSpec::SpectralEnergy {
            min_frequency_mhz: 2400.0,
            max_frequency_mhz: 2500.0,
            threshold_dbm: -70.0,
        },
        condition_description: "Energy above -70 dBm between 2400 and 2500 MHz",
        action_id: "act-003",
        action: SeedAction::Geolocate(
            GeolocationAlgorithm::Tdoa,
            &["sensor-01", "sensor-02", "sensor-03"],
        ),
        action_description: "Geolocate the emitter with TDOA",
    },
];

pub struct SeedRule {
    pub rule_id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub is_enabled: bool,
    pub condition_id: &'static str,
    pub condition: ConditionSpec,
    pub condition_description: &'static str,
    pub action_id: &'static str,
    pub action: SeedAction,
    pub action_description: &'static str,
}

pub enum SeedAction {
    Notify(&'static str),
    Scan(&'static [&'static str]),
    Geolocate(GeolocationAlgorithm, &'static [&'static str]),
}

impl SeedAction {
    fn to_spec(&self) -> ActionSpec {
        let owned = |ids: &[&str]| ids.iter().map(ToString::to_string).collect::<Vec<_>>();
        match self {
            Self::Notify(message) => ActionSpec::UserNotification { message: message.to_string() },
            Self::Scan(sensors) => ActionSpec::FrequencyScanRequest { sensor_ids: owned(sensors) },
            Self::Geolocate(algorithm, sensors) => {
                ActionSpec::GeolocationRequest { algorithm: *algorithm, sensor_ids: owned(sensors) }
            }
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct SeedRecords {
    pub rules: Vec<AutomationRule>,
    pub conditions: Vec<Condition>,
    pub actions: Vec<Action>,
}

impl SeedRecords {
    /// Materializes [`SEED_RULES`], spacing creation times one minute apart from `base`.
    pub fn build(base: DateTime<Utc>) -> Self {
        let mut records = Self::default();

        for (offset, seed) in (0_i64..).zip(SEED_RULES) {
            let created_at = base + Duration::minutes(offset);
            let rule_id = RuleId(seed.rule_id.to_string());
            let draft = NewRule {
                name: seed.name.to_string(),
                description: Some(seed.description.to_string()),
                is_enabled: seed.is_enabled,
                max_executions: None,
                start_time: None,
                end_time: None,
                condition: None,
                action: None,
            };

            records.rules.push(AutomationRule::new(rule_id.clone(), &draft, created_at));
            records.conditions.push(Condition::new(
                ConditionId(seed.condition_id.to_string()),
                rule_id.clone(),
                NewCondition {
                    spec: seed.condition.clone(),
                    description: Some(seed.condition_description.to_string()),
                },
                created_at,
            ));
            records.actions.push(Action::new(
                ActionId(seed.action_id.to_string()),
                rule_id,
                NewAction {
                    spec: seed.action.to_spec(),
                    description: Some(seed.action_description.to_string()),
                },
                created_at,
            ));
        }

        records
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use emsbot_core::domain::action::ActionType;
    use emsbot_core::domain::condition::FrequencyBand;

    use super::{SeedRecords, SEED_RULES};

    #[test]
    fn seed_specs_pass_domain_validation() {
        for seed in SEED_RULES {
            let band = seed.condition.band();
            assert!(
                FrequencyBand::new(band.min_mhz, band.max_mhz).is_ok(),
                "{} has an invalid band",
                seed.rule_id
            );
        }
    }

    #[test]
    fn build_keeps_seed_order_and_links_sub_records() {
        let records = SeedRecords::build(Utc::now());

        let names: Vec<&str> = records.rules.iter().map(|rule| rule.name.as_str()).collect();
        assert_eq!(names, vec!["5G Monitor", "LTE Detector", "Energy Threshold Alert"]);
        assert!(records.rules[0].created_at < records.rules[2].created_at);
        assert_eq!(records.conditions[2].rule_id, records.rules[2].id);
        assert_eq!(records.actions[2].spec.action_type(), ActionType::GeolocationRequest);
        assert!(!records.rules[2].is_enabled);
    }
}
