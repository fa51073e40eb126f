use std::collections::HashSet;
use std::sync::Arc;

use serde_json::Value;

use emsbot_core::domain::rule::RuleId;
use emsbot_db::{InMemoryRuleStore, RuleStore, SEED_RULES};

type SeedContractTestResult<T = ()> = Result<T, String>;

macro_rules! require {
    ($cond:expr) => {
        if !$cond {
            return Err(format!("assertion failed: `{}`", stringify!($cond)));
        }
    };
    ($cond:expr, $($arg:tt)*) => {
        if !$cond {
            return Err(format!($($arg)*));
        }
    };
}

macro_rules! require_eq {
    ($left:expr, $right:expr) => {
        if $left != $right {
            return Err(format!(
                "assertion failed: `left == right` (`{:?}` != `{:?}`)",
                $left,
                $right
            ));
        }
    };
}

fn require_field<'a>(value: &'a Value, field_name: &str) -> SeedContractTestResult<&'a Value> {
    value.get(field_name).ok_or_else(|| format!("{field_name} should be present"))
}

fn require_str<'a>(value: &'a Value, field_name: &str) -> Result<&'a str, String> {
    value.as_str().ok_or_else(|| format!("{field_name} should be a string"))
}

fn seeded_store() -> Arc<dyn RuleStore> {
    Arc::new(InMemoryRuleStore::seeded())
}

#[tokio::test]
async fn seeded_rules_match_fixture_table() -> SeedContractTestResult {
    let store = seeded_store();
    let rules = store.list_rules().await.map_err(|err| err.to_string())?;
    let mut ids = HashSet::new();

    require_eq!(rules.len(), SEED_RULES.len());
    require_eq!(rules.len(), 3);

    for (rule, seed) in rules.iter().zip(SEED_RULES) {
        require!(ids.insert(rule.id.clone()), "duplicate rule id: {}", rule.id);
        require_eq!(rule.id.as_str(), seed.rule_id);
        require_eq!(rule.name.as_str(), seed.name);
        require_eq!(rule.is_enabled, seed.is_enabled);

        let conditions = store.list_conditions(&rule.id).await.map_err(|err| err.to_string())?;
        let actions = store.list_actions(&rule.id).await.map_err(|err| err.to_string())?;
        require_eq!(conditions.len(), 1);
        require_eq!(actions.len(), 1);
        require_eq!(conditions[0].id.0.as_str(), seed.condition_id);
        require_eq!(actions[0].id.0.as_str(), seed.action_id);
    }

    Ok(())
}

#[tokio::test]
async fn seeded_records_serialize_with_wire_field_names() -> SeedContractTestResult {
    let store = seeded_store();
    let rule_id = RuleId("rule-003".to_string());

    let rule = serde_json::to_value(store.get_rule(&rule_id).await.map_err(|e| e.to_string())?)
        .map_err(|err| err.to_string())?;
    require_eq!(require_str(require_field(&rule, "name")?, "name")?, "Energy Threshold Alert");
    require!(require_field(&rule, "isEnabled")? == &Value::Bool(false));
    require!(rule.get("createdAt").is_some(), "rule should expose createdAt");

    let conditions = store.list_conditions(&rule_id).await.map_err(|err| err.to_string())?;
    let condition = serde_json::to_value(&conditions[0]).map_err(|err| err.to_string())?;
    require_eq!(
        require_str(require_field(&condition, "conditionType")?, "conditionType")?,
        "spectralEnergy"
    );
    let parameters = require_field(&condition, "parameters")?;
    require!(
        require_field(parameters, "threshold_dBm")?.as_f64() == Some(-70.0),
        "threshold should serialize as threshold_dBm"
    );
    require!(parameters.get("minFrequencyMHz").is_some(), "band should use MHz field names");

    let actions = store.list_actions(&rule_id).await.map_err(|err| err.to_string())?;
    let action = serde_json::to_value(&actions[0]).map_err(|err| err.to_string())?;
    require_eq!(
        require_str(require_field(&action, "actionType")?, "actionType")?,
        "geolocationRequest"
    );
    let action_parameters = require_field(&action, "parameters")?;
    require_eq!(require_str(require_field(action_parameters, "algorithm")?, "algorithm")?, "TDOA");

    Ok(())
}

#[tokio::test]
async fn seeded_names_resolve_from_free_text() -> SeedContractTestResult {
    let store = seeded_store();
    let rules = store.list_rules().await.map_err(|err| err.to_string())?;

    let query = "Disable the rule named Energy Threshold Alert";
    let matched: Vec<&str> = rules
        .iter()
        .filter(|rule| rule.is_named_in(query))
        .map(|rule| rule.id.as_str())
        .collect();

    require_eq!(matched, vec!["rule-003"]);
    Ok(())
}
