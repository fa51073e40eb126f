use serde_json::{Map, Value};

use crate::errors::DomainError;

/// Loosely typed parameter bag as produced by the decision service.
pub type Parameters = Map<String, Value>;

pub(crate) fn number(params: &Parameters, key: &'static str) -> Result<Option<f64>, DomainError> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(value)) => value.as_f64().map(Some).ok_or_else(|| {
            DomainError::InvalidParameter { name: key, reason: format!("`{value}` is not finite") }
        }),
        // Numbers quoted as strings are common in model output.
        Some(Value::String(raw)) => raw.trim().parse::<f64>().map(Some).map_err(|_| {
            DomainError::InvalidParameter { name: key, reason: format!("`{raw}` is not a number") }
        }),
        Some(other) => Err(DomainError::InvalidParameter {
            name: key,
            reason: format!("expected a number, got {other}"),
        }),
    }
}

pub(crate) fn text(params: &Parameters, key: &'static str) -> Result<Option<String>, DomainError> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(value)) => Ok(Some(value.clone())),
        Some(other) => Err(DomainError::InvalidParameter {
            name: key,
            reason: format!("expected a string, got {other}"),
        }),
    }
}

/// Reads the first present key out of `keys`; errors name the canonical key.
pub(crate) fn string_list(
    params: &Parameters,
    keys: &[&'static str],
) -> Result<Option<Vec<String>>, DomainError> {
    let canonical = keys.first().copied().unwrap_or("list");
    let Some(value) = keys.iter().find_map(|key| params.get(*key)) else {
        return Ok(None);
    };

    match value {
        Value::Null => Ok(None),
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::String(entry) => Ok(entry.trim().to_string()),
                other => Err(DomainError::InvalidParameter {
                    name: canonical,
                    reason: format!("expected a list of strings, found {other}"),
                }),
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Some),
        other => Err(DomainError::InvalidParameter {
            name: canonical,
            reason: format!("expected a list of strings, got {other}"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{number, string_list, text, Parameters};
    use crate::errors::DomainError;

    fn params(value: serde_json::Value) -> Parameters {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn number_accepts_quoted_values() {
        let bag = params(json!({ "minFrequencyMHz": "3400", "maxFrequencyMHz": 3600 }));

        assert_eq!(number(&bag, "minFrequencyMHz"), Ok(Some(3400.0)));
        assert_eq!(number(&bag, "maxFrequencyMHz"), Ok(Some(3600.0)));
        assert_eq!(number(&bag, "threshold_dBm"), Ok(None));
    }

    #[test]
    fn number_rejects_non_numeric_text() {
        let bag = params(json!({ "threshold_dBm": "loud" }));

        assert!(matches!(
            number(&bag, "threshold_dBm"),
            Err(DomainError::InvalidParameter { name: "threshold_dBm", .. })
        ));
    }

    #[test]
    fn string_list_honours_aliases_in_order() {
        let bag = params(json!({ "sensor_ids": ["sensor-01", " sensor-02 "] }));

        let sensors = string_list(&bag, &["sensorIds", "sensor_ids"]).expect("sensor list");
        assert_eq!(sensors, Some(vec!["sensor-01".to_string(), "sensor-02".to_string()]));
    }

    #[test]
    fn text_rejects_non_string_values() {
        let bag = params(json!({ "message": 42 }));

        assert!(text(&bag, "message").is_err());
    }
}
