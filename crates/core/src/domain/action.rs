use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::params::{self, Parameters};
use crate::domain::rule::RuleId;
use crate::errors::DomainError;

const SENSOR_KEYS: &[&str] = &["sensorIds", "sensor_ids", "sensorsIds"];

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionId(pub String);

impl ActionId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ActionType {
    FrequencyScanRequest,
    GeolocationRequest,
    UserNotification,
}

impl ActionType {
    pub fn label(self) -> &'static str {
        match self {
            Self::FrequencyScanRequest => "frequencyScanRequest",
            Self::GeolocationRequest => "geolocationRequest",
            Self::UserNotification => "userNotification",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        match raw.trim() {
            "frequencyScanRequest" => Ok(Self::FrequencyScanRequest),
            "geolocationRequest" => Ok(Self::GeolocationRequest),
            "userNotification" => Ok(Self::UserNotification),
            other => Err(DomainError::UnknownActionType(other.to_string())),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GeolocationAlgorithm {
    #[serde(rename = "TDOA")]
    Tdoa,
    #[serde(rename = "PDOA")]
    Pdoa,
}

impl GeolocationAlgorithm {
    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "TDOA" => Ok(Self::Tdoa),
            "PDOA" => Ok(Self::Pdoa),
            _ => Err(DomainError::UnknownAlgorithm(raw.trim().to_string())),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "actionType", content = "parameters", rename_all = "camelCase")]
pub enum ActionSpec {
    FrequencyScanRequest {
        #[serde(rename = "sensorIds")]
        sensor_ids: Vec<String>,
    },
    GeolocationRequest {
        algorithm: GeolocationAlgorithm,
        #[serde(rename = "sensorIds")]
        sensor_ids: Vec<String>,
    },
    UserNotification {
        message: String,
    },
}

impl ActionSpec {
    pub fn frequency_scan(sensor_ids: Vec<String>) -> Result<Self, DomainError> {
        Ok(Self::FrequencyScanRequest { sensor_ids: non_empty_sensors(sensor_ids)? })
    }

    pub fn geolocation(
        algorithm: GeolocationAlgorithm,
        sensor_ids: Vec<String>,
    ) -> Result<Self, DomainError> {
        let sensor_ids = non_empty_sensors(sensor_ids)?;
        if sensor_ids.len() < 2 {
            return Err(DomainError::TooFewGeolocationSensors(sensor_ids.len()));
        }
        Ok(Self::GeolocationRequest { algorithm, sensor_ids })
    }

    pub fn notification(message: impl Into<String>) -> Result<Self, DomainError> {
        let message = message.into();
        if message.trim().is_empty() {
            return Err(DomainError::EmptyNotificationMessage);
        }
        Ok(Self::UserNotification { message })
    }

    pub fn from_parameters(kind: &str, parameters: &Parameters) -> Result<Self, DomainError> {
        match ActionType::parse(kind)? {
            ActionType::FrequencyScanRequest => Self::frequency_scan(
                params::string_list(parameters, SENSOR_KEYS)?
                    .ok_or(DomainError::MissingParameter("sensorIds"))?,
            ),
            ActionType::GeolocationRequest => {
                let algorithm = params::text(parameters, "algorithm")?
                    .ok_or(DomainError::MissingParameter("algorithm"))?;
                Self::geolocation(
                    GeolocationAlgorithm::parse(&algorithm)?,
                    params::string_list(parameters, SENSOR_KEYS)?
                        .ok_or(DomainError::MissingParameter("sensorIds"))?,
                )
            }
            ActionType::UserNotification => Self::notification(
                params::text(parameters, "message")?
                    .ok_or(DomainError::MissingParameter("message"))?,
            ),
        }
    }

    pub fn action_type(&self) -> ActionType {
        match self {
            Self::FrequencyScanRequest { .. } => ActionType::FrequencyScanRequest,
            Self::GeolocationRequest { .. } => ActionType::GeolocationRequest,
            Self::UserNotification { .. } => ActionType::UserNotification,
        }
    }

    fn sensor_ids(&self) -> Option<&[String]> {
        match self {
            Self::FrequencyScanRequest { sensor_ids }
            | Self::GeolocationRequest { sensor_ids, .. } => Some(sensor_ids),
            Self::UserNotification { .. } => None,
        }
    }
}

fn non_empty_sensors(sensor_ids: Vec<String>) -> Result<Vec<String>, DomainError> {
    let sensor_ids: Vec<String> =
        sensor_ids.into_iter().filter(|sensor| !sensor.trim().is_empty()).collect();
    if sensor_ids.is_empty() {
        return Err(DomainError::MissingSensors);
    }
    Ok(sensor_ids)
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewAction {
    pub spec: ActionSpec,
    pub description: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Action {
    pub id: ActionId,
    pub rule_id: RuleId,
    #[serde(flatten)]
    pub spec: ActionSpec,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Action {
    pub fn new(id: ActionId, rule_id: RuleId, draft: NewAction, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            rule_id,
            spec: draft.spec,
            description: draft.description,
            created_at,
            updated_at: created_at,
        }
    }

    /// Applies a partial update and returns the wire names of the fields it touched.
    pub fn apply_patch(
        &mut self,
        patch: &ActionPatch,
        now: DateTime<Utc>,
    ) -> Result<Vec<&'static str>, DomainError> {
        if patch.is_empty() {
            return Ok(Vec::new());
        }

        let target = patch.action_type.unwrap_or_else(|| self.spec.action_type());
        let carried_sensors = || {
            patch
                .sensor_ids
                .clone()
                .or_else(|| self.spec.sensor_ids().map(<[String]>::to_vec))
                .ok_or(DomainError::MissingParameter("sensorIds"))
        };

        let spec = match target {
            ActionType::FrequencyScanRequest => {
                reject_field(patch.algorithm.is_some(), "algorithm", target)?;
                reject_field(patch.message.is_some(), "message", target)?;
                ActionSpec::frequency_scan(carried_sensors()?)?
            }
            ActionType::GeolocationRequest => {
                reject_field(patch.message.is_some(), "message", target)?;
                let algorithm = match (patch.algorithm, &self.spec) {
                    (Some(algorithm), _) => algorithm,
                    (None, ActionSpec::GeolocationRequest { algorithm, .. }) => *algorithm,
                    (None, _) => return Err(DomainError::MissingParameter("algorithm")),
                };
                ActionSpec::geolocation(algorithm, carried_sensors()?)?
            }
            ActionType::UserNotification => {
                reject_field(patch.algorithm.is_some(), "algorithm", target)?;
                reject_field(patch.sensor_ids.is_some(), "sensorIds", target)?;
                let message = match (&patch.message, &self.spec) {
                    (Some(message), _) => message.clone(),
                    (None, ActionSpec::UserNotification { message }) => message.clone(),
                    (None, _) => return Err(DomainError::MissingParameter("message")),
                };
                ActionSpec::notification(message)?
            }
        };

        let mut changed = Vec::new();
        if target != self.spec.action_type() {
            changed.push("actionType");
        }
        if patch.sensor_ids.is_some() {
            changed.push("sensorIds");
        }
        if patch.algorithm.is_some() {
            changed.push("algorithm");
        }
        if patch.message.is_some() {
            changed.push("message");
        }
        if let Some(description) = &patch.description {
            self.description = Some(description.clone());
            changed.push("description");
        }

        self.spec = spec;
        self.updated_at = now;
        Ok(changed)
    }
}

fn reject_field(present: bool, name: &'static str, target: ActionType) -> Result<(), DomainError> {
    if present {
        return Err(DomainError::InvalidParameter {
            name,
            reason: format!("not applicable to {} actions", target.label()),
        });
    }
    Ok(())
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ActionPatch {
    pub action_type: Option<ActionType>,
    pub sensor_ids: Option<Vec<String>>,
    pub algorithm: Option<GeolocationAlgorithm>,
    pub message: Option<String>,
    pub description: Option<String>,
}

impl ActionPatch {
    pub fn from_parameters(
        action_type: Option<&str>,
        parameters: &Parameters,
        description: Option<String>,
    ) -> Result<Self, DomainError> {
        let action_type = action_type.map(ActionType::parse).transpose()?;
        let sensor_ids = params::string_list(parameters, SENSOR_KEYS)?;
        let algorithm = params::text(parameters, "algorithm")?
            .map(|raw| GeolocationAlgorithm::parse(&raw))
            .transpose()?;
        let message = params::text(parameters, "message")?;
        if matches!(&message, Some(text) if text.trim().is_empty()) {
            return Err(DomainError::EmptyNotificationMessage);
        }

        Ok(Self { action_type, sensor_ids, algorithm, message, description })
    }

    pub fn is_empty(&self) -> bool {
        self.action_type.is_none()
            && self.sensor_ids.is_none()
            && self.algorithm.is_none()
            && self.message.is_none()
            && self.description.is_none()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionUpdate {
    pub rule_id: RuleId,
    pub action_id: ActionId,
    pub updates_made: Vec<String>,
    pub message: String,
    pub action: Action,
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use serde_json::json;

    use super::{Action, ActionId, ActionPatch, ActionSpec, ActionType, GeolocationAlgorithm, NewAction};
    use crate::domain::rule::RuleId;
    use crate::errors::DomainError;

    fn parameters(value: serde_json::Value) -> crate::domain::Parameters {
        value.as_object().cloned().unwrap_or_default()
    }

    fn notification_action() -> Action {
        Action::new(
            ActionId("act-001".to_string()),
            RuleId("rule-001".to_string()),
            NewAction {
                spec: ActionSpec::notification("5G signal detected in mid-band").expect("spec"),
                description: None,
            },
            Utc::now(),
        )
    }

    #[test]
    fn geolocation_needs_two_sensors() {
        let error = ActionSpec::from_parameters(
            "geolocationRequest",
            &parameters(json!({ "algorithm": "tdoa", "sensorIds": ["sensor-01"] })),
        )
        .expect_err("one sensor");

        assert_eq!(error, DomainError::TooFewGeolocationSensors(1));
    }

    #[test]
    fn geolocation_accepts_lowercase_algorithm() {
        let spec = ActionSpec::from_parameters(
            "geolocationRequest",
            &parameters(json!({ "algorithm": "pdoa", "sensorIds": ["s1", "s2"] })),
        )
        .expect("spec");

        assert!(matches!(
            spec,
            ActionSpec::GeolocationRequest { algorithm: GeolocationAlgorithm::Pdoa, .. }
        ));
    }

    #[test]
    fn scan_request_rejects_blank_sensor_list() {
        let error = ActionSpec::from_parameters(
            "frequencyScanRequest",
            &parameters(json!({ "sensorIds": ["  "] })),
        )
        .expect_err("blank sensors");

        assert_eq!(error, DomainError::MissingSensors);
    }

    #[test]
    fn notification_requires_message() {
        assert_eq!(
            ActionSpec::from_parameters("userNotification", &parameters(json!({}))),
            Err(DomainError::MissingParameter("message"))
        );
        assert_eq!(ActionType::parse("page"), Err(DomainError::UnknownActionType("page".into())));
    }

    #[test]
    fn message_patch_updates_notification_in_place() {
        let mut action = notification_action();
        let patch = ActionPatch::from_parameters(
            None,
            &parameters(json!({ "message": "Updated alert message!" })),
            None,
        )
        .expect("patch");

        let changed = action.apply_patch(&patch, Utc::now()).expect("apply");

        assert_eq!(changed, vec!["message"]);
        assert_eq!(
            action.spec,
            ActionSpec::UserNotification { message: "Updated alert message!".to_string() }
        );
    }

    #[test]
    fn switching_to_scan_requires_sensors() {
        let mut action = notification_action();
        let patch =
            ActionPatch::from_parameters(Some("frequencyScanRequest"), &parameters(json!({})), None)
                .expect("patch");

        assert_eq!(
            action.apply_patch(&patch, Utc::now()),
            Err(DomainError::MissingParameter("sensorIds"))
        );
        assert_eq!(action.spec.action_type(), ActionType::UserNotification);
    }

    #[test]
    fn wire_format_flattens_action_spec() {
        let value = serde_json::to_value(notification_action()).expect("serialize");

        assert_eq!(value["actionType"], "userNotification");
        assert_eq!(value["parameters"]["message"], "5G signal detected in mid-band");
        assert_eq!(value["ruleId"], "rule-001");
    }
}
