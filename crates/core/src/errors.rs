use thiserror::Error;

use crate::flows::FlowTransitionError;

/// Field-level rejections for rules, conditions and actions.
///
/// Messages are shown to end users verbatim, so they name the offending
/// parameter the way the decision service spells it.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum DomainError {
    #[error("Rule name is required and cannot be empty")]
    EmptyRuleName,
    #[error("Invalid datetime format for {field}: `{value}` (expected ISO-8601)")]
    InvalidTimestamp { field: &'static str, value: String },
    #[error("start_time must be before end_time")]
    InvalidSchedule,
    #[error("Invalid condition_type `{0}`. Must be 'signalDetection' or 'spectralEnergy'")]
    UnknownConditionType(String),
    #[error(
        "Invalid action_type `{0}`. Must be 'frequencyScanRequest', 'geolocationRequest', or 'userNotification'"
    )]
    UnknownActionType(String),
    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),
    #[error("Invalid value for {name}: {reason}")]
    InvalidParameter { name: &'static str, reason: String },
    #[error("Frequency out of range: {field} must be between 10 and 6000 MHz (got {value})")]
    FrequencyOutOfRange { field: &'static str, value: f64 },
    #[error("minFrequencyMHz ({min}) must be less than maxFrequencyMHz ({max})")]
    InvertedFrequencyRange { min: f64, max: f64 },
    #[error(
        "Invalid signalType `{0}`. Must be one of: Energy, 5G, LTE, QPSK, CW, PCMPM, CPM, CPMFM, BPSK, SOQPSK"
    )]
    UnknownSignalType(String),
    #[error("threshold_dBm must be between -150 and 150 (got {0})")]
    ThresholdOutOfRange(f64),
    #[error("Invalid algorithm `{0}`. Must be 'TDOA' or 'PDOA'")]
    UnknownAlgorithm(String),
    #[error("sensorIds must be a non-empty list of sensor identifiers")]
    MissingSensors,
    #[error("geolocationRequest requires at least 2 sensorIds (got {0})")]
    TooFewGeolocationSensors(usize),
    #[error("Notification message is required and cannot be empty")]
    EmptyNotificationMessage,
    #[error(transparent)]
    FlowTransition(#[from] FlowTransitionError),
}

#[derive(Clone, Debug, Error, PartialEq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("rule store failure: {0}")]
    Store(String),
    #[error("decision service failure: {0}")]
    DecisionService(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::ServiceUnavailable { .. } => {
                "The assistant is temporarily unavailable. Please retry shortly."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }

    pub fn error_class(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => "bad_request",
            Self::ServiceUnavailable { .. } => "service_unavailable",
            Self::Internal { .. } => "internal",
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        match value {
            ApplicationError::Domain(error) => Self::BadRequest {
                message: error.to_string(),
                correlation_id: "unassigned".to_owned(),
            },
            ApplicationError::Store(message) | ApplicationError::DecisionService(message) => {
                Self::ServiceUnavailable { message, correlation_id: "unassigned".to_owned() }
            }
            ApplicationError::Configuration(message) => {
                Self::Internal { message, correlation_id: "unassigned".to_owned() }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::errors::{ApplicationError, DomainError, InterfaceError};

    #[test]
    fn domain_error_maps_to_bad_request_interface_error() {
        let interface =
            ApplicationError::from(DomainError::EmptyRuleName).into_interface("run-1");

        assert!(matches!(
            interface,
            InterfaceError::BadRequest {
                ref correlation_id,
                ..
            } if correlation_id == "run-1"
        ));
        assert_eq!(interface.error_class(), "bad_request");
    }

    #[test]
    fn bad_request_has_user_safe_message() {
        let interface = ApplicationError::from(DomainError::MissingSensors).into_interface("run-2");

        assert_eq!(
            interface.user_message(),
            "The request could not be processed. Check inputs and try again."
        );
    }

    #[test]
    fn decision_service_error_maps_to_service_unavailable() {
        let interface = ApplicationError::DecisionService("connection refused".to_owned())
            .into_interface("run-3");

        assert!(matches!(interface, InterfaceError::ServiceUnavailable { .. }));
        assert_eq!(interface.correlation_id(), "run-3");
    }

    #[test]
    fn configuration_error_maps_to_internal() {
        let interface = ApplicationError::Configuration("llm.api_key is required".to_owned())
            .into_interface("run-4");

        assert!(matches!(interface, InterfaceError::Internal { .. }));
        assert_eq!(interface.user_message(), "An unexpected internal error occurred.");
    }

    #[test]
    fn frequency_error_message_leads_with_range_violation() {
        let message =
            DomainError::FrequencyOutOfRange { field: "minFrequencyMHz", value: 5.0 }.to_string();

        assert!(message.starts_with("Frequency out of range"));
        assert!(message.contains("minFrequencyMHz"));
    }
}
