use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::params::{self, Parameters};
use crate::domain::rule::RuleId;
use crate::errors::DomainError;

pub const MIN_FREQUENCY_MHZ: f64 = 10.0;
pub const MAX_FREQUENCY_MHZ: f64 = 6000.0;
pub const MIN_THRESHOLD_DBM: f64 = -150.0;
pub const MAX_THRESHOLD_DBM: f64 = 150.0;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConditionId(pub String);

impl ConditionId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl fmt::Display for ConditionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConditionType {
    SignalDetection,
    SpectralEnergy,
}

impl ConditionType {
    pub fn label(self) -> &'static str {
        match self {
            Self::SignalDetection => "signalDetection",
            Self::SpectralEnergy => "spectralEnergy",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        match raw.trim() {
            "signalDetection" => Ok(Self::SignalDetection),
            "spectralEnergy" => Ok(Self::SpectralEnergy),
            other => Err(DomainError::UnknownConditionType(other.to_string())),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignalType {
    Energy,
    #[serde(rename = "5G")]
    FiveG,
    #[serde(rename = "LTE")]
    Lte,
    #[serde(rename = "QPSK")]
    Qpsk,
    #[serde(rename = "CW")]
    Cw,
    #[serde(rename = "PCMPM")]
    Pcmpm,
    #[serde(rename = "CPM")]
    Cpm,
    #[serde(rename = "CPMFM")]
    Cpmfm,
    #[serde(rename = "BPSK")]
    Bpsk,
    #[serde(rename = "SOQPSK")]
    Soqpsk,
}

impl SignalType {
    pub const ALL: [SignalType; 10] = [
        Self::Energy,
        Self::FiveG,
        Self::Lte,
        Self::Qpsk,
        Self::Cw,
        Self::Pcmpm,
        Self::Cpm,
        Self::Cpmfm,
        Self::Bpsk,
        Self::Soqpsk,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Self::Energy => "Energy",
            Self::FiveG => "5G",
            Self::Lte => "LTE",
            Self::Qpsk => "QPSK",
            Self::Cw => "CW",
            Self::Pcmpm => "PCMPM",
            Self::Cpm => "CPM",
            Self::Cpmfm => "CPMFM",
            Self::Bpsk => "BPSK",
            Self::Soqpsk => "SOQPSK",
        }
    }

    /// Case-insensitive lookup against the canonical labels.
    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        let wanted = raw.trim();
        Self::ALL
            .into_iter()
            .find(|signal| signal.label().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| DomainError::UnknownSignalType(wanted.to_string()))
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrequencyBand {
    pub min_mhz: f64,
    pub max_mhz: f64,
}

impl FrequencyBand {
    pub const FULL: Self = Self { min_mhz: MIN_FREQUENCY_MHZ, max_mhz: MAX_FREQUENCY_MHZ };

    pub fn new(min_mhz: f64, max_mhz: f64) -> Result<Self, DomainError> {
        check_frequency("minFrequencyMHz", min_mhz)?;
        check_frequency("maxFrequencyMHz", max_mhz)?;
        if min_mhz >= max_mhz {
            return Err(DomainError::InvertedFrequencyRange { min: min_mhz, max: max_mhz });
        }
        Ok(Self { min_mhz, max_mhz })
    }
}

fn check_frequency(field: &'static str, value: f64) -> Result<(), DomainError> {
    if !(MIN_FREQUENCY_MHZ..=MAX_FREQUENCY_MHZ).contains(&value) {
        return Err(DomainError::FrequencyOutOfRange { field, value });
    }
    Ok(())
}

fn check_threshold(value: f64) -> Result<(), DomainError> {
    if !(MIN_THRESHOLD_DBM..=MAX_THRESHOLD_DBM).contains(&value) {
        return Err(DomainError::ThresholdOutOfRange(value));
    }
    Ok(())
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "conditionType", content = "parameters", rename_all = "camelCase")]
pub enum ConditionSpec {
    SignalDetection {
        #[serde(rename = "minFrequencyMHz")]
        min_frequency_mhz: f64,
        #[serde(rename = "maxFrequencyMHz")]
        max_frequency_mhz: f64,
        #[serde(rename = "signalType")]
        signal_type: SignalType,
    },
    SpectralEnergy {
        #[serde(rename = "minFrequencyMHz")]
        min_frequency_mhz: f64,
        #[serde(rename = "maxFrequencyMHz")]
        max_frequency_mhz: f64,
        #[serde(rename = "threshold_dBm")]
        threshold_dbm: f64,
    },
}

impl ConditionSpec {
    pub fn signal_detection(band: FrequencyBand, signal_type: SignalType) -> Self {
        Self::SignalDetection {
            min_frequency_mhz: band.min_mhz,
            max_frequency_mhz: band.max_mhz,
            signal_type,
        }
    }

    pub fn spectral_energy(band: FrequencyBand, threshold_dbm: f64) -> Result<Self, DomainError> {
        check_threshold(threshold_dbm)?;
        Ok(Self::SpectralEnergy {
            min_frequency_mhz: band.min_mhz,
            max_frequency_mhz: band.max_mhz,
            threshold_dbm,
        })
    }

    /// Builds a creation-time spec. A missing band edge falls back to the
    /// full supported range.
    pub fn from_parameters(kind: &str, parameters: &Parameters) -> Result<Self, DomainError> {
        let kind = ConditionType::parse(kind)?;
        let min = params::number(parameters, "minFrequencyMHz")?;
        let max = params::number(parameters, "maxFrequencyMHz")?;
        let band = FrequencyBand::new(
            min.unwrap_or(FrequencyBand::FULL.min_mhz),
            max.unwrap_or(FrequencyBand::FULL.max_mhz),
        )?;

        match kind {
            ConditionType::SignalDetection => {
                let signal = params::text(parameters, "signalType")?
                    .ok_or(DomainError::MissingParameter("signalType"))?;
                Ok(Self::signal_detection(band, SignalType::parse(&signal)?))
            }
            ConditionType::SpectralEnergy => {
                let threshold = params::number(parameters, "threshold_dBm")?
                    .ok_or(DomainError::MissingParameter("threshold_dBm"))?;
                Self::spectral_energy(band, threshold)
            }
        }
    }

    pub fn condition_type(&self) -> ConditionType {
        match self {
            Self::SignalDetection { .. } => ConditionType::SignalDetection,
            Self::SpectralEnergy { .. } => ConditionType::SpectralEnergy,
        }
    }

    pub fn band(&self) -> FrequencyBand {
        match self {
            Self::SignalDetection { min_frequency_mhz, max_frequency_mhz, .. }
            | Self::SpectralEnergy { min_frequency_mhz, max_frequency_mhz, .. } => {
                FrequencyBand { min_mhz: *min_frequency_mhz, max_mhz: *max_frequency_mhz }
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct NewCondition {
    pub spec: ConditionSpec,
    pub description: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    pub id: ConditionId,
    pub rule_id: RuleId,
    #[serde(flatten)]
    pub spec: ConditionSpec,
    pub description: Option<String>,
    pub is_satisfied: bool,
    pub satisfied_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Condition {
    pub fn new(
        id: ConditionId,
        rule_id: RuleId,
        draft: NewCondition,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            rule_id,
            spec: draft.spec,
            description: draft.description,
            is_satisfied: false,
            satisfied_at: None,
            created_at,
            updated_at: created_at,
        }
    }

    pub fn reset_satisfaction(&mut self) {
        self.is_satisfied = false;
        self.satisfied_at = None;
    }

    /// Applies a partial update and returns the wire names of the fields it touched.
    ///
    /// The condition is left untouched when the patched result would be invalid.
    pub fn apply_patch(
        &mut self,
        patch: &ConditionPatch,
        now: DateTime<Utc>,
    ) -> Result<Vec<&'static str>, DomainError> {
        if patch.is_empty() {
            return Ok(Vec::new());
        }

        let current = self.spec.band();
        let band = FrequencyBand::new(
            patch.min_frequency_mhz.unwrap_or(current.min_mhz),
            patch.max_frequency_mhz.unwrap_or(current.max_mhz),
        )?;
        let target = patch.condition_type.unwrap_or_else(|| self.spec.condition_type());

        let spec = match target {
            ConditionType::SignalDetection => {
                if patch.threshold_dbm.is_some() {
                    return Err(not_applicable("threshold_dBm", target));
                }
                let signal_type = match (patch.signal_type, &self.spec) {
                    (Some(signal), _) => signal,
                    (None, ConditionSpec::SignalDetection { signal_type, .. }) => *signal_type,
                    (None, _) => return Err(DomainError::MissingParameter("signalType")),
                };
                ConditionSpec::signal_detection(band, signal_type)
            }
            ConditionType::SpectralEnergy => {
                if patch.signal_type.is_some() {
                    return Err(not_applicable("signalType", target));
                }
                let threshold = match (patch.threshold_dbm, &self.spec) {
                    (Some(threshold), _) => threshold,
                    (None, ConditionSpec::SpectralEnergy { threshold_dbm, .. }) => *threshold_dbm,
                    (None, _) => return Err(DomainError::MissingParameter("threshold_dBm")),
                };
                ConditionSpec::spectral_energy(band, threshold)?
            }
        };

        let mut changed = Vec::new();
        if target != self.spec.condition_type() {
            changed.push("conditionType");
        }
        if patch.min_frequency_mhz.is_some() {
            changed.push("minFrequencyMHz");
        }
        if patch.max_frequency_mhz.is_some() {
            changed.push("maxFrequencyMHz");
        }
        if patch.signal_type.is_some() {
            changed.push("signalType");
        }
        if patch.threshold_dbm.is_some() {
            changed.push("threshold_dBm");
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

fn not_applicable(name: &'static str, target: ConditionType) -> DomainError {
    DomainError::InvalidParameter {
        name,
        reason: format!("not applicable to {} conditions", target.label()),
    }
}

/// Partial update for a condition; every field is optional.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ConditionPatch {
    pub condition_type: Option<ConditionType>,
    pub min_frequency_mhz: Option<f64>,
    pub max_frequency_mhz: Option<f64>,
    pub signal_type: Option<SignalType>,
    pub threshold_dbm: Option<f64>,
    pub description: Option<String>,
}

impl ConditionPatch {
    pub fn from_parameters(
        condition_type: Option<&str>,
        parameters: &Parameters,
        description: Option<String>,
    ) -> Result<Self, DomainError> {
        let condition_type = condition_type.map(ConditionType::parse).transpose()?;

        let min_frequency_mhz = params::number(parameters, "minFrequencyMHz")?;
        if let Some(value) = min_frequency_mhz {
            check_frequency("minFrequencyMHz", value)?;
        }
        let max_frequency_mhz = params::number(parameters, "maxFrequencyMHz")?;
        if let Some(value) = max_frequency_mhz {
            check_frequency("maxFrequencyMHz", value)?;
        }
        let signal_type = params::text(parameters, "signalType")?
            .map(|raw| SignalType::parse(&raw))
            .transpose()?;
        let threshold_dbm = params::number(parameters, "threshold_dBm")?;
        if let Some(value) = threshold_dbm {
            check_threshold(value)?;
        }

        Ok(Self {
            condition_type,
            min_frequency_mhz,
            max_frequency_mhz,
            signal_type,
            threshold_dbm,
            description,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.condition_type.is_none()
            && self.min_frequency_mhz.is_none()
            && self.max_frequency_mhz.is_none()
            && self.signal_type.is_none()
            && self.threshold_dbm.is_none()
            && self.description.is_none()
    }
}

/// Result of a condition update as reported back to the planner.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConditionUpdate {
    pub rule_id: RuleId,
    pub condition_id: ConditionId,
    pub updates_made: Vec<String>,
    pub message: String,
    pub condition: Condition,
}
