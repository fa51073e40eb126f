//! Reference texts injected into router and planner prompts.

pub const SCHEMA_KNOWLEDGE: &str = "\
RULE STORE SCHEMA

AutomationRule
  id               string, generated identifier
  name             string, not unique
  description      string, optional
  isEnabled        bool, whether the rule is active
  createdAt        timestamp
  updatedAt        timestamp
  lastTriggeredAt  timestamp, optional
  maxExecutions    integer, optional execution limit
  executionsRemaining integer, optional
  startTime        timestamp, optional start of the active window
  endTime          timestamp, optional end of the active window

AutomationCondition (belongs to one rule)
  id, ruleId
  conditionType    \"signalDetection\" | \"spectralEnergy\"
  description      string, optional
  parameters
    signalDetection: minFrequencyMHz (10-6000), maxFrequencyMHz (10-6000),
                     signalType (Energy, 5G, LTE, QPSK, CW, PCMPM, CPM, CPMFM, BPSK, SOQPSK)
    spectralEnergy:  minFrequencyMHz (10-6000), maxFrequencyMHz (10-6000),
                     threshold_dBm (-150 to 150)
  isSatisfied      bool
  satisfiedAt      timestamp, optional

AutomationAction (belongs to one rule)
  id, ruleId
  actionType       \"frequencyScanRequest\" | \"geolocationRequest\" | \"userNotification\"
  description      string, optional
  parameters
    frequencyScanRequest: sensorIds, scans the band with the listed sensors
    geolocationRequest:   algorithm (TDOA | PDOA) and at least two sensorIds
    userNotification:     message sent to the operator
";

pub const RF_KNOWLEDGE: &str = "\
RF SPECTRUM BACKGROUND

Signal types
  Energy   broadband RF energy
  5G       fifth generation cellular
  LTE      fourth generation cellular (Long-Term Evolution)
  QPSK     quadrature phase shift keying
  CW       continuous wave carrier
  PCMPM    pulse code modulation with phase modulation
  CPM      continuous phase modulation
  CPMFM    continuous phase frequency modulation
  BPSK     binary phase shift keying
  SOQPSK   shaped offset QPSK

Frequencies
  Supported range is 10 MHz to 6000 MHz.
  VHF spans 30-300 MHz, UHF 300-3000 MHz, SHF 3-30 GHz.

Power
  dBm is decibels relative to one milliwatt.
  Accepted thresholds run from -150 dBm to +150 dBm; ambient RF usually sits near -90 to -50 dBm.

Geolocation
  TDOA locates an emitter from arrival time differences across sensors.
  PDOA locates an emitter from phase differences across sensors.

Conditions
  signalDetection fires when a given signal type appears inside a band.
  spectralEnergy fires when band energy crosses a threshold.

Actions
  frequencyScanRequest starts a sensor scan.
  geolocationRequest locates the signal source.
  userNotification alerts the operator.
";

/// Condition and action parameters as accepted by the creation tools.
pub const CREATE_PARAMETER_SCHEMA: &str = "\
CONDITION TYPES
1. signalDetection
   required: signalType, one of Energy, 5G, LTE, QPSK, CW, PCMPM, CPM, CPMFM, BPSK, SOQPSK
   optional: minFrequencyMHz (10-6000, default 10), maxFrequencyMHz (10-6000, default 6000)
2. spectralEnergy
   required: threshold_dBm (-150 to 150)
   optional: minFrequencyMHz (10-6000, default 10), maxFrequencyMHz (10-6000, default 6000)

ACTION TYPES
1. frequencyScanRequest
   required: sensorIds (list of strings)
2. geolocationRequest
   required: algorithm (\"TDOA\" or \"PDOA\"), sensorIds (list of at least 2 strings)
3. userNotification
   required: message (string)
";

/// Condition and action parameters as accepted by the update tools.
pub const UPDATE_PARAMETER_SCHEMA: &str = "\
CONDITION TYPES
1. signalDetection
   minFrequencyMHz (10-6000), maxFrequencyMHz (10-6000), signalType
   (Energy, 5G, LTE, QPSK, CW, PCMPM, CPM, CPMFM, BPSK, SOQPSK)
2. spectralEnergy
   minFrequencyMHz (10-6000), maxFrequencyMHz (10-6000), threshold_dBm (-150 to 150)
Only the fields being changed need to be sent. Switching conditionType requires the
new type's own field (signalType or threshold_dBm).

ACTION TYPES
1. frequencyScanRequest
   sensorIds (list of strings)
2. geolocationRequest
   algorithm (\"TDOA\" or \"PDOA\"), sensorIds (list of at least 2 strings)
3. userNotification
   message (string)
Only the fields being changed need to be sent. Switching actionType requires the new
type's own fields.
";
