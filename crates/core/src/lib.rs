pub mod audit;
pub mod config;
pub mod domain;
pub mod errors;
pub mod flows;

pub use audit::{AuditContext, AuditEvent, AuditSink, InMemoryAuditSink, TracingAuditSink};
pub use config::{AppConfig, ConfigError, ConfigOverrides, LoadOptions};
pub use domain::action::{Action, ActionId, ActionPatch, ActionSpec, ActionType, NewAction};
pub use domain::condition::{
    Condition, ConditionId, ConditionPatch, ConditionSpec, ConditionType, NewCondition,
};
pub use domain::intent::Intent;
pub use domain::rule::{
    ActivationReceipt, ActivationStatus, AutomationRule, CreatedRule, NewRule, RuleDraft, RuleId,
};
pub use domain::Parameters;
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use flows::{FlowEngine, FlowTransitionError};
