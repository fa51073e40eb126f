pub mod ask;
pub mod chat;
pub mod config;
pub mod doctor;
pub mod samples;
pub mod tools;

use std::future::Future;
use std::sync::Arc;

use serde::Serialize;

use emsbot_agent::llm::{build_decision_service, DecisionService};
use emsbot_agent::runtime::AgentRuntime;
use emsbot_core::config::{AppConfig, LoadOptions};
use emsbot_core::errors::ApplicationError;
use emsbot_db::{InMemoryRuleStore, RuleStore};

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome {
    command: String,
    status: String,
    error_class: Option<String>,
    message: String,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "ok".to_string(),
            error_class: None,
            message: message.into(),
        };
        Self { exit_code: 0, output: serialize_payload(payload) }
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(error_class.to_string()),
            message: message.into(),
        };
        Self { exit_code, output: serialize_payload(payload) }
    }

    /// Pretty JSON body for commands whose output is a document rather than a status line.
    pub fn document<T: Serialize>(command: &str, body: &T) -> Self {
        match serde_json::to_string_pretty(body) {
            Ok(output) => Self { exit_code: 0, output },
            Err(error) => Self::failure(command, "serialization", error.to_string(), 1),
        }
    }

    pub fn text(output: impl Into<String>) -> Self {
        Self { exit_code: 0, output: output.into() }
    }

    /// Maps an application failure to its user-safe interface message.
    pub fn from_application(
        command: &str,
        error: ApplicationError,
        correlation_id: impl Into<String>,
    ) -> Self {
        let detail = error.to_string();
        let error = error.into_interface(correlation_id);
        Self::failure(
            command,
            error.error_class(),
            format!("{} ({detail}; correlation_id: {})", error.user_message(), error.correlation_id()),
            2,
        )
    }
}

fn serialize_payload(payload: CommandOutcome) -> String {
    serde_json::to_string(&payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}

/// Everything a query-answering command needs: config, one decision service
/// and a freshly seeded rule store.
pub struct Session {
    pub config: AppConfig,
    pub service: Arc<dyn DecisionService>,
    pub store: Arc<dyn RuleStore>,
}

impl Session {
    pub fn new(config: AppConfig, service: Arc<dyn DecisionService>) -> Self {
        Self { config, service, store: Arc::new(InMemoryRuleStore::seeded()) }
    }

    pub fn bootstrap(options: LoadOptions) -> Result<Self, ApplicationError> {
        let config = AppConfig::load(options)
            .map_err(|error| ApplicationError::Configuration(error.to_string()))?;
        let service = build_decision_service(&config.llm)
            .map_err(|error| ApplicationError::DecisionService(error.to_string()))?;
        Ok(Self::new(config, service))
    }

    pub fn runtime(&self) -> AgentRuntime {
        AgentRuntime::new(self.service.clone(), self.store.clone(), &self.config)
    }
}

/// Commands stay synchronous; async work runs on a throwaway current-thread runtime.
pub(crate) fn block_on<F: Future>(command: &str, future: F) -> Result<F::Output, CommandResult> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map(|runtime| runtime.block_on(future))
        .map_err(|error| {
            CommandResult::failure(
                command,
                "runtime",
                format!("failed to initialize async runtime: {error}"),
                1,
            )
        })
}
