use std::sync::Arc;

use secrecy::ExposeSecret;
use serde::Serialize;

use emsbot_agent::llm::{build_decision_service, DecisionService};
use emsbot_core::config::{AppConfig, LlmProvider, LoadOptions};
use emsbot_db::{InMemoryRuleStore, RuleStore};

use crate::commands::{block_on, CommandResult};

const COMMAND: &str = "doctor";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
pub struct DoctorCheck {
    pub name: &'static str,
    pub status: CheckStatus,
    pub details: String,
}

#[derive(Debug, Serialize)]
pub struct DoctorReport {
    pub overall_status: CheckStatus,
    pub summary: String,
    pub checks: Vec<DoctorCheck>,
}

pub fn run(options: LoadOptions, json_output: bool) -> CommandResult {
    let report = match AppConfig::load(options) {
        Ok(config) => match build_decision_service(&config.llm) {
            Ok(service) => build_report(&config, Some(service), None),
            Err(error) => build_report(&config, None, Some(error.to_string())),
        },
        Err(error) => finalize(vec![
            DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            },
            skipped("credentials"),
            skipped("decision_service_client"),
            skipped("decision_service_reachability"),
            skipped("rule_store"),
        ]),
    };
    render(&report, json_output)
}

/// Checks for an already loaded config. `service` is `None` when the client
/// could not be built; `client_error` then says why.
pub fn build_report(
    config: &AppConfig,
    service: Option<Arc<dyn DecisionService>>,
    client_error: Option<String>,
) -> DoctorReport {
    let mut checks = vec![
        DoctorCheck {
            name: "config_validation",
            status: CheckStatus::Pass,
            details: "configuration loaded and validated".to_string(),
        },
        check_credentials(config),
    ];

    match service {
        Some(service) => {
            checks.push(DoctorCheck {
                name: "decision_service_client",
                status: CheckStatus::Pass,
                details: format!("{} client for model `{}`", service.name(), config.llm.model),
            });
            checks.push(check_reachability(service.as_ref()));
        }
        None => {
            checks.push(DoctorCheck {
                name: "decision_service_client",
                status: CheckStatus::Fail,
                details: client_error.unwrap_or_else(|| "client was not built".to_string()),
            });
            checks.push(skipped("decision_service_reachability"));
        }
    }
    checks.push(check_rule_store());

    finalize(checks)
}

fn check_credentials(config: &AppConfig) -> DoctorCheck {
    let key_present = config
        .llm
        .api_key
        .as_ref()
        .map(|key| !key.expose_secret().trim().is_empty())
        .unwrap_or(false);

    let (status, details) = match (config.llm.provider, key_present) {
        (LlmProvider::OpenAi, true) => (CheckStatus::Pass, "api key configured".to_string()),
        (LlmProvider::OpenAi, false) => {
            (CheckStatus::Fail, "openai provider requires llm.api_key".to_string())
        }
        (LlmProvider::Ollama, _) => (CheckStatus::Pass, "no api key required for ollama".to_string()),
    };
    DoctorCheck { name: "credentials", status, details }
}

fn check_reachability(service: &dyn DecisionService) -> DoctorCheck {
    let name = "decision_service_reachability";
    match block_on(COMMAND, service.probe()) {
        Ok(Ok(())) => DoctorCheck {
            name,
            status: CheckStatus::Pass,
            details: format!("{} endpoint answered", service.name()),
        },
        Ok(Err(error)) => DoctorCheck { name, status: CheckStatus::Fail, details: error.to_string() },
        Err(failure) => DoctorCheck { name, status: CheckStatus::Fail, details: failure.output },
    }
}

fn check_rule_store() -> DoctorCheck {
    let store = InMemoryRuleStore::seeded();
    let name = "rule_store";
    match block_on(COMMAND, store.list_rules()) {
        Ok(Ok(rules)) => DoctorCheck {
            name,
            status: CheckStatus::Pass,
            details: format!("seeded store holds {} rules", rules.len()),
        },
        Ok(Err(error)) => DoctorCheck { name, status: CheckStatus::Fail, details: error.to_string() },
        Err(failure) => DoctorCheck { name, status: CheckStatus::Fail, details: failure.output },
    }
}

fn skipped(name: &'static str) -> DoctorCheck {
    DoctorCheck {
        name,
        status: CheckStatus::Skipped,
        details: "skipped because configuration did not load".to_string(),
    }
}

fn finalize(checks: Vec<DoctorCheck>) -> DoctorReport {
    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

pub fn render(report: &DoctorReport, json_output: bool) -> CommandResult {
    let exit_code = if report.overall_status == CheckStatus::Pass { 0 } else { 1 };
    if json_output {
        let mut result = CommandResult::document(COMMAND, report);
        if result.exit_code == 0 {
            result.exit_code = exit_code;
        }
        return result;
    }

    let mut lines = vec![report.summary.clone()];
    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    CommandResult { exit_code, output: lines.join("\n") }
}
