use std::env;
use std::fs;
use std::sync::{Arc, Mutex, OnceLock};

use emsbot_agent::domains::DomainKind;
use emsbot_agent::llm::{DecisionService, ScriptedDecisionService};
use emsbot_cli::commands::{ask, chat, config, doctor, samples, tools, Session};
use emsbot_core::config::{AppConfig, LoadOptions};
use serde_json::Value;

const INFO_LISTING: [&str; 5] = [
    r#"{"requires_database_queries": true}"#,
    r#"{"intent": "INFO", "confidence": 0.97, "reasoning": "listing request"}"#,
    r#"{"next_action": "call_tool", "selected_tool": "list_automation_rules", "tool_parameters": {}}"#,
    r#"{"next_action": "respond", "has_sufficient_data": true}"#,
    "Three rules exist: 5G Monitor, LTE Detector and Energy Threshold Alert.",
];

fn scripted_session(replies: &[&str]) -> (Session, Arc<ScriptedDecisionService>) {
    let scripted = Arc::new(ScriptedDecisionService::new(replies.iter().copied()));
    let service: Arc<dyn DecisionService> = scripted.clone();
    (Session::new(AppConfig::default(), service), scripted)
}

#[test]
fn ask_prints_the_classification_report() {
    let (session, scripted) = scripted_session(&INFO_LISTING);

    let result = ask::run(&session, "  Show all automation rules ", false);
    assert_eq!(result.exit_code, 0);

    let payload = parse_payload(&result.output);
    assert_eq!(payload["intent"], "INFO");
    assert_eq!(payload["confidence"], 0.97);
    assert_eq!(payload["reasoning"], "listing request");
    assert!(payload["final_response"].as_str().unwrap_or_default().contains("LTE Detector"));
    assert_eq!(scripted.remaining(), 0);
}

#[test]
fn ask_trace_includes_tools_called() {
    let (session, _) = scripted_session(&INFO_LISTING);

    let result = ask::run(&session, "Show all automation rules", true);
    let payload = parse_payload(&result.output);

    assert_eq!(payload["classification"]["intent"], "INFO");
    assert_eq!(payload["trace"]["domain"], "info");
    assert_eq!(payload["trace"]["tools_called"][0], "list_automation_rules");
    assert_eq!(payload["analysis"]["requires_database_queries"], true);
}

#[test]
fn ask_rejects_blank_query() {
    let (session, scripted) = scripted_session(&[]);

    let result = ask::run(&session, "   ", false);
    assert_eq!(result.exit_code, 2);

    let payload = parse_payload(&result.output);
    assert_eq!(payload["command"], "ask");
    assert_eq!(payload["error_class"], "bad_request");
    assert!(scripted.requests().is_empty());
}

#[test]
fn chat_answers_until_exit_word() {
    let (session, _) = scripted_session(&INFO_LISTING);
    let input = "Show all automation rules\n\nQUIT\nthis line is never read\n";
    let mut output = Vec::new();

    let result = chat::run(&session, input.as_bytes(), &mut output);
    assert_eq!(result.exit_code, 0);
    assert_eq!(parse_payload(&result.output)["message"], "chat ended after 1 queries");

    let transcript = String::from_utf8(output).expect("utf8 transcript");
    assert!(transcript.contains("[INFO 0.97] Three rules exist"));
    assert!(transcript.trim_end().ends_with("Goodbye!"));
}

#[test]
fn samples_degrade_to_generic_without_a_decision_service() {
    let (session, _) = scripted_session(&[]);

    let result = samples::run(&session);
    assert_eq!(result.exit_code, 0);

    let payload = parse_payload(&result.output);
    let entries = payload.as_array().expect("sample results array");
    assert_eq!(entries.len(), samples::SAMPLE_QUERIES.len());
    for entry in entries {
        assert_eq!(entry["intent"], "GENERIC");
        assert_eq!(entry["confidence"], 0.3);
        assert!(!entry["final_response"].as_str().unwrap_or_default().is_empty());
    }
}

#[test]
fn tools_lists_only_the_requested_domain() {
    let result = tools::run(Some(DomainKind::Info));
    assert_eq!(result.exit_code, 0);

    assert!(result.output.starts_with("# info tools"));
    assert!(result.output.contains("- get_automation_rule:"));
    assert!(result.output.contains("rule_id (string, required)"));
    assert!(!result.output.contains("create_rule_condition"));

    let everything = tools::run(None);
    for domain in ["# create tools", "# update tools", "# info tools"] {
        assert!(everything.output.contains(domain));
    }
}

#[test]
fn config_attributes_sources_and_redacts_api_key() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("emsbot.toml");
    fs::write(
        &path,
        "[llm]\nmodel = \"llama3.1:8b\"\napi_key = \"sk-live-secret\"\n\n[agent]\ninfo_max_iterations = 3\n",
    )
    .expect("write config");

    with_env(&[("EMSBOT_LOGGING_LEVEL", "debug")], || {
        let result = config::run(LoadOptions {
            config_path: Some(path.clone()),
            require_file: true,
            ..LoadOptions::default()
        });
        assert_eq!(result.exit_code, 0);

        let output = &result.output;
        assert!(output.contains("- llm.model = llama3.1:8b (source: file ("));
        assert!(output.contains("- agent.info_max_iterations = 3 (source: file ("));
        assert!(output.contains("- logging.level = debug (source: env (EMSBOT_LOGGING_LEVEL))"));
        assert!(output.contains("- llm.timeout_secs = 60 (source: default)"));
        assert!(output.contains("- llm.api_key = <redacted>"));
        assert!(!output.contains("sk-live-secret"));
    });
}

#[test]
fn config_reports_invalid_env_override() {
    with_env(&[("EMSBOT_AGENT_INFO_MAX_ITERATIONS", "many")], || {
        let result = config::run(LoadOptions::default());
        assert_eq!(result.exit_code, 2);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn doctor_passes_with_a_reachable_service() {
    let service: Arc<dyn DecisionService> = Arc::new(ScriptedDecisionService::default());
    let report = doctor::build_report(&AppConfig::default(), Some(service), None);
    let result = doctor::render(&report, true);
    assert_eq!(result.exit_code, 0);

    let payload = parse_payload(&result.output);
    assert_eq!(payload["overall_status"], "pass");
    let names: Vec<&str> =
        payload["checks"].as_array().expect("checks").iter().filter_map(|check| check["name"].as_str()).collect();
    assert_eq!(
        names,
        vec![
            "config_validation",
            "credentials",
            "decision_service_client",
            "decision_service_reachability",
            "rule_store"
        ]
    );
}

#[test]
fn doctor_skips_downstream_checks_when_config_fails() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("emsbot.toml");
    fs::write(&path, "[llm\nmodel = ").expect("write config");

    with_env(&[], || {
        let result = doctor::run(
            LoadOptions { config_path: Some(path.clone()), require_file: true, ..LoadOptions::default() },
            false,
        );
        assert_eq!(result.exit_code, 1);
        assert!(result.output.starts_with("doctor: one or more readiness checks failed"));
        assert!(result.output.contains("- [fail] config_validation:"));
        assert!(result.output.contains("- [skip] decision_service_reachability:"));
    });
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "EMSBOT_LLM_PROVIDER",
        "EMSBOT_LLM_API_KEY",
        "EMSBOT_LLM_BASE_URL",
        "EMSBOT_LLM_MODEL",
        "EMSBOT_LLM_TIMEOUT_SECS",
        "EMSBOT_LLM_MAX_RETRIES",
        "EMSBOT_LLM_PLANNING_TEMPERATURE",
        "EMSBOT_LLM_RESPONSE_TEMPERATURE",
        "EMSBOT_AGENT_CREATE_MAX_ITERATIONS",
        "EMSBOT_AGENT_UPDATE_MAX_ITERATIONS",
        "EMSBOT_AGENT_INFO_MAX_ITERATIONS",
        "EMSBOT_LOGGING_LEVEL",
        "EMSBOT_LOGGING_FORMAT",
        "EMSBOT_LOG_LEVEL",
        "EMSBOT_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
