use std::env;
use std::fs;
use std::path::Path;

use emsbot_core::config::{resolve_config_path, AppConfig, LoadOptions};
use toml::Value;

use crate::commands::CommandResult;

struct Field {
    key: &'static str,
    env_keys: &'static [&'static str],
    value: String,
}

impl Field {
    fn new(key: &'static str, env_keys: &'static [&'static str], value: impl ToString) -> Self {
        Self { key, env_keys, value: value.to_string() }
    }
}

/// Effective configuration, one line per key, with the layer that supplied it.
pub fn run(options: LoadOptions) -> CommandResult {
    let config_file_path = resolve_config_path(options.config_path.as_deref());
    let config = match AppConfig::load(options) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "config",
                "config_validation",
                format!("config validation failed: {error}"),
                2,
            )
        }
    };
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec![
        "effective config (source precedence: override > env > file > default):".to_string()
    ];
    for field in fields(&config) {
        let source = field_source(&field, config_file_doc.as_ref(), config_file_path.as_deref());
        lines.push(format!("- {} = {} (source: {source})", field.key, field.value));
    }

    CommandResult::text(lines.join("\n"))
}

fn fields(config: &AppConfig) -> Vec<Field> {
    let llm = &config.llm;
    let agent = &config.agent;
    let api_key = if llm.api_key.is_some() { "<redacted>" } else { "<unset>" };

    vec![
        Field::new("llm.provider", &["EMSBOT_LLM_PROVIDER"], format!("{:?}", llm.provider)),
        Field::new(
            "llm.base_url",
            &["EMSBOT_LLM_BASE_URL"],
            llm.base_url.as_deref().unwrap_or("<unset>"),
        ),
        Field::new("llm.api_key", &["EMSBOT_LLM_API_KEY"], api_key),
        Field::new("llm.model", &["EMSBOT_LLM_MODEL"], &llm.model),
        Field::new("llm.timeout_secs", &["EMSBOT_LLM_TIMEOUT_SECS"], llm.timeout_secs),
        Field::new("llm.max_retries", &["EMSBOT_LLM_MAX_RETRIES"], llm.max_retries),
        Field::new(
            "llm.planning_temperature",
            &["EMSBOT_LLM_PLANNING_TEMPERATURE"],
            llm.planning_temperature,
        ),
        Field::new(
            "llm.response_temperature",
            &["EMSBOT_LLM_RESPONSE_TEMPERATURE"],
            llm.response_temperature,
        ),
        Field::new(
            "agent.create_max_iterations",
            &["EMSBOT_AGENT_CREATE_MAX_ITERATIONS"],
            agent.create_max_iterations,
        ),
        Field::new(
            "agent.update_max_iterations",
            &["EMSBOT_AGENT_UPDATE_MAX_ITERATIONS"],
            agent.update_max_iterations,
        ),
        Field::new(
            "agent.info_max_iterations",
            &["EMSBOT_AGENT_INFO_MAX_ITERATIONS"],
            agent.info_max_iterations,
        ),
        Field::new(
            "logging.level",
            &["EMSBOT_LOGGING_LEVEL", "EMSBOT_LOG_LEVEL"],
            &config.logging.level,
        ),
        Field::new(
            "logging.format",
            &["EMSBOT_LOGGING_FORMAT", "EMSBOT_LOG_FORMAT"],
            format!("{:?}", config.logging.format),
        ),
    ]
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(field: &Field, config_file_doc: Option<&Value>, config_file_path: Option<&Path>) -> String {
    let env_hit = field
        .env_keys
        .iter()
        .find(|key| env::var(key).map(|value| !value.trim().is_empty()).unwrap_or(false));
    if let Some(env_key) = env_hit {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, field.key) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}
