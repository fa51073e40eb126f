use std::fmt::Debug;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use emsbot_core::domain::Parameters;
use emsbot_core::errors::DomainError;
use emsbot_db::StoreError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParamKind {
    String,
    Number,
    Integer,
    Boolean,
    StringList,
    Object,
}

impl ParamKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Integer => "int",
            Self::Boolean => "bool",
            Self::StringList => "list of strings",
            Self::Object => "dict",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ParamSpec {
    pub name: &'static str,
    pub kind: ParamKind,
    pub required: bool,
    pub description: &'static str,
}

impl ParamSpec {
    pub const fn required(name: &'static str, kind: ParamKind, description: &'static str) -> Self {
        Self { name, kind, required: true, description }
    }

    pub const fn optional(name: &'static str, kind: ParamKind, description: &'static str) -> Self {
        Self { name, kind, required: false, description }
    }
}

/// Static description of one callable operation, shown verbatim to the planner.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ToolContract {
    pub name: &'static str,
    pub description: &'static str,
    pub parameters: &'static [ParamSpec],
    pub example: &'static str,
}

impl ToolContract {
    pub fn render(&self) -> String {
        let mut rendered = format!("- {}:\n  Description: {}\n", self.name, self.description);
        if self.parameters.is_empty() {
            rendered.push_str("  Parameters: none\n");
        } else {
            rendered.push_str("  Parameters:\n");
            for param in self.parameters {
                let presence = if param.required { "required" } else { "optional" };
                rendered.push_str(&format!(
                    "    - {} ({}, {}): {}\n",
                    param.name,
                    param.kind.label(),
                    presence,
                    param.description
                ));
            }
        }
        rendered.push_str(&format!("  Example: {}", self.example));
        rendered
    }

    pub fn parameter(&self, name: &str) -> Option<&'static ParamSpec> {
        self.parameters.iter().find(|param| param.name == name)
    }

    /// Presence check only; value shapes are checked when the call is prepared.
    pub fn check_required(&self, params: &Parameters) -> Result<(), ToolError> {
        match self
            .parameters
            .iter()
            .filter(|param| param.required)
            .find(|param| is_absent(params.get(param.name)))
        {
            Some(missing) => {
                Err(ToolError::MissingParameter { tool: self.name, parameter: missing.name })
            }
            None => Ok(()),
        }
    }
}

fn is_absent(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(text)) => text.trim().is_empty(),
        Some(_) => false,
    }
}

/// Closed set of tool identifiers for one domain.
pub trait ToolId: Copy + Eq + Debug + Send + Sync + 'static {
    const ALL: &'static [Self];

    fn contract(self) -> &'static ToolContract;

    fn name(self) -> &'static str {
        self.contract().name
    }

    fn from_name(name: &str) -> Option<Self> {
        let wanted = name.trim();
        Self::ALL.iter().copied().find(|tool| tool.name() == wanted)
    }
}

pub fn render_tools<T: ToolId>(tools: &[T]) -> String {
    tools.iter().map(|tool| tool.contract().render()).collect::<Vec<_>>().join("\n")
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("No tool selected")]
    NoToolSelected,
    #[error("Unknown tool: {0}")]
    UnknownTool(String),
    #[error("Tool {0} is not available at this step")]
    Ineligible(&'static str),
    #[error("Missing required parameter `{parameter}` for {tool}")]
    MissingParameter { tool: &'static str, parameter: &'static str },
    #[error("Invalid parameters for {tool}: {reason}")]
    InvalidParameters { tool: &'static str, reason: String },
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Position of a call within one run's history.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct CallId(pub usize);

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ToolResult<O> {
    Success(O),
    Failure { error: String },
}

#[derive(Clone, Debug, Serialize)]
pub struct ToolCallRecord<O> {
    pub call_id: CallId,
    pub tool: String,
    pub parameters: Parameters,
    pub result: ToolResult<O>,
    pub summary: String,
    pub success: bool,
}

impl<O> ToolCallRecord<O> {
    pub fn outcome(&self) -> Option<&O> {
        match &self.result {
            ToolResult::Success(outcome) => Some(outcome),
            ToolResult::Failure { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match &self.result {
            ToolResult::Success(_) => None,
            ToolResult::Failure { error } => Some(error),
        }
    }

    /// One history line as the planner and responder see it.
    pub fn history_line(&self) -> String {
        let parameters = Value::Object(self.parameters.clone());
        format!("- {}({}): {}", self.tool, parameters, self.summary)
    }
}

/// Typed reads over a tool's parameter bag; errors name the tool.
pub(crate) struct ToolArgs<'a> {
    tool: &'static str,
    params: &'a Parameters,
}

impl<'a> ToolArgs<'a> {
    pub(crate) fn new(contract: &ToolContract, params: &'a Parameters) -> Self {
        Self { tool: contract.name, params }
    }

    fn invalid(&self, name: &str, reason: impl std::fmt::Display) -> ToolError {
        ToolError::InvalidParameters { tool: self.tool, reason: format!("`{name}` {reason}") }
    }

    fn value(&self, name: &str) -> Option<&'a Value> {
        self.params.get(name).filter(|value| !value.is_null())
    }

    pub(crate) fn text(&self, name: &'static str) -> Result<Option<String>, ToolError> {
        match self.value(name) {
            None => Ok(None),
            Some(Value::String(text)) if text.trim().is_empty() => Ok(None),
            Some(Value::String(text)) => Ok(Some(text.trim().to_string())),
            Some(other) => Err(self.invalid(name, format_args!("expected a string, got {other}"))),
        }
    }

    pub(crate) fn required_text(&self, name: &'static str) -> Result<String, ToolError> {
        self.text(name)?.ok_or(ToolError::MissingParameter { tool: self.tool, parameter: name })
    }

    pub(crate) fn flag(&self, name: &'static str) -> Result<Option<bool>, ToolError> {
        match self.value(name) {
            None => Ok(None),
            Some(Value::Bool(flag)) => Ok(Some(*flag)),
            Some(Value::String(text)) => match text.trim().to_ascii_lowercase().as_str() {
                "true" => Ok(Some(true)),
                "false" => Ok(Some(false)),
                _ => Err(self.invalid(name, format_args!("`{text}` is not a boolean"))),
            },
            Some(other) => Err(self.invalid(name, format_args!("expected a bool, got {other}"))),
        }
    }

    pub(crate) fn count(&self, name: &'static str) -> Result<Option<u32>, ToolError> {
        let parsed = match self.value(name) {
            None => return Ok(None),
            Some(Value::Number(number)) => number.as_u64().and_then(|n| u32::try_from(n).ok()),
            Some(Value::String(text)) => text.trim().parse::<u32>().ok(),
            Some(_) => None,
        };
        parsed
            .map(Some)
            .ok_or_else(|| self.invalid(name, "expected a non-negative integer"))
    }

    /// Nested object; a JSON object encoded as a string is accepted too.
    pub(crate) fn object(&self, name: &'static str) -> Result<Parameters, ToolError> {
        match self.value(name) {
            None => Ok(Parameters::new()),
            Some(Value::Object(map)) => Ok(map.clone()),
            Some(Value::String(text)) => match serde_json::from_str::<Value>(text) {
                Ok(Value::Object(map)) => Ok(map),
                _ => Err(self.invalid(name, "expected an object")),
            },
            Some(other) => Err(self.invalid(name, format_args!("expected an object, got {other}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{
        CallId, ParamKind, ParamSpec, ToolArgs, ToolCallRecord, ToolContract, ToolError,
        ToolResult,
    };
    use emsbot_core::domain::Parameters;

    const PROBE: ToolContract = ToolContract {
        name: "probe_rule",
        description: "Probes a rule.",
        parameters: &[
            ParamSpec::required("rule_id", ParamKind::String, "rule to probe"),
            ParamSpec::optional("depth", ParamKind::Integer, "how far to look"),
        ],
        example: "probe_rule(rule_id=\"rule-001\")",
    };

    fn params(value: serde_json::Value) -> Parameters {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn render_lists_parameters_with_presence() {
        let rendered = PROBE.render();

        assert!(rendered.starts_with("- probe_rule:\n"));
        assert!(rendered.contains("rule_id (string, required): rule to probe"));
        assert!(rendered.contains("depth (int, optional)"));
        assert!(rendered.ends_with("Example: probe_rule(rule_id=\"rule-001\")"));
    }

    #[test]
    fn blank_required_parameter_counts_as_missing() {
        let error = PROBE.check_required(&params(json!({ "rule_id": "  " }))).expect_err("blank");

        assert!(matches!(
            error,
            ToolError::MissingParameter { tool: "probe_rule", parameter: "rule_id" }
        ));
        assert!(PROBE.check_required(&params(json!({ "rule_id": "rule-001" }))).is_ok());
    }

    #[test]
    fn args_coerce_common_model_spellings() {
        let bag = params(json!({
            "is_enabled": "false",
            "max_executions": "3",
            "condition_parameters": "{\"signalType\": \"5G\"}",
        }));
        let args = ToolArgs::new(&PROBE, &bag);

        assert_eq!(args.flag("is_enabled").expect("flag"), Some(false));
        assert_eq!(args.count("max_executions").expect("count"), Some(3));
        assert_eq!(
            args.object("condition_parameters").expect("object").get("signalType"),
            Some(&json!("5G"))
        );
        assert!(args.object("action_parameters").expect("absent").is_empty());
    }

    #[test]
    fn args_reject_wrong_shapes() {
        let bag = params(json!({ "rule_id": 7, "max_executions": -1 }));
        let args = ToolArgs::new(&PROBE, &bag);

        assert!(matches!(args.text("rule_id"), Err(ToolError::InvalidParameters { .. })));
        assert!(matches!(args.count("max_executions"), Err(ToolError::InvalidParameters { .. })));
    }

    #[test]
    fn failed_record_serializes_as_error_object() {
        let record: ToolCallRecord<u8> = ToolCallRecord {
            call_id: CallId(0),
            tool: "probe_rule".to_string(),
            parameters: params(json!({ "rule_id": "rule-404" })),
            result: ToolResult::Failure { error: "Rule with ID rule-404 not found".to_string() },
            summary: "Rule with ID rule-404 not found".to_string(),
            success: false,
        };

        let wire = serde_json::to_value(&record).expect("serialize");
        assert_eq!(wire["result"], json!({ "error": "Rule with ID rule-404 not found" }));
        assert_eq!(record.history_line(), "- probe_rule({\"rule_id\":\"rule-404\"}): Rule with ID rule-404 not found");
    }
}
