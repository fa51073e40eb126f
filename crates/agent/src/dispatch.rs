use emsbot_core::domain::Parameters;
use emsbot_db::RuleStore;

use crate::domains::AgentDomain;
use crate::tools::{CallId, ToolCallRecord, ToolError, ToolId, ToolResult};

/// Resolves, validates and runs one tool call. Every failure is folded into the
/// returned record; nothing is propagated to the caller.
pub async fn dispatch<D: AgentDomain>(
    domain: &D,
    store: &dyn RuleStore,
    call_id: CallId,
    selected_tool: Option<&str>,
    params: &Parameters,
    eligible: &[D::Tool],
) -> ToolCallRecord<D::Outcome> {
    let tool = selected_tool.map(str::trim).filter(|name| !name.is_empty());

    let (result, summary) = match invoke(domain, store, tool, params, eligible).await {
        Ok(outcome) => {
            let summary = domain.summarize(&outcome);
            (ToolResult::Success(outcome), summary)
        }
        Err(error) => {
            let message = error.to_string();
            (ToolResult::Failure { error: message.clone() }, message)
        }
    };

    ToolCallRecord {
        call_id,
        tool: tool.unwrap_or("none").to_string(),
        parameters: params.clone(),
        success: matches!(result, ToolResult::Success(_)),
        result,
        summary,
    }
}

async fn invoke<D: AgentDomain>(
    domain: &D,
    store: &dyn RuleStore,
    tool: Option<&str>,
    params: &Parameters,
    eligible: &[D::Tool],
) -> Result<D::Outcome, ToolError> {
    let name = tool.ok_or(ToolError::NoToolSelected)?;
    let tool = D::Tool::from_name(name).ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;
    if !eligible.contains(&tool) {
        return Err(ToolError::Ineligible(tool.name()));
    }

    tool.contract().check_required(params)?;
    let call = domain.prepare(tool, params)?;
    domain.execute(store, call).await
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use emsbot_core::domain::Parameters;
    use emsbot_db::InMemoryRuleStore;

    use super::dispatch;
    use crate::domains::{InfoDomain, InfoOutcome, InfoTool};
    use crate::tools::{CallId, ToolId, ToolResult};

    fn params(value: serde_json::Value) -> Parameters {
        value.as_object().cloned().unwrap_or_default()
    }

    #[tokio::test]
    async fn missing_tool_name_is_recorded_as_none() {
        let store = InMemoryRuleStore::seeded();
        let record =
            dispatch(&InfoDomain, &store, CallId(0), Some("  "), &Parameters::new(), InfoTool::ALL)
                .await;

        assert!(!record.success);
        assert_eq!(record.tool, "none");
        assert_eq!(record.error(), Some("No tool selected"));
    }

    #[tokio::test]
    async fn unknown_and_ineligible_tools_are_rejected_before_execution() {
        let store = InMemoryRuleStore::seeded();

        let unknown = dispatch(
            &InfoDomain,
            &store,
            CallId(0),
            Some("drop_all_rules"),
            &Parameters::new(),
            InfoTool::ALL,
        )
        .await;
        assert_eq!(unknown.error(), Some("Unknown tool: drop_all_rules"));

        let ineligible = dispatch(
            &InfoDomain,
            &store,
            CallId(1),
            Some("list_automation_rules"),
            &Parameters::new(),
            &[InfoTool::GetRule],
        )
        .await;
        assert_eq!(
            ineligible.error(),
            Some("Tool list_automation_rules is not available at this step")
        );
    }

    #[tokio::test]
    async fn missing_required_parameter_is_a_failed_record() {
        let store = InMemoryRuleStore::seeded();
        let record = dispatch(
            &InfoDomain,
            &store,
            CallId(0),
            Some("get_automation_rule"),
            &Parameters::new(),
            InfoTool::ALL,
        )
        .await;

        assert!(!record.success);
        assert!(matches!(record.result, ToolResult::Failure { ref error } if error.contains("rule_id")));
    }

    #[tokio::test]
    async fn store_rejection_is_captured_as_error_text() {
        let store = InMemoryRuleStore::seeded();
        let record = dispatch(
            &InfoDomain,
            &store,
            CallId(0),
            Some("get_automation_rule"),
            &params(json!({ "rule_id": "rule-404" })),
            InfoTool::ALL,
        )
        .await;

        assert_eq!(record.error(), Some("Rule with ID rule-404 not found"));
        assert_eq!(record.summary, "Rule with ID rule-404 not found");
    }

    #[tokio::test]
    async fn successful_call_carries_outcome_and_summary() {
        let store = InMemoryRuleStore::seeded();
        let record = dispatch(
            &InfoDomain,
            &store,
            CallId(3),
            Some("list_automation_rules"),
            &Parameters::new(),
            InfoTool::ALL,
        )
        .await;

        assert!(record.success);
        assert_eq!(record.call_id, CallId(3));
        assert_eq!(record.summary, "Retrieved 3 item(s)");
        assert!(matches!(record.outcome(), Some(InfoOutcome::Listed(rules)) if rules.len() == 3));
    }
}
