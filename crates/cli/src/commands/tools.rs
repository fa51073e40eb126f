use emsbot_agent::domains::DomainKind;

use crate::commands::CommandResult;

/// Prints the tool contracts exactly as the planner sees them.
pub fn run(domain: Option<DomainKind>) -> CommandResult {
    let domains = match domain {
        Some(domain) => vec![domain],
        None => DomainKind::ALL.to_vec(),
    };

    let sections = domains
        .into_iter()
        .map(|domain| {
            let contracts =
                domain.contracts().into_iter().map(|contract| contract.render()).collect::<Vec<_>>();
            format!("# {} tools\n{}", domain.label(), contracts.join("\n"))
        })
        .collect::<Vec<_>>();

    CommandResult::text(sections.join("\n\n"))
}
