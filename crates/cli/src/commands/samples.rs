use serde::Serialize;

use emsbot_core::domain::intent::Intent;

use crate::commands::{block_on, CommandResult, Session};

const COMMAND: &str = "samples";

pub const SAMPLE_QUERIES: &[&str] = &[
    "Create a new automation rule to detect 5G signals between 3400 and 3600 MHz",
    "I want to set up monitoring for LTE signals and send notifications when detected",
    "Update the frequency range of rule 'LTE Detector' to 1800-2100 MHz",
    "Disable the rule 'Energy Threshold Alert'",
    "Show me all automation rules that have spectralEnergy conditions",
    "List all active rules",
    "What is TDOA and how does it work for geolocation?",
    "Explain the difference between signalDetection and spectralEnergy conditions",
];

#[derive(Debug, Serialize)]
struct SampleResult {
    query: &'static str,
    intent: Intent,
    confidence: f64,
    final_response: String,
}

/// Runs every sample query in order against one session, so earlier samples
/// may change the rules later samples see.
pub fn run(session: &Session) -> CommandResult {
    let runtime = session.runtime();
    let results = block_on(COMMAND, async {
        let mut results = Vec::with_capacity(SAMPLE_QUERIES.len());
        for &query in SAMPLE_QUERIES {
            let report = runtime.classify(query).await;
            results.push(SampleResult {
                query,
                intent: report.intent,
                confidence: report.confidence,
                final_response: report.final_response,
            });
        }
        results
    });

    match results {
        Ok(results) => CommandResult::document(COMMAND, &results),
        Err(failure) => failure,
    }
}
