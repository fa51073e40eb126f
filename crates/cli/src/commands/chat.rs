use std::io::{BufRead, Write};

use anyhow::{Context, Result};

use crate::commands::{block_on, CommandResult, Session};

const COMMAND: &str = "chat";
const PROMPT: &str = "you> ";
const EXIT_WORDS: [&str; 3] = ["quit", "exit", "q"];

/// Interactive loop over `input`; answers go to `output` as plain text.
pub fn run<R: BufRead, W: Write>(session: &Session, input: R, output: &mut W) -> CommandResult {
    match converse(session, input, output) {
        Ok(answered) => CommandResult::success(COMMAND, format!("chat ended after {answered} queries")),
        Err(error) => CommandResult::failure(COMMAND, "io", format!("{error:#}"), 1),
    }
}

fn converse<R: BufRead, W: Write>(session: &Session, input: R, output: &mut W) -> Result<usize> {
    let runtime = session.runtime();
    let mut answered = 0;

    writeln!(output, "Ask about RF automation rules. Type 'quit' to leave.")
        .context("failed to write chat banner")?;
    write!(output, "{PROMPT}").context("failed to write prompt")?;
    output.flush().context("failed to flush prompt")?;

    for line in input.lines() {
        let line = line.context("failed to read chat input")?;
        let query = line.trim();
        if EXIT_WORDS.iter().any(|word| query.eq_ignore_ascii_case(word)) {
            break;
        }
        if !query.is_empty() {
            let report = match block_on(COMMAND, runtime.classify(query)) {
                Ok(report) => report,
                Err(failure) => anyhow::bail!("{}", failure.output),
            };
            writeln!(
                output,
                "[{} {:.2}] {}",
                report.intent.label(),
                report.confidence,
                report.final_response
            )
            .context("failed to write answer")?;
            answered += 1;
        }
        write!(output, "{PROMPT}").context("failed to write prompt")?;
        output.flush().context("failed to flush prompt")?;
    }

    writeln!(output, "Goodbye!").context("failed to write farewell")?;
    Ok(answered)
}
