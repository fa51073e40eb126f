pub mod commands;
pub mod logging;

use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use uuid::Uuid;

use emsbot_agent::domains::DomainKind;
use emsbot_core::config::{ConfigOverrides, LlmProvider, LoadOptions};

use crate::commands::{CommandResult, Session};

#[derive(Debug, Parser)]
#[command(
    name = "emsbot",
    about = "Emsbot RF automation rules assistant",
    long_about = "Ask natural-language questions about RF spectrum automation rules, create and update \
                  rules through a bounded tool loop, and inspect runtime readiness.",
    after_help = "Examples:\n  emsbot ask \"Show all automation rules\"\n  emsbot tools --domain update\n  emsbot doctor --json"
)]
pub struct Cli {
    #[arg(long, global = true, help = "Path to an emsbot.toml config file")]
    config: Option<PathBuf>,
    #[arg(long, global = true, help = "Override logging.level")]
    log_level: Option<String>,
    #[arg(long, global = true, help = "Override llm.provider (ollama or openai)")]
    provider: Option<LlmProvider>,
    #[arg(long, global = true, help = "Override llm.model")]
    model: Option<String>,
    #[arg(long, global = true, help = "Override llm.base_url")]
    base_url: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Classify one query and print intent, confidence, reasoning and the answer as JSON")]
    Ask {
        #[arg(required = true, help = "The query, quoted or as separate words")]
        query: Vec<String>,
        #[arg(long, help = "Include analysis flags and the domain loop trace")]
        trace: bool,
    },
    #[command(about = "Interactive session; type quit, exit or q to leave")]
    Chat,
    #[command(about = "Run the built-in sample queries against a seeded rule store")]
    Samples,
    #[command(about = "Print the tool contracts presented to the planner")]
    Tools {
        #[arg(long, help = "Only show one domain: create, update or info")]
        domain: Option<DomainKind>,
    },
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, credentials and decision service reachability")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
}

impl Cli {
    fn load_options(&self) -> LoadOptions {
        LoadOptions {
            config_path: self.config.clone(),
            require_file: self.config.is_some(),
            overrides: ConfigOverrides {
                log_level: self.log_level.clone(),
                llm_provider: self.provider,
                llm_model: self.model.clone(),
                llm_base_url: self.base_url.clone(),
            },
        }
    }
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    let result = execute(&cli);

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

fn execute(cli: &Cli) -> CommandResult {
    match &cli.command {
        Command::Tools { domain } => commands::tools::run(*domain),
        Command::Config => commands::config::run(cli.load_options()),
        Command::Doctor { json } => commands::doctor::run(cli.load_options(), *json),
        Command::Ask { query, trace } => {
            with_session(cli, "ask", |session| commands::ask::run(session, &query.join(" "), *trace))
        }
        Command::Chat => with_session(cli, "chat", |session| {
            let stdin = io::stdin();
            let mut stdout = io::stdout();
            commands::chat::run(session, stdin.lock(), &mut stdout)
        }),
        Command::Samples => with_session(cli, "samples", commands::samples::run),
    }
}

fn with_session(cli: &Cli, command: &str, body: impl FnOnce(&Session) -> CommandResult) -> CommandResult {
    match Session::bootstrap(cli.load_options()) {
        Ok(session) => {
            logging::init_logging(&session.config);
            body(&session)
        }
        Err(error) => CommandResult::from_application(command, error, Uuid::new_v4().to_string()),
    }
}
