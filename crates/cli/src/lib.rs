pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "examdesk",
    about = "Examdesk operator CLI",
    long_about = "Talk to the ExamBuilder assistant from a terminal, inspect configuration, and manage the session database.",
    after_help = "Examples:\n  examdesk chat\n  examdesk ask \"list exams\"\n  examdesk config\n  examdesk doctor --json"
)]
pub struct Cli {
    #[arg(long, global = true, help = "Read configuration from this TOML file")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Start an interactive conversation with the assistant")]
    Chat {
        #[arg(long, help = "Resume a session id instead of starting a new one")]
        session: Option<String>,
    },
    #[command(about = "Send one message and print the assistant's reply")]
    Ask {
        message: String,
        #[arg(long, help = "Session id to continue")]
        session: Option<String>,
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Apply pending session database migrations")]
    Migrate,
    #[command(about = "Validate config, ExamBuilder reachability, and session storage")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    let options = commands::load_options(cli.config);

    let result = match cli.command {
        Command::Chat { session } => commands::chat::run(&options, session),
        Command::Ask { message, session, json } => {
            commands::ask::run(&options, &message, session, json)
        }
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run(&options) }
        }
        Command::Migrate => commands::migrate::run(&options),
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(&options, json) }
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
