//! Room service ordering assistant
//!
//! - **chat**: interactive ordering conversation in the terminal
//! - **check**: load and validate the menu and inventory files
//! - **config**: show resolved paths and effective settings

use clap::{Parser, Subcommand};
use roomservice_logging::{init_logging, LogConfig};
use std::path::PathBuf;
use std::process::ExitCode;

mod cli;

#[derive(Parser, Debug)]
#[command(name = "roomservice", about = "Conversational room service ordering")]
struct Cli {
    /// Enable verbose logging (debug to stderr)
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    /// Config file (default: ~/.roomservice/config.toml)
    #[arg(long, global = true, env = "ROOMSERVICE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start an interactive ordering conversation
    Chat(cli::chat::ChatArgs),

    /// Validate the menu and inventory files
    Check(cli::check::CheckArgs),

    /// Show configuration paths and effective settings
    Config(cli::config::ConfigArgs),
}

fn command_wants_json(command: &Commands) -> bool {
    match command {
        Commands::Check(args) => args.json,
        Commands::Config(args) => args.json,
        Commands::Chat(_) => false,
    }
}

fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config_path = cli.config.unwrap_or_else(roomservice_logging::config_path);
    match cli.command {
        Commands::Chat(args) => cli::chat::run(args, &config_path),
        Commands::Check(args) => cli::check::run(args, &config_path),
        Commands::Config(args) => cli::config::run(args, &config_path),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Chat owns the terminal, so only warnings reach stderr there.
    let interactive = matches!(cli.command, Commands::Chat(_));
    let json_mode = command_wants_json(&cli.command);
    if let Err(err) = init_logging(LogConfig {
        app_name: "roomservice",
        verbose: cli.verbose,
        interactive,
    }) {
        eprintln!("Warning: failed to initialize logging: {:#}", err);
    }

    match run_command(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            if json_mode {
                cli::error::print_json_error(&err);
            } else {
                eprintln!("{:?}", err);
            }
            ExitCode::from(1)
        }
    }
}
