pub mod commands;

use std::process::ExitCode;

use clap::{Parser, Subcommand};

use askdb_core::config::{AppConfig, ConfigOverrides, LoadOptions, LogFormat};

#[derive(Debug, Parser)]
#[command(
    name = "askdb",
    about = "Ask natural-language questions against a relational database",
    long_about = "Run guarded natural-language questions against a MySQL database through a \
                  bounded agent loop: the model may issue at most a capped number of validated, \
                  read-only SQL queries per question.",
    after_help = "Examples:\n  askdb ask \"top 5 states by revenue\"\n  askdb chat\n  askdb doctor --json"
)]
pub struct Cli {
    #[arg(long, global = true, help = "Override the database name to query")]
    database: Option<String>,
    #[arg(long, global = true, help = "Override the model name")]
    model: Option<String>,
    #[arg(long, global = true, help = "Override the log level")]
    log_level: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Ask a one-shot question in a fresh session and print the answer")]
    Ask { question: String },
    #[command(about = "Start an interactive chat session (\":help\" lists meta commands)")]
    Chat,
    #[command(about = "Validate configuration and database connectivity checks")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
}

fn init_logging(config: &AppConfig) {
    use tracing::Level;
    use LogFormat::*;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let overrides = ConfigOverrides {
        database_name: cli.database,
        llm_model: cli.model,
        log_level: cli.log_level,
    };
    let config = match AppConfig::load(LoadOptions { overrides, ..LoadOptions::default() }) {
        Ok(config) => config,
        Err(error) => {
            eprintln!("configuration error: {error}");
            return ExitCode::from(2);
        }
    };
    init_logging(&config);

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            eprintln!("failed to start async runtime: {error}");
            return ExitCode::from(1);
        }
    };

    let result = runtime.block_on(async {
        match cli.command {
            Command::Ask { question } => commands::ask::run(&config, &question).await,
            Command::Chat => commands::chat::run(&config).await,
            Command::Doctor { json } => commands::doctor::run(&config, json).await,
        }
    });

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
