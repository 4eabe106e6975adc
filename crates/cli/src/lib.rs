pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use ridematch_core::config::{AppConfig, ConfigOverrides, LoadOptions, LogFormat};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "ridematch",
    about = "Ridematch motorcycle recommendation CLI",
    long_about = "Chat with the recommendation agent, run one-shot turns, index the review catalog, and inspect configuration.",
    after_help = "Examples:\n  ridematch chat\n  ridematch ask \"adventure bike under $9,000, plush suspension\"\n  ridematch index --catalog data/reviews.json\n  ridematch doctor --json"
)]
pub struct Cli {
    #[arg(long, global = true, help = "Path to a ridematch.toml config file")]
    config: Option<PathBuf>,
    #[arg(long, global = true, help = "Use deterministic offline embeddings")]
    dummy_embeddings: bool,
    #[arg(long, global = true, help = "Log at debug level, including raw model output")]
    debug: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Start an interactive recommendation session on stdin")]
    Chat,
    #[command(about = "Run a single turn and print the structured turn report")]
    Ask {
        #[arg(required = true, help = "The rider's message")]
        message: Vec<String>,
    },
    #[command(about = "Load, enrich, and embed the review catalog, then summarize extracted attributes")]
    Index {
        #[arg(long, help = "Catalog path, overriding retrieval.catalog_path")]
        catalog: Option<PathBuf>,
    },
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, catalog readiness, and offline index build")]
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
                dummy_embeddings: self.dummy_embeddings.then_some(true),
                debug: self.debug.then_some(true),
                ..ConfigOverrides::default()
            },
        }
    }
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    let options = cli.load_options();

    if let Ok(config) = AppConfig::load(options.clone()) {
        if let Err(error) = init_logging(&config) {
            eprintln!("{error:#}");
        }
    }

    let result = match cli.command {
        Command::Chat => commands::chat::run(options),
        Command::Ask { message } => commands::ask::run(&message.join(" "), options),
        Command::Index { catalog } => commands::index::run(catalog, options),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run(options) }
        }
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json, options) }
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

/// Logs go to stderr so stdout stays reserved for replies and JSON payloads.
/// `RUST_LOG` wins over the configured level when set.
pub fn init_logging(config: &AppConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.effective_log_level()));
    let builder =
        tracing_subscriber::fmt().with_target(false).with_env_filter(filter).with_writer(std::io::stderr);

    let initialized = match config.logging.format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    initialized.map_err(|error| anyhow::anyhow!("failed to initialize logging: {error}"))
}
