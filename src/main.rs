use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use faultline::error::{extract, Fault, Verdict};
use faultline::feedback::TerminalFeedback;
use faultline::interceptors::DetachedTasks;
use faultline::logging::{init_logging, LoggingConfig};
use faultline::store::format_stats;
use faultline::{ErrorHandler, HandlerConfig};

/// Output format for statistics
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
enum StatsFormat {
    /// JSON structured output
    #[default]
    Json,
    /// Human-readable markdown summary
    Markdown,
}

/// Output format for the effective configuration
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
enum ConfigFormat {
    #[default]
    Toml,
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "faultline")]
#[command(version)]
#[command(about = "Classify, log and report application faults")]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    /// Suppress diagnostic logging
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Increase verbosity (-v, -vv)
    #[arg(long, short, action = ArgAction::Count, global = true, conflicts_with = "quiet")]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Classify one fault and print the normalized error and verdict
    Classify {
        /// A JSON value, or plain text
        input: String,
    },
    /// Print the effective configuration
    Config {
        #[arg(long, short = 'f', default_value = "toml", value_enum)]
        format: ConfigFormat,
    },
    /// Handle one fault per line of FILE and print statistics
    Replay {
        /// File with one JSON value or text line per fault
        file: PathBuf,

        #[arg(long, short = 'f', default_value = "json", value_enum)]
        format: StatsFormat,

        /// Show user feedback panels on stderr
        #[arg(long)]
        feedback: bool,

        /// Deliver every handled fault to the reporting endpoint and wait
        #[arg(long)]
        report: bool,
    },
}

/// Parses a JSON value, falling back to treating the input as text.
fn parse_fault(input: &str) -> Fault {
    match serde_json::from_str::<serde_json::Value>(input) {
        Ok(value) => Fault::from(value),
        Err(_) => Fault::from(input),
    }
}

fn classify(input: &str, config: &HandlerConfig) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let fault = parse_fault(input);
    let error = extract(&fault);
    let output = serde_json::json!({
        "error": error.to_envelope(),
        "verdict": Verdict::of(&fault, config.retry_attempts),
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(ExitCode::SUCCESS)
}

fn print_config(
    config: &HandlerConfig,
    format: ConfigFormat,
) -> Result<ExitCode, Box<dyn std::error::Error>> {
    match format {
        ConfigFormat::Toml => print!("{}", toml::to_string_pretty(config)?),
        ConfigFormat::Json => println!("{}", serde_json::to_string_pretty(config)?),
    }
    Ok(ExitCode::SUCCESS)
}

async fn replay(
    file: &Path,
    format: StatsFormat,
    feedback: bool,
    report: bool,
    config: HandlerConfig,
) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let contents = std::fs::read_to_string(file)?;

    let tasks = DetachedTasks::new();
    let mut builder =
        ErrorHandler::builder(config.with_user_feedback(feedback)).intercept_globals(&tasks);
    if feedback {
        builder = builder.feedback(Arc::new(TerminalFeedback::new()));
    }
    let handler = builder.build();

    let mut reported = 0usize;
    for line in contents.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let error = handler.handle(parse_fault(line), None);
        if report {
            match handler.report_now(&error).await {
                Ok(()) => reported += 1,
                Err(e) => tracing::warn!(error_id = %error.id(), error = %e, "Report failed"),
            }
        }
    }

    let stats = handler.error_stats();
    match format {
        StatsFormat::Json => {
            let output = serde_json::json!({
                "stats": stats,
                "activeRetries": handler.active_retries().len(),
                "reported": reported,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        StatsFormat::Markdown => print!("{}", format_stats(&stats)),
    }
    Ok(ExitCode::SUCCESS)
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match HandlerConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {e}");
            return Ok(ExitCode::from(2));
        }
    };

    if !cli.quiet {
        init_logging(&LoggingConfig::for_mode(config.dev_mode, cli.verbose));
    }

    match cli.command {
        Commands::Classify { ref input } => classify(input, &config),
        Commands::Config { format } => print_config(&config, format),
        Commands::Replay {
            ref file,
            format,
            feedback,
            report,
        } => replay(file, format, feedback, report, config).await,
    }
}
