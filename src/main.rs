use anyhow::Result;
use clap::{Parser, Subcommand};
use llm_usage::config::Config;
use llm_usage::display::DisplayManager;
use llm_usage::logging::init_logging;
use llm_usage::models::{parse_date, Metadata, UsageRequest};
use llm_usage::UsageLedger;
use std::path::PathBuf;
use std::process;

#[derive(Parser)]
#[command(name = "llm-usage")]
#[command(about = "Usage accounting and cost attribution for LLM calls")]
#[command(version)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Price one model call and append it to the usage log
    Record {
        #[arg(long)]
        model: String,
        #[arg(long)]
        operation: String,
        #[arg(long, allow_negative_numbers = true)]
        input_tokens: i64,
        #[arg(long, allow_negative_numbers = true)]
        output_tokens: i64,
        /// Extra key=value data stored with the record (repeatable)
        #[arg(long = "metadata", value_parser = parse_metadata_pair)]
        metadata: Vec<(String, serde_json::Value)>,
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },
    /// Show one day's usage by model and operation (default: today, UTC)
    Summary {
        /// Date to summarize (YYYY-MM-DD)
        #[arg(long)]
        date: Option<String>,
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },
    /// Show usage for every day of a date range
    Daily {
        /// Start date, inclusive (YYYY-MM-DD)
        #[arg(long)]
        since: String,
        /// End date, inclusive (YYYY-MM-DD)
        #[arg(long)]
        until: String,
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },
    /// List the dates that have recorded usage
    Dates {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },
    /// Show the pricing table
    Pricing {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },
    /// Serve the HTTP API
    #[cfg(feature = "server")]
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
    },
}

impl Commands {
    fn json_output(&self) -> bool {
        match self {
            Commands::Record { json, .. }
            | Commands::Summary { json, .. }
            | Commands::Daily { json, .. }
            | Commands::Dates { json }
            | Commands::Pricing { json } => *json,
            #[cfg(feature = "server")]
            Commands::Serve { .. } => false,
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Commands::Summary {
        date: None,
        json: false,
    });
    let json = command.json_output();

    if let Err(e) = run(cli.config, command).await {
        handle_error(e, json);
    }
}

async fn run(config_path: Option<PathBuf>, command: Commands) -> Result<()> {
    let config = Config::load(config_path.as_deref())?;
    let _guard = init_logging(&config.logging, &config.paths.log_directory)?;

    let ledger = UsageLedger::from_config(&config)?;
    let display = DisplayManager::with_pretty_json(config.output.json_pretty);

    match command {
        Commands::Record {
            model,
            operation,
            input_tokens,
            output_tokens,
            metadata,
            json,
        } => {
            let mut request = UsageRequest::new(&model, &operation, input_tokens, output_tokens);
            if !metadata.is_empty() {
                request = request.with_metadata(metadata.into_iter().collect::<Metadata>());
            }

            let breakdown = ledger.record(request).await?;
            display.display_breakdown(&model, &operation, &breakdown, json)?;

            if ledger.stats().persist_failures > 0 {
                eprintln!("⚠️  The call was priced but could not be written to the usage log");
            }
            Ok(())
        }
        Commands::Summary { date, json } => {
            let summary = ledger.get_summary_for(date.as_deref()).await?;
            display.display_summary(&summary, json)
        }
        Commands::Daily { since, until, json } => {
            let summaries = ledger
                .get_summaries(parse_date(&since)?, parse_date(&until)?)
                .await?;
            display.display_range(&summaries, json)
        }
        Commands::Dates { json } => {
            let dates = ledger.available_dates().await?;
            display.display_dates(&dates, json)
        }
        Commands::Pricing { json } => display.display_pricing(ledger.pricing(), json),
        #[cfg(feature = "server")]
        Commands::Serve { host, port } => {
            let mut server = config.server.clone();
            if let Some(host) = host {
                server.host = host;
            }
            if let Some(port) = port {
                server.port = port;
            }
            let addr = server.socket_addr()?;
            llm_usage::server::serve(std::sync::Arc::new(ledger), addr).await
        }
    }
}

/// `key=value`; the value is kept as JSON when it parses as JSON, otherwise
/// as a string.
fn parse_metadata_pair(raw: &str) -> Result<(String, serde_json::Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got {raw:?}"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("metadata key must not be empty in {raw:?}"));
    }

    let value = serde_json::from_str(value)
        .unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

fn handle_error(e: anyhow::Error, json: bool) -> ! {
    if json {
        println!("{}", serde_json::json!({ "error": format!("{e:#}") }));
    } else {
        eprintln!("❌ Error: {e:#}");
    }
    process::exit(1);
}
