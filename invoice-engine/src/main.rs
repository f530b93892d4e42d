//! Invoice engine entry point.
//!
//! ```bash
//! invoice-engine generate --request account.json
//! invoice-engine generate --request account.json --today 2012-05-01
//! invoice-engine generate --request account.json --metrics-file /var/lib/node_exporter/invoice.prom
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use invoice_engine::config::InvoiceEngineConfig;
use invoice_engine::generator::DefaultInvoiceGenerator;
use invoice_engine::request::GenerationRequest;
use invoice_engine::services::{get_metrics, init_metrics, Clock, FixedClock, SystemClock};
use service_core::error::AppError;
use service_core::observability::init_tracing;

#[derive(Parser)]
#[command(name = "invoice-engine")]
#[command(version)]
#[command(about = "Invoice generation engine", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a dry-run generation and print the result as JSON
    Generate {
        /// Path to the JSON request
        #[arg(long, short, env = "INVOICE_REQUEST")]
        request: PathBuf,

        /// Date to treat as today (YYYY-MM-DD)
        #[arg(long, env = "INVOICE_TODAY")]
        today: Option<NaiveDate>,

        /// Write run metrics in Prometheus text format to this file
        #[arg(long, env = "INVOICE_METRICS_FILE")]
        metrics_file: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "invoice-engine failed");
            eprintln!("{e}");
            std::process::ExitCode::from(u8::try_from(e.exit_code()).unwrap_or(1))
        }
    }
}

async fn run(cli: Cli) -> Result<(), AppError> {
    let config = InvoiceEngineConfig::from_env()?;
    init_tracing(
        &config.service_name,
        &config.log_level,
        config.otlp_endpoint.as_deref(),
    )?;
    init_metrics();

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        max_months_in_future = config.invoice.max_months_in_future,
        usage_detail_mode = ?config.invoice.usage_detail_mode,
        "Starting invoice-engine"
    );

    match cli.command {
        Commands::Generate {
            request,
            today,
            metrics_file,
        } => {
            let json = tokio::fs::read_to_string(&request).await?;
            let request = GenerationRequest::from_json(&json)?;

            let clock: Arc<dyn Clock> = match today {
                Some(date) => Arc::new(FixedClock::on(date)),
                None => Arc::new(SystemClock),
            };
            let generator =
                DefaultInvoiceGenerator::new(config.invoice, clock, Arc::new(request.usage_store()));
            let result = request.generate(&generator);

            if let Some(path) = metrics_file {
                tokio::fs::write(&path, get_metrics()).await?;
                tracing::debug!(path = %path.display(), "Metrics written");
            }
            println!("{}", serde_json::to_string_pretty(&result?)?);
        }
    }
    Ok(())
}
