//! # Adnexum OS entry point
//!
//! `adnexum serve` (the default) runs the CRM API; `adnexum investigate <url>`
//! submits a prospecting job and prints the finished report.

use std::process::ExitCode;

use adnexum::{
    config::{AppConfig, ConfigLoader},
    db,
    investigation::{InvestigationClient, JobStatus, render_report},
    server::run_server,
    telemetry,
};
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "adnexum", about = "Sales CRM API and prospecting tools")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API
    Serve,
    /// Investigate a business website and print the diagnosis
    Investigate {
        url: String,
        /// Include Google Maps reputation signals
        #[arg(long)]
        maps: bool,
        /// Include social media presence
        #[arg(long)]
        social: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match ConfigLoader::new().load() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Configuration error: {err}");
            return ExitCode::FAILURE;
        }
    };
    if let Err(err) = telemetry::init_tracing(&config) {
        eprintln!("Telemetry error: {err}");
        return ExitCode::FAILURE;
    }

    let outcome = match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(config).await,
        Commands::Investigate { url, maps, social } => {
            investigate(&config, &url, maps, social).await
        }
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn serve(config: AppConfig) -> anyhow::Result<()> {
    tracing::info!(profile = %config.profile, "Loaded configuration");
    if let Ok(redacted) = config.redacted_json() {
        tracing::debug!(config = %redacted, "Effective configuration");
    }

    let db = db::init_pool(&config).await?;
    db::run_migrations(&db).await?;
    run_server(config, db).await
}

async fn investigate(
    config: &AppConfig,
    url: &str,
    include_maps: bool,
    include_social: bool,
) -> anyhow::Result<()> {
    let client = InvestigationClient::new(
        config.investigation_api_base.as_str(),
        config.outbound_timeout(),
    )?;
    let job = client.start(url, include_maps, include_social).await?;
    println!("Investigación iniciada ({})", job.job_id);

    let (progress_tx, mut progress_rx) = watch::channel::<Option<JobStatus>>(None);
    let printer = tokio::spawn(async move {
        while progress_rx.changed().await.is_ok() {
            let status = progress_rx.borrow_and_update().clone();
            if let Some(status) = status {
                println!("[{:>3}%] {}", status.progress, status.current_step);
            }
        }
    });

    let shutdown = CancellationToken::new();
    let interrupt = shutdown.clone();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            interrupt.cancel();
        }
    });

    let outcome = client
        .wait(
            &job.job_id,
            config.investigation_poll_interval(),
            &progress_tx,
            shutdown,
        )
        .await;

    ctrl_c.abort();
    drop(progress_tx);
    let _ = printer.await;

    let result = outcome?;
    println!();
    print!("{}", render_report(&result));
    Ok(())
}
