// src/main.rs
use clap::Parser;
use ct_adoption::cli::Cli;
use ct_adoption::config::Config;
use ct_adoption::metrics;
use ct_adoption::probe::TlsProber;
use ct_adoption::progress::{ProgressIndicator, ProgressReporter};
use ct_adoption::report::{ReportFormat, ReportPrinter};
use ct_adoption::scanner::Dispatcher;
use ct_adoption::shutdown::CancellationController;
use ct_adoption::source::prepare_queue;
use ct_adoption::stats::{format_duration, RunStatistics};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Validate arguments
    cli.validate()?;

    // Load config file, if any, then apply CLI overrides
    let mut config = match cli.config {
        Some(ref path) => Config::from_file(Path::new(path))?,
        None => Config::default(),
    };
    cli.apply_to(&mut config);
    config.validate()?;

    // Initialize logging; stdout is reserved for progress and the report
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cli.log_level(&config)));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("Starting ct-adoption...");

    let queue = match prepare_queue(&config).await {
        Ok(queue) => Arc::new(queue),
        Err(e) => {
            eprintln!(
                "Failed to load, update, and filter the local CT cache file: {:#}",
                e
            );
            std::process::exit(1);
        }
    };

    println!(
        "beginning adoption scan of {} certificates ({} names)",
        queue.total_certificates(),
        queue.total_names()
    );

    let controller = Arc::new(CancellationController::new());
    let interrupt_listener = controller.listen_for_interrupt();

    let stats = RunStatistics::new();

    let progress_task = if cli.should_show_progress(&config) {
        let reporter = ProgressReporter::new(
            ProgressIndicator::new(true),
            stats.clone(),
            queue.total_certificates(),
            queue.total_names(),
            Duration::from_secs(config.scanner.progress_interval_secs),
        );
        Some(tokio::spawn(reporter.run(controller.progress_signal())))
    } else {
        None
    };

    let prober = Arc::new(TlsProber::new()?);
    let dispatcher = Dispatcher::new(
        prober,
        config.scanner.workers,
        Duration::from_secs(config.scanner.dial_timeout_secs),
    );

    let run = dispatcher
        .run(Arc::clone(&queue), stats.clone(), controller.subscribe())
        .await;

    // Stop the progress line before anything else is printed
    controller.halt_progress();
    if let Some(task) = progress_task {
        if let Err(e) = task.await {
            tracing::warn!("Progress task failed: {}", e);
        }
    }
    interrupt_listener.abort();

    if !run.cancelled {
        println!("\n\nscan finished, took {}", format_duration(run.elapsed.as_secs()));
    }

    let snapshot = stats.snapshot();

    let format = if cli.json {
        ReportFormat::Json
    } else {
        ReportFormat::Text
    };
    println!();
    ReportPrinter::new(format).print(&snapshot, &run)?;

    if let Some(ref path) = config.metrics.export_path {
        metrics::init_metrics()?;
        metrics::write_metrics(Path::new(path), &snapshot)?;
    }

    tracing::info!("ct-adoption finished");
    Ok(())
}
