//! Run command - feed a request stream through the writers
//!
//! ```text
//! stdin/--input --> parse --> Multee --+--> WriterController --> gzip files --> archive dir
//!                                      +--> StreamWriter (one per stream config)
//! rotation ticker ------> rotate()
//! EOF / SIGINT / SIGTERM --> close()
//! ```

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use flate2::Compression;
use tokio::fs::File;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::signal;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use spillway_config::Config;
use spillway_metrics::{MetricsReporter, WriterMetricsProvider};
use spillway_sinks::util::RateLimitedLogger;
use spillway_sinks::{
    BulkPutClient, CompressorPool, DirectoryUploader, EventFilters, FileWriterSettings, Multee,
    NullBulkPutClient, RotatingFileWriterFactory, StreamWriter, TracingReporter, Uploader, Writer,
    WriterController,
};

use crate::cmd::load_config;
use crate::input::parse_line;

/// Run command arguments
#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// Read requests from this file instead of stdin
    #[arg(short, long)]
    pub input: Option<PathBuf>,
}

/// Run the run command
pub async fn run(args: RunArgs, config_path: Option<&Path>) -> Result<()> {
    let config_name = config_path
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "(default)".to_string());
    info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %config_name,
        "spillway starting"
    );
    let config = load_config(config_path)?;

    let summary = match &args.input {
        Some(path) => {
            let file = File::open(path)
                .await
                .with_context(|| format!("failed to open input {}", path.display()))?;
            run_pipeline(config, BufReader::new(file), wait_for_shutdown()).await
        }
        None => run_pipeline(config, BufReader::new(tokio::io::stdin()), wait_for_shutdown()).await,
    };

    match summary {
        Ok(summary) => {
            info!(
                requests = summary.requests,
                invalid = summary.invalid,
                rotations = summary.rotations,
                "spillway shutdown complete"
            );
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "spillway failed");
            Err(e)
        }
    }
}

/// Counts from one run
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    /// Requests handed to the writers
    pub requests: u64,
    /// Lines that did not parse
    pub invalid: u64,
    pub rotations: u64,
}

/// Filters available to stream configs
pub fn event_filters() -> EventFilters {
    EventFilters::new()
}

/// Writer tree plus every metrics handle in it
struct Pipeline {
    writer: Multee,
    handles: Vec<Arc<dyn WriterMetricsProvider>>,
}

/// Build the controller (category + non-tracked file writers) and one
/// stream writer per stream config, behind a multee
fn build(config: &Config, client: Arc<dyn BulkPutClient>) -> Result<Pipeline> {
    let filters = event_filters();
    let mut handles: Vec<Arc<dyn WriterMetricsProvider>> = Vec::new();

    // streams first: a bad stream config fails before any file is touched
    let mut streams: Vec<Box<dyn Writer>> = Vec::with_capacity(config.stream_writers.len());
    for stream in &config.stream_writers {
        let writer = StreamWriter::new(stream.clone(), Arc::clone(&client), &filters)
            .with_context(|| format!("failed to start stream writer '{}'", stream.stream_name))?;
        info!(
            stream = %writer.stream_name(),
            events = stream.events.len(),
            "stream writer started"
        );
        handles.extend(writer.metrics_handles());
        streams.push(Box::new(writer));
    }

    let files = &config.files;
    let uploader: Arc<dyn Uploader> = Arc::new(DirectoryUploader::new(&files.archive_dir));
    let pool = Arc::new(CompressorPool::new(
        files.compressor_pool_size,
        Compression::default(),
    ));
    let settings = FileWriterSettings {
        spool_dir: files.spool_dir.clone(),
        file_type: files.file_type,
        conditions: files.rotate,
        uploader,
        pool: Arc::clone(&pool),
    };
    let non_tracked_settings = FileWriterSettings {
        conditions: config.non_tracked.rotate,
        ..settings.clone()
    };

    let category_files = Arc::new(RotatingFileWriterFactory::new("files", settings));
    let non_tracked_files =
        Arc::new(RotatingFileWriterFactory::new("non_tracked", non_tracked_settings));
    let reporter = Arc::new(TracingReporter::new());

    handles.push(Arc::new(category_files.metrics_handle()));
    handles.push(Arc::new(non_tracked_files.metrics_handle()));
    handles.push(Arc::new(pool.metrics_handle()));
    handles.push(Arc::new(reporter.metrics_handle()));

    let controller = WriterController::new(
        &config.controller,
        category_files,
        non_tracked_files,
        config.non_tracked.category.clone(),
        reporter,
    );
    handles.push(Arc::new(controller.metrics_handle()));
    info!(
        spool_dir = %files.spool_dir.display(),
        archive_dir = %files.archive_dir.display(),
        file_type = files.file_type.as_str(),
        streams = streams.len(),
        "writers ready"
    );

    let mut targets: Vec<Box<dyn Writer>> = vec![Box::new(controller)];
    targets.extend(streams);

    Ok(Pipeline {
        writer: Multee::new(targets),
        handles,
    })
}

/// Feed every request from `input` to the writers, rotating on the
/// configured interval, then close everything at EOF or once `shutdown`
/// resolves
pub async fn run_pipeline<R, S>(config: Config, input: R, shutdown: S) -> Result<RunSummary>
where
    R: AsyncBufRead + Unpin,
    S: Future<Output = ()>,
{
    run_pipeline_with_client(config, input, shutdown, Arc::new(NullBulkPutClient)).await
}

async fn run_pipeline_with_client<R, S>(
    config: Config,
    input: R,
    shutdown: S,
    client: Arc<dyn BulkPutClient>,
) -> Result<RunSummary>
where
    R: AsyncBufRead + Unpin,
    S: Future<Output = ()>,
{
    let Pipeline { mut writer, handles } = build(&config, client)?;

    let cancel = CancellationToken::new();
    let reporter = MetricsReporter::new(config.metrics.clone(), handles);
    let metrics_task = tokio::spawn(reporter.run(cancel.clone()));

    let mut rotation = interval(config.rotation.interval);
    rotation.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // first tick completes immediately
    rotation.tick().await;

    let invalid_log = RateLimitedLogger::with_default_interval("skipping invalid request line");
    let mut lines = input.lines();
    let mut summary = RunSummary::default();
    tokio::pin!(shutdown);

    let result: Result<()> = loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("shutdown signal received");
                break Ok(());
            }
            _ = rotation.tick() => {
                match writer.rotate().await {
                    Ok(fully_rotated) => {
                        summary.rotations += 1;
                        tracing::debug!(fully_rotated, "rotation pass finished");
                    }
                    Err(e) => warn!(error = %e, "rotation failed"),
                }
            }
            line = lines.next_line() => match line {
                Ok(Some(line)) => match parse_line(&line) {
                    Ok(Some(req)) => {
                        if let Err(e) = writer.write(Arc::new(req)).await {
                            break Err(anyhow::Error::new(e).context("write failed"));
                        }
                        summary.requests += 1;
                    }
                    Ok(None) => {}
                    Err(e) => {
                        summary.invalid += 1;
                        invalid_log.warn(&format!("{:#}", e));
                    }
                },
                Ok(None) => {
                    info!("end of input");
                    break Ok(());
                }
                Err(e) => break Err(anyhow::Error::new(e).context("failed to read input")),
            },
        }
    };

    info!("closing writers");
    let closed = Box::new(writer).close().await;

    cancel.cancel();
    if let Err(e) = metrics_task.await {
        warn!(error = %e, "metrics reporter task failed");
    }

    result?;
    closed.context("failed to close writers")?;
    Ok(summary)
}

/// Resolves on SIGINT or SIGTERM
///
/// A handler that cannot be installed is logged and never fires.
async fn wait_for_shutdown() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[cfg(test)]
#[path = "run_test.rs"]
mod run_test;
