//! copy command - Copy a file or directory to or from S3
//!
//! Exactly one of `--src` and `--dst` must be an `s3://<bucket>/<key>`
//! location. Directory sources are uploaded file by file.

use std::time::Duration;

use bcp_core::{
    ConfigManager, Copier, CopyEvent, CopyOutcome, CopyReport, CopyRequest, Direction,
    KeyLayout, TransferRecord, classify, validate_local_source,
};
use bcp_s3::S3Client;
use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;

use crate::exit_code::ExitCode;
use crate::output::{Formatter, OutputConfig};

/// Copy a file or directory between the local filesystem and S3
#[derive(Args, Debug)]
pub struct CopyArgs {
    /// Path to copy from. Example: path/to/copyfrom
    #[arg(long)]
    pub src: String,

    /// Path to copy to. Example: s3://<bucket>/path/to/copyto
    #[arg(long)]
    pub dst: String,

    /// Parts transferred in parallel per file (0 = default)
    #[arg(short = 'p', long, default_value = "0")]
    pub parallel: usize,

    /// Part size in bytes (0 = default)
    #[arg(short = 'b', long = "buffer-size", default_value = "0")]
    pub buffer_size: u64,

    /// Keep sub-directory structure in keys when uploading a directory
    #[arg(long)]
    pub preserve_paths: bool,

    /// Region override
    #[arg(long, env = "AWS_REGION", hide_env_values = true)]
    pub region: Option<String>,

    /// Custom endpoint for S3-compatible services
    #[arg(long, env = "AWS_ENDPOINT_URL", hide_env_values = true)]
    pub endpoint_url: Option<String>,

    /// Use path-style addressing (required by most S3-compatible services)
    #[arg(long)]
    pub path_style: bool,
}

#[derive(Debug, Serialize)]
struct CopyOutput {
    source: String,
    destination: String,
    direction: Direction,
    outcome: CopyOutcome,
    files: usize,
    total_bytes: u64,
    total_size_human: String,
    elapsed_ms: u64,
    transfers: Vec<TransferRecord>,
}

impl CopyOutput {
    fn new(request: &CopyRequest, report: CopyReport) -> Self {
        let total_bytes = report.total_bytes();
        Self {
            source: request.source.clone(),
            destination: request.destination.clone(),
            direction: report.direction,
            outcome: report.outcome,
            files: report.transfers.len(),
            total_bytes,
            total_size_human: humansize::format_size(total_bytes, humansize::BINARY),
            elapsed_ms: report.elapsed_ms,
            transfers: report.transfers,
        }
    }
}

/// Execute the copy command
pub async fn execute(args: CopyArgs, output_config: OutputConfig) -> ExitCode {
    let formatter = Formatter::new(output_config);

    // Location errors and a missing source need neither config nor credentials
    let checked = classify(&args.src, &args.dst).and_then(|plan| match plan.direction {
        Direction::Upload => validate_local_source(&plan.local).map(|_| ()),
        Direction::Download => Ok(()),
    });
    if let Err(e) = checked {
        formatter.error(&e.to_string());
        return ExitCode::from_error(&e);
    }

    let config = match load_config(&args) {
        Ok(c) => c,
        Err(e) => {
            formatter.error(&format!("Failed to load configuration: {e}"));
            return ExitCode::from_error(&e);
        }
    };

    let client = match S3Client::new(&config).await {
        Ok(c) => c,
        Err(e) => {
            formatter.error(&format!("Failed to create S3 client: {e}"));
            return ExitCode::from_error(&e);
        }
    };

    let request = CopyRequest::new(&args.src, &args.dst)
        .concurrency(if args.parallel > 0 {
            args.parallel
        } else {
            config.parallel
        })
        .part_size(if args.buffer_size > 0 {
            args.buffer_size
        } else {
            config.part_size
        });

    let layout = if args.preserve_paths {
        KeyLayout::Preserve
    } else {
        KeyLayout::Flatten
    };

    let progress = formatter.shows_progress().then(|| {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} {msg}")
                .expect("Valid template"),
        );
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    });

    let copier = Copier::new(client)
        .with_layout(layout)
        .with_observer(observer(formatter.clone(), progress.clone()));

    let result = copier.copy(&request).await;

    if let Some(pb) = &progress {
        pb.finish_and_clear();
    }

    match result {
        Ok(report) => {
            print_report(&formatter, CopyOutput::new(&request, report));
            ExitCode::Success
        }
        Err(e) => {
            formatter.error(&format!("Copy failed: {e}"));
            ExitCode::from_error(&e)
        }
    }
}

/// Resolve configuration: file and environment first, then flags
fn load_config(args: &CopyArgs) -> bcp_core::Result<bcp_core::Config> {
    let mut config = ConfigManager::new()?.load()?;

    if let Some(region) = &args.region {
        config.region = region.clone();
    }
    if let Some(endpoint) = &args.endpoint_url {
        config.endpoint = Some(endpoint.clone());
    }
    if args.path_style {
        config.force_path_style = true;
    }

    config.validate()?;
    tracing::debug!(
        region = %config.region,
        endpoint = ?config.endpoint,
        force_path_style = config.force_path_style,
        "Resolved configuration"
    );
    Ok(config)
}

/// Turn copy events into progress messages and per-file lines
fn observer(
    formatter: Formatter,
    progress: Option<ProgressBar>,
) -> impl Fn(&CopyEvent<'_>) + Send + Sync + 'static {
    move |event: &CopyEvent<'_>| {
        let print = |f: &dyn Fn()| match &progress {
            Some(pb) => pb.suspend(f),
            None => f(),
        };

        match event {
            CopyEvent::Started { source, .. } => {
                if let Some(pb) = &progress {
                    pb.set_message(format!("Copying {source}"));
                }
            }
            CopyEvent::Finished(record) => {
                if !formatter.is_json() {
                    print(&|| {
                        formatter.println(&format!("+ {}", formatter.style_name(&record.target)))
                    });
                }
            }
            CopyEvent::KeyCollision {
                target,
                previous,
                file,
            } => {
                print(&|| {
                    formatter.warning(&format!(
                        "{} overwrites {} at {target}",
                        file.display(),
                        previous.display()
                    ))
                });
            }
            // Reported once in the summary
            CopyEvent::ObjectNotFound(_) => {}
        }
    }
}

fn print_report(formatter: &Formatter, output: CopyOutput) {
    if formatter.is_json() {
        formatter.json(&output);
        return;
    }

    let elapsed = formatter.style_elapsed(&format_elapsed(output.elapsed_ms));
    let size = formatter.style_size(&output.total_size_human);

    match (output.outcome, output.direction) {
        (CopyOutcome::ObjectNotFound, _) => {
            formatter.warning(&format!(
                "Object {} does not exist; nothing was downloaded",
                output.source
            ));
        }
        (CopyOutcome::Completed, Direction::Upload) => {
            let noun = if output.files == 1 { "file" } else { "files" };
            formatter.success(&format!(
                "Uploaded {} {noun} ({size}) in {elapsed}",
                output.files
            ));
        }
        (CopyOutcome::Completed, Direction::Download) => {
            formatter.success(&format!("Downloaded {size} in {elapsed}"));
        }
    }
}

/// Human-readable duration: `850ms`, `12.3s`, `2m05s`
fn format_elapsed(ms: u64) -> String {
    if ms < 1000 {
        format!("{ms}ms")
    } else if ms < 60_000 {
        format!("{:.1}s", ms as f64 / 1000.0)
    } else {
        let secs = ms / 1000;
        format!("{}m{:02}s", secs / 60, secs % 60)
    }
}
