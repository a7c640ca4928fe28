//! download command - Fetch an object with parallel ranged requests
//!
//! The object is split into fixed-size chunks that are fetched concurrently
//! and written at their offsets into a pre-sized local file.

use std::path::{Path, PathBuf};

use clap::Args;
use sc_core::{
    DownloadReport, DownloadRequest, Error, FailurePolicy, S3Uri, parse_s3_uri, run_download,
};
use serde::Serialize;

use super::{CommandContext, report_failure};
use crate::exit_code::ExitCode;
use crate::output::{TransferProgress, average_speed, format_duration, format_size};

const MIB: u64 = 1024 * 1024;

/// Download an object
#[derive(Args, Debug)]
pub struct DownloadArgs {
    /// Source object (s3://bucket/key)
    pub source: String,

    /// Destination file or directory (default: the object's file name)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Chunk size in MiB
    #[arg(long)]
    pub chunk_size: Option<u64>,

    /// Number of chunks fetched in parallel
    #[arg(short, long)]
    pub concurrency: Option<usize>,

    /// Stop starting new chunks once any chunk has failed
    #[arg(long)]
    pub abort_on_failure: bool,
}

#[derive(Debug, Serialize)]
struct DownloadOutput {
    status: &'static str,
    source: String,
    target: String,
    size_bytes: u64,
    size_human: String,
    chunks: usize,
    elapsed_ms: u128,
    avg_bytes_per_sec: u64,
}

/// Execute the download command
pub async fn execute(args: DownloadArgs, ctx: &CommandContext) -> ExitCode {
    let formatter = &ctx.formatter;

    let source = match parse_s3_uri(&args.source) {
        Ok(uri) => uri,
        Err(e) => {
            formatter.error(&format!("Invalid source: {e}"));
            return ExitCode::UsageError;
        }
    };
    if source.is_prefix() {
        formatter.error(&format!(
            "Source must name an object, not a prefix: {source}"
        ));
        return ExitCode::UsageError;
    }

    let transfer = &ctx.config.transfer;
    let request = DownloadRequest {
        bucket: source.bucket.clone(),
        key: source.key.clone(),
        destination: destination_path(&source, args.output.as_deref()),
        chunk_size: args
            .chunk_size
            .unwrap_or(transfer.chunk_size_mb)
            .saturating_mul(MIB),
        concurrency: args.concurrency.unwrap_or(transfer.concurrency),
        failure_policy: if args.abort_on_failure {
            FailurePolicy::AbortAll
        } else {
            transfer.failure_policy
        },
    };

    let store = match ctx.store().await {
        Ok(store) => store,
        Err(code) => return code,
    };

    let progress = TransferProgress::new(formatter.config(), 0, "download");
    let result = run_download(store, &request, progress.callback()).await;
    progress.finish_and_clear();

    let target = request.destination.display().to_string();
    match result {
        Ok(report) => {
            print_report(ctx, &source, &target, &report);
            ExitCode::Success
        }
        Err(e) => {
            let code = report_failure(formatter, &format!("Failed to download {source}"), &e);
            if matches!(e, Error::PieceTransfer { .. } | Error::Write { .. }) {
                formatter.warning(&format!(
                    "{target} is incomplete; re-run the download to retry"
                ));
            }
            code
        }
    }
}

/// Local path for the downloaded object
///
/// An existing directory, or no path at all, gets the object's file name.
fn destination_path(source: &S3Uri, output: Option<&Path>) -> PathBuf {
    match output {
        Some(path) if path.is_dir() => path.join(source.base_name()),
        Some(path) => path.to_path_buf(),
        None => PathBuf::from(source.base_name()),
    }
}

fn print_report(ctx: &CommandContext, source: &S3Uri, target: &str, report: &DownloadReport) {
    let formatter = &ctx.formatter;
    if formatter.is_json() {
        formatter.json(&DownloadOutput {
            status: "success",
            source: source.to_string(),
            target: target.to_string(),
            size_bytes: report.total_bytes,
            size_human: format_size(report.total_bytes),
            chunks: report.pieces,
            elapsed_ms: report.elapsed.as_millis(),
            avg_bytes_per_sec: average_speed(report.total_bytes, report.elapsed),
        });
    } else {
        formatter.success(&format!(
            "{source} -> {target} ({} in {}, {}/s avg, {} chunks)",
            format_size(report.total_bytes),
            format_duration(report.elapsed),
            format_size(average_speed(report.total_bytes, report.elapsed)),
            report.pieces
        ));
    }
}
