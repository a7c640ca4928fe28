//! upload command - Send a local file to S3
//!
//! Files larger than one part (or any non-empty file with `--multipart`) go
//! up as a multipart upload; everything else is a single PUT.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use clap::Args;
use sc_core::{
    MAX_PARTS, ObjectMetadata, UploadReport, UploadRequest, fit_part_size, parse_s3_uri, run_upload,
};
use serde::Serialize;

use super::{CommandContext, report_failure};
use crate::exit_code::ExitCode;
use crate::output::{TransferProgress, average_speed, format_duration, format_size};

const MIB: u64 = 1024 * 1024;

/// Upload a local file
#[derive(Args, Debug)]
pub struct UploadArgs {
    /// Local file to upload
    pub source: PathBuf,

    /// Destination (s3://bucket/key, or s3://bucket/prefix/ to keep the file name)
    pub target: String,

    /// Use a multipart upload even for files that fit in one part
    #[arg(long)]
    pub multipart: bool,

    /// Part size in MiB
    #[arg(long)]
    pub part_size: Option<u64>,

    /// User metadata as comma-separated key=value pairs
    #[arg(long, value_parser = parse_metadata)]
    pub metadata: Option<BTreeMap<String, String>>,

    /// Content type (guessed from the file extension when omitted)
    #[arg(long)]
    pub content_type: Option<String>,

    /// Do not guess the content type from the file extension
    #[arg(long, conflicts_with = "content_type")]
    pub no_guess_content_type: bool,
}

#[derive(Debug, Serialize)]
struct UploadOutput {
    status: &'static str,
    source: String,
    target: String,
    size_bytes: u64,
    size_human: String,
    parts: usize,
    multipart: bool,
    elapsed_ms: u128,
    avg_bytes_per_sec: u64,
}

/// Parse `k1=v1,k2=v2` into a metadata map
fn parse_metadata(value: &str) -> Result<BTreeMap<String, String>, String> {
    let mut metadata = BTreeMap::new();
    for pair in value.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let (key, val) = pair
            .split_once('=')
            .ok_or_else(|| format!("expected key=value, got '{pair}'"))?;
        let key = key.trim();
        if key.is_empty() {
            return Err(format!("empty metadata key in '{pair}'"));
        }
        metadata.insert(key.to_string(), val.trim().to_string());
    }
    Ok(metadata)
}

/// Explicit content type, or a guess from the file extension
fn resolve_content_type(source: &Path, explicit: Option<&str>, guess: bool) -> Option<String> {
    match explicit {
        Some(content_type) => Some(content_type.to_string()),
        None if guess => mime_guess::from_path(source)
            .first()
            .map(|mime| mime.essence_str().to_string()),
        None => None,
    }
}

/// Execute the upload command
pub async fn execute(args: UploadArgs, ctx: &CommandContext) -> ExitCode {
    let formatter = &ctx.formatter;

    let target = match parse_s3_uri(&args.target) {
        Ok(uri) => uri,
        Err(e) => {
            formatter.error(&format!("Invalid target: {e}"));
            return ExitCode::UsageError;
        }
    };

    let source_display = args.source.display().to_string();
    let size = match std::fs::metadata(&args.source) {
        Ok(meta) if meta.is_dir() => {
            formatter.error(&format!(
                "{source_display} is a directory; only single files can be uploaded"
            ));
            return ExitCode::UsageError;
        }
        Ok(meta) => meta.len(),
        Err(_) => {
            formatter.error(&format!("Source not found: {source_display}"));
            return ExitCode::NotFound;
        }
    };

    let requested = args
        .part_size
        .unwrap_or(ctx.config.transfer.part_size_mb)
        .saturating_mul(MIB);
    if requested == 0 {
        formatter.error("Part size must be greater than zero");
        return ExitCode::UsageError;
    }
    let part_size = fit_part_size(size, requested);
    if part_size != requested {
        formatter.warning(&format!(
            "Part size raised to {} to stay within {MAX_PARTS} parts",
            format_size(part_size)
        ));
    }

    let key = target.resolve_key(&args.source);
    let destination = format!("s3://{}/{key}", target.bucket);
    let request = UploadRequest {
        source: args.source.clone(),
        bucket: target.bucket.clone(),
        key,
        part_size,
        force_multipart: args.multipart,
        metadata: ObjectMetadata {
            content_type: resolve_content_type(
                &args.source,
                args.content_type.as_deref(),
                !args.no_guess_content_type,
            ),
            user: args.metadata.unwrap_or_default(),
        },
    };

    let store = match ctx.store().await {
        Ok(store) => store,
        Err(code) => return code,
    };

    let progress = TransferProgress::new(formatter.config(), size, "upload");
    let result = run_upload(store, &request, progress.callback()).await;
    progress.finish_and_clear();

    match result {
        Ok(report) => {
            print_report(ctx, &source_display, &destination, &report);
            ExitCode::Success
        }
        Err(e) => report_failure(formatter, &format!("Failed to upload {source_display}"), &e),
    }
}

fn print_report(ctx: &CommandContext, source: &str, target: &str, report: &UploadReport) {
    let formatter = &ctx.formatter;
    if formatter.is_json() {
        formatter.json(&UploadOutput {
            status: "success",
            source: source.to_string(),
            target: target.to_string(),
            size_bytes: report.total_bytes,
            size_human: format_size(report.total_bytes),
            parts: report.parts,
            multipart: report.multipart,
            elapsed_ms: report.elapsed.as_millis(),
            avg_bytes_per_sec: average_speed(report.total_bytes, report.elapsed),
        });
    } else {
        let mode = if report.multipart {
            format!("{} parts", report.parts)
        } else {
            "single request".to_string()
        };
        formatter.success(&format!(
            "{source} -> {target} ({} in {}, {}/s avg, {mode})",
            format_size(report.total_bytes),
            format_duration(report.elapsed),
            format_size(average_speed(report.total_bytes, report.elapsed))
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_metadata_pairs() {
        let metadata = parse_metadata("owner=ops, tier = cold,empty=").unwrap();
        assert_eq!(metadata.len(), 3);
        assert_eq!(metadata["owner"], "ops");
        assert_eq!(metadata["tier"], "cold");
        assert_eq!(metadata["empty"], "");
    }

    #[test]
    fn test_parse_metadata_value_may_contain_equals() {
        let metadata = parse_metadata("query=a=b").unwrap();
        assert_eq!(metadata["query"], "a=b");
    }

    #[test]
    fn test_parse_metadata_rejects_malformed() {
        assert!(parse_metadata("novalue").is_err());
        assert!(parse_metadata("=value").is_err());
    }

    #[test]
    fn test_content_type_resolution() {
        let path = Path::new("report.json");
        assert_eq!(
            resolve_content_type(path, None, true).as_deref(),
            Some("application/json")
        );
        assert_eq!(
            resolve_content_type(path, Some("text/plain"), true).as_deref(),
            Some("text/plain")
        );
        assert_eq!(resolve_content_type(path, None, false), None);
        assert_eq!(
            resolve_content_type(Path::new("no-extension"), None, true),
            None
        );
    }
}
