//! CLI command definitions and execution
//!
//! Each subcommand lives in its own module with an `Args` struct and an
//! `execute` function returning an [`ExitCode`].

use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use sc_core::{Config, ConfigManager, ConnectionOptions, Error, ObjectStore};
use sc_s3::ClientCache;
use tracing::debug;

use crate::exit_code::ExitCode;
use crate::output::{Formatter, OutputConfig};

pub mod download;
pub mod upload;

/// s3-client - parallel chunked transfers for S3
///
/// Downloads large objects with concurrent ranged GETs and uploads large
/// files as multipart uploads. Works with AWS S3 and S3-compatible services.
#[derive(Parser, Debug)]
#[command(name = "s3-client")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output format: human-readable or JSON
    #[arg(long, global = true, default_value = "false")]
    pub json: bool,

    /// Disable colored output
    #[arg(long, global = true, default_value = "false")]
    pub no_color: bool,

    /// Disable progress bar
    #[arg(long, global = true, default_value = "false")]
    pub no_progress: bool,

    /// Suppress non-error output
    #[arg(short, long, global = true, default_value = "false")]
    pub quiet: bool,

    /// Enable debug logging
    #[arg(long, global = true, default_value = "false")]
    pub debug: bool,

    #[command(flatten)]
    pub connection: ConnectionArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Connection overrides; unset flags fall back to the config file and then
/// to the SDK's default resolution chain
#[derive(Args, Debug, Clone, Default)]
pub struct ConnectionArgs {
    /// Shared config profile to load credentials from
    #[arg(long, global = true)]
    pub profile: Option<String>,

    /// Region of the bucket
    #[arg(long, global = true)]
    pub region: Option<String>,

    /// Custom endpoint URL for S3-compatible services
    #[arg(long, global = true)]
    pub endpoint: Option<String>,

    /// Use path-style bucket addressing
    #[arg(long, global = true, default_value = "false")]
    pub path_style: bool,
}

impl From<&ConnectionArgs> for ConnectionOptions {
    fn from(args: &ConnectionArgs) -> Self {
        ConnectionOptions {
            profile: args.profile.clone(),
            region: args.region.clone(),
            endpoint: args.endpoint.clone(),
            path_style: args.path_style,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Download an object using parallel ranged requests
    #[command(visible_alias = "dl")]
    Download(download::DownloadArgs),

    /// Upload a local file, using multipart for large files
    #[command(visible_alias = "up")]
    Upload(upload::UploadArgs),
}

/// Shared state for one command invocation
pub struct CommandContext {
    pub formatter: Formatter,
    pub config: Config,
    pub connection: ConnectionOptions,
    clients: ClientCache,
}

impl CommandContext {
    /// Connected storage client for the resolved connection options
    pub async fn store(&self) -> Result<Arc<dyn ObjectStore>, ExitCode> {
        match self.clients.get_or_connect(&self.connection).await {
            Ok(client) => Ok(client as Arc<dyn ObjectStore>),
            Err(e) => Err(report_failure(
                &self.formatter,
                "Failed to create S3 client",
                &e,
            )),
        }
    }
}

/// Execute the CLI command and return an exit code
pub async fn execute(cli: Cli) -> ExitCode {
    let config = match ConfigManager::new().and_then(|manager| manager.load()) {
        Ok(config) => config,
        Err(e) => {
            let formatter = Formatter::new(OutputConfig {
                json: cli.json,
                no_color: cli.no_color,
                ..Default::default()
            });
            return report_failure(&formatter, "Failed to load configuration", &e);
        }
    };

    if config.defaults.color == "always" && !cli.no_color {
        console::set_colors_enabled(true);
        console::set_colors_enabled_stderr(true);
    }

    let output_config = OutputConfig {
        json: cli.json || config.defaults.output == "json",
        no_color: cli.no_color || config.defaults.color == "never",
        no_progress: cli.no_progress || !config.defaults.progress,
        quiet: cli.quiet,
    };
    let formatter = Formatter::new(output_config);

    let connection = config
        .connection
        .clone()
        .merge(ConnectionOptions::from(&cli.connection));
    if let Err(e) = connection.validate() {
        return report_failure(&formatter, "Invalid connection settings", &e);
    }
    debug!(connection = ?connection, transfer = ?config.transfer, "resolved settings");

    let ctx = CommandContext {
        formatter,
        config,
        connection,
        clients: ClientCache::new(),
    };

    match cli.command {
        Commands::Download(args) => download::execute(args, &ctx).await,
        Commands::Upload(args) => upload::execute(args, &ctx).await,
    }
}

/// Print an error with an optional remediation hint and map it to an exit code
pub fn report_failure(formatter: &Formatter, context: &str, error: &Error) -> ExitCode {
    formatter.error(&format!("{context}: {error}"));
    if let Some(hint) = failure_hint(error) {
        formatter.hint(hint);
    }
    let code = ExitCode::from(error);
    debug!(exit_code = %code, cause = ?error.root(), "command failed");
    code
}

/// Remediation advice for common service failures
pub fn failure_hint(error: &Error) -> Option<&'static str> {
    match error.root() {
        Error::Auth(_) => {
            Some("the credentials in use lack permission for this bucket or key; check --profile")
        }
        Error::NotFound(_) => Some("check the bucket name and object key"),
        Error::Conflict(_) => Some("the object changed on the server; re-run the transfer"),
        Error::Unsupported(_) => {
            Some("the storage backend does not support this request; try without --multipart")
        }
        Error::Network(message) if message.contains("HTTP 400") => {
            Some("the bucket may be in a different region; try --region")
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_download_with_alias() {
        let cli = Cli::try_parse_from([
            "s3-client",
            "dl",
            "s3://bucket/big.iso",
            "-o",
            "/tmp/big.iso",
            "--chunk-size",
            "16",
            "--concurrency",
            "8",
            "--abort-on-failure",
        ])
        .unwrap();

        match cli.command {
            Commands::Download(args) => {
                assert_eq!(args.source, "s3://bucket/big.iso");
                assert_eq!(args.output.unwrap().to_str(), Some("/tmp/big.iso"));
                assert_eq!(args.chunk_size, Some(16));
                assert_eq!(args.concurrency, Some(8));
                assert!(args.abort_on_failure);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_upload_with_global_flags() {
        let cli = Cli::try_parse_from([
            "s3-client",
            "up",
            "./backup.tar",
            "s3://bucket/archive/",
            "--multipart",
            "--part-size",
            "64",
            "--metadata",
            "owner=ops,tier=cold",
            "--region",
            "eu-west-1",
            "--endpoint",
            "http://localhost:9000",
            "--path-style",
            "--json",
        ])
        .unwrap();

        assert!(cli.json);
        assert_eq!(cli.connection.region.as_deref(), Some("eu-west-1"));
        assert!(cli.connection.path_style);
        match cli.command {
            Commands::Upload(args) => {
                assert_eq!(args.target, "s3://bucket/archive/");
                assert!(args.multipart);
                assert_eq!(args.part_size, Some(64));
                let metadata = args.metadata.unwrap();
                assert_eq!(metadata.get("owner").map(String::as_str), Some("ops"));
                assert_eq!(metadata.get("tier").map(String::as_str), Some("cold"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_rejects_conflicting_content_type_flags() {
        let result = Cli::try_parse_from([
            "s3-client",
            "upload",
            "a.txt",
            "s3://bucket/a.txt",
            "--content-type",
            "text/plain",
            "--no-guess-content-type",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_connection_args_into_options() {
        let args = ConnectionArgs {
            profile: Some("prod".into()),
            region: Some("us-east-2".into()),
            endpoint: None,
            path_style: false,
        };
        let options = ConnectionOptions::from(&args);
        assert_eq!(options.cache_key(), "prod|us-east-2|");
    }

    #[test]
    fn test_failure_hints() {
        let denied = Error::session(
            sc_core::SessionStage::Create,
            Error::Auth("s3://b/k: AccessDenied".into()),
        );
        assert!(failure_hint(&denied).unwrap().contains("permission"));

        let missing = Error::planning(Error::NotFound("s3://b/k: NoSuchKey".into()));
        assert!(failure_hint(&missing).unwrap().contains("object key"));

        let wrong_region = Error::Network(
            "s3://b/k: AuthorizationHeaderMalformed (HTTP 400): region mismatch".into(),
        );
        assert!(failure_hint(&wrong_region).unwrap().contains("--region"));

        let no_multipart = Error::session(
            sc_core::SessionStage::Create,
            Error::Unsupported("s3://b/k: NotImplemented".into()),
        );
        assert!(failure_hint(&no_multipart).unwrap().contains("--multipart"));

        assert!(failure_hint(&Error::Network("timed out".into())).is_none());
    }
}
