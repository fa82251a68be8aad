//! Command parsing.

use anyhow::{format_err, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::{
    convert::Infallible,
    io::{self, Write},
    sync::Arc,
};
use ugcs::{
    config::SERVICE_ACCOUNT_FILE_VAR, logging::LogFormat, parse_gs_url, Bucket,
    CredentialsSource, ServiceAccountCredentials, TokenProvider,
};
use url::Url;

pub(crate) mod delete;
pub(crate) mod get;
pub(crate) mod get_metadata;
pub(crate) mod list;
pub(crate) mod put;

/// Help text describing remote locations.
const EXAMPLE_URLS: &str = r#"EXAMPLE URLS:
    gs://bucket/path/to/object.txt
    gs://bucket/path/to/prefix
"#;

/// Command-line options, parsed using `clap`.
#[derive(Debug, Parser)]
#[command(
    name = "ugcs",
    version,
    about = "Read and write Google Cloud Storage objects using a service account."
)]
pub(crate) struct Opt {
    /// A service account key file, or the key's JSON itself.
    #[arg(
        long = "service-account-file",
        env = SERVICE_ACCOUNT_FILE_VAR,
        hide_env_values = true,
        value_parser = parse_credentials_source,
    )]
    pub(crate) service_account_file: CredentialsSource,

    /// Log format (indented, flat, json). Use RUST_LOG to choose what to log.
    #[arg(long = "log-format", default_value = "flat")]
    pub(crate) log_format: LogFormat,

    /// The command to run.
    #[command(subcommand)]
    pub(crate) cmd: Command,
}

/// The command to run.
#[derive(Debug, Subcommand)]
pub(crate) enum Command {
    /// List objects in a bucket.
    #[command(after_help = EXAMPLE_URLS)]
    List {
        #[command(flatten)]
        command: list::Opt,
    },

    /// Upload a local file.
    #[command(after_help = EXAMPLE_URLS)]
    Put {
        #[command(flatten)]
        command: put::Opt,
    },

    /// Download an object to standard output.
    #[command(after_help = EXAMPLE_URLS)]
    Get {
        #[command(flatten)]
        command: get::Opt,
    },

    /// Print an object's metadata.
    #[command(after_help = EXAMPLE_URLS)]
    GetMetadata {
        #[command(flatten)]
        command: get_metadata::Opt,
    },

    /// Delete an object.
    #[command(after_help = EXAMPLE_URLS)]
    Delete {
        #[command(flatten)]
        command: delete::Opt,
    },
}

/// Keep `--service-account-file` redacted in our `Debug` output.
fn parse_credentials_source(s: &str) -> Result<CredentialsSource, Infallible> {
    Ok(CredentialsSource::guess(s))
}

pub(crate) fn run(opt: Opt) -> Result<()> {
    let credentials = ServiceAccountCredentials::load(opt.service_account_file)?;
    let provider = Arc::new(TokenProvider::new(credentials)?);
    match opt.cmd {
        Command::List { command } => list::run(provider, command),
        Command::Put { command } => put::run(provider, command),
        Command::Get { command } => get::run(provider, command),
        Command::GetMetadata { command } => get_metadata::run(provider, command),
        Command::Delete { command } => delete::run(provider, command),
    }
}

/// Open the bucket named by `url`, and return the rest of `url` as a path.
fn open_bucket(provider: Arc<TokenProvider>, url: &Url) -> Result<(Bucket, String)> {
    let (bucket, path) = parse_gs_url(url)?;
    Ok((Bucket::new(&bucket, provider)?, path))
}

/// Like [`open_bucket`], but `url` must name an object.
fn open_object(provider: Arc<TokenProvider>, url: &Url) -> Result<(Bucket, String)> {
    let (bucket, path) = open_bucket(provider, url)?;
    if path.is_empty() {
        return Err(format_err!("{} does not name an object", url));
    }
    Ok((bucket, path))
}

/// Pretty-print `value` to standard output.
fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    serde_json::to_writer_pretty(&mut out, value)?;
    writeln!(out)?;
    Ok(())
}
