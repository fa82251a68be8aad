//! The `delete` subcommand.

use anyhow::Result;
use clap::Args;
use std::sync::Arc;
use tracing::info;
use ugcs::TokenProvider;
use url::Url;

use super::open_object;

/// Delete arguments.
#[derive(Debug, Args)]
pub(crate) struct Opt {
    /// The object to delete.
    url: Url,
}

/// Delete an object.
pub(crate) fn run(provider: Arc<TokenProvider>, opt: Opt) -> Result<()> {
    let (bucket, path) = open_object(provider, &opt.url)?;
    bucket.delete(&path)?;
    info!("deleted {}", opt.url);
    Ok(())
}
