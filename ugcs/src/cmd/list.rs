//! The `list` subcommand.

use anyhow::Result;
use clap::Args;
use std::sync::Arc;
use ugcs::TokenProvider;
use url::Url;

use super::{open_bucket, print_json};

/// List arguments.
#[derive(Debug, Args)]
pub(crate) struct Opt {
    /// The bucket to list, optionally followed by a prefix to match.
    url: Url,
}

/// List matching objects.
pub(crate) fn run(provider: Arc<TokenProvider>, opt: Opt) -> Result<()> {
    let (bucket, prefix) = open_bucket(provider, &opt.url)?;
    let listing = bucket.list(Some(&prefix))?;
    print_json(&listing)
}
