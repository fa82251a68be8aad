//! The `get-metadata` subcommand.

use anyhow::Result;
use clap::Args;
use std::sync::Arc;
use ugcs::TokenProvider;
use url::Url;

use super::{open_object, print_json};

/// Metadata arguments.
#[derive(Debug, Args)]
pub(crate) struct Opt {
    /// The object to describe.
    url: Url,
}

/// Print metadata for an object.
pub(crate) fn run(provider: Arc<TokenProvider>, opt: Opt) -> Result<()> {
    let (bucket, path) = open_object(provider, &opt.url)?;
    print_json(&bucket.get_metadata(&path)?)
}
