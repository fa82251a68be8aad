//! The `get` subcommand.

use anyhow::{Context as _, Result};
use clap::Args;
use std::{
    io::{self, Write},
    sync::Arc,
};
use ugcs::TokenProvider;
use url::Url;

use super::open_object;

/// Download arguments.
#[derive(Debug, Args)]
pub(crate) struct Opt {
    /// The object to download.
    url: Url,
}

/// Copy an object to standard output.
pub(crate) fn run(provider: Arc<TokenProvider>, opt: Opt) -> Result<()> {
    let (bucket, path) = open_object(provider, &opt.url)?;
    let data = bucket.get(&path)?;
    let stdout = io::stdout();
    let mut out = stdout.lock();
    out.write_all(&data)
        .and_then(|()| out.flush())
        .context("could not write to standard output")?;
    Ok(())
}
