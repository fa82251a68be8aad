//! The `put` subcommand.

use anyhow::{Context as _, Result};
use clap::Args;
use std::{fs, path::PathBuf, sync::Arc};
use tracing::debug;
use ugcs::TokenProvider;
use url::Url;

use super::{open_object, print_json};

/// Upload arguments.
#[derive(Debug, Args)]
pub(crate) struct Opt {
    /// The MIME type to store [default: guessed from the local file name].
    #[arg(long = "content-type")]
    content_type: Option<String>,

    /// The local file to upload.
    local: PathBuf,

    /// Where to upload it.
    url: Url,
}

/// Upload a file.
pub(crate) fn run(provider: Arc<TokenProvider>, opt: Opt) -> Result<()> {
    let (bucket, path) = open_object(provider, &opt.url)?;
    let content_type = opt.content_type.unwrap_or_else(|| {
        mime_guess::from_path(&opt.local)
            .first_or_octet_stream()
            .to_string()
    });
    debug!("uploading {} as {}", opt.local.display(), content_type);
    let data = fs::read(&opt.local)
        .with_context(|| format!("could not read {}", opt.local.display()))?;
    let metadata = bucket.put(&path, &data, &content_type)?;
    print_json(&metadata)
}
