//! A micro Google Cloud Storage client.

#![warn(rust_2018_idioms, unused_extern_crates, clippy::all)]

use anyhow::Result;
use clap::Parser;
use std::process;
use tracing::debug;
use ugcs::ClientError;

mod cmd;

fn main() {
    if let Err(err) = run() {
        // Server errors usually explain themselves, so show the body as-is.
        match err.downcast_ref::<ClientError>().and_then(|err| err.body()) {
            Some(body) => eprintln!("Server error:\n{}", body),
            None => eprintln!("Error: {:#}", err),
        }
        process::exit(1);
    }
}

fn run() -> Result<()> {
    let opt = cmd::Opt::parse();
    opt.log_format.init()?;
    debug!("{:?}", opt);
    cmd::run(opt)
}
