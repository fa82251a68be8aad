//! A micro client for Google Cloud Storage.
//!
//! The interesting part of this crate is [`TokenProvider`], which turns a
//! service account key into short-lived OAuth2 bearer tokens and caches them
//! on disk so that separate invocations of the `ugcs` tool can share them.
//! [`Bucket`] uses those tokens to talk to the Cloud Storage JSON API.
//!
//! ```no_run
//! use std::sync::Arc;
//! use ugcs::{Bucket, CredentialsSource, ServiceAccountCredentials, TokenProvider};
//!
//! # fn main() -> Result<(), ugcs::ClientError> {
//! let source = CredentialsSource::guess("service-account.json");
//! let credentials = ServiceAccountCredentials::load(source)?;
//! let provider = Arc::new(TokenProvider::new(credentials)?);
//! let bucket = Bucket::new("my-bucket", provider)?;
//! bucket.put("hello.txt", b"Hello, world!", "text/plain")?;
//! # Ok(())
//! # }
//! ```

#![warn(rust_2018_idioms, unused_extern_crates, clippy::all)]

pub mod config;
pub mod credentials;
pub mod gcloud;
pub mod logging;
pub(crate) mod tls;

pub use credentials::{CredentialsSource, ServiceAccountCredentials};
pub use gcloud::{
    auth::TokenProvider,
    client::ClientError,
    jwt::{RsaSha256Signer, Signer},
    storage::{parse_gs_url, Bucket, StorageEndpoints},
    token_cache::CachedToken,
};

/// Definitions included by all the files in this crate.
#[allow(unused_imports)]
pub(crate) mod common {
    pub(crate) use anyhow::{format_err, Context as _, Error, Result};
    pub(crate) use tracing::{debug, error, info, instrument, trace, warn};
    pub(crate) use url::Url;
}
