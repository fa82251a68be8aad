//! Google Cloud support: authentication and the Cloud Storage JSON API.

pub mod auth;
pub mod client;
pub mod jwt;
pub mod storage;
pub mod token_cache;
