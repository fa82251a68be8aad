//! Authentication support for Google Cloud.
//!
//! We implement the OAuth2 JWT-bearer flow for service accounts directly:
//! sign an assertion, trade it for an access token at the token endpoint, and
//! keep the token in a per-account cache file until it is about to expire.

use reqwest::Method;
use serde::{Deserialize, Serialize};
use std::{
    fmt,
    path::{Path, PathBuf},
    sync::Mutex,
};

use super::{
    client::{Client, ClientError},
    jwt::{create_assertion, RsaSha256Signer, Signer},
    token_cache::{CachedToken, TokenCache},
};
use crate::common::*;
use crate::config::token_cache_dir;
use crate::credentials::ServiceAccountCredentials;

/// The OAuth2 grant type for signed JWT assertions.
const JWT_BEARER_GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// The current time, in Unix seconds.
pub(crate) fn unix_now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// The form we POST to the token endpoint.
#[derive(Serialize)]
struct TokenRequest<'a> {
    grant_type: &'a str,
    assertion: &'a str,
}

/// The token endpoint's response.
#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    token_type: String,
    expires_in: i64,
    #[serde(flatten)]
    extra: serde_json::Map<String, serde_json::Value>,
}

impl TokenResponse {
    /// Convert to a [`CachedToken`], received at `now`.
    fn into_cached_token(self, now: i64) -> CachedToken {
        let mut extra = self.extra;
        // We compute this ourselves, and it must not appear twice on disk.
        extra.remove("expires_at");
        CachedToken {
            access_token: self.access_token,
            token_type: self.token_type,
            expires_in: self.expires_in,
            expires_at: now.saturating_add(self.expires_in),
            extra,
        }
    }
}

/// Builder for [`TokenProvider`].
pub struct TokenProviderBuilder {
    credentials: ServiceAccountCredentials,
    cache_dir: Option<PathBuf>,
    signer: Option<Box<dyn Signer>>,
}

impl TokenProviderBuilder {
    /// Store cached tokens in `dir` instead of `<cache root>/ugcs`.
    pub fn cache_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    /// Sign assertions with `signer` instead of [`RsaSha256Signer`].
    pub fn signer(mut self, signer: Box<dyn Signer>) -> Self {
        self.signer = Some(signer);
        self
    }

    /// Create the provider, loading any token we cached earlier.
    pub fn build(self) -> Result<TokenProvider, ClientError> {
        let cache_dir = match self.cache_dir {
            Some(dir) => dir,
            None => token_cache_dir().map_err(ClientError::Config)?,
        };
        let cache = TokenCache::new(&cache_dir, self.credentials.account())
            .map_err(ClientError::Persistence)?;
        let cached_token = cache.load();
        Ok(TokenProvider {
            credentials: self.credentials,
            signer: self.signer.unwrap_or_else(|| Box::new(RsaSha256Signer)),
            cache,
            client: Client::new()?,
            cached_token: Mutex::new(cached_token),
        })
    }
}

/// Provides OAuth2 access tokens for a single service account.
///
/// A provider may be shared between several buckets using `Arc`. Refreshes
/// happen with an internal lock held, so threads sharing a provider will not
/// race each other to the token endpoint. Separate processes can still race
/// on the cache file, in which case the last writer wins.
pub struct TokenProvider {
    credentials: ServiceAccountCredentials,
    signer: Box<dyn Signer>,
    cache: TokenCache,
    client: Client,
    /// `None` until we have a token we believe is valid.
    cached_token: Mutex<Option<CachedToken>>,
}

impl TokenProvider {
    /// Create a provider with the default cache directory and signer.
    pub fn new(credentials: ServiceAccountCredentials) -> Result<Self, ClientError> {
        Self::builder(credentials).build()
    }

    /// Start building a provider with non-default settings.
    pub fn builder(credentials: ServiceAccountCredentials) -> TokenProviderBuilder {
        TokenProviderBuilder {
            credentials,
            cache_dir: None,
            signer: None,
        }
    }

    /// The service account we authenticate as.
    pub fn account(&self) -> &str {
        self.credentials.account()
    }

    /// The file where we cache our token.
    pub fn cache_path(&self) -> &Path {
        self.cache.path()
    }

    /// Return a valid access token, fetching a new one if ours is missing or
    /// within a few seconds of expiring.
    #[instrument(level = "trace", skip(self), fields(account = %self.account()))]
    pub fn request_token(&self) -> Result<CachedToken, ClientError> {
        // The cached value is always either `None` or a complete token, so a
        // panic elsewhere can't leave it half-updated.
        let mut cached_token = self
            .cached_token
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let now = unix_now();
        let expiring = cached_token
            .as_ref()
            .filter(|token| token.needs_refresh(now))
            .map(|token| token.expires_at);
        if let Some(expires_at) = expiring {
            debug!("cached token expires at {}, which is too soon", expires_at);
            *cached_token = None;
        }

        if let Some(token) = cached_token.as_ref() {
            trace!("using cached token");
            return Ok(token.clone());
        }

        let token = self.request_new_token()?;
        self.cache
            .store(&token)
            .map_err(ClientError::Persistence)?;
        *cached_token = Some(token.clone());
        Ok(token)
    }

    /// Exchange a freshly signed assertion for a new access token.
    fn request_new_token(&self) -> Result<CachedToken, ClientError> {
        debug!("requesting new token from {}", self.credentials.token_uri());
        let assertion =
            create_assertion(&self.credentials, self.signer.as_ref(), unix_now())
                .map_err(ClientError::Config)?;
        let form = TokenRequest {
            grant_type: JWT_BEARER_GRANT_TYPE,
            assertion: &assertion,
        };
        let req = self
            .client
            .request(Method::POST, self.credentials.token_uri().to_owned())
            .form(&form);
        let resp = self.client.fetch_json::<TokenResponse>(req)?;
        Ok(resp.into_cached_token(unix_now()))
    }
}

impl fmt::Debug for TokenProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenProvider")
            .field("account", &self.account())
            .field("cache_path", &self.cache_path())
            .finish()
    }
}
