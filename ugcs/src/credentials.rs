//! Support for loading service account credentials.

use secrecy::SecretString;
use serde::Deserialize;
use std::{
    fmt, fs, io,
    path::{Path, PathBuf},
};

use crate::common::*;
use crate::gcloud::client::ClientError;

/// How long a signed assertion is valid for, by default.
pub const DEFAULT_ASSERTION_LIFETIME_SECS: i64 = 60;

/// Where to find a service account key.
///
/// The `ugcs` CLI accepts either a path or the JSON itself in the same
/// argument, so [`CredentialsSource::guess`] decides which one we were given.
/// Library callers who know what they have should pick a variant directly.
#[derive(Clone)]
pub enum CredentialsSource {
    /// The contents of a service account JSON key.
    InlineJson(String),
    /// The path to a service account JSON key.
    FilePath(PathBuf),
    /// A service account key that has already been parsed.
    Parsed(serde_json::Value),
}

impl CredentialsSource {
    /// Treat `s` as inline JSON if it parses as JSON, and as a path otherwise.
    pub fn guess(s: &str) -> Self {
        if serde_json::from_str::<serde_json::Value>(s).is_ok() {
            CredentialsSource::InlineJson(s.to_owned())
        } else {
            CredentialsSource::FilePath(PathBuf::from(s))
        }
    }

    /// Read our raw JSON value.
    fn to_value(&self) -> Result<serde_json::Value> {
        match self {
            CredentialsSource::InlineJson(json) => serde_json::from_str(json)
                .context("could not parse service account key JSON"),
            CredentialsSource::FilePath(path) => read_json_file(path),
            CredentialsSource::Parsed(value) => Ok(value.to_owned()),
        }
    }
}

// Inline JSON contains a private key, so never print it.
impl fmt::Debug for CredentialsSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialsSource::InlineJson(_) => write!(f, "InlineJson(..)"),
            CredentialsSource::FilePath(path) => {
                f.debug_tuple("FilePath").field(path).finish()
            }
            CredentialsSource::Parsed(_) => write!(f, "Parsed(..)"),
        }
    }
}

impl fmt::Display for CredentialsSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialsSource::InlineJson(_) => write!(f, "inline JSON"),
            CredentialsSource::FilePath(path) => {
                write!(f, "the file {}", path.display())
            }
            CredentialsSource::Parsed(_) => write!(f, "a parsed JSON value"),
        }
    }
}

/// Read and parse a JSON key file.
fn read_json_file(path: &Path) -> Result<serde_json::Value> {
    let data = match fs::read_to_string(path) {
        Ok(data) => data,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            return Err(format_err!(
                "service account key {} does not exist",
                path.display(),
            ));
        }
        Err(err) => {
            return Err(err).with_context(|| format!("error reading {}", path.display()))
        }
    };
    serde_json::from_str(&data)
        .with_context(|| format!("could not parse {} as JSON", path.display()))
}

/// The subset of a Google service account key file that we need.
#[derive(Deserialize)]
struct ServiceAccountKeyFile {
    client_email: String,
    private_key: String,
    private_key_id: String,
    token_uri: String,
}

/// Everything we need to sign assertions on behalf of a service account.
#[derive(Debug)]
pub struct ServiceAccountCredentials {
    /// The service account's email address. This also names our token cache.
    account: String,
    /// The PEM-encoded RSA private key.
    private_key: SecretString,
    /// The ID of `private_key`, sent as the JWT `kid`.
    key_id: Option<String>,
    /// Where to exchange assertions for access tokens.
    token_uri: Url,
    /// How many seconds each assertion is valid for.
    lifetime: i64,
}

impl ServiceAccountCredentials {
    /// Create credentials from their individual parts.
    pub fn new(
        account: &str,
        private_key: &str,
        key_id: Option<&str>,
        token_uri: &str,
    ) -> Result<Self, ClientError> {
        Self::from_parts(account, private_key, key_id, token_uri)
            .map_err(ClientError::Config)
    }

    /// Load credentials from a service account key.
    #[instrument(level = "trace")]
    pub fn load(source: CredentialsSource) -> Result<Self, ClientError> {
        Self::load_helper(&source)
            .with_context(|| format!("could not load service account key from {}", source))
            .map_err(ClientError::Config)
    }

    fn load_helper(source: &CredentialsSource) -> Result<Self> {
        let key_file = serde_json::from_value::<ServiceAccountKeyFile>(source.to_value()?)
            .context("invalid service account key")?;
        Self::from_parts(
            &key_file.client_email,
            &key_file.private_key,
            Some(&key_file.private_key_id),
            &key_file.token_uri,
        )
    }

    fn from_parts(
        account: &str,
        private_key: &str,
        key_id: Option<&str>,
        token_uri: &str,
    ) -> Result<Self> {
        if account.is_empty() {
            return Err(format_err!("service account email is empty"));
        }
        // The account names a file in our cache directory.
        if account.contains(&['/', '\\'][..]) || account == "." || account == ".." {
            return Err(format_err!(
                "service account email {:?} cannot be used as a file name",
                account,
            ));
        }
        let token_uri = token_uri
            .parse::<Url>()
            .with_context(|| format!("invalid token URI {:?}", token_uri))?;
        Ok(Self {
            account: account.to_owned(),
            private_key: SecretString::from(private_key.to_owned()),
            key_id: key_id.map(str::to_owned),
            token_uri,
            lifetime: DEFAULT_ASSERTION_LIFETIME_SECS,
        })
    }

    /// Use a different assertion lifetime.
    pub fn with_lifetime(mut self, lifetime_secs: i64) -> Self {
        self.lifetime = lifetime_secs;
        self
    }

    /// Exchange assertions at a different token endpoint.
    pub fn with_token_uri(mut self, token_uri: Url) -> Self {
        self.token_uri = token_uri;
        self
    }

    /// The service account's email address.
    pub fn account(&self) -> &str {
        &self.account
    }

    /// The ID of our private key, if known.
    pub fn key_id(&self) -> Option<&str> {
        self.key_id.as_deref()
    }

    /// The OAuth2 token endpoint.
    pub fn token_uri(&self) -> &Url {
        &self.token_uri
    }

    /// How long our assertions are valid for, in seconds.
    pub fn lifetime(&self) -> i64 {
        self.lifetime
    }

    pub(crate) fn private_key(&self) -> &SecretString {
        &self.private_key
    }
}
