//! Signed JWT assertions for the OAuth2 JWT-bearer grant.
//!
//! See [Google's documentation][docs] for the exact format. We build the
//! header and claims ourselves and sign them with [`Signer`].
//!
//! [docs]: https://developers.google.com/identity/protocols/oauth2/service-account#authorizingrequests

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rsa::{
    pkcs1::DecodeRsaPrivateKey, pkcs1v15::SigningKey, pkcs8::DecodePrivateKey,
    signature::SignatureEncoding, RsaPrivateKey,
};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use sha2::Sha256;

use crate::common::*;
use crate::credentials::ServiceAccountCredentials;

/// The OAuth2 scope that we request. We only ever read and write objects.
pub const STORAGE_READ_WRITE_SCOPE: &str =
    "https://www.googleapis.com/auth/devstorage.read_write";

/// Something that can produce an RSA-SHA256 (PKCS#1 v1.5) signature.
pub trait Signer: Send + Sync {
    /// Sign `input` using the PEM-encoded private key `private_key_pem`.
    fn sign(&self, input: &[u8], private_key_pem: &SecretString) -> Result<Vec<u8>>;
}

/// The default [`Signer`], implemented in-process with the `rsa` crate.
///
/// The key is decoded into memory for the duration of the call and dropped
/// afterwards. It is never written to disk.
#[derive(Clone, Copy, Debug, Default)]
pub struct RsaSha256Signer;

impl Signer for RsaSha256Signer {
    fn sign(&self, input: &[u8], private_key_pem: &SecretString) -> Result<Vec<u8>> {
        let pem = private_key_pem.expose_secret();
        // Google hands out PKCS#8 keys, but accept a bare PKCS#1 key too.
        let key = match RsaPrivateKey::from_pkcs8_pem(pem) {
            Ok(key) => key,
            Err(pkcs8_err) => RsaPrivateKey::from_pkcs1_pem(pem).map_err(|_| {
                Error::new(pkcs8_err).context("could not parse RSA private key")
            })?,
        };
        let signing_key = SigningKey::<Sha256>::new(key);
        let signature = rsa::signature::Signer::try_sign(&signing_key, input)
            .context("could not sign JWT")?;
        Ok(signature.to_vec())
    }
}

/// A JWT header.
#[derive(Debug, Serialize)]
struct Header<'a> {
    alg: &'static str,
    typ: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    kid: Option<&'a str>,
}

/// The claims we make when asking for an access token.
#[derive(Debug, Serialize)]
struct Claims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

/// Serialize `value` as compact JSON and encode it as unpadded base64url.
fn json_to_b64<T: Serialize>(value: &T) -> Result<String> {
    let json = serde_json::to_vec(value).context("could not serialize JWT part")?;
    Ok(URL_SAFE_NO_PAD.encode(json))
}

/// Build the `header.claims` signing input for `credentials` at `now`.
pub(crate) fn signing_input(
    credentials: &ServiceAccountCredentials,
    now: i64,
) -> Result<String> {
    let header = Header {
        alg: "RS256",
        typ: "JWT",
        kid: credentials.key_id(),
    };
    let claims = Claims {
        iss: credentials.account(),
        scope: STORAGE_READ_WRITE_SCOPE,
        aud: credentials.token_uri().as_str(),
        iat: now,
        exp: now.saturating_add(credentials.lifetime()),
    };
    Ok(format!("{}.{}", json_to_b64(&header)?, json_to_b64(&claims)?))
}

/// Create a signed assertion for `credentials`, issued at `now` (Unix seconds).
#[instrument(level = "trace", skip(credentials, signer), fields(account = %credentials.account()))]
pub(crate) fn create_assertion(
    credentials: &ServiceAccountCredentials,
    signer: &dyn Signer,
    now: i64,
) -> Result<String> {
    let input = signing_input(credentials, now)?;
    let signature = signer.sign(input.as_bytes(), credentials.private_key())?;
    Ok(format!("{}.{}", input, URL_SAFE_NO_PAD.encode(signature)))
}
