//! A Google Cloud REST client.

use flate2::read::MultiGzDecoder;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::{
    blocking::{RequestBuilder, Response},
    header::{HeaderMap, ACCEPT_ENCODING, CONTENT_ENCODING},
    Method, StatusCode,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::{error, fmt, io::Read};

use crate::common::*;
use crate::tls::rustls_client_config;

/// The `Accept-Encoding` header we send with every request.
const ACCEPT_ENCODING_VALUE: &str = "gzip, identity";

/// An empty query string.
#[derive(Debug, Serialize)]
pub(crate) struct NoQuery;

/// Alternative media types for Google Cloud REST APIs.
#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum Alt {
    /// Return the underlying media data.
    Media,
}

/// An error talking to Google Cloud. We break out the cases our callers
/// might want to handle differently.
#[derive(Debug)]
pub enum ClientError {
    /// Our credentials or arguments were unusable.
    Config(Error),
    /// The server answered with an HTTP error status.
    Http {
        method: Method,
        url: Url,
        status: StatusCode,
        body: String,
    },
    /// We could not talk to the server at all.
    Transport(Error),
    /// We got a token but could not save it to our cache.
    Persistence(Error),
    /// Another error occurred. We don't currently care about the details.
    Other(Error),
}

impl ClientError {
    /// The HTTP status returned by the server, if we got that far.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ClientError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// The body of the server's error response, if we got one.
    pub fn body(&self) -> Option<&str> {
        match self {
            ClientError::Http { body, .. } => Some(body),
            _ => None,
        }
    }

    /// Did the server tell us the resource does not exist?
    pub fn is_not_found(&self) -> bool {
        self.status() == Some(StatusCode::NOT_FOUND)
    }
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientError::Http {
                method,
                url,
                status,
                body,
            } => {
                write!(f, "cannot {} {}: {}", method, url, status)?;
                // Try to include Google's explanation, if it sent a JSON one.
                if let Ok(resp) = serde_json::from_str::<ErrorResponse>(body) {
                    write!(f, ": {}", resp.error)?;
                }
                Ok(())
            }
            ClientError::Config(err)
            | ClientError::Transport(err)
            | ClientError::Persistence(err)
            | ClientError::Other(err) => err.fmt(f),
        }
    }
}

impl error::Error for ClientError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            ClientError::Http { .. } => None,
            ClientError::Config(err)
            | ClientError::Transport(err)
            | ClientError::Persistence(err)
            | ClientError::Other(err) => err.source(),
        }
    }
}

impl From<Error> for ClientError {
    fn from(err: Error) -> Self {
        ClientError::Other(err)
    }
}

/// A blocking Google Cloud REST client.
///
/// This knows nothing about authentication. Callers add their own
/// `Authorization` header.
#[derive(Clone, Debug)]
pub(crate) struct Client {
    /// Our HTTP client.
    client: reqwest::blocking::Client,
}

impl Client {
    /// Create a new Google Cloud client.
    pub(crate) fn new() -> Result<Client, ClientError> {
        let client = reqwest::blocking::Client::builder()
            .use_preconfigured_tls(rustls_client_config()?)
            .build()
            .context("could not create HTTP client")?;
        Ok(Client { client })
    }

    /// Start building a request. We always ask for gzip, and decode it
    /// ourselves in [`Client::fetch`].
    pub(crate) fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.client
            .request(method, url)
            .header(ACCEPT_ENCODING, ACCEPT_ENCODING_VALUE)
    }

    /// Send a request and return the decoded response body.
    ///
    /// Any non-2xx response becomes [`ClientError::Http`]. We never retry.
    pub(crate) fn fetch(&self, req: RequestBuilder) -> Result<Vec<u8>, ClientError> {
        let req = req.build().context("could not build HTTP request")?;
        let method = req.method().to_owned();
        let url = req.url().to_owned();
        trace!("{} {}", method, url);

        let http_resp = self.client.execute(req).map_err(|err| {
            ClientError::Transport(
                Error::new(err).context(format!("could not {} {}", method, url)),
            )
        })?;
        let status = http_resp.status();
        let body = read_decoded_body(http_resp)
            .with_context(|| format!("error reading response from {}", url))?;
        trace!("{} {} returned {} ({} bytes)", method, url, status, body.len());

        if status.is_success() {
            Ok(body)
        } else {
            let body = String::from_utf8_lossy(&body).into_owned();
            trace!("{} error {:?}", method, body);
            Err(ClientError::Http {
                method,
                url,
                status,
                body,
            })
        }
    }

    /// Send a request and deserialize the JSON response.
    pub(crate) fn fetch_json<Output>(
        &self,
        req: RequestBuilder,
    ) -> Result<Output, ClientError>
    where
        Output: DeserializeOwned,
    {
        let body = self.fetch(req)?;
        let resp = serde_json::from_slice::<Output>(&body)
            .context("error parsing JSON response")?;
        Ok(resp)
    }
}

/// Read all of `http_resp`, gunzipping it if the server compressed it.
fn read_decoded_body(http_resp: Response) -> Result<Vec<u8>> {
    let gzipped = is_gzipped(http_resp.headers());
    let raw = http_resp.bytes()?;
    if gzipped {
        gunzip(&raw)
    } else {
        Ok(raw.to_vec())
    }
}

/// Does `headers` say the body is gzipped?
fn is_gzipped(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().eq_ignore_ascii_case("gzip"))
        .unwrap_or(false)
}

/// Decompress a gzip body.
fn gunzip(data: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(data.len() * 2);
    MultiGzDecoder::new(data)
        .read_to_end(&mut out)
        .context("could not decompress gzip response")?;
    Ok(out)
}

/// Construct a URL from a base URL and something that we can serialize as a
/// query string.
pub(crate) fn build_url<Query>(url: &str, query: Query) -> Result<Url>
where
    Query: fmt::Debug + Serialize,
{
    let mut url = url
        .parse::<Url>()
        .with_context(|| format!("could not parse URL {:?}", url))?;
    let query_str = serde_urlencoded::to_string(&query)?;
    if !query_str.is_empty() {
        url.set_query(Some(&query_str));
    }
    Ok(url)
}

/// A Google Cloud error response.
#[derive(Debug, Deserialize)]
struct ErrorResponse {
    /// The actual error.
    error: GCloudError,
}

/// Information about a GCloud error.
#[derive(Debug, Deserialize)]
struct GCloudError {
    code: i32,
    message: String,
}

impl fmt::Display for GCloudError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Google Cloud error: {} {}", self.code, self.message)
    }
}

/// Characters to escape in a URL path segment. Everything but the RFC 3986
/// unreserved characters, including `/`.
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Percent-encode a string for use as a single URL path segment.
///
/// Object names may contain `/`, which must be encoded too.
pub(crate) fn percent_encode(s: &str) -> impl fmt::Display + '_ {
    utf8_percent_encode(s, PATH_SEGMENT)
}
