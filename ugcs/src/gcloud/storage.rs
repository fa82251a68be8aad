//! Interfaces to Google Cloud Storage.
//!
//! See the [JSON API documentation][api] for the endpoints we use.
//!
//! [api]: https://cloud.google.com/storage/docs/json_api/v1/objects

use percent_encoding::percent_decode_str;
use reqwest::{
    blocking::RequestBuilder,
    header::{HeaderValue, AUTHORIZATION, CONTENT_TYPE},
    Method,
};
use serde::Serialize;
use std::sync::Arc;

use super::{
    auth::TokenProvider,
    client::{build_url, percent_encode, Alt, Client, ClientError, NoQuery},
};
use crate::common::*;
use crate::config::storage_emulator_host;

/// The production Cloud Storage host.
const GOOGLE_STORAGE_ROOT: &str = "https://storage.googleapis.com";

/// Query for listing objects.
#[derive(Debug, Serialize)]
struct ListQuery<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    prefix: Option<&'a str>,
}

/// Query for a simple media upload.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UploadQuery<'a> {
    upload_type: &'static str,
    name: &'a str,
}

/// Query for downloading an object's data.
#[derive(Debug, Serialize)]
struct DownloadQuery {
    alt: Alt,
}

/// Base URLs for the Cloud Storage JSON API.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StorageEndpoints {
    /// Base for metadata, list, download and delete requests.
    storage: String,
    /// Base for uploads.
    upload: String,
}

impl StorageEndpoints {
    /// Use the API rooted at `root`, which may be an emulator such as
    /// `http://localhost:9023`.
    pub fn with_root(root: &str) -> Self {
        let root = root.trim_end_matches('/');
        Self {
            storage: format!("{}/storage/v1", root),
            upload: format!("{}/upload/storage/v1", root),
        }
    }

    /// Use `$STORAGE_EMULATOR_HOST` if it is set, and Google otherwise.
    pub fn from_env() -> Self {
        match storage_emulator_host() {
            Some(host) => {
                debug!("using storage emulator at {}", host);
                Self::with_root(&host)
            }
            None => Self::default(),
        }
    }

    /// The base URL for metadata, list, download and delete requests.
    pub fn storage_url(&self) -> &str {
        &self.storage
    }

    /// The base URL for uploads.
    pub fn upload_url(&self) -> &str {
        &self.upload
    }
}

impl Default for StorageEndpoints {
    fn default() -> Self {
        Self::with_root(GOOGLE_STORAGE_ROOT)
    }
}

/// Split a `gs://bucket/path` URL into a bucket name and an object path.
///
/// The path is percent-decoded, so `gs://b/a%20b` names the object `a b`.
pub fn parse_gs_url(url: &Url) -> Result<(String, String)> {
    if url.scheme() != "gs" {
        Err(format_err!("expected a gs:// URL, found {}", url))
    } else {
        let bucket = url
            .host_str()
            .ok_or_else(|| format_err!("could not get bucket from {}", url))?
            .to_owned();
        let object = percent_decode_str(url.path().trim_start_matches('/'))
            .decode_utf8()
            .with_context(|| format!("object path in {} is not UTF-8", url))?
            .into_owned();
        Ok((bucket, object))
    }
}

/// A Google Cloud Storage bucket.
#[derive(Clone, Debug)]
pub struct Bucket {
    name: String,
    provider: Arc<TokenProvider>,
    endpoints: StorageEndpoints,
    client: Client,
}

impl Bucket {
    /// Access the bucket `name` using tokens from `provider`.
    pub fn new(name: &str, provider: Arc<TokenProvider>) -> Result<Self, ClientError> {
        Self::with_endpoints(name, provider, StorageEndpoints::from_env())
    }

    /// Access the bucket `name` through a specific set of API endpoints.
    pub fn with_endpoints(
        name: &str,
        provider: Arc<TokenProvider>,
        endpoints: StorageEndpoints,
    ) -> Result<Self, ClientError> {
        if name.is_empty() {
            return Err(ClientError::Config(format_err!("bucket name is empty")));
        }
        // We put the name into URLs unescaped.
        if !name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b"-_.".contains(&b))
        {
            return Err(ClientError::Config(format_err!(
                "invalid bucket name {:?}",
                name,
            )));
        }
        Ok(Self {
            name: name.to_owned(),
            provider,
            endpoints,
            client: Client::new()?,
        })
    }

    /// The name of this bucket.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// List the objects whose names start with `prefix`.
    ///
    /// Returns the raw listing. It has an `items` array unless nothing
    /// matched.
    #[instrument(level = "trace", skip(self), fields(bucket = %self.name))]
    pub fn list(&self, prefix: Option<&str>) -> Result<serde_json::Value, ClientError> {
        let query = ListQuery {
            prefix: prefix.filter(|p| !p.is_empty()),
        };
        let url = build_url(&self.objects_url(self.endpoints.storage_url()), query)?;
        let req = self.authorized_request(Method::GET, url)?;
        self.client.fetch_json(req)
    }

    /// Upload `data` as `path`, replacing any existing object. Returns the
    /// new object's metadata.
    #[instrument(level = "trace", skip(self, data), fields(bucket = %self.name, len = data.len()))]
    pub fn put(
        &self,
        path: &str,
        data: &[u8],
        content_type: &str,
    ) -> Result<serde_json::Value, ClientError> {
        let query = UploadQuery {
            upload_type: "media",
            name: path,
        };
        let url = build_url(&self.objects_url(self.endpoints.upload_url()), query)?;
        let content_type = HeaderValue::from_str(content_type).map_err(|err| {
            ClientError::Config(
                Error::new(err).context(format!("invalid content type {:?}", content_type)),
            )
        })?;
        let req = self
            .authorized_request(Method::POST, url)?
            .header(CONTENT_TYPE, content_type)
            .header("Content-Transfer-Encoding", "binary")
            .body(data.to_vec());
        self.client.fetch_json(req)
    }

    /// Download the contents of `path`.
    #[instrument(level = "trace", skip(self), fields(bucket = %self.name))]
    pub fn get(&self, path: &str) -> Result<Vec<u8>, ClientError> {
        let query = DownloadQuery { alt: Alt::Media };
        let url = build_url(&self.object_url(path), query)?;
        let req = self.authorized_request(Method::GET, url)?;
        self.client.fetch(req)
    }

    /// Fetch the metadata of `path`.
    #[instrument(level = "trace", skip(self), fields(bucket = %self.name))]
    pub fn get_metadata(&self, path: &str) -> Result<serde_json::Value, ClientError> {
        let url = build_url(&self.object_url(path), NoQuery)?;
        let req = self.authorized_request(Method::GET, url)?;
        self.client.fetch_json(req)
    }

    /// Delete `path`.
    #[instrument(level = "trace", skip(self), fields(bucket = %self.name))]
    pub fn delete(&self, path: &str) -> Result<(), ClientError> {
        let url = build_url(&self.object_url(path), NoQuery)?;
        let req = self.authorized_request(Method::DELETE, url)?;
        self.client.fetch(req)?;
        Ok(())
    }

    /// The `.../b/<bucket>/o` collection URL under `base`. Bucket names are
    /// restricted to URL-safe characters, so we use them as-is.
    fn objects_url(&self, base: &str) -> String {
        format!("{}/b/{}/o", base, self.name)
    }

    /// The URL of the object `path`.
    fn object_url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.objects_url(self.endpoints.storage_url()),
            percent_encode(path),
        )
    }

    /// Start a request carrying a current access token.
    fn authorized_request(
        &self,
        method: Method,
        url: Url,
    ) -> Result<RequestBuilder, ClientError> {
        let token = self.provider.request_token()?;
        let mut authorization = HeaderValue::from_str(&token.authorization())
            .context("access token is not a valid header value")?;
        authorization.set_sensitive(true);
        Ok(self
            .client
            .request(method, url)
            .header(AUTHORIZATION, authorization))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn endpoints_are_rooted_at_host() {
        let endpoints = StorageEndpoints::with_root("http://localhost:9023/");
        assert_eq!(endpoints.storage_url(), "http://localhost:9023/storage/v1");
        assert_eq!(
            endpoints.upload_url(),
            "http://localhost:9023/upload/storage/v1"
        );
        assert_eq!(
            StorageEndpoints::default().storage_url(),
            "https://storage.googleapis.com/storage/v1",
        );
    }

    #[test]
    fn parses_gs_urls() {
        let url = "gs://my-bucket/dir/a%20b.txt".parse::<Url>().unwrap();
        assert_eq!(
            parse_gs_url(&url).unwrap(),
            ("my-bucket".to_owned(), "dir/a b.txt".to_owned()),
        );
        let url = "gs://my-bucket".parse::<Url>().unwrap();
        assert_eq!(
            parse_gs_url(&url).unwrap(),
            ("my-bucket".to_owned(), "".to_owned())
        );
        let url = "s3://my-bucket/x".parse::<Url>().unwrap();
        assert!(parse_gs_url(&url).is_err());
    }
}
