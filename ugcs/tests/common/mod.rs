//! Shared helpers for talking to a fake Cloud Storage server.

#![allow(dead_code)]

use percent_encoding::percent_decode_str;
use serde_json::{json, Value};
use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};
use tempfile::TempDir;
use tokio::runtime::Runtime;
use ugcs::{
    Bucket, CredentialsSource, ServiceAccountCredentials, StorageEndpoints,
    TokenProvider,
};
use url::Url;
use wiremock::{
    matchers::{body_string_contains, method, path, path_regex},
    Mock, MockServer, Request, Respond, ResponseTemplate,
};

/// The access token our fake token endpoint hands out.
pub const TEST_TOKEN: &str = "test-token";

/// The account in our fixture key.
pub const TEST_ACCOUNT: &str = "ugcs-test@ugcs-test.iam.gserviceaccount.com";

/// The bucket served by [`FakeGcs`].
pub const TEST_BUCKET: &str = "test-bucket";

/// The path to one of our fixtures.
pub fn fixture_path(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
}

/// Our fixture service account key, parsed.
pub fn service_account_json() -> Value {
    let data = std::fs::read_to_string(fixture_path("service_account.json")).unwrap();
    serde_json::from_str(&data).unwrap()
}

/// A mock server, plus the runtime that drives it.
///
/// Our client is blocking, so tests call it from the test thread and only use
/// `rt` to talk to `wiremock`.
pub struct MockGcs {
    pub server: MockServer,
    pub rt: Runtime,
    cache: TempDir,
}

impl MockGcs {
    pub fn start() -> Self {
        let rt = Runtime::new().unwrap();
        let server = rt.block_on(MockServer::start());
        MockGcs {
            server,
            rt,
            cache: tempfile::tempdir().unwrap(),
        }
    }

    /// The token endpoint on our server.
    pub fn token_uri(&self) -> Url {
        format!("{}/token", self.server.uri()).parse().unwrap()
    }

    /// The directory where providers should cache tokens.
    pub fn cache_dir(&self) -> &Path {
        self.cache.path()
    }

    /// Where our fixture account's token is cached.
    pub fn cache_file(&self) -> PathBuf {
        self.cache_dir().join(format!("{}.token", TEST_ACCOUNT))
    }

    /// Our fixture credentials, pointed at our token endpoint.
    pub fn credentials(&self) -> ServiceAccountCredentials {
        let source = CredentialsSource::FilePath(fixture_path("service_account.json"));
        ServiceAccountCredentials::load(source)
            .unwrap()
            .with_token_uri(self.token_uri())
    }

    /// A token provider using [`MockGcs::credentials`] and our cache directory.
    pub fn provider(&self) -> Arc<TokenProvider> {
        let provider = TokenProvider::builder(self.credentials())
            .cache_dir(self.cache_dir())
            .build()
            .unwrap();
        Arc::new(provider)
    }

    /// A bucket handle that talks to our server.
    pub fn bucket(&self, provider: Arc<TokenProvider>) -> Bucket {
        let endpoints = StorageEndpoints::with_root(&self.server.uri());
        Bucket::with_endpoints(TEST_BUCKET, provider, endpoints).unwrap()
    }

    /// Hand out [`TEST_TOKEN`], expecting exactly `times` requests.
    pub fn mount_token_endpoint(&self, times: u64) {
        self.rt.block_on(
            Mock::given(method("POST"))
                .and(path("/token"))
                .and(body_string_contains(
                    "grant_type=urn%3Aietf%3Aparams%3Aoauth%3Agrant-type%3Ajwt-bearer",
                ))
                .and(body_string_contains("assertion="))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                    "access_token": TEST_TOKEN,
                    "token_type": "Bearer",
                    "expires_in": 3599,
                })))
                .expect(times)
                .mount(&self.server),
        );
    }

    /// Serve the JSON API from an in-memory [`FakeGcs`].
    pub fn mount_fake_gcs(&self) -> FakeGcs {
        let fake = FakeGcs::default();
        self.rt.block_on(
            Mock::given(path_regex("^/(upload/)?storage/v1/b/"))
                .respond_with(fake.clone())
                .mount(&self.server),
        );
        fake
    }

    /// Panic unless every mock got the number of calls it expected.
    pub fn verify(&self) {
        self.rt.block_on(self.server.verify());
    }
}

/// A stored object.
#[derive(Clone, Debug)]
struct FakeObject {
    data: Vec<u8>,
    content_type: String,
}

/// Just enough of the Cloud Storage JSON API to exercise our client.
#[derive(Clone, Debug, Default)]
pub struct FakeGcs {
    objects: Arc<Mutex<BTreeMap<String, FakeObject>>>,
}

impl FakeGcs {
    /// The names of all stored objects.
    pub fn object_names(&self) -> Vec<String> {
        self.objects.lock().unwrap().keys().cloned().collect()
    }

    fn metadata(bucket: &str, name: &str, object: &FakeObject) -> Value {
        json!({
            "kind": "storage#object",
            "bucket": bucket,
            "name": name,
            "contentType": object.content_type,
            "size": object.data.len().to_string(),
        })
    }

    fn not_found(bucket: &str, name: &str) -> ResponseTemplate {
        ResponseTemplate::new(404).set_body_json(json!({
            "error": {
                "code": 404,
                "message": format!("No such object: {}/{}", bucket, name),
            },
        }))
    }

    fn query_param(request: &Request, key: &str) -> Option<String> {
        request
            .url
            .query_pairs()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.into_owned())
    }
}

impl Respond for FakeGcs {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let authorization = request
            .headers
            .get("authorization")
            .and_then(|v| v.to_str().ok());
        if authorization != Some(&format!("Bearer {}", TEST_TOKEN)[..]) {
            return ResponseTemplate::new(401);
        }

        let segments = request
            .url
            .path_segments()
            .unwrap()
            .map(|s| percent_decode_str(s).decode_utf8().unwrap().into_owned())
            .collect::<Vec<_>>();
        let is_upload = segments[0] == "upload";
        let rest = if is_upload { &segments[4..] } else { &segments[3..] };
        let bucket = rest[0].clone();
        if bucket != TEST_BUCKET || rest.get(1).map(String::as_str) != Some("o") {
            return ResponseTemplate::new(404);
        }
        let object_name = rest.get(2).cloned();

        let mut objects = self.objects.lock().unwrap();
        match (request.method.as_str(), object_name) {
            ("POST", None) if is_upload => {
                let name = Self::query_param(request, "name").unwrap();
                let object = FakeObject {
                    data: request.body.clone(),
                    content_type: request
                        .headers
                        .get("content-type")
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or("application/octet-stream")
                        .to_owned(),
                };
                let metadata = Self::metadata(&bucket, &name, &object);
                objects.insert(name, object);
                ResponseTemplate::new(200).set_body_json(metadata)
            }
            ("GET", None) => {
                let prefix = Self::query_param(request, "prefix").unwrap_or_default();
                let items = objects
                    .iter()
                    .filter(|(name, _)| name.starts_with(&prefix))
                    .map(|(name, object)| Self::metadata(&bucket, name, object))
                    .collect::<Vec<_>>();
                let mut listing = json!({ "kind": "storage#objects" });
                if !items.is_empty() {
                    listing["items"] = Value::Array(items);
                }
                ResponseTemplate::new(200).set_body_json(listing)
            }
            ("GET", Some(name)) => match objects.get(&name) {
                Some(object) if Self::query_param(request, "alt").as_deref() == Some("media") => {
                    ResponseTemplate::new(200)
                        .set_body_raw(object.data.clone(), &object.content_type)
                }
                Some(object) => {
                    ResponseTemplate::new(200).set_body_json(Self::metadata(&bucket, &name, object))
                }
                None => Self::not_found(&bucket, &name),
            },
            ("DELETE", Some(name)) => match objects.remove(&name) {
                Some(_) => ResponseTemplate::new(204),
                None => Self::not_found(&bucket, &name),
            },
            _ => ResponseTemplate::new(405),
        }
    }
}
