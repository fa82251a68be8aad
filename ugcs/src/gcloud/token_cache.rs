//! On-disk cache of OAuth2 access tokens.
//!
//! Each service account gets one file, `<cache dir>/<account>.token`,
//! containing the token endpoint's JSON response plus an `expires_at`
//! timestamp. The file is shared between processes, so we only ever replace
//! it atomically.

use serde::{Deserialize, Serialize};
use std::{
    fmt,
    fs::{self, File},
    io::{self, BufWriter, Write},
    path::{Path, PathBuf},
};

use crate::common::*;

/// Suffix of our token cache files.
const TOKEN_FILE_SUFFIX: &str = ".token";

/// Treat tokens as expired this many seconds before they actually expire.
pub const EXPIRY_SAFETY_MARGIN_SECS: i64 = 3;

/// An access token, as returned by the token endpoint and stored on disk.
#[derive(Clone, Deserialize, PartialEq, Serialize)]
pub struct CachedToken {
    /// The bearer token itself.
    pub access_token: String,
    /// The token type, normally `Bearer`.
    pub token_type: String,
    /// How many seconds the token was valid for when it was issued.
    pub expires_in: i64,
    /// When the token expires, in Unix seconds.
    pub expires_at: i64,
    /// Anything else the token endpoint told us. We keep it so that the
    /// cache file contains the full response.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl CachedToken {
    /// Should we stop using this token at time `now`?
    pub fn needs_refresh(&self, now: i64) -> bool {
        now + EXPIRY_SAFETY_MARGIN_SECS >= self.expires_at
    }

    /// The value of the `Authorization` header for this token.
    pub fn authorization(&self) -> String {
        format!("{} {}", self.token_type, self.access_token)
    }
}

impl fmt::Debug for CachedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedToken")
            .field("access_token", &"redacted")
            .field("token_type", &self.token_type)
            .field("expires_in", &self.expires_in)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// The token cache file for a single account.
#[derive(Clone, Debug)]
pub(crate) struct TokenCache {
    path: PathBuf,
}

impl TokenCache {
    /// Open the token cache for `account` in `dir`, creating `dir` if needed.
    pub(crate) fn new(dir: &Path, account: &str) -> Result<Self> {
        fs::create_dir_all(dir)
            .with_context(|| format!("could not create directory {}", dir.display()))?;
        Ok(Self {
            path: dir.join(format!("{}{}", account, TOKEN_FILE_SUFFIX)),
        })
    }

    /// The path of the canonical cache file.
    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    /// Load the cached token, if there is a usable one.
    ///
    /// A missing or unreadable cache is not an error. We just fetch a new
    /// token.
    pub(crate) fn load(&self) -> Option<CachedToken> {
        let data = match fs::read(&self.path) {
            Ok(data) => data,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                trace!("no cached token at {}", self.path.display());
                return None;
            }
            Err(err) => {
                warn!("could not read {}: {}", self.path.display(), err);
                return None;
            }
        };
        match serde_json::from_slice::<CachedToken>(&data) {
            Ok(token) => {
                debug!("loaded cached token from {}", self.path.display());
                Some(token)
            }
            Err(err) => {
                warn!("ignoring corrupt token cache {}: {}", self.path.display(), err);
                None
            }
        }
    }

    /// Atomically replace the cache file with `token`.
    pub(crate) fn store(&self, token: &CachedToken) -> Result<()> {
        self.store_with(token, |file, token| {
            let mut wtr = BufWriter::new(file);
            serde_json::to_writer(&mut wtr, token)?;
            wtr.flush()
        })
    }

    /// Write `token` to a temporary file using `write`, sync it, and rename it
    /// over the cache file.
    ///
    /// If anything fails, the temporary file is removed when `temp` is dropped
    /// and the existing cache file is left alone.
    fn store_with<F>(&self, token: &CachedToken, write: F) -> Result<()>
    where
        F: FnOnce(&mut File, &CachedToken) -> io::Result<()>,
    {
        let dir = self.path.parent().ok_or_else(|| {
            format_err!("cannot find parent directory of {}", self.path.display())
        })?;
        let file_name = self
            .path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| format_err!("invalid cache path {}", self.path.display()))?;

        // The temporary file must live in the same directory, or the rename
        // below would not be atomic.
        let mut temp = tempfile::Builder::new()
            .prefix(&format!(".{}.", file_name))
            .suffix(".tmp")
            .tempfile_in(dir)
            .with_context(|| format!("cannot create temporary file in {}", dir.display()))?;
        write(temp.as_file_mut(), token)
            .with_context(|| format!("error writing to {}", temp.path().display()))?;
        temp.as_file()
            .sync_all()
            .with_context(|| format!("error syncing {}", temp.path().display()))?;
        temp.persist(&self.path)
            .map_err(|err| err.error)
            .with_context(|| format!("cannot replace {}", self.path.display()))?;
        trace!("stored token in {}", self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn token(access_token: &str, expires_at: i64) -> CachedToken {
        CachedToken {
            access_token: access_token.to_owned(),
            token_type: "Bearer".to_owned(),
            expires_in: 3599,
            expires_at,
            extra: serde_json::Map::new(),
        }
    }

    fn dir_entries(dir: &Path) -> Vec<String> {
        let mut names = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect::<Vec<_>>();
        names.sort();
        names
    }

    #[test]
    fn cache_path_is_derived_from_account() {
        let dir = tempfile::tempdir().unwrap();
        let cache_dir = dir.path().join("ugcs");
        let cache = TokenCache::new(&cache_dir, "robot@example.com").unwrap();
        assert!(cache_dir.is_dir());
        assert_eq!(cache.path(), cache_dir.join("robot@example.com.token"));
    }

    #[test]
    fn missing_cache_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let cache = TokenCache::new(dir.path(), "robot@example.com").unwrap();
        assert_eq!(cache.load(), None);
    }

    #[test]
    fn corrupt_cache_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let cache = TokenCache::new(dir.path(), "robot@example.com").unwrap();
        for contents in [
            "",
            "{not json",
            r#"{"access_token":"a","token_type":"Bearer","expires_in":10}"#,
        ] {
            fs::write(cache.path(), contents).unwrap();
            assert_eq!(cache.load(), None, "{:?}", contents);
        }
    }

    #[test]
    fn store_then_load_keeps_extra_fields() {
        let dir = tempfile::tempdir().unwrap();
        let cache = TokenCache::new(dir.path(), "robot@example.com").unwrap();
        let mut stored = token("tok-1", 1_700_000_000);
        stored.extra.insert("scope".to_owned(), json!("devstorage"));
        cache.store(&stored).unwrap();

        assert_eq!(cache.load(), Some(stored));
        let raw: serde_json::Value =
            serde_json::from_slice(&fs::read(cache.path()).unwrap()).unwrap();
        assert_eq!(raw["expires_at"], json!(1_700_000_000));
        assert_eq!(raw["scope"], json!("devstorage"));
        assert_eq!(dir_entries(dir.path()), vec!["robot@example.com.token"]);
    }

    #[test]
    fn store_overwrites_previous_token() {
        let dir = tempfile::tempdir().unwrap();
        let cache = TokenCache::new(dir.path(), "robot@example.com").unwrap();
        cache.store(&token("old", 1)).unwrap();
        cache.store(&token("new", 2)).unwrap();
        assert_eq!(cache.load().unwrap().access_token, "new");
    }

    #[test]
    fn failed_store_keeps_previous_token() {
        let dir = tempfile::tempdir().unwrap();
        let cache = TokenCache::new(dir.path(), "robot@example.com").unwrap();
        cache.store(&token("old", 1_700_000_000)).unwrap();
        let before = fs::read(cache.path()).unwrap();

        let result = cache.store_with(&token("new", 1_800_000_000), |file, _| {
            file.write_all(b"{\"access_tok")?;
            Err(io::Error::new(io::ErrorKind::Other, "disk full"))
        });

        assert!(result.is_err());
        assert_eq!(fs::read(cache.path()).unwrap(), before);
        assert_eq!(cache.load().unwrap().access_token, "old");
        assert_eq!(dir_entries(dir.path()), vec!["robot@example.com.token"]);
    }

    #[test]
    fn refresh_margin_is_three_seconds() {
        let t = token("tok", 1_000);
        assert!(!t.needs_refresh(996));
        assert!(t.needs_refresh(997));
        assert!(t.needs_refresh(2_000));
        assert_eq!(t.authorization(), "Bearer tok");
    }

    #[test]
    fn debug_output_hides_access_token() {
        assert!(!format!("{:?}", token("s3cr3t", 0)).contains("s3cr3t"));
    }
}
