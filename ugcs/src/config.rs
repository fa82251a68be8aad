//! Configuration taken from the environment.
//!
//! `ugcs` has no configuration file. Everything it needs beyond the service
//! account key comes from a handful of environment variables and the
//! platform's standard directories.

use std::{env, ffi::OsString, path::PathBuf};

use crate::common::*;

/// The environment variable that overrides the platform cache directory.
pub const CACHE_HOME_VAR: &str = "XDG_CACHE_HOME";

/// The environment variable that points us at a storage emulator.
pub const STORAGE_EMULATOR_HOST_VAR: &str = "STORAGE_EMULATOR_HOST";

/// The environment variable that can supply `--service-account-file`.
pub const SERVICE_ACCOUNT_FILE_VAR: &str = "UGCS_SERVICE_ACCOUNT_FILE";

/// The subdirectory of the cache root where we keep our tokens.
const CACHE_SUBDIR: &str = "ugcs";

/// Find the root of the user's cache directory.
///
/// `$XDG_CACHE_HOME` wins if it is set and non-empty, even on platforms which
/// don't normally use it.
pub fn cache_root() -> Result<PathBuf> {
    // Use `var_os` instead of `var`, because if it returns a non-Unicode path,
    // we can hand it off directly to `PathBuf`.
    cache_root_from(env::var_os(CACHE_HOME_VAR))
        .or_else(dirs::cache_dir)
        // AFAIK, this only fails under weird conditions, such as no home
        // directory.
        .ok_or_else(|| format_err!("could not find user cache dir"))
}

/// Interpret the value of `$XDG_CACHE_HOME`, if any.
fn cache_root_from(value: Option<OsString>) -> Option<PathBuf> {
    value.filter(|v| !v.is_empty()).map(PathBuf::from)
}

/// The directory in which we store cached OAuth2 tokens.
pub fn token_cache_dir() -> Result<PathBuf> {
    Ok(cache_root()?.join(CACHE_SUBDIR))
}

/// The root URL of a storage emulator, if the user asked for one.
pub(crate) fn storage_emulator_host() -> Option<String> {
    env::var(STORAGE_EMULATOR_HOST_VAR)
        .ok()
        .map(|host| host.trim_end_matches('/').to_owned())
        .filter(|host| !host.is_empty())
}
