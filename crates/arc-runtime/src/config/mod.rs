//! Configuration loading and resolution.

use std::path::PathBuf;
use std::time::Duration;

use url::Url;

use crate::types::{RuntimeError, RuntimeResult};

/// What the booter does with a resource whose fetch failed or timed out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum FailurePolicy {
    /// Leave the slot unresolved; it and everything queued behind it stall.
    #[default]
    Stall,
    /// Release the slot without injecting anything.
    Skip,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadPolicy {
    /// Per-fetch deadline. `None` waits indefinitely.
    pub timeout: Option<Duration>,
    pub on_failure: FailurePolicy,
    /// Append `?_time=<millis>` to every fetch.
    pub cache_bust: bool,
}

impl Default for LoadPolicy {
    fn default() -> Self {
        Self {
            timeout: None,
            on_failure: FailurePolicy::Stall,
            cache_bust: true,
        }
    }
}

/// Registry key for the site root, prefixed to the dispatch path.
pub const PATH_KEY: &str = "path";

/// Registry key for the dispatch path under the site root.
pub const PATH_AJAX_KEY: &str = "path_ajax";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MachineConfig {
    /// Dispatch URL. When unset, `path` + `path_ajax` from the registry.
    pub endpoint: Option<String>,
    pub timeout: Option<Duration>,
}

/// Resolve the cache store path.
pub fn resolve_store_path(explicit: Option<&str>) -> String {
    if let Some(path) = explicit {
        return path.to_string();
    }

    if let Ok(env_path) = std::env::var("ARC_STORE") {
        return env_path;
    }

    let cwd_store = PathBuf::from(".arc/store.arcs");
    if cwd_store.exists() {
        return cwd_store.display().to_string();
    }

    resolve_default_store_path()
}

fn resolve_default_store_path() -> String {
    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .unwrap_or_else(|_| ".".to_string());

    format!("{home}/.arc/store.arcs")
}

/// Resolve the base URL resource paths are joined onto.
///
/// A bare filesystem path is accepted and turned into a `file://` directory
/// URL. Falls back to the current directory.
pub fn resolve_base(explicit: Option<&str>) -> RuntimeResult<Url> {
    let raw = match explicit {
        Some(raw) => raw.to_string(),
        None => match std::env::var("ARC_BASE_URL") {
            Ok(raw) => raw,
            Err(_) => std::env::current_dir()?.display().to_string(),
        },
    };
    parse_base(&raw)
}

fn parse_base(raw: &str) -> RuntimeResult<Url> {
    if let Ok(url) = Url::parse(raw) {
        if url.cannot_be_a_base() {
            return Err(RuntimeError::Config(format!("Not a base URL: {raw}")));
        }
        return Ok(ensure_directory(url));
    }

    let path = std::path::absolute(raw)?;
    Url::from_directory_path(&path)
        .map_err(|_| RuntimeError::Config(format!("Not a directory path: {raw}")))
}

/// `join` drops the last segment unless the base ends with `/`.
fn ensure_directory(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

pub fn timeout_from_millis(millis: Option<u64>) -> Option<Duration> {
    millis.map(Duration::from_millis)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_store_path_wins() {
        assert_eq!(resolve_store_path(Some("/tmp/x.arcs")), "/tmp/x.arcs");
    }

    #[test]
    fn test_parse_base() {
        let http = parse_base("https://example.com/app").unwrap();
        assert_eq!(http.as_str(), "https://example.com/app/");

        let file = parse_base("/srv/site").unwrap();
        assert_eq!(file.scheme(), "file");
        assert!(file.path().ends_with("/srv/site/"));

        assert!(parse_base("mailto:a@b.c").is_err());
    }

    #[test]
    fn test_default_policy_is_stall_without_timeout() {
        let policy = LoadPolicy::default();
        assert_eq!(policy.on_failure, FailurePolicy::Stall);
        assert!(policy.timeout.is_none());
        assert!(policy.cache_bust);
    }
}
