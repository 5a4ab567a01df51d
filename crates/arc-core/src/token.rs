//! Resource tokens: the stable identity of a path in a manifest.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::types::{ArcError, ArcResult, ContentType};

/// Prefix shared by every cache key.
pub const CACHE_KEY_PREFIX: &str = "file_";

/// `[//|/]dir/.../name.ext` with an ASCII word class.
const PATH_PATTERN: &str = r"^(//|/)?([A-Za-z0-9_/.]*)/([A-Za-z0-9_.]+)\.([A-Za-z0-9_]+)$";

/// Query parameter appended to fetch URLs to defeat intermediary caches.
pub const CACHE_BUST_PARAM: &str = "_time";

fn path_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(PATH_PATTERN).expect("valid path regex"))
}

/// Parsed identity of a loadable resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Token {
    /// Storage slot, `file_<name>_<ext>`. Independent of the directory.
    pub cache_key: String,
    pub content_type: ContentType,
    /// The path as it appeared in the manifest (or the enclosing bundle's path).
    pub raw_source: String,
}

/// Outcome of parsing a manifest path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Parsed {
    /// A local resource (`dir/name.ext` or `/dir/name.ext`).
    Local(Token),
    /// A `//host/...` reference. Not loaded; callers treat it as a no-op.
    NotImplemented { source: String },
}

impl Token {
    /// Parse a manifest path into a token.
    pub fn parse(path: &str) -> ArcResult<Parsed> {
        let caps = path_regex()
            .captures(path)
            .ok_or_else(|| ArcError::Parse(format!("Malformed resource path: {path}")))?;

        if caps.get(1).is_some_and(|m| m.as_str() == "//") {
            return Ok(Parsed::NotImplemented {
                source: path.to_string(),
            });
        }

        let name = &caps[3];
        let ext = &caps[4];
        let content_type =
            ContentType::from_extension(ext).ok_or_else(|| ArcError::UnknownExtension {
                path: path.to_string(),
                ext: ext.to_string(),
            })?;

        Ok(Parsed::Local(Token {
            cache_key: cache_key(name, ext),
            content_type,
            raw_source: path.to_string(),
        }))
    }

    /// Build the token of an entry embedded in a text bundle.
    pub fn embedded(name: &str, ext: &str, parent_source: &str) -> ArcResult<Token> {
        let content_type =
            ContentType::from_extension(ext).ok_or_else(|| ArcError::UnknownExtension {
                path: format!("{parent_source}#{name}"),
                ext: ext.to_string(),
            })?;

        Ok(Token {
            cache_key: cache_key(name, ext),
            content_type,
            raw_source: parent_source.to_string(),
        })
    }

    /// The fetch location of this token, optionally with the cache-busting query.
    pub fn fetch_path(&self, bust_at: Option<i64>) -> String {
        match bust_at {
            Some(millis) => format!("{}?{CACHE_BUST_PARAM}={millis}", self.raw_source),
            None => self.raw_source.clone(),
        }
    }
}

/// Cache key for a base name and extension.
pub fn cache_key(name: &str, ext: &str) -> String {
    format!("{CACHE_KEY_PREFIX}{name}_{ext}")
}
