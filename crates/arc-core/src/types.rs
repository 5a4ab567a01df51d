//! Core data types shared by the booter and the pipe machine.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

/// What a resource materializes as, derived from its file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Text,
    Html,
    Script,
    Style,
    Icon,
    Image,
}

impl ContentType {
    /// Map a file extension onto a content type.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "txt" => Some(ContentType::Text),
            "htm" => Some(ContentType::Html),
            "js" => Some(ContentType::Script),
            "css" => Some(ContentType::Style),
            "ico" => Some(ContentType::Icon),
            "png" => Some(ContentType::Image),
            _ => None,
        }
    }

    /// The extension this content type is recognized by.
    pub fn extension(&self) -> &'static str {
        match self {
            ContentType::Text => "txt",
            ContentType::Html => "htm",
            ContentType::Script => "js",
            ContentType::Style => "css",
            ContentType::Icon => "ico",
            ContentType::Image => "png",
        }
    }

    pub fn mime(&self) -> &'static str {
        match self {
            ContentType::Text => "text/plain",
            ContentType::Html => "text/html",
            ContentType::Script => "text/javascript",
            ContentType::Style => "text/css",
            ContentType::Icon => "image/x-icon",
            ContentType::Image => "image/png",
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ContentType::Text => "text",
            ContentType::Html => "html",
            ContentType::Script => "script",
            ContentType::Style => "style",
            ContentType::Icon => "icon",
            ContentType::Image => "image",
        };
        f.write_str(name)
    }
}

/// Version stamp of a resource manifest.
///
/// Manifests declare either a number or an RFC 3339 timestamp; the latter is
/// stored as epoch milliseconds so both forms compare on one axis. Only
/// finite values are accepted, which makes the ordering total.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(transparent)]
pub struct Version(pub f64);

impl Version {
    pub fn new(value: f64) -> ArcResult<Self> {
        if value.is_finite() {
            Ok(Version(value))
        } else {
            Err(ArcError::InvalidVersion(format!("{value} is not finite")))
        }
    }

    pub fn parse(raw: &str) -> ArcResult<Self> {
        raw.parse()
    }
}

impl From<u64> for Version {
    fn from(n: u64) -> Self {
        Version(n as f64)
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        // +0.0 so that -0.0 and 0.0 compare equal under total_cmp.
        (self.0 + 0.0).total_cmp(&(other.0 + 0.0))
    }
}

impl FromStr for Version {
    type Err = ArcError;

    fn from_str(raw: &str) -> ArcResult<Self> {
        let trimmed = raw.trim();
        if let Ok(n) = trimmed.parse::<f64>() {
            return Version::new(n);
        }

        let stamp = chrono::DateTime::parse_from_rfc3339(trimmed)
            .map_err(|e| ArcError::InvalidVersion(format!("{trimmed}: {e}")))?;
        Ok(Version(stamp.timestamp_millis() as f64))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawVersion {
            Number(f64),
            Text(String),
        }

        match RawVersion::deserialize(deserializer)? {
            RawVersion::Number(n) => Version::new(n).map_err(serde::de::Error::custom),
            RawVersion::Text(s) => s.parse().map_err(serde::de::Error::custom),
        }
    }
}

/// Rejections raised by the ordered completion queue.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    #[error("Identity already pending: {0}")]
    Duplicate(String),

    #[error("Unknown identity: {0}")]
    Unknown(String),

    #[error("Identity already completed: {0}")]
    AlreadyCompleted(String),
}

/// Errors that can occur in the core library.
#[derive(thiserror::Error, Debug)]
pub enum ArcError {
    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Unknown extension '{ext}' in {path}")]
    UnknownExtension { path: String, ext: String },

    #[error("Protocol violation: <No 'A' or 'D'> {raw}")]
    Protocol { raw: String },

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Invalid pipe: {0}")]
    InvalidPipe(String),

    #[error("Invalid manifest: {0}")]
    InvalidManifest(String),

    #[error("Invalid version: {0}")]
    InvalidVersion(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience result type.
pub type ArcResult<T> = Result<T, ArcError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_table() {
        assert_eq!(ContentType::from_extension("js"), Some(ContentType::Script));
        assert_eq!(ContentType::from_extension("htm"), Some(ContentType::Html));
        assert_eq!(ContentType::from_extension("html"), None);
        assert_eq!(ContentType::from_extension("JS"), None);
        for ct in [
            ContentType::Text,
            ContentType::Html,
            ContentType::Script,
            ContentType::Style,
            ContentType::Icon,
            ContentType::Image,
        ] {
            assert_eq!(ContentType::from_extension(ct.extension()), Some(ct));
        }
    }

    #[test]
    fn test_version_forms() {
        assert_eq!(Version::parse("42").unwrap(), Version(42.0));
        assert_eq!(
            Version::parse("1970-01-01T00:00:01Z").unwrap(),
            Version(1000.0)
        );
        assert!(Version::parse("yesterday").is_err());
        assert!(Version::parse("inf").is_err());
        assert!(Version::parse("NaN").is_err());

        let v: Version = serde_json::from_str("7").unwrap();
        assert_eq!(v, Version::from(7));
        let v: Version = serde_json::from_str("\"2024-01-01T00:00:00Z\"").unwrap();
        assert!(v > Version(7.0));
    }

    #[test]
    fn test_fractional_versions_order_numerically() {
        let v: Version = serde_json::from_str("1.5").unwrap();
        assert!(v > Version(1.2));
        assert!(Version(1.2) < v);
        assert_eq!(Version(-0.0), Version(0.0));
        assert_eq!(v.to_string(), "1.5");
        assert_eq!(Version(2.0).to_string(), "2");
        assert_eq!(Version::parse(&v.to_string()).unwrap(), v);
    }
}
