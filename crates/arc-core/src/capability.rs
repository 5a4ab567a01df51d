//! Browser capability gate and runtime variant detection.
//!
//! The detected variant tag selects `{variant}` entries in text bundles; the
//! minimum versions decide whether booting is allowed at all.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Browser family detected from a user agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Variant {
    #[serde(rename = "ie")]
    InternetExplorer,
    #[serde(rename = "ch")]
    Chrome,
    #[serde(rename = "sa")]
    Safari,
    #[serde(rename = "ff")]
    Firefox,
}

impl Variant {
    /// Short tag used in bundle names, e.g. `{ch}theme_css`.
    pub fn tag(&self) -> &'static str {
        match self {
            Variant::InternetExplorer => "ie",
            Variant::Chrome => "ch",
            Variant::Safari => "sa",
            Variant::Firefox => "ff",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Variant::InternetExplorer => "Internet Explorer",
            Variant::Chrome => "Chrome",
            Variant::Safari => "Safari",
            Variant::Firefox => "Firefox",
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Minimum accepted version per browser family.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MinVersions {
    #[serde(rename = "In", alias = "ie")]
    pub internet_explorer: f64,
    #[serde(rename = "Ch", alias = "ch")]
    pub chrome: f64,
    #[serde(rename = "Sa", alias = "sa")]
    pub safari: f64,
    #[serde(rename = "Fi", alias = "ff")]
    pub firefox: f64,
}

impl Default for MinVersions {
    fn default() -> Self {
        Self {
            internet_explorer: 9.0,
            chrome: 4.0,
            safari: 5.0,
            firefox: 4.0,
        }
    }
}

impl MinVersions {
    fn for_variant(&self, variant: Variant) -> f64 {
        match variant {
            Variant::InternetExplorer => self.internet_explorer,
            Variant::Chrome => self.chrome,
            Variant::Safari => self.safari,
            Variant::Firefox => self.firefox,
        }
    }
}

/// Result of checking a user agent against the minimum versions.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Validation {
    pub variant: Option<Variant>,
    pub version: Option<f64>,
    pub passed: bool,
}

impl Validation {
    /// Notice shown when the browser is rejected.
    pub fn notice(&self) -> String {
        let name = self.variant.map(|v| v.display_name()).unwrap_or("unknown");
        let version = self
            .version
            .map(|v| v.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        format!("You are running {name} {version}.")
    }
}

fn version_regex(pattern: &'static str, slot: &'static OnceLock<Regex>) -> &'static Regex {
    slot.get_or_init(|| Regex::new(pattern).expect("valid user agent regex"))
}

fn capture_version(re: &Regex, user_agent: &str) -> Option<f64> {
    re.captures(user_agent)
        .and_then(|caps| caps[1].parse::<f64>().ok())
}

/// Detect the browser family and check it against `min`.
///
/// Families are probed in a fixed order (IE, Chrome, Safari, Firefox); Chrome
/// user agents also mention Safari, so the order matters.
pub fn validate(user_agent: &str, min: &MinVersions) -> Validation {
    static MSIE: OnceLock<Regex> = OnceLock::new();
    static CHROME: OnceLock<Regex> = OnceLock::new();
    static SAFARI: OnceLock<Regex> = OnceLock::new();
    static FIREFOX: OnceLock<Regex> = OnceLock::new();

    let msie = version_regex(r"MSIE (\d+\.\d+);", &MSIE);
    let chrome = version_regex(r"Chrome[/\s](\d+\.\d+)", &CHROME);
    let safari = version_regex(r"Version[/\s](\d+\.\d+)", &SAFARI);
    let firefox = version_regex(r"Firefox[/\s](\d+\.\d+)", &FIREFOX);

    let (variant, version) = if msie.is_match(user_agent) {
        (Some(Variant::InternetExplorer), capture_version(msie, user_agent))
    } else if chrome.is_match(user_agent) {
        (Some(Variant::Chrome), capture_version(chrome, user_agent))
    } else if user_agent.contains("Safari") {
        (Some(Variant::Safari), capture_version(safari, user_agent))
    } else if firefox.is_match(user_agent) {
        (Some(Variant::Firefox), capture_version(firefox, user_agent))
    } else {
        (None, None)
    };

    let passed = match (variant, version) {
        (Some(v), Some(found)) => found >= min.for_variant(v),
        _ => false,
    };

    Validation {
        variant,
        version,
        passed,
    }
}
