//! Text bundles: many resources riding in one payload.
//!
//! Entries are introduced by `<!--<|NAME_EXT|>-->` and run until the next
//! delimiter. A name carrying `{variant}` only applies to that runtime
//! variant.

use std::sync::OnceLock;

use regex::Regex;

use crate::token::{cache_key, Token};
use crate::types::ArcResult;

/// Lazy name so that several delimiters on one line stay separate entries.
const DELIMITER_PATTERN: &str = r"<!--<\|([\x20-\x7E]+?)_([A-Za-z0-9]+)\|>-->";
const VARIANT_PATTERN: &str = r"\{([\x20-\x7E]*)\}";

fn delimiter_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(DELIMITER_PATTERN).expect("valid delimiter regex"))
}

fn variant_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(VARIANT_PATTERN).expect("valid variant regex"))
}

/// One resource embedded in a bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleEntry {
    /// Name as written in the delimiter, variant tag included.
    pub name: String,
    pub extension: String,
    /// The `{...}` tag inside the name, if any.
    pub variant: Option<String>,
    pub body: String,
}

impl BundleEntry {
    pub fn cache_key(&self) -> String {
        cache_key(&self.name, &self.extension)
    }

    /// Token for this entry; `parent_source` is the bundle's own path.
    pub fn token(&self, parent_source: &str) -> ArcResult<Token> {
        Token::embedded(&self.name, &self.extension, parent_source)
    }

    /// Untagged entries always apply; tagged entries only to their variant.
    pub fn applies_to(&self, runtime_variant: Option<&str>) -> bool {
        match &self.variant {
            None => true,
            Some(tag) => runtime_variant == Some(tag.as_str()),
        }
    }
}

/// Split a bundle into its entries. Text before the first delimiter is ignored.
pub fn parse_bundle(text: &str) -> Vec<BundleEntry> {
    let delimiters: Vec<_> = delimiter_regex().captures_iter(text).collect();
    let mut entries = Vec::with_capacity(delimiters.len());

    for (i, caps) in delimiters.iter().enumerate() {
        let whole = caps.get(0).map(|m| m.range()).unwrap_or_default();
        let body_end = delimiters
            .get(i + 1)
            .and_then(|next| next.get(0))
            .map(|m| m.start())
            .unwrap_or(text.len());

        let name = caps[1].to_string();
        let extension = caps[2].to_string();
        let variant = variant_regex()
            .captures(&name)
            .map(|v| v[1].to_string());

        entries.push(BundleEntry {
            name,
            extension,
            variant,
            body: text[whole.end..body_end].to_string(),
        });
    }

    entries
}

/// Entries that materialize for `runtime_variant`, in bundle order.
pub fn select<'a>(
    entries: &'a [BundleEntry],
    runtime_variant: Option<&'a str>,
) -> impl Iterator<Item = &'a BundleEntry> + 'a {
    entries
        .iter()
        .filter(move |entry| entry.applies_to(runtime_variant))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ContentType;

    const BLOB: &str = "preamble\n<!--<|header_htm|>-->\n<h1>Hi</h1>\n<!--<|{ff}theme_css|>-->\nbody{color:red}\n";

    #[test]
    fn test_split_into_entries() {
        let entries = parse_bundle(BLOB);
        assert_eq!(entries.len(), 2);

        assert_eq!(entries[0].name, "header");
        assert_eq!(entries[0].extension, "htm");
        assert_eq!(entries[0].variant, None);
        assert_eq!(entries[0].body, "\n<h1>Hi</h1>\n");
        assert_eq!(entries[0].cache_key(), "file_header_htm");

        assert_eq!(entries[1].name, "{ff}theme");
        assert_eq!(entries[1].variant.as_deref(), Some("ff"));
        assert_eq!(entries[1].body, "\nbody{color:red}\n");
        assert_eq!(entries[1].cache_key(), "file_{ff}theme_css");
    }

    #[test]
    fn test_variant_selection() {
        let entries = parse_bundle(BLOB);
        assert_eq!(select(&entries, Some("ch")).count(), 1);
        assert_eq!(select(&entries, None).count(), 1);
        assert_eq!(select(&entries, Some("ff")).count(), 2);
    }

    #[test]
    fn test_extension_is_last_underscore_segment() {
        let entries = parse_bundle("<!--<|nav_bar_js|>-->x()");
        assert_eq!(entries[0].name, "nav_bar");
        assert_eq!(entries[0].extension, "js");
        let token = entries[0].token("/blob.txt").unwrap();
        assert_eq!(token.content_type, ContentType::Script);
        assert_eq!(token.cache_key, "file_nav_bar_js");
    }

    #[test]
    fn test_delimiters_on_one_line() {
        let entries = parse_bundle("<!--<|intro_htm|>--><p>hi</p><!--<|{ff}fix_css|>-->a{}");
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].cache_key(), "file_intro_htm");
        assert_eq!(entries[0].body, "<p>hi</p>");
        assert_eq!(entries[1].variant.as_deref(), Some("ff"));
        assert_eq!(entries[1].body, "a{}");
    }

    #[test]
    fn test_no_delimiters() {
        assert!(parse_bundle("just text").is_empty());
        assert!(parse_bundle("").is_empty());
    }

    #[test]
    fn test_empty_trailing_body() {
        let entries = parse_bundle("<!--<|a_js|>-->");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].body, "");
    }
}
