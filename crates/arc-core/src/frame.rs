//! Two-segment response framing: `|D|<debug>|A|<data>` or `|A|<data>`.

use crate::types::{ArcError, ArcResult};

/// Marks the data segment.
pub const DATA_MARKER: &str = "|A|";

/// Marks an embedded debug segment ahead of the data segment.
pub const DEBUG_MARKER: &str = "|D|";

/// A demultiplexed response body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame<'a> {
    /// Server debug output, if the response carried any.
    pub debug: Option<&'a str>,
    /// Everything after the data marker.
    pub data: &'a str,
}

/// Split a response body into its debug and data segments.
///
/// The debug segment runs up to the *last* data marker in the body.
pub fn parse_frame(body: &str) -> ArcResult<Frame<'_>> {
    let (debug, rest) = match body.strip_prefix(DEBUG_MARKER) {
        Some(after) => match after.rfind(DATA_MARKER) {
            Some(end) => (Some(&after[..end]), &after[end..]),
            None => return Err(protocol_violation(body)),
        },
        None => (None, body),
    };

    match rest.strip_prefix(DATA_MARKER) {
        Some(data) => Ok(Frame { debug, data }),
        None => Err(protocol_violation(body)),
    }
}

/// Frame a data segment, with an optional debug segment in front.
pub fn frame_data(debug: Option<&str>, data: &str) -> String {
    match debug {
        Some(debug) => format!("{DEBUG_MARKER}{debug}{DATA_MARKER}{data}"),
        None => format!("{DATA_MARKER}{data}"),
    }
}

fn protocol_violation(body: &str) -> ArcError {
    ArcError::Protocol {
        raw: body.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_only() {
        let frame = parse_frame(r#"|A|{"model":"m"}"#).unwrap();
        assert_eq!(frame.debug, None);
        assert_eq!(frame.data, r#"{"model":"m"}"#);
    }

    #[test]
    fn test_debug_then_data() {
        let frame = parse_frame(r#"|D|hello|A|{"model":"m"}"#).unwrap();
        assert_eq!(frame.debug, Some("hello"));
        assert_eq!(frame.data, r#"{"model":"m"}"#);
    }

    #[test]
    fn test_multiline_debug() {
        let frame = parse_frame("|D|line one\nline two\n|A|{}").unwrap();
        assert_eq!(frame.debug, Some("line one\nline two\n"));
        assert_eq!(frame.data, "{}");
    }

    #[test]
    fn test_debug_runs_to_last_marker() {
        let frame = parse_frame("|D|a|A|b|A|{}").unwrap();
        assert_eq!(frame.debug, Some("a|A|b"));
        assert_eq!(frame.data, "{}");
    }

    #[test]
    fn test_violations_carry_raw_payload() {
        for raw in ["{}", "", "|X|{}", "|D|no data marker", " |A|{}"] {
            match parse_frame(raw) {
                Err(ArcError::Protocol { raw: carried }) => assert_eq!(carried, raw),
                other => panic!("expected protocol violation for {raw:?}, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_frame_data_matches_parser() {
        let framed = frame_data(Some("trace"), "[]");
        assert_eq!(framed, "|D|trace|A|[]");
        let frame = parse_frame(&framed).unwrap();
        assert_eq!((frame.debug, frame.data), (Some("trace"), "[]"));
    }
}
