use std::fmt;

use crate::id::{SegmentId, TraceId};

/// Name of the trace propagation header, lowercase.
pub const TRACE_HEADER: &str = "x-amzn-trace-id";

const HEADER_ROOT_KEY: &str = "Root";
const HEADER_PARENT_KEY: &str = "Parent";
const HEADER_SAMPLED_KEY: &str = "Sampled";

const SAMPLED: &str = "1";
const NOT_SAMPLED: &str = "0";
const REQUESTED_SAMPLE_DECISION: &str = "?";

/// Upstream sampling directive carried by the trace header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SamplingDirective {
    /// The upstream service sampled this trace.
    Sampled,
    /// The upstream service decided against sampling.
    NotSampled,
    /// The upstream service defers the decision and asks to be told the outcome.
    Requested,
}

/// Parsed representation of an incoming trace propagation header.
///
/// The header value is a `;`-separated list of `Key=Value` pairs, e.g.
/// `Root=1-58406520-a006649127e371903a2de979;Parent=4c721bf33e3caf8f;Sampled=1`.
/// Parsing is tolerant: an absent or malformed header yields no propagated
/// context rather than an error.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TraceHeader {
    /// Propagated trace identifier.
    pub root: Option<TraceId>,
    /// Identifier of the upstream segment.
    pub parent: Option<SegmentId>,
    /// Upstream sampling directive, if one was supplied.
    pub sampled: Option<SamplingDirective>,
}

impl TraceHeader {
    /// Parses a trace header value.
    ///
    /// A header without a valid `Root` carries no usable context and parses as
    /// the empty header. A garbage `Parent` is dropped while a valid `Root` is
    /// kept, and unrecognized keys or `Sampled` values are ignored.
    pub fn parse(value: &str) -> TraceHeader {
        let mut header = TraceHeader::default();

        for (key, value) in value.trim().split_terminator(';').filter_map(key_value_pair) {
            if key.eq_ignore_ascii_case(HEADER_ROOT_KEY) {
                match value.parse::<TraceId>() {
                    Ok(root) => header.root = Some(root),
                    Err(_) => return TraceHeader::default(),
                }
            } else if key.eq_ignore_ascii_case(HEADER_PARENT_KEY) {
                header.parent = value.parse::<SegmentId>().ok();
            } else if key.eq_ignore_ascii_case(HEADER_SAMPLED_KEY) {
                header.sampled = match value {
                    SAMPLED => Some(SamplingDirective::Sampled),
                    NOT_SAMPLED => Some(SamplingDirective::NotSampled),
                    REQUESTED_SAMPLE_DECISION => Some(SamplingDirective::Requested),
                    _ => None,
                };
            }
        }

        if header.root.is_none() {
            return TraceHeader::default();
        }
        header
    }

    /// Returns `true` when no propagated context was supplied.
    pub fn is_empty(&self) -> bool {
        self.root.is_none() && self.parent.is_none() && self.sampled.is_none()
    }
}

impl fmt::Display for TraceHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut separate = false;
        if let Some(root) = &self.root {
            write!(f, "{HEADER_ROOT_KEY}={root}")?;
            separate = true;
        }
        if let Some(parent) = &self.parent {
            if separate {
                f.write_str(";")?;
            }
            write!(f, "{HEADER_PARENT_KEY}={parent}")?;
            separate = true;
        }
        if let Some(sampled) = &self.sampled {
            if separate {
                f.write_str(";")?;
            }
            let decision = match sampled {
                SamplingDirective::Sampled => SAMPLED,
                SamplingDirective::NotSampled => NOT_SAMPLED,
                SamplingDirective::Requested => REQUESTED_SAMPLE_DECISION,
            };
            write!(f, "{HEADER_SAMPLED_KEY}={decision}")?;
        }
        Ok(())
    }
}

fn key_value_pair(pair: &str) -> Option<(&str, &str)> {
    pair.find('=').map(|index| {
        let (key, value) = pair.split_at(index);
        (key.trim(), value.trim_start_matches('=').trim())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[rustfmt::skip]
    fn parse_test_data() -> Vec<(&'static str, TraceHeader)> {
        let root: TraceId = "1-58406520-a006649127e371903a2de979".parse().unwrap();
        let parent: SegmentId = "4c721bf33e3caf8f".parse().unwrap();
        vec![
            ("", TraceHeader::default()),
            ("Sampled=1;Self=foo", TraceHeader::default()),
            ("Root=1-bogus-bad", TraceHeader::default()),
            ("Root=1-too-many-parts-here", TraceHeader::default()),
            ("Parent=4c721bf33e3caf8f", TraceHeader::default()),
            ("Root=1-58406520-a006649127e371903a2de979;Parent=garbage", TraceHeader { root: Some(root), parent: None, sampled: None }),
            ("Root=1-58406520-a006649127e371903a2de979;Sampled=1", TraceHeader { root: Some(root), parent: None, sampled: Some(SamplingDirective::Sampled) }),
            ("Root=1-58406520-a006649127e371903a2de979;Parent=4c721bf33e3caf8f;Sampled=0", TraceHeader { root: Some(root), parent: Some(parent), sampled: Some(SamplingDirective::NotSampled) }),
            ("Root=1-58406520-a006649127e371903a2de979;Parent=4c721bf33e3caf8f;Sampled=1", TraceHeader { root: Some(root), parent: Some(parent), sampled: Some(SamplingDirective::Sampled) }),
            ("Root=1-58406520-a006649127e371903a2de979;Parent=4c721bf33e3caf8f", TraceHeader { root: Some(root), parent: Some(parent), sampled: None }),
            ("Root=1-58406520-a006649127e371903a2de979;Parent=4c721bf33e3caf8f;Sampled=?", TraceHeader { root: Some(root), parent: Some(parent), sampled: Some(SamplingDirective::Requested) }),
            ("Root=1-58406520-a006649127e371903a2de979;Sampled=garbage", TraceHeader { root: Some(root), parent: None, sampled: None }),
            ("root=1-58406520-a006649127e371903a2de979; parent=4c721bf33e3caf8f; sampled=1", TraceHeader { root: Some(root), parent: Some(parent), sampled: Some(SamplingDirective::Sampled) }),
        ]
    }

    #[test]
    fn parse() {
        for (value, expected) in parse_test_data() {
            assert_eq!(TraceHeader::parse(value), expected, "parsing {value:?}");
        }
        assert!(TraceHeader::parse("Root=1-bogus-bad;Sampled=1").is_empty());
        assert!(!TraceHeader::parse("Root=1-58406520-a006649127e371903a2de979").is_empty());
    }

    #[test]
    fn serialize() {
        let root: TraceId = "1-58406520-a006649127e371903a2de979".parse().unwrap();
        let parent: SegmentId = "4c721bf33e3caf8f".parse().unwrap();

        let header = TraceHeader {
            root: Some(root),
            parent: Some(parent),
            sampled: Some(SamplingDirective::NotSampled),
        };
        assert_eq!(
            header.to_string(),
            "Root=1-58406520-a006649127e371903a2de979;Parent=4c721bf33e3caf8f;Sampled=0"
        );

        let header = TraceHeader {
            root: Some(root),
            parent: None,
            sampled: Some(SamplingDirective::Sampled),
        };
        assert_eq!(
            header.to_string(),
            "Root=1-58406520-a006649127e371903a2de979;Sampled=1"
        );

        assert_eq!(TraceHeader::default().to_string(), "");
    }

    #[test]
    fn serialized_headers_parse_back() {
        for (_, header) in parse_test_data() {
            let rendered = header.to_string();
            assert_eq!(TraceHeader::parse(&rendered), header, "re-parsing {rendered:?}");
        }
    }
}
