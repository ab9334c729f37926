//! Pattern segment parsing and matching
//!
//! One [`PatternSegment`] is produced per `/`-delimited fragment of a
//! pattern. Parsing classifies the fragment (static / param / wildcard),
//! matching consumes a prefix of the remaining path segments against it.

use std::sync::Arc;

use regex::Regex;

use crate::error::BusError;

/// Number of path segments a param or wildcard descriptor may consume
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    /// Exactly one segment
    Single,
    /// Zero or one segment
    Optional,
    /// One or more segments, joined with `/` into a single string
    MultiString,
    /// One or more segments, kept as a list
    MultiList,
}

/// What a parsed segment represents
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SegmentKind {
    /// An exact, literal segment
    Static,
    /// A named parameter (`:name`)
    Param,
    /// An anonymous wildcard (`*`, `**`, `+`, `?`, or a bare character class)
    Wildcard,
}

/// A single compiled descriptor of one pattern segment
#[derive(Debug, Clone)]
pub struct PatternSegment {
    pub kind: SegmentKind,
    pub name: Option<String>,
    char_class: Option<Arc<Regex>>,
    pub arity: Arity,
    pub raw: Option<String>,
}

/// Outcome of matching one [`PatternSegment`] against a prefix of path segments
pub struct SegmentMatch<'a> {
    /// Path segments left after this descriptor consumed its prefix
    pub leftover: &'a [String],
    /// Capture, if this descriptor has a name (`param`)
    pub param: Option<Vec<String>>,
    /// Capture, if this descriptor is anonymous (`wildcard`)
    pub wildcard: Option<Vec<String>>,
}

fn arity_from_suffix(suffix: &str) -> Option<Arity> {
    match suffix {
        "" => Some(Arity::Single),
        "*" => Some(Arity::Single),
        "**" => Some(Arity::MultiList),
        "+" => Some(Arity::MultiString),
        "?" => Some(Arity::Optional),
        _ => None,
    }
}

fn compile_class(pattern: &str, class: &str) -> Result<Regex, BusError> {
    let body = format!(r"(?i)^[{class}]+$");
    Regex::new(&body).map_err(|e| {
        BusError::invalid(pattern, format!("bad character class [{class}]: {e}"))
    })
}

impl PatternSegment {
    /// Parse the text of one `/`-delimited fragment of a pattern
    ///
    /// `pattern` is the whole pattern text, retained only to produce
    /// descriptive errors.
    pub fn parse(pattern: &str, fragment: &str) -> Result<Self, BusError> {
        if fragment.is_empty() {
            return Err(BusError::invalid(pattern, "empty segment"));
        }

        if let Some(rest) = fragment.strip_prefix(':') {
            return Self::parse_param(pattern, rest);
        }

        if let Some(stripped) = fragment
            .strip_prefix("**")
            .or_else(|| fragment.strip_prefix('*'))
            .or_else(|| fragment.strip_prefix('+'))
            .or_else(|| fragment.strip_prefix('?'))
        {
            let leading_len = fragment.len() - stripped.len();
            let leading = &fragment[..leading_len];
            if stripped.is_empty() {
                let arity = arity_from_suffix(leading)
                    .ok_or_else(|| BusError::invalid(pattern, format!("unknown modifier {leading:?}")))?;
                return Ok(Self {
                    kind: SegmentKind::Wildcard,
                    name: None,
                    char_class: None,
                    arity,
                    raw: None,
                });
            }
            return Self::parse_wildcard_with_leading(pattern, leading, stripped);
        }

        if fragment.starts_with('[') {
            return Self::parse_bracket_first_wildcard(pattern, fragment);
        }

        Ok(Self {
            kind: SegmentKind::Static,
            name: None,
            char_class: None,
            arity: Arity::Single,
            raw: Some(fragment.to_ascii_lowercase()),
        })
    }

    fn parse_param(pattern: &str, rest: &str) -> Result<Self, BusError> {
        let name_len = rest
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .unwrap_or(rest.len());
        let name = &rest[..name_len];
        if name.is_empty() {
            return Err(BusError::invalid(pattern, "empty parameter name"));
        }

        let mut tail = &rest[name_len..];
        let char_class = if let Some(after_bracket) = tail.strip_prefix('[') {
            let end = after_bracket
                .find(']')
                .ok_or_else(|| BusError::invalid(pattern, "unterminated character class"))?;
            let class = &after_bracket[..end];
            tail = &after_bracket[end + 1..];
            Some(Arc::new(compile_class(pattern, class)?))
        } else {
            None
        };

        let arity = arity_from_suffix(tail)
            .ok_or_else(|| BusError::invalid(pattern, format!("unknown suffix {tail:?}")))?;

        Ok(Self {
            kind: SegmentKind::Param,
            name: Some(name.to_string()),
            char_class,
            arity,
            raw: None,
        })
    }

    fn parse_wildcard_with_leading(
        pattern: &str,
        leading: &str,
        rest: &str,
    ) -> Result<Self, BusError> {
        let mut leading_arity = arity_from_suffix(leading)
            .ok_or_else(|| BusError::invalid(pattern, format!("unknown modifier {leading:?}")))?;

        let after_bracket = rest
            .strip_prefix('[')
            .ok_or_else(|| BusError::invalid(pattern, format!("unexpected trailer {rest:?}")))?;
        let end = after_bracket
            .find(']')
            .ok_or_else(|| BusError::invalid(pattern, "unterminated character class"))?;
        let class = &after_bracket[..end];
        let suffix = &after_bracket[end + 1..];

        if !suffix.is_empty() {
            leading_arity = arity_from_suffix(suffix)
                .ok_or_else(|| BusError::invalid(pattern, format!("unknown suffix {suffix:?}")))?;
        }

        Ok(Self {
            kind: SegmentKind::Wildcard,
            name: None,
            char_class: Some(Arc::new(compile_class(pattern, class)?)),
            arity: leading_arity,
            raw: None,
        })
    }

    fn parse_bracket_first_wildcard(pattern: &str, fragment: &str) -> Result<Self, BusError> {
        let after_bracket = &fragment[1..];
        let end = after_bracket
            .find(']')
            .ok_or_else(|| BusError::invalid(pattern, "unterminated character class"))?;
        let class = &after_bracket[..end];
        let suffix = &after_bracket[end + 1..];
        let arity = arity_from_suffix(suffix)
            .ok_or_else(|| BusError::invalid(pattern, format!("unknown suffix {suffix:?}")))?;

        Ok(Self {
            kind: SegmentKind::Wildcard,
            name: None,
            char_class: Some(Arc::new(compile_class(pattern, class)?)),
            arity,
            raw: None,
        })
    }

    fn class_matches(&self, candidate: &str) -> bool {
        match &self.char_class {
            Some(re) => !candidate.is_empty() && re.is_match(candidate),
            None => true,
        }
    }

    /// Match this descriptor against a prefix of `remaining` path segments
    ///
    /// Returns `None` on no-match. On the optional arity with no segments
    /// left, succeeds with no capture and an unchanged `remaining` slice.
    pub fn match_segments<'a>(&self, remaining: &'a [String]) -> Option<SegmentMatch<'a>> {
        match self.kind {
            SegmentKind::Static => {
                let (first, rest) = remaining.split_first()?;
                if first == self.raw.as_deref().unwrap_or_default() {
                    Some(SegmentMatch {
                        leftover: rest,
                        param: None,
                        wildcard: None,
                    })
                } else {
                    None
                }
            }
            SegmentKind::Param | SegmentKind::Wildcard => self.match_capturing(remaining),
        }
    }

    fn match_capturing<'a>(&self, remaining: &'a [String]) -> Option<SegmentMatch<'a>> {
        match self.arity {
            Arity::Single => {
                let (first, rest) = remaining.split_first()?;
                if !self.class_matches(first) {
                    return None;
                }
                Some(self.wrap_capture(vec![first.clone()], rest))
            }
            Arity::Optional => {
                let Some((first, rest)) = remaining.split_first() else {
                    return Some(SegmentMatch {
                        leftover: remaining,
                        param: None,
                        wildcard: None,
                    });
                };
                if !self.class_matches(first) {
                    return Some(SegmentMatch {
                        leftover: remaining,
                        param: None,
                        wildcard: None,
                    });
                }
                Some(self.wrap_capture(vec![first.clone()], rest))
            }
            Arity::MultiList => {
                if remaining.is_empty() {
                    return None;
                }
                if !remaining.iter().all(|s| self.class_matches(s)) {
                    return None;
                }
                Some(self.wrap_capture(remaining.to_vec(), &remaining[remaining.len()..]))
            }
            Arity::MultiString => {
                if remaining.is_empty() {
                    return None;
                }
                if !remaining.iter().all(|s| self.class_matches(s)) {
                    return None;
                }
                let joined = remaining.join("/");
                Some(self.wrap_capture(vec![joined], &remaining[remaining.len()..]))
            }
        }
    }

    fn wrap_capture<'a>(&self, values: Vec<String>, leftover: &'a [String]) -> SegmentMatch<'a> {
        match self.kind {
            SegmentKind::Param => SegmentMatch {
                leftover,
                param: Some(values),
                wildcard: None,
            },
            _ => SegmentMatch {
                leftover,
                param: None,
                wildcard: Some(values),
            },
        }
    }
}
