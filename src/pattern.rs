//! Compiled patterns and topic matching

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::BusError;
use crate::segment::{Arity, PatternSegment};

/// A named parameter's captured value
///
/// `single`/`optional`/`multi-string` arities capture a string; `multi-list`
/// captures a list of strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamValue {
    Single(String),
    Many(Vec<String>),
}

impl ParamValue {
    /// The captured string, if this value is a single string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::Single(s) => Some(s),
            ParamValue::Many(_) => None,
        }
    }

    /// The captured list, if this value is a list
    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            ParamValue::Many(v) => Some(v),
            ParamValue::Single(_) => None,
        }
    }
}

/// Result of matching a pattern against a candidate path
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MatchOutcome {
    /// The normalized candidate path
    pub path: String,
    /// Named parameter captures
    pub params: HashMap<String, ParamValue>,
    /// Anonymous wildcard captures, in order
    pub wildcards: Vec<String>,
    /// Whether the path matched
    pub matched: bool,
}

/// Lower-case, split on `/`, drop empty fragments, re-join with one leading `/`
pub fn normalize(path: &str) -> String {
    let lower = path.to_ascii_lowercase();
    let fragments: Vec<&str> = lower.split('/').map(str::trim).filter(|s| !s.is_empty()).collect();
    if fragments.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", fragments.join("/"))
    }
}

fn split_fragments(path: &str) -> Vec<String> {
    path.split('/')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Split an already-[`normalize`]d path into its lower-cased fragments
fn split_normalized(normalized: &str) -> Vec<String> {
    normalized
        .split('/')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// A compiled pattern: an ordered sequence of segment descriptors
#[derive(Debug, Clone)]
pub struct PathPattern {
    source: String,
    segments: Vec<PatternSegment>,
    is_root: bool,
}

fn is_greedy(segment: &PatternSegment) -> bool {
    matches!(segment.arity, Arity::MultiList | Arity::MultiString)
}

impl PathPattern {
    /// Compile a pattern. Fails on any `InvalidPattern` condition from the
    /// segment parser, on duplicate parameter names, or on a descriptor
    /// placed after a greedy (`**`/`+`) descriptor.
    pub fn new(pattern: &str) -> Result<Self, BusError> {
        let normalized = normalize(pattern);
        if normalized == "/" {
            return Ok(Self {
                source: normalized,
                segments: Vec::new(),
                is_root: true,
            });
        }

        let fragments = split_fragments(pattern);
        let mut segments = Vec::with_capacity(fragments.len());
        let mut seen_names: Vec<String> = Vec::new();
        let mut seen_greedy = false;

        for fragment in &fragments {
            if seen_greedy {
                return Err(BusError::invalid(
                    pattern,
                    "a segment appears after a greedy (** or +) descriptor and can never match",
                ));
            }
            let segment = PatternSegment::parse(pattern, fragment)?;
            if let Some(name) = &segment.name {
                if seen_names.iter().any(|seen| seen == name) {
                    return Err(BusError::invalid(
                        pattern,
                        format!("duplicate parameter name {name:?}"),
                    ));
                }
                seen_names.push(name.clone());
            }
            seen_greedy = is_greedy(&segment);
            segments.push(segment);
        }

        Ok(Self {
            source: normalized,
            segments,
            is_root: false,
        })
    }

    /// The normalized pattern text this was compiled from
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Match a candidate topic against this pattern
    pub fn match_path(&self, path: &str) -> MatchOutcome {
        let normalized = normalize(path);

        if self.is_root {
            return MatchOutcome {
                matched: normalized == "/",
                path: normalized,
                ..Default::default()
            };
        }

        let mut remaining = split_normalized(&normalized);
        let mut params = HashMap::new();
        let mut wildcards = Vec::new();

        for segment in &self.segments {
            match segment.match_segments(&remaining) {
                None => {
                    return MatchOutcome {
                        path: normalized,
                        ..Default::default()
                    };
                }
                Some(m) => {
                    if let Some(values) = m.param {
                        let name = segment.name.clone().unwrap_or_default();
                        let value = match segment.arity {
                            Arity::MultiList => ParamValue::Many(values),
                            _ => ParamValue::Single(values.into_iter().next().unwrap_or_default()),
                        };
                        params.insert(name, value);
                    }
                    if let Some(mut values) = m.wildcard {
                        wildcards.append(&mut values);
                    }
                    remaining = m.leftover.to_vec();
                }
            }
        }

        if !remaining.is_empty() {
            return MatchOutcome {
                path: normalized,
                ..Default::default()
            };
        }

        MatchOutcome {
            path: normalized,
            params,
            wildcards,
            matched: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_static_match() {
        let p = PathPattern::new("/some/path").unwrap();
        assert!(p.match_path("/some/path").matched);
        assert!(p.match_path("/some/path/").matched);
        assert!(!p.match_path("/some/other").matched);
    }

    #[test]
    fn named_param_with_class() {
        let p = PathPattern::new("/users/:id[a-z0-9]").unwrap();
        let m = p.match_path("/users/abc123");
        assert!(m.matched);
        assert_eq!(m.params["id"].as_str(), Some("abc123"));
        assert!(!p.match_path("/users/abc-123").matched);
    }

    #[test]
    fn greedy_wildcard_captures_list() {
        let p = PathPattern::new("/files/**").unwrap();
        let m = p.match_path("/files/a/b/c");
        assert!(m.matched);
        assert_eq!(m.wildcards, vec!["a", "b", "c"]);
        assert!(m.params.is_empty());
    }

    #[test]
    fn named_greedy_captures_list_param() {
        let p = PathPattern::new("/files/:path**").unwrap();
        let m = p.match_path("/files/a/b/c");
        assert!(m.matched);
        assert_eq!(
            m.params["path"].as_list(),
            Some(&["a".to_string(), "b".to_string(), "c".to_string()][..])
        );
        assert!(m.wildcards.is_empty());
    }

    #[test]
    fn multi_string_joins_and_case_folds() {
        let p = PathPattern::new("/search/:q+").unwrap();
        let m = p.match_path("/search/Deno/TypeScript/Go");
        assert!(m.matched);
        assert_eq!(m.params["q"].as_str(), Some("deno/typescript/go"));
    }

    #[test]
    fn rejects_duplicate_param_names() {
        assert!(PathPattern::new("/a/:x/:x").is_err());
    }

    #[test]
    fn rejects_segment_after_greedy() {
        assert!(PathPattern::new("/a/**/b").is_err());
        assert!(PathPattern::new("/a/:q+/b").is_err());
    }

    #[test]
    fn root_pattern_matches_only_root() {
        let p = PathPattern::new("/").unwrap();
        assert!(p.match_path("/").matched);
        assert!(p.match_path("//").matched);
        assert!(!p.match_path("/a").matched);
    }

    #[test]
    fn match_path_is_always_normalized() {
        let p = PathPattern::new("/a/:x").unwrap();
        let m = p.match_path("//A//B//");
        assert_eq!(m.path, "/a/b");
    }

    #[test]
    fn no_match_has_empty_captures() {
        let p = PathPattern::new("/a/:x").unwrap();
        let m = p.match_path("/b");
        assert!(!m.matched);
        assert!(m.params.is_empty());
        assert!(m.wildcards.is_empty());
    }

    #[test]
    fn optional_param_skips_without_matching_first() {
        let p = PathPattern::new("/a/:x[0-9]?/b").unwrap();
        let m = p.match_path("/a/b");
        assert!(m.matched);
        assert!(!m.params.contains_key("x"));
    }

    #[test]
    fn optional_param_without_class_always_consumes() {
        let p = PathPattern::new("/a/:x?/b").unwrap();
        assert!(!p.match_path("/a/b").matched);
        assert!(p.match_path("/a/c/b").matched);
    }
}
