//! Path patterns shared by the application router and the static allow-list.
//!
//! A pattern is a `/`-separated list of literal segments and `:name`
//! parameters. Matching is non-strict: one trailing slash is ignored and
//! literals compare case-insensitively. Parameters never bind `.` or `..`
//! so a captured value can be embedded in a storage path.

use std::collections::BTreeMap;
use std::fmt;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RoutePatternError {
    #[error("route pattern `{0}` must start with `/`")]
    MissingLeadingSlash(String),
    #[error("route pattern `{pattern}` has an unnamed parameter")]
    UnnamedParameter { pattern: String },
    #[error("route pattern `{pattern}` binds `{name}` more than once")]
    DuplicateParameter { pattern: String, name: String },
    #[error("route pattern `{0}` contains an empty segment")]
    EmptySegment(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum PatternSegment {
    Literal(String),
    Param(String),
}

/// A compiled route pattern such as `/` or `/album/:id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutePattern {
    source: String,
    segments: Vec<PatternSegment>,
}

/// Parameters captured by a successful match, keyed by name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteMatch {
    pub params: BTreeMap<String, String>,
}

impl RoutePattern {
    pub fn parse(source: &str) -> Result<Self, RoutePatternError> {
        let Some(rest) = source.strip_prefix('/') else {
            return Err(RoutePatternError::MissingLeadingSlash(source.to_string()));
        };

        let mut segments = Vec::new();
        let trimmed = rest.strip_suffix('/').unwrap_or(rest);
        if !trimmed.is_empty() {
            for raw in trimmed.split('/') {
                if raw.is_empty() {
                    return Err(RoutePatternError::EmptySegment(source.to_string()));
                }
                match raw.strip_prefix(':') {
                    Some("") => {
                        return Err(RoutePatternError::UnnamedParameter {
                            pattern: source.to_string(),
                        });
                    }
                    Some(name) => {
                        let duplicate = segments.iter().any(
                            |segment| matches!(segment, PatternSegment::Param(existing) if existing == name),
                        );
                        if duplicate {
                            return Err(RoutePatternError::DuplicateParameter {
                                pattern: source.to_string(),
                                name: name.to_string(),
                            });
                        }
                        segments.push(PatternSegment::Param(name.to_string()));
                    }
                    None => segments.push(PatternSegment::Literal(raw.to_ascii_lowercase())),
                }
            }
        }

        Ok(Self {
            source: source.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// True when the pattern has no parameters and so names exactly one path.
    pub fn is_literal(&self) -> bool {
        self.segments
            .iter()
            .all(|segment| matches!(segment, PatternSegment::Literal(_)))
    }

    /// Match a request path. Any query string must already be stripped.
    pub fn matches(&self, path: &str) -> Option<RouteMatch> {
        let rest = path.strip_prefix('/')?;
        let rest = rest.strip_suffix('/').unwrap_or(rest);

        let parts: Vec<&str> = if rest.is_empty() {
            Vec::new()
        } else {
            rest.split('/').collect()
        };

        if parts.len() != self.segments.len() {
            return None;
        }

        let mut matched = RouteMatch::default();
        for (segment, part) in self.segments.iter().zip(parts) {
            match segment {
                PatternSegment::Literal(literal) => {
                    if !literal.eq_ignore_ascii_case(part) {
                        return None;
                    }
                }
                PatternSegment::Param(name) => {
                    if part.is_empty() || part == "." || part == ".." {
                        return None;
                    }
                    matched.params.insert(name.clone(), part.to_string());
                }
            }
        }

        Some(matched)
    }
}

impl fmt::Display for RoutePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// Return the path portion of a request target.
pub fn strip_query(url: &str) -> &str {
    url.split(['?', '#']).next().unwrap_or_default()
}
