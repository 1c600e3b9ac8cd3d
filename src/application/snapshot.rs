//! Static-eligibility resolver.
//!
//! Decides whether a URL is served from (or written to) a page snapshot and
//! where that snapshot lives in storage.

use thiserror::Error;

use crate::domain::{RoutePattern, RoutePatternError, strip_query};

pub const SNAPSHOT_DIR: &str = "static";
const HOME_SLUG: &str = "home";

#[derive(Debug, Error)]
#[error("static route `{pattern}` is invalid: {source}")]
pub struct StaticRouteError {
    pattern: String,
    #[source]
    source: RoutePatternError,
}

/// Storage path of one page snapshot, e.g. `static/home.html`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SnapshotPath(String);

impl SnapshotPath {
    /// Derive the snapshot path for a URL. The query string is ignored.
    pub fn for_url(url: &str) -> Self {
        let path = strip_query(url);
        let path = path.strip_prefix('/').unwrap_or(path);
        let slug = path.trim_end_matches('/');
        let slug = if slug.is_empty() { HOME_SLUG } else { slug };
        Self(format!("{SNAPSHOT_DIR}/{slug}.html"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn parent(&self) -> &str {
        crate::application::storage::parent_dir(&self.0)
    }
}

impl std::fmt::Display for SnapshotPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Eligibility {
    Static(SnapshotPath),
    Dynamic,
}

impl Eligibility {
    pub fn snapshot_path(&self) -> Option<&SnapshotPath> {
        match self {
            Eligibility::Static(path) => Some(path),
            Eligibility::Dynamic => None,
        }
    }
}

/// The allow-list of routes whose output never varies per request.
#[derive(Debug, Clone)]
pub struct StaticRoutes {
    patterns: Vec<RoutePattern>,
}

impl StaticRoutes {
    pub fn new<I, S>(patterns: I) -> Result<Self, StaticRouteError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = patterns
            .into_iter()
            .map(|pattern| {
                let pattern = pattern.as_ref();
                RoutePattern::parse(pattern).map_err(|source| StaticRouteError {
                    pattern: pattern.to_string(),
                    source,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    pub fn classify(&self, url: &str) -> Eligibility {
        let path = strip_query(url);
        if self
            .patterns
            .iter()
            .any(|pattern| pattern.matches(path).is_some())
        {
            Eligibility::Static(SnapshotPath::for_url(path))
        } else {
            Eligibility::Dynamic
        }
    }

    /// Allow-listed routes without parameters, i.e. the ones a prerender
    /// pass can enumerate.
    pub fn literal_paths(&self) -> impl Iterator<Item = &str> {
        self.patterns
            .iter()
            .filter(|pattern| pattern.is_literal())
            .map(RoutePattern::as_str)
    }
}
