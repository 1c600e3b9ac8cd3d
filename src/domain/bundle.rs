//! Compiled application artifacts produced by the external build.
//!
//! A [`Bundle`] pairs the server bundle (component markup and routes) with
//! the client manifest (hashed asset names) from the same build. The pair is
//! always replaced as a unit.

use std::collections::BTreeMap;

use serde::Deserialize;
use thiserror::Error;

use super::{route::RoutePatternError, template::TemplateError};

pub const SERVER_BUNDLE_FILE: &str = "ssr-server-bundle.json";
pub const CLIENT_MANIFEST_FILE: &str = "ssr-client-manifest.json";

#[derive(Debug, Error)]
pub enum BundleError {
    #[error("server bundle is not valid JSON: {0}")]
    ServerBundle(#[source] serde_json::Error),
    #[error("client manifest is not valid JSON: {0}")]
    ClientManifest(#[source] serde_json::Error),
    #[error("entry component `{0}` is not defined")]
    MissingEntry(String),
    #[error("component `{component}` references unknown component `{target}`")]
    UnknownComponent { component: String, target: String },
    #[error("route `{path}` renders unknown component `{component}`")]
    UnknownRouteComponent { path: String, component: String },
    #[error("fallback component `{0}` is not defined")]
    UnknownFallback(String),
    #[error("invalid route: {0}")]
    Route(#[from] RoutePatternError),
    #[error("component `{component}` has an invalid template: {source}")]
    Template {
        component: String,
        #[source]
        source: TemplateError,
    },
    #[error("component `{component}` uses `{expr}`, which is only valid in the page template")]
    ShellOnlyExpression { component: String, expr: String },
    #[error("component `{component}` declares unknown cache key field `{field}`")]
    UnknownCacheKeyField { component: String, field: String },
    #[error("component include cycle through `{0}`")]
    Cycle(String),
    #[error("page template has an invalid expression: {0}")]
    PageTemplate(#[source] TemplateError),
    #[error("page template must contain exactly one `<!--ssr-outlet-->` marker, found {0}")]
    PageOutlet(usize),
}

/// A single component of the server bundle.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ComponentSpec {
    pub template: String,
    /// Context fields the rendered fragment depends on. Present means cacheable.
    #[serde(default)]
    pub cache_key: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct RouteSpec {
    pub path: String,
    pub component: String,
}

/// Server half of a build: component markup plus the application route table.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ServerBundle {
    pub entry: String,
    pub components: BTreeMap<String, ComponentSpec>,
    #[serde(default)]
    pub routes: Vec<RouteSpec>,
    #[serde(default)]
    pub fallback: Option<String>,
}

/// Client half of a build: public asset names emitted by the bundler.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientManifest {
    pub public_path: String,
    pub all: Vec<String>,
    pub initial: Vec<String>,
    #[serde(rename = "async")]
    pub async_chunks: Vec<String>,
}

impl ClientManifest {
    pub fn asset_url(&self, file: &str) -> String {
        let base = if self.public_path.is_empty() {
            "/"
        } else {
            self.public_path.as_str()
        };
        if base.ends_with('/') {
            format!("{base}{file}")
        } else {
            format!("{base}/{file}")
        }
    }

    pub fn initial_styles(&self) -> impl Iterator<Item = &str> {
        self.initial
            .iter()
            .map(String::as_str)
            .filter(|file| file.ends_with(".css"))
    }

    pub fn initial_scripts(&self) -> impl Iterator<Item = &str> {
        self.initial
            .iter()
            .map(String::as_str)
            .filter(|file| file.ends_with(".js"))
    }
}

/// One compiled version of the application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bundle {
    pub server: ServerBundle,
    pub manifest: ClientManifest,
}

impl Bundle {
    pub fn new(server: ServerBundle, manifest: ClientManifest) -> Self {
        Self { server, manifest }
    }

    pub fn from_json(server: &[u8], manifest: &[u8]) -> Result<Self, BundleError> {
        let server = serde_json::from_slice(server).map_err(BundleError::ServerBundle)?;
        let manifest = serde_json::from_slice(manifest).map_err(BundleError::ClientManifest)?;
        Ok(Self { server, manifest })
    }
}
