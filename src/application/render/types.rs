use std::pin::Pin;

use bytes::Bytes;
use futures::Stream;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Per-request render input. Built once at request entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderRequest {
    pub url: String,
    pub title: String,
}

impl RenderRequest {
    pub fn new(url: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
        }
    }
}

/// Failures surfaced on a render stream after it has started.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RenderError {
    #[error("component `{component}` reads `params.{name}`, which route `{route}` does not bind")]
    MissingParam {
        component: String,
        name: String,
        route: String,
    },
    #[error("component `{component}` reads `params.{name}` but no route matched")]
    NoRoute { component: String, name: String },
}

/// Incremental HTML output. Items arrive in render order.
pub type HtmlStream = Pin<Box<dyn Stream<Item = Result<Bytes, RenderError>> + Send>>;

/// A renderer bound to one bundle.
pub trait Renderer: Send + Sync {
    fn render_to_stream(&self, request: RenderRequest) -> HtmlStream;
}
