//! Renderer factory and the streaming render contract.
//!
//! A renderer is built once per bundle version. Construction validates the
//! bundle and the page template together; rendering only produces
//! request-dependent errors, which end the stream instead of failing up front.

mod renderer;
mod types;

pub use renderer::{BundleRenderer, RendererOptions, create_renderer};
pub use types::{HtmlStream, RenderError, RenderRequest, Renderer};
