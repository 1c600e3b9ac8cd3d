//! Build artifacts and the pure rules applied to them.

pub mod bundle;
pub mod route;
pub mod template;

pub use bundle::{
    Bundle, BundleError, CLIENT_MANIFEST_FILE, ClientManifest, ComponentSpec, RouteSpec,
    SERVER_BUNDLE_FILE, ServerBundle,
};
pub use route::{RouteMatch, RoutePattern, RoutePatternError, strip_query};
pub use template::{
    Expr, OUTLET_MARKER, PageTemplate, Segment, TEMPLATE_FILE, TemplateError, compile,
    escape_html_into,
};
