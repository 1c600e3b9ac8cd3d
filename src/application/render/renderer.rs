//! Bundle renderer: compiles a bundle once and streams pages from it.

use std::{collections::HashMap, sync::Arc};

use async_stream::stream;
use bytes::Bytes;
use serde_json::{Map, Value};

use crate::{
    cache::{FragmentCache, FragmentCacheConfig},
    domain::{
        Bundle, BundleError, Expr, PageTemplate, RouteMatch, RoutePattern, Segment,
        escape_html_into, strip_query,
    },
};

use super::types::{HtmlStream, RenderError, RenderRequest, Renderer};

/// Construction options shared by every renderer built in this process.
#[derive(Debug, Clone)]
pub struct RendererOptions {
    pub template: PageTemplate,
    pub fragment_cache: FragmentCacheConfig,
}

/// Build a renderer bound to one bundle.
///
/// All validation happens here: a renderer that constructs successfully can
/// only fail at render time on data that depends on the request.
pub fn create_renderer(
    bundle: Bundle,
    options: &RendererOptions,
) -> Result<BundleRenderer, BundleError> {
    let compiled = Compiled::build(&bundle, options)?;
    Ok(BundleRenderer {
        bundle: Arc::new(bundle),
        compiled: Arc::new(compiled),
    })
}

/// A renderer for one [`Bundle`]. Cheap to clone; clones share the fragment cache.
#[derive(Clone)]
pub struct BundleRenderer {
    bundle: Arc<Bundle>,
    compiled: Arc<Compiled>,
}

impl BundleRenderer {
    pub fn fragment_cache(&self) -> &FragmentCache {
        &self.compiled.cache
    }
}

impl std::fmt::Debug for BundleRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BundleRenderer")
            .field("entry", &self.bundle.server.entry)
            .field("components", &self.compiled.components.len())
            .field("routes", &self.compiled.routes.len())
            .finish()
    }
}

impl Renderer for BundleRenderer {
    fn render_to_stream(&self, request: RenderRequest) -> HtmlStream {
        let compiled = Arc::clone(&self.compiled);

        Box::pin(stream! {
            let scope = compiled.scope(&request);
            yield Ok(Bytes::from(compiled.render_shell(&compiled.head, &request)));

            let mut walk = Walk::new(&compiled, &scope, compiled.entry);
            while let Some(chunk) = walk.next_chunk() {
                match chunk {
                    Ok(html) => yield Ok(Bytes::from(html)),
                    Err(err) => {
                        yield Err(err);
                        return;
                    }
                }
                tokio::task::yield_now().await;
            }

            yield Ok(Bytes::from(compiled.render_shell(&compiled.tail, &request)));
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Field {
    Url,
    Title,
    Param(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Node {
    Text(String),
    Field(Field),
    Component(usize),
    Outlet,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum ShellNode {
    Text(String),
    Url,
    Title,
    Styles,
    Scripts,
    ResourceHints,
}

struct CompiledComponent {
    name: String,
    nodes: Vec<Node>,
    cache_key: Option<Vec<Field>>,
}

struct CompiledRoute {
    pattern: RoutePattern,
    component: usize,
}

struct Compiled {
    components: Vec<CompiledComponent>,
    entry: usize,
    routes: Vec<CompiledRoute>,
    fallback: Option<usize>,
    head: Vec<ShellNode>,
    tail: Vec<ShellNode>,
    styles: String,
    scripts: String,
    resource_hints: String,
    cache: FragmentCache,
}

/// Request-scoped data resolved once before the walk starts.
struct Scope<'a> {
    request: &'a RenderRequest,
    route: Option<(&'a CompiledRoute, RouteMatch)>,
    outlet: Option<usize>,
}

impl Compiled {
    fn build(bundle: &Bundle, options: &RendererOptions) -> Result<Self, BundleError> {
        let server = &bundle.server;
        let index: HashMap<&str, usize> = server
            .components
            .keys()
            .enumerate()
            .map(|(position, name)| (name.as_str(), position))
            .collect();

        let mut components = Vec::with_capacity(server.components.len());
        for (name, spec) in &server.components {
            let segments =
                crate::domain::compile(&spec.template).map_err(|source| BundleError::Template {
                    component: name.clone(),
                    source,
                })?;
            let nodes = segments
                .into_iter()
                .map(|segment| component_node(name, segment, &index))
                .collect::<Result<Vec<_>, _>>()?;
            let cache_key = spec
                .cache_key
                .as_ref()
                .map(|fields| {
                    fields
                        .iter()
                        .map(|field| cache_key_field(name, field))
                        .collect::<Result<Vec<_>, _>>()
                })
                .transpose()?;
            components.push(CompiledComponent {
                name: name.clone(),
                nodes,
                cache_key,
            });
        }

        let entry = *index
            .get(server.entry.as_str())
            .ok_or_else(|| BundleError::MissingEntry(server.entry.clone()))?;

        let mut routes = Vec::with_capacity(server.routes.len());
        for route in &server.routes {
            let pattern = RoutePattern::parse(&route.path)?;
            let component = *index.get(route.component.as_str()).ok_or_else(|| {
                BundleError::UnknownRouteComponent {
                    path: route.path.clone(),
                    component: route.component.clone(),
                }
            })?;
            routes.push(CompiledRoute { pattern, component });
        }

        let fallback = server
            .fallback
            .as_ref()
            .map(|name| {
                index
                    .get(name.as_str())
                    .copied()
                    .ok_or_else(|| BundleError::UnknownFallback(name.clone()))
            })
            .transpose()?;

        let head = shell_nodes(&options.template.head)?;
        let tail = shell_nodes(&options.template.tail)?;

        let compiled = Self {
            components,
            entry,
            routes,
            fallback,
            head,
            tail,
            styles: render_styles(bundle),
            scripts: render_scripts(bundle),
            resource_hints: render_resource_hints(bundle),
            cache: FragmentCache::new(&options.fragment_cache),
        };
        compiled.ensure_acyclic()?;
        Ok(compiled)
    }

    /// Reject include graphs that could recurse forever. An outlet is an edge
    /// to every routed component and the fallback.
    fn ensure_acyclic(&self) -> Result<(), BundleError> {
        #[derive(Clone, Copy, PartialEq, Eq)]
        enum Mark {
            Unvisited,
            Active,
            Done,
        }

        let outlet_targets: Vec<usize> = self
            .routes
            .iter()
            .map(|route| route.component)
            .chain(self.fallback)
            .collect();

        let mut marks = vec![Mark::Unvisited; self.components.len()];
        let mut stack: Vec<(usize, Vec<usize>)> = Vec::new();

        let edges = |component: &CompiledComponent| -> Vec<usize> {
            let mut targets = Vec::new();
            for node in &component.nodes {
                match node {
                    Node::Component(target) => targets.push(*target),
                    Node::Outlet => targets.extend(outlet_targets.iter().copied()),
                    Node::Text(_) | Node::Field(_) => {}
                }
            }
            targets
        };

        for root in 0..self.components.len() {
            if marks[root] != Mark::Unvisited {
                continue;
            }
            marks[root] = Mark::Active;
            stack.push((root, edges(&self.components[root])));

            while let Some((current, pending)) = stack.last_mut() {
                let current = *current;
                match pending.pop() {
                    Some(next) => match marks[next] {
                        Mark::Active => {
                            return Err(BundleError::Cycle(self.components[next].name.clone()));
                        }
                        Mark::Unvisited => {
                            marks[next] = Mark::Active;
                            stack.push((next, edges(&self.components[next])));
                        }
                        Mark::Done => {}
                    },
                    None => {
                        marks[current] = Mark::Done;
                        stack.pop();
                    }
                }
            }
        }

        Ok(())
    }

    fn scope<'a>(&'a self, request: &'a RenderRequest) -> Scope<'a> {
        let path = strip_query(&request.url);
        let route = self
            .routes
            .iter()
            .find_map(|route| route.pattern.matches(path).map(|matched| (route, matched)));
        let outlet = route
            .as_ref()
            .map(|(route, _)| route.component)
            .or(self.fallback);
        Scope {
            request,
            route,
            outlet,
        }
    }

    fn render_shell(&self, nodes: &[ShellNode], request: &RenderRequest) -> String {
        let mut out = String::new();
        for node in nodes {
            match node {
                ShellNode::Text(text) => out.push_str(text),
                ShellNode::Url => escape_html_into(&mut out, &request.url),
                ShellNode::Title => escape_html_into(&mut out, &request.title),
                ShellNode::Styles => out.push_str(&self.styles),
                ShellNode::Scripts => out.push_str(&self.scripts),
                ShellNode::ResourceHints => out.push_str(&self.resource_hints),
            }
        }
        out
    }

    fn fragment_key(&self, component: &CompiledComponent, fields: &[Field], scope: &Scope<'_>) -> String {
        let mut values = Map::new();
        for field in fields {
            let (name, value) = match field {
                Field::Url => ("url".to_string(), Value::from(scope.request.url.as_str())),
                Field::Title => ("title".to_string(), Value::from(scope.request.title.as_str())),
                Field::Param(param) => (
                    format!("params.{param}"),
                    scope
                        .route
                        .as_ref()
                        .and_then(|(_, matched)| matched.params.get(param))
                        .map_or(Value::Null, |value| Value::from(value.as_str())),
                ),
            };
            values.insert(name, value);
        }
        format!("{}|{}", component.name, Value::Object(values))
    }
}

fn component_node(
    component: &str,
    segment: Segment,
    index: &HashMap<&str, usize>,
) -> Result<Node, BundleError> {
    let node = match segment {
        Segment::Text(text) => Node::Text(text),
        Segment::Value(Expr::Url) => Node::Field(Field::Url),
        Segment::Value(Expr::Title) => Node::Field(Field::Title),
        Segment::Value(Expr::Param(name)) => Node::Field(Field::Param(name)),
        Segment::Value(expr @ (Expr::Styles | Expr::Scripts | Expr::ResourceHints)) => {
            return Err(BundleError::ShellOnlyExpression {
                component: component.to_string(),
                expr: expr_name(&expr).to_string(),
            });
        }
        Segment::Include(target) => match index.get(target.as_str()) {
            Some(position) => Node::Component(*position),
            None => {
                return Err(BundleError::UnknownComponent {
                    component: component.to_string(),
                    target,
                });
            }
        },
        Segment::Outlet => Node::Outlet,
    };
    Ok(node)
}

fn cache_key_field(component: &str, field: &str) -> Result<Field, BundleError> {
    match field {
        "url" => Ok(Field::Url),
        "title" => Ok(Field::Title),
        other => match other.strip_prefix("params.") {
            Some(name) if !name.is_empty() => Ok(Field::Param(name.to_string())),
            _ => Err(BundleError::UnknownCacheKeyField {
                component: component.to_string(),
                field: field.to_string(),
            }),
        },
    }
}

fn shell_nodes(segments: &[Segment]) -> Result<Vec<ShellNode>, BundleError> {
    segments
        .iter()
        .map(|segment| {
            let node = match segment {
                Segment::Text(text) => ShellNode::Text(text.clone()),
                Segment::Value(Expr::Url) => ShellNode::Url,
                Segment::Value(Expr::Title) => ShellNode::Title,
                Segment::Value(Expr::Styles) => ShellNode::Styles,
                Segment::Value(Expr::Scripts) => ShellNode::Scripts,
                Segment::Value(Expr::ResourceHints) => ShellNode::ResourceHints,
                Segment::Value(Expr::Param(name)) => {
                    return Err(shell_error(format!("params.{name}")));
                }
                Segment::Include(name) => return Err(shell_error(format!("> {name}"))),
                Segment::Outlet => return Err(shell_error("outlet".to_string())),
            };
            Ok(node)
        })
        .collect()
}

fn shell_error(expr: String) -> BundleError {
    BundleError::PageTemplate(crate::domain::TemplateError::Unknown { expr })
}

fn expr_name(expr: &Expr) -> &'static str {
    match expr {
        Expr::Url => "url",
        Expr::Title => "title",
        Expr::Param(_) => "params",
        Expr::Styles => "styles",
        Expr::Scripts => "scripts",
        Expr::ResourceHints => "resource_hints",
    }
}

fn render_styles(bundle: &Bundle) -> String {
    let mut out = String::new();
    for file in bundle.manifest.initial_styles() {
        out.push_str(r#"<link rel="stylesheet" href=""#);
        escape_html_into(&mut out, &bundle.manifest.asset_url(file));
        out.push_str(r#"">"#);
    }
    out
}

fn render_scripts(bundle: &Bundle) -> String {
    let mut out = String::new();
    for file in bundle.manifest.initial_scripts() {
        out.push_str(r#"<script src=""#);
        escape_html_into(&mut out, &bundle.manifest.asset_url(file));
        out.push_str(r#"" defer></script>"#);
    }
    out
}

fn render_resource_hints(bundle: &Bundle) -> String {
    let mut out = String::new();
    for file in bundle.manifest.initial_scripts() {
        out.push_str(r#"<link rel="preload" href=""#);
        escape_html_into(&mut out, &bundle.manifest.asset_url(file));
        out.push_str(r#"" as="script">"#);
    }
    for file in &bundle.manifest.async_chunks {
        out.push_str(r#"<link rel="prefetch" href=""#);
        escape_html_into(&mut out, &bundle.manifest.asset_url(file));
        out.push_str(r#"">"#);
    }
    out
}

struct Frame<'a> {
    component: &'a CompiledComponent,
    position: usize,
}

/// Depth-first walk over the component tree that yields markup in chunks.
///
/// A chunk is flushed whenever the walk descends into a non-cached
/// component, so the shell and outer markup reach the client before inner
/// components finish. Cached components are emitted inline.
struct Walk<'a> {
    compiled: &'a Compiled,
    scope: &'a Scope<'a>,
    stack: Vec<Frame<'a>>,
}

impl<'a> Walk<'a> {
    fn new(compiled: &'a Compiled, scope: &'a Scope<'a>, root: usize) -> Self {
        Self {
            compiled,
            scope,
            stack: vec![Frame {
                component: &compiled.components[root],
                position: 0,
            }],
        }
    }

    fn next_chunk(&mut self) -> Option<Result<String, RenderError>> {
        let mut buf = String::new();

        loop {
            let Some(frame) = self.stack.last_mut() else {
                return (!buf.is_empty()).then_some(Ok(buf));
            };
            let component = frame.component;
            let Some(node) = component.nodes.get(frame.position) else {
                self.stack.pop();
                continue;
            };
            frame.position += 1;

            let target = match node {
                Node::Text(text) => {
                    buf.push_str(text);
                    continue;
                }
                Node::Field(field) => {
                    if let Err(err) = self.push_field(&mut buf, component, field) {
                        return Some(Err(err));
                    }
                    continue;
                }
                Node::Component(target) => *target,
                Node::Outlet => match self.scope.outlet {
                    Some(target) => target,
                    None => continue,
                },
            };

            let child = &self.compiled.components[target];
            match &child.cache_key {
                Some(fields) => match self.cached_fragment(child, fields) {
                    Ok(html) => buf.push_str(&html),
                    Err(err) => return Some(Err(err)),
                },
                None => {
                    self.stack.push(Frame {
                        component: child,
                        position: 0,
                    });
                    if !buf.is_empty() {
                        return Some(Ok(buf));
                    }
                }
            }
        }
    }

    fn push_field(
        &self,
        buf: &mut String,
        component: &CompiledComponent,
        field: &Field,
    ) -> Result<(), RenderError> {
        match field {
            Field::Url => escape_html_into(buf, &self.scope.request.url),
            Field::Title => escape_html_into(buf, &self.scope.request.title),
            Field::Param(name) => {
                let Some((route, matched)) = &self.scope.route else {
                    return Err(RenderError::NoRoute {
                        component: component.name.clone(),
                        name: name.clone(),
                    });
                };
                let Some(value) = matched.params.get(name) else {
                    return Err(RenderError::MissingParam {
                        component: component.name.clone(),
                        name: name.clone(),
                        route: route.pattern.to_string(),
                    });
                };
                escape_html_into(buf, value);
            }
        }
        Ok(())
    }

    fn cached_fragment(
        &self,
        component: &'a CompiledComponent,
        fields: &[Field],
    ) -> Result<Arc<str>, RenderError> {
        let key = self.compiled.fragment_key(component, fields, self.scope);
        if let Some(html) = self.compiled.cache.get(&key) {
            return Ok(html);
        }

        let mut inner = Walk {
            compiled: self.compiled,
            scope: self.scope,
            stack: vec![Frame {
                component,
                position: 0,
            }],
        };
        let mut html = String::new();
        while let Some(chunk) = inner.next_chunk() {
            html.push_str(&chunk?);
        }

        let html: Arc<str> = Arc::from(html);
        self.compiled.cache.insert(key, Arc::clone(&html));
        Ok(html)
    }
}
