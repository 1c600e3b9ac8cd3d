#![allow(dead_code)]

use std::sync::Arc;

use bytes::Bytes;
use futures::StreamExt;
use streamsnap::{
    application::{
        pipeline::{RunMode, StreamingPipeline},
        readiness::ReadinessGate,
        render::{BundleRenderer, HtmlStream, RenderError, RendererOptions, create_renderer},
        snapshot::StaticRoutes,
        storage::{StorageBackend, StoredFile},
    },
    cache::FragmentCacheConfig,
    domain::{Bundle, PageTemplate},
};

pub const SHELL: &str = "<!DOCTYPE html><html><head><title>{{ title }}</title>{{ resource_hints }}{{ styles }}</head><body><!--ssr-outlet-->{{ scripts }}</body></html>";

pub const MANIFEST: &str = r#"{
    "publicPath": "/",
    "all": ["app.3f2a.js", "app.3f2a.css", "0.9c1d.js"],
    "initial": ["app.3f2a.js", "app.3f2a.css"],
    "async": ["0.9c1d.js"]
}"#;

pub fn server_bundle(marker: &str) -> String {
    format!(
        r#"{{
        "entry": "app",
        "components": {{
            "app": {{ "template": "<div id=\"app\" data-build=\"{marker}\">{{{{> tab }}}}{{{{ outlet }}}}</div>" }},
            "tab": {{ "template": "<nav>{{{{ title }}}}</nav>", "cache_key": ["title"] }},
            "recommend": {{ "template": "<section class=\"recommend\">{{{{> slider }}}}<ul><li>{marker}</li></ul></section>" }},
            "slider": {{ "template": "<div class=\"slider\">hot</div>" }},
            "all": {{ "template": "<section class=\"all\"><p>{{{{ url }}}}</p></section>" }},
            "album": {{ "template": "<section class=\"album\">{{{{ params.id }}}}</section>" }},
            "broken": {{ "template": "<section>{{{{ params.missing }}}}</section>" }},
            "not-found": {{ "template": "<section>not found</section>" }}
        }},
        "routes": [
            {{ "path": "/", "component": "recommend" }},
            {{ "path": "/all", "component": "all" }},
            {{ "path": "/album/:id", "component": "album" }},
            {{ "path": "/broken", "component": "broken" }}
        ],
        "fallback": "not-found"
    }}"#
    )
}

pub fn renderer_for(marker: &str) -> Arc<BundleRenderer> {
    let bundle = Bundle::from_json(server_bundle(marker).as_bytes(), MANIFEST.as_bytes())
        .expect("fixture bundle should parse");
    let options = RendererOptions {
        template: PageTemplate::parse(SHELL).expect("fixture shell should parse"),
        fragment_cache: FragmentCacheConfig::default(),
    };
    Arc::new(create_renderer(bundle, &options).expect("fixture bundle should validate"))
}

pub fn renderer() -> Arc<BundleRenderer> {
    renderer_for("v1")
}

pub fn pipeline(gate: ReadinessGate, mode: RunMode) -> StreamingPipeline {
    pipeline_with_routes(gate, mode, &["/", "/all"])
}

pub fn pipeline_with_routes(
    gate: ReadinessGate,
    mode: RunMode,
    routes: &[&str],
) -> StreamingPipeline {
    StreamingPipeline::new(
        gate,
        StaticRoutes::new(routes).expect("fixture routes"),
        mode,
        "Vue Music",
    )
}

pub fn ready_gate(storage: Arc<dyn StorageBackend>) -> ReadinessGate {
    ReadinessGate::ready(renderer(), storage)
}

pub async fn collect(stream: HtmlStream) -> Vec<Result<Bytes, RenderError>> {
    stream.collect().await
}

pub async fn collect_html(stream: HtmlStream) -> (usize, String) {
    let items = collect(stream).await;
    let count = items.len();
    let html = items
        .into_iter()
        .map(|item| {
            let bytes = item.expect("render chunk should be ok");
            String::from_utf8(bytes.to_vec()).expect("utf8 chunk")
        })
        .collect();
    (count, html)
}

pub async fn read_file(file: StoredFile) -> String {
    let mut body = file.body;
    let mut out = Vec::new();
    while let Some(chunk) = body.next().await {
        out.extend_from_slice(&chunk.expect("stored chunk"));
    }
    String::from_utf8(out).expect("utf8 file")
}

pub async fn read_stored(storage: &dyn StorageBackend, path: &str) -> String {
    read_file(storage.read_stream(path).await.expect("stored file should open")).await
}
