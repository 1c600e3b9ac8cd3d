use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    extract::State,
    http::{HeaderValue, Method, StatusCode, Uri, header::CONTENT_TYPE},
    middleware,
    response::{IntoResponse, Response},
    routing::get,
};

use crate::application::{
    error::ErrorReport,
    intercept::Intercept,
    pipeline::{Outcome, StreamingPipeline},
    render::HtmlStream,
    storage::StoredFile,
};

use super::{
    middleware::{log_responses, set_request_context, set_server_header},
    static_files::{AssetIntercept, SNAPSHOT_CACHE_CONTROL, stored_file_response},
};

const HTML_CONTENT_TYPE: &str = "text/html; charset=utf-8";

#[derive(Clone)]
pub struct HttpState {
    pub pipeline: StreamingPipeline,
    pub intercept: Arc<dyn Intercept>,
}

impl HttpState {
    pub fn new(pipeline: StreamingPipeline) -> Self {
        Self {
            pipeline,
            intercept: Arc::new(AssetIntercept),
        }
    }

    pub fn with_intercept(mut self, intercept: Arc<dyn Intercept>) -> Self {
        self.intercept = intercept;
        self
    }
}

pub fn build_router(state: HttpState) -> Router {
    Router::new()
        .route("/_health/ready", get(readiness_health))
        .fallback(render_page)
        .with_state(state)
        .layer(middleware::map_response(set_server_header))
        .layer(middleware::from_fn(log_responses))
        .layer(middleware::from_fn(set_request_context))
}

async fn readiness_health(State(state): State<HttpState>) -> Response {
    if state.pipeline.gate().is_ready() {
        return StatusCode::NO_CONTENT.into_response();
    }

    let mut response = StatusCode::SERVICE_UNAVAILABLE.into_response();
    ErrorReport::from_message(
        "infra::http::public::readiness_health",
        StatusCode::SERVICE_UNAVAILABLE,
        "no application version has been published yet",
    )
    .attach(&mut response);
    response
}

async fn render_page(State(state): State<HttpState>, method: Method, uri: Uri) -> Response {
    if method != Method::GET && method != Method::HEAD {
        let mut response = StatusCode::METHOD_NOT_ALLOWED.into_response();
        ErrorReport::from_message(
            "infra::http::public::render_page",
            StatusCode::METHOD_NOT_ALLOWED,
            format!("{method} is not supported for rendered pages"),
        )
        .attach(&mut response);
        return response;
    }

    let version = state.pipeline.gate().await_ready().await;

    if let Some(response) = state.intercept.intercept(&version, uri.path()).await {
        return response;
    }

    let url = uri
        .path_and_query()
        .map_or_else(|| uri.path(), |value| value.as_str());

    match state.pipeline.respond(&version, url).await {
        Outcome::Rendered(stream) => html_stream_response(stream),
        Outcome::Snapshot { file, .. } => html_file_response(file),
        Outcome::StaticFile { path, file } => {
            stored_file_response(path.as_str(), file, SNAPSHOT_CACHE_CONTROL)
        }
    }
}

fn html_stream_response(stream: HtmlStream) -> Response {
    html_response(Body::from_stream(stream))
}

fn html_file_response(file: StoredFile) -> Response {
    html_response(Body::from_stream(file.body))
}

fn html_response(body: Body) -> Response {
    let mut response = Response::new(body);
    *response.status_mut() = StatusCode::OK;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(HTML_CONTENT_TYPE));
    response
}
