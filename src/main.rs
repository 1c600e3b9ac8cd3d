use std::{future::IntoFuture, process, sync::Arc};

use streamsnap::{
    application::{
        error::AppError,
        pipeline::{RunMode, StreamingPipeline},
        prerender::prerender_static_routes,
        readiness::ReadinessGate,
        snapshot::StaticRoutes,
        storage::StorageBackend,
    },
    cache::FragmentCacheConfig,
    config,
    infra::{
        artifacts::{ArtifactPaths, load_build},
        dev::DevWatcher,
        error::InfraError,
        http::{self, HttpState},
        storage::{FsStorage, MemoryStorage},
        telemetry,
    },
};
use tokio::sync::Notify;
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::Prerender(args) => run_prerender(settings, args).await,
    }
}

fn artifact_paths(settings: &config::Settings) -> ArtifactPaths {
    ArtifactPaths::new(&settings.paths.output_dir, &settings.paths.template)
}

fn static_routes(settings: &config::Settings) -> Result<StaticRoutes, AppError> {
    StaticRoutes::new(&settings.snapshot.routes)
        .map_err(|err| AppError::validation(err.to_string()))
}

/// Load the build once and serve it from the output directory.
async fn production_gate(settings: &config::Settings) -> Result<ReadinessGate, AppError> {
    let storage = FsStorage::new(settings.paths.output_dir.clone())
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    let build = load_build(&artifact_paths(settings)).await?;
    let renderer = build.into_renderer(FragmentCacheConfig::from(&settings.render))?;

    let storage: Arc<dyn StorageBackend> = Arc::new(storage);
    Ok(ReadinessGate::ready(Arc::new(renderer), storage))
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let (gate, watcher) = match settings.mode {
        RunMode::Production => (production_gate(&settings).await?, None),
        RunMode::Development => {
            let gate = ReadinessGate::pending();
            let watcher = DevWatcher::new(
                artifact_paths(&settings),
                gate.clone(),
                Arc::new(MemoryStorage::new()),
                FragmentCacheConfig::from(&settings.render),
                settings.dev.poll_interval,
            )
            .spawn();
            (gate, Some(watcher))
        }
    };

    let pipeline = StreamingPipeline::new(
        gate,
        static_routes(&settings)?,
        settings.mode,
        settings.render.page_title.clone(),
    );

    let result = serve_http(&settings, HttpState::new(pipeline.clone())).await;
    pipeline.flush_snapshots().await;

    if let Some(handle) = watcher {
        handle.abort();
        let _ = handle.await;
    }

    result
}

async fn run_prerender(
    settings: config::Settings,
    args: config::PrerenderArgs,
) -> Result<(), AppError> {
    let gate = production_gate(&settings).await?;
    let pipeline = StreamingPipeline::new(
        gate.clone(),
        static_routes(&settings)?,
        RunMode::Production,
        settings.render.page_title.clone(),
    );

    info!(
        target = "streamsnap::prerender",
        output_dir = %settings.paths.output_dir.display(),
        force = args.force,
        "Starting prerender"
    );

    let version = gate.await_ready().await;
    let report = prerender_static_routes(&pipeline, &version, args.force).await?;

    info!(
        target = "streamsnap::prerender",
        written = report.written.len(),
        skipped = report.skipped.len(),
        failed = report.failed.len(),
        "Prerender completed"
    );

    if report.is_success() {
        Ok(())
    } else {
        let urls: Vec<&str> = report.failed.iter().map(|(url, _)| url.as_str()).collect();
        Err(AppError::unexpected(format!(
            "prerender failed for {}",
            urls.join(", ")
        )))
    }
}

async fn serve_http(settings: &config::Settings, state: HttpState) -> Result<(), AppError> {
    let router = http::build_router(state);

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;

    info!(
        target = "streamsnap::http",
        addr = %settings.server.addr,
        mode = settings.mode.as_str(),
        "listening"
    );

    let shutdown = Arc::new(Notify::new());
    let signal = Arc::clone(&shutdown);
    let server = axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(async move {
            if let Err(err) = tokio::signal::ctrl_c().await {
                error!(target = "streamsnap::http", error = %err, "failed to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
            info!(target = "streamsnap::http", "shutdown requested, draining connections");
            signal.notify_one();
        })
        .into_future();
    tokio::pin!(server);

    let result = tokio::select! {
        result = &mut server => result,
        _ = shutdown.notified() => {
            match tokio::time::timeout(settings.server.graceful_shutdown, &mut server).await {
                Ok(result) => result,
                Err(_) => {
                    warn!(
                        target = "streamsnap::http",
                        timeout_secs = settings.server.graceful_shutdown.as_secs(),
                        "graceful shutdown timed out"
                    );
                    Ok(())
                }
            }
        }
    };

    result.map_err(|err| AppError::unexpected(format!("server error: {err}")))
}
