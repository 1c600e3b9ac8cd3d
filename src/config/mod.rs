//! Configuration layer: typed settings with layered precedence (file → env → CLI).

mod cli;

use std::{net::SocketAddr, num::NonZeroUsize, path::PathBuf, str::FromStr, time::Duration};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

use crate::{
    application::pipeline::RunMode,
    domain::{RoutePattern, TEMPLATE_FILE},
};

pub use cli::{CliArgs, Command, PathOverrides, PrerenderArgs, ServeArgs, ServeOverrides};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "streamsnap";
const ENV_PREFIX: &str = "STREAMSNAP";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_OUTPUT_DIR: &str = "dist";
const DEFAULT_PAGE_TITLE: &str = "Vue Music";
const DEFAULT_FRAGMENT_CACHE_CAPACITY: u64 = 1000;
const DEFAULT_FRAGMENT_CACHE_TTL_SECS: u64 = 15 * 60;
const DEFAULT_STATIC_ROUTES: [&str; 2] = ["/", "/all"];
const DEFAULT_DEV_POLL_INTERVAL_MS: u64 = 500;

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub mode: RunMode,
    pub paths: PathSettings,
    pub render: RenderSettings,
    pub snapshot: SnapshotSettings,
    pub dev: DevSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
    pub graceful_shutdown: Duration,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct PathSettings {
    pub output_dir: PathBuf,
    pub template: PathBuf,
}

#[derive(Debug, Clone)]
pub struct RenderSettings {
    pub page_title: String,
    pub fragment_cache_capacity: NonZeroUsize,
    pub fragment_cache_ttl: Duration,
}

#[derive(Debug, Clone)]
pub struct SnapshotSettings {
    /// Route patterns whose output is snapshotted.
    pub routes: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct DevSettings {
    pub poll_interval: Duration,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .separator("__")
            .list_separator(",")
            .with_list_parse_key("snapshot.routes")
            .try_parsing(true),
    );

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::Prerender(args)) => raw.apply_path_overrides(&args.paths),
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    mode: Option<String>,
    paths: RawPathSettings,
    render: RawRenderSettings,
    snapshot: RawSnapshotSettings,
    dev: RawDevSettings,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
        if let Some(seconds) = overrides.server_graceful_shutdown_seconds {
            self.server.graceful_shutdown_seconds = Some(seconds);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(mode) = overrides.mode.as_ref() {
            self.mode = Some(mode.clone());
        }
        if let Some(title) = overrides.page_title.as_ref() {
            self.render.page_title = Some(title.clone());
        }
        if let Some(interval) = overrides.dev_poll_interval_ms {
            self.dev.poll_interval_ms = Some(interval);
        }

        self.apply_path_overrides(&overrides.paths);
    }

    fn apply_path_overrides(&mut self, overrides: &PathOverrides) {
        if let Some(dir) = overrides.output_dir.as_ref() {
            self.paths.output_dir = Some(dir.clone());
        }
        if let Some(template) = overrides.template.as_ref() {
            self.paths.template = Some(template.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            mode,
            paths,
            render,
            snapshot,
            dev,
        } = raw;

        let server = build_server_settings(server)?;
        let logging = build_logging_settings(logging)?;
        let mode = build_mode(mode)?;
        let paths = build_path_settings(paths)?;
        let render = build_render_settings(render)?;
        let snapshot = build_snapshot_settings(snapshot)?;
        let dev = build_dev_settings(dev)?;

        Ok(Self {
            server,
            logging,
            mode,
            paths,
            render,
            snapshot,
            dev,
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());

    let port = server.port.unwrap_or(DEFAULT_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "server.port",
            "port must be greater than zero",
        ));
    }

    let addr = parse_socket_addr(&host, port)
        .map_err(|reason| LoadError::invalid("server.addr", reason))?;

    let graceful_secs = server
        .graceful_shutdown_seconds
        .unwrap_or(DEFAULT_GRACEFUL_SHUTDOWN_SECS);
    if graceful_secs == 0 {
        return Err(LoadError::invalid(
            "server.graceful_shutdown_seconds",
            "must be greater than zero",
        ));
    }

    Ok(ServerSettings {
        addr,
        graceful_shutdown: Duration::from_secs(graceful_secs),
    })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_mode(mode: Option<String>) -> Result<RunMode, LoadError> {
    match mode {
        Some(value) => {
            RunMode::from_str(&value).map_err(|reason| LoadError::invalid("mode", reason))
        }
        None => Ok(RunMode::Production),
    }
}

fn build_path_settings(paths: RawPathSettings) -> Result<PathSettings, LoadError> {
    let output_dir = paths
        .output_dir
        .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR));
    if output_dir.as_os_str().is_empty() {
        return Err(LoadError::invalid(
            "paths.output_dir",
            "path must not be empty",
        ));
    }

    let template = paths
        .template
        .unwrap_or_else(|| output_dir.join(TEMPLATE_FILE));
    if template.as_os_str().is_empty() {
        return Err(LoadError::invalid("paths.template", "path must not be empty"));
    }

    Ok(PathSettings {
        output_dir,
        template,
    })
}

fn build_render_settings(render: RawRenderSettings) -> Result<RenderSettings, LoadError> {
    let page_title = render
        .page_title
        .unwrap_or_else(|| DEFAULT_PAGE_TITLE.to_string());

    let capacity = render
        .fragment_cache_capacity
        .unwrap_or(DEFAULT_FRAGMENT_CACHE_CAPACITY);
    let fragment_cache_capacity = usize::try_from(capacity)
        .ok()
        .and_then(NonZeroUsize::new)
        .ok_or_else(|| {
            LoadError::invalid(
                "render.fragment_cache_capacity",
                "must be greater than zero and fit in usize",
            )
        })?;

    let ttl_secs = render
        .fragment_cache_ttl_seconds
        .unwrap_or(DEFAULT_FRAGMENT_CACHE_TTL_SECS);
    if ttl_secs == 0 {
        return Err(LoadError::invalid(
            "render.fragment_cache_ttl_seconds",
            "must be greater than zero",
        ));
    }

    Ok(RenderSettings {
        page_title,
        fragment_cache_capacity,
        fragment_cache_ttl: Duration::from_secs(ttl_secs),
    })
}

fn build_snapshot_settings(snapshot: RawSnapshotSettings) -> Result<SnapshotSettings, LoadError> {
    let routes = snapshot.routes.unwrap_or_else(|| {
        DEFAULT_STATIC_ROUTES
            .iter()
            .map(|route| route.to_string())
            .collect()
    });

    for route in &routes {
        RoutePattern::parse(route).map_err(|err| {
            LoadError::invalid("snapshot.routes", format!("`{route}`: {err}"))
        })?;
    }

    Ok(SnapshotSettings { routes })
}

fn build_dev_settings(dev: RawDevSettings) -> Result<DevSettings, LoadError> {
    let interval_ms = dev.poll_interval_ms.unwrap_or(DEFAULT_DEV_POLL_INTERVAL_MS);
    if interval_ms == 0 {
        return Err(LoadError::invalid(
            "dev.poll_interval_ms",
            "must be greater than zero",
        ));
    }

    Ok(DevSettings {
        poll_interval: Duration::from_millis(interval_ms),
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
    graceful_shutdown_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawPathSettings {
    output_dir: Option<PathBuf>,
    template: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawRenderSettings {
    page_title: Option<String>,
    fragment_cache_capacity: Option<u64>,
    fragment_cache_ttl_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSnapshotSettings {
    routes: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawDevSettings {
    poll_interval_ms: Option<u64>,
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

#[cfg(test)]
mod tests;
