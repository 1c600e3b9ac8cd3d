use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};

/// Command-line arguments for the streamsnap binary.
#[derive(Debug, Parser)]
#[command(
    name = "streamsnap",
    version,
    about = "Streaming server-side render server with static page snapshots"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "STREAMSNAP_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Serve rendered pages over HTTP.
    Serve(Box<ServeArgs>),
    /// Write snapshots for every parameter-free static route, then exit.
    Prerender(PrerenderArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct PathOverrides {
    /// Override the build output directory.
    #[arg(long = "output-dir", value_name = "PATH", value_hint = ValueHint::DirPath)]
    pub output_dir: Option<PathBuf>,

    /// Override the page template path.
    #[arg(long = "template", value_name = "PATH", value_hint = ValueHint::FilePath)]
    pub template: Option<PathBuf>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    #[command(flatten)]
    pub paths: PathOverrides,

    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override the graceful shutdown timeout.
    #[arg(long = "server-graceful-shutdown-seconds", value_name = "SECONDS")]
    pub server_graceful_shutdown_seconds: Option<u64>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Override the run mode (development|production).
    #[arg(long = "mode", value_name = "MODE")]
    pub mode: Option<String>,

    /// Override the page title passed to every render.
    #[arg(long = "page-title", value_name = "TITLE")]
    pub page_title: Option<String>,

    /// Override the build watcher poll interval.
    #[arg(long = "dev-poll-interval-ms", value_name = "MILLIS")]
    pub dev_poll_interval_ms: Option<u64>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct PrerenderArgs {
    #[command(flatten)]
    pub paths: PathOverrides,

    /// Re-render routes whose snapshot already exists.
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub force: bool,
}
