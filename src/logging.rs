use std::{
    fs::{self, OpenOptions},
    path::{Path, PathBuf},
    sync::Mutex,
};

use color_eyre::eyre::{Result, WrapErr};
use directories::ProjectDirs;
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, Layer, Registry, fmt, layer::SubscriberExt, util::SubscriberInitExt,
};

pub enum LogTarget<'a> {
    Stderr,
    File(&'a Path),
}

pub fn default_log_path() -> Option<PathBuf> {
    ProjectDirs::from("", "", "tablemate").map(|dirs| dirs.cache_dir().join("tablemate.log"))
}

/// `RUST_LOG` wins; otherwise `-v` raises our own crate's level.
fn filter(verbose: u8) -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    EnvFilter::new(format!("warn,tablemate={level}"))
}

pub fn init(verbose: u8, target: LogTarget<'_>) -> Result<()> {
    let fmt_layer: Box<dyn Layer<Registry> + Send + Sync> = match target {
        LogTarget::Stderr => fmt::layer().with_writer(std::io::stderr).boxed(),
        LogTarget::File(path) => {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)
                    .wrap_err_with(|| format!("creating log directory {}", parent.display()))?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .wrap_err_with(|| format!("opening log file {}", path.display()))?;
            fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .boxed()
        }
    };
    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(filter(verbose))
        .with(ErrorLayer::default())
        .try_init()
        .wrap_err("installing tracing subscriber")
}
