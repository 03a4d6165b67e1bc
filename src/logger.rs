use std::path::Path;

use anyhow::Context;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, Registry, fmt};

/// Install the global tracing subscriber.
///
/// - `log_level` is an `EnvFilter` directive (e.g. `"info"` or
///   `"apiflow=debug,reqwest=warn"`); `RUST_LOG` overrides it when set.
/// - With no `log_dir`, everything goes to stderr.
/// - With a `log_dir`, a daily-rolling text log and a newline-delimited JSON
///   event log are written alongside the stderr output.
pub fn init_tracing(log_level: &str, log_dir: Option<&Path>) -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .context("invalid log level directive")?;

    let stderr_layer = fmt::layer().with_writer(std::io::stderr);

    match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("failed to create log dir {}", dir.display()))?;
            let txt_appender = RollingFileAppender::new(Rotation::DAILY, dir, "apiflow.log");
            let txt_layer = fmt::layer().with_writer(txt_appender).with_ansi(false);

            let json_appender = RollingFileAppender::new(Rotation::DAILY, dir, "apiflow.json");
            let json_layer = fmt::layer().json().with_writer(json_appender);

            Registry::default()
                .with(env_filter)
                .with(stderr_layer)
                .with(txt_layer)
                .with(json_layer)
                .try_init()
                .context("tracing subscriber already installed")?;
        }
        None => {
            Registry::default()
                .with(env_filter)
                .with(stderr_layer)
                .try_init()
                .context("tracing subscriber already installed")?;
        }
    }
    Ok(())
}
