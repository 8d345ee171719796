use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub const LOG_ENV: &str = "PROCTOR_LOG";

/// Install a file-backed subscriber. Stdout belongs to the TUI, so nothing
/// is logged there. Keep the returned guard alive until exit or buffered
/// lines are lost.
pub fn init(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let dir = log_dir?;
    std::fs::create_dir_all(dir).ok()?;

    let file_appender = tracing_appender::rolling::daily(dir, "proctor.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let env_filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
    let file_layer = fmt::layer().with_writer(non_blocking).with_ansi(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .try_init()
        .ok()?;

    Some(guard)
}
