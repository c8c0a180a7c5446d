//! Process-wide tracing setup: compact stdout output plus a daily-rotated
//! file under the data directory. `RUST_LOG` controls filtering and defaults
//! to `info`.

use std::path::Path;

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

pub fn init<P: AsRef<Path>>(log_dir: P) -> Result<(), Box<dyn std::error::Error>> {
    let log_dir = log_dir.as_ref();
    std::fs::create_dir_all(log_dir)?;

    let env_filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("info"))?;

    let file_appender = tracing_appender::rolling::daily(log_dir, "crawlspace.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::layer()
        .with_writer(file_writer)
        .with_target(true)
        .with_ansi(false)
        .compact()
        .with_filter(env_filter.clone());

    let stdout_layer = fmt::layer()
        .with_target(false)
        .compact()
        .with_filter(env_filter);

    tracing_subscriber::registry()
        .with(file_layer)
        .with(stdout_layer)
        .init();

    // the writer guard must outlive the process for the appender to flush
    Box::leak(Box::new(guard));

    tracing::info!("logging initialized, files under {}", log_dir.display());
    Ok(())
}
