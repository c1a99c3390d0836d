use anyhow::Result;
use console_subscriber::ConsoleLayer;
use tracing_appender::rolling;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{self, filter::LevelFilter, fmt, EnvFilter, Layer, Registry};

/// Installs the process-wide subscriber: tokio-console, stdout at
/// `log_level`, and an hourly rolling file under `./log` at debug.
pub fn init_logging(log_level: &str) -> Result<()> {
    let stdout_level: LevelFilter = log_level.parse()?;

    // Layer and filter for tokio-console
    let console_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::TRACE.into())
        .from_env_lossy();
    let console_layer = ConsoleLayer::builder().spawn().with_filter(console_filter);

    // Layer and filter for stdout
    let stdout_layer = fmt::layer()
        .with_writer(std::io::stdout)
        .with_ansi(true)
        .with_filter(
            EnvFilter::builder()
                .with_default_directive(stdout_level.into())
                .from_env_lossy(),
        );

    // Layer and filter for the log file
    let file_layer = fmt::layer()
        .with_writer(rolling::hourly("./log", "message-pipeline"))
        // Multi Writer with_ansi option doesn't work https://github.com/tokio-rs/tracing/issues/3116
        // .with_ansi(false)
        .with_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::DEBUG.into())
                .from_env_lossy(),
        );

    Registry::default()
        .with(console_layer)
        .with(stdout_layer)
        .with(file_layer)
        .try_init()?;

    Ok(())
}
