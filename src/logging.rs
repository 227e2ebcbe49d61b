use crate::config::WATCHER_CONFIG;
use tracing::level_filters::LevelFilter;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Sets up logging across the daemon. Requires the global configuration to have been set first.
/// The returned guard must be held for the process lifetime to flush the non-blocking file
/// writer on shutdown.
pub fn setup_logging() -> tracing_appender::non_blocking::WorkerGuard {
    let log_dir = WATCHER_CONFIG
        .get()
        .log_file
        .parent()
        .expect("log file path always has a parent")
        .to_path_buf();
    std::fs::create_dir_all(&log_dir).ok();

    // Set up logging to create a rotating log file for each day
    let file_appender = RollingFileAppender::new(Rotation::DAILY, &log_dir, "watcher.log");
    // Create a subscriber that writes logs to the file
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    // Set the default subscriber to write logs to the non-blocking file appender
    let file_layer = tracing_subscriber::fmt::layer()
        .with_file(true)
        .with_line_number(true)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_level(true)
        .with_writer(non_blocking);
    // Stdout gets info and above unless the user configures otherwise
    let stdout_layer = tracing_subscriber::fmt::layer()
        .with_level(true)
        .with_file(true)
        .with_line_number(true)
        .without_time()
        .compact()
        .with_writer(std::io::stdout)
        .with_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("GZWATCHER_LOG")
                .from_env_lossy(),
        );
    tracing_subscriber::registry()
        .with(stdout_layer)
        .with(file_layer)
        .init();

    guard
}
