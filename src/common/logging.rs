use anyhow::{anyhow, Result};
use clap::ValueEnum;
use std::io;
use tracing::Level;
use tracing_appender::rolling;
use tracing_subscriber::{filter::LevelFilter, fmt, EnvFilter};

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq)]
pub enum LogLevel {
    No,
    Debug,
    Info,
    Warning,
    Error,
}

impl LogLevel {
    pub fn to_tracing_level(&self) -> Option<Level> {
        match self {
            LogLevel::No => None,
            LogLevel::Debug => Some(Level::DEBUG),
            LogLevel::Info => Some(Level::INFO),
            LogLevel::Warning => Some(Level::WARN),
            LogLevel::Error => Some(Level::ERROR),
        }
    }
}

/// Installs the global subscriber. Logs go to stdout, or to a daily rolling
/// file when `log_file` isn't empty. The returned guard must outlive logging.
pub fn init_logger(
    log_level: LogLevel,
    log_file: &str,
) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let Some(level) = log_level.to_tracing_level() else {
        return Ok(None);
    };

    let env_filter = EnvFilter::from_default_env().add_directive(LevelFilter::from_level(level).into());

    if !log_file.is_empty() {
        let file_appender = rolling::daily(".", log_file);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        let subscriber = fmt()
            .with_writer(non_blocking)
            .with_ansi(false)
            .with_env_filter(env_filter)
            .with_file(false)
            .with_target(false)
            .finish();

        tracing::subscriber::set_global_default(subscriber)
            .map_err(|err| anyhow!("Couldn't set file log subscriber: {}", err))?;

        Ok(Some(guard))
    } else {
        let subscriber = fmt()
            .with_writer(io::stdout)
            .with_env_filter(env_filter)
            .with_file(false)
            .with_target(false)
            .finish();

        tracing::subscriber::set_global_default(subscriber)
            .map_err(|err| anyhow!("Couldn't set stdout log subscriber: {}", err))?;

        Ok(None)
    }
}
