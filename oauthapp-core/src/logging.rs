use std::sync::Arc;

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{LogFormat, LoggingConfig};

/// Install the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over the configured level. Fails if a
/// subscriber is already installed or the log file cannot be opened.
pub fn init_logging(config: &LoggingConfig) -> anyhow::Result<()> {
    let env_filter = build_filter(&config.level)?;
    let registry = tracing_subscriber::registry().with(env_filter);

    let file = match &config.file_path {
        Some(path) => Some(Arc::new(
            std::fs::OpenOptions::new().create(true).append(true).open(path)?,
        )),
        None => None,
    };

    match (config.format, file) {
        (LogFormat::Json, Some(file)) => registry.with(json_layer().with_writer(file)).try_init()?,
        (LogFormat::Json, None) => registry.with(json_layer()).try_init()?,
        (LogFormat::Pretty, Some(file)) => registry
            .with(fmt::layer().with_target(true).with_ansi(false).with_writer(file))
            .try_init()?,
        (LogFormat::Pretty, None) => registry
            .with(fmt::layer().pretty().with_target(true).with_file(false))
            .try_init()?,
    }

    Ok(())
}

fn json_layer<S>() -> fmt::Layer<S, fmt::format::JsonFields, fmt::format::Format<fmt::format::Json>>
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    fmt::layer()
        .json()
        .with_current_span(true)
        .with_target(true)
        .with_line_number(true)
}

fn build_filter(level: &str) -> anyhow::Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(level).map_err(|err| anyhow::anyhow!("invalid log level {level:?}: {err}"))
}
