//! Tracing subscriber setup.

use std::sync::Arc;

use anyhow::Result;
use tracing_subscriber::{
    filter::EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt, Layer, Registry,
};

use crate::LoggingConfig;

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Installs the global tracing subscriber per the logging config.
///
/// `RUST_LOG` overrides the default `info` filter. With a `log_dir` set,
/// a plain-text copy of the output also goes to `<log_dir>/mintio.log`.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let mut layers: Vec<BoxedLayer> = Vec::new();
    if config.json_format.unwrap_or(false) {
        layers.push(fmt::layer().json().boxed());
    } else {
        layers.push(fmt::layer().compact().boxed());
    }

    if let Some(dir) = &config.log_dir {
        std::fs::create_dir_all(dir)?;
        let file = std::fs::File::create(dir.join("mintio.log"))?;
        layers.push(fmt::layer().with_ansi(false).with_writer(Arc::new(file)).boxed());
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()?;
    Ok(())
}
