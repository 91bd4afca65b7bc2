use anyhow::{Context, Result};
use tracing::Level;
use tracing_subscriber::EnvFilter;

const DEFAULT_DIRECTIVE: &str = "info";

/// Install the JSON subscriber.
///
/// An explicit directive wins, then the `-v` level, then `RUST_LOG`,
/// then `info`.
pub fn init(directive: Option<&str>, verbosity: Option<Level>) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(filter(directive, verbosity)?)
        .json()
        .try_init()
        .map_err(|e| anyhow::anyhow!(e))
        .context("failed to install tracing subscriber")
}

fn filter(directive: Option<&str>, verbosity: Option<Level>) -> Result<EnvFilter> {
    if let Some(directive) = directive {
        return EnvFilter::try_new(directive)
            .with_context(|| format!("invalid log directive `{directive}`"));
    }
    if let Some(level) = verbosity {
        return EnvFilter::try_new(level.as_str().to_lowercase())
            .context("invalid verbosity level");
    }
    Ok(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE)))
}
