use crate::{errors::Error, Result};

/// Initialize logging/tracing for the bot.
pub fn init(service_name: &str) -> Result<()> {
    use tracing_subscriber::{fmt, EnvFilter};

    // Default: info for our crates, warn for everything else.
    // Can be overridden with `RUST_LOG`.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "warn,trb=info,trb_core=info,trb_telegram=info,trb_gcloud=info,{service_name}=info"
        ))
    });

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_ansi(true)
        .try_init()
        .map_err(|e| Error::Config(format!("logging init failed: {e}")))
}
