use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::AppError;

/// Used when `RUST_LOG` is unset. HTTP client internals stay quiet.
pub const DEFAULT_DIRECTIVES: &str = "info,reqwest=warn,hyper=warn,hyper_util=warn";

pub fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVES))
}

/// Install the global subscriber and route the SDK's `log` records into it.
/// Call once at startup.
pub fn init_logging() -> Result<(), AppError> {
    tracing_log::LogTracer::init().map_err(|e| AppError::Logging(e.to_string()))?;
    let subscriber = tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt::layer().with_target(true));
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| AppError::Logging(e.to_string()))
}
