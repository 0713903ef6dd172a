//! Subscriber initialization

use std::str::FromStr;
use std::sync::Once;

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

static INIT: Once = Once::new();

/// Output format of the console log layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human readable lines (default).
    #[default]
    Pretty,
    /// One JSON object per event.
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format '{other}' (expected 'pretty' or 'json')")),
        }
    }
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pretty => write!(f, "pretty"),
            Self::Json => write!(f, "json"),
        }
    }
}

/// Initialize console logging.
///
/// The filter defaults to `info` and is overridden by `RUST_LOG`. Calling this
/// more than once is a no-op, so tests and the binary can both call it.
///
/// # Example
/// ```
/// use riffkit_telemetry::{LogFormat, init_telemetry};
/// init_telemetry("riffkit", LogFormat::Pretty).expect("telemetry");
/// ```
pub fn init_telemetry(
    service_name: &str,
    format: LogFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("info"))?;

    INIT.call_once(|| {
        let registry = tracing_subscriber::registry().with(filter);
        let installed = match format {
            LogFormat::Pretty => registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_target(true)
                        .with_thread_ids(true)
                        .with_line_number(true),
                )
                .try_init(),
            LogFormat::Json => registry
                .with(tracing_subscriber::fmt::layer().json().with_current_span(true))
                .try_init(),
        };

        match installed {
            Ok(()) => tracing::info!(service.name = service_name, log.format = %format, "Telemetry initialized"),
            // Another subscriber won the race (e.g. a test harness); keep it.
            Err(e) => eprintln!("telemetry: subscriber already installed: {e}"),
        }
    });

    Ok(())
}
