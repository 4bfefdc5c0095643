use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Registry};

const DEFAULT_FILTER: &str = "info,tether_runtime=debug";

/// Initialize a simple stdout tracing subscriber for development.
///
/// `RUST_LOG` overrides the default filter. Does nothing if a global
/// subscriber is already installed.
pub fn init_stdout_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Like [`init_stdout_tracing`], but prints span enter/close events so scope
/// boundaries show up in the log.
pub fn init_scope_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tether_runtime=trace,tether_core=trace"));

    let _ = Registry::default()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_span_events(tracing_subscriber::fmt::format::FmtSpan::NEW
                    | tracing_subscriber::fmt::format::FmtSpan::CLOSE),
        )
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        init_stdout_tracing();
        init_stdout_tracing();
        init_scope_tracing();
    }
}
