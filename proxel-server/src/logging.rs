use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize console logging, honoring `RUST_LOG` when set.
pub fn init_logging() -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("proxel=debug,warn"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to initialize logging: {e}"))?;

    Ok(())
}

/// Console-only logging for tests; repeated calls are harmless.
pub fn init_test_logging() {
    let _ = tracing_subscriber::registry()
        .with(EnvFilter::new("proxel=trace"))
        .with(fmt::layer().with_test_writer())
        .try_init();
}
