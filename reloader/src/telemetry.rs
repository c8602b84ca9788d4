/// Initializes `tracing` the same way as the controller mains this one is
/// modeled on: `RUST_LOG` wins if set, otherwise every target logs at
/// `log_level`.
pub fn init(log_level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
