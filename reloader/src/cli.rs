use clap::Parser;

/// Cluster-resident controller that watches external secret-rotation events
/// and annotates the destinations that reference them.
#[derive(Parser, Debug)]
#[command(name = "reloader", version, about)]
pub struct Cli {
    /// Path to a kubeconfig file. Falls back to in-cluster config, then the
    /// default kubeconfig lookup, when unset.
    #[arg(long, env = "KUBECONFIG")]
    pub kubeconfig: Option<String>,

    /// Address the health and metrics server binds to.
    #[arg(long, env = "METRICS_ADDR", default_value = "0.0.0.0:8080")]
    pub metrics_addr: String,

    /// Log level passed to the tracing env filter when `RUST_LOG` is unset.
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}
