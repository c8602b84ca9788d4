mod cli;
mod server;
mod telemetry;

use std::sync::Arc;

use clap::Parser;
use futures::StreamExt;
use kube::runtime::watcher;
use kube::runtime::Controller;
use kube::{Api, Client};
use metrics_exporter_prometheus::PrometheusBuilder;
use reloader_api::Config;
use reloader_core::listener::{event_channel, ListenerContext};
use reloader_core::processor::EventProcessor;
use reloader_core::reconciler::{error_policy, reconcile, Context};
use reloader_core::{destinations, listeners, ListenerManager};
use tracing::{error, info};

const EVENT_CHANNEL_CAPACITY: usize = 256;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = cli::Cli::parse();
    telemetry::init(&cli.log_level);

    let prometheus = PrometheusBuilder::new().install_recorder()?;
    tokio::spawn({
        let addr = cli.metrics_addr.clone();
        async move {
            if let Err(err) = server::serve(&addr, prometheus).await {
                error!(%err, "health and metrics server exited");
            }
        }
    });

    let client = match &cli.kubeconfig {
        Some(path) => {
            let kubeconfig = kube::config::Kubeconfig::read_from(path)?;
            let options = kube::config::KubeConfigOptions::default();
            let config = kube::Config::from_custom_kubeconfig(kubeconfig, &options).await?;
            Client::try_from(config)?
        }
        None => Client::try_default().await?,
    };

    let (sender, receiver) = event_channel(EVENT_CHANNEL_CAPACITY);
    let listener_context = ListenerContext { client: client.clone(), sender };

    let manager = Arc::new(ListenerManager::new(listener_context, listeners::build_registry()));
    let processor = Arc::new(EventProcessor::new(client.clone(), destinations::build_registry()));

    tokio::spawn(Arc::clone(&processor).run(receiver));

    let configs: Api<Config> = Api::all(client.clone());
    let ctx = Arc::new(Context { client: client.clone(), manager: Arc::clone(&manager), processor });

    info!("starting reloader controller");
    Controller::new(configs, watcher::Config::default())
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(|result| async move {
            if let Err(err) = result {
                error!(%err, "reconcile failed");
            }
        })
        .await;

    if let Err(errs) = manager.stop_all().await {
        for err in errs {
            error!(%err, "listener failed to stop during shutdown");
        }
    }
    info!("reloader controller stopped");
    Ok(())
}
