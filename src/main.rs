//! One-shot entrypoint for the CNI race condition repair controller.
//!
//! Lists the pods matching the configured filters, classifies them with the
//! broken-pod predicate, and applies the configured remediation once. Any
//! combined error from the run is fatal to the process.

use std::process;
use std::sync::Arc;

use clap::Parser;
use kube::Client;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use cni_repair::config::RepairConfig;
use cni_repair::error::{Error, Result};
use cni_repair::metrics::Metrics;
use cni_repair::reconciler::BrokenPodReconciler;
use cni_repair::store::KubePodStore;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = RepairConfig::parse();
    if !config.enabled {
        info!("CNI repair is disabled");
        return;
    }

    if let Err(e) = run(config).await {
        error!("CNI repair failed: {}", e);
        process::exit(1);
    }
}

async fn run(config: RepairConfig) -> Result<()> {
    info!("Starting CNI race condition repair");
    config.log_active_options();

    if config.run_as_daemon {
        return Err(Error::Config(
            "daemon mode requires an external watch loop; run one-shot with \
             --label-pods or --delete-pods"
                .to_string(),
        ));
    }

    // Kubeconfig when present, in-cluster config otherwise. Failing to build
    // a client is fatal before any reconciliation is attempted.
    let client = Client::try_default().await.map_err(Error::Kube)?;

    let metrics = Arc::new(Metrics::new());
    let reconciler = BrokenPodReconciler::new(
        KubePodStore::new(client),
        config.filters(),
        config.options(),
        metrics,
    );

    if config.delete_pods {
        reconciler.delete_broken_pods().await?;
    } else if config.label_pods {
        reconciler.label_broken_pods().await?;
    } else {
        info!("No remediation action configured; nothing to do");
    }

    Ok(())
}
