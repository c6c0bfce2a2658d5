// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

use anyhow::{Context as _, Result};
use clap::Parser;
use kube::Client;
use std::sync::Arc;
use tracing::{debug, error, info};
use workload_secret_controller::{
    api::{ClusterApi, KubeClusterApi},
    cli::Args,
    constants::TOKIO_WORKER_THREADS,
    context::Context,
    controller,
    metrics,
    pki::{CertificateAuthority, IstioCa},
    shutdown::Shutdown,
};

fn main() -> Result<()> {
    // Build Tokio runtime with custom thread names
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(TOKIO_WORKER_THREADS)
        .thread_name("workload-secret-controller")
        .enable_all()
        .build()?;

    runtime.block_on(async_main())
}

fn init_tracing() {
    // RUST_LOG selects the level (default info); RUST_LOG_FORMAT=json switches to JSON output.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let log_format = std::env::var("RUST_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    match log_format.to_lowercase().as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .json()
                .init();
        }
        _ => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .with_ansi(true)
                .compact()
                .init();
        }
    }
}

async fn build_ca(args: &Args, api: &dyn ClusterApi, ca_namespace: &str) -> Result<IstioCa> {
    let ca = match &args.plugged_ca_dir {
        Some(dir) => {
            info!(dir = %dir.display(), "Using plugged CA");
            IstioCa::from_plugged_dir(dir, args.max_workload_cert_ttl).await?
        }
        None => {
            info!(namespace = ca_namespace, "Using self-signed CA");
            IstioCa::load_or_create_self_signed(
                api,
                ca_namespace,
                &args.self_signed_ca_org,
                args.self_signed_ca_cert_ttl,
                args.max_workload_cert_ttl,
            )
            .await?
        }
    };
    Ok(ca)
}

async fn wait_for_signal() -> Result<&'static str> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result?;
                Ok("SIGINT")
            }
            _ = sigterm.recv() => Ok("SIGTERM"),
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        Ok("SIGINT")
    }
}

async fn async_main() -> Result<()> {
    init_tracing();

    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("failed to install rustls crypto provider"))?;

    let args = Args::parse();
    let config = args.controller_config().context("invalid configuration")?;
    info!(
        namespaces = ?config.namespaces,
        explicit_opt_in = config.explicit_opt_in,
        cert_ttl = ?config.cert_ttl,
        "Starting workload secret controller"
    );

    debug!("Initializing Kubernetes client");
    let client = Client::try_default().await?;
    let api: Arc<dyn ClusterApi> = Arc::new(KubeClusterApi::new(client.clone()));

    let ca: Arc<dyn CertificateAuthority> =
        Arc::new(build_ca(&args, api.as_ref(), &config.ca_storage_namespace).await?);

    let (trigger, shutdown) = Shutdown::channel();
    let sources = controller::watch::start(client, config.namespaces.clone(), shutdown.clone());
    let ctx = Arc::new(Context::new(
        api,
        Arc::new(sources.cache.clone()),
        ca,
        config,
        shutdown,
    )?);

    let monitoring_port = args.monitoring_port;
    tokio::spawn(async move {
        if let Err(e) = metrics::serve(monitoring_port).await {
            error!(error = %e, "Metrics server failed");
        }
    });

    let engine = tokio::spawn(controller::run(
        ctx,
        sources.identity_events,
        sources.secret_events,
        sources.secrets_synced,
    ));

    let signal = wait_for_signal().await?;
    info!("Received {signal}, shutting down");
    trigger.trigger();

    engine.await?;
    info!("Controller stopped");
    Ok(())
}
