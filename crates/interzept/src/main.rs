mod cli;
mod config;
mod interceptor;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::BufReader;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use acctz::{RecordExporter, Recorder};
use authz_gate::Gate;

use crate::cli::Cli;
use crate::interceptor::Interceptor;

fn main() -> Result<()> {
    let runtime = tokio::runtime::Runtime::new().context("failed to build tokio runtime")?;
    let result = runtime.block_on(run());
    // The stdin reader may still be parked in a blocking read after a signal.
    runtime.shutdown_background();
    result
}

async fn run() -> Result<()> {
    // 1. Parse CLI args.
    let cli = Cli::parse();

    // 2. Load config, then merge CLI overrides.
    let loaded = config::load(&cli.config)?;
    let config_found = loaded.is_some();
    let mut cfg = loaded.unwrap_or_default();
    cfg.merge_cli(&cli);

    // 3. Init tracing-subscriber with JSON format on stderr; stdout carries
    //    verdicts.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cfg.logging.level));

    tracing_subscriber::fmt()
        .json()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_writer(std::io::stderr)
        .init();

    if !config_found {
        warn!(
            path = %cli.config.display(),
            "configuration file not found; using defaults"
        );
    }

    info!(
        config_file = %cli.config.display(),
        policy_file = %cfg.authz.policy_file.display(),
        refresh_interval_secs = cfg.authz.refresh_interval_secs,
        accounting = cfg.acctz.enabled,
        "interzept starting"
    );

    // 4. Start accounting.
    let (recorder, exporter) = if cfg.acctz.enabled {
        let recorder = Recorder::new(cfg.acctz.buffer);
        let records = recorder
            .records()
            .context("accounting record receiver already taken")?;
        let exporter = RecordExporter::start(&cfg.acctz.export_path, records)
            .await
            .context("failed to start accounting exporter")?;
        info!(
            export_path = %cfg.acctz.export_path.display(),
            buffer = cfg.acctz.buffer,
            "accounting exporter started"
        );
        (Some(recorder), Some(exporter))
    } else {
        (None, None)
    };

    // 5. Load the authorization policy and start refreshing it.
    let gate = Gate::start(cfg.authz.policy_file.clone(), cfg.authz.refresh_interval())
        .await
        .context("failed to start authorization gate")?;

    let interceptor = Interceptor::new(gate, recorder);

    // 6. Set up shutdown signal (ctrl_c + SIGTERM).
    let (shutdown_tx, shutdown_rx) = broadcast::channel::<()>(1);
    tokio::spawn(async move {
        wait_for_signal().await;
        let _ = shutdown_tx.send(());
    });

    // 7. Serve calls from stdin until EOF or shutdown.
    let served = interceptor
        .serve(
            BufReader::new(tokio::io::stdin()),
            tokio::io::stdout(),
            shutdown_rx,
        )
        .await;

    // 8. Stop the reloader and drain accounting.
    info!("interzept shutting down");
    interceptor.shutdown().await;
    if let Some(exporter) = exporter {
        if let Err(err) = exporter.await {
            error!(%err, "accounting exporter task failed");
        }
    }

    let served = served?;
    info!(served, "interzept stopped");
    Ok(())
}

async fn wait_for_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => info!("received SIGINT (ctrl-c)"),
                    _ = sigterm.recv() => info!("received SIGTERM"),
                }
            }
            Err(err) => {
                error!(%err, "failed to register SIGTERM handler; only SIGINT will stop interzept");
                wait_for_ctrl_c(ctrl_c).await;
            }
        }
    }

    #[cfg(not(unix))]
    wait_for_ctrl_c(ctrl_c).await;
}

async fn wait_for_ctrl_c(ctrl_c: impl std::future::Future<Output = std::io::Result<()>>) {
    match ctrl_c.await {
        Ok(()) => info!("received SIGINT (ctrl-c)"),
        Err(err) => {
            error!(%err, "failed to listen for SIGINT");
            // Without a signal source only EOF ends the run.
            std::future::pending::<()>().await;
        }
    }
}
