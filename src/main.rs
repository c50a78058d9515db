use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::signal;
use tokio::sync::watch;

use maintdesk::config::Config;
use maintdesk::jobs::request_watcher::RequestWatcher;
use maintdesk::models::request::NewRequest;
use maintdesk::notification::twilio::TwilioSender;
use maintdesk::notification::AdminNotifier;
use maintdesk::store::postgres::PgStore;
use maintdesk::store::{RequestSource, RequestStore};
use maintdesk::{api, config, telemetry, AppState};

mod cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();
    let cfg = config::load()?;
    telemetry::init(cfg.debug)?;

    let result = match args.command {
        Some(cli::Commands::Serve { port, no_watcher }) => {
            let port = port.unwrap_or(cfg.port);
            run_server(cfg, port, !no_watcher).await
        }
        Some(cli::Commands::Watch) => run_watcher(cfg).await,
        Some(cli::Commands::Migrate) => {
            let db = PgStore::connect(&cfg.database_url, cfg.watcher.store_timeout).await?;
            db.migrate().await?;
            println!("Migrations applied.");
            Ok(())
        }
        Some(cli::Commands::Submit {
            room,
            description,
            name,
            building,
            priority,
        }) => {
            let db = PgStore::connect(&cfg.database_url, cfg.watcher.store_timeout).await?;
            let req = NewRequest {
                name,
                building,
                room_number: room,
                description,
                priority,
            }
            .validate()?;
            let row = db.insert_request(&req).await?;
            println!(
                "Request submitted:\n  ID:      {}\n  Room:    {}\n  Status:  {}\n  Created: {}",
                row.id, row.room_number, row.status, row.created_at
            );
            Ok(())
        }
        None => {
            let port = cfg.port;
            run_server(cfg, port, true).await
        }
    };

    if let Err(ref e) = result {
        eprintln!("Error: {:?}", e);
    }
    result
}

async fn run_server(cfg: Config, port: u16, with_watcher: bool) -> anyhow::Result<()> {
    tracing::info!("Connecting to database...");
    let db = Arc::new(
        PgStore::connect(&cfg.database_url, cfg.watcher.store_timeout)
            .await
            .context("failed to connect to the request store")?,
    );

    tracing::info!("Running migrations...");
    db.migrate().await?;

    // Build the watcher before binding so a missing credential fails startup.
    let watcher = if with_watcher {
        Some(build_watcher(&cfg, db.clone()).context(
            "the request watcher needs messaging credentials; set them or pass --no-watcher",
        )?)
    } else {
        None
    };

    let state = Arc::new(AppState { store: db });
    let app = api::router(state);

    let shutdown = shutdown_channel();
    let watcher_handle = watcher.map(|w| tokio::spawn(w.run(shutdown.clone())));

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("maintdesk intake listening on {}", addr);

    let mut server_shutdown = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = server_shutdown.wait_for(|stop| *stop).await;
        })
        .await?;

    if let Some(handle) = watcher_handle {
        handle.await.context("request watcher task failed")?;
    }

    tracing::info!("maintdesk stopped");
    Ok(())
}

async fn run_watcher(cfg: Config) -> anyhow::Result<()> {
    // Lazy pool: a database outage shows up as failed polls, not a failed start.
    let db = Arc::new(PgStore::connect_lazy(
        &cfg.database_url,
        cfg.watcher.store_timeout,
    )?);
    let watcher = build_watcher(&cfg, db)?;
    watcher.run(shutdown_channel()).await;
    Ok(())
}

fn build_watcher(cfg: &Config, source: Arc<dyn RequestSource>) -> anyhow::Result<RequestWatcher> {
    let twilio = cfg.twilio_settings()?;
    let sender = TwilioSender::new(&twilio, cfg.watcher.notify_timeout)?;
    tracing::info!(
        from = sender.from_address(),
        to = sender.to_address(),
        "admin notifications configured"
    );

    let notifier = AdminNotifier::new(Arc::new(sender), cfg.watcher.notify_timeout);
    Ok(RequestWatcher::new(source, notifier, cfg.watcher.clone()))
}

/// Flips to `true` on Ctrl+C or SIGTERM.
fn shutdown_channel() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = tx.send(true);
    });
    rx
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, shutting down");
        },
    }
}
