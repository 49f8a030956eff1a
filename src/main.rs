use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tracing::info;

use spacebook::booking::BookingService;
use spacebook::config::ServiceConfig;
use spacebook::engine::AvailabilityEngine;
use spacebook::lifecycle::LifecycleScheduler;
use spacebook::notify::NotifyHub;
use spacebook::store::{ReservationBook, run_compactor};
use spacebook::wire::{self, AppContext};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let config = ServiceConfig::from_env()?;
    spacebook::observability::init(config.metrics_port)?;

    // Ensure data directory exists
    std::fs::create_dir_all(&config.data_dir)?;

    let notify = Arc::new(NotifyHub::new());
    let book = Arc::new(ReservationBook::open(
        config.data_dir.join("reservations.wal"),
        notify.clone(),
    )?);
    let compactor_book = book.clone();
    let threshold = config.compact_threshold;
    tokio::spawn(async move {
        run_compactor(compactor_book, threshold).await;
    });

    let engine = AvailabilityEngine::new(Arc::new(config.catalog.clone()));
    let (scheduler, _) = LifecycleScheduler::new(book.clone(), config.scheduler);
    if config.scheduler.enabled {
        scheduler.start().await;
    }

    // Hand-off point for downstream notification delivery.
    let mut status_events = notify.subscribe_all();
    tokio::spawn(async move {
        loop {
            match status_events.recv().await {
                Ok(event) => info!(
                    "status event: reservation {} ({}) {} -> {}{}",
                    event.reservation_id,
                    event.space_type,
                    event.from.label(),
                    event.to.label(),
                    event.reason.map_or(String::new(), |r| format!(" [{}]", r.as_str()))
                ),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!("status event log lagged, {n} events skipped");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    let ctx = Arc::new(AppContext {
        booking: BookingService::new(book.clone(), engine),
        scheduler: scheduler.clone(),
        notify,
    });
    let max_connections = config.max_connections;
    let semaphore = Arc::new(Semaphore::new(max_connections));

    let addr = format!("{}:{}", config.bind, config.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("spacebook listening on {addr}");
    info!("  data_dir: {}", config.data_dir.display());
    info!("  max_connections: {max_connections}");
    info!(
        "  space types: {}",
        config
            .catalog
            .iter()
            .map(|s| format!("{}={}", s.key, s.max_capacity))
            .collect::<Vec<_>>()
            .join(",")
    );
    let interval_minutes = scheduler.config().await.interval_minutes;
    info!(
        "  scheduler: {}",
        if config.scheduler.enabled {
            format!("every {interval_minutes} min")
        } else {
            "disabled".to_string()
        }
    );
    info!("  metrics: {}", config.metrics_port.map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics")));

    // Graceful shutdown: stop accepting on SIGTERM/ctrl-c, drain in-flight connections
    #[cfg(unix)]
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
    let shutdown = async {
        let ctrl_c = tokio::signal::ctrl_c();
        #[cfg(unix)]
        {
            tokio::select! {
                _ = ctrl_c => {}
                _ = sigterm.recv() => {}
            }
        }
        #[cfg(not(unix))]
        {
            ctrl_c.await.ok();
        }
    };
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            result = listener.accept() => {
                let (socket, peer) = match result {
                    Ok(conn) => conn,
                    Err(e) => {
                        tracing::error!("accept error: {e}");
                        continue;
                    }
                };

                let permit = match semaphore.clone().try_acquire_owned() {
                    Ok(permit) => permit,
                    Err(_) => {
                        tracing::warn!("connection limit reached, rejecting {peer}");
                        metrics::counter!(spacebook::observability::CONNECTIONS_REJECTED_TOTAL).increment(1);
                        drop(socket);
                        continue;
                    }
                };

                info!("connection from {peer}");
                metrics::counter!(spacebook::observability::CONNECTIONS_TOTAL).increment(1);
                metrics::gauge!(spacebook::observability::CONNECTIONS_ACTIVE).increment(1.0);
                let ctx = ctx.clone();

                tokio::spawn(async move {
                    let _permit = permit; // held until connection closes
                    if let Err(e) = wire::process_connection(socket, ctx).await {
                        tracing::error!("connection error from {peer}: {e}");
                    }
                    metrics::gauge!(spacebook::observability::CONNECTIONS_ACTIVE).decrement(1.0);
                });
            }
            _ = &mut shutdown => {
                info!("shutdown signal received, stopping accept loop");
                break;
            }
        }
    }

    scheduler.stop().await;

    // Wait for in-flight connections to finish (up to 10s)
    info!("draining connections...");
    let drain_deadline = tokio::time::sleep(std::time::Duration::from_secs(10));
    tokio::pin!(drain_deadline);

    loop {
        if semaphore.available_permits() == max_connections {
            info!("all connections drained");
            break;
        }
        tokio::select! {
            _ = &mut drain_deadline => {
                let remaining = max_connections - semaphore.available_permits();
                tracing::warn!("drain timeout, {remaining} connections still open");
                break;
            }
            _ = tokio::time::sleep(std::time::Duration::from_millis(100)) => {}
        }
    }

    info!("spacebook stopped");
    Ok(())
}
