use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tracing::{info, warn};

use daybook::access::Roster;
use daybook::config::Config;
use daybook::observability;
use daybook::tenant::TenantManager;
use daybook::wire;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let config = Config::from_env()?;
    observability::init(config.metrics_port)?;

    let tls_acceptor = daybook::tls::load_tls_acceptor(&config.tls)?;

    let roster = match &config.roster {
        Some(path) => Roster::load(path)?,
        None => {
            warn!("DAYBOOK_ROSTER not set, every calendar request will be denied");
            Roster::default()
        }
    };
    let roster = Arc::new(roster);

    std::fs::create_dir_all(&config.data_dir)?;

    let tenant_manager = Arc::new(TenantManager::new(
        config.data_dir.clone(),
        config.compact_threshold,
    ));
    let max_connections = config.max_connections;
    let semaphore = Arc::new(Semaphore::new(max_connections));

    let addr = config.listen_addr();
    let listener = TcpListener::bind(&addr).await?;
    info!("daybook listening on {addr}");
    info!("  data_dir: {}", config.data_dir.display());
    info!("  max_connections: {max_connections}");
    info!("  roster members: {}", roster.len());
    info!("  tls: {}", if tls_acceptor.is_some() { "enabled" } else { "disabled" });

    let shutdown = shutdown_signal()?;
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
                        warn!("connection limit reached, rejecting {peer}");
                        metrics::counter!(observability::CONNECTIONS_REJECTED_TOTAL).increment(1);
                        drop(socket);
                        continue;
                    }
                };

                info!("connection from {peer}");
                metrics::counter!(observability::CONNECTIONS_TOTAL).increment(1);
                metrics::gauge!(observability::CONNECTIONS_ACTIVE).increment(1.0);
                let tm = tenant_manager.clone();
                let roster = roster.clone();
                let pw = config.password.clone();
                let tls = tls_acceptor.clone();

                tokio::spawn(async move {
                    let _permit = permit; // held until connection closes
                    if let Err(e) = wire::process_connection(socket, tm, roster, pw, tls).await {
                        tracing::error!("connection error from {peer}: {e}");
                    }
                    metrics::gauge!(observability::CONNECTIONS_ACTIVE).decrement(1.0);
                });
            }
            _ = &mut shutdown => {
                info!("shutdown signal received, stopping accept loop");
                break;
            }
        }
    }

    drain(&semaphore, max_connections, Duration::from_secs(10)).await;
    info!("daybook stopped");
    Ok(())
}

/// Resolves on ctrl-c or SIGTERM. Signal handlers are registered up front so
/// a registration failure aborts startup instead of the accept loop.
fn shutdown_signal() -> std::io::Result<impl Future<Output = ()>> {
    #[cfg(unix)]
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
    Ok(async move {
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
    })
}

/// Wait until every connection permit is back, or the deadline passes.
async fn drain(semaphore: &Semaphore, max_connections: usize, timeout: Duration) {
    info!("draining connections...");
    let deadline = tokio::time::sleep(timeout);
    tokio::pin!(deadline);

    while semaphore.available_permits() < max_connections {
        tokio::select! {
            _ = &mut deadline => {
                let remaining = max_connections - semaphore.available_permits();
                warn!("drain timeout, {remaining} connections still open");
                return;
            }
            _ = tokio::time::sleep(Duration::from_millis(100)) => {}
        }
    }
    info!("all connections drained");
}
