//! Process roles.  With more than one worker configured, the first process becomes a
//! master that only supervises; each worker is a copy of the same executable serving the
//! same port through `SO_REUSEPORT`, and workers share nothing with each other.
use crate::err::FatalErr;
use crate::request::{query_store, Store};

use std::net::SocketAddr;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpSocket};
use tokio::process::Command;
use tokio::signal;
use tokio::task::JoinHandle;

/// Set in each worker's environment; its absence marks the master
pub const WORKER_ID_VAR: &str = "FANOUT_WORKER_ID";
const RESTART_DELAY: Duration = Duration::from_secs(1);
const STORE_CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// This process's worker id, or `None` for the master
pub fn id() -> Option<String> {
    std::env::var(WORKER_ID_VAR).ok()
}

/// Keep `count` workers running until the master is told to stop.  A worker that exits for
/// any reason is restarted after a short delay.
pub async fn supervise(count: usize) -> Result<(), FatalErr> {
    let exe = std::env::current_exe()?;
    log::warn!("Starting {} workers", count);

    let workers: Vec<JoinHandle<()>> = (0..count)
        .map(|id| {
            let exe = exe.clone();
            tokio::spawn(async move {
                loop {
                    let child = Command::new(&exe)
                        .args(std::env::args_os().skip(1))
                        .env(WORKER_ID_VAR, id.to_string())
                        .stdin(Stdio::null())
                        .kill_on_drop(true)
                        .spawn();
                    match child {
                        Ok(mut child) => match child.wait().await {
                            Ok(status) => log::error!("Worker {} exited with {}", id, status),
                            Err(e) => log::error!("Lost track of worker {}: {}", id, e),
                        },
                        Err(e) => log::error!("Could not start worker {}: {}", id, e),
                    }
                    tokio::time::sleep(RESTART_DELAY).await;
                    log::warn!("Restarting worker {}", id);
                }
            })
        })
        .collect();

    shutdown_signal().await;
    log::warn!("Stopping {} workers", workers.len());
    for worker in workers {
        worker.abort();
        // Awaiting the aborted task drops its child, which kills the worker process
        let _ = worker.await;
    }
    Ok(())
}

/// Bind a listener that other workers can bind to as well
pub fn bind(addr: SocketAddr) -> Result<TcpListener, FatalErr> {
    let socket = match addr {
        SocketAddr::V4(_) => TcpSocket::new_v4()?,
        SocketAddr::V6(_) => TcpSocket::new_v6()?,
    };
    socket.set_reuseaddr(true)?;
    #[cfg(unix)]
    socket.set_reuseport(true)?;
    socket.bind(addr)?;
    Ok(socket.listen(1024)?)
}

/// Resolves on Ctrl-C or, on Unix, SIGTERM
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            log::error!("Could not listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await
        }
    };
    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                log::error!("Could not listen for SIGTERM: {}", e);
                std::future::pending::<()>().await
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => log::warn!("Received Ctrl-C; shutting down"),
        _ = terminate => log::warn!("Received SIGTERM; shutting down"),
    }
}

/// Exit the worker if Postgres stops answering; the master starts a fresh one
pub fn watch_store(store: Arc<dyn Store>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut check = tokio::time::interval(STORE_CHECK_INTERVAL);
        check.tick().await;
        loop {
            check.tick().await;
            if let Err(e) = query_store(&store, |pg| pg.ping()).await {
                FatalErr::exit(FatalErr::Postgres(e));
            }
        }
    })
}
