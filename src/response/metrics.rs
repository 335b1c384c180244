//! Process-level gauges, rendered as OpenMetrics text for `/metrics`.
use super::redis::{Manager, SharedManager};
use crate::request::Store;

use std::fmt::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// The number of open client sessions on this worker
#[derive(Debug, Clone, Default)]
pub struct ConnectedClients(Arc<AtomicUsize>);

impl ConnectedClients {
    pub(crate) fn increment(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn decrement(&self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn get(&self) -> usize {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Clone)]
pub struct Metrics {
    pub clients: ConnectedClients,
    pub manager: SharedManager,
    pub store: Arc<dyn Store>,
}

impl Metrics {
    pub fn render(&self) -> String {
        let channels = self.manager.lock().unwrap_or_else(Manager::recover).channel_count();
        let pool = self.store.pool_status();

        let mut out = String::new();
        for (name, help, value) in [
            ("connected_clients", "The number of clients connected to the streaming server", self.clients.get()),
            ("connected_channels", "The number of Redis channels the streaming server is subscribed to", channels),
            ("pg_pool_total_connections", "The total number of clients made by the pool", pool.total),
            ("pg_pool_idle_connections", "The number of clients that are not checked out but are idle in the pool", pool.idle),
            ("pg_pool_waiting_queries", "The number of queued requests waiting on a client", pool.waiting),
        ] {
            // Writing to a String cannot fail
            let _ = writeln!(out, "# HELP {} {}\n# TYPE {} gauge\n{} {}", name, help, name, name, value);
        }
        out.push_str("# EOF\n");
        out
    }
}
