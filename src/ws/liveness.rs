//! Liveness monitor: detects half-open transports that never signal close.
//!
//! Long-lived connections behind proxies/NATs can stay open at the socket
//! level after the remote end is gone; without active probing the registry
//! would accumulate stale entries and leak delivery attempts. Each tick,
//! entries that never answered the previous probe are force-closed and
//! removed, and a fresh probe goes out to the rest — a two-interval
//! detection window that tolerates transient delay.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::interval;

use crate::ws::registry::ConnectionRegistry;

/// Default probe interval; a dead connection is evicted within 1–2 of these.
pub const DEFAULT_PROBE_INTERVAL: Duration = Duration::from_secs(10);

/// Run the monitor loop. Spawned once at startup; never returns.
pub async fn run(registry: Arc<ConnectionRegistry>, probe_interval: Duration) {
    let mut timer = interval(probe_interval);
    // Skip the first immediate tick so fresh connections get a full window.
    timer.tick().await;

    loop {
        timer.tick().await;
        let evicted = registry.sweep();
        if evicted > 0 {
            tracing::info!(evicted, remaining = registry.len(), "Liveness sweep evicted connections");
        }
    }
}
