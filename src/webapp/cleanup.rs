//! Background eviction of idle `/mcp` sessions
//!
//! Streamable sessions have no connection whose close could end them, so a
//! client that never sends DELETE would otherwise stay registered forever.

use std::time::Duration;

use super::AppState;

/// Sweep at most this often, however long the idle limit
const MAX_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

pub async fn cleanup_loop(state: AppState, idle: Duration) {
    let interval = idle.min(MAX_SWEEP_INTERVAL);
    loop {
        tokio::time::sleep(interval).await;
        evict_idle(&state, idle);
    }
}

/// Perform a single sweep
pub fn evict_idle(state: &AppState, idle: Duration) -> usize {
    let evicted = state.streamable.evict_idle(idle);
    for id in &evicted {
        tracing::debug!(session = %id, "Evicted idle session");
    }
    if !evicted.is_empty() {
        tracing::info!(
            evicted = evicted.len(),
            active = state.streamable.len(),
            "Session cleanup completed"
        );
    }
    evicted.len()
}
