//! Background idle-session sweeper.
//!
//! Wakes every `interval` and calls [`SessionMemory::sweep`]. Runs until the
//! shutdown token is cancelled.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::SessionMemory;

/// Spawn the sweep loop on the current runtime.
pub fn spawn_sweeper(
    memory: Arc<SessionMemory>,
    interval: Duration,
    max_idle: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            interval_secs = interval.as_secs(),
            max_idle_secs = max_idle.as_secs(),
            "session sweeper running"
        );

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    info!("session sweeper shutting down");
                    break;
                }

                _ = ticker.tick() => {
                    let removed = memory.sweep(max_idle);
                    debug!(removed, active = memory.active_sessions(), "sweep tick");
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subsystems::memory::{Channel, MemoryConfig, Role};

    #[tokio::test(start_paused = true)]
    async fn sweeper_evicts_empty_sessions_and_stops() {
        let memory = Arc::new(SessionMemory::new(MemoryConfig::default()));
        memory.ensure("idle");
        memory.append("live", Channel::Consulting, Role::User, "sơn chống thấm");

        let shutdown = CancellationToken::new();
        let handle = spawn_sweeper(
            Arc::clone(&memory),
            Duration::from_secs(60),
            Duration::from_secs(24 * 3600),
            shutdown.clone(),
        );

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(memory.get("idle").is_none());
        assert!(memory.get("live").is_some());

        shutdown.cancel();
        handle.await.unwrap();
    }
}
