//! The synchronization loop: fetch one incremental changeset, fan out one
//! concurrent apply per changed address, join the whole batch, sleep, repeat.
//!
//! Per-entry failures (unparseable address, no owning node, coercion) are
//! isolated: logged, counted, and skipped without disturbing sibling entries
//! or the loop. A changeset fetch that fails ends only that tick; a fetch
//! that never returns stalls the loop — there is deliberately no per-fetch
//! timeout, the collaborator paces us.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use blockmirror_core::addr::Address;
use blockmirror_core::error::Result;
use blockmirror_core::ports::DeviceClient;
use blockmirror_core::tree::DeviceTree;

/// Outcome of one poll tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickStats {
    pub applied: usize,
    pub skipped: usize,
}

pub struct ChangePoller {
    client: Arc<dyn DeviceClient>,
    tree: Arc<DeviceTree>,
    period: Duration,
}

impl ChangePoller {
    pub fn new(client: Arc<dyn DeviceClient>, tree: Arc<DeviceTree>, period: Duration) -> Self {
        Self {
            client,
            tree,
            period,
        }
    }

    /// Run the poll loop until the shutdown flag flips. Spawn as a
    /// background task via `tokio::spawn`.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(period = ?self.period, "change poller started");
        loop {
            if *shutdown.borrow() {
                info!("change poller shutting down");
                break;
            }
            match self.tick().await {
                Ok(stats) if stats.skipped > 0 => {
                    debug!(applied = stats.applied, skipped = stats.skipped, "tick done")
                }
                Ok(_) => {}
                Err(error) => error!(%error, "changeset fetch failed"),
            }
            tokio::select! {
                _ = shutdown.changed() => {}
                _ = tokio::time::sleep(self.period) => {}
            }
        }
    }

    /// One poll round: fetch, fan out applies, join. Fan-out width equals
    /// the changeset size; the batch completes before the next fetch.
    pub async fn tick(&self) -> Result<TickStats> {
        let changes = self.client.get_changes().await?;
        let outcomes = join_all(
            changes
                .iter()
                .map(|(name, value)| self.apply_one(name, value)),
        )
        .await;

        let mut stats = TickStats::default();
        for outcome in outcomes {
            match outcome {
                Ok(()) => stats.applied += 1,
                Err(()) => stats.skipped += 1,
            }
        }
        Ok(stats)
    }

    /// Apply one (address, value) entry. Failures are surfaced to the log
    /// and reduced to a count — an entry can only skip itself.
    async fn apply_one(&self, name: &str, raw: &str) -> std::result::Result<(), ()> {
        Address::parse(name)
            .and_then(|addr| self.tree.apply(&addr, raw))
            .map_err(|error| {
                warn!(address = name, %error, "skipped change entry");
            })
    }
}
