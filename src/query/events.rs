use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::cache::EventLogStore;
use crate::model::{Event, EventFilter};

/// How often a caught-up long poll re-checks the event log
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Answer of a long poll
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// The caller's position is unknown here; it must start over from `next`
    SyncLost { next: u64 },
    Events { next: u64, events: Vec<Event> },
}

#[derive(Debug, Error)]
pub enum PollError {
    #[error("Shutting down")]
    ShuttingDown,

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Point-in-time and long-poll queries over the event log
pub struct EventQuery {
    store: Arc<EventLogStore>,
    interval: Duration,
    shutdown: CancellationToken,
}

impl EventQuery {
    pub fn new(store: Arc<EventLogStore>, interval: Duration, shutdown: CancellationToken) -> Self {
        Self { store, interval, shutdown }
    }

    pub async fn next_event(&self) -> anyhow::Result<u64> {
        self.store.next_event().await
    }

    /// Events after position `start` matching any filter
    pub async fn query_filtered(&self, start: u64, filters: &[EventFilter]) -> anyhow::Result<Vec<Event>> {
        Ok(self.store.get().await?.filtered(start, filters))
    }

    /// Wait for events after `start`.
    ///
    /// A caller that is caught up blocks until the log grows or the service
    /// shuts down; one that is ahead of the log, or has no position, gets
    /// `SyncLost` at once.
    pub async fn long_poll(
        &self,
        start: Option<u64>,
        filters: &[EventFilter],
    ) -> Result<PollOutcome, PollError> {
        let mut next = self.next_event().await?;
        let start = match start {
            Some(start) if start <= next => start,
            _ => return Ok(PollOutcome::SyncLost { next }),
        };

        if start == next {
            debug!(start, interval = ?self.interval, "caught up, polling");
        }
        while start == next {
            tokio::select! {
                _ = self.shutdown.cancelled() => return Err(PollError::ShuttingDown),
                _ = tokio::time::sleep(self.interval) => {}
            }
            next = self.next_event().await?;
        }

        if start > next {
            // The log was reset while waiting
            return Ok(PollOutcome::SyncLost { next });
        }

        let log = self.store.get().await?;
        Ok(PollOutcome::Events {
            next: log.next_event(),
            events: log.filtered(start, filters),
        })
    }
}
