use anyhow::Result;
use tracing::{debug, info};

use crate::model::EventFilter;
use crate::query::{PollError, PollOutcome};

use super::{xml, Api, Reply, Request};

/// `/lastevents?start=&filter=type/project[/package]&obsname=`
pub(super) async fn handle(api: &Api, request: &Request) -> Result<Reply> {
    let start = request.param("start").and_then(|s| s.trim().parse::<u64>().ok());
    let mut filters = Vec::new();
    for value in request.params("filter") {
        match EventFilter::parse(value) {
            Some(filter) => filters.push(filter),
            None => {
                info!(filter = value, "400: malformed event filter");
                return Ok(Reply::error(400, "Malformed filter"));
            }
        }
    }
    let watcher = request.param("obsname").unwrap_or("");
    debug!(watcher, ?start, filters = filters.len(), "lastevents");

    match api.events.long_poll(start, &filters).await {
        Ok(PollOutcome::SyncLost { next }) => Ok(Reply::xml(xml::sync_lost(next)?)),
        Ok(PollOutcome::Events { next, events }) => Ok(Reply::xml(xml::events(next, &events)?)),
        Err(PollError::ShuttingDown) => Ok(Reply::error(503, "Shutting down")),
        Err(PollError::Internal(e)) => Err(e),
    }
}
