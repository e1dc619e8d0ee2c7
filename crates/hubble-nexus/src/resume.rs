use chrono::NaiveDateTime;
use tracing::{info, warn};

use hubble_types::{DATETIME_FORMAT, ResumeCursor};

use crate::client::NexusClient;

/// Work out where to resume tailing `source` from Nexus' own records
///
/// Falls back to [`ResumeCursor::Epoch`] when Nexus has nothing for the
/// source, cannot be queried, or returns a datetime we cannot read.
pub async fn resume_cursor(client: &NexusClient, source: &str) -> ResumeCursor {
    let events = match client.latest_events(source).await {
        Ok(events) => events,
        Err(err) => {
            warn!(source, error = %err, "failed to query latest event, reading from the start");
            return ResumeCursor::Epoch;
        }
    };

    let Some(latest) = events.first() else {
        info!(source, "no prior events, reading from the start");
        return ResumeCursor::Epoch;
    };

    match NaiveDateTime::parse_from_str(&latest.event_datetime, DATETIME_FORMAT) {
        Ok(ts) => {
            info!(source, since = %latest.event_datetime, "resuming from last recorded event");
            ResumeCursor::At(ts)
        }
        Err(err) => {
            warn!(
                source,
                datetime = %latest.event_datetime,
                error = %err,
                "unreadable event datetime, reading from the start"
            );
            ResumeCursor::Epoch
        }
    }
}
