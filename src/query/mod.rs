mod events;

pub use events::{EventQuery, PollError, PollOutcome, DEFAULT_POLL_INTERVAL};
