//! Intake for "typing started" events.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{instrument, trace};

use crate::{
    base::{clock::elapsed_between, types::TypingEvent},
    highlight::{Highlighter, activity::ActivityKey},
};

/// Handles a typing notice by marking the user present until their window ends.
#[instrument(skip_all, fields(channel = %event.channel_id, user = %event.user_id))]
pub fn handle_typing(event: TypingEvent, highlighter: &Highlighter) {
    let Some(remaining) = typing_lease(event.started_at, highlighter.clock.now(), highlighter.config.last_spoken_cutoff()) else {
        trace!("Typing notice is older than the cutoff.");
        return;
    };

    highlighter.activity.lease(ActivityKey::new(event.channel_id, event.user_id), remaining);
}

/// The part of the `cutoff` window, starting at `started_at`, that is still ahead of `now`.
///
/// A typing notice only fills the gap up to the end of its window and never
/// extends presence past it.
pub fn typing_lease(started_at: DateTime<Utc>, now: DateTime<Utc>, cutoff: Duration) -> Option<Duration> {
    let remaining = cutoff.saturating_sub(elapsed_between(started_at, now));

    (!remaining.is_zero()).then_some(remaining)
}
