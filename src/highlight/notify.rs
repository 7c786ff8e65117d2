//! Delivery of highlight notifications.
//!
//! Each notification waits until the triggering message is at least one settle
//! window old, so that the context snippet includes the replies that followed
//! it. Delivery is best-effort: failures are logged and the job is dropped.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{Instrument, debug, info, instrument, warn};

use crate::base::{
    clock::elapsed_between,
    types::{ChatMessage, NotificationJob, Void},
};

use super::Highlighter;

/// Dispatch a notification in the background.
#[instrument(skip_all, fields(user = %job.user.id, message_id = %job.message.id))]
pub fn dispatch(ctx: Highlighter, job: NotificationJob) {
    tokio::spawn(
        async move {
            // Process the job.
            let result = dispatch_internal(&ctx, job).await;

            // Log any errors.
            if let Err(err) = &result {
                warn!("Dropping notification: {}", err);
            }
        }
        .in_current_span(),
    );
}

async fn dispatch_internal(ctx: &Highlighter, job: NotificationJob) -> Void {
    let delay = settle_delay(job.message.created_at, ctx.clock.now(), ctx.config.settle_window());

    if !delay.is_zero() {
        debug!("Waiting {:?} for the conversation to settle.", delay);
        tokio::time::sleep(delay).await;
    }

    // Gather context, falling back to the triggering message alone.

    let history = match ctx.chat.get_history_around(&job.message, ctx.config.context_before, ctx.config.context_after).await {
        Ok(history) => history,
        Err(err) => {
            warn!("Failed to fetch context: {}", err);
            Vec::new()
        }
    };

    let context = with_anchor(history, &job.message);
    let link = ctx.chat.message_link(&job.message);
    let text = notification_text(&job, &context, &link);

    ctx.chat.send_direct_message(&job.user.id, &text).await?;

    info!("Notified `{}` ({:?} after it was queued).", job.user.id, elapsed_between(job.enqueued_at, ctx.clock.now()));

    Ok(())
}

/// How much longer to wait before a message created at `created_at` has settled.
pub fn settle_delay(created_at: DateTime<Utc>, now: DateTime<Utc>, window: Duration) -> Duration {
    window.saturating_sub(elapsed_between(created_at, now))
}

/// Ensure `anchor` is part of `history`, in chronological order.
fn with_anchor(mut history: Vec<ChatMessage>, anchor: &ChatMessage) -> Vec<ChatMessage> {
    if !history.iter().any(|m| m.id == anchor.id) {
        history.push(anchor.clone());
    }

    history.sort_by_key(|m| m.created_at);
    history
}

/// Format one line of context; the triggering line's timestamp is emphasized.
pub fn format_message(message: &ChatMessage, is_highlight: bool) -> String {
    let date = message.created_at.format("[%I:%M:%S %p UTC]").to_string();
    let date = if is_highlight { format!("*{date}*") } else { date };

    format!("{date} {}: {}", message.author.name, message.content)
}

/// Compose the private notification.
pub fn notification_text(job: &NotificationJob, context: &[ChatMessage], link: &str) -> String {
    let channel = &job.message.channel;
    let guild = channel.guild.as_ref().map(|g| g.name.as_str()).unwrap_or("an unknown workspace");

    let summary = format!("In <#{}> for workspace {}, you were mentioned with highlight word *{}*", channel.id, guild, job.trigger);
    let lines = context.iter().map(|m| format_message(m, m.id == job.message.id)).collect::<Vec<_>>().join("\n");

    format!("{summary}\n\n{lines}\n\n<{link}|Original message>")
}

// Tests.
