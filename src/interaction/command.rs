//! The `/highlight` slash command.
//!
//! Highlight words and phrases are not case-sensitive, so coffee, Coffee, and
//! COFFEE will all notify you. When one is found, the bot sends you a private
//! message with the message that triggered it along with some context.

use tracing::{error, instrument};

use crate::{
    base::types::{Res, TriggerError},
    service::db::DbClient,
};

/// Phrase that must accompany `delete-my-account`.
pub const DELETE_CONFIRMATION: &str = "Yes, delete my account.";

/// Usage text for the command.
pub const USAGE: &str = "\
*Usage:* `/highlight <command>`
• `add <word or phrase>` - notify you when a word or phrase is mentioned
• `remove <word or phrase>` - stop notifying you about a word or phrase
• `show` - list your highlight words or phrases
• `clear` - remove all your highlight words or phrases
• `block <@user or #channel>` - stop a user or channel from highlighting you
• `unblock <@user or #channel>` - revert a block
• `import <workspace id>` - copy your highlights from another workspace
• `delete-my-account` - delete all information stored about you";

/// A parsed `/highlight` invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HighlightCommand {
    Show,
    Add(String),
    Remove(String),
    Clear,
    Block(String),
    Unblock(String),
    Import(String),
    DeleteAccount { confirmation: String },
    Help,
}

impl HighlightCommand {
    /// Parse the text following the command name; `None` if it is not understood.
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        let (name, rest) = text.split_once(char::is_whitespace).map(|(n, r)| (n, r.trim())).unwrap_or((text, ""));

        let command = match (name.to_lowercase().as_str(), rest.is_empty()) {
            ("" | "help", _) => Self::Help,
            ("show" | "list", true) => Self::Show,
            ("clear", true) => Self::Clear,
            ("add", false) => Self::Add(rest.to_string()),
            ("remove", false) => Self::Remove(rest.to_string()),
            ("block", false) => Self::Block(parse_entity(rest)?),
            ("unblock", false) => Self::Unblock(parse_entity(rest)?),
            ("import", false) => Self::Import(rest.to_string()),
            ("delete-my-account", _) => Self::DeleteAccount { confirmation: rest.to_string() },
            _ => return None,
        };

        Some(command)
    }
}

/// Extract an entity id from a raw id, or an escaped `<@U123|name>` / `<#C123|name>` reference.
fn parse_entity(text: &str) -> Option<String> {
    let inner = text.strip_prefix('<').and_then(|t| t.strip_suffix('>')).unwrap_or(text);
    let inner = inner.split('|').next().unwrap_or_default();
    let id = inner.trim_start_matches(['@', '#']);

    (!id.is_empty() && !id.contains(char::is_whitespace)).then(|| id.to_string())
}

/// Run a command for `user_id` in the workspace `guild_id`.
#[instrument(skip(db))]
pub async fn execute(command: HighlightCommand, guild_id: &str, user_id: &str, db: &DbClient) -> Res<String> {
    let reply = match command {
        HighlightCommand::Help => USAGE.to_string(),
        HighlightCommand::Show => {
            let highlights = db.user_highlights(guild_id, user_id).await?;

            if highlights.is_empty() {
                "You do not have any highlight words or phrases set up.".to_string()
            } else {
                format!("*Triggers* ({})\n{}", highlights.len(), highlights.join("\n"))
            }
        }
        HighlightCommand::Add(highlight) => {
            db.add(guild_id, user_id, &highlight).await?;
            format!("Added highlight `{}`.", highlight.trim())
        }
        HighlightCommand::Remove(highlight) => {
            db.remove(guild_id, user_id, &highlight).await?;
            format!("Removed highlight `{}`.", highlight.trim())
        }
        HighlightCommand::Clear => {
            db.clear(guild_id, user_id).await?;
            "Removed all your highlight words or phrases.".to_string()
        }
        HighlightCommand::Block(entity) => {
            db.block(user_id, &entity).await?;
            format!("Blocked `{entity}` from highlighting you.")
        }
        HighlightCommand::Unblock(entity) => {
            db.unblock(user_id, &entity).await?;
            format!("Unblocked `{entity}`.")
        }
        HighlightCommand::Import(source) => {
            db.import(&source, guild_id, user_id).await?;
            format!("Imported your highlights from `{source}`.")
        }
        HighlightCommand::DeleteAccount { confirmation } => {
            if confirmation == DELETE_CONFIRMATION {
                db.delete_account(user_id).await?;
                "I've deleted your account successfully.".to_string()
            } else {
                format!(
                    "Are you sure you want to delete your account? This deletes all your highlights, from every workspace, and all your blocks. \
                     To confirm, run `/highlight delete-my-account {DELETE_CONFIRMATION}`."
                )
            }
        }
    };

    Ok(reply)
}

/// Parse and run a command, rendering any failure as a reply.
pub async fn handle_command(text: &str, guild_id: &str, user_id: &str, db: &DbClient) -> String {
    let Some(command) = HighlightCommand::parse(text) else {
        return USAGE.to_string();
    };

    match execute(command, guild_id, user_id, db).await {
        Ok(reply) => reply,
        Err(err) => match err.downcast_ref::<TriggerError>() {
            Some(input_error) => input_error.to_string(),
            None => {
                error!("Error while handling command: {}", err);
                "Something went wrong. Please try again later.".to_string()
            }
        },
    }
}

// Tests.
