//! Matching message text against registered highlights.

use std::collections::{BTreeSet, HashMap, HashSet};

use regex::{Regex, RegexBuilder};
use tracing::{debug, instrument, warn};

use crate::base::types::{ChatMessage, MatchResult, Res};

use super::{Highlighter, activity::ActivityKey};

/// A compiled, case-insensitive alternation over a set of literal triggers.
///
/// Alternatives are ordered longest first (ties broken by text), so at any
/// position the longest matching trigger wins. Word boundaries are asserted on
/// trigger edges that are word characters: `cat` does not match inside
/// `category`, while `c++` still matches in `c++ rocks`.
#[derive(Debug)]
pub struct TriggerPattern {
    regex: Regex,
    /// Trigger text for capture group `i + 1`.
    triggers: Vec<String>,
}

impl TriggerPattern {
    /// Build a pattern over `triggers`; `None` if there is nothing to match.
    pub fn new<'a>(triggers: impl IntoIterator<Item = &'a str>) -> Res<Option<Self>> {
        let mut triggers = triggers.into_iter().filter(|t| !t.is_empty()).map(str::to_string).collect::<Vec<_>>();

        triggers.sort_by(|a, b| b.chars().count().cmp(&a.chars().count()).then_with(|| a.cmp(b)));
        triggers.dedup();

        if triggers.is_empty() {
            return Ok(None);
        }

        let alternation = triggers.iter().map(|t| format!("({})", bounded(t))).collect::<Vec<_>>().join("|");
        let regex = RegexBuilder::new(&alternation).case_insensitive(true).build()?;

        Ok(Some(Self { regex, triggers }))
    }

    /// The triggers found in `text`, as non-overlapping matches from left to right.
    pub fn find_iter<'a>(&'a self, text: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.regex
            .captures_iter(text)
            .filter_map(move |caps| (1..caps.len()).find(|&i| caps.get(i).is_some()).map(|i| self.triggers[i - 1].as_str()))
    }
}

/// Escape a trigger and wrap it in the word boundaries its edges allow.
fn bounded(trigger: &str) -> String {
    let start = if trigger.chars().next().is_some_and(regex_syntax::is_word_character) { r"\b" } else { "" };
    let end = if trigger.chars().next_back().is_some_and(regex_syntax::is_word_character) { r"\b" } else { "" };

    format!("{start}{}{end}", regex::escape(trigger))
}

/// Find the users that `message` should notify, and the trigger that fired for each.
///
/// Each user appears at most once, with the first of their triggers to match.
/// The author, users who blocked the author, and users currently present in
/// the channel are skipped. Owners of one trigger are visited in id order.
#[instrument(skip_all, fields(channel = %message.channel.id, message_id = %message.id))]
pub async fn find_triggers(ctx: &Highlighter, message: &ChatMessage) -> Res<Vec<MatchResult>> {
    if message.channel.guild.is_none() || !ctx.chat.should_reply(message) {
        return Ok(Vec::new());
    }

    let trigger_set = ctx.db.channel_highlights(&message.channel).await?;

    let Some(pattern) = TriggerPattern::new(trigger_set.keys().map(String::as_str))? else {
        return Ok(Vec::new());
    };

    let mut seen = HashSet::new();
    let mut blocks: HashMap<String, BTreeSet<String>> = HashMap::new();
    let mut results = Vec::new();

    for trigger in pattern.find_iter(&message.content) {
        let Some(owners) = trigger_set.get(trigger) else {
            continue;
        };

        for owner in owners {
            if owner == &message.author.id || seen.contains(owner) {
                continue;
            }

            if ctx.activity.is_present(&ActivityKey::new(&message.channel.id, owner)) {
                debug!("Skipping `{}`, who is active in the channel.", owner);
                continue;
            }

            if !blocks.contains_key(owner) {
                match ctx.db.blocks(owner).await {
                    Ok(owner_blocks) => {
                        blocks.insert(owner.clone(), owner_blocks);
                    }
                    Err(err) => {
                        // Without the block list, an author block cannot be ruled out.
                        warn!("Failed to fetch blocks for `{}`: {}", owner, err);
                        seen.insert(owner.clone());
                        continue;
                    }
                }
            }

            if blocks.get(owner).is_some_and(|b| b.contains(&message.author.id)) {
                debug!("Skipping `{}`, who blocked the author.", owner);
                continue;
            }

            seen.insert(owner.clone());

            match ctx.chat.get_user(owner).await {
                Ok(user) => results.push(MatchResult {
                    user,
                    trigger: trigger.to_string(),
                }),
                Err(err) => warn!("Failed to resolve user `{}`: {}", owner, err),
            }
        }
    }

    Ok(results)
}

// Tests.

#[cfg(test)]
mod tests {
    use super::*;

    fn matches<'a>(pattern: &'a TriggerPattern, text: &'a str) -> Vec<&'a str> {
        pattern.find_iter(text).collect()
    }

    #[test]
    fn test_empty_pattern() {
        assert!(TriggerPattern::new([]).unwrap().is_none());
        assert!(TriggerPattern::new([""]).unwrap().is_none());
    }

    #[test]
    fn test_case_insensitive_left_to_right() {
        let pattern = TriggerPattern::new(["coffee", "tea"]).unwrap().unwrap();

        assert_eq!(matches(&pattern, "I love Coffee and tea"), vec!["coffee", "tea"]);
        assert_eq!(matches(&pattern, "TEA, then COFFEE"), vec!["tea", "coffee"]);
    }

    #[test]
    fn test_word_boundaries() {
        let pattern = TriggerPattern::new(["cat"]).unwrap().unwrap();

        assert!(matches(&pattern, "see the category").is_empty());
        assert!(matches(&pattern, "concatenate").is_empty());
        assert_eq!(matches(&pattern, "the cat sat"), vec!["cat"]);
        assert_eq!(matches(&pattern, "cat!"), vec!["cat"]);
    }

    #[test]
    fn test_special_characters_are_literal() {
        let pattern = TriggerPattern::new(["c++", "a.b", "(x)"]).unwrap().unwrap();

        assert_eq!(matches(&pattern, "I write c++ daily"), vec!["c++"]);
        assert!(matches(&pattern, "axb").is_empty());
        assert_eq!(matches(&pattern, "see a.b and (x)"), vec!["a.b", "(x)"]);
    }

    #[test]
    fn test_longest_trigger_wins_at_same_position() {
        let pattern = TriggerPattern::new(["ice", "ice cream"]).unwrap().unwrap();

        assert_eq!(matches(&pattern, "ice cream please"), vec!["ice cream"]);
        assert_eq!(matches(&pattern, "ice please"), vec!["ice"]);
    }

    #[test]
    fn test_unicode_edges_follow_regex_word_class() {
        let pattern = TriggerPattern::new(["x²", "½"]).unwrap().unwrap();

        assert_eq!(matches(&pattern, "solve for x² now"), vec!["x²"]);
        assert_eq!(matches(&pattern, "x²"), vec!["x²"]);
        assert_eq!(matches(&pattern, "add ½ cup"), vec!["½"]);
        assert!(matches(&pattern, "max² now").is_empty());

        let pattern = TriggerPattern::new(["café"]).unwrap().unwrap();

        assert_eq!(matches(&pattern, "Café au lait"), vec!["café"]);
        assert!(matches(&pattern, "cafés").is_empty());
    }

    #[test]
    fn test_repeated_occurrences() {
        let pattern = TriggerPattern::new(["tea"]).unwrap().unwrap();

        assert_eq!(matches(&pattern, "tea tea TEA"), vec!["tea", "tea", "tea"]);
    }

    #[test]
    fn test_phrases() {
        let pattern = TriggerPattern::new(["rust lang"]).unwrap().unwrap();

        assert_eq!(matches(&pattern, "Rust Lang is nice"), vec!["rust lang"]);
        assert!(matches(&pattern, "rust language").is_empty());
    }
}
