//! Event handling and user interactions for highlight-bot.
//!
//! This module provides functionality for handling chat events:
//! - Scanning newly posted messages and marking their authors present
//! - Marking typing users present for the rest of their "just spoke" window
//! - Managing highlights and blocks through the slash command

pub mod command;
pub mod message;
pub mod typing;
