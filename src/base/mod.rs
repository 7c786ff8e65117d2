//! Core components, types, and utilities for the highlight-bot.
//!
//! This module contains fundamental building blocks used throughout the application:
//! - Configuration handling and environment variables.
//! - Chat domain types and result handling.
//! - The wall clock abstraction used by the timing rules.

pub mod clock;
pub mod config;
pub mod types;
