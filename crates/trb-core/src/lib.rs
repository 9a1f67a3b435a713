//! Core of the translation relay bot.
//!
//! This crate is framework-agnostic. Telegram and the translation backend
//! live behind ports (traits) implemented in adapter crates.

pub mod commands;
pub mod config;
pub mod dispatch;
pub mod domain;
pub mod errors;
pub mod formatting;
pub mod lifecycle;
pub mod logging;
pub mod messaging;
pub mod offload;
pub mod ports;
pub mod security;
pub mod texts;

pub use errors::{Error, OffloadError, Result};
