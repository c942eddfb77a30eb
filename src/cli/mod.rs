//! CLI operation mode handlers.
//!
//! This module contains the implementations for different operation modes:
//! - [`component`]: Print one component configuration
//! - [`ingest`]: Track JSON-lines events from stdin and deliver them
//! - [`migrations`]: Database schema migrations
//! - [`sessions`]: Print session history and the duration trend
//!
//! Output formatting utilities are in [`output`]; store and logging set-up
//! shared by the handlers lives in [`wiring`].

pub mod component;
pub mod ingest;
pub mod migrations;
pub mod output;
pub mod sessions;
pub mod wiring;
