//! Core domain + application logic for the svitlo schedule relay.
//!
//! This crate is intentionally transport-agnostic. The Telegram source and
//! destination live behind ports (traits) implemented in adapter crates.

pub mod config;
pub mod cycle;
pub mod domain;
pub mod errors;
pub mod locator;
pub mod logging;
pub mod pattern;
pub mod ports;
pub mod transfer;
pub mod trigger;
pub mod watermark;

pub use errors::{Error, Result};
