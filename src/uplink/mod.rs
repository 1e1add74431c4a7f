//! # Uplink Decoding Module
//!
//! Decoding of the compact tracker uplink format.
//!
//! This module handles:
//! - Header parsing under the primary (2-bit kind) or legacy (4-bit kind) layout
//! - Per-kind body layouts for config, no-location, WiFi and GNSS frames
//! - Fragment head/continuation/terminal classification
//! - Unwrapping the frame source's base64/hex event payload

pub mod protocol;
pub mod layout;
pub mod decoder;
pub mod event;
