//! # Tracker Uplink Library
//!
//! Decode compact asset tracker uplinks and reassemble fragmented WiFi and
//! GNSS location requests.
//!
//! This library provides the frame decoder, the fragment window and
//! reassembly logic, the location normalizer, and an orchestrator that runs
//! each incoming uplink against injected store, oracle and sink collaborators.

pub mod config;
pub mod error;
pub mod uplink;
pub mod fragment;
pub mod location;
pub mod collaborators;
pub mod orchestrator;
