//! # Fragment Reassembly Module
//!
//! WiFi beacon lists and GNSS nav messages too large for one uplink arrive
//! as fragment groups.
//!
//! This module handles:
//! - Deriving a group's sequence range from its terminal fragment
//! - Time-windowed selection and completeness checks
//! - Merging complete groups into one resolution request

pub mod window;
pub mod reassembler;
