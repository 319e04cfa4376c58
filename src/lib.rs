//! Proximity library — presence-driven output controller.
//!
//! The node listens to 802.11 management traffic on the channel of the
//! network it is associated with, recognises configured beacon identifiers,
//! and switches outputs (GPIO relays, LEDs, cloud smart plugs) according to a
//! per-location mapping. Outputs fall back to off when presence is not
//! renewed within their idle timeout.
//!
//! All logic in this crate is platform independent and testable on any host
//! with `cargo test`. The ESP-IDF firmware under `firmware-std/` is a thin
//! consumer that implements the [`hal`] traits.
//!
//! - [`filter`]: beacon registry entries and the frame matcher
//! - [`output`]: per-output state machine and activation
//! - [`cloud`]: signed, token-refreshing cloud plug client
//! - [`connectivity`]: station / access-point mode controller
//! - [`registry`]: owned beacon and output inventories plus the location mapping
//! - [`scheduler`]: the node context, its shared lock and the four tasks

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod board;
pub mod cloud;
pub mod config;
pub mod connectivity;
pub mod defaults;
pub mod error;
pub mod filter;
pub mod hal;
pub mod output;
pub mod protocol;
pub mod registry;
pub mod scheduler;

pub use error::Error;
