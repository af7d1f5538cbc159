//! Footfall Core - Shared domain library.
//!
//! This crate provides the types and decision logic used across all
//! Footfall Rewards components:
//! - `server` - HTTP service (trigger endpoint, manual visit actions)
//! - `cli` - Command-line tools for migrations and seeding
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions - no I/O, no
//! database access, no HTTP clients. Every operation on a [`visit::Visit`]
//! takes the current instant as an argument, so callers own the clock and
//! tests are fully deterministic.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for type-safe IDs, emails, and statuses
//! - [`visit`] - The visit snapshot and its state machine
//! - [`reminder`] - Reminder offsets and due-pair selection

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod reminder;
pub mod types;
pub mod visit;

pub use reminder::{DueReminder, OffsetParseError, ReminderOffset};
pub use types::*;
pub use visit::{TransitionError, Visit};
