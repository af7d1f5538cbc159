//! Footfall Rewards server library.
//!
//! This crate provides the service functionality as a library, allowing
//! it to be tested and reused (the integration-tests crate drives the
//! reminder engine against in-memory collaborators).
//!
//! # Responsibilities
//!
//! - Visit lifecycle: manual complete/miss/cancel actions with
//!   optimistic-concurrency guards
//! - Reminder engine: periodic sweep, due-pair selection, bounded
//!   notification dispatch
//! - The externally triggered cycle endpoint and its bearer credential

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
pub mod store;
