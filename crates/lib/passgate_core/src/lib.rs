//! # passgate_core
//!
//! Core domain logic for Passgate: one-time passcodes, opaque access tokens,
//! encrypted refresh tokens and the record store they live in.

pub mod auth;
pub mod config;
pub mod crypto;
pub mod migrate;
pub mod models;
pub mod notify;
pub mod store;
pub mod uuid;

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
