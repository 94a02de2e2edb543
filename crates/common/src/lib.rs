//! Common utilities and types shared across the Flash coffee machine crates.

#![warn(clippy::pedantic)]

/// Module for secret types that prevent accidental logging
pub mod secret;

/// Module for party and channel identifier types
pub mod types;

/// Module for bearer token acquisition from channel services
pub mod auth;
