//! Flash channel services and the party registry.
//!
//! - [`client`] - `ChannelService` trait and the HTTP `ChannelClient`
//! - [`object`] - partially typed channel objects
//! - [`registry`] - the two parties and their latest channel objects
//! - [`mock`] - recording `ChannelService` for tests

pub mod client;
pub mod mock;
pub mod object;
pub mod registry;

pub use client::{build_http_client, Bundles, ChannelClient, ChannelService, InitParams, Transfer};
pub use object::ChannelObject;
pub use registry::{ChannelRegistry, Party};
