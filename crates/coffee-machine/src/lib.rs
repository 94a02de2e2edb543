//! Coffee Machine Flash Channel Controller
//!
//! Drives a two-party Flash payment channel between a coffee machine and its
//! provider through the channel lifecycle:
//!
//! - open the channel on both parties' channel services
//! - fund it
//! - pay per cup
//! - close it
//!
//! Commands arrive over MQTT, the resulting state goes back out as retained
//! MQTT messages.
//!
//! # Architecture
//!
//! ```text
//! MQTT command ──► listener ──► CommandDispatcher (try-lock)
//!                                     │
//!                                     ▼
//!                            LifecycleController ──► StatePublisher ──► MQTT (retained)
//!                                     │
//!                                     ▼
//!                             ChannelRegistry
//!                             ├── party 0: ChannelClient (coffee machine)
//!                             └── party 1: ChannelClient (provider)
//! ```
//!
//! # Key Design Decisions
//!
//! - **Single flight**: at most one lifecycle operation runs at a time;
//!   commands received meanwhile are dropped, not queued
//! - **Fixed party order**: digests, settlement addresses and signatures
//!   always go coffee machine first, provider second
//! - **Opaque channel objects**: only balance and digest pool are inspected;
//!   everything else is published verbatim
//!
//! # Modules
//!
//! - [`channel`] - channel service clients and the party registry
//! - [`config`] - service configuration from environment
//! - [`errors`] - error types
//! - [`ingress`] - MQTT command intake and dispatch
//! - [`lifecycle`] - the state machine
//! - [`observability`] - health endpoints and metrics
//! - [`publisher`] - retained state publication

pub mod channel;
pub mod config;
pub mod errors;
pub mod ingress;
pub mod lifecycle;
pub mod observability;
pub mod publisher;
