//! Observability for the coffee machine controller.
//!
//! Log targets (filterable with `RUST_LOG`):
//! - `coffee.channel.client` - channel service calls
//! - `coffee.lifecycle` - state machine operations and transitions
//! - `coffee.ingress` - MQTT event loop and command dispatch
//! - `coffee.publisher` - retained state publication
//!
//! # Metrics
//!
//! | Metric | Type | Labels | Purpose |
//! |--------|------|--------|---------|
//! | `coffee_commands_total` | Counter | `command`, `outcome` | Commands received, accepted, dropped |
//! | `coffee_state_transitions_total` | Counter | `state` | Lifecycle transitions |
//! | `coffee_remote_call_duration_seconds` | Histogram | `verb`, `status` | Channel service latency |
//! | `coffee_operation_duration_seconds` | Histogram | `operation`, `status` | End-to-end lifecycle operations |

pub mod health;
pub mod metrics;

pub use health::{health_router, HealthState};
pub use metrics::init_metrics_recorder;
