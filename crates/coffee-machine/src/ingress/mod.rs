//! Command intake from the message bus.
//!
//! - [`command`] - topic/payload parsing
//! - [`dispatcher`] - single-flight admission and handler tasks
//! - [`listener`] - MQTT event loop

pub mod command;
pub mod dispatcher;
pub mod listener;

pub use command::{command_topics, Command};
pub use dispatcher::{CommandDispatcher, DispatchOutcome};
pub use listener::{handle_message, mqtt_options, run_command_ingress, REQUEST_QUEUE_CAPACITY};
