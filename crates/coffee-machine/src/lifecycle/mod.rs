//! Channel lifecycle: states, payments and the controller that drives them.

pub mod controller;
pub mod payment;
pub mod state;

pub use controller::LifecycleController;
pub use payment::{CoffeeMode, PaymentOutcome};
pub use state::LifecycleState;
