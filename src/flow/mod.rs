pub mod controller;
pub mod state;

pub use controller::{FlowController, FlowSnapshot, SubmitOutcome};
pub use state::{FlowOptions, IgnoreReason};
