//! Core engine: the epoch gate and the polling loop that drives it.

pub mod agent;
pub mod gate;

pub use agent::{spawn_shutdown_listener, PollConfig, StepReport, TraderAgent};
pub use gate::{GateConfig, TradeGate};
