//! Background workers owned by the runtime.

mod simulation;

pub use simulation::{Command, SimulationWorker};
