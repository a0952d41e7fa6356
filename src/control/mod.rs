//! Control context: classifier, PI law, safety automaton and the periodic
//! cycle that runs them for every motor.

pub mod classifier;
pub mod controller;
pub mod cycle;
pub mod safety;

pub use classifier::{DistanceRange, SetpointPolicy, Thresholds};
pub use controller::{PiController, PiGains, PiLimits, SharedGains};
pub use cycle::{ControlCycle, CycleReport, MotorChannel};
pub use safety::{SafetyMachine, SafetyPolicy, SafetyState};
