//! # Sector Control
//!
//! Real-time control core for a multi-motor compression device driven by a
//! scanned distance field.
//!
//! ## Pipeline
//! - **Scan context:** a range finder on a rotating head sweeps a fixed arc;
//!   each motor owns one angular sector and receives that sector's minimum
//!   distance once per pass and direction.
//! - **Control context:** at a fixed rate, every motor's distance is
//!   classified (Far / Medium / Close / OutOfBounds / Unknown), mapped to a
//!   pressure setpoint and tracked by a PI loop, unless the motor's safety
//!   automaton has taken over to unwind it.
//! - **Telemetry:** word-atomic per-motor scalars published by a low-priority loop.
//!
//! ## Concurrency
//! - Distances cross threads as whole snapshots swapped under a short,
//!   bounded-wait lock; readers fall back to their last snapshot.
//! - No thread ever waits on another. Shutdown is a shared `AtomicBool`.

pub mod command;
pub mod config;
pub mod control;
pub mod error;
pub mod hardware;
pub mod runtime;
pub mod scan;
pub mod utils;

pub use config::CoreConfig;
pub use error::{CommandError, ConfigError};
pub use runtime::{Hardware, Runtime};
