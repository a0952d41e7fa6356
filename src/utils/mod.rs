pub mod atomic;
pub mod metrics;
pub mod telemetry;
