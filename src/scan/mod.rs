//! Scan context: sector map, per-pass minimum tracking, the published
//! distance exchange and the sweep loop that ties them together.

pub mod board;
pub mod pass;
pub mod scanner;
pub mod sector;
pub mod settings;

pub use board::{DistanceBoard, DistanceReader, DistanceSnapshot, DistanceWriter, Fetch, SectorReading, UNKNOWN_DISTANCE};
pub use scanner::SectorScanner;
pub use sector::{Sector, SectorMap};
pub use settings::{ScanSettings, SharedScanSettings};
