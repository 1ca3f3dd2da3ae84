pub mod errors;
pub use errors::{Error, Result};

pub mod config;
pub use config::DetectorConfig;

pub mod cache;

pub mod features;

pub mod apps;

pub mod trackers;

pub mod rules;

pub mod exclusion;

pub mod recorder;

pub mod detector;
pub use detector::{detector_from_config, AppTrackerDetector, AppTrackerSighting, RealAppTrackerDetector};

#[cfg(feature = "adb")]
pub mod adb;

#[cfg(feature = "adb")]
pub mod command;

pub mod utils;

#[cfg(test)]
mod testing;
