//! Sage Simulation Library
//!
//! Ground-truth trajectory generation, noisy sensor synthesis, and
//! estimator scoring for the sage estimation toolkit.

pub mod runner;
pub mod sensor;
pub mod sim;

// Re-export main types
pub use runner::{run_estimator, EstimatorConfig, RunResult, RunSummary};
pub use sensor::{generate_sensor_data, SensorConfig, SensorData, VisionFix};
pub use sim::{simulate, standard_module_layout, SimParams, SimResult};
