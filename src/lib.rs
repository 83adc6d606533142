//! Magnetotelluric time-series processing: raw logger channels to calibrated
//! UTC dayfiles, and impedance-tensor transfer-function files.
pub mod config;
pub mod output;
pub mod processing;
pub mod survey;
pub mod transfer;

pub use config::{StationConfig, SurveyConfig};
pub use processing::ProcessingError;
