//! Time-series normalization: raw segments to calibrated, aligned,
//! re-oriented blocks and UTC day blocks.
pub mod align;
pub mod calibration;
pub mod channel;
pub mod degap;
pub mod error;
pub mod filter;
pub mod orient;
pub mod pipeline;
pub mod response;
pub mod segment;
pub mod source;

pub use align::{align, AlignOptions, AlignedBlock};
pub use calibration::{calibrate, CalibrationTable, InstrumentResponse, SensorKind};
pub use channel::{Channel, ChannelKind, ChannelMeta, PhysicalUnit, Station, StationInfo};
pub use degap::{channels_in_window, coverage_windows, degap, Window};
pub use error::ProcessingError;
pub use orient::{normalize_azimuth, reorient, OrientOptions, ScaleFactors};
pub use pipeline::{ProcessingSettings, StationPipeline};
pub use response::ResponseTable;
pub use segment::{day_blocks, segment, Completeness, DayBlock, DaySegments, PartialDayPolicy};
pub use source::{collect_segments, AsciiChannelSource, ChannelSource, ManualSource};
