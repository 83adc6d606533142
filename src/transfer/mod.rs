//! Impedance tensors, their file model and the external estimator.
pub mod estimator;
pub mod file;
pub mod tensor;
pub mod text;

pub use estimator::{
    parse_estimator_output, run_estimation, CancelToken, EstimatorConfig, FrequencyBand,
};
pub use file::{OverlapPolicy, RawEstimate, TfHeader, TransferFunctionFile};
pub use tensor::{ImpedanceTensor, Tipper};
pub use text::{deserialize, read_file, serialize, write_file};
