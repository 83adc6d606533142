use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::processing::response::{correct_response, ResponseTable};
use crate::processing::{Channel, PhysicalUnit, ProcessingError};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorKind {
    InductionCoil,
    Electrode,
}

/// Conversion from logger counts to physical units for one instrument.
///
/// Induction coils: `gain` is nT per count.
/// Electrodes: `gain` is mV per count; the dipole length of the channel turns
/// the voltage into mV/km.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InstrumentResponse {
    pub instrument_id: String,
    pub sensor: SensorKind,
    pub gain: f64,
    #[serde(default)]
    pub offset: f64,
    #[serde(default)]
    pub response: Option<ResponseTable>,
}

/// Instrument responses keyed by instrument identifier.
#[derive(Clone, Debug, Default)]
pub struct CalibrationTable {
    responses: HashMap<String, InstrumentResponse>,
}

impl CalibrationTable {
    pub fn new(responses: impl IntoIterator<Item = InstrumentResponse>) -> Self {
        Self {
            responses: responses
                .into_iter()
                .map(|r| (r.instrument_id.clone(), r))
                .collect(),
        }
    }

    pub fn get(&self, instrument_id: &str) -> Option<&InstrumentResponse> {
        self.responses.get(instrument_id)
    }

    pub fn len(&self) -> usize {
        self.responses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.responses.is_empty()
    }
}

/// Maps raw counts of `channel` to nT or mV/km using the matching table entry.
pub fn calibrate(channel: &Channel, table: &CalibrationTable) -> Result<Channel, ProcessingError> {
    let fail = |reason: String| ProcessingError::Calibration {
        channel: channel.kind(),
        instrument: channel.instrument_id().to_string(),
        reason,
    };
    let response = table
        .get(channel.instrument_id())
        .ok_or_else(|| fail("no response entry for instrument".into()))?;
    if channel.unit() != PhysicalUnit::Counts {
        return Err(fail(format!("channel is already in {}", channel.unit())));
    }
    if !(response.gain.is_finite() && response.gain != 0.0) || !response.offset.is_finite() {
        return Err(fail(format!("unusable gain {} / offset {}", response.gain, response.offset)));
    }
    let expected = if channel.kind().is_electric() {
        SensorKind::Electrode
    } else {
        SensorKind::InductionCoil
    };
    if response.sensor != expected {
        return Err(fail(format!("instrument is {:?}, channel needs {:?}", response.sensor, expected)));
    }

    let scale = match response.sensor {
        SensorKind::InductionCoil => response.gain,
        SensorKind::Electrode => {
            let dipole_m = channel
                .dipole_length_m()
                .ok_or_else(|| fail("electric channel has no dipole length".into()))?;
            if !(dipole_m > 0.0) {
                return Err(fail(format!("dipole length must be positive, got {dipole_m} m")));
            }
            response.gain / (dipole_m / 1000.0)
        }
    };

    let mut values: Vec<f64> = channel
        .samples()
        .iter()
        .map(|&counts| (counts - response.offset) * scale)
        .collect();
    if let Some(table) = &response.response {
        values = correct_response(&values, channel.sample_rate_hz(), table).map_err(fail)?;
    }
    log::debug!(
        "calibrated {} ({}) with scale {scale:.6e}",
        channel.kind(),
        channel.instrument_id()
    );
    Ok(channel
        .derive(values)
        .with_unit(channel.kind().physical_unit()))
}
