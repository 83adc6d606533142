//! Survey configuration, loaded once from JSON and passed down explicitly.
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::processing::{
    normalize_azimuth, AlignOptions, CalibrationTable, InstrumentResponse, OrientOptions,
    PartialDayPolicy, ProcessingError, ProcessingSettings, ScaleFactors, StationInfo,
};
use crate::transfer::EstimatorConfig;

fn default_network() -> String {
    "MT".to_string()
}

fn default_orthogonality() -> f64 {
    OrientOptions::default().orthogonality_tolerance_deg
}

fn default_clock_tolerance() -> f64 {
    AlignOptions::default().clock_tolerance
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StationConfig {
    #[serde(flatten)]
    pub info: StationInfo,
    /// Raw logger files; each file header names kind, instrument, rate,
    /// azimuth and dipole length.
    pub files: Vec<PathBuf>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SurveyConfig {
    #[serde(default = "default_network")]
    pub network: String,
    pub stations: Vec<StationConfig>,
    pub instruments: Vec<InstrumentResponse>,
    #[serde(default)]
    pub target_azimuth_deg: f64,
    #[serde(default)]
    pub scale_factors: ScaleFactors,
    #[serde(default = "default_orthogonality")]
    pub orthogonality_tolerance_deg: f64,
    #[serde(default = "default_clock_tolerance")]
    pub clock_tolerance: f64,
    #[serde(default)]
    pub partial_days: PartialDayPolicy,
    #[serde(default)]
    pub estimator: Option<EstimatorConfig>,
}

impl SurveyConfig {
    /// Reads and validates a config file. Relative channel paths resolve
    /// against the directory holding the config.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ProcessingError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        let mut config: SurveyConfig = serde_json::from_str(&text)?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        for station in &mut config.stations {
            station.info.id = station.info.id.trim().to_uppercase();
            for file in &mut station.files {
                if file.is_relative() {
                    *file = base.join(&*file);
                }
            }
        }
        config.validate()?;
        log::info!(
            "loaded survey config {} with {} stations",
            path.display(),
            config.stations.len()
        );
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ProcessingError> {
        let bad = |msg: String| Err(ProcessingError::Config(msg));
        if self.stations.is_empty() {
            return bad("no stations configured".into());
        }
        let mut ids = BTreeSet::new();
        for station in &self.stations {
            let id = &station.info.id;
            if id.is_empty() || id.chars().any(char::is_whitespace) {
                return bad(format!("station id `{id}` is not usable"));
            }
            if !ids.insert(id.as_str()) {
                return bad(format!("station {id} configured twice"));
            }
            if station.files.is_empty() {
                return bad(format!("station {id} has no channel files"));
            }
        }
        let mut instruments = BTreeSet::new();
        for instrument in &self.instruments {
            if !instruments.insert(instrument.instrument_id.as_str()) {
                return bad(format!("instrument {} listed twice", instrument.instrument_id));
            }
            if let Some(table) = &instrument.response {
                if let Err(reason) = table.validate() {
                    return bad(format!("instrument {}: {reason}", instrument.instrument_id));
                }
            }
        }
        if !self.target_azimuth_deg.is_finite() {
            return bad("target azimuth is not finite".into());
        }
        if !(self.orthogonality_tolerance_deg >= 0.0 && self.orthogonality_tolerance_deg < 90.0) {
            return bad(format!(
                "orthogonality tolerance {} outside [0, 90)",
                self.orthogonality_tolerance_deg
            ));
        }
        if !(self.clock_tolerance > 0.0 && self.clock_tolerance <= 0.5) {
            return bad(format!("clock tolerance {} outside (0, 0.5]", self.clock_tolerance));
        }
        if !(self.partial_days.min_partial_seconds >= 0.0) {
            return bad("minimum partial day must not be negative".into());
        }
        Ok(())
    }

    pub fn station(&self, id: &str) -> Option<&StationConfig> {
        let id = id.trim().to_uppercase();
        self.stations.iter().find(|s| s.info.id == id)
    }

    pub fn to_settings(&self) -> ProcessingSettings {
        ProcessingSettings {
            calibration: CalibrationTable::new(self.instruments.iter().cloned()),
            align: AlignOptions {
                clock_tolerance: self.clock_tolerance,
            },
            orient: OrientOptions {
                orthogonality_tolerance_deg: self.orthogonality_tolerance_deg,
            },
            target_azimuth_deg: normalize_azimuth(self.target_azimuth_deg),
            scale: self.scale_factors.clone(),
            partial_days: self.partial_days,
        }
    }
}
