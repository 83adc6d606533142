use std::collections::BTreeSet;

use crate::processing::channel::seconds_between;
use crate::processing::source::collect_segments;
use crate::processing::{
    align, calibrate, channels_in_window, coverage_windows, degap, reorient, AlignOptions,
    AlignedBlock, CalibrationTable, Channel, ChannelKind, ChannelSource, OrientOptions,
    PartialDayPolicy, ProcessingError, ScaleFactors, Station, StationInfo,
};

/// Everything the normalization stages need, passed explicitly per run.
#[derive(Clone, Debug, Default)]
pub struct ProcessingSettings {
    pub calibration: CalibrationTable,
    pub align: AlignOptions,
    pub orient: OrientOptions,
    pub target_azimuth_deg: f64,
    pub scale: ScaleFactors,
    pub partial_days: PartialDayPolicy,
}

/// Runs one station from raw segments to aligned, calibrated, re-oriented blocks.
pub struct StationPipeline<'a, S: ChannelSource> {
    info: StationInfo,
    sources: Vec<S>,
    settings: &'a ProcessingSettings,
}

impl<'a, S: ChannelSource> StationPipeline<'a, S> {
    pub fn new(info: StationInfo, sources: Vec<S>, settings: &'a ProcessingSettings) -> Self {
        Self {
            info,
            sources,
            settings,
        }
    }

    pub fn info(&self) -> &StationInfo {
        &self.info
    }

    /// Reads every source to the end and joins contiguous segments.
    pub fn load_station(&mut self) -> Result<Station, ProcessingError> {
        let mut segments = Vec::new();
        for source in &mut self.sources {
            segments.extend(collect_segments(source)?);
        }
        let read = segments.len();
        let channels = degap(segments);
        log::info!(
            "{}: read {read} raw segments, {} after degapping",
            self.info.id,
            channels.len()
        );
        Ok(Station::new(self.info.clone(), channels))
    }

    /// Calibration, alignment and re-orientation for every span in which all
    /// channels have data.
    pub fn normalize(&self, station: &Station) -> Result<Vec<AlignedBlock>, ProcessingError> {
        let settings = self.settings;
        let calibrated = station
            .channels
            .iter()
            .map(|channel| calibrate(channel, &settings.calibration))
            .collect::<Result<Vec<_>, _>>()?;

        let kinds: BTreeSet<ChannelKind> = calibrated.iter().map(Channel::kind).collect();
        let lowest_rate = calibrated
            .iter()
            .map(Channel::sample_rate_hz)
            .fold(f64::INFINITY, f64::min);
        let mut blocks = Vec::new();
        for window in coverage_windows(&calibrated) {
            if seconds_between(window.0, window.1) * lowest_rate < 1.0 {
                log::warn!(
                    "{}: skipping span {} to {}, shorter than one output sample",
                    station.id(),
                    window.0,
                    window.1
                );
                continue;
            }
            let channels = channels_in_window(&calibrated, window);
            if channels.len() < kinds.len() {
                log::warn!(
                    "{}: skipping span {} to {}, only {} of {} channels have samples in it",
                    station.id(),
                    window.0,
                    window.1,
                    channels.len(),
                    kinds.len()
                );
                continue;
            }
            let aligned = align(station.id(), &channels, &settings.align)?;
            let oriented = reorient(
                &aligned,
                settings.target_azimuth_deg,
                &settings.scale,
                &settings.orient,
            )?;
            blocks.push(oriented);
        }
        if blocks.is_empty() {
            return Err(ProcessingError::NoOverlap {
                station: station.id().to_string(),
            });
        }
        Ok(blocks)
    }

    pub fn run(&mut self) -> Result<Vec<AlignedBlock>, ProcessingError> {
        let station = self.load_station()?;
        self.normalize(&station)
    }
}
