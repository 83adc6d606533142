//! Whole-survey driver: one independent pipeline per station.
use std::fs::File;
use std::io::BufReader;
use std::panic;
use std::path::{Path, PathBuf};
use std::thread;

use crate::config::{StationConfig, SurveyConfig};
use crate::output::{AsciiDayfileWriter, DayfileHeader, DayfileSink, WaveformWriter};
use crate::processing::{
    day_blocks, segment, AlignedBlock, AsciiChannelSource, DayBlock, ProcessingError,
    ProcessingSettings, StationPipeline,
};
use crate::transfer::{
    run_estimation, CancelToken, RawEstimate, TfHeader, TransferFunctionFile,
};

#[derive(Clone, Debug, Default, PartialEq)]
pub struct StationSummary {
    pub aligned_blocks: usize,
    pub days: usize,
    pub full_days: usize,
    pub files: Vec<PathBuf>,
}

#[derive(Debug)]
pub struct StationOutcome {
    pub station: String,
    pub result: Result<StationSummary, ProcessingError>,
}

/// Reads, calibrates, aligns and re-orients one station.
pub fn normalize_station(
    station: &StationConfig,
    settings: &ProcessingSettings,
) -> Result<Vec<AlignedBlock>, ProcessingError> {
    let sources: Vec<AsciiChannelSource<BufReader<File>>> = station
        .files
        .iter()
        .map(AsciiChannelSource::open)
        .collect::<Result<_, _>>()?;
    StationPipeline::new(station.info.clone(), sources, settings).run()
}

/// Runs one station to dayfiles under `<out_dir>/<STATION>/`.
pub fn write_station_dayfiles(
    station: &StationConfig,
    settings: &ProcessingSettings,
    out_dir: &Path,
    waveform: Option<&WaveformWriter>,
) -> Result<StationSummary, ProcessingError> {
    let blocks = normalize_station(station, settings)?;
    let mut writer = AsciiDayfileWriter::new(out_dir.join(&station.info.id))?;
    let mut summary = StationSummary {
        aligned_blocks: blocks.len(),
        ..StationSummary::default()
    };
    for day in day_blocks(&blocks, settings.partial_days) {
        let header = DayfileHeader::from_block(&day);
        summary.files.extend(writer.write(&header, &day)?);
        if let Some(waveform) = waveform {
            summary.files.extend(waveform.write(&day)?);
        }
        summary.days += 1;
        if day.is_full() {
            summary.full_days += 1;
        }
    }
    log::info!(
        "{}: {} days ({} full) from {} aligned blocks",
        station.info.id,
        summary.days,
        summary.full_days,
        summary.aligned_blocks
    );
    Ok(summary)
}

/// Processes every station on its own scoped thread.
///
/// A failing station is reported in its outcome and never stops the others.
/// Only setting up the shared output directories can fail the whole call.
pub fn process_survey(
    config: &SurveyConfig,
    out_dir: &Path,
    waveform: bool,
) -> Result<Vec<StationOutcome>, ProcessingError> {
    let settings = config.to_settings();
    let waveform_writer = if waveform {
        Some(WaveformWriter::new(out_dir.join("waveform"), &config.network)?)
    } else {
        None
    };
    let settings = &settings;
    let waveform_writer = waveform_writer.as_ref();

    let outcomes = thread::scope(|scope| {
        let handles: Vec<_> = config
            .stations
            .iter()
            .map(|station| {
                scope.spawn(move || {
                    write_station_dayfiles(station, settings, out_dir, waveform_writer)
                })
            })
            .collect();
        handles
            .into_iter()
            .zip(&config.stations)
            .map(|(handle, station)| StationOutcome {
                station: station.info.id.clone(),
                result: handle.join().unwrap_or_else(|e| panic::resume_unwind(e)),
            })
            .collect::<Vec<_>>()
    });

    for outcome in &outcomes {
        match &outcome.result {
            Ok(_) => {}
            Err(e) if e.is_fatal() => log::error!("{}: {e}", outcome.station),
            Err(e) => log::warn!("{}: skipped: {e}", outcome.station),
        }
    }
    Ok(outcomes)
}

/// Runs the pipeline for one station in memory, drives the estimator over the
/// longest aligned block and builds the transfer-function file.
pub fn estimate_station(
    config: &SurveyConfig,
    station_id: &str,
    workdir: &Path,
    cancel: &CancelToken,
) -> Result<(TransferFunctionFile, Vec<ProcessingError>), ProcessingError> {
    let station = config
        .station(station_id)
        .ok_or_else(|| ProcessingError::Config(format!("unknown station {station_id}")))?;
    let estimator = config
        .estimator
        .as_ref()
        .ok_or_else(|| ProcessingError::Config("no estimator configured".into()))?;
    let settings = config.to_settings();
    let blocks = normalize_station(station, &settings)?;
    let block = blocks
        .iter()
        .max_by_key(|b| b.sample_count())
        .ok_or_else(|| ProcessingError::NoOverlap {
            station: station.info.id.clone(),
        })?;
    let days: Vec<DayBlock> = segment(block, settings.partial_days).collect();
    let rows: Vec<RawEstimate> = run_estimation(&station.info.id, &days, estimator, workdir, cancel)?;

    let (start, end) = match (days.first(), days.last()) {
        (Some(first), Some(last)) => (first.start(), last.end()),
        _ => (block.start(), block.end()),
    };
    let header = TfHeader::for_station(
        &station.info,
        settings.target_azimuth_deg,
        start,
        end,
        block.channels().iter().map(|c| c.kind).collect(),
    );
    TransferFunctionFile::from_estimator_output(header, &rows)
}
