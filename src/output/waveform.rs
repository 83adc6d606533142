use std::fs;
#[cfg(feature = "miniseed")]
use std::io;
use std::path::{Path, PathBuf};

use chrono::SecondsFormat;

use crate::output::write_atomically;
use crate::processing::{ChannelKind, ChannelMeta, DayBlock, ProcessingError};

const VALUES_PER_LINE: usize = 6;

/// SEED channel code for a kind at a sample rate, e.g. `LFN` for Hx at 1 Hz.
pub fn seed_channel_code(kind: ChannelKind, sample_rate_hz: f64) -> String {
    let band = match sample_rate_hz {
        r if r >= 80.0 => 'H',
        r if r >= 10.0 => 'B',
        r if r >= 1.0 => 'L',
        r if r >= 0.1 => 'V',
        _ => 'U',
    };
    let instrument = if kind.is_magnetic() { 'F' } else { 'Q' };
    let orientation = match kind {
        ChannelKind::Ex | ChannelKind::Hx => 'N',
        ChannelKind::Ey | ChannelKind::Hy => 'E',
        ChannelKind::Hz => 'Z',
    };
    format!("{band}{instrument}{orientation}")
}

/// Container the waveform files are written in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WaveformFormat {
    /// IRIS ASCII `SLIST`, one text file per channel.
    Slist,
    /// One miniSEED 3 record per channel-day.
    #[cfg(feature = "miniseed")]
    Miniseed,
}

impl Default for WaveformFormat {
    fn default() -> Self {
        #[cfg(feature = "miniseed")]
        {
            WaveformFormat::Miniseed
        }
        #[cfg(not(feature = "miniseed"))]
        {
            WaveformFormat::Slist
        }
    }
}

/// Writes the channels of day blocks as waveform interchange files.
pub struct WaveformWriter {
    dir: PathBuf,
    network: String,
    format: WaveformFormat,
}

/// The container carries rate and unit per channel, so they must be the
/// calibrated ones.
fn check_metadata(block: &DayBlock) -> Result<(), ProcessingError> {
    let mismatch = |field: String, expected: String, actual: String| {
        ProcessingError::HeaderMismatch {
            station: block.station_id().to_string(),
            day: block.day().to_string(),
            field,
            expected,
            actual,
        }
    };
    let rate = block.sample_rate_hz();
    if !(rate.is_finite() && rate > 0.0) {
        return Err(mismatch(
            "sample_rate".into(),
            "positive rate".into(),
            rate.to_string(),
        ));
    }
    if block.data().nrows() != block.channels().len() {
        return Err(mismatch(
            "channels".into(),
            block.channels().len().to_string(),
            block.data().nrows().to_string(),
        ));
    }
    for meta in block.channels() {
        let expected = meta.kind.physical_unit();
        if meta.unit != expected {
            return Err(mismatch(
                format!("{}.unit", meta.kind),
                expected.to_string(),
                meta.unit.to_string(),
            ));
        }
    }
    Ok(())
}

impl WaveformWriter {
    pub fn new(dir: impl AsRef<Path>, network: &str) -> Result<Self, ProcessingError> {
        fs::create_dir_all(dir.as_ref())?;
        Ok(Self {
            dir: dir.as_ref().to_path_buf(),
            network: network.to_uppercase(),
            format: WaveformFormat::default(),
        })
    }

    pub fn with_format(mut self, format: WaveformFormat) -> Self {
        self.format = format;
        self
    }

    pub fn format(&self) -> WaveformFormat {
        self.format
    }

    pub fn write(&self, block: &DayBlock) -> Result<Vec<PathBuf>, ProcessingError> {
        check_metadata(block)?;
        let stamp = block.start().format("%Y%m%dT%H%M%S");
        let mut paths = Vec::with_capacity(block.channels().len());
        for (meta, row) in block.channels().iter().zip(block.data().rows()) {
            let code = seed_channel_code(meta.kind, block.sample_rate_hz());
            let values: Vec<f64> = row.iter().copied().collect();
            let stem = format!("{}.{}.{}.{}", self.network, block.station_id(), code, stamp);
            let path = match self.format {
                WaveformFormat::Slist => {
                    let path = self.dir.join(format!("{stem}.txt"));
                    self.write_slist(&path, block, meta, &code, &values)?
                }
                #[cfg(feature = "miniseed")]
                WaveformFormat::Miniseed => {
                    let sid = super::miniseed::source_id(&self.network, block.station_id(), &code);
                    let bytes = super::miniseed::encode_record(
                        &sid,
                        block.start(),
                        block.sample_rate_hz(),
                        &values,
                    )
                    .map_err(|reason| io::Error::new(io::ErrorKind::InvalidData, reason))?;
                    write_atomically(&self.dir.join(format!("{stem}.mseed")), |w| {
                        w.write_all(&bytes)
                    })?
                }
            };
            paths.push(path);
        }
        log::debug!(
            "{}: wrote {} {:?} waveform files for {}",
            block.station_id(),
            paths.len(),
            self.format,
            block.day()
        );
        Ok(paths)
    }

    fn write_slist(
        &self,
        path: &Path,
        block: &DayBlock,
        meta: &ChannelMeta,
        code: &str,
        values: &[f64],
    ) -> Result<PathBuf, ProcessingError> {
        let id = format!("{}_{}__{}_D", self.network, block.station_id(), code);
        let rate = block.sample_rate_hz();
        let start = block.start().to_rfc3339_opts(SecondsFormat::Micros, true);
        write_atomically(path, |w| {
            writeln!(
                w,
                "TIMESERIES {id}, {} samples, {rate} sps, {start}, SLIST, FLOAT, {}",
                values.len(),
                meta.unit
            )?;
            for chunk in values.chunks(VALUES_PER_LINE) {
                let line: Vec<String> = chunk.iter().map(|v| format!("{v:e}")).collect();
                writeln!(w, "{}", line.join("  "))?;
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::{align, segment, AlignOptions, Channel, PartialDayPolicy, PhysicalUnit};
    use chrono::{TimeZone, Utc};

    fn vertical_day(unit: PhysicalUnit) -> DayBlock {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let hz = Channel::new(ChannelKind::Hz, "C", 1.0, start, 0.0, vec![0.5; 14])
            .unwrap()
            .with_unit(unit);
        let block = align("S3", &[hz], &AlignOptions::default()).unwrap();
        segment(&block, PartialDayPolicy::default()).next().unwrap()
    }

    #[test]
    fn channel_codes_follow_band_and_orientation() {
        assert_eq!(seed_channel_code(ChannelKind::Hx, 1.0), "LFN");
        assert_eq!(seed_channel_code(ChannelKind::Ey, 100.0), "HQE");
        assert_eq!(seed_channel_code(ChannelKind::Hz, 0.25), "VFZ");
        assert_eq!(seed_channel_code(ChannelKind::Ex, 20.0), "BQN");
        assert_eq!(seed_channel_code(ChannelKind::Hy, 0.01), "UFE");
    }

    #[test]
    fn writes_slist_files() {
        let day = vertical_day(PhysicalUnit::NanoTesla);
        let dir = tempfile::tempdir().unwrap();
        let writer = WaveformWriter::new(dir.path(), "mt")
            .unwrap()
            .with_format(WaveformFormat::Slist);
        let paths = writer.write(&day).unwrap();
        assert_eq!(paths.len(), 1);
        let text = fs::read_to_string(&paths[0]).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next().unwrap(),
            "TIMESERIES MT_S3__LFZ_D, 14 samples, 1 sps, 2024-03-01T00:00:00.000000Z, SLIST, FLOAT, nT"
        );
        let rest: Vec<&str> = lines.collect();
        assert_eq!(rest.len(), 3);
        assert_eq!(rest[2].split_whitespace().count(), 2);
    }

    #[test]
    fn uncalibrated_units_are_refused() {
        let day = vertical_day(PhysicalUnit::Counts);
        let dir = tempfile::tempdir().unwrap();
        let writer = WaveformWriter::new(dir.path(), "MT").unwrap();
        match writer.write(&day) {
            Err(ProcessingError::HeaderMismatch { field, actual, .. }) => {
                assert_eq!(field, "hz.unit");
                assert_eq!(actual, "counts");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[cfg(feature = "miniseed")]
    #[test]
    fn writes_miniseed_records() {
        let day = vertical_day(PhysicalUnit::NanoTesla);
        let dir = tempfile::tempdir().unwrap();
        let writer = WaveformWriter::new(dir.path(), "MT").unwrap();
        assert_eq!(writer.format(), WaveformFormat::Miniseed);
        let paths = writer.write(&day).unwrap();
        assert_eq!(
            paths[0].file_name().unwrap().to_str().unwrap(),
            "MT.S3.LFZ.20240301T000000.mseed"
        );
        let bytes = fs::read(&paths[0]).unwrap();
        assert_eq!(&bytes[..2], b"MS");
        assert_eq!(bytes[2], 3);
    }
}
