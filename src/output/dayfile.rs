use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, SecondsFormat, Timelike, Utc};

use crate::output::write_atomically;
use crate::processing::{ChannelKind, Completeness, DayBlock, PhysicalUnit, ProcessingError};

#[derive(Clone, Debug, PartialEq)]
pub struct ChannelHeader {
    pub kind: ChannelKind,
    pub unit: PhysicalUnit,
    pub azimuth_deg: f64,
}

/// Metadata every dayfile carries. Must equal the day block it describes.
#[derive(Clone, Debug, PartialEq)]
pub struct DayfileHeader {
    pub station_id: String,
    pub day: NaiveDate,
    pub start: DateTime<Utc>,
    pub sample_rate_hz: f64,
    pub sample_count: usize,
    pub channels: Vec<ChannelHeader>,
}

impl DayfileHeader {
    pub fn from_block(block: &DayBlock) -> Self {
        Self {
            station_id: block.station_id().to_string(),
            day: block.day(),
            start: block.start(),
            sample_rate_hz: block.sample_rate_hz(),
            sample_count: block.sample_count(),
            channels: block
                .channels()
                .iter()
                .map(|c| ChannelHeader {
                    kind: c.kind,
                    unit: c.unit,
                    azimuth_deg: c.azimuth_deg,
                })
                .collect(),
        }
    }

    /// Field-by-field equality with the block's own metadata.
    pub fn check_against(&self, block: &DayBlock) -> Result<(), ProcessingError> {
        let actual = DayfileHeader::from_block(block);
        let mismatch = |field: &str, expected: String, got: String| ProcessingError::HeaderMismatch {
            station: block.station_id().to_string(),
            day: block.day().to_string(),
            field: field.to_string(),
            expected,
            actual: got,
        };
        if self.station_id != actual.station_id {
            return Err(mismatch("station", actual.station_id, self.station_id.clone()));
        }
        if self.day != actual.day {
            return Err(mismatch("day", actual.day.to_string(), self.day.to_string()));
        }
        if self.start != actual.start {
            return Err(mismatch("start", actual.start.to_rfc3339(), self.start.to_rfc3339()));
        }
        if self.sample_rate_hz != actual.sample_rate_hz {
            return Err(mismatch(
                "sample_rate",
                actual.sample_rate_hz.to_string(),
                self.sample_rate_hz.to_string(),
            ));
        }
        if self.sample_count != actual.sample_count {
            return Err(mismatch(
                "sample_count",
                actual.sample_count.to_string(),
                self.sample_count.to_string(),
            ));
        }
        if self.channels.len() != actual.channels.len() {
            return Err(mismatch(
                "channels",
                actual.channels.len().to_string(),
                self.channels.len().to_string(),
            ));
        }
        for (declared, real) in self.channels.iter().zip(&actual.channels) {
            if declared.kind != real.kind {
                return Err(mismatch("channel", real.kind.to_string(), declared.kind.to_string()));
            }
            if declared.unit != real.unit {
                return Err(mismatch(
                    &format!("{}.unit", real.kind),
                    real.unit.to_string(),
                    declared.unit.to_string(),
                ));
            }
            if declared.azimuth_deg != real.azimuth_deg {
                return Err(mismatch(
                    &format!("{}.azimuth", real.kind),
                    real.azimuth_deg.to_string(),
                    declared.azimuth_deg.to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// Destination for day blocks.
pub trait DayfileSink {
    fn write(&mut self, header: &DayfileHeader, block: &DayBlock) -> Result<Vec<PathBuf>, ProcessingError>;
}

/// One text file per channel: `<STATION>_<YYYYMMDD>.<ch>`, with a `_HHMMSS`
/// suffix on the stem when the block does not start at midnight.
pub struct AsciiDayfileWriter {
    dir: PathBuf,
    written: usize,
}

impl AsciiDayfileWriter {
    pub fn new(dir: impl AsRef<Path>) -> Result<Self, ProcessingError> {
        fs::create_dir_all(dir.as_ref())?;
        Ok(Self {
            dir: dir.as_ref().to_path_buf(),
            written: 0,
        })
    }

    pub fn files_written(&self) -> usize {
        self.written
    }

    pub fn file_name(header: &DayfileHeader, kind: ChannelKind) -> String {
        let mut stem = format!("{}_{}", header.station_id, header.day.format("%Y%m%d"));
        let start = header.start;
        if start.num_seconds_from_midnight() != 0 || start.nanosecond() != 0 {
            stem.push_str(&start.format("_%H%M%S").to_string());
        }
        format!("{stem}.{kind}")
    }
}

impl DayfileSink for AsciiDayfileWriter {
    fn write(&mut self, header: &DayfileHeader, block: &DayBlock) -> Result<Vec<PathBuf>, ProcessingError> {
        header.check_against(block)?;
        let completeness = match block.completeness() {
            Completeness::Full => "full",
            Completeness::Partial => "partial",
        };
        let mut paths = Vec::with_capacity(header.channels.len());
        for (row, channel) in block.data().rows().into_iter().zip(&header.channels) {
            let path = self.dir.join(Self::file_name(header, channel.kind));
            let written = write_atomically(&path, |w| {
                writeln!(
                    w,
                    "# station={} channel={} unit={} azimuth={} rate={} start={} samples={} day={}",
                    header.station_id,
                    channel.kind,
                    channel.unit,
                    channel.azimuth_deg,
                    header.sample_rate_hz,
                    header.start.to_rfc3339_opts(SecondsFormat::AutoSi, true),
                    header.sample_count,
                    completeness,
                )?;
                for value in row.iter() {
                    writeln!(w, "{value:.9e}")?;
                }
                Ok(())
            })?;
            log::debug!("wrote {}", written.display());
            paths.push(written);
        }
        self.written += paths.len();
        Ok(paths)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::{align, segment, AlignOptions, Channel, PartialDayPolicy};
    use chrono::TimeZone;

    fn day_block() -> DayBlock {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let hx = Channel::new(ChannelKind::Hx, "C", 0.01, start, 0.0, vec![1.5; 720])
            .unwrap()
            .with_unit(PhysicalUnit::NanoTesla);
        let hy = Channel::new(ChannelKind::Hy, "C", 0.01, start, 90.0, vec![-2.0; 720])
            .unwrap()
            .with_unit(PhysicalUnit::NanoTesla);
        let block = align("S07", &[hx, hy], &AlignOptions::default()).unwrap();
        segment(&block, PartialDayPolicy::default()).next().unwrap()
    }

    #[test]
    fn writes_one_file_per_channel() {
        let dir = tempfile::tempdir().unwrap();
        let block = day_block();
        let header = DayfileHeader::from_block(&block);
        let mut writer = AsciiDayfileWriter::new(dir.path()).unwrap();
        let paths = writer.write(&header, &block).unwrap();
        assert_eq!(paths.len(), 2);
        assert!(paths[0].ends_with("S07_20240301_120000.hx"));
        let text = fs::read_to_string(&paths[1]).unwrap();
        let mut lines = text.lines();
        let first = lines.next().unwrap();
        assert!(first.contains("channel=hy"));
        assert!(first.contains("unit=nT"));
        assert!(first.contains("samples=432"));
        assert!(first.contains("day=partial"));
        assert_eq!(lines.count(), 432);
        assert_eq!(writer.files_written(), 2);
    }

    #[test]
    fn mismatched_header_is_rejected_before_writing() {
        let dir = tempfile::tempdir().unwrap();
        let block = day_block();
        let mut header = DayfileHeader::from_block(&block);
        header.channels[1].azimuth_deg = 91.0;
        let mut writer = AsciiDayfileWriter::new(dir.path()).unwrap();
        let err = writer.write(&header, &block).unwrap_err();
        match &err {
            ProcessingError::HeaderMismatch { field, .. } => assert_eq!(field, "hy.azimuth"),
            other => panic!("unexpected {other:?}"),
        }
        assert!(err.is_fatal());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
