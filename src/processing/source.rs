use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::Path;

use chrono::{DateTime, Utc};

use crate::processing::{Channel, ChannelKind, ProcessingError};

/// Yields raw channel segments one at a time; `Ok(None)` once exhausted.
pub trait ChannelSource {
    fn next_segment(&mut self) -> Result<Option<Channel>, ProcessingError>;
}

/// Hands out pre-built segments in order.
pub struct ManualSource {
    queue: VecDeque<Channel>,
}

impl ManualSource {
    pub fn new(segments: impl IntoIterator<Item = Channel>) -> Self {
        Self {
            queue: segments.into_iter().collect(),
        }
    }
}

impl ChannelSource for ManualSource {
    fn next_segment(&mut self) -> Result<Option<Channel>, ProcessingError> {
        Ok(self.queue.pop_front())
    }
}

#[derive(Clone, Debug)]
struct SegmentHeader {
    kind: ChannelKind,
    instrument_id: String,
    sample_rate_hz: f64,
    azimuth_deg: f64,
    dipole_length_m: Option<f64>,
}

/// Reads raw logger text files.
///
/// Layout: a header line `# <kind> <instrument> <rate_hz> <start> <azimuth_deg> [<dipole_m>]`,
/// then one count per line. A line `# gap <start>` closes the current segment
/// and starts the next one at the given time with the same header.
pub struct AsciiChannelSource<R: BufRead> {
    lines: Lines<R>,
    line_no: usize,
    header: Option<SegmentHeader>,
    next_start: Option<DateTime<Utc>>,
    finished: bool,
}

impl AsciiChannelSource<BufReader<File>> {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ProcessingError> {
        let file = File::open(path.as_ref())?;
        log::debug!("reading raw channel file {}", path.as_ref().display());
        Ok(Self::from_reader(BufReader::new(file)))
    }
}

impl<R: BufRead> AsciiChannelSource<R> {
    pub fn from_reader(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            line_no: 0,
            header: None,
            next_start: None,
            finished: false,
        }
    }

    fn parse_error(&self, reason: impl Into<String>) -> ProcessingError {
        ProcessingError::Format {
            line: self.line_no,
            reason: reason.into(),
        }
    }

    fn parse_header(&mut self, fields: &[&str]) -> Result<(), ProcessingError> {
        if fields.len() < 5 {
            return Err(self.parse_error("header needs kind, instrument, rate, start and azimuth"));
        }
        let kind = fields[0]
            .parse::<ChannelKind>()
            .map_err(|e| self.parse_error(e))?;
        let sample_rate_hz = parse_f64(fields[2]).ok_or_else(|| self.parse_error("bad sample rate"))?;
        let start = parse_time(fields[3]).ok_or_else(|| self.parse_error("bad start time"))?;
        let azimuth_deg = parse_f64(fields[4]).ok_or_else(|| self.parse_error("bad azimuth"))?;
        let dipole_length_m = match fields.get(5) {
            Some(raw) => Some(parse_f64(raw).ok_or_else(|| self.parse_error("bad dipole length"))?),
            None => None,
        };
        self.header = Some(SegmentHeader {
            kind,
            instrument_id: fields[1].to_string(),
            sample_rate_hz,
            azimuth_deg,
            dipole_length_m,
        });
        self.next_start = Some(start);
        Ok(())
    }

    fn build(&self, start: DateTime<Utc>, samples: Vec<f64>) -> Result<Channel, ProcessingError> {
        let header = self
            .header
            .as_ref()
            .ok_or_else(|| self.parse_error("samples before header"))?;
        let channel = Channel::new(
            header.kind,
            header.instrument_id.clone(),
            header.sample_rate_hz,
            start,
            header.azimuth_deg,
            samples,
        )?;
        Ok(match header.dipole_length_m {
            Some(len) => channel.with_dipole_length(len),
            None => channel,
        })
    }
}

impl<R: BufRead> ChannelSource for AsciiChannelSource<R> {
    fn next_segment(&mut self) -> Result<Option<Channel>, ProcessingError> {
        if self.finished {
            return Ok(None);
        }
        let mut samples = Vec::new();
        let mut segment_start = self.next_start;
        loop {
            let Some(line) = self.lines.next() else {
                self.finished = true;
                break;
            };
            let line = line?;
            self.line_no += 1;
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            if let Some(comment) = trimmed.strip_prefix('#') {
                let fields: Vec<&str> = comment.split_whitespace().collect();
                if fields.first() == Some(&"gap") {
                    let start = fields
                        .get(1)
                        .and_then(|raw| parse_time(raw))
                        .ok_or_else(|| self.parse_error("gap marker needs a start time"))?;
                    self.next_start = Some(start);
                    if samples.is_empty() {
                        segment_start = Some(start);
                        continue;
                    }
                    break;
                }
                if self.header.is_none() {
                    self.parse_header(&fields)?;
                    segment_start = self.next_start;
                }
                continue;
            }
            let value = parse_f64(trimmed).ok_or_else(|| self.parse_error("bad sample value"))?;
            samples.push(value);
        }
        if samples.is_empty() {
            return Ok(None);
        }
        let start = segment_start.ok_or_else(|| self.parse_error("missing header"))?;
        self.build(start, samples).map(Some)
    }
}

fn parse_f64(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok()
}

fn parse_time(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw.trim())
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

/// Drains a source completely.
pub fn collect_segments<S: ChannelSource>(source: &mut S) -> Result<Vec<Channel>, ProcessingError> {
    let mut segments = Vec::new();
    while let Some(segment) = source.next_segment()? {
        segments.push(segment);
    }
    Ok(segments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use std::io::Cursor;

    #[test]
    fn reads_header_samples_and_gaps() {
        let text = "# ex E1 2.0 2024-03-01T00:00:00Z 5.0 100.0\n1\n2\n3\n# gap 2024-03-01T00:01:00Z\n4\n5\n";
        let mut source = AsciiChannelSource::from_reader(Cursor::new(text));
        let segments = collect_segments(&mut source).unwrap();
        assert_eq!(segments.len(), 2);
        let t0 = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        assert_eq!(segments[0].kind(), ChannelKind::Ex);
        assert_eq!(segments[0].samples(), &[1.0, 2.0, 3.0]);
        assert_eq!(segments[0].dipole_length_m(), Some(100.0));
        assert_eq!(segments[1].start(), t0 + Duration::minutes(1));
        assert_eq!(segments[1].samples(), &[4.0, 5.0]);
        assert_eq!(segments[1].azimuth_deg(), 5.0);
    }

    #[test]
    fn reports_line_of_bad_sample() {
        let text = "# hx C1 1.0 2024-03-01T00:00:00Z 0.0\n1\nabc\n";
        let mut source = AsciiChannelSource::from_reader(Cursor::new(text));
        match source.next_segment() {
            Err(ProcessingError::Format { line, .. }) => assert_eq!(line, 3),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn manual_source_replays_in_order() {
        let t0 = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let a = Channel::new(ChannelKind::Hx, "C1", 1.0, t0, 0.0, vec![1.0]).unwrap();
        let b = Channel::new(ChannelKind::Hy, "C2", 1.0, t0, 90.0, vec![2.0]).unwrap();
        let mut source = ManualSource::new(vec![a.clone(), b.clone()]);
        assert_eq!(source.next_segment().unwrap(), Some(a));
        assert_eq!(source.next_segment().unwrap(), Some(b));
        assert_eq!(source.next_segment().unwrap(), None);
    }
}
