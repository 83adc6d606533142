//! Plain-text tensor format.
//!
//! ```text
//! >HEAD
//! STATION=MT01
//! ...
//! INVALID=3,7
//! >DATA
//! <freq> <Zxx re> <Zxx im> ... <err Zyy> [<Tx re> ... <err Ty>]
//! >END
//! ```
//!
//! Header floats use the shortest exact representation, data rows use
//! `{:.16e}`, so a reload reproduces every value bit for bit.
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use rustfft::num_complex::Complex64;

use crate::output::write_atomically;
use crate::processing::{ChannelKind, ProcessingError};
use crate::transfer::{ImpedanceTensor, TfHeader, Tipper, TransferFunctionFile};

const PRECISION: usize = 16;

pub fn serialize(file: &TransferFunctionFile) -> String {
    let header = file.header();
    let mut out = String::new();
    let channels: Vec<String> = header
        .channels
        .iter()
        .map(|c| c.as_str().to_uppercase())
        .collect();
    let invalid: Vec<String> = file
        .entries()
        .iter()
        .enumerate()
        .filter(|(_, e)| !e.valid)
        .map(|(idx, _)| idx.to_string())
        .collect();

    // fmt::Write into a String cannot fail.
    let _ = writeln!(out, ">HEAD");
    let _ = writeln!(out, "STATION={}", header.station_id);
    let _ = writeln!(out, "LAT={}", header.latitude);
    let _ = writeln!(out, "LON={}", header.longitude);
    let _ = writeln!(out, "ELEV={}", header.elevation_m);
    let _ = writeln!(out, "DECL={}", header.declination_deg);
    let _ = writeln!(out, "AZIMUTH={}", header.azimuth_deg);
    let _ = writeln!(
        out,
        "PROCSTART={}",
        header.processing_start.to_rfc3339_opts(SecondsFormat::AutoSi, true)
    );
    let _ = writeln!(
        out,
        "PROCEND={}",
        header.processing_end.to_rfc3339_opts(SecondsFormat::AutoSi, true)
    );
    let _ = writeln!(out, "CHANNELS={}", channels.join(","));
    let _ = writeln!(out, "PRECISION={}", PRECISION);
    let _ = writeln!(out, "NFREQ={}", file.entries().len());
    let _ = writeln!(out, "INVALID={}", invalid.join(","));
    let _ = writeln!(out, ">DATA");
    for entry in file.entries() {
        let fields: Vec<String> = row_values(entry)
            .into_iter()
            .map(|v| format!("{:.*e}", PRECISION, v))
            .collect();
        let _ = writeln!(out, "{}", fields.join(" "));
    }
    let _ = writeln!(out, ">END");
    out
}

fn row_values(entry: &ImpedanceTensor) -> Vec<f64> {
    let mut values = vec![entry.frequency_hz];
    for z in entry.z.iter().flatten() {
        values.extend([z.re, z.im]);
    }
    values.extend(entry.z_err.iter().flatten());
    if let Some(t) = entry.tipper {
        values.extend([t.tx.re, t.tx.im, t.ty.re, t.ty.im, t.tx_err, t.ty_err]);
    }
    values
}

#[derive(PartialEq)]
enum Section {
    Start,
    Head,
    Data,
    End,
}

fn format_err(line: usize, reason: impl Into<String>) -> ProcessingError {
    ProcessingError::Format {
        line,
        reason: reason.into(),
    }
}

/// Parses and validates a tensor file.
pub fn deserialize(text: &str) -> Result<TransferFunctionFile, ProcessingError> {
    let mut section = Section::Start;
    let mut fields: BTreeMap<String, (usize, String)> = BTreeMap::new();
    let mut rows: Vec<(usize, Vec<f64>)> = Vec::new();
    let mut last_line = 0;

    for (idx, raw) in text.lines().enumerate() {
        let line_no = idx + 1;
        last_line = line_no;
        let line = raw.trim();
        match section {
            Section::Start => {
                if line != ">HEAD" {
                    return Err(format_err(line_no, "expected >HEAD"));
                }
                section = Section::Head;
            }
            Section::Head => {
                if line == ">DATA" {
                    section = Section::Data;
                    continue;
                }
                let Some((key, value)) = line.split_once('=') else {
                    return Err(format_err(line_no, format!("expected KEY=VALUE, found `{line}`")));
                };
                let key = key.trim().to_uppercase();
                if fields
                    .insert(key.clone(), (line_no, value.trim().to_string()))
                    .is_some()
                {
                    return Err(format_err(line_no, format!("duplicate header key {key}")));
                }
            }
            Section::Data => {
                if line == ">END" {
                    section = Section::End;
                    continue;
                }
                if line.is_empty() {
                    return Err(format_err(line_no, "blank row in data section"));
                }
                let values = line
                    .split_whitespace()
                    .map(|tok| {
                        tok.parse::<f64>()
                            .map_err(|_| format_err(line_no, format!("bad number `{tok}`")))
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                rows.push((line_no, values));
            }
            Section::End => {
                if !line.is_empty() {
                    return Err(format_err(line_no, "content after >END"));
                }
            }
        }
    }
    if section != Section::End {
        return Err(format_err(last_line + 1, "missing >END"));
    }

    let mut header = HeaderFields(&mut fields);
    let tf_header = TfHeader {
        station_id: header.text("STATION")?,
        latitude: header.number("LAT")?,
        longitude: header.number("LON")?,
        elevation_m: header.number("ELEV")?,
        declination_deg: header.number("DECL")?,
        azimuth_deg: header.number("AZIMUTH")?,
        processing_start: header.time("PROCSTART")?,
        processing_end: header.time("PROCEND")?,
        channels: header.channels("CHANNELS")?,
    };
    let (line, precision): (usize, usize) = header.parse("PRECISION")?;
    if precision != PRECISION {
        return Err(format_err(line, format!("unsupported precision {precision}")));
    }
    let (line, nfreq): (usize, usize) = header.parse("NFREQ")?;
    if nfreq != rows.len() {
        return Err(format_err(
            line,
            format!("NFREQ declares {nfreq} rows, data has {}", rows.len()),
        ));
    }
    let invalid = header.indices("INVALID")?;
    if let Some((key, (line, _))) = fields.iter().next() {
        return Err(format_err(*line, format!("unknown header key {key}")));
    }

    let width = tf_header.row_width();
    let mut entries = Vec::with_capacity(rows.len());
    for (idx, (line_no, values)) in rows.into_iter().enumerate() {
        if values.len() != width {
            return Err(format_err(
                line_no,
                format!("expected {width} columns, found {}", values.len()),
            ));
        }
        let c = |at: usize| Complex64::new(values[at], values[at + 1]);
        entries.push(ImpedanceTensor {
            frequency_hz: values[0],
            z: [[c(1), c(3)], [c(5), c(7)]],
            z_err: [[values[9], values[10]], [values[11], values[12]]],
            tipper: (width > 13).then(|| Tipper {
                tx: c(13),
                ty: c(15),
                tx_err: values[17],
                ty_err: values[18],
            }),
            valid: !invalid.contains(&idx),
        });
    }
    if let Some(out_of_range) = invalid.iter().find(|i| **i >= entries.len()) {
        return Err(format_err(
            0,
            format!("INVALID names row {out_of_range} beyond the data section"),
        ));
    }
    TransferFunctionFile::new(tf_header, entries)
}

/// Header values keyed by name; each lookup removes the key so leftovers can
/// be reported.
struct HeaderFields<'a>(&'a mut BTreeMap<String, (usize, String)>);

impl HeaderFields<'_> {
    fn take(&mut self, key: &str) -> Result<(usize, String), ProcessingError> {
        self.0
            .remove(key)
            .ok_or_else(|| format_err(0, format!("missing header key {key}")))
    }

    fn text(&mut self, key: &str) -> Result<String, ProcessingError> {
        Ok(self.take(key)?.1)
    }

    fn parse<T: std::str::FromStr>(&mut self, key: &str) -> Result<(usize, T), ProcessingError> {
        let (line, value) = self.take(key)?;
        value
            .parse()
            .map(|parsed| (line, parsed))
            .map_err(|_| format_err(line, format!("bad value `{value}` for {key}")))
    }

    fn number(&mut self, key: &str) -> Result<f64, ProcessingError> {
        Ok(self.parse(key)?.1)
    }

    fn time(&mut self, key: &str) -> Result<DateTime<Utc>, ProcessingError> {
        let (line, value) = self.take(key)?;
        DateTime::parse_from_rfc3339(&value)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| format_err(line, format!("bad timestamp for {key}: {e}")))
    }

    fn channels(&mut self, key: &str) -> Result<Vec<ChannelKind>, ProcessingError> {
        let (line, value) = self.take(key)?;
        value
            .split(',')
            .map(|c| c.parse::<ChannelKind>().map_err(|e| format_err(line, e)))
            .collect()
    }

    fn indices(&mut self, key: &str) -> Result<BTreeSet<usize>, ProcessingError> {
        let (line, value) = self.take(key)?;
        value
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| {
                s.parse::<usize>()
                    .map_err(|_| format_err(line, format!("bad row index `{s}`")))
            })
            .collect()
    }
}

/// Writes `file` to `path` atomically.
pub fn write_file(path: &Path, file: &TransferFunctionFile) -> Result<PathBuf, ProcessingError> {
    file.validate()?;
    let text = serialize(file);
    let written = write_atomically(path, |w| w.write_all(text.as_bytes()))?;
    log::info!(
        "{}: wrote {} frequencies to {}",
        file.header().station_id,
        file.entries().len(),
        written.display()
    );
    Ok(written)
}

pub fn read_file(path: &Path) -> Result<TransferFunctionFile, ProcessingError> {
    let text = fs::read_to_string(path)?;
    deserialize(&text)
}
