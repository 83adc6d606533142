use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::output::write_atomically;
use crate::processing::{ChannelKind, DayBlock, ProcessingError};
use crate::transfer::RawEstimate;

/// Subdirectory of the working directory that receives all estimator files.
pub const OUTPUT_SUBDIR: &str = "birrp_processed";
const DEFAULT_COHERENCE: f64 = 0.5;
const POLL_INTERVAL: Duration = Duration::from_millis(50);

fn default_coherence() -> f64 {
    DEFAULT_COHERENCE
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FrequencyBand {
    pub low_hz: f64,
    pub high_hz: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EstimatorConfig {
    pub executable: PathBuf,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default = "default_coherence")]
    pub coherence_threshold: f64,
    #[serde(default)]
    pub bands: Vec<FrequencyBand>,
    /// Decimation factor of each cascade stage.
    #[serde(default)]
    pub decimation: Vec<u32>,
}

impl EstimatorConfig {
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            args: Vec::new(),
            coherence_threshold: DEFAULT_COHERENCE,
            bands: Vec::new(),
            decimation: Vec::new(),
        }
    }

    /// Coherence threshold in (0, 1]; anything else falls back to 0.5.
    pub fn coherence(&self) -> f64 {
        let c = self.coherence_threshold;
        if c > 0.0 && c <= 1.0 {
            c
        } else {
            log::warn!("coherence threshold {c} outside (0, 1], using {DEFAULT_COHERENCE}");
            DEFAULT_COHERENCE
        }
    }
}

/// What the estimator reads on stdin; also kept next to its output.
#[derive(Debug, Serialize)]
struct Payload<'a> {
    station: &'a str,
    sample_rate_hz: f64,
    channels: Vec<ChannelKind>,
    samples: usize,
    input: &'a Path,
    output_dir: &'a Path,
    coherence_threshold: f64,
    bands: &'a [FrequencyBand],
    decimation: &'a [u32],
}

/// Shared flag a caller flips to abandon a running estimation.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Kills and reaps the child unless it was waited for.
struct ChildGuard(Option<Child>);

impl ChildGuard {
    fn child(&mut self) -> io::Result<&mut Child> {
        self.0
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "estimator already reaped"))
    }

    fn finished(&mut self) -> io::Result<Option<ExitStatus>> {
        let status = self.child()?.try_wait()?;
        if status.is_some() {
            self.0 = None;
        }
        Ok(status)
    }
}

impl Drop for ChildGuard {
    fn drop(&mut self) {
        if let Some(mut child) = self.0.take() {
            log::warn!("killing estimator process {}", child.id());
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

fn drain<R: Read + Send + 'static>(mut reader: R) -> JoinHandle<io::Result<String>> {
    thread::spawn(move || {
        let mut text = String::new();
        reader.read_to_string(&mut text)?;
        Ok(text)
    })
}

/// Runs the external estimator over contiguous day blocks of one station and
/// returns its raw rows.
///
/// Inputs and outputs live under `<workdir>/birrp_processed`. The call blocks
/// until the process exits or `cancel` is set; there is no timeout and no
/// retry.
pub fn run_estimation(
    station_id: &str,
    blocks: &[DayBlock],
    config: &EstimatorConfig,
    workdir: &Path,
    cancel: &CancelToken,
) -> Result<Vec<RawEstimate>, ProcessingError> {
    let station = station_id.trim().to_uppercase();
    let fail = |reason: String| ProcessingError::EstimatorInvocation {
        station: station.clone(),
        reason,
    };
    let Some(first) = blocks.first() else {
        return Err(fail("no day blocks to estimate from".into()));
    };
    for pair in blocks.windows(2) {
        let (prev, next) = (&pair[0], &pair[1]);
        let step = (next.start() - prev.end())
            .num_nanoseconds()
            .map_or(f64::INFINITY, |ns| ns as f64 * 1.0e-9);
        if next.channels() != prev.channels()
            || next.sample_rate_hz() != prev.sample_rate_hz()
            || step.abs() * prev.sample_rate_hz() > 0.5
        {
            return Err(ProcessingError::ChannelMismatch {
                station: station.clone(),
                reason: format!("day blocks {} and {} are not contiguous", prev.day(), next.day()),
            });
        }
    }
    if !config.executable.is_file() {
        return Err(fail(format!(
            "estimator executable {} does not exist",
            config.executable.display()
        )));
    }

    let out_dir = workdir.join(OUTPUT_SUBDIR);
    fs::create_dir_all(&out_dir)?;
    let input = write_time_series(&out_dir.join(format!("{station}.ts")), blocks)?;
    let channels: Vec<ChannelKind> = first.channels().iter().map(|c| c.kind).collect();
    let payload = Payload {
        station: &station,
        sample_rate_hz: first.sample_rate_hz(),
        channels,
        samples: blocks.iter().map(DayBlock::sample_count).sum(),
        input: &input,
        output_dir: &out_dir,
        coherence_threshold: config.coherence(),
        bands: &config.bands,
        decimation: &config.decimation,
    };
    let payload = serde_json::to_string_pretty(&payload)?;
    write_atomically(&out_dir.join(format!("{station}.json")), |w| {
        w.write_all(payload.as_bytes())
    })?;

    log::info!(
        "{station}: starting {} over {} days",
        config.executable.display(),
        blocks.len()
    );
    let mut command = Command::new(&config.executable);
    command
        .args(&config.args)
        .current_dir(&out_dir)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    let child = command
        .spawn()
        .map_err(|e| fail(format!("cannot start {}: {e}", config.executable.display())))?;
    let mut guard = ChildGuard(Some(child));

    let child = guard.child()?;
    let stdout = child.stdout.take().map(drain);
    let stderr = child.stderr.take().map(drain);
    if let Some(mut stdin) = child.stdin.take() {
        match stdin.write_all(payload.as_bytes()) {
            Ok(()) => {}
            // The estimator may exit without reading its configuration.
            Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {}
            Err(e) => return Err(e.into()),
        }
    }

    let status = loop {
        if cancel.is_cancelled() {
            return Err(fail("cancelled".into()));
        }
        if let Some(status) = guard.finished()? {
            break status;
        }
        thread::sleep(POLL_INTERVAL);
    };

    let collect = |handle: Option<JoinHandle<io::Result<String>>>| -> io::Result<String> {
        match handle {
            Some(h) => h
                .join()
                .unwrap_or_else(|_| Err(io::Error::new(io::ErrorKind::Other, "reader panicked"))),
            None => Ok(String::new()),
        }
    };
    let stdout = collect(stdout)?;
    let stderr = collect(stderr)?;

    if !status.success() {
        let tail: Vec<&str> = stderr.lines().rev().take(5).collect();
        let tail: Vec<&str> = tail.into_iter().rev().collect();
        return Err(fail(format!("exited with {status}: {}", tail.join(" | "))));
    }
    write_atomically(&out_dir.join(format!("{station}.out")), |w| {
        w.write_all(stdout.as_bytes())
    })?;
    let rows = parse_estimator_output(&stdout).map_err(fail)?;
    log::info!("{station}: estimator returned {} rows", rows.len());
    Ok(rows)
}

/// Whitespace-separated numeric rows. Blank lines and `#` comments are skipped.
pub fn parse_estimator_output(text: &str) -> Result<Vec<RawEstimate>, String> {
    let mut rows = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let values = line
            .split_whitespace()
            .map(str::parse::<f64>)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| format!("unparsable output at line {}: {e}", idx + 1))?;
        rows.push(RawEstimate { values });
    }
    if rows.is_empty() {
        return Err("no estimates in output".into());
    }
    Ok(rows)
}

/// One column per channel, one row per sample, blocks back to back.
fn write_time_series(path: &Path, blocks: &[DayBlock]) -> Result<PathBuf, ProcessingError> {
    write_atomically(path, |w| {
        if let Some(first) = blocks.first() {
            let names: Vec<&str> = first.channels().iter().map(|c| c.kind.as_str()).collect();
            writeln!(w, "# {}", names.join(" "))?;
        }
        for block in blocks {
            for column in block.data().columns() {
                let line: Vec<String> = column.iter().map(|v| format!("{v:.9e}")).collect();
                writeln!(w, "{}", line.join(" "))?;
            }
        }
        Ok(())
    })
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::processing::{align, segment, AlignOptions, Channel, PartialDayPolicy};
    use chrono::{TimeZone, Utc};

    fn days() -> Vec<DayBlock> {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 22, 0, 0).unwrap();
        let channels: Vec<Channel> = [
            (ChannelKind::Ex, 0.0),
            (ChannelKind::Ey, 90.0),
            (ChannelKind::Hx, 0.0),
            (ChannelKind::Hy, 90.0),
        ]
        .into_iter()
        .map(|(kind, az)| {
            Channel::new(kind, "I", 0.01, start, az, (0..144).map(|i| i as f64).collect()).unwrap()
        })
        .collect();
        let block = align("mt3", &channels, &AlignOptions::default()).unwrap();
        segment(&block, PartialDayPolicy::default()).collect()
    }

    fn shell(script: &str) -> EstimatorConfig {
        let mut config = EstimatorConfig::new("/bin/sh");
        config.args = vec!["-c".into(), script.into()];
        config
    }

    #[test]
    fn returns_rows_and_writes_inputs() {
        let dir = tempfile::tempdir().unwrap();
        let config = shell("cat > stdin.json; echo '# f z'; echo '0.5 1 2'; echo '0.25 3 4'");
        let blocks = days();
        assert_eq!(blocks.len(), 2);
        let rows = run_estimation("mt3", &blocks, &config, dir.path(), &CancelToken::new()).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].values, vec![0.25, 3.0, 4.0]);

        let out = dir.path().join(OUTPUT_SUBDIR);
        let piped = fs::read_to_string(out.join("stdin.json")).unwrap();
        assert!(piped.contains("\"station\": \"MT3\""));
        assert!(piped.contains("\"coherence_threshold\": 0.5"));
        let series = fs::read_to_string(out.join("MT3.ts")).unwrap();
        assert_eq!(series.lines().next(), Some("# ex ey hx hy"));
        assert_eq!(series.lines().count(), 145);
        assert!(out.join("MT3.out").is_file());
    }

    #[test]
    fn non_zero_exit_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let config = shell("echo 'matrix singular' >&2; exit 3");
        let err = run_estimation("mt3", &days(), &config, dir.path(), &CancelToken::new()).unwrap_err();
        match err {
            ProcessingError::EstimatorInvocation { station, reason } => {
                assert_eq!(station, "MT3");
                assert!(reason.contains("matrix singular"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn garbage_output_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let config = shell("echo 'converged after 3 iterations'");
        assert!(matches!(
            run_estimation("mt3", &days(), &config, dir.path(), &CancelToken::new()),
            Err(ProcessingError::EstimatorInvocation { .. })
        ));
    }

    #[test]
    fn cancellation_kills_the_process() {
        let dir = tempfile::tempdir().unwrap();
        let config = shell("sleep 30");
        let token = CancelToken::new();
        token.cancel();
        let started = std::time::Instant::now();
        let err = run_estimation("mt3", &days(), &config, dir.path(), &token).unwrap_err();
        assert!(err.to_string().contains("cancelled"));
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn missing_executable_fails_before_spawning() {
        let dir = tempfile::tempdir().unwrap();
        let config = EstimatorConfig::new(dir.path().join("birrp"));
        assert!(matches!(
            run_estimation("mt3", &days(), &config, dir.path(), &CancelToken::new()),
            Err(ProcessingError::EstimatorInvocation { .. })
        ));
    }

    #[test]
    fn coherence_outside_range_falls_back() {
        let mut config = EstimatorConfig::new("/bin/true");
        config.coherence_threshold = 1.5;
        assert_eq!(config.coherence(), 0.5);
        config.coherence_threshold = 0.8;
        assert_eq!(config.coherence(), 0.8);
    }
}
