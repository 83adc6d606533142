//! miniSEED 3 encoding of one channel-day.
use chrono::{DateTime, Utc};
use mseedio::{DataEncoding, MS3RecordBuilder};

/// FDSN source identifier, e.g. `FDSN:MT_S01__L_F_N` for channel `LFN`.
pub fn source_id(network: &str, station: &str, channel_code: &str) -> String {
    let parts: Vec<String> = channel_code.chars().map(String::from).collect();
    format!("FDSN:{network}_{station}__{}", parts.join("_"))
}

/// A single record carrying `samples` as 64-bit floats.
pub(crate) fn encode_record(
    sid: &str,
    start: DateTime<Utc>,
    sample_rate_hz: f64,
    samples: &[f64],
) -> Result<Vec<u8>, String> {
    let record = MS3RecordBuilder::new()
        .start_time(start)
        .sample_rate_period(sample_rate_hz)
        .publication_version(1)
        .sid(sid)
        .data(samples.to_vec(), DataEncoding::Float64)
        .build()
        .map_err(|e| format!("cannot build miniSEED record for {sid}: {e:?}"))?;
    record
        .to_bytes()
        .map_err(|e| format!("cannot encode miniSEED record for {sid}: {e:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_id_splits_channel_code() {
        assert_eq!(source_id("MT", "S01", "LFN"), "FDSN:MT_S01__L_F_N");
    }
}
