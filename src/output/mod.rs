//! File adapters for day blocks.
pub mod dayfile;
#[cfg(feature = "miniseed")]
pub mod miniseed;
pub mod waveform;

use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::processing::ProcessingError;

pub use dayfile::{AsciiDayfileWriter, ChannelHeader, DayfileHeader, DayfileSink};
pub use waveform::{seed_channel_code, WaveformFormat, WaveformWriter};

/// Writes through a temporary file in the target directory and renames it
/// into place only after a successful flush. On any error the temporary file
/// is removed and `path` is left untouched.
pub(crate) fn write_atomically<F>(path: &Path, fill: F) -> Result<PathBuf, ProcessingError>
where
    F: FnOnce(&mut dyn Write) -> std::io::Result<()>,
{
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let temp = NamedTempFile::new_in(dir)?;
    let mut writer = BufWriter::new(temp);
    fill(&mut writer)?;
    let temp = writer.into_inner().map_err(|e| e.into_error())?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| e.error)?;
    Ok(path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io;

    #[test]
    fn failed_fill_leaves_nothing_behind() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("MT01_20240301.ex");
        let err = write_atomically(&target, |w| {
            w.write_all(b"partial header\n")?;
            Err(io::Error::new(io::ErrorKind::Other, "disk went away"))
        })
        .unwrap_err();
        assert!(matches!(err, ProcessingError::Io(_)));
        assert!(!target.exists());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn failed_rewrite_keeps_previous_file() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("MT01.tf");
        write_atomically(&target, |w| w.write_all(b"first")).unwrap();
        assert!(write_atomically(&target, |w| {
            w.write_all(b"sec")?;
            Err(io::Error::new(io::ErrorKind::Other, "interrupted"))
        })
        .is_err());
        assert_eq!(fs::read_to_string(&target).unwrap(), "first");
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }
}
