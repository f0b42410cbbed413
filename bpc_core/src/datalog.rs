//! Timestamped data log files.
//!
//! One file per recording run, named `<label>_<YYYYmmddHHMMSS>.txt`,
//! with a header block followed by one tab-separated line per sample.
//! A closed log refuses appends instead of dropping data silently.

use crate::store::Sample;
use chrono::{DateTime, Local};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub struct DataLog {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
}

impl DataLog {
    /// Create a fresh log file under `dir` and write the header block.
    /// A name collision within the same second gets a numeric suffix
    /// rather than appending to the existing file.
    pub fn create(dir: &Path, label: &str, started_at: DateTime<Local>) -> io::Result<Self> {
        let stamp = started_at.format("%Y%m%d%H%M%S");
        let mut path = dir.join(format!("{label}_{stamp}.txt"));
        let mut n = 1u32;
        while path.exists() {
            path = dir.join(format!("{label}_{stamp}_{n}.txt"));
            n += 1;
        }
        let mut writer = BufWriter::new(File::create_new(&path)?);
        writeln!(writer, "Bioprocess Data Log")?;
        writeln!(
            writer,
            "Start time:\t{}",
            started_at.format("%Y-%m-%d %H:%M:%S")
        )?;
        writeln!(writer)?;
        writeln!(writer, "Time\tpH\tRTD\tDO")?;
        writer.flush()?;
        tracing::info!(path = %path.display(), "data log created");
        Ok(Self {
            path,
            writer: Some(writer),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one sample line, flushed so a crash loses at most the line
    /// being written.
    pub fn append(&mut self, sample: &Sample) -> io::Result<()> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| io::Error::other("data log is closed"))?;
        writeln!(
            writer,
            "{}\t{}\t{}\t{}",
            sample.at.format("%Y-%m-%d %H:%M:%S"),
            fmt_channel(sample.ph),
            fmt_channel(sample.temperature),
            fmt_channel(sample.dissolved_oxygen),
        )?;
        writer.flush()
    }

    /// Flush and drop the file handle; later appends fail.
    pub fn close(&mut self) -> io::Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
        }
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.writer.is_none()
    }
}

fn fmt_channel(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{v:.3}"),
        None => "NaN".to_string(),
    }
}
