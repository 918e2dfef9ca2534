//! Append-only sample log.
//!
//! One line per sample: `issued, completed, snd, seq, kafka, rcv`.
//! The file is only ever opened in append mode, so a restarted poller
//! extends the previous run's file and never rewrites it.

use anyhow::{Context, Result};
use efd_shared::Sample;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Column header, written only on request and only into an empty file
pub const HEADER_LINE: &str = "# now_before_query, now_after_query, private_sndStamp, \
                               private_seqNum, private_kafkaStamp, private_rcvStamp";

pub struct BatchLog {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
}

impl BatchLog {
    /// Open `path` for appending, creating it (and its parent) if needed
    pub fn open<P: AsRef<Path>>(path: P, write_header: bool) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create log directory: {:?}", parent))?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Failed to open sample log: {:?}", path))?;

        let is_empty = file
            .metadata()
            .with_context(|| format!("Failed to stat sample log: {:?}", path))?
            .len()
            == 0;

        let mut log = Self {
            path,
            writer: Some(BufWriter::new(file)),
        };

        if write_header && is_empty {
            log.write_line(HEADER_LINE)?;
            log.sync()?;
        }

        debug!("Opened sample log {:?}", log.path);
        Ok(log)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write one line per sample, then flush to disk.
    /// Returns the number of lines written.
    pub fn write_batch(&mut self, samples: &[Sample]) -> Result<usize> {
        for sample in samples {
            self.write_line(&sample.to_log_line())?;
        }
        self.sync()?;
        Ok(samples.len())
    }

    /// Flush, sync and release the file
    pub fn close(mut self) -> Result<()> {
        self.sync()?;
        self.writer = None;
        Ok(())
    }

    fn write_line(&mut self, line: &str) -> Result<()> {
        let writer = self.writer.as_mut().context("Sample log already closed")?;
        writeln!(writer, "{}", line)
            .with_context(|| format!("Failed to write sample log: {:?}", self.path))
    }

    fn sync(&mut self) -> Result<()> {
        let Some(writer) = self.writer.as_mut() else {
            return Ok(());
        };
        writer
            .flush()
            .with_context(|| format!("Failed to flush sample log: {:?}", self.path))?;
        writer
            .get_ref()
            .sync_data()
            .with_context(|| format!("Failed to sync sample log: {:?}", self.path))
    }
}

impl Drop for BatchLog {
    fn drop(&mut self) {
        if let Some(writer) = self.writer.as_mut() {
            if let Err(e) = writer.flush() {
                warn!("Failed to flush sample log {:?} on drop: {}", self.path, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use efd_shared::StreamFields;
    use tempfile::TempDir;

    fn missing(t: f64) -> Sample {
        Sample::new(t, t + 0.5, StreamFields::missing())
    }

    #[test]
    fn test_write_batch_lines() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("samples.log");

        let mut log = BatchLog::open(&path, false).unwrap();
        let written = log.write_batch(&[missing(1.0), missing(2.0)]).unwrap();
        assert_eq!(written, 2);

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            content,
            "1.0, 1.5, nan, nan, nan, nan\n2.0, 2.5, nan, nan, nan, nan\n"
        );
    }

    #[test]
    fn test_batch_is_durable_before_close() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("samples.log");

        let mut log = BatchLog::open(&path, false).unwrap();
        log.write_batch(&[missing(1.0)]).unwrap();
        // Visible to another reader while the handle is still open
        assert_eq!(std::fs::read_to_string(&path).unwrap().lines().count(), 1);
        log.close().unwrap();
    }

    #[test]
    fn test_reopen_appends() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("samples.log");

        let mut first = BatchLog::open(&path, false).unwrap();
        first.write_batch(&[missing(1.0)]).unwrap();
        first.close().unwrap();
        let before = std::fs::read_to_string(&path).unwrap();

        let mut second = BatchLog::open(&path, false).unwrap();
        second.write_batch(&[missing(2.0)]).unwrap();
        second.close().unwrap();
        let after = std::fs::read_to_string(&path).unwrap();

        assert!(after.starts_with(&before));
        assert_eq!(after.lines().count(), 2);
    }

    #[test]
    fn test_header_only_into_empty_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("samples.log");

        let mut log = BatchLog::open(&path, true).unwrap();
        log.write_batch(&[missing(1.0)]).unwrap();
        log.close().unwrap();

        // Reopening with the header flag must not add a second header
        BatchLog::open(&path, true).unwrap().close().unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], HEADER_LINE);
        assert!(lines[0].starts_with("# now_before_query, now_after_query"));
    }

    #[test]
    fn test_headerless_by_default() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("samples.log");
        BatchLog::open(&path, false).unwrap().close().unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "");
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_write_failure_is_reported() {
        let mut log = BatchLog::open("/dev/full", false).unwrap();
        let err = log.write_batch(&[missing(1.0)]).unwrap_err();
        assert!(format!("{:#}", err).contains("sample log"));
    }

    #[test]
    fn test_creates_parent_directory() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/deeper/samples.log");
        let log = BatchLog::open(&path, false).unwrap();
        assert_eq!(log.path(), path.as_path());
        assert!(path.exists());
    }
}
