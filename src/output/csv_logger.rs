use chrono::Local;
use log::{error, info};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use super::sink::SampleSink;
use crate::sample::Sample;
use crate::utils::error::AcquisitionError;

/// Writes one CSV row per sample: `Timestamp,<channel names...>`.
pub struct CsvLogSink<W: Write + Send + 'static = File> {
    writer: csv::Writer<W>,
    destination: String,
    rows: u64,
}

impl CsvLogSink<File> {
    /// Creates `dass_log_<YYYYmmdd_HHMMSS>.csv` in `directory` and writes the header.
    pub fn create<P: AsRef<Path>>(directory: P, channel_names: &[String]) -> Result<Self, AcquisitionError> {
        let directory = directory.as_ref();
        fs::create_dir_all(directory).map_err(|e| {
            AcquisitionError::IoFault(format!("Cannot create log directory {}: {}", directory.display(), e))
        })?;

        let path: PathBuf = directory.join(format!("dass_log_{}.csv", Local::now().format("%Y%m%d_%H%M%S")));
        let file = File::create(&path)
            .map_err(|e| AcquisitionError::IoFault(format!("Cannot create {}: {}", path.display(), e)))?;

        info!("📝 Logging samples to {}", path.display());
        Self::from_writer(file, path.display().to_string(), channel_names)
    }
}

impl<W: Write + Send + 'static> CsvLogSink<W> {
    pub fn from_writer(writer: W, destination: String, channel_names: &[String]) -> Result<Self, AcquisitionError> {
        let mut writer = csv::Writer::from_writer(writer);
        let header = std::iter::once("Timestamp").chain(channel_names.iter().map(String::as_str));
        writer
            .write_record(header)
            .and_then(|_| writer.flush().map_err(csv::Error::from))
            .map_err(|e| AcquisitionError::IoFault(format!("CSV header write failed: {}", e)))?;

        Ok(Self {
            writer,
            destination,
            rows: 0,
        })
    }

    pub fn destination(&self) -> &str {
        &self.destination
    }

    pub fn rows_written(&self) -> u64 {
        self.rows
    }

    fn write_row(&mut self, sample: &Sample) -> Result<(), csv::Error> {
        let mut record = Vec::with_capacity(sample.len() + 1);
        record.push(sample.timestamp_iso());
        record.extend(sample.values.iter().map(|v| v.to_string()));
        self.writer.write_record(&record)?;
        self.writer.flush()?;
        Ok(())
    }
}

impl<W: Write + Send + 'static> SampleSink for CsvLogSink<W> {
    fn name(&self) -> &str {
        "csv"
    }

    fn on_sample(&mut self, sample: Sample) {
        match self.write_row(&sample) {
            Ok(()) => self.rows += 1,
            Err(e) => error!("❌ Failed to write sample {} to {}: {}", sample.sequence, self.destination, e),
        }
    }

    fn on_close(&mut self) {
        if let Err(e) = self.writer.flush() {
            error!("❌ Failed to flush {}: {}", self.destination, e);
        }
        info!("💾 Closed {} after {} rows", self.destination, self.rows);
    }
}
