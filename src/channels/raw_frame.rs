//! Plain serial mode: the device streams text lines such as `12.5,3.0,-1\n`.

use log::debug;

use crate::utils::error::AcquisitionError;

/// Bytes kept while waiting for a line terminator before the buffer is discarded.
const MAX_PENDING_BYTES: usize = 4096;

#[derive(Debug, Default)]
pub struct RawLineParser {
    channel_count: usize,
    pending: Vec<u8>,
}

impl RawLineParser {
    pub fn new(channel_count: usize) -> Self {
        Self {
            channel_count,
            pending: Vec::new(),
        }
    }

    pub fn channel_count(&self) -> usize {
        self.channel_count
    }

    /// Appends received bytes and returns the values of the newest complete line.
    ///
    /// `Ok(None)` means no complete line has arrived yet. Each slot is `None`
    /// when the line carried fewer values than there are channels.
    pub fn push(&mut self, bytes: &[u8]) -> Result<Option<Vec<Option<f64>>>, AcquisitionError> {
        self.pending.extend_from_slice(bytes);

        let Some(last_newline) = self.pending.iter().rposition(|b| *b == b'\n') else {
            if self.pending.len() > MAX_PENDING_BYTES {
                self.pending.clear();
                return Err(AcquisitionError::FramingError(format!(
                    "No line terminator within {} bytes",
                    MAX_PENDING_BYTES
                )));
            }
            return Ok(None);
        };

        let complete: Vec<u8> = self.pending.drain(..=last_newline).collect();
        let line = complete
            .split(|b| *b == b'\n')
            .map(|l| String::from_utf8_lossy(l).trim().to_string())
            .filter(|l| !l.is_empty())
            .last();

        let Some(line) = line else {
            return Ok(None);
        };
        debug!("Raw line: {}", line);
        self.parse_line(&line).map(Some)
    }

    pub fn parse_line(&self, line: &str) -> Result<Vec<Option<f64>>, AcquisitionError> {
        // Delimited fields keep their position even when empty; whitespace
        // runs only separate values on lines without a delimiter.
        let fields: Vec<&str> = if line.contains([',', ';']) {
            line.split([',', ';']).map(str::trim).collect()
        } else {
            line.split_whitespace().collect()
        };
        let mut values: Vec<Option<f64>> = fields
            .into_iter()
            .take(self.channel_count)
            .map(|field| field.parse::<f64>().ok())
            .collect();

        if values.iter().all(Option::is_none) {
            return Err(AcquisitionError::FramingError(format!(
                "No numeric value in line '{}'",
                line
            )));
        }

        values.resize(self.channel_count, None);
        Ok(values)
    }

    pub fn reset(&mut self) {
        self.pending.clear();
    }
}
