use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// How a published channel value was obtained on this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelQuality {
    /// Read and decoded on this tick.
    Fresh,
    /// Read failed; the last good value is repeated.
    Held,
    /// Read failed and no good value exists yet. The value is NaN.
    Missing,
    /// Read succeeded but calibration produced NaN or infinity.
    NonFinite,
}

impl ChannelQuality {
    pub fn is_stale(self) -> bool {
        matches!(self, ChannelQuality::Held | ChannelQuality::Missing)
    }
}

/// One tick's calibrated channel vector. Sinks receive their own copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
    /// Monotonic time since the session started.
    pub elapsed: Duration,
    pub values: Vec<f64>,
    pub channel_names: Vec<String>,
    pub quality: Vec<ChannelQuality>,
}

impl Sample {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn value(&self, channel_name: &str) -> Option<f64> {
        self.channel_names
            .iter()
            .position(|n| n == channel_name)
            .and_then(|i| self.values.get(i).copied())
    }

    pub fn has_stale_channels(&self) -> bool {
        self.quality.iter().any(|q| q.is_stale())
    }

    /// ISO-8601 UTC with millisecond precision, the log timestamp format.
    pub fn timestamp_iso(&self) -> String {
        self.timestamp.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Acquiring,
    Error,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SchedulerState {
    Idle,
    Running,
    Stopping,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn looks_up_values_by_name() {
        let sample = Sample {
            sequence: 1,
            timestamp: Utc::now(),
            elapsed: Duration::ZERO,
            values: vec![1.0, 2.0],
            channel_names: vec!["a".into(), "b".into()],
            quality: vec![ChannelQuality::Fresh, ChannelQuality::Held],
        };
        assert_eq!(sample.value("b"), Some(2.0));
        assert_eq!(sample.value("c"), None);
        assert!(sample.has_stale_channels());
    }

    #[test]
    fn value_lookup_tolerates_short_value_vector() {
        let sample = Sample {
            sequence: 1,
            timestamp: Utc::now(),
            elapsed: Duration::ZERO,
            values: vec![1.0],
            channel_names: vec!["a".into(), "b".into()],
            quality: vec![ChannelQuality::Fresh],
        };
        assert_eq!(sample.value("a"), Some(1.0));
        assert_eq!(sample.value("b"), None);
    }

    #[test]
    fn iso_timestamp_has_milliseconds() {
        let sample = Sample {
            sequence: 0,
            timestamp: Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap() + chrono::Duration::milliseconds(42),
            elapsed: Duration::ZERO,
            values: vec![],
            channel_names: vec![],
            quality: vec![],
        };
        assert_eq!(sample.timestamp_iso(), "2024-03-09T14:05:07.042Z");
    }
}
