use log::{error, info, warn};
use std::io::Write;

use super::sink::SampleSink;
use crate::sample::{ChannelQuality, ConnectionState, Sample};
use crate::utils::error::ErrorKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleFormat {
    Table,
    Json,
}

/// Numeric display: one line per sample on a writer (stdout by default).
pub struct ConsoleSink<W: Write + Send + 'static = std::io::Stdout> {
    format: ConsoleFormat,
    out: W,
    printed_header: bool,
}

impl ConsoleSink<std::io::Stdout> {
    pub fn stdout(format: ConsoleFormat) -> Self {
        Self::new(format, std::io::stdout())
    }
}

impl<W: Write + Send + 'static> ConsoleSink<W> {
    pub fn new(format: ConsoleFormat, out: W) -> Self {
        Self {
            format,
            out,
            printed_header: false,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn render(&mut self, sample: &Sample) -> String {
        match self.format {
            ConsoleFormat::Json => serde_json::to_string(sample).unwrap_or_else(|e| {
                error!("❌ Failed to serialize sample {}: {}", sample.sequence, e);
                String::new()
            }),
            ConsoleFormat::Table => {
                let mut line = String::new();
                if !self.printed_header {
                    line.push_str(&format!("{:<24}", "Timestamp"));
                    for name in &sample.channel_names {
                        line.push_str(&format!(" {:>14}", name));
                    }
                    line.push('\n');
                    self.printed_header = true;
                }
                line.push_str(&format!("{:<24}", sample.timestamp_iso()));
                for (value, quality) in sample.values.iter().zip(&sample.quality) {
                    let marker = match quality {
                        ChannelQuality::Fresh => ' ',
                        ChannelQuality::Held => '*',
                        ChannelQuality::Missing => '?',
                        ChannelQuality::NonFinite => '!',
                    };
                    line.push_str(&format!(" {:>13.4}{}", value, marker));
                }
                line
            }
        }
    }
}

impl<W: Write + Send + 'static> SampleSink for ConsoleSink<W> {
    fn name(&self) -> &str {
        "console"
    }

    fn on_sample(&mut self, sample: Sample) {
        let line = self.render(&sample);
        if line.is_empty() {
            return;
        }
        if let Err(e) = writeln!(self.out, "{}", line) {
            error!("❌ Console write failed: {}", e);
        }
    }

    fn on_state_change(&mut self, state: ConnectionState) {
        info!("🔄 Connection state: {}", state);
    }

    fn on_error(&mut self, kind: ErrorKind, detail: &str) {
        warn!("⚠️  {}: {}", kind, detail);
    }

    fn on_close(&mut self) {
        let _ = self.out.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::time::Duration;

    fn sample() -> Sample {
        Sample {
            sequence: 7,
            timestamp: Utc::now(),
            elapsed: Duration::from_millis(700),
            values: vec![1.5, 2.0],
            channel_names: vec!["a".into(), "b".into()],
            quality: vec![ChannelQuality::Fresh, ChannelQuality::Held],
        }
    }

    #[test]
    fn table_prints_header_once_and_marks_held_values() {
        let mut sink = ConsoleSink::new(ConsoleFormat::Table, Vec::new());
        sink.on_sample(sample());
        sink.on_sample(sample());
        let text = String::from_utf8(sink.into_inner()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("Timestamp"));
        assert!(lines[1].contains("1.5000 "));
        assert!(lines[1].ends_with("2.0000*"));
    }

    #[test]
    fn json_lines_parse_back() {
        let mut sink = ConsoleSink::new(ConsoleFormat::Json, Vec::new());
        sink.on_sample(sample());
        let text = String::from_utf8(sink.into_inner()).unwrap();
        let value: serde_json::Value = serde_json::from_str(text.trim()).unwrap();
        assert_eq!(value["sequence"], 7);
        assert_eq!(value["quality"][1], "held");
    }
}
