//! Multi-channel data acquisition over Modbus RTU or plain serial lines.
//!
//! A fixed-rate scheduler reads a validated register map, decodes and
//! calibrates each channel, and fans every sample out to independent sinks
//! (console, CSV log, plot history).

pub mod channels;
pub mod cli;
pub mod config;
pub mod modbus;
pub mod output;
pub mod registers;
pub mod sample;
pub mod services;
pub mod utils;

// Re-export commonly used types
pub use channels::{condition, ChannelConfig};
pub use config::Config;
pub use modbus::{MockTransport, RtuTransport, SimulatedTransport, Transport};
pub use output::{ConsoleSink, CsvLogSink, HistorySink, PlotHistory, SampleSink};
pub use registers::{DataType, RegisterDecoder, RegisterEntry, RegisterMap, WordOrder};
pub use sample::{ChannelQuality, ConnectionState, Sample, SchedulerState};
pub use services::{AcquisitionService, StatsSnapshot, StopReason};
pub use utils::error::{AcquisitionError, ErrorKind};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
