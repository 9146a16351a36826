pub mod console;
pub mod csv_logger;
pub mod history;
pub mod sink;

pub use console::{ConsoleFormat, ConsoleSink};
pub use csv_logger::CsvLogSink;
pub use history::{HistorySink, PlotHistory, MAX_DATA_POINTS};
pub use sink::SampleSink;
