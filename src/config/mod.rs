pub mod settings;

pub use settings::{
    AcquisitionConfig,
    AcquisitionMode,
    Config,
    LoggingConfig,
    ParityConfig,
    SerialConfig,
};
