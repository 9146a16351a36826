use std::fmt;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AcquisitionError {
    #[error("Port unavailable: {0}")]
    PortUnavailable(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Timeout occurred")]
    Timeout,

    #[error("I/O fault: {0}")]
    IoFault(String),

    #[error("CRC checksum mismatch (received 0x{received:04X}, calculated 0x{calculated:04X})")]
    CrcMismatch { received: u16, calculated: u16 },

    #[error("Framing error: {0}")]
    FramingError(String),

    #[error("Device exception response: code 0x{0:02X}")]
    ExceptionResponse(u8),

    #[error("Insufficient words: expected {expected}, got {actual}")]
    InsufficientWords { expected: usize, actual: usize },

    #[error("Configuration is locked while acquisition is running")]
    ConfigurationLocked,

    #[error("Invalid configuration: {0}")]
    ConfigurationInvalid(String),

    #[error("Not connected")]
    NotConnected,

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Fieldless mirror of [`AcquisitionError`] handed to sinks with `on_error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    PortUnavailable,
    InvalidParameter,
    Timeout,
    IoFault,
    CrcMismatch,
    FramingError,
    ExceptionResponse,
    InsufficientWords,
    ConfigurationLocked,
    ConfigurationInvalid,
    NotConnected,
    Config,
}

impl AcquisitionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AcquisitionError::PortUnavailable(_) => ErrorKind::PortUnavailable,
            AcquisitionError::InvalidParameter(_) => ErrorKind::InvalidParameter,
            AcquisitionError::Timeout => ErrorKind::Timeout,
            AcquisitionError::IoFault(_) => ErrorKind::IoFault,
            AcquisitionError::CrcMismatch { .. } => ErrorKind::CrcMismatch,
            AcquisitionError::FramingError(_) => ErrorKind::FramingError,
            AcquisitionError::ExceptionResponse(_) => ErrorKind::ExceptionResponse,
            AcquisitionError::InsufficientWords { .. } => ErrorKind::InsufficientWords,
            AcquisitionError::ConfigurationLocked => ErrorKind::ConfigurationLocked,
            AcquisitionError::ConfigurationInvalid(_) => ErrorKind::ConfigurationInvalid,
            AcquisitionError::NotConnected => ErrorKind::NotConnected,
            AcquisitionError::Config(_) => ErrorKind::Config,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl From<std::io::Error> for AcquisitionError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => AcquisitionError::Timeout,
            _ => AcquisitionError::IoFault(format!("IO error: {}", err)),
        }
    }
}

impl From<serialport::Error> for AcquisitionError {
    fn from(err: serialport::Error) -> Self {
        match err.kind() {
            serialport::ErrorKind::InvalidInput => AcquisitionError::InvalidParameter(err.to_string()),
            _ => AcquisitionError::PortUnavailable(err.to_string()),
        }
    }
}

impl From<tokio::time::error::Elapsed> for AcquisitionError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        AcquisitionError::Timeout
    }
}

impl From<tokio::task::JoinError> for AcquisitionError {
    fn from(err: tokio::task::JoinError) -> Self {
        AcquisitionError::IoFault(format!("Blocking task failed: {}", err))
    }
}

impl From<toml::de::Error> for AcquisitionError {
    fn from(err: toml::de::Error) -> Self {
        AcquisitionError::Config(format!("TOML parse error: {}", err))
    }
}

impl From<toml::ser::Error> for AcquisitionError {
    fn from(err: toml::ser::Error) -> Self {
        AcquisitionError::Config(format!("TOML write error: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_timeouts_map_to_timeout() {
        let err: AcquisitionError = std::io::Error::new(std::io::ErrorKind::TimedOut, "slow").into();
        assert_eq!(err, AcquisitionError::Timeout);

        let err: AcquisitionError = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone").into();
        assert_eq!(err.kind(), ErrorKind::IoFault);
    }

    #[test]
    fn exception_kind_drops_code() {
        assert_eq!(AcquisitionError::ExceptionResponse(0x02).kind(), ErrorKind::ExceptionResponse);
        assert!(AcquisitionError::ExceptionResponse(0x02).to_string().contains("0x02"));
    }
}
