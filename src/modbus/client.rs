use async_trait::async_trait;
use log::{debug, error, info, warn};
use serialport::SerialPort;
use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use super::protocol::{ReadHoldingRequest, EXCEPTION_FLAG, EXCEPTION_FRAME_LEN, READ_HOLDING_REGISTERS};
use crate::config::settings::ParityConfig;
use crate::utils::error::AcquisitionError;

pub const MIN_BAUD_RATE: u32 = 300;
pub const MAX_BAUD_RATE: u32 = 921_600;
pub const MIN_TIMEOUT: Duration = Duration::from_millis(10);
pub const MAX_TIMEOUT: Duration = Duration::from_secs(60);

/// Byte channel to a field device.
///
/// Calls may block for up to `timeout` and never retry; retry policy belongs
/// to the scheduler.
#[async_trait]
pub trait Transport: Send {
    fn describe(&self) -> String;

    fn is_open(&self) -> bool;

    /// Releases the device. Safe to call repeatedly.
    fn close(&mut self);

    async fn read_raw(&mut self, max_bytes: usize, timeout: Duration) -> Result<Vec<u8>, AcquisitionError>;

    async fn read_holding_registers(
        &mut self,
        slave_id: u8,
        address: u16,
        count: u16,
        timeout: Duration,
    ) -> Result<Vec<u16>, AcquisitionError>;
}

/// Blocking stream the RTU master can drive.
pub trait ByteStream: Read + Write + Send + 'static {
    fn set_read_timeout(&mut self, timeout: Duration) -> io::Result<()>;

    /// Drops unread input so a late reply cannot be taken for the next one.
    fn discard_input(&mut self) -> io::Result<()>;
}

impl ByteStream for Box<dyn SerialPort> {
    fn set_read_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        self.set_timeout(timeout).map_err(io::Error::from)
    }

    fn discard_input(&mut self) -> io::Result<()> {
        self.clear(serialport::ClearBuffer::Input).map_err(io::Error::from)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortInfo {
    pub name: String,
    pub description: String,
}

pub fn available_ports() -> Result<Vec<PortInfo>, AcquisitionError> {
    let ports = serialport::available_ports()
        .map_err(|e| AcquisitionError::IoFault(format!("Failed to enumerate ports: {}", e)))?;

    Ok(ports
        .into_iter()
        .map(|port| {
            let description = match &port.port_type {
                serialport::SerialPortType::UsbPort(usb) => format!(
                    "USB {:04x}:{:04x} {}",
                    usb.vid,
                    usb.pid,
                    usb.manufacturer.clone().unwrap_or_default()
                ),
                serialport::SerialPortType::PciPort => "PCI".to_string(),
                serialport::SerialPortType::BluetoothPort => "Bluetooth".to_string(),
                serialport::SerialPortType::Unknown => "Unknown".to_string(),
            };
            PortInfo {
                name: port.port_name,
                description: description.trim().to_string(),
            }
        })
        .collect())
}

pub fn validate_link_parameters(baud_rate: u32, timeout: Duration) -> Result<(), AcquisitionError> {
    if !(MIN_BAUD_RATE..=MAX_BAUD_RATE).contains(&baud_rate) {
        return Err(AcquisitionError::InvalidParameter(format!(
            "Baud rate {} outside {}-{}",
            baud_rate, MIN_BAUD_RATE, MAX_BAUD_RATE
        )));
    }
    if timeout < MIN_TIMEOUT || timeout > MAX_TIMEOUT {
        return Err(AcquisitionError::InvalidParameter(format!(
            "Timeout {:?} outside {:?}-{:?}",
            timeout, MIN_TIMEOUT, MAX_TIMEOUT
        )));
    }
    Ok(())
}

/// Modbus RTU master over a serial line.
///
/// Blocking port I/O runs on the tokio blocking pool so the caller's timer
/// keeps running while a transaction is in flight.
pub struct RtuTransport<S: ByteStream = Box<dyn SerialPort>> {
    name: String,
    port: Option<Arc<Mutex<S>>>,
}

impl RtuTransport<Box<dyn SerialPort>> {
    pub fn open(
        port_name: &str,
        baud_rate: u32,
        timeout: Duration,
        parity: &ParityConfig,
    ) -> Result<Self, AcquisitionError> {
        validate_link_parameters(baud_rate, timeout)?;

        info!("🔌 Connecting to Modbus RTU port: {}", port_name);
        info!("⚙️  Configuration: {} baud, 8 data bits, {:?} parity, 1 stop bit", baud_rate, parity);

        let serial_parity = match parity {
            ParityConfig::None => serialport::Parity::None,
            ParityConfig::Even => serialport::Parity::Even,
            ParityConfig::Odd => serialport::Parity::Odd,
        };

        let port = serialport::new(port_name, baud_rate)
            .timeout(timeout)
            .data_bits(serialport::DataBits::Eight)
            .stop_bits(serialport::StopBits::One)
            .parity(serial_parity)
            .open()
            .map_err(|e| {
                error!("❌ Failed to open serial port {}: {}", port_name, e);
                AcquisitionError::PortUnavailable(format!("Failed to open port {}: {}", port_name, e))
            })?;

        info!("✅ Serial connection established on {}", port_name);
        Ok(Self::from_stream(port_name, port))
    }
}

impl<S: ByteStream> RtuTransport<S> {
    pub fn from_stream(name: impl Into<String>, stream: S) -> Self {
        Self {
            name: name.into(),
            port: Some(Arc::new(Mutex::new(stream))),
        }
    }

    fn port(&self) -> Result<Arc<Mutex<S>>, AcquisitionError> {
        self.port.clone().ok_or(AcquisitionError::NotConnected)
    }
}

#[async_trait]
impl<S: ByteStream> Transport for RtuTransport<S> {
    fn describe(&self) -> String {
        format!("RTU {}", self.name)
    }

    fn is_open(&self) -> bool {
        self.port.is_some()
    }

    fn close(&mut self) {
        if self.port.take().is_some() {
            info!("✅ Serial connection {} closed", self.name);
        }
    }

    async fn read_raw(&mut self, max_bytes: usize, timeout: Duration) -> Result<Vec<u8>, AcquisitionError> {
        let port = self.port()?;
        tokio::task::spawn_blocking(move || {
            let mut port = port
                .lock()
                .map_err(|_| AcquisitionError::IoFault("Serial port lock poisoned".to_string()))?;
            read_available(&mut *port, max_bytes, timeout)
        })
        .await?
    }

    async fn read_holding_registers(
        &mut self,
        slave_id: u8,
        address: u16,
        count: u16,
        timeout: Duration,
    ) -> Result<Vec<u16>, AcquisitionError> {
        let request = ReadHoldingRequest::new(slave_id, address, count)?;
        let port = self.port()?;

        debug!(
            "📊 Reading {} registers from slave {} starting at address {}",
            count, slave_id, address
        );

        tokio::task::spawn_blocking(move || {
            let mut port = port
                .lock()
                .map_err(|_| AcquisitionError::IoFault("Serial port lock poisoned".to_string()))?;
            exchange(&mut *port, &request, timeout)
        })
        .await?
    }
}

/// One request/response round trip on a blocking stream.
pub fn exchange<S: ByteStream + ?Sized>(
    port: &mut S,
    request: &ReadHoldingRequest,
    timeout: Duration,
) -> Result<Vec<u16>, AcquisitionError> {
    if let Err(e) = port.discard_input() {
        warn!("⚠️  Could not clear input buffer: {}", e);
    }

    let frame = request.encode();
    debug!("📤 Sending frame: {}", hex::encode(&frame));
    port.write_all(&frame)?;
    port.flush()?;

    let deadline = Instant::now() + timeout;
    let mut response = Vec::with_capacity(request.response_len());

    // Exception replies are shorter than any data reply; look at the header first.
    fill(port, &mut response, EXCEPTION_FRAME_LEN, deadline)?;
    if response[1] != READ_HOLDING_REGISTERS | EXCEPTION_FLAG {
        fill(port, &mut response, request.response_len(), deadline)?;
    }
    debug!("📥 Received frame: {}", hex::encode(&response));

    request.parse_response(&response)
}

fn fill<S: ByteStream + ?Sized>(
    port: &mut S,
    buffer: &mut Vec<u8>,
    target: usize,
    deadline: Instant,
) -> Result<(), AcquisitionError> {
    let mut chunk = [0u8; 256];
    while buffer.len() < target {
        let now = Instant::now();
        if now >= deadline {
            return Err(if buffer.is_empty() {
                AcquisitionError::Timeout
            } else {
                AcquisitionError::FramingError(format!(
                    "Truncated frame: {} of {} bytes",
                    buffer.len(),
                    target
                ))
            });
        }
        port.set_read_timeout(deadline - now)?;

        let want = (target - buffer.len()).min(chunk.len());
        match port.read(&mut chunk[..want]) {
            Ok(0) => std::thread::sleep(Duration::from_millis(1)),
            Ok(n) => buffer.extend_from_slice(&chunk[..n]),
            Err(e) if matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock) => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

fn read_available<S: ByteStream + ?Sized>(
    port: &mut S,
    max_bytes: usize,
    timeout: Duration,
) -> Result<Vec<u8>, AcquisitionError> {
    port.set_read_timeout(timeout)?;
    let mut buffer = vec![0u8; max_bytes.max(1)];
    match port.read(&mut buffer) {
        Ok(0) => Err(AcquisitionError::Timeout),
        Ok(n) => {
            buffer.truncate(n);
            Ok(buffer)
        }
        Err(e) => Err(e.into()),
    }
}
