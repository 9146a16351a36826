pub mod client;
pub mod crc;
pub mod mock;
pub mod protocol;
pub mod simulator;

pub use client::{available_ports, ByteStream, PortInfo, RtuTransport, Transport};
pub use crc::crc16_modbus;
pub use mock::{MockRequest, MockTransport};
pub use protocol::ReadHoldingRequest;
pub use simulator::SimulatedTransport;
