//! Modbus RTU framing for function 0x03 (read holding registers).
//!
//! Request:  `[slave][0x03][addr hi][addr lo][count hi][count lo][crc lo][crc hi]`
//! Response: `[slave][0x03][byte count][registers...][crc lo][crc hi]`
//! Exception: `[slave][0x83][code][crc lo][crc hi]`

use bytes::{BufMut, BytesMut};

use super::crc::crc16_modbus;
use crate::utils::error::AcquisitionError;

pub const READ_HOLDING_REGISTERS: u8 = 0x03;
pub const EXCEPTION_FLAG: u8 = 0x80;

/// Protocol limit for a single read holding registers request.
pub const MAX_REGISTERS_PER_READ: u16 = 125;

/// Length of an exception response, also the shortest frame we accept.
pub const EXCEPTION_FRAME_LEN: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadHoldingRequest {
    pub slave_id: u8,
    pub address: u16,
    pub count: u16,
}

impl ReadHoldingRequest {
    pub fn new(slave_id: u8, address: u16, count: u16) -> Result<Self, AcquisitionError> {
        if slave_id == 0 || slave_id > 247 {
            return Err(AcquisitionError::InvalidParameter(format!(
                "Invalid slave id: {}. Must be 1-247",
                slave_id
            )));
        }
        if count == 0 || count > MAX_REGISTERS_PER_READ {
            return Err(AcquisitionError::InvalidParameter(format!(
                "Invalid register count: {}. Must be 1-{}",
                count, MAX_REGISTERS_PER_READ
            )));
        }
        Ok(Self { slave_id, address, count })
    }

    pub fn encode(&self) -> BytesMut {
        let mut frame = BytesMut::with_capacity(8);
        frame.put_u8(self.slave_id);
        frame.put_u8(READ_HOLDING_REGISTERS);
        frame.put_u16(self.address);
        frame.put_u16(self.count);
        let crc = crc16_modbus(&frame);
        frame.put_u16_le(crc);
        frame
    }

    /// Length of a normal (non-exception) response to this request.
    pub fn response_len(&self) -> usize {
        5 + self.count as usize * 2
    }

    /// Validates CRC first, then slave and function echo, then byte count.
    pub fn parse_response(&self, frame: &[u8]) -> Result<Vec<u16>, AcquisitionError> {
        if frame.len() < EXCEPTION_FRAME_LEN {
            return Err(AcquisitionError::FramingError(format!(
                "Frame too short: {} bytes",
                frame.len()
            )));
        }

        let data_len = frame.len() - 2;
        let received = u16::from_le_bytes([frame[data_len], frame[data_len + 1]]);
        let calculated = crc16_modbus(&frame[..data_len]);
        if received != calculated {
            return Err(AcquisitionError::CrcMismatch { received, calculated });
        }

        if frame[0] != self.slave_id {
            return Err(AcquisitionError::FramingError(format!(
                "Slave echo mismatch: expected {}, got {}",
                self.slave_id, frame[0]
            )));
        }

        if frame[1] == READ_HOLDING_REGISTERS | EXCEPTION_FLAG {
            return Err(AcquisitionError::ExceptionResponse(frame[2]));
        }

        if frame[1] != READ_HOLDING_REGISTERS {
            return Err(AcquisitionError::FramingError(format!(
                "Unexpected function code 0x{:02X}",
                frame[1]
            )));
        }

        let byte_count = frame[2] as usize;
        if byte_count != self.count as usize * 2 || frame.len() != self.response_len() {
            return Err(AcquisitionError::FramingError(format!(
                "Byte count {} does not match {} requested registers ({} byte frame)",
                byte_count,
                self.count,
                frame.len()
            )));
        }

        Ok(frame[3..data_len]
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect())
    }
}

/// Builds a well-formed response frame. Used by the mock device and tests.
pub fn encode_response(slave_id: u8, words: &[u16]) -> BytesMut {
    let mut frame = BytesMut::with_capacity(5 + words.len() * 2);
    frame.put_u8(slave_id);
    frame.put_u8(READ_HOLDING_REGISTERS);
    frame.put_u8((words.len() * 2) as u8);
    for word in words {
        frame.put_u16(*word);
    }
    let crc = crc16_modbus(&frame);
    frame.put_u16_le(crc);
    frame
}

pub fn encode_exception(slave_id: u8, code: u8) -> BytesMut {
    let mut frame = BytesMut::with_capacity(EXCEPTION_FRAME_LEN);
    frame.put_u8(slave_id);
    frame.put_u8(READ_HOLDING_REGISTERS | EXCEPTION_FLAG);
    frame.put_u8(code);
    let crc = crc16_modbus(&frame);
    frame.put_u16_le(crc);
    frame
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_frame_layout() {
        let request = ReadHoldingRequest::new(1, 0, 1).unwrap();
        assert_eq!(&request.encode()[..], &[0x01, 0x03, 0x00, 0x00, 0x00, 0x01, 0x84, 0x0A]);
    }

    #[test]
    fn request_rejects_bad_parameters() {
        assert!(matches!(
            ReadHoldingRequest::new(0, 0, 1),
            Err(AcquisitionError::InvalidParameter(_))
        ));
        assert!(matches!(
            ReadHoldingRequest::new(1, 0, 0),
            Err(AcquisitionError::InvalidParameter(_))
        ));
        assert!(matches!(
            ReadHoldingRequest::new(1, 0, 126),
            Err(AcquisitionError::InvalidParameter(_))
        ));
    }

    #[test]
    fn parses_register_words() {
        let request = ReadHoldingRequest::new(1, 100, 2).unwrap();
        let frame = encode_response(1, &[0x4049, 0x0FDB]);
        assert_eq!(frame.len(), request.response_len());
        assert_eq!(request.parse_response(&frame).unwrap(), vec![0x4049, 0x0FDB]);
    }

    #[test]
    fn any_single_bit_flip_is_a_crc_mismatch() {
        let request = ReadHoldingRequest::new(3, 100, 2).unwrap();
        let frame = encode_response(3, &[0x4049, 0x0FDB]);

        for byte in 0..frame.len() {
            for bit in 0..8 {
                let mut corrupted = frame.to_vec();
                corrupted[byte] ^= 1 << bit;
                match request.parse_response(&corrupted) {
                    Err(AcquisitionError::CrcMismatch { .. }) => {}
                    other => panic!("byte {} bit {} gave {:?}", byte, bit, other),
                }
            }
        }
    }

    #[test]
    fn exception_response_reports_code() {
        let request = ReadHoldingRequest::new(2, 10, 1).unwrap();
        let frame = encode_exception(2, 0x02);
        assert_eq!(
            request.parse_response(&frame),
            Err(AcquisitionError::ExceptionResponse(0x02))
        );
    }

    #[test]
    fn wrong_slave_echo_is_framing_error() {
        let request = ReadHoldingRequest::new(2, 10, 1).unwrap();
        let frame = encode_response(4, &[0x0001]);
        assert!(matches!(
            request.parse_response(&frame),
            Err(AcquisitionError::FramingError(_))
        ));
    }

    #[test]
    fn short_payload_is_framing_error() {
        let request = ReadHoldingRequest::new(1, 10, 2).unwrap();
        let frame = encode_response(1, &[0x0001]);
        assert!(matches!(
            request.parse_response(&frame),
            Err(AcquisitionError::FramingError(_))
        ));
    }
}
