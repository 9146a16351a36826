use async_trait::async_trait;
use log::debug;
use std::collections::HashMap;
use std::f64::consts::TAU;
use std::time::{Duration, Instant};

use super::client::Transport;
use crate::registers::decoder::encode_value;
use crate::registers::{DataType, RegisterMap, WordOrder};
use crate::utils::error::AcquisitionError;

const BUS_LATENCY: Duration = Duration::from_millis(2);

/// Synthetic field device: every configured address reports a slow sine
/// wave with its own period and offset.
pub struct SimulatedTransport {
    layout: HashMap<(u8, u16), DataType>,
    word_order: WordOrder,
    raw_channels: usize,
    started: Instant,
    open: bool,
}

impl SimulatedTransport {
    pub fn new(map: &RegisterMap, word_order: WordOrder, raw_channels: usize) -> Self {
        let layout = map
            .entries()
            .iter()
            .map(|e| ((e.slave_id, e.address), e.data_type))
            .collect();
        Self {
            layout,
            word_order,
            raw_channels,
            started: Instant::now(),
            open: true,
        }
    }

    fn signal(&self, seed: u32) -> f64 {
        let t = self.started.elapsed().as_secs_f64();
        let period = 2.0 + (seed % 7) as f64;
        let offset = 10.0 * (seed % 5) as f64;
        offset + 50.0 * (TAU * t / period).sin()
    }
}

#[async_trait]
impl Transport for SimulatedTransport {
    fn describe(&self) -> String {
        "simulated device".to_string()
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn close(&mut self) {
        self.open = false;
    }

    async fn read_raw(&mut self, max_bytes: usize, _timeout: Duration) -> Result<Vec<u8>, AcquisitionError> {
        if !self.open {
            return Err(AcquisitionError::NotConnected);
        }
        tokio::time::sleep(BUS_LATENCY).await;
        let line = (0..self.raw_channels)
            .map(|i| format!("{:.3}", self.signal(i as u32)))
            .collect::<Vec<_>>()
            .join(",");
        let mut bytes = format!("{}\n", line).into_bytes();
        bytes.truncate(max_bytes);
        Ok(bytes)
    }

    async fn read_holding_registers(
        &mut self,
        slave_id: u8,
        address: u16,
        count: u16,
        _timeout: Duration,
    ) -> Result<Vec<u16>, AcquisitionError> {
        if !self.open {
            return Err(AcquisitionError::NotConnected);
        }
        tokio::time::sleep(BUS_LATENCY).await;

        let data_type = self
            .layout
            .get(&(slave_id, address))
            .copied()
            // Unmapped addresses answer like a real device would: illegal data address.
            .ok_or(AcquisitionError::ExceptionResponse(0x02))?;

        let value = self.signal(slave_id as u32 * 31 + address as u32);
        let mut words = encode_value(value, data_type, self.word_order);
        words.resize(count as usize, 0);
        debug!("🧪 Simulated slave {} @ {} -> {:.3}", slave_id, address, value);
        Ok(words)
    }
}
