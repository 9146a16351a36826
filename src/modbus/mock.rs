use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use super::client::Transport;
use crate::utils::error::AcquisitionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MockRequest {
    pub slave_id: u8,
    pub address: u16,
    pub count: u16,
}

#[derive(Default)]
struct MockState {
    open: bool,
    scripted: HashMap<(u8, u16), VecDeque<Result<Vec<u16>, AcquisitionError>>>,
    fixed: HashMap<(u8, u16), Vec<u16>>,
    raw: VecDeque<Result<Vec<u8>, AcquisitionError>>,
    requests: Vec<MockRequest>,
    latency: Duration,
}

/// Scripted transport. Clones share state, so a test can keep one handle
/// while the scheduler owns another.
///
/// Scripted replies for an address are consumed first; afterwards the fixed
/// reply is repeated. Addresses with neither time out.
#[derive(Clone)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    pub fn new() -> Self {
        let state = MockState {
            open: true,
            ..MockState::default()
        };
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn with_latency(self, latency: Duration) -> Self {
        self.lock().latency = latency;
        self
    }

    pub fn set_registers(&self, slave_id: u8, address: u16, words: Vec<u16>) {
        self.lock().fixed.insert((slave_id, address), words);
    }

    pub fn push_response(&self, slave_id: u8, address: u16, response: Result<Vec<u16>, AcquisitionError>) {
        self.lock()
            .scripted
            .entry((slave_id, address))
            .or_default()
            .push_back(response);
    }

    pub fn push_raw(&self, response: Result<Vec<u8>, AcquisitionError>) {
        self.lock().raw.push_back(response);
    }

    pub fn requests(&self) -> Vec<MockRequest> {
        self.lock().requests.clone()
    }

    pub fn clear_requests(&self) {
        self.lock().requests.clear();
    }
}

#[async_trait]
impl Transport for MockTransport {
    fn describe(&self) -> String {
        "mock".to_string()
    }

    fn is_open(&self) -> bool {
        self.lock().open
    }

    fn close(&mut self) {
        self.lock().open = false;
    }

    async fn read_raw(&mut self, max_bytes: usize, timeout: Duration) -> Result<Vec<u8>, AcquisitionError> {
        let (latency, reply) = {
            let mut state = self.lock();
            if !state.open {
                return Err(AcquisitionError::NotConnected);
            }
            (state.latency, state.raw.pop_front())
        };
        tokio::time::sleep(latency).await;
        match reply {
            Some(Ok(mut bytes)) => {
                bytes.truncate(max_bytes);
                Ok(bytes)
            }
            Some(Err(e)) => Err(e),
            None => {
                tokio::time::sleep(timeout).await;
                Err(AcquisitionError::Timeout)
            }
        }
    }

    async fn read_holding_registers(
        &mut self,
        slave_id: u8,
        address: u16,
        count: u16,
        _timeout: Duration,
    ) -> Result<Vec<u16>, AcquisitionError> {
        let (latency, reply) = {
            let mut state = self.lock();
            if !state.open {
                return Err(AcquisitionError::NotConnected);
            }
            state.requests.push(MockRequest { slave_id, address, count });
            let key = (slave_id, address);
            let reply = match state.scripted.get_mut(&key).and_then(VecDeque::pop_front) {
                Some(reply) => reply,
                None => state.fixed.get(&key).cloned().ok_or(AcquisitionError::Timeout),
            };
            (state.latency, reply)
        };
        tokio::time::sleep(latency).await;
        reply
    }
}
