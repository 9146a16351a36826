use log::info;
use tokio::sync::watch;

use super::sink_hub::SamplePublisher;
use crate::sample::{ConnectionState, SchedulerState};

/// Single owner of the connection and scheduler states.
///
/// Every connection transition is also published to the sinks.
pub struct StatusBoard {
    connection: watch::Sender<ConnectionState>,
    scheduler: watch::Sender<SchedulerState>,
    publisher: SamplePublisher,
}

impl StatusBoard {
    pub fn new(publisher: SamplePublisher) -> Self {
        let (connection, _) = watch::channel(ConnectionState::Disconnected);
        let (scheduler, _) = watch::channel(SchedulerState::Idle);
        Self {
            connection,
            scheduler,
            publisher,
        }
    }

    pub fn publisher(&self) -> &SamplePublisher {
        &self.publisher
    }

    pub fn connection(&self) -> ConnectionState {
        *self.connection.borrow()
    }

    pub fn set_connection(&self, state: ConnectionState) {
        let previous = self.connection.send_replace(state);
        if previous != state {
            info!("🔄 Connection state: {} -> {}", previous, state);
            self.publisher.state_changed(state);
        }
    }

    pub fn subscribe_connection(&self) -> watch::Receiver<ConnectionState> {
        self.connection.subscribe()
    }

    pub fn scheduler(&self) -> SchedulerState {
        *self.scheduler.borrow()
    }

    pub fn set_scheduler(&self, state: SchedulerState) {
        self.scheduler.send_replace(state);
    }
}
