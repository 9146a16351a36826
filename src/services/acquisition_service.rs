use log::{error, info, warn};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::scheduler::{
    raw_channel_names, AcquisitionPlan, AcquisitionScheduler, SchedulerSettings, SessionOutcome, StopReason,
};
use super::sink_hub::SinkHub;
use super::stats::{AcquisitionStats, StatsSnapshot};
use super::status::StatusBoard;
use crate::channels::{ChannelConfig, RawLineParser};
use crate::config::settings::validate_channels;
use crate::config::{AcquisitionMode, Config};
use crate::modbus::{RtuTransport, Transport};
use crate::output::SampleSink;
use crate::registers::{RegisterDecoder, RegisterEntry, RegisterMap};
use crate::sample::{ConnectionState, SchedulerState};
use crate::utils::error::AcquisitionError;

struct RunningSession {
    id: Uuid,
    stop_tx: watch::Sender<bool>,
    handle: JoinHandle<SessionOutcome>,
}

/// Owns the transport, the configuration snapshot and at most one
/// acquisition session.
pub struct AcquisitionService {
    config: Config,
    register_map: RegisterMap,
    transport: Option<Box<dyn Transport>>,
    session: Option<RunningSession>,
    hub: SinkHub,
    board: Arc<StatusBoard>,
    stats: Arc<AcquisitionStats>,
}

impl AcquisitionService {
    pub fn new(config: Config) -> Result<Self, AcquisitionError> {
        let register_map = config.validate()?;
        let stats = Arc::new(AcquisitionStats::default());
        let hub = SinkHub::new(config.acquisition.sink_queue_capacity, Arc::clone(&stats));
        let board = Arc::new(StatusBoard::new(hub.publisher()));

        info!("🚀 Initializing acquisition service");
        info!(
            "📋 Mode {:?}, {} enabled register entries, polling every {} ms",
            config.acquisition.mode,
            register_map.enabled_count(),
            config.acquisition.polling_interval_ms
        );

        Ok(Self {
            config,
            register_map,
            transport: None,
            session: None,
            hub,
            board,
            stats,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn register_map(&self) -> &RegisterMap {
        &self.register_map
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.board.connection()
    }

    pub fn scheduler_state(&self) -> SchedulerState {
        self.board.scheduler()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.board.subscribe_connection()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn session_id(&self) -> Option<Uuid> {
        self.session.as_ref().map(|s| s.id)
    }

    pub fn is_running(&self) -> bool {
        self.session.as_ref().is_some_and(|s| !s.handle.is_finished())
    }

    /// Names of the channels a session started now would publish, in order.
    pub fn channel_names(&self) -> Vec<String> {
        match self.config.acquisition.mode {
            AcquisitionMode::Modbus => self.register_map.channel_names(),
            AcquisitionMode::RawSerial => {
                raw_channel_names(self.config.acquisition.raw_channel_count, &self.config.channels)
            }
        }
    }

    fn ensure_idle(&self) -> Result<(), AcquisitionError> {
        if self.is_running() {
            Err(AcquisitionError::ConfigurationLocked)
        } else {
            Ok(())
        }
    }

    /// Attaches a sink. Must be called from within a tokio runtime.
    pub fn add_sink(&mut self, sink: Box<dyn SampleSink>) -> Result<(), AcquisitionError> {
        self.ensure_idle()?;
        self.hub.attach(sink);
        Ok(())
    }

    pub fn set_register_map(&mut self, entries: Vec<RegisterEntry>) -> Result<(), AcquisitionError> {
        self.ensure_idle()?;
        let map = RegisterMap::new(entries)?;
        info!("📝 Register map replaced: {} enabled entries", map.enabled_count());
        self.config.registers = map.entries().to_vec();
        self.register_map = map;
        Ok(())
    }

    pub fn set_channel_config(&mut self, channels: Vec<ChannelConfig>) -> Result<(), AcquisitionError> {
        self.ensure_idle()?;
        validate_channels(&channels)?;
        self.config.channels = channels;
        Ok(())
    }

    /// Opens the configured serial port.
    pub fn connect(&mut self) -> Result<(), AcquisitionError> {
        self.ensure_idle()?;
        self.close_transport();
        self.board.set_connection(ConnectionState::Connecting);

        let serial = &self.config.serial;
        match RtuTransport::open(&serial.port, serial.baud_rate, self.config.io_timeout(), &serial.parity) {
            Ok(transport) => {
                self.transport = Some(Box::new(transport));
                self.board.set_connection(ConnectionState::Connected);
                Ok(())
            }
            Err(e) => {
                self.board.set_connection(ConnectionState::Disconnected);
                self.board.publisher().error(&e, format!("connect {}: {}", serial.port, e));
                Err(e)
            }
        }
    }

    /// Uses an already open transport, such as a simulator or a test double.
    pub fn connect_with(&mut self, transport: Box<dyn Transport>) -> Result<(), AcquisitionError> {
        self.ensure_idle()?;
        self.close_transport();
        if !transport.is_open() {
            self.board.set_connection(ConnectionState::Disconnected);
            return Err(AcquisitionError::NotConnected);
        }
        info!("🔌 Using transport {}", transport.describe());
        self.transport = Some(transport);
        self.board.set_connection(ConnectionState::Connected);
        Ok(())
    }

    pub async fn disconnect(&mut self) -> Result<(), AcquisitionError> {
        self.stop().await?;
        self.close_transport();
        self.board.set_connection(ConnectionState::Disconnected);
        Ok(())
    }

    fn close_transport(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            transport.close();
        }
    }

    /// Starts a session on the connected transport and returns its id.
    pub async fn start(&mut self) -> Result<Uuid, AcquisitionError> {
        if self.is_running() {
            return Err(AcquisitionError::ConfigurationLocked);
        }
        // A session that ended on its own still has to be collected.
        self.reap().await;

        if self.board.connection() != ConnectionState::Connected {
            return Err(AcquisitionError::NotConnected);
        }
        let transport = self.transport.take().ok_or(AcquisitionError::NotConnected)?;

        let acq = &self.config.acquisition;
        let plan = match acq.mode {
            AcquisitionMode::Modbus => AcquisitionPlan::Modbus {
                map: self.register_map.clone(),
                decoder: RegisterDecoder::new(acq.word_order),
            },
            AcquisitionMode::RawSerial => AcquisitionPlan::RawSerial {
                parser: RawLineParser::new(acq.raw_channel_count),
            },
        };
        let settings = SchedulerSettings {
            period: self.config.polling_interval(),
            io_timeout: self.config.io_timeout(),
            failure_threshold: acq.failure_threshold,
            raw_read_bytes: acq.raw_read_bytes,
        };
        let scheduler = AcquisitionScheduler::new(
            plan,
            settings,
            &self.config.channels,
            Arc::clone(&self.board),
            Arc::clone(&self.stats),
        );

        let id = Uuid::new_v4();
        let (stop_tx, stop_rx) = watch::channel(false);

        self.board.set_scheduler(SchedulerState::Running);
        self.board.set_connection(ConnectionState::Acquiring);
        let handle = tokio::spawn(scheduler.run(transport, stop_rx));

        info!("▶️  Session {} started", id);
        self.session = Some(RunningSession { id, stop_tx, handle });
        Ok(id)
    }

    /// Requests a stop and waits for the session to finish. A tick in
    /// progress completes its current transaction and is not published.
    pub async fn stop(&mut self) -> Result<(), AcquisitionError> {
        let Some(session) = self.session.as_ref() else {
            return Ok(());
        };
        if !session.handle.is_finished() {
            self.board.set_scheduler(SchedulerState::Stopping);
            let _ = session.stop_tx.send(true);
        }
        self.reap().await;
        Ok(())
    }

    /// Waits until the current session ends on its own or is stopped.
    pub async fn wait(&mut self) -> Option<StopReason> {
        self.reap().await
    }

    /// Collects the finished session. Cancellation safe: the session is
    /// only taken once its task has completed.
    async fn reap(&mut self) -> Option<StopReason> {
        let joined = match self.session.as_mut() {
            Some(session) => (&mut session.handle).await,
            None => return None,
        };
        let session = self.session.take()?;
        match joined {
            Ok(SessionOutcome { mut transport, reason }) => {
                match reason {
                    StopReason::Requested => self.transport = Some(transport),
                    StopReason::FailureThreshold => {
                        warn!("⚠️  Session {} ended on repeated failures, closing transport", session.id);
                        transport.close();
                    }
                }
                info!("⏹️  Session {} finished", session.id);
                Some(reason)
            }
            Err(e) => {
                error!("❌ Session {} task failed: {}", session.id, e);
                let err = AcquisitionError::from(e);
                self.board.publisher().error(&err, format!("session {}: {}", session.id, err));
                self.board.set_connection(ConnectionState::Error);
                self.board.set_scheduler(SchedulerState::Idle);
                None
            }
        }
    }

    /// Stops acquisition, releases the port and drains every sink.
    pub async fn shutdown(mut self) -> StatsSnapshot {
        if let Err(e) = self.disconnect().await {
            warn!("⚠️  Disconnect during shutdown failed: {}", e);
        }
        let snapshot = self.stats.snapshot();
        let AcquisitionService { hub, board, .. } = self;
        // Sink workers end once every publisher handle is gone.
        drop(board);
        hub.shutdown().await;
        info!("🏁 Acquisition service shut down");
        snapshot
    }
}
