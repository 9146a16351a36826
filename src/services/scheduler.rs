use chrono::Utc;
use log::{debug, error, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

use super::stats::AcquisitionStats;
use super::status::StatusBoard;
use crate::channels::{condition, ChannelConfig, RawLineParser};
use crate::modbus::Transport;
use crate::registers::{RegisterDecoder, RegisterEntry, RegisterMap};
use crate::sample::{ChannelQuality, ConnectionState, Sample, SchedulerState};
use crate::utils::error::AcquisitionError;

#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub period: Duration,
    pub io_timeout: Duration,
    pub failure_threshold: u32,
    pub raw_read_bytes: usize,
}

/// What one tick reads.
pub enum AcquisitionPlan {
    Modbus { map: RegisterMap, decoder: RegisterDecoder },
    RawSerial { parser: RawLineParser },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Requested,
    FailureThreshold,
}

pub struct SessionOutcome {
    pub transport: Box<dyn Transport>,
    pub reason: StopReason,
}

#[derive(Debug, Clone, Copy, Default)]
struct ChannelState {
    last_good: Option<f64>,
    consecutive_failures: u32,
}

enum Reading {
    Value(f64),
    Failed(AcquisitionError),
    /// Nothing new for this channel; not a failure.
    Absent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickResult {
    Published,
    Cancelled,
    Escalated,
}

/// Names for raw serial channels: the configured name, else `CH<n>`.
pub fn raw_channel_names(count: usize, channel_configs: &[ChannelConfig]) -> Vec<String> {
    (0..count)
        .map(|i| {
            channel_configs
                .iter()
                .find(|c| c.index == i && !c.name.trim().is_empty())
                .map(|c| c.name.clone())
                .unwrap_or_else(|| format!("CH{}", i + 1))
        })
        .collect()
}

/// The acquisition loop. Owns the transport for the whole session.
pub struct AcquisitionScheduler {
    plan: AcquisitionPlan,
    entries: Vec<RegisterEntry>,
    settings: SchedulerSettings,
    calibrations: Vec<ChannelConfig>,
    channel_names: Vec<String>,
    channels: Vec<ChannelState>,
    raw_failures: u32,
    board: Arc<StatusBoard>,
    stats: Arc<AcquisitionStats>,
    sequence: u64,
    session_start: Instant,
}

impl AcquisitionScheduler {
    pub fn new(
        plan: AcquisitionPlan,
        settings: SchedulerSettings,
        channel_configs: &[ChannelConfig],
        board: Arc<StatusBoard>,
        stats: Arc<AcquisitionStats>,
    ) -> Self {
        let (entries, channel_names): (Vec<RegisterEntry>, Vec<String>) = match &plan {
            AcquisitionPlan::Modbus { map, .. } => (map.enabled().cloned().collect(), map.channel_names()),
            AcquisitionPlan::RawSerial { parser } => (Vec::new(), raw_channel_names(parser.channel_count(), channel_configs)),
        };

        let calibrations = channel_names
            .iter()
            .enumerate()
            .map(|(i, name)| {
                channel_configs
                    .iter()
                    .find(|c| c.index == i)
                    .cloned()
                    .unwrap_or_else(|| ChannelConfig::new(i, name.clone()))
            })
            .collect();

        Self {
            plan,
            entries,
            settings,
            calibrations,
            channels: vec![ChannelState::default(); channel_names.len()],
            channel_names,
            raw_failures: 0,
            board,
            stats,
            sequence: 0,
            session_start: Instant::now(),
        }
    }

    pub fn channel_names(&self) -> &[String] {
        &self.channel_names
    }

    /// Runs ticks every `period` until a stop is requested or a channel
    /// reaches the failure threshold, then hands the transport back.
    pub async fn run(mut self, mut transport: Box<dyn Transport>, mut stop: watch::Receiver<bool>) -> SessionOutcome {
        let period = self.settings.period;
        info!(
            "🚀 Acquisition running on {}: {} channels every {:?}",
            transport.describe(),
            self.channel_names.len(),
            period
        );

        self.session_start = Instant::now();
        let mut tick_start = self.session_start;

        let reason = loop {
            match self.tick(transport.as_mut(), &stop).await {
                TickResult::Published => {}
                TickResult::Cancelled => break StopReason::Requested,
                TickResult::Escalated => break StopReason::FailureThreshold,
            }
            if *stop.borrow() {
                break StopReason::Requested;
            }

            // Next tick is anchored to the previous start, not to now.
            let deadline = tick_start + period;
            let now = Instant::now();
            if now > deadline {
                self.stats.record_overrun();
                debug!("⏱️  Tick {} overran its period by {:?}", self.sequence, now - deadline);
                tick_start = now;
                continue;
            }

            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => tick_start = deadline,
                _ = stop.changed() => break StopReason::Requested,
            }
        };

        match reason {
            StopReason::Requested => {
                info!("🛑 Acquisition stopped after {} samples", self.sequence);
                self.board.set_connection(ConnectionState::Connected);
            }
            StopReason::FailureThreshold => {
                error!(
                    "❌ Acquisition halted: {} consecutive failures on one channel",
                    self.settings.failure_threshold
                );
                self.board.set_connection(ConnectionState::Error);
            }
        }
        self.board.set_scheduler(SchedulerState::Idle);

        SessionOutcome { transport, reason }
    }

    /// One read-decode-condition-publish cycle.
    pub async fn tick(&mut self, transport: &mut dyn Transport, stop: &watch::Receiver<bool>) -> TickResult {
        self.stats.record_tick();

        let readings = match &mut self.plan {
            AcquisitionPlan::Modbus { decoder, .. } => {
                let mut readings = Vec::with_capacity(self.entries.len());
                for entry in &self.entries {
                    // Checked between transactions; an in-flight read always completes.
                    if *stop.borrow() {
                        debug!("Tick {} abandoned on stop request", self.sequence);
                        return TickResult::Cancelled;
                    }
                    let result = transport
                        .read_holding_registers(entry.slave_id, entry.address, entry.word_count(), self.settings.io_timeout)
                        .await
                        .and_then(|words| decoder.decode(entry, &words));
                    readings.push(match result {
                        Ok(raw) => Reading::Value(raw),
                        Err(e) => Reading::Failed(e),
                    });
                }
                readings
            }
            AcquisitionPlan::RawSerial { parser } => {
                let count = parser.channel_count();
                let frame = match transport.read_raw(self.settings.raw_read_bytes, self.settings.io_timeout).await {
                    Ok(bytes) => parser.push(&bytes),
                    Err(e) => Err(e),
                };
                match frame {
                    Ok(Some(values)) => {
                        self.raw_failures = 0;
                        values
                            .into_iter()
                            .map(|v| v.map_or(Reading::Absent, Reading::Value))
                            .collect()
                    }
                    Ok(None) => (0..count).map(|_| Reading::Absent).collect(),
                    Err(e) => {
                        self.raw_failures += 1;
                        self.report_failure("raw frame", &e, self.raw_failures);
                        (0..count).map(|_| Reading::Absent).collect()
                    }
                }
            }
        };

        let mut escalate = self.raw_failures >= self.settings.failure_threshold;
        let mut values = Vec::with_capacity(readings.len());
        let mut quality = Vec::with_capacity(readings.len());

        for (i, reading) in readings.into_iter().enumerate() {
            let (value, q) = match reading {
                Reading::Value(raw) => {
                    self.channels[i].consecutive_failures = 0;
                    let value = condition(raw, &self.calibrations[i]);
                    if value.is_finite() {
                        self.channels[i].last_good = Some(value);
                        (value, ChannelQuality::Fresh)
                    } else {
                        (value, ChannelQuality::NonFinite)
                    }
                }
                Reading::Failed(e) => {
                    self.channels[i].consecutive_failures += 1;
                    let failures = self.channels[i].consecutive_failures;
                    let label = self.entries.get(i).map(|e| e.to_string()).unwrap_or_default();
                    self.report_failure(&label, &e, failures);
                    escalate |= failures >= self.settings.failure_threshold;
                    self.held(i)
                }
                Reading::Absent => self.held(i),
            };
            values.push(value);
            quality.push(q);
        }

        let sample = Sample {
            sequence: self.sequence,
            timestamp: Utc::now(),
            elapsed: Instant::now().duration_since(self.session_start),
            values,
            channel_names: self.channel_names.clone(),
            quality,
        };
        self.sequence += 1;
        self.board.publisher().publish(sample);

        if escalate {
            TickResult::Escalated
        } else {
            TickResult::Published
        }
    }

    fn held(&self, channel: usize) -> (f64, ChannelQuality) {
        match self.channels[channel].last_good {
            Some(value) => (value, ChannelQuality::Held),
            None => (f64::NAN, ChannelQuality::Missing),
        }
    }

    fn report_failure(&self, label: &str, err: &AcquisitionError, consecutive: u32) {
        self.stats.record_read_error();
        warn!("⚠️  Read failed for {} ({} in a row): {}", label, consecutive, err);
        self.board
            .publisher()
            .error(err, format!("{}: {} ({} consecutive)", label, err, consecutive));
    }
}
