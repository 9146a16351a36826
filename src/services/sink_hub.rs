use log::{debug, info, warn};
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;

use super::stats::AcquisitionStats;
use crate::output::SampleSink;
use crate::sample::{ConnectionState, Sample};
use crate::utils::error::{AcquisitionError, ErrorKind};

#[derive(Debug, Clone)]
pub enum SinkEvent {
    Sample(Sample),
    StateChange(ConnectionState),
    Error { kind: ErrorKind, detail: String },
}

/// Non-blocking handle the scheduler publishes through.
#[derive(Clone)]
pub struct SamplePublisher {
    tx: broadcast::Sender<SinkEvent>,
    stats: Arc<AcquisitionStats>,
}

impl SamplePublisher {
    pub fn publish(&self, sample: Sample) {
        // Nobody listening is not an error.
        let _ = self.tx.send(SinkEvent::Sample(sample));
        self.stats.record_published();
    }

    pub fn state_changed(&self, state: ConnectionState) {
        let _ = self.tx.send(SinkEvent::StateChange(state));
    }

    pub fn error(&self, err: &AcquisitionError, detail: impl Into<String>) {
        let _ = self.tx.send(SinkEvent::Error {
            kind: err.kind(),
            detail: detail.into(),
        });
    }
}

struct SinkWorker {
    name: String,
    handle: JoinHandle<()>,
}

/// Fans events out to every attached sink.
///
/// Each sink has its own bounded queue (a broadcast receiver) drained on a
/// blocking-pool thread. A sink that falls behind loses its oldest events and
/// the loss is counted as a sink overrun.
pub struct SinkHub {
    tx: broadcast::Sender<SinkEvent>,
    stats: Arc<AcquisitionStats>,
    workers: Vec<SinkWorker>,
}

impl SinkHub {
    pub fn new(capacity: usize, stats: Arc<AcquisitionStats>) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            tx,
            stats,
            workers: Vec::new(),
        }
    }

    pub fn publisher(&self) -> SamplePublisher {
        SamplePublisher {
            tx: self.tx.clone(),
            stats: Arc::clone(&self.stats),
        }
    }

    /// Raw event stream for async observers that are not sinks.
    pub fn subscribe(&self) -> broadcast::Receiver<SinkEvent> {
        self.tx.subscribe()
    }

    pub fn sink_names(&self) -> Vec<String> {
        self.workers.iter().map(|w| w.name.clone()).collect()
    }

    /// Must be called from within a tokio runtime.
    pub fn attach(&mut self, mut sink: Box<dyn SampleSink>) {
        let name = sink.name().to_string();
        let mut rx = self.tx.subscribe();
        let stats = Arc::clone(&self.stats);
        let worker_name = name.clone();

        let handle = tokio::task::spawn_blocking(move || {
            loop {
                match rx.blocking_recv() {
                    Ok(SinkEvent::Sample(sample)) => sink.on_sample(sample),
                    Ok(SinkEvent::StateChange(state)) => sink.on_state_change(state),
                    Ok(SinkEvent::Error { kind, detail }) => sink.on_error(kind, &detail),
                    Err(RecvError::Lagged(dropped)) => {
                        warn!("⚠️  Sink '{}' fell behind, dropped {} events", worker_name, dropped);
                        stats.record_sink_overrun(dropped);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            sink.on_close();
            debug!("Sink '{}' worker finished", worker_name);
        });

        info!("📤 Attached sink '{}'", name);
        self.workers.push(SinkWorker { name, handle });
    }

    /// Closes the queues and waits until every sink has drained and closed.
    pub async fn shutdown(self) {
        let SinkHub { tx, workers, .. } = self;
        drop(tx);
        for worker in workers {
            if let Err(e) = worker.handle.await {
                warn!("⚠️  Sink '{}' worker ended abnormally: {}", worker.name, e);
            }
        }
    }
}
