use crate::sample::{ConnectionState, Sample};
use crate::utils::error::ErrorKind;

/// Consumer of published samples and engine events.
///
/// Each sink is driven from its own thread and fed through a bounded queue,
/// so a slow implementation only delays itself. When it falls behind, the
/// oldest queued events are dropped.
pub trait SampleSink: Send + 'static {
    fn name(&self) -> &str;

    fn on_sample(&mut self, sample: Sample);

    fn on_state_change(&mut self, _state: ConnectionState) {}

    fn on_error(&mut self, _kind: ErrorKind, _detail: &str) {}

    /// Called once after the last event, before the sink is dropped.
    fn on_close(&mut self) {}
}
