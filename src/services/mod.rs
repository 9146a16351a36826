pub mod acquisition_service;
pub mod scheduler;
pub mod sink_hub;
pub mod stats;
pub mod status;

pub use acquisition_service::AcquisitionService;
pub use scheduler::{AcquisitionPlan, AcquisitionScheduler, SchedulerSettings, SessionOutcome, StopReason};
pub use sink_hub::{SamplePublisher, SinkEvent, SinkHub};
pub use stats::{AcquisitionStats, StatsSnapshot};
pub use status::StatusBoard;
