pub mod conditioner;
pub mod raw_frame;

pub use conditioner::{condition, ChannelConfig};
pub use raw_frame::RawLineParser;
