pub mod decoder;
pub mod entry;
pub mod map;

pub use decoder::{RegisterDecoder, WordOrder};
pub use entry::{DataType, RegisterEntry};
pub use map::{RegisterMap, MAX_CHANNELS, MAX_ENTRIES_PER_SLAVE, MAX_SLAVES};
