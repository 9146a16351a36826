use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DataType {
    Int16,
    Uint16,
    Int32,
    Uint32,
    Float32,
}

impl DataType {
    pub const ALL: [DataType; 5] = [
        DataType::Int16,
        DataType::Uint16,
        DataType::Int32,
        DataType::Uint32,
        DataType::Float32,
    ];

    /// Register width in bits.
    pub fn width(self) -> u8 {
        match self {
            DataType::Int16 | DataType::Uint16 => 16,
            DataType::Int32 | DataType::Uint32 | DataType::Float32 => 32,
        }
    }

    /// Number of 16-bit holding registers the value occupies.
    pub fn word_count(self) -> u16 {
        (self.width() / 16) as u16
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            DataType::Int16 => "INT16",
            DataType::Uint16 => "UINT16",
            DataType::Int32 => "INT32",
            DataType::Uint32 => "UINT32",
            DataType::Float32 => "FLOAT32",
        };
        f.write_str(label)
    }
}

impl std::str::FromStr for DataType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DataType::ALL
            .into_iter()
            .find(|t| t.to_string().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown data type '{}' (expected INT16, UINT16, INT32, UINT32 or FLOAT32)", s))
    }
}

/// One configured address on one slave.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterEntry {
    pub slave_id: u8,
    pub address: u16,
    pub data_type: DataType,
    #[serde(default)]
    pub channel_name: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl RegisterEntry {
    pub fn new(slave_id: u8, address: u16, data_type: DataType, channel_name: impl Into<String>) -> Self {
        Self {
            slave_id,
            address,
            data_type,
            channel_name: channel_name.into(),
            enabled: true,
        }
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn width(&self) -> u8 {
        self.data_type.width()
    }

    pub fn word_count(&self) -> u16 {
        self.data_type.word_count()
    }

    /// Last register address covered by this entry, `None` when it runs past 0xFFFF.
    pub fn last_address(&self) -> Option<u16> {
        self.address.checked_add(self.word_count() - 1)
    }
}

impl fmt::Display for RegisterEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "slave {} @ {} [{}] '{}'",
            self.slave_id, self.address, self.data_type, self.channel_name
        )
    }
}
