use serde::{Deserialize, Serialize};

/// Per-channel calibration. The defaults make [`condition`] the identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelConfig {
    pub index: usize,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub zero: f64,
    #[serde(default = "unity")]
    pub multiplier: f64,
    #[serde(default = "unity")]
    pub gain: f64,
}

fn unity() -> f64 {
    1.0
}

impl ChannelConfig {
    pub fn new(index: usize, name: impl Into<String>) -> Self {
        Self {
            index,
            name: name.into(),
            zero: 0.0,
            multiplier: 1.0,
            gain: 1.0,
        }
    }

    pub fn with_calibration(mut self, zero: f64, multiplier: f64, gain: f64) -> Self {
        self.zero = zero;
        self.multiplier = multiplier;
        self.gain = gain;
        self
    }

    pub fn is_identity(&self) -> bool {
        self.zero == 0.0 && self.multiplier == 1.0 && self.gain == 1.0
    }

    pub fn apply(&self, raw: f64) -> f64 {
        condition(raw, self)
    }
}

/// `(raw + zero) * multiplier * gain`. Non-finite input passes through.
pub fn condition(raw: f64, cfg: &ChannelConfig) -> f64 {
    (raw + cfg.zero) * cfg.multiplier * cfg.gain
}
