//! Reassembles holding register words into engineering values.
//!
//! 32-bit values span two consecutive registers. Devices disagree on which
//! register carries the high half, so the order is an explicit session
//! setting rather than something detected at runtime.

use serde::{Deserialize, Serialize};

use super::entry::{DataType, RegisterEntry};
use crate::utils::error::AcquisitionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WordOrder {
    /// First register holds the high 16 bits (big-endian word order).
    #[default]
    HighFirst,
    /// First register holds the low 16 bits ("word swapped").
    LowFirst,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RegisterDecoder {
    word_order: WordOrder,
}

impl RegisterDecoder {
    pub fn new(word_order: WordOrder) -> Self {
        Self { word_order }
    }

    pub fn word_order(&self) -> WordOrder {
        self.word_order
    }

    pub fn decode(&self, entry: &RegisterEntry, words: &[u16]) -> Result<f64, AcquisitionError> {
        decode_words(entry.data_type, words, self.word_order)
    }

    pub fn encode(&self, value: f64, data_type: DataType) -> Vec<u16> {
        encode_value(value, data_type, self.word_order)
    }
}

pub fn decode_words(data_type: DataType, words: &[u16], order: WordOrder) -> Result<f64, AcquisitionError> {
    let expected = data_type.word_count() as usize;
    if words.len() != expected {
        return Err(AcquisitionError::InsufficientWords {
            expected,
            actual: words.len(),
        });
    }

    let value = match data_type {
        DataType::Int16 => words[0] as i16 as f64,
        DataType::Uint16 => words[0] as f64,
        DataType::Int32 => combine(words[0], words[1], order) as i32 as f64,
        DataType::Uint32 => combine(words[0], words[1], order) as f64,
        DataType::Float32 => f32::from_bits(combine(words[0], words[1], order)) as f64,
    };
    Ok(value)
}

/// Inverse of [`decode_words`]. Integer types saturate at their range.
pub fn encode_value(value: f64, data_type: DataType, order: WordOrder) -> Vec<u16> {
    let bits = match data_type {
        DataType::Int16 => return vec![value.round() as i16 as u16],
        DataType::Uint16 => return vec![value.round() as u16],
        DataType::Int32 => value.round() as i32 as u32,
        DataType::Uint32 => value.round() as u32,
        DataType::Float32 => (value as f32).to_bits(),
    };
    let (hi, lo) = ((bits >> 16) as u16, bits as u16);
    match order {
        WordOrder::HighFirst => vec![hi, lo],
        WordOrder::LowFirst => vec![lo, hi],
    }
}

fn combine(first: u16, second: u16, order: WordOrder) -> u32 {
    let (hi, lo) = match order {
        WordOrder::HighFirst => (first, second),
        WordOrder::LowFirst => (second, first),
    };
    ((hi as u32) << 16) | lo as u32
}
