//! Typed sensor/text readings.

use heapless::Vec;

use crate::config::MAX_WORDS;
use crate::error::Error;

/// Origin of a reading. One value per supported sensor model plus free text.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DataType {
    Text = 0,
    Sht3x = 1,
    Bme280 = 2,
    Scd4x = 3,
    Ltr390 = 4,
    Sps30 = 5,
    Battery = 6,
}

impl DataType {
    pub const fn from_u8(raw: u8) -> Option<Self> {
        Some(match raw {
            0 => Self::Text,
            1 => Self::Sht3x,
            2 => Self::Bme280,
            3 => Self::Scd4x,
            4 => Self::Ltr390,
            5 => Self::Sps30,
            6 => Self::Battery,
            _ => return None,
        })
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Sht3x => "sht3x",
            Self::Bme280 => "bme280",
            Self::Scd4x => "scd4x",
            Self::Ltr390 => "ltr390",
            Self::Sps30 => "sps30",
            Self::Battery => "battery",
        }
    }
}

/// One reading: a type tag, an auxiliary byte (sensor error code, 0 = ok) and up to
/// `MAX_WORDS` 32-bit payload words. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataUnit {
    data_type: DataType,
    aux: u8,
    words: Vec<u32, MAX_WORDS>,
}

impl DataUnit {
    pub fn new(data_type: DataType, words: &[u32]) -> Result<Self, Error> {
        let words = Vec::from_slice(words).map_err(|_| Error::TooManyWords)?;
        Ok(Self {
            data_type,
            aux: 0,
            words,
        })
    }

    /// Reading that failed: no payload, error code in the aux byte.
    pub fn failed(data_type: DataType, err: Error) -> Self {
        Self {
            data_type,
            aux: err.code(),
            words: Vec::new(),
        }
    }

    /// Packs UTF-8 text into zero-padded words.
    pub fn text(text: &str) -> Result<Self, Error> {
        let bytes = text.as_bytes();
        if bytes.len() > MAX_WORDS * 4 {
            return Err(Error::TooManyWords);
        }
        let mut words = Vec::new();
        for chunk in bytes.chunks(4) {
            let mut word = [0u8; 4];
            word[..chunk.len()].copy_from_slice(chunk);
            // Capacity checked above
            let _ = words.push(u32::from_ne_bytes(word));
        }
        Ok(Self {
            data_type: DataType::Text,
            aux: 0,
            words,
        })
    }

    pub(crate) fn from_parts(data_type: DataType, aux: u8, words: Vec<u32, MAX_WORDS>) -> Self {
        Self {
            data_type,
            aux,
            words,
        }
    }

    pub fn with_aux(mut self, aux: u8) -> Self {
        self.aux = aux;
        self
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn aux(&self) -> u8 {
        self.aux
    }

    pub fn words(&self) -> &[u32] {
        &self.words
    }

    pub fn word_count(&self) -> usize {
        self.words.len()
    }

    /// Payload size in bytes once serialized.
    pub fn payload_len(&self) -> usize {
        self.words.len() * 4
    }

    /// Text payload without the zero padding, `None` for non-UTF-8 content.
    pub fn as_text(&self) -> Option<&str> {
        let bytes: &[u8] = bytemuck::cast_slice(self.words.as_slice());
        let end = bytes.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
        core::str::from_utf8(&bytes[..end]).ok()
    }
}
