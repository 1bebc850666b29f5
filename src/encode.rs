//! Reading encoders: typed `DataUnit` to the bytes a channel puts on the wire.

use core::fmt::{self, Write as _};

use heapless::Vec;

use crate::config::MAX_ENCODED_LEN;
use crate::data::{DataType, DataUnit};
use crate::error::Error;

/// Encoder output scratch.
pub type Encoded = Vec<u8, MAX_ENCODED_LEN>;

/// Compact binary header: type tag, aux byte, word count.
pub const COMPACT_HEADER_LEN: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Format {
    /// Human-readable line with type name, status and every value.
    VerboseText,
    /// `<type id>:<v0>,<v1>,…` (or `<type id>!<code>` for a failed reading).
    MinimalText,
    /// Payload words, little endian, no header.
    RawBytes,
    /// `[type][aux][word count]` followed by the payload words, little endian.
    CompactBinary,
}

impl Format {
    pub const fn is_text(self) -> bool {
        matches!(self, Self::VerboseText | Self::MinimalText)
    }
}

pub trait Encoder {
    /// Appends the encoded form of `unit` to `out`.
    fn encode(&self, unit: &DataUnit, format: Format, out: &mut Encoded) -> Result<(), Error>;
}

/// Format-generic encoder: values are printed as signed integers in the sensor's own fixed-point
/// unit (e.g. centi-degrees), text readings pass through.
#[derive(Debug, Clone, Copy, Default)]
pub struct WordEncoder;

impl Encoder for WordEncoder {
    fn encode(&self, unit: &DataUnit, format: Format, out: &mut Encoded) -> Result<(), Error> {
        let res = match format {
            Format::VerboseText => verbose(unit, &mut Sink(out)).map_err(|_| Error::BufferFull),
            Format::MinimalText => minimal(unit, &mut Sink(out)).map_err(|_| Error::BufferFull),
            Format::RawBytes => raw(unit, out),
            Format::CompactBinary => compact(unit, out),
        };
        if let Err(e) = res {
            warn!("cannot encode {:?} as {:?}: {:?}", unit.data_type(), format, e);
        }
        res
    }
}

/* ====== helpers ====== */

/// `fmt::Write` over the byte scratch.
struct Sink<'a>(&'a mut Encoded);

impl fmt::Write for Sink<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.0.extend_from_slice(s.as_bytes()).map_err(|_| fmt::Error)
    }
}

fn verbose(unit: &DataUnit, w: &mut Sink<'_>) -> fmt::Result {
    write!(w, "[{}] ", unit.data_type().name())?;
    if unit.aux() != 0 {
        return write!(w, "error {}", unit.aux());
    }
    if let Some(text) = text_of(unit) {
        return w.write_str(text);
    }
    w.write_str("values=")?;
    write_values(unit, w)
}

fn minimal(unit: &DataUnit, w: &mut Sink<'_>) -> fmt::Result {
    if unit.aux() != 0 {
        return write!(w, "{}!{}", unit.data_type() as u8, unit.aux());
    }
    if let Some(text) = text_of(unit) {
        return w.write_str(text);
    }
    write!(w, "{}:", unit.data_type() as u8)?;
    write_values(unit, w)
}

fn write_values(unit: &DataUnit, w: &mut Sink<'_>) -> fmt::Result {
    for (i, word) in unit.words().iter().enumerate() {
        if i > 0 {
            w.write_char(',')?;
        }
        write!(w, "{}", *word as i32)?;
    }
    Ok(())
}

fn text_of(unit: &DataUnit) -> Option<&str> {
    match unit.data_type() {
        DataType::Text => unit.as_text(),
        _ => None,
    }
}

fn raw(unit: &DataUnit, out: &mut Encoded) -> Result<(), Error> {
    if unit.data_type() == DataType::Text {
        let text = unit.as_text().ok_or(Error::Encoding)?;
        return out
            .extend_from_slice(text.as_bytes())
            .map_err(|_| Error::BufferFull);
    }
    push_words(unit, out)
}

fn compact(unit: &DataUnit, out: &mut Encoded) -> Result<(), Error> {
    let count = u8::try_from(unit.word_count()).map_err(|_| Error::TooManyWords)?;
    out.extend_from_slice(&[unit.data_type() as u8, unit.aux(), count])
        .map_err(|_| Error::BufferFull)?;
    push_words(unit, out)
}

fn push_words(unit: &DataUnit, out: &mut Encoded) -> Result<(), Error> {
    for word in unit.words() {
        out.extend_from_slice(&word.to_le_bytes())
            .map_err(|_| Error::BufferFull)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(unit: &DataUnit, format: Format) -> Encoded {
        let mut out = Encoded::new();
        WordEncoder.encode(unit, format, &mut out).unwrap();
        out
    }

    fn sht() -> DataUnit {
        DataUnit::new(DataType::Sht3x, &[2345, (-120i32) as u32]).unwrap()
    }

    #[test]
    fn text_formats() {
        assert_eq!(
            encode(&sht(), Format::VerboseText).as_slice(),
            b"[sht3x] values=2345,-120"
        );
        assert_eq!(encode(&sht(), Format::MinimalText).as_slice(), b"1:2345,-120");
    }

    #[test]
    fn failed_reading_reports_its_code() {
        let unit = DataUnit::failed(DataType::Scd4x, Error::Sensor);
        let code = Error::Sensor.code();
        let verbose = encode(&unit, Format::VerboseText);
        assert_eq!(verbose.as_slice(), std::format!("[scd4x] error {code}").as_bytes());
        let minimal = encode(&unit, Format::MinimalText);
        assert_eq!(minimal.as_slice(), std::format!("3!{code}").as_bytes());
    }

    #[test]
    fn compact_layout() {
        let out = encode(&sht().with_aux(0), Format::CompactBinary);
        assert_eq!(out.len(), COMPACT_HEADER_LEN + 8);
        assert_eq!(&out[..3], &[DataType::Sht3x as u8, 0, 2]);
        assert_eq!(&out[3..7], &2345u32.to_le_bytes());
        assert_eq!(&out[7..], &(-120i32).to_le_bytes());
    }

    #[test]
    fn raw_is_bare_words() {
        let out = encode(&sht(), Format::RawBytes);
        assert_eq!(out.len(), 8);
        assert_eq!(&out[..4], &2345u32.to_le_bytes());
    }

    #[test]
    fn text_passes_through() {
        let unit = DataUnit::text("boot ok").unwrap();
        assert_eq!(encode(&unit, Format::VerboseText).as_slice(), b"[text] boot ok");
        assert_eq!(encode(&unit, Format::MinimalText).as_slice(), b"boot ok");
        assert_eq!(encode(&unit, Format::RawBytes).as_slice(), b"boot ok");
        // Compact keeps the padded words
        assert_eq!(encode(&unit, Format::CompactBinary).len(), COMPACT_HEADER_LEN + 8);
    }

    #[test]
    fn appends_to_existing_output() {
        let mut out = Encoded::new();
        out.push(b'>').unwrap();
        WordEncoder.encode(&sht(), Format::MinimalText, &mut out).unwrap();
        assert_eq!(out.as_slice(), b">1:2345,-120");
    }
}
