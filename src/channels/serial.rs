//! Wired serial output.
//!
//! Text formats go out as CRLF-terminated lines. Binary formats are framed so a host can
//! resynchronise:
//!
//! ```text
//! 0xAA 0x55 | len (u16 LE) | payload … | CRC-16/CCITT-FALSE (LE) over everything before it
//! ```

use crc16::{State, CCITT_FALSE};
use embedded_io_async::Write;

use super::ChannelSink;
use crate::data::DataUnit;
use crate::encode::{Encoded, Encoder, Format, WordEncoder};
use crate::error::Error;

pub const FRAME_SYNC: [u8; 2] = [0xAA, 0x55];
/// Sync word plus length field.
pub const FRAME_HEADER_LEN: usize = 4;
pub const FRAME_CRC_LEN: usize = 2;

pub struct SerialChannel<W, E = WordEncoder> {
    writer: W,
    encoder: E,
    format: Format,
    scratch: Encoded,
}

impl<W: Write> SerialChannel<W> {
    pub fn new(writer: W, format: Format) -> Self {
        Self::with_encoder(writer, WordEncoder, format)
    }
}

impl<W: Write, E: Encoder> SerialChannel<W, E> {
    pub fn with_encoder(writer: W, encoder: E, format: Format) -> Self {
        Self {
            writer,
            encoder,
            format,
            scratch: Encoded::new(),
        }
    }

    pub fn format(&self) -> Format {
        self.format
    }

    pub fn set_format(&mut self, format: Format) {
        self.format = format;
    }

    pub fn writer(&self) -> &W {
        &self.writer
    }

    async fn write_all(&mut self, bytes: &[u8]) -> Result<(), Error> {
        self.writer.write_all(bytes).await.map_err(|_| Error::Transport)
    }
}

impl<W: Write, E: Encoder> ChannelSink for SerialChannel<W, E> {
    async fn consume(&mut self, unit: &DataUnit) -> Result<(), Error> {
        self.scratch.clear();
        self.encoder.encode(unit, self.format, &mut self.scratch)?;
        let payload = core::mem::take(&mut self.scratch);

        let res = if self.format.is_text() {
            self.write_line(&payload).await
        } else {
            self.write_frame(&payload).await
        };
        self.scratch = payload;
        res?;
        self.writer.flush().await.map_err(|_| Error::Transport)
    }
}

impl<W: Write, E: Encoder> SerialChannel<W, E> {
    async fn write_line(&mut self, line: &[u8]) -> Result<(), Error> {
        self.write_all(line).await?;
        self.write_all(b"\r\n").await
    }

    async fn write_frame(&mut self, payload: &[u8]) -> Result<(), Error> {
        let len = u16::try_from(payload.len()).map_err(|_| Error::ItemTooLarge)?;
        let [len_lo, len_hi] = len.to_le_bytes();
        let header = [FRAME_SYNC[0], FRAME_SYNC[1], len_lo, len_hi];

        let mut crc = State::<CCITT_FALSE>::new();
        crc.update(&header);
        crc.update(payload);

        self.write_all(&header).await?;
        self.write_all(payload).await?;
        self.write_all(&crc.get().to_le_bytes()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::DataType;
    use core::convert::Infallible;
    use embassy_futures::block_on;
    use std::vec::Vec;

    #[derive(Default)]
    struct Wire {
        bytes: Vec<u8>,
        flushes: usize,
    }

    impl embedded_io_async::ErrorType for Wire {
        type Error = Infallible;
    }

    impl Write for Wire {
        async fn write(&mut self, buf: &[u8]) -> Result<usize, Infallible> {
            self.bytes.extend_from_slice(buf);
            Ok(buf.len())
        }

        async fn flush(&mut self) -> Result<(), Infallible> {
            self.flushes += 1;
            Ok(())
        }
    }

    /// Port that accepts nothing.
    struct Broken;

    impl embedded_io_async::ErrorType for Broken {
        type Error = embedded_io_async::ErrorKind;
    }

    impl Write for Broken {
        async fn write(&mut self, _buf: &[u8]) -> Result<usize, Self::Error> {
            Err(embedded_io_async::ErrorKind::BrokenPipe)
        }
    }

    fn reading() -> DataUnit {
        DataUnit::new(DataType::Sht3x, &[2150, 4800]).unwrap()
    }

    #[test]
    fn text_goes_out_as_lines() {
        let mut serial = SerialChannel::new(Wire::default(), Format::MinimalText);
        block_on(serial.consume(&reading())).unwrap();
        block_on(serial.consume(&DataUnit::text("hi").unwrap())).unwrap();
        assert_eq!(serial.writer().bytes.as_slice(), b"1:2150,4800\r\nhi\r\n");
        assert_eq!(serial.writer().flushes, 2);
    }

    #[test]
    fn binary_is_framed_with_crc() {
        let mut serial = SerialChannel::new(Wire::default(), Format::CompactBinary);
        block_on(serial.consume(&reading())).unwrap();

        let bytes = &serial.writer().bytes;
        let payload_len = 3 + 8;
        assert_eq!(bytes.len(), FRAME_HEADER_LEN + payload_len + FRAME_CRC_LEN);
        assert_eq!(&bytes[..4], &[0xAA, 0x55, payload_len as u8, 0]);
        assert_eq!(bytes[4], DataType::Sht3x as u8);

        let body = bytes.len() - FRAME_CRC_LEN;
        let crc = u16::from_le_bytes([bytes[body], bytes[body + 1]]);
        assert_eq!(crc, State::<CCITT_FALSE>::calculate(&bytes[..body]));
    }

    #[test]
    fn format_is_switchable() {
        let mut serial = SerialChannel::new(Wire::default(), Format::RawBytes);
        serial.set_format(Format::VerboseText);
        block_on(serial.consume(&reading())).unwrap();
        assert!(serial.writer().bytes.starts_with(b"[sht3x]"));
    }

    #[test]
    fn port_errors_surface_as_transport() {
        let mut serial = SerialChannel::new(Broken, Format::MinimalText);
        assert_eq!(block_on(serial.consume(&reading())), Err(Error::Transport));
    }
}
