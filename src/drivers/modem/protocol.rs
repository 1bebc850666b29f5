// AT command set of the long-range modem (RAK3172-style firmware).

use core::fmt::{self, Write as _};

use heapless::String;

use crate::config::FRAME_CAPACITY;
use crate::error::Error;

/* ───── Framing ─────────────────────────────────────────────────────── */
pub const LINE_END: &[u8] = b"\r\n";
pub const LINE_MAX: usize = 128;
pub const RX_BUF_LEN: usize = 256;

/// Longest command: prefix, port, separator and a hex-encoded full frame.
pub const CMD_MAX: usize = 32 + 2 * FRAME_CAPACITY;

pub type Command = String<CMD_MAX>;

/* ───── Commands ────────────────────────────────────────────────────── */
pub const AT: &str = "AT";
pub const NETWORK_MODE: &str = "AT+NWM";
pub const DATA_RATE: &str = "AT+DR";
pub const SEND: &str = "AT+SEND";
pub const TIME_REQUEST: &str = "AT+TIMEREQ";
pub const LOCAL_TIME: &str = "AT+LTIME";
pub const P2P_CONFIG: &str = "AT+P2P";
pub const P2P_SEND: &str = "AT+PSEND";

pub const NWM_P2P: u8 = 0;
pub const NWM_LORAWAN: u8 = 1;

/* ───── Replies ─────────────────────────────────────────────────────── */
pub const REPLY_OK: &[u8] = b"OK";
pub const REPLY_ERROR: &[u8] = b"ERROR";
/// Every status code other than OK starts with this (AT_ERROR, AT_PARAM_ERROR, AT_BUSY_ERROR…).
pub const STATUS_PREFIX: &[u8] = b"AT_";
pub const EVENT_PREFIX: &[u8] = b"+EVT:";
pub const LOCAL_TIME_PREFIX: &[u8] = b"LTIME:";

/* ───── Payload limits ──────────────────────────────────────────────── */
/// EU868 max application payload per data rate (DR0..DR7).
pub const EU868_MAX_PAYLOAD: [usize; 8] = [51, 51, 51, 115, 222, 222, 222, 222];
pub const P2P_MAX_PAYLOAD: usize = 255;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Reply {
    Blank,
    Ok,
    Error,
    /// Unsolicited `+EVT:` notification.
    Event,
    /// Anything else: query results, echo.
    Data,
}

pub fn classify(line: &[u8]) -> Reply {
    if line.is_empty() {
        Reply::Blank
    } else if line == REPLY_OK {
        Reply::Ok
    } else if line == REPLY_ERROR || line.starts_with(STATUS_PREFIX) {
        Reply::Error
    } else if line.starts_with(EVENT_PREFIX) {
        Reply::Event
    } else {
        Reply::Data
    }
}

/// Formats a command into a fresh buffer.
pub fn command(args: fmt::Arguments<'_>) -> Result<Command, Error> {
    let mut cmd = Command::new();
    cmd.write_fmt(args).map_err(|_| Error::BufferFull)?;
    Ok(cmd)
}

/// Appends `bytes` as upper-case hex.
pub fn push_hex(cmd: &mut Command, bytes: &[u8]) -> Result<(), Error> {
    for b in bytes {
        write!(cmd, "{:02X}", b).map_err(|_| Error::BufferFull)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_replies() {
        assert_eq!(classify(b""), Reply::Blank);
        assert_eq!(classify(b"OK"), Reply::Ok);
        assert_eq!(classify(b"AT_BUSY_ERROR"), Reply::Error);
        assert_eq!(classify(b"AT_NO_NETWORK_JOINED"), Reply::Error);
        assert_eq!(classify(b"+EVT:TX_DONE"), Reply::Event);
        assert_eq!(classify(b"LTIME:00h00m05s"), Reply::Data);
    }

    #[test]
    fn hex_payload() {
        let mut cmd = command(format_args!("{}={}:", SEND, 2)).unwrap();
        push_hex(&mut cmd, &[0x0A, 0xFF, 0x00]).unwrap();
        assert_eq!(cmd.as_str(), "AT+SEND=2:0AFF00");
    }

    #[test]
    fn largest_frame_fits_a_command() {
        let mut cmd = command(format_args!("{}=", P2P_SEND)).unwrap();
        push_hex(&mut cmd, &[0x55; FRAME_CAPACITY]).unwrap();
        assert_eq!(cmd.len(), P2P_SEND.len() + 1 + 2 * FRAME_CAPACITY);
    }
}
