use core::fmt;

/* ------------------------------------------------------------------------- */
/*  Error enum                                                               */
/* ------------------------------------------------------------------------- */
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// Nothing buffered.
    Empty,
    /// A single item can never fit the arena or frame it is meant for.
    ItemTooLarge,
    /// More than `MAX_WORDS` payload words.
    TooManyWords,
    /// Header or size bookkeeping does not match the stored bytes.
    Corrupt,
    /// Channel slot already taken.
    AlreadyRegistered,
    /// Caller already owns the radio.
    Busy,
    /// Caller does not own the radio.
    PermissionDenied,
    /// Operation not offered by this protocol stack.
    NotImplemented,
    Timeout,
    /// Encoder rejected the item.
    Encoding,
    UnsupportedFormat,
    /// Output buffer too small.
    BufferFull,
    /// Transport (UART, modem, radio) failure.
    Transport,
    /// Sensor did not deliver a valid sample.
    Sensor,
}

impl Error {
    /// Stable one-byte code, stored in the aux byte of failed readings.
    pub const fn code(self) -> u8 {
        match self {
            Self::Empty => 1,
            Self::ItemTooLarge => 2,
            Self::TooManyWords => 3,
            Self::Corrupt => 4,
            Self::AlreadyRegistered => 5,
            Self::Busy => 6,
            Self::PermissionDenied => 7,
            Self::NotImplemented => 8,
            Self::Timeout => 9,
            Self::Encoding => 10,
            Self::UnsupportedFormat => 11,
            Self::BufferFull => 12,
            Self::Transport => 13,
            Self::Sensor => 14,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Self::Empty => "buffer empty",
            Self::ItemTooLarge => "item larger than capacity",
            Self::TooManyWords => "too many payload words",
            Self::Corrupt => "corrupt buffer item",
            Self::AlreadyRegistered => "channel already registered",
            Self::Busy => "radio already owned by caller",
            Self::PermissionDenied => "caller does not own the radio",
            Self::NotImplemented => "not implemented",
            Self::Timeout => "timed out",
            Self::Encoding => "encoding failed",
            Self::UnsupportedFormat => "unsupported format",
            Self::BufferFull => "output buffer full",
            Self::Transport => "transport failure",
            Self::Sensor => "sensor failure",
        };
        f.write_str(msg)
    }
}
