// Centralize all configuration constants
use embassy_time::Duration;

/// Channel slots in the registry, one per `ChannelId`.
pub const MAX_CHANNELS: usize = 4;
/// Payload words carried by a single `DataUnit`.
pub const MAX_WORDS: usize = 64;

// Arena sizes (bytes, headers included)
pub const BUFFER_ARENA_SIZE: usize = 2048;
pub const CHANNEL_ARENA_SIZE: usize = 1024;

// Frame and encoder scratch sizes
pub const FRAME_CAPACITY: usize = 256;
pub const MAX_ENCODED_LEN: usize = 768;

// Every active channel may post at most one completion per item; the slack absorbs a
// channel that completes twice instead of blocking it.
pub const COMPLETION_QUEUE_DEPTH: usize = 2 * MAX_CHANNELS;

pub const DEFAULT_TRANSMISSION_INTERVAL_MS: u32 = 30_000;
pub const SENSOR_SAMPLE_PERIOD_MS: u64 = 10_000;
/// Wide-area network time refresh.
pub const CLOCK_SYNC_PERIOD_S: u64 = 6 * 3600;

pub const SERIAL_BAUDRATE: u32 = 115_200;
pub const MODEM_BAUDRATE: u32 = 115_200;
pub const I2C_FREQUENCY_HZ: u32 = 100_000;

// Radio transmit retries (per frame)
pub const RADIO_SEND_ATTEMPTS: u8 = 3;
pub const RADIO_RETRY_DELAY_MS: u64 = 250;

/// Runtime knobs of the fan-out pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PipelineConfig {
    /// Sleep between two drain cycles.
    pub transmission_interval_ms: u32,
    /// Upper bound on the completion barrier. `None` waits forever.
    pub barrier_timeout: Option<Duration>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            transmission_interval_ms: DEFAULT_TRANSMISSION_INTERVAL_MS,
            barrier_timeout: None,
        }
    }
}

/// When a radio channel pushes assembled frames out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AssemblyPolicy {
    /// Flush after every item instead of coalescing (one item per frame).
    pub single_item: bool,
    /// Flush a partially filled frame once the channel's ring runs dry.
    pub flush_on_idle: bool,
}

/// Long-range modem parameters. Each protocol stack reads the fields it needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RadioConfig {
    pub frequency_hz: u32,
    pub spreading_factor: u8,
    /// Bandwidth in kHz (125, 250, 500).
    pub bandwidth_khz: u16,
    /// Coding rate 4/(5 + n), n in 0..=3.
    pub coding_rate: u8,
    pub preamble_len: u16,
    pub tx_power_dbm: u8,
    /// Wide-area data rate index.
    pub data_rate: u8,
    /// Wide-area application port.
    pub port: u8,
}

impl Default for RadioConfig {
    fn default() -> Self {
        Self {
            frequency_hz: 868_000_000,
            spreading_factor: 7,
            bandwidth_khz: 125,
            coding_rate: 0,
            preamble_len: 8,
            tx_power_dbm: 14,
            data_rate: 3,
            port: 2,
        }
    }
}
