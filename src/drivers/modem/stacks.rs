//! The two protocol personalities of the modem.

use embedded_io_async::{Read, Write};
use heapless::String;

use super::driver::Modem;
use super::protocol::{self as p, command, push_hex};
use crate::config::RadioConfig;
use crate::error::Error;
use crate::radio::ProtocolStack;

const TIME_MAX: usize = 40;

/* ------------------------------------------------------------------------- */
/*  Wide area (LoRaWAN)                                                      */
/* ------------------------------------------------------------------------- */

/// LoRaWAN class A uplinks. The node is expected to have joined already.
pub struct LoRaWanStack {
    data_rate: u8,
    port: u8,
    network_time: Option<String<TIME_MAX>>,
}

impl Default for LoRaWanStack {
    fn default() -> Self {
        Self::new()
    }
}

impl LoRaWanStack {
    pub const fn new() -> Self {
        Self {
            data_rate: 0,
            port: 2,
            network_time: None,
        }
    }

    /// Largest uplink at the configured data rate.
    pub fn max_payload(&self) -> usize {
        p::EU868_MAX_PAYLOAD[self.data_rate as usize]
    }

    /// Network time from the last successful clock sync, as reported by the modem.
    pub fn network_time(&self) -> Option<&str> {
        self.network_time.as_deref()
    }
}

impl<T: Read + Write> ProtocolStack<Modem<T>> for LoRaWanStack {
    async fn configure(&mut self, modem: &mut Modem<T>, config: &RadioConfig) -> Result<(), Error> {
        let max_dr = (p::EU868_MAX_PAYLOAD.len() - 1) as u8;
        let data_rate = if config.data_rate > max_dr {
            warn!("data rate {} clamped to {}", config.data_rate, max_dr);
            max_dr
        } else {
            config.data_rate
        };

        modem
            .command(&command(format_args!("{}={}", p::NETWORK_MODE, p::NWM_LORAWAN))?)
            .await?;
        modem
            .command(&command(format_args!("{}={}", p::DATA_RATE, data_rate))?)
            .await?;
        self.data_rate = data_rate;
        self.port = config.port;
        info!("lorawan: DR{}, port {}", data_rate, config.port);
        Ok(())
    }

    async fn transmit(&mut self, modem: &mut Modem<T>, frame: &[u8]) -> Result<(), Error> {
        if frame.len() > self.max_payload() {
            return Err(Error::ItemTooLarge);
        }
        let mut cmd = command(format_args!("{}={}:", p::SEND, self.port))?;
        push_hex(&mut cmd, frame)?;
        modem.command(&cmd).await
    }

    async fn sync_clock(&mut self, modem: &mut Modem<T>) -> Result<(), Error> {
        modem
            .command(&command(format_args!("{}=1", p::TIME_REQUEST))?)
            .await?;
        modem
            .command(&command(format_args!("{}=?", p::LOCAL_TIME))?)
            .await?;

        let reply = modem.response();
        let time = reply
            .strip_prefix(p::LOCAL_TIME_PREFIX)
            .and_then(|t| core::str::from_utf8(t).ok())
            .ok_or(Error::Transport)?;
        let mut stored = String::new();
        stored.push_str(time).map_err(|_| Error::BufferFull)?;
        info!("network time {}", time);
        self.network_time = Some(stored);
        Ok(())
    }

    fn max_payload(&self) -> usize {
        LoRaWanStack::max_payload(self)
    }
}

/* ------------------------------------------------------------------------- */
/*  Point to point (raw LoRa)                                                */
/* ------------------------------------------------------------------------- */

/// Raw LoRa between two nodes. No network, hence no clock sync.
#[derive(Debug, Default)]
pub struct LoRaP2pStack {
    configured: bool,
}

impl LoRaP2pStack {
    pub const fn new() -> Self {
        Self { configured: false }
    }
}

impl<T: Read + Write> ProtocolStack<Modem<T>> for LoRaP2pStack {
    async fn configure(&mut self, modem: &mut Modem<T>, config: &RadioConfig) -> Result<(), Error> {
        self.configured = false;
        modem
            .command(&command(format_args!("{}={}", p::NETWORK_MODE, p::NWM_P2P))?)
            .await?;
        modem
            .command(&command(format_args!(
                "{}={}:{}:{}:{}:{}:{}",
                p::P2P_CONFIG,
                config.frequency_hz,
                config.spreading_factor,
                config.bandwidth_khz,
                config.coding_rate,
                config.preamble_len,
                config.tx_power_dbm
            ))?)
            .await?;
        self.configured = true;
        info!(
            "p2p: {} Hz SF{} BW{}",
            config.frequency_hz,
            config.spreading_factor,
            config.bandwidth_khz
        );
        Ok(())
    }

    async fn transmit(&mut self, modem: &mut Modem<T>, frame: &[u8]) -> Result<(), Error> {
        if !self.configured {
            return Err(Error::Transport);
        }
        if frame.len() > p::P2P_MAX_PAYLOAD {
            return Err(Error::ItemTooLarge);
        }
        let mut cmd = command(format_args!("{}=", p::P2P_SEND))?;
        push_hex(&mut cmd, frame)?;
        modem.command(&cmd).await
    }

    fn max_payload(&self) -> usize {
        p::P2P_MAX_PAYLOAD
    }
}
