//! The shared long-range transceiver and the two protocol stacks competing for it.

mod arbiter;
#[cfg(test)]
pub(crate) mod mock;

use core::future::Future;

pub use arbiter::SharedRadioArbiter;

use crate::config::RadioConfig;
use crate::error::Error;
use crate::registry::ChannelId;

/// Channels that may own the long-range transceiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RadioUser {
    WideArea,
    PointToPoint,
}

impl RadioUser {
    pub const fn channel(self) -> ChannelId {
        match self {
            Self::WideArea => ChannelId::WideAreaRadio,
            Self::PointToPoint => ChannelId::PointToPointRadio,
        }
    }

    pub const fn other(self) -> Self {
        match self {
            Self::WideArea => Self::PointToPoint,
            Self::PointToPoint => Self::WideArea,
        }
    }
}

/// One protocol personality of the transceiver `D`.
///
/// A stack never keeps a handle on the device; the arbiter lends it for each call.
pub trait ProtocolStack<D> {
    /// Puts the device into this protocol's mode.
    fn configure(
        &mut self,
        device: &mut D,
        config: &RadioConfig,
    ) -> impl Future<Output = Result<(), Error>>;

    fn transmit(&mut self, device: &mut D, frame: &[u8]) -> impl Future<Output = Result<(), Error>>;

    fn sync_clock(&mut self, device: &mut D) -> impl Future<Output = Result<(), Error>> {
        let _ = device;
        async { Err(Error::NotImplemented) }
    }

    /// Largest frame the current configuration accepts.
    fn max_payload(&self) -> usize;
}
