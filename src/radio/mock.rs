//! In-memory transceiver and stacks for unit tests.

use std::vec::Vec;

use super::{ProtocolStack, RadioUser};
use crate::config::RadioConfig;
use crate::error::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Configured(RadioUser, u8),
    Sent(RadioUser, Vec<u8>),
    Synced(RadioUser),
}

/// Records everything that reached the "air".
#[derive(Debug, Default)]
pub struct Air {
    pub events: Vec<Event>,
}

pub struct MockStack {
    pub user: RadioUser,
    /// Payload limit per data-rate step; `max_payload = step * (data_rate + 1)`.
    pub step: usize,
    pub max: usize,
    pub clock_sync: bool,
    /// Transmissions to fail before succeeding again.
    pub fail_sends: u8,
}

impl MockStack {
    pub fn new(user: RadioUser, step: usize) -> Self {
        Self {
            user,
            step,
            max: 0,
            clock_sync: user == RadioUser::WideArea,
            fail_sends: 0,
        }
    }
}

impl ProtocolStack<Air> for MockStack {
    async fn configure(&mut self, device: &mut Air, config: &RadioConfig) -> Result<(), Error> {
        device.events.push(Event::Configured(self.user, config.data_rate));
        self.max = self.step * (config.data_rate as usize + 1);
        Ok(())
    }

    async fn transmit(&mut self, device: &mut Air, frame: &[u8]) -> Result<(), Error> {
        if self.fail_sends > 0 {
            self.fail_sends -= 1;
            return Err(Error::Transport);
        }
        device.events.push(Event::Sent(self.user, frame.to_vec()));
        Ok(())
    }

    async fn sync_clock(&mut self, device: &mut Air) -> Result<(), Error> {
        if !self.clock_sync {
            return Err(Error::NotImplemented);
        }
        device.events.push(Event::Synced(self.user));
        Ok(())
    }

    fn max_payload(&self) -> usize {
        self.max
    }
}
