//! Inter-task signalling between the fan-out coordinator and the channel consumers.
//!
//! * one "item ready" signal per channel slot,
//! * one shared completion queue every consumer posts to exactly once per item,
//! * the staging slot holding the item currently being fanned out.
//!
//! The staging slot has a single writer (the coordinator) and is only rewritten after every
//! active channel posted its completion, so readers never race the writer. Each staged item
//! gets a sequence number and completions carry it back, so a completion arriving after a
//! barrier timeout cannot be counted for the next item.

use core::cell::RefCell;

use embassy_sync::blocking_mutex::{raw::RawMutex, Mutex};
use embassy_sync::channel::Channel;
use embassy_sync::signal::Signal;

use crate::config::{COMPLETION_QUEUE_DEPTH, MAX_CHANNELS};
use crate::data::DataUnit;
use crate::error::Error;
use crate::registry::ChannelId;

/// One channel finished with the item staged under `seq`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Completion {
    pub id: ChannelId,
    pub seq: u32,
}

struct Staged {
    seq: u32,
    unit: Option<DataUnit>,
}

pub struct SyncSet<M: RawMutex> {
    ready: [Signal<M, ()>; MAX_CHANNELS],
    processed: Channel<M, Completion, COMPLETION_QUEUE_DEPTH>,
    staging: Mutex<M, RefCell<Staged>>,
}

impl<M: RawMutex> Default for SyncSet<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: RawMutex> SyncSet<M> {
    pub fn new() -> Self {
        Self {
            ready: core::array::from_fn(|_| Signal::new()),
            processed: Channel::new(),
            staging: Mutex::new(RefCell::new(Staged { seq: 0, unit: None })),
        }
    }

    /* ---- coordinator side ---- */

    /// Replaces the staged item and returns its sequence number.
    pub fn stage(&self, unit: DataUnit) -> u32 {
        self.staging.lock(|slot| {
            let mut slot = slot.borrow_mut();
            slot.seq = slot.seq.wrapping_add(1);
            slot.unit = Some(unit);
            slot.seq
        })
    }

    pub fn notify(&self, id: ChannelId) {
        self.ready[id.index()].signal(());
    }

    /// Next completion posted by any channel.
    pub async fn wait_processed(&self) -> Completion {
        self.processed.receive().await
    }

    /// Completions posted but not yet consumed by the coordinator.
    pub fn pending_completions(&self) -> usize {
        self.processed.len()
    }

    /* ---- consumer side ---- */

    pub async fn wait_ready(&self, id: ChannelId) {
        self.ready[id.index()].wait().await
    }

    /// Copy of the staged item with its sequence number.
    pub fn staged(&self) -> Option<(u32, DataUnit)> {
        self.staging.lock(|slot| {
            let slot = slot.borrow();
            slot.unit.clone().map(|unit| (slot.seq, unit))
        })
    }

    /// Sequence number of the item currently staged.
    pub fn current_seq(&self) -> u32 {
        self.staging.lock(|slot| slot.borrow().seq)
    }

    pub fn complete(&self, id: ChannelId, seq: u32) -> Result<(), Error> {
        self.processed.try_send(Completion { id, seq }).map_err(|_| {
            error!("completion queue overflow from {:?}", id);
            Error::BufferFull
        })
    }
}
