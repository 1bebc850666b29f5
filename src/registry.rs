//! Channel table: which output channels exist and which of them came up.

use crate::config::MAX_CHANNELS;
use crate::error::Error;

/// Output channel identity. Doubles as the slot index in every per-channel table.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ChannelId {
    Uart = 0,
    ShortRangeRadio = 1,
    WideAreaRadio = 2,
    PointToPointRadio = 3,
}

impl ChannelId {
    pub const ALL: [ChannelId; MAX_CHANNELS] = [
        Self::Uart,
        Self::ShortRangeRadio,
        Self::WideAreaRadio,
        Self::PointToPointRadio,
    ];

    pub const fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }
}

/// Init entry point of a channel, run once at startup.
pub type InitFn = fn() -> Result<(), Error>;

#[derive(Clone, Copy)]
pub struct ChannelDescriptor {
    pub id: ChannelId,
    pub init: InitFn,
}

/// Set of channels taking part in fan-out, as a bit mask over `ChannelId`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ActiveChannels(u8);

impl ActiveChannels {
    pub const fn empty() -> Self {
        Self(0)
    }

    pub fn from_ids(ids: &[ChannelId]) -> Self {
        let mut set = Self::empty();
        for &id in ids {
            set.insert(id);
        }
        set
    }

    pub fn insert(&mut self, id: ChannelId) {
        self.0 |= 1 << id.index();
    }

    pub fn contains(&self, id: ChannelId) -> bool {
        self.0 & (1 << id.index()) != 0
    }

    pub fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn iter(self) -> impl Iterator<Item = ChannelId> {
        ChannelId::ALL.into_iter().filter(move |id| self.contains(*id))
    }
}

/// Fixed-size table indexed by `ChannelId`. Unregistered slots are inert.
pub struct ChannelRegistry {
    slots: [Option<ChannelDescriptor>; MAX_CHANNELS],
}

impl Default for ChannelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelRegistry {
    pub const fn new() -> Self {
        Self {
            slots: [None; MAX_CHANNELS],
        }
    }

    /// Claims the slot for `id`. A slot is never overwritten.
    pub fn register(&mut self, id: ChannelId, init: InitFn) -> Result<(), Error> {
        let slot = &mut self.slots[id.index()];
        if slot.is_some() {
            warn!("channel {:?} registered twice", id);
            return Err(Error::AlreadyRegistered);
        }
        *slot = Some(ChannelDescriptor { id, init });
        Ok(())
    }

    pub fn is_registered(&self, id: ChannelId) -> bool {
        self.slots[id.index()].is_some()
    }

    /// Number of registered channels.
    pub fn len(&self) -> usize {
        self.slots.iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Visits registered slots in id order.
    pub fn for_each_active(&self, mut f: impl FnMut(&ChannelDescriptor)) {
        self.slots.iter().flatten().for_each(|desc| f(desc));
    }

    /// Runs every registered init; channels whose init fails stay out of the active set.
    pub fn init_all(&self) -> ActiveChannels {
        let mut active = ActiveChannels::empty();
        self.for_each_active(|desc| match (desc.init)() {
            Ok(()) => {
                info!("channel {:?} up", desc.id);
                active.insert(desc.id);
            }
            Err(e) => error!("channel {:?} init failed: {:?}", desc.id, e),
        });
        active
    }
}
