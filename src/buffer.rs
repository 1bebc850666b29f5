//! Typed ring buffer
//! =================
//!
//! A fixed byte arena holding variable-length items. Every item is stored as a 4-byte
//! header (type tag, aux byte, payload length) followed by its payload, and may wrap around the
//! end of the arena. Inserting never blocks: when the arena lacks room the oldest items are
//! evicted until the new one fits.

use core::cell::RefCell;

use bytemuck::{Pod, Zeroable};
use embassy_sync::blocking_mutex::{raw::RawMutex, Mutex};
use heapless::Vec;

use crate::config::MAX_WORDS;
use crate::data::{DataType, DataUnit};
use crate::error::Error;

/// Bytes taken by an item header inside the arena.
pub const HEADER_SIZE: usize = core::mem::size_of::<RawHeader>();

/// On-arena header layout.
#[repr(C)]
#[derive(Clone, Copy, Zeroable, Pod)]
struct RawHeader {
    data_type: u8,
    aux: u8,
    len: u16,
}

/// Decoded header of the next stored item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ItemHeader {
    pub data_type: DataType,
    pub aux: u8,
    /// Payload length in bytes.
    pub len: usize,
}

impl ItemHeader {
    /// Number of 32-bit words the payload spans.
    pub fn word_count(&self) -> usize {
        self.len.div_ceil(4)
    }

    /// Arena bytes taken by the whole item.
    pub fn stored_size(&self) -> usize {
        HEADER_SIZE + self.len
    }
}

/* ------------------------------------------------------------------------- */
/*  Ring                                                                     */
/* ------------------------------------------------------------------------- */
pub struct TypedRingBuffer<const N: usize> {
    arena: [u8; N],
    /// Offset of the oldest item.
    head: usize,
    /// Bytes in use, headers included.
    used: usize,
    items: usize,
    evicted: u32,
}

impl<const N: usize> Default for TypedRingBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> TypedRingBuffer<N> {
    pub const fn new() -> Self {
        Self {
            arena: [0; N],
            head: 0,
            used: 0,
            items: 0,
            evicted: 0,
        }
    }

    /* ================= producer side ============================ */

    /// Stores a reading, evicting the oldest items if needed.
    pub fn insert(&mut self, unit: &DataUnit) -> Result<(), Error> {
        self.insert_raw(
            unit.data_type(),
            unit.aux(),
            bytemuck::cast_slice(unit.words()),
        )
    }

    /// Stores an arbitrary byte payload under the same header and eviction policy.
    ///
    /// Fails only when the item alone is larger than the whole arena.
    pub fn insert_raw(&mut self, data_type: DataType, aux: u8, payload: &[u8]) -> Result<(), Error> {
        let needed = HEADER_SIZE + payload.len();
        if payload.len() > u16::MAX as usize || needed > N {
            error!(
                "item of {} bytes can never fit a {} byte arena",
                needed,
                N
            );
            return Err(Error::ItemTooLarge);
        }

        while N - self.used < needed {
            self.discard_oldest()?;
            self.evicted = self.evicted.wrapping_add(1);
        }

        let header = RawHeader {
            data_type: data_type as u8,
            aux,
            len: payload.len() as u16,
        };
        let tail = (self.head + self.used) % N;
        self.write_at(tail, bytemuck::bytes_of(&header));
        self.write_at((tail + HEADER_SIZE) % N, payload);
        self.used += needed;
        self.items += 1;
        Ok(())
    }

    /* ================= consumer side ============================ */

    /// Header of the oldest item, without consuming it.
    pub fn peek_header(&self) -> Result<ItemHeader, Error> {
        if self.items == 0 {
            return Err(Error::Empty);
        }
        let mut raw = [0u8; HEADER_SIZE];
        self.read_at(self.head, &mut raw);
        let raw: RawHeader = bytemuck::pod_read_unaligned(&raw);

        let Some(data_type) = DataType::from_u8(raw.data_type) else {
            error!("unknown type tag {} in ring", raw.data_type);
            return Err(Error::Corrupt);
        };
        let header = ItemHeader {
            data_type,
            aux: raw.aux,
            len: raw.len as usize,
        };
        if header.stored_size() > self.used {
            error!("item of {} bytes overruns {} used", header.stored_size(), self.used);
            return Err(Error::Corrupt);
        }
        Ok(header)
    }

    /// Pops the oldest item as a reading.
    pub fn take(&mut self) -> Result<DataUnit, Error> {
        let header = self.peek_header()?;
        if header.len % 4 != 0 || header.word_count() > MAX_WORDS {
            error!("item of {} bytes is not a word payload", header.len);
            return Err(Error::Corrupt);
        }

        let mut words: Vec<u32, MAX_WORDS> = Vec::new();
        // Bounded by MAX_WORDS above
        let _ = words.resize(header.word_count(), 0);
        let bytes: &mut [u8] = bytemuck::cast_slice_mut(words.as_mut_slice());
        self.read_at((self.head + HEADER_SIZE) % N, bytes);
        self.advance(header.stored_size());

        Ok(DataUnit::from_parts(header.data_type, header.aux, words))
    }

    /// Pops the oldest item's payload into `out`. Nothing is consumed when `out` is too small.
    pub fn take_raw(&mut self, out: &mut [u8]) -> Result<ItemHeader, Error> {
        let header = self.peek_header()?;
        if out.len() < header.len {
            return Err(Error::BufferFull);
        }
        self.read_at((self.head + HEADER_SIZE) % N, &mut out[..header.len]);
        self.advance(header.stored_size());
        Ok(header)
    }

    /// Drops the oldest item.
    pub fn discard_oldest(&mut self) -> Result<ItemHeader, Error> {
        let header = self.peek_header()?;
        self.advance(header.stored_size());
        Ok(header)
    }

    pub fn clear(&mut self) {
        self.head = 0;
        self.used = 0;
        self.items = 0;
    }

    /* ================= accounting =============================== */

    pub fn is_empty(&self) -> bool {
        self.items == 0
    }

    /// Items currently stored.
    pub fn len(&self) -> usize {
        self.items
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    /// Payload bytes buffered, headers excluded.
    pub fn used_bytes_excluding_headers(&self) -> usize {
        self.used - self.items * HEADER_SIZE
    }

    /// Items lost to eviction since creation.
    pub fn evicted(&self) -> u32 {
        self.evicted
    }

    /* ================= arena helpers ============================ */

    fn advance(&mut self, stored: usize) {
        self.items -= 1;
        if self.items == 0 {
            self.head = 0;
            self.used = 0;
        } else {
            self.head = (self.head + stored) % N;
            self.used -= stored;
        }
    }

    /// Overwrites the oldest item's type tag with one no reader knows.
    #[cfg(test)]
    pub(crate) fn corrupt_head(&mut self) {
        self.arena[self.head] = 0xFF;
    }

    fn write_at(&mut self, pos: usize, bytes: &[u8]) {
        let first = bytes.len().min(N - pos);
        self.arena[pos..pos + first].copy_from_slice(&bytes[..first]);
        self.arena[..bytes.len() - first].copy_from_slice(&bytes[first..]);
    }

    fn read_at(&self, pos: usize, out: &mut [u8]) {
        let first = out.len().min(N - pos);
        let len = out.len();
        out[..first].copy_from_slice(&self.arena[pos..pos + first]);
        out[first..].copy_from_slice(&self.arena[..len - first]);
    }
}

/* ------------------------------------------------------------------------- */
/*  Shared wrapper                                                           */
/* ------------------------------------------------------------------------- */

/// Ring behind a blocking mutex, shared by the sensor tasks (insert) and the fan-out
/// coordinator (take). Every call holds the lock for one ring operation only.
pub struct SharedRingBuffer<M: RawMutex, const N: usize> {
    inner: Mutex<M, RefCell<TypedRingBuffer<N>>>,
}

impl<M: RawMutex, const N: usize> Default for SharedRingBuffer<M, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: RawMutex, const N: usize> SharedRingBuffer<M, N> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(RefCell::new(TypedRingBuffer::new())),
        }
    }

    pub fn insert(&self, unit: &DataUnit) -> Result<(), Error> {
        self.with(|ring| {
            let before = ring.evicted();
            let res = ring.insert(unit);
            let lost = ring.evicted().wrapping_sub(before);
            if lost > 0 {
                warn!("ring full: evicted {} oldest item(s)", lost);
            }
            res
        })
    }

    pub fn take(&self) -> Result<DataUnit, Error> {
        self.with(|ring| ring.take())
    }

    pub fn peek_header(&self) -> Result<ItemHeader, Error> {
        self.with(|ring| ring.peek_header())
    }

    pub fn is_empty(&self) -> bool {
        self.with(|ring| ring.is_empty())
    }

    pub fn len(&self) -> usize {
        self.with(|ring| ring.len())
    }

    pub fn used_bytes_excluding_headers(&self) -> usize {
        self.with(|ring| ring.used_bytes_excluding_headers())
    }

    pub fn evicted(&self) -> u32 {
        self.with(|ring| ring.evicted())
    }

    fn with<R>(&self, f: impl FnOnce(&mut TypedRingBuffer<N>) -> R) -> R {
        self.inner.lock(|cell| f(&mut cell.borrow_mut()))
    }
}
