//! Frame assembly for size-limited radios.
//!
//! Encoded items wait in a channel-local ring. The assembler peeks at the next item's size
//! and only takes it once it is known to fit the current frame, so an item is never pulled out
//! of the ring just to be put back (and possibly evicted).
//!
//! Item boundaries inside the frame are remembered. When the payload limit shrinks under an
//! assembled frame, only the longest run of whole items that fits goes out; the rest is carried
//! into the next frame.

use heapless::Vec;

use crate::buffer::TypedRingBuffer;
use crate::error::Error;

/// Outcome of one packing step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Packing {
    /// An item of `len` bytes was appended to the frame.
    Packed { len: usize },
    /// The next item does not fit; flush the frame, advance, then pack again.
    FrameFull,
    /// The next item is larger than `max_payload` on its own. It now sits alone in the frame;
    /// flush it as a standalone frame.
    Standalone,
    /// Nothing left to pack.
    Empty,
}

pub struct PackageAssembler<const CAP: usize> {
    frame: [u8; CAP],
    cursor: usize,
    available: usize,
    max_payload: usize,
    /// End offset of every item in `frame`.
    ends: Vec<u16, CAP>,
}

impl<const CAP: usize> PackageAssembler<CAP> {
    pub fn new(max_payload: usize) -> Self {
        let max_payload = Self::clamp(max_payload);
        Self {
            frame: [0; CAP],
            cursor: 0,
            available: max_payload,
            max_payload,
            ends: Vec::new(),
        }
    }

    /// Tries to move the next item of `source` into the frame.
    pub fn pack_next<const N: usize>(
        &mut self,
        source: &mut TypedRingBuffer<N>,
    ) -> Result<Packing, Error> {
        if source.is_empty() {
            return Ok(Packing::Empty);
        }

        let size = match source.peek_header() {
            Ok(header) => header.len,
            Err(e) => {
                warn!("unreadable item header ({:?}), assuming a full frame", e);
                self.max_payload
            }
        };

        if size > self.available || self.ends.is_full() {
            if !self.ends.is_empty() {
                return Ok(Packing::FrameFull);
            }
            if size > self.max_payload {
                return self.take_standalone(source, size);
            }
        }

        match source.take_raw(&mut self.frame[self.cursor..]) {
            Ok(header) => {
                self.cursor += header.len;
                self.available = self.available.saturating_sub(header.len);
                let _ = self.ends.push(self.cursor as u16);
                Ok(Packing::Packed { len: header.len })
            }
            Err(Error::Corrupt) => {
                error!("dropping unreadable channel buffer");
                source.clear();
                Err(Error::Corrupt)
            }
            Err(e) => Err(e),
        }
    }

    fn take_standalone<const N: usize>(
        &mut self,
        source: &mut TypedRingBuffer<N>,
        size: usize,
    ) -> Result<Packing, Error> {
        if size > CAP {
            error!(
                "dropping {} byte item, frame buffer holds {}",
                size,
                CAP
            );
            source.discard_oldest()?;
            return Err(Error::ItemTooLarge);
        }
        warn!(
            "{} byte item exceeds max payload {}, sending alone",
            size,
            self.max_payload
        );
        let header = source.take_raw(&mut self.frame)?;
        self.cursor = header.len;
        self.available = 0;
        self.ends.clear();
        let _ = self.ends.push(self.cursor as u16);
        Ok(Packing::Standalone)
    }

    /// The next frame to send: every whole item that fits `max_payload`, or the first item
    /// alone when even that one does not.
    pub fn frame(&self) -> &[u8] {
        &self.frame[..self.frame_len()]
    }

    /// Items in [`Self::frame`].
    pub fn frame_items(&self) -> usize {
        let len = self.frame_len();
        self.ends.iter().take_while(|&&end| end as usize <= len).count()
    }

    /// Drops the bytes returned by [`Self::frame`]. Items that did not fit move to the front
    /// and start the next frame.
    pub fn advance(&mut self) {
        let sent = self.frame_len();
        self.frame.copy_within(sent..self.cursor, 0);
        self.cursor -= sent;
        self.ends.retain(|&end| end as usize > sent);
        for end in self.ends.iter_mut() {
            *end -= sent as u16;
        }
        if self.cursor > 0 {
            debug!("{} byte(s) carried into the next frame", self.cursor);
        }
        self.available = self.max_payload.saturating_sub(self.cursor);
    }

    /// More is assembled than one frame may carry; flush again before packing.
    pub fn is_overfull(&self) -> bool {
        self.cursor > self.max_payload
    }

    /// Adopts a new payload limit (e.g. after a data-rate change). A frame already larger than
    /// the new limit reports `FrameFull` on the next step and is split on item boundaries.
    pub fn set_max_payload(&mut self, max_payload: usize) {
        self.max_payload = Self::clamp(max_payload);
        self.available = self.max_payload.saturating_sub(self.cursor);
    }

    pub fn max_payload(&self) -> usize {
        self.max_payload
    }

    /// Room left in the current frame.
    pub fn available(&self) -> usize {
        self.available
    }

    /// Bytes assembled, including any carried past the next frame.
    pub fn len(&self) -> usize {
        self.cursor
    }

    pub fn is_empty(&self) -> bool {
        self.ends.is_empty()
    }

    /// Items assembled, including any carried past the next frame.
    pub fn item_count(&self) -> usize {
        self.ends.len()
    }

    fn frame_len(&self) -> usize {
        self.ends
            .iter()
            .rev()
            .map(|&end| end as usize)
            .find(|&end| end <= self.max_payload)
            .or_else(|| self.ends.first().map(|&end| end as usize))
            .unwrap_or(0)
    }

    fn clamp(max_payload: usize) -> usize {
        if max_payload > CAP {
            warn!("max payload {} clamped to {}", max_payload, CAP);
        }
        max_payload.min(CAP)
    }
}
