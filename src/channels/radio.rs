//! Long-range radio output, one instance per protocol sharing the transceiver.
//!
//! Every reading is encoded and parked in a channel-local ring. The ring is then packed into
//! frames bounded by the stack's current max payload; a frame goes out when the next item no
//! longer fits (or right away / on idle, depending on the `AssemblyPolicy`). The radio is
//! claimed for the duration of one pump and released afterwards so the other protocol gets
//! its turn.

use embassy_sync::blocking_mutex::raw::RawMutex;

use super::ChannelSink;
use crate::buffer::TypedRingBuffer;
use crate::config::{AssemblyPolicy, RadioConfig, CHANNEL_ARENA_SIZE, FRAME_CAPACITY};
use crate::data::DataUnit;
use crate::encode::{Encoded, Encoder, Format, WordEncoder};
use crate::error::Error;
use crate::package::{PackageAssembler, Packing};
use crate::radio::{ProtocolStack, RadioUser, SharedRadioArbiter};
use crate::retry::Retry;

pub struct RadioChannel<'a, M: RawMutex, D, W, P, E = WordEncoder> {
    arbiter: &'a SharedRadioArbiter<M, D, W, P>,
    user: RadioUser,
    config: RadioConfig,
    encoder: E,
    format: Format,
    policy: AssemblyPolicy,
    retry: Retry,
    pending: TypedRingBuffer<CHANNEL_ARENA_SIZE>,
    assembler: PackageAssembler<FRAME_CAPACITY>,
    scratch: Encoded,
    frames_sent: u32,
}

impl<'a, M, D, W, P> RadioChannel<'a, M, D, W, P>
where
    M: RawMutex,
    W: ProtocolStack<D>,
    P: ProtocolStack<D>,
{
    pub fn new(
        arbiter: &'a SharedRadioArbiter<M, D, W, P>,
        user: RadioUser,
        config: RadioConfig,
    ) -> Self {
        Self::with_encoder(arbiter, user, config, WordEncoder)
    }
}

impl<'a, M, D, W, P, E> RadioChannel<'a, M, D, W, P, E>
where
    M: RawMutex,
    W: ProtocolStack<D>,
    P: ProtocolStack<D>,
    E: Encoder,
{
    pub fn with_encoder(
        arbiter: &'a SharedRadioArbiter<M, D, W, P>,
        user: RadioUser,
        config: RadioConfig,
        encoder: E,
    ) -> Self {
        Self {
            arbiter,
            user,
            config,
            encoder,
            format: Format::CompactBinary,
            policy: AssemblyPolicy::default(),
            retry: Retry::default(),
            pending: TypedRingBuffer::new(),
            // Real limit is learned on the first claim
            assembler: PackageAssembler::new(FRAME_CAPACITY),
            scratch: Encoded::new(),
            frames_sent: 0,
        }
    }

    pub fn with_format(mut self, format: Format) -> Self {
        self.format = format;
        self
    }

    pub fn with_policy(mut self, policy: AssemblyPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_retry(mut self, retry: Retry) -> Self {
        self.retry = retry;
        self
    }

    pub fn user(&self) -> RadioUser {
        self.user
    }

    pub fn frames_sent(&self) -> u32 {
        self.frames_sent
    }

    /// Encoded items waiting for a frame.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Bytes sitting in the partially assembled frame.
    pub fn assembled_len(&self) -> usize {
        self.assembler.len()
    }

    pub fn max_payload(&self) -> usize {
        self.assembler.max_payload()
    }

    /// Pushes out whatever is assembled or pending, regardless of the policy.
    pub async fn flush_all(&mut self) -> Result<(), Error> {
        self.claim().await?;
        let mut res = self.drain().await;
        if res.is_ok() {
            res = self.flush().await;
        }
        self.release();
        res
    }

    /// Synchronises the node clock over this protocol, if it supports it.
    pub async fn sync_clock(&mut self) -> Result<(), Error> {
        self.claim().await?;
        let res = self.arbiter.sync_clock(self.user).await;
        self.release();
        res
    }

    /* ====== pump ====== */

    async fn pump(&mut self) -> Result<(), Error> {
        self.claim().await?;
        let res = self.drain().await;
        self.release();
        res
    }

    /// Packs the local ring into frames, flushing as the policy requires.
    async fn drain(&mut self) -> Result<(), Error> {
        let mut dropped = Ok(());
        loop {
            match self.assembler.pack_next(&mut self.pending) {
                Ok(Packing::Packed { .. }) if self.policy.single_item => self.flush().await?,
                Ok(Packing::Packed { .. }) => {}
                Ok(Packing::FrameFull) | Ok(Packing::Standalone) => self.flush().await?,
                Ok(Packing::Empty) => {
                    if self.policy.flush_on_idle {
                        self.flush().await?;
                    }
                    return dropped;
                }
                // The oversized item is gone; keep packing the rest
                Err(Error::ItemTooLarge) => dropped = Err(Error::ItemTooLarge),
                Err(e) => return Err(e),
            }
        }
    }

    /// Sends the assembled frame, repeating while a shrunk limit leaves more than one frame's
    /// worth assembled. A frame is discarded once the retries are used up.
    async fn flush(&mut self) -> Result<(), Error> {
        while !self.assembler.is_empty() {
            self.send_frame().await?;
            if !self.assembler.is_overfull() {
                break;
            }
        }
        Ok(())
    }

    async fn send_frame(&mut self) -> Result<(), Error> {
        let (arbiter, user, config) = (self.arbiter, self.user, &self.config);
        let frame = self.assembler.frame();
        let (len, items) = (frame.len(), self.assembler.frame_items());

        let res = self
            .retry
            .run(|_| transmit(arbiter, user, config, frame))
            .await;
        self.assembler.advance();

        match res {
            Ok(refreshed) => {
                if let Some(max) = refreshed {
                    self.assembler.set_max_payload(max);
                }
                self.frames_sent = self.frames_sent.wrapping_add(1);
                debug!("{:?}: sent {} bytes ({} items)", user, len, items);
                Ok(())
            }
            Err(e) => {
                error!("{:?}: dropped {} byte frame ({} items): {:?}", user, len, items, e);
                Err(e)
            }
        }
    }

    async fn claim(&mut self) -> Result<(), Error> {
        if self.arbiter.check_owner(self.user).is_ok() {
            return Ok(());
        }
        let max = claim(self.arbiter, self.user, &self.config).await?;
        self.assembler.set_max_payload(max);
        Ok(())
    }

    fn release(&self) {
        if self.arbiter.check_owner(self.user).is_ok() {
            let _ = self.arbiter.release(self.user);
        }
    }
}

impl<M, D, W, P, E> ChannelSink for RadioChannel<'_, M, D, W, P, E>
where
    M: RawMutex,
    W: ProtocolStack<D>,
    P: ProtocolStack<D>,
    E: Encoder,
{
    async fn consume(&mut self, unit: &DataUnit) -> Result<(), Error> {
        self.scratch.clear();
        self.encoder.encode(unit, self.format, &mut self.scratch)?;

        let before = self.pending.evicted();
        self.pending
            .insert_raw(unit.data_type(), unit.aux(), &self.scratch)?;
        let lost = self.pending.evicted().wrapping_sub(before);
        if lost > 0 {
            warn!("{:?}: {} queued item(s) overwritten", self.user, lost);
        }

        self.pump().await
    }
}

/* ====== helpers ====== */

/// Takes the radio (from its other user if needed), configures it for `user` and returns the
/// resulting frame limit.
async fn claim<M, D, W, P>(
    arbiter: &SharedRadioArbiter<M, D, W, P>,
    user: RadioUser,
    config: &RadioConfig,
) -> Result<usize, Error>
where
    M: RawMutex,
    W: ProtocolStack<D>,
    P: ProtocolStack<D>,
{
    match arbiter.acquire(user).await {
        Ok(()) | Err(Error::Busy) => {}
        Err(e) => return Err(e),
    }
    arbiter.configure(user, config).await?;
    arbiter.max_payload(user).await
}

/// One transmission attempt. Reclaims the radio first when it was taken away; the refreshed
/// frame limit is returned in that case.
async fn transmit<M, D, W, P>(
    arbiter: &SharedRadioArbiter<M, D, W, P>,
    user: RadioUser,
    config: &RadioConfig,
    frame: &[u8],
) -> Result<Option<usize>, Error>
where
    M: RawMutex,
    W: ProtocolStack<D>,
    P: ProtocolStack<D>,
{
    let mut refreshed = None;
    if arbiter.check_owner(user).is_err() {
        warn!("{:?} lost the radio, reclaiming", user);
        refreshed = Some(claim(arbiter, user, config).await?);
    }
    arbiter.send(user, frame).await?;
    Ok(refreshed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::DataType;
    use crate::radio::mock::{Air, Event, MockStack};
    use crate::radio::RadioUser::{PointToPoint as B, WideArea as A};
    use embassy_futures::block_on;
    use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
    use embassy_time::Duration;
    use std::vec::Vec;

    type TestArbiter = SharedRadioArbiter<CriticalSectionRawMutex, Air, MockStack, MockStack>;

    /// Max payload 32 for data rate 3.
    fn arbiter() -> TestArbiter {
        SharedRadioArbiter::new(Air::default(), MockStack::new(A, 8), MockStack::new(B, 8))
    }

    fn config() -> RadioConfig {
        RadioConfig {
            data_rate: 3,
            ..RadioConfig::default()
        }
    }

    fn channel(arbiter: &TestArbiter, user: RadioUser) -> RadioChannel<'_, CriticalSectionRawMutex, Air, MockStack, MockStack> {
        RadioChannel::new(arbiter, user, config())
            .with_format(Format::RawBytes)
            .with_retry(Retry::new(3, Duration::from_ticks(0)))
    }

    /// 10 bytes once raw-encoded.
    fn item(tag: u8) -> DataUnit {
        let text = [b'a' + tag; 10];
        DataUnit::text(core::str::from_utf8(&text).unwrap()).unwrap()
    }

    fn sent(arbiter: &TestArbiter) -> Vec<(RadioUser, usize)> {
        block_on(arbiter.inspect(|air, _, _| {
            air.events
                .iter()
                .filter_map(|e| match e {
                    Event::Sent(user, frame) => Some((*user, frame.len())),
                    _ => None,
                })
                .collect()
        }))
    }

    #[test]
    fn coalesces_until_the_next_item_overflows() {
        let arbiter = arbiter();
        let mut radio = channel(&arbiter, A);

        for tag in 0..3 {
            block_on(radio.consume(&item(tag))).unwrap();
        }
        assert!(sent(&arbiter).is_empty());
        assert_eq!(radio.max_payload(), 32);
        assert_eq!(radio.assembled_len(), 30);

        block_on(radio.consume(&item(3))).unwrap();
        assert_eq!(sent(&arbiter), [(A, 30)]);
        // Fourth item opens the next frame
        assert_eq!(radio.assembled_len(), 10);
        assert_eq!(radio.pending(), 0);
        // Radio is free between pumps
        assert_eq!(arbiter.owner(), None);
    }

    #[test]
    fn idle_flush_policy_sends_partial_frames() {
        let arbiter = arbiter();
        let mut radio = channel(&arbiter, B).with_policy(AssemblyPolicy {
            single_item: false,
            flush_on_idle: true,
        });
        block_on(radio.consume(&item(0))).unwrap();
        block_on(radio.consume(&item(1))).unwrap();
        assert_eq!(sent(&arbiter), [(B, 10), (B, 10)]);
        assert_eq!(radio.frames_sent(), 2);
    }

    #[test]
    fn explicit_flush_empties_everything() {
        let arbiter = arbiter();
        let mut radio = channel(&arbiter, A);
        block_on(radio.consume(&item(0))).unwrap();
        block_on(radio.consume(&item(1))).unwrap();
        block_on(radio.flush_all()).unwrap();
        assert_eq!(sent(&arbiter), [(A, 20)]);
        assert_eq!(radio.assembled_len(), 0);
    }

    #[test]
    fn reconfigures_after_the_other_protocol_used_the_radio() {
        let arbiter = arbiter();
        let mut wide = channel(&arbiter, A).with_policy(AssemblyPolicy {
            single_item: true,
            flush_on_idle: false,
        });

        block_on(wide.consume(&item(0))).unwrap();
        // Point-to-point grabs the radio and keeps it
        block_on(arbiter.acquire(B)).unwrap();
        block_on(arbiter.configure(B, &RadioConfig::default())).unwrap();
        block_on(wide.consume(&item(1))).unwrap();

        let events = block_on(arbiter.inspect(|air, _, _| air.events.clone()));
        let kinds: Vec<_> = events
            .iter()
            .map(|e| match e {
                Event::Configured(user, _) => ('c', *user),
                Event::Sent(user, _) => ('s', *user),
                Event::Synced(user) => ('t', *user),
            })
            .collect();
        assert_eq!(kinds, [('c', A), ('s', A), ('c', B), ('c', A), ('s', A)]);
        assert_eq!(arbiter.owner(), None);
    }

    #[test]
    fn transient_send_failures_are_retried() {
        let arbiter = arbiter();
        block_on(arbiter.inspect(|_, wide, _| wide.fail_sends = 2));
        let mut radio = channel(&arbiter, A).with_policy(AssemblyPolicy {
            single_item: true,
            flush_on_idle: false,
        });
        block_on(radio.consume(&item(0))).unwrap();
        assert_eq!(sent(&arbiter), [(A, 10)]);
    }

    #[test]
    fn frame_is_dropped_after_retries() {
        let arbiter = arbiter();
        block_on(arbiter.inspect(|_, wide, _| wide.fail_sends = 3));
        let mut radio = channel(&arbiter, A).with_policy(AssemblyPolicy {
            single_item: true,
            flush_on_idle: false,
        });
        assert_eq!(block_on(radio.consume(&item(0))), Err(Error::Transport));
        assert_eq!(radio.assembled_len(), 0);
        assert_eq!(arbiter.owner(), None);

        // The link recovered
        block_on(radio.consume(&item(1))).unwrap();
        assert_eq!(sent(&arbiter), [(A, 10)]);
    }

    #[test]
    fn oversized_reading_is_sent_alone() {
        let arbiter = arbiter();
        let mut radio = channel(&arbiter, A);
        block_on(radio.consume(&item(0))).unwrap();

        let big = DataUnit::new(DataType::Sps30, &[7u32; 10]).unwrap();
        block_on(radio.consume(&big)).unwrap();
        // Pending frame first, then the 40 byte reading on its own
        assert_eq!(sent(&arbiter), [(A, 10), (A, 40)]);
        assert_eq!(radio.assembled_len(), 0);
    }

    #[test]
    fn shrunk_limit_sends_what_fits_and_carries_the_rest() {
        let arbiter = arbiter();
        let mut radio = channel(&arbiter, A);
        for tag in 0..3 {
            block_on(radio.consume(&item(tag))).unwrap();
        }
        assert_eq!(radio.assembled_len(), 30);

        // Point-to-point takes over; wide-area comes back with a 20 byte limit
        block_on(arbiter.acquire(B)).unwrap();
        block_on(arbiter.configure(B, &RadioConfig::default())).unwrap();
        block_on(arbiter.inspect(|_, wide, _| wide.step = 5));
        block_on(radio.consume(&item(3))).unwrap();

        assert_eq!(radio.max_payload(), 20);
        assert_eq!(sent(&arbiter), [(A, 20)]);
        // Third item carried over, fourth joined it
        assert_eq!(radio.assembled_len(), 20);
        assert_eq!(radio.pending(), 0);
    }

    #[test]
    fn clock_sync_needs_a_capable_stack() {
        let arbiter = arbiter();
        let mut wide = channel(&arbiter, A);
        let mut p2p = channel(&arbiter, B);
        assert_eq!(block_on(wide.sync_clock()), Ok(()));
        assert_eq!(block_on(p2p.sync_clock()), Err(Error::NotImplemented));
        assert_eq!(arbiter.owner(), None);
    }
}
