//! Fan-out pipeline
//! ================
//!
//! Sensors insert readings into the shared ring. A single coordinator task wakes up every
//! transmission interval and drains the ring one item at a time: it stages the item, raises the
//! "item ready" signal of every active channel, then waits until each of them posted exactly
//! one completion before it stages the next item.
//!
//! A channel that never completes stalls the coordinator (unless a barrier timeout is
//! configured); a channel that completes twice lets the coordinator advance early.

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_time::{with_timeout, Duration, Timer};
use portable_atomic::{AtomicU32, AtomicU8, Ordering};

use crate::buffer::SharedRingBuffer;
use crate::config::PipelineConfig;
use crate::data::DataUnit;
use crate::error::Error;
use crate::ipc::SyncSet;
use crate::registry::{ActiveChannels, ChannelId};

/// Shared state of the pipeline. Created once at startup, then handed to every task by
/// reference.
pub struct Pipeline<M: RawMutex, const ARENA: usize> {
    buffer: SharedRingBuffer<M, ARENA>,
    sync: SyncSet<M>,
    active: ActiveChannels,
    interval_ms: AtomicU32,
    barrier_timeout: Option<Duration>,
    dispatched: AtomicU32,
    state: AtomicU8,
}

impl<M: RawMutex, const ARENA: usize> Pipeline<M, ARENA> {
    pub fn new(active: ActiveChannels, config: PipelineConfig) -> Self {
        info!(
            "pipeline: {} active channel(s), interval {} ms",
            active.len(),
            config.transmission_interval_ms
        );
        Self {
            buffer: SharedRingBuffer::new(),
            sync: SyncSet::new(),
            active,
            interval_ms: AtomicU32::new(config.transmission_interval_ms),
            barrier_timeout: config.barrier_timeout,
            dispatched: AtomicU32::new(0),
            state: AtomicU8::new(CoordinatorState::Waiting as u8),
        }
    }

    /// Producer entry point. Never blocks; the oldest readings give way when full.
    pub fn insert(&self, unit: &DataUnit) -> Result<(), Error> {
        self.buffer.insert(unit)
    }

    pub fn buffer(&self) -> &SharedRingBuffer<M, ARENA> {
        &self.buffer
    }

    pub fn active(&self) -> ActiveChannels {
        self.active
    }

    pub fn transmission_interval_ms(&self) -> u32 {
        self.interval_ms.load(Ordering::Relaxed)
    }

    pub fn set_transmission_interval_ms(&self, ms: u32) {
        info!("transmission interval set to {} ms", ms);
        self.interval_ms.store(ms, Ordering::Relaxed);
    }

    /// Items fanned out to every channel since startup.
    pub fn dispatched(&self) -> u32 {
        self.dispatched.load(Ordering::Relaxed)
    }

    pub fn state(&self) -> CoordinatorState {
        CoordinatorState::from_u8(self.state.load(Ordering::Relaxed))
    }

    /// Consumer handle of an active channel.
    pub fn port(&self, id: ChannelId) -> Option<ChannelPort<'_, M>> {
        self.active.contains(id).then_some(ChannelPort {
            id,
            sync: &self.sync,
        })
    }

    /// The coordinator. Only one may run at a time.
    pub fn coordinator(&self) -> FanOutCoordinator<'_, M, ARENA> {
        FanOutCoordinator { pipeline: self }
    }

    fn set_state(&self, state: CoordinatorState) {
        self.state.store(state as u8, Ordering::Relaxed);
    }
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CoordinatorState {
    /// Sleeping for the transmission interval.
    Waiting = 0,
    /// Handing buffered items to the channels.
    Draining = 1,
}

impl CoordinatorState {
    fn from_u8(raw: u8) -> Self {
        if raw == Self::Draining as u8 {
            Self::Draining
        } else {
            Self::Waiting
        }
    }
}

/* ------------------------------------------------------------------------- */
/*  Coordinator                                                              */
/* ------------------------------------------------------------------------- */
pub struct FanOutCoordinator<'a, M: RawMutex, const ARENA: usize> {
    pipeline: &'a Pipeline<M, ARENA>,
}

impl<'a, M: RawMutex, const ARENA: usize> FanOutCoordinator<'a, M, ARENA> {
    /// Sleep, drain, repeat.
    pub async fn run(&mut self) -> ! {
        loop {
            self.pipeline.set_state(CoordinatorState::Waiting);
            Timer::after_millis(self.pipeline.transmission_interval_ms() as u64).await;

            self.pipeline.set_state(CoordinatorState::Draining);
            match self.drain().await {
                Ok(0) => {}
                Ok(n) => debug!("fan-out cycle: {} item(s)", n),
                Err(e) => error!("fan-out cycle aborted: {:?}", e),
            }
        }
    }

    /// Fans out items until the ring is empty. Returns the number of items delivered.
    pub async fn drain(&mut self) -> Result<usize, Error> {
        let mut delivered = 0;
        while self.dispatch_next().await? {
            delivered += 1;
        }
        Ok(delivered)
    }

    /// Fans out one item and waits for the barrier. `Ok(false)` when nothing was buffered.
    pub async fn dispatch_next(&mut self) -> Result<bool, Error> {
        let pipeline = self.pipeline;
        if pipeline.active.is_empty() {
            // Nobody to deliver to; eviction keeps the ring bounded
            return Ok(false);
        }
        let unit = match pipeline.buffer.take() {
            Ok(unit) => unit,
            Err(Error::Empty) => return Ok(false),
            Err(e) => return Err(e),
        };
        trace!(
            "dispatching {:?} ({} words)",
            unit.data_type(),
            unit.word_count()
        );

        let seq = pipeline.sync.stage(unit);
        for id in pipeline.active.iter() {
            pipeline.sync.notify(id);
        }
        self.barrier(seq).await?;

        pipeline.dispatched.fetch_add(1, Ordering::Relaxed);
        Ok(true)
    }

    /// Waits for one completion per active channel for item `seq`. Completions left over from
    /// an earlier, timed-out item are dropped.
    async fn barrier(&self, seq: u32) -> Result<(), Error> {
        let sync = &self.pipeline.sync;
        let expected = self.pipeline.active.len();
        let wait_all = async {
            let mut seen = 0;
            while seen < expected {
                let done = sync.wait_processed().await;
                if done.seq != seq {
                    warn!("{:?}: late completion for item {} dropped", done.id, done.seq);
                    continue;
                }
                trace!("completion from {:?}", done.id);
                seen += 1;
            }
        };

        match self.pipeline.barrier_timeout {
            Some(limit) => with_timeout(limit, wait_all).await.map_err(|_| {
                error!("barrier timed out waiting for {} channel(s)", expected);
                Error::Timeout
            }),
            None => {
                wait_all.await;
                Ok(())
            }
        }
    }
}

/* ------------------------------------------------------------------------- */
/*  Consumer side                                                            */
/* ------------------------------------------------------------------------- */

/// A channel's view of the pipeline.
pub struct ChannelPort<'a, M: RawMutex> {
    id: ChannelId,
    sync: &'a SyncSet<M>,
}

impl<M: RawMutex> Clone for ChannelPort<'_, M> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<M: RawMutex> Copy for ChannelPort<'_, M> {}

impl<'a, M: RawMutex> ChannelPort<'a, M> {
    pub fn id(&self) -> ChannelId {
        self.id
    }

    /// Waits for the next fanned-out item.
    pub async fn next_item(&self) -> Delivery<'a, M> {
        loop {
            self.sync.wait_ready(self.id).await;
            if let Some((seq, unit)) = self.sync.staged() {
                return Delivery {
                    port: *self,
                    seq,
                    unit,
                    completed: false,
                };
            }
            debug_assert!(false, "ready raised with empty staging slot");
            error!("{:?}: ready raised with empty staging slot", self.id);
            let _ = self.signal_processed();
        }
    }

    /// Posts one completion for the item staged right now. `Delivery` does this for you;
    /// calling it directly breaks the one-completion-per-item rule.
    pub fn signal_processed(&self) -> Result<(), Error> {
        self.sync.complete(self.id, self.sync.current_seq())
    }
}

/// One item handed to one channel. Posts the channel's completion exactly once: explicitly via
/// [`Delivery::complete`] or on drop, so early returns and errors still release the barrier.
pub struct Delivery<'a, M: RawMutex> {
    port: ChannelPort<'a, M>,
    seq: u32,
    unit: DataUnit,
    completed: bool,
}

impl<M: RawMutex> Delivery<'_, M> {
    pub fn unit(&self) -> &DataUnit {
        &self.unit
    }

    pub fn complete(mut self) {
        self.finish();
    }

    fn finish(&mut self) {
        if !self.completed {
            self.completed = true;
            let _ = self.port.sync.complete(self.port.id, self.seq);
        }
    }
}

impl<M: RawMutex> Drop for Delivery<'_, M> {
    fn drop(&mut self) {
        self.finish();
    }
}
