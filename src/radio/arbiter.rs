//! Ownership arbitration for the single long-range transceiver.
//!
//! Two locks are involved:
//! * `owner`, a blocking mutex around the ownership token, held for a few instructions;
//! * `radio`, an async mutex around the device and both stacks, held for exactly one
//!   configure/transmit/sync call.
//!
//! Every device operation checks ownership before and after taking the device lock, so a
//! channel that lost the radio while waiting never touches the other channel's setup.

use core::cell::Cell;

use embassy_sync::blocking_mutex::{self, raw::RawMutex};
use embassy_sync::mutex::{Mutex, MutexGuard};
use embassy_time::{with_timeout, Duration};

use super::{ProtocolStack, RadioUser};
use crate::config::RadioConfig;
use crate::error::Error;

struct Transceiver<D, W, P> {
    device: D,
    wide_area: W,
    point_to_point: P,
}

pub struct SharedRadioArbiter<M: RawMutex, D, W, P> {
    owner: blocking_mutex::Mutex<M, Cell<Option<RadioUser>>>,
    radio: Mutex<M, Transceiver<D, W, P>>,
    lock_timeout: Option<Duration>,
}

impl<M, D, W, P> SharedRadioArbiter<M, D, W, P>
where
    M: RawMutex,
    W: ProtocolStack<D>,
    P: ProtocolStack<D>,
{
    pub fn new(device: D, wide_area: W, point_to_point: P) -> Self {
        Self {
            owner: blocking_mutex::Mutex::new(Cell::new(None)),
            radio: Mutex::new(Transceiver {
                device,
                wide_area,
                point_to_point,
            }),
            lock_timeout: None,
        }
    }

    /// Bounds every wait for the device lock. Unbounded by default.
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = Some(timeout);
        self
    }

    pub fn owner(&self) -> Option<RadioUser> {
        self.owner.lock(Cell::get)
    }

    /* ---- ownership ---- */

    /// Makes `user` the owner. Waits for any in-flight device operation to finish first.
    ///
    /// Re-acquiring as the current owner is a caller bug and yields `Busy`. Acquiring while the
    /// other user owns the radio hands it over.
    pub async fn acquire(&self, user: RadioUser) -> Result<(), Error> {
        let _radio = self.lock().await?;
        self.owner.lock(|owner| match owner.get() {
            Some(current) if current == user => {
                warn!("{:?} acquired the radio twice", user);
                Err(Error::Busy)
            }
            Some(current) => {
                warn!("radio taken over from {:?} by {:?}", current, user);
                owner.set(Some(user));
                Ok(())
            }
            None => {
                debug!("radio acquired by {:?}", user);
                owner.set(Some(user));
                Ok(())
            }
        })
    }

    pub fn check_owner(&self, user: RadioUser) -> Result<(), Error> {
        if self.owner() == Some(user) {
            Ok(())
        } else {
            Err(Error::PermissionDenied)
        }
    }

    pub fn release(&self, user: RadioUser) -> Result<(), Error> {
        self.owner.lock(|owner| {
            if owner.get() != Some(user) {
                warn!("{:?} released a radio it does not own", user);
                return Err(Error::PermissionDenied);
            }
            owner.set(None);
            debug!("radio released by {:?}", user);
            Ok(())
        })
    }

    /* ---- device operations ---- */

    pub async fn configure(&self, user: RadioUser, config: &RadioConfig) -> Result<(), Error> {
        let mut radio = self.lock_as(user).await?;
        let Transceiver {
            device,
            wide_area,
            point_to_point,
        } = &mut *radio;
        match user {
            RadioUser::WideArea => wide_area.configure(device, config).await,
            RadioUser::PointToPoint => point_to_point.configure(device, config).await,
        }
    }

    pub async fn send(&self, user: RadioUser, frame: &[u8]) -> Result<(), Error> {
        let mut radio = self.lock_as(user).await?;
        let Transceiver {
            device,
            wide_area,
            point_to_point,
        } = &mut *radio;
        trace!("{:?} sending {} bytes", user, frame.len());
        match user {
            RadioUser::WideArea => wide_area.transmit(device, frame).await,
            RadioUser::PointToPoint => point_to_point.transmit(device, frame).await,
        }
    }

    pub async fn sync_clock(&self, user: RadioUser) -> Result<(), Error> {
        let mut radio = self.lock_as(user).await?;
        let Transceiver {
            device,
            wide_area,
            point_to_point,
        } = &mut *radio;
        match user {
            RadioUser::WideArea => wide_area.sync_clock(device).await,
            RadioUser::PointToPoint => point_to_point.sync_clock(device).await,
        }
    }

    /// Frame limit of `user`'s stack as currently configured. Does not require ownership.
    pub async fn max_payload(&self, user: RadioUser) -> Result<usize, Error> {
        let radio = self.lock().await?;
        Ok(match user {
            RadioUser::WideArea => radio.wide_area.max_payload(),
            RadioUser::PointToPoint => radio.point_to_point.max_payload(),
        })
    }

    /* ====== helpers ====== */

    async fn lock(&self) -> Result<MutexGuard<'_, M, Transceiver<D, W, P>>, Error> {
        match self.lock_timeout {
            None => Ok(self.radio.lock().await),
            Some(timeout) => with_timeout(timeout, self.radio.lock()).await.map_err(|_| {
                warn!("radio lock not granted within {} ms", timeout.as_millis());
                Error::Timeout
            }),
        }
    }

    async fn lock_as(&self, user: RadioUser) -> Result<MutexGuard<'_, M, Transceiver<D, W, P>>, Error> {
        self.check_owner(user)?;
        let radio = self.lock().await?;
        // Ownership may have moved while we waited
        self.check_owner(user)?;
        Ok(radio)
    }

    /// Direct access to the device and both stacks, ownership ignored.
    #[cfg(test)]
    pub(crate) async fn inspect<R>(&self, f: impl FnOnce(&mut D, &mut W, &mut P) -> R) -> R {
        let mut radio = self.radio.lock().await;
        let Transceiver {
            device,
            wide_area,
            point_to_point,
        } = &mut *radio;
        f(device, wide_area, point_to_point)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::radio::mock::{Air, Event, MockStack};
    use crate::radio::RadioUser::{PointToPoint as B, WideArea as A};
    use embassy_futures::block_on;
    use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
    use std::vec::Vec;

    type TestArbiter = SharedRadioArbiter<CriticalSectionRawMutex, Air, MockStack, MockStack>;

    fn arbiter() -> TestArbiter {
        SharedRadioArbiter::new(Air::default(), MockStack::new(A, 10), MockStack::new(B, 10))
    }

    fn events(arbiter: &TestArbiter) -> Vec<Event> {
        block_on(arbiter.inspect(|air, _, _| air.events.clone()))
    }

    #[test]
    fn single_owner_at_a_time() {
        let arbiter = arbiter();
        block_on(arbiter.acquire(A)).unwrap();
        assert_eq!(arbiter.check_owner(A), Ok(()));
        assert_eq!(arbiter.check_owner(B), Err(Error::PermissionDenied));

        arbiter.release(A).unwrap();
        block_on(arbiter.acquire(B)).unwrap();
        assert_eq!(arbiter.check_owner(B), Ok(()));
        assert_eq!(arbiter.check_owner(A), Err(Error::PermissionDenied));
    }

    #[test]
    fn reacquire_by_owner_is_busy() {
        let arbiter = arbiter();
        block_on(arbiter.acquire(A)).unwrap();
        assert_eq!(block_on(arbiter.acquire(A)), Err(Error::Busy));
        assert_eq!(arbiter.owner(), Some(A));
    }

    #[test]
    fn other_user_takes_over() {
        let arbiter = arbiter();
        block_on(arbiter.acquire(A)).unwrap();
        block_on(arbiter.acquire(B)).unwrap();
        assert_eq!(arbiter.owner(), Some(B));
        // The previous owner is locked out of the device
        assert_eq!(block_on(arbiter.send(A, &[1, 2])), Err(Error::PermissionDenied));
        assert!(events(&arbiter).is_empty());
    }

    #[test]
    fn release_requires_ownership() {
        let arbiter = arbiter();
        assert_eq!(arbiter.release(A), Err(Error::PermissionDenied));
        block_on(arbiter.acquire(A)).unwrap();
        assert_eq!(arbiter.release(B), Err(Error::PermissionDenied));
        assert_eq!(arbiter.owner(), Some(A));
        arbiter.release(A).unwrap();
        assert_eq!(arbiter.owner(), None);
    }

    #[test]
    fn operations_route_to_the_owner_stack() {
        let arbiter = arbiter();
        let config = RadioConfig {
            data_rate: 2,
            ..RadioConfig::default()
        };

        block_on(arbiter.acquire(B)).unwrap();
        block_on(arbiter.configure(B, &config)).unwrap();
        block_on(arbiter.send(B, &[7, 7])).unwrap();
        assert_eq!(block_on(arbiter.max_payload(B)), Ok(30));
        assert_eq!(block_on(arbiter.max_payload(A)), Ok(0));
        arbiter.release(B).unwrap();

        block_on(arbiter.acquire(A)).unwrap();
        block_on(arbiter.send(A, &[9])).unwrap();

        assert_eq!(
            events(&arbiter),
            [
                Event::Configured(B, 2),
                Event::Sent(B, std::vec![7, 7]),
                Event::Sent(A, std::vec![9]),
            ]
        );
    }

    #[test]
    fn clock_sync_depends_on_the_stack() {
        let arbiter = arbiter();
        assert_eq!(block_on(arbiter.sync_clock(A)), Err(Error::PermissionDenied));

        block_on(arbiter.acquire(A)).unwrap();
        assert_eq!(block_on(arbiter.sync_clock(A)), Ok(()));
        block_on(arbiter.acquire(B)).unwrap();
        assert_eq!(block_on(arbiter.sync_clock(B)), Err(Error::NotImplemented));
        assert_eq!(events(&arbiter), [Event::Synced(A)]);
    }

    #[test]
    fn lock_timeout_bounds_the_wait() {
        let arbiter = arbiter().with_lock_timeout(Duration::from_millis(10));
        block_on(arbiter.acquire(A)).unwrap();

        let held = block_on(arbiter.radio.lock());
        assert_eq!(block_on(arbiter.send(A, &[1])), Err(Error::Timeout));
        assert_eq!(block_on(arbiter.acquire(B)), Err(Error::Timeout));
        drop(held);

        assert_eq!(arbiter.owner(), Some(A));
        assert_eq!(block_on(arbiter.send(A, &[1])), Ok(()));
    }
}
