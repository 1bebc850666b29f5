//! Bounded retry-with-delay.

use core::future::Future;

use embassy_time::{Duration, Timer};

use crate::config::{RADIO_RETRY_DELAY_MS, RADIO_SEND_ATTEMPTS};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Retry {
    /// Total tries, the first one included. Zero behaves like one.
    pub attempts: u8,
    /// Pause between two tries.
    pub delay: Duration,
}

impl Default for Retry {
    fn default() -> Self {
        Self::new(RADIO_SEND_ATTEMPTS, Duration::from_millis(RADIO_RETRY_DELAY_MS))
    }
}

impl Retry {
    pub const fn new(attempts: u8, delay: Duration) -> Self {
        Self { attempts, delay }
    }

    /// Runs `op` until it succeeds or the attempts are used up; the last error is returned.
    /// `op` receives the zero-based attempt number.
    pub async fn run<T, E, F, Fut>(&self, mut op: F) -> Result<T, E>
    where
        F: FnMut(u8) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let attempts = self.attempts.max(1);
        let mut attempt = 0;
        loop {
            match op(attempt).await {
                Ok(v) => return Ok(v),
                Err(e) if attempt + 1 >= attempts => return Err(e),
                Err(_) => {
                    debug!("attempt {}/{} failed, retrying", attempt + 1, attempts);
                    attempt += 1;
                    Timer::after(self.delay).await;
                }
            }
        }
    }

    /// Same as [`Retry::run`] for a synchronous check, e.g. polling a "data ready" flag.
    pub async fn poll<T, E>(&self, mut op: impl FnMut(u8) -> Result<T, E>) -> Result<T, E> {
        self.run(|attempt| core::future::ready(op(attempt))).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embassy_futures::block_on;

    const FAST: Retry = Retry::new(3, Duration::from_ticks(0));

    #[test]
    fn stops_at_first_success() {
        let mut calls = 0;
        let out: Result<u8, ()> = block_on(FAST.poll(|n| {
            calls += 1;
            if n == 1 {
                Ok(n)
            } else {
                Err(())
            }
        }));
        assert_eq!(out, Ok(1));
        assert_eq!(calls, 2);
    }

    #[test]
    fn gives_up_with_last_error() {
        let mut calls = 0u8;
        let out: Result<(), u8> = block_on(FAST.run(|n| {
            calls += 1;
            async move { Err(n) }
        }));
        assert_eq!(out, Err(2));
        assert_eq!(calls, 3);
    }

    #[test]
    fn zero_attempts_still_tries_once() {
        let once = Retry::new(0, Duration::from_ticks(0));
        let mut calls = 0;
        let out: Result<(), ()> = block_on(once.poll(|_| {
            calls += 1;
            Err(())
        }));
        assert!(out.is_err());
        assert_eq!(calls, 1);
    }
}
