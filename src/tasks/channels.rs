use embassy_executor::task;
use embassy_time::{Duration, Instant};

use super::{NodePort, NodeRadioChannel, NodeSerialChannel};
use crate::channels::{serve, serve_next};
use crate::config::CLOCK_SYNC_PERIOD_S;
use crate::error::Error;
use crate::radio::RadioUser;

#[task]
pub async fn serial_task(port: NodePort, mut channel: NodeSerialChannel) {
    serve(port, &mut channel).await
}

/// One instance per radio protocol. The wide-area one also keeps the network time fresh,
/// between deliveries so the barrier is never held up by a sync.
#[task(pool_size = 2)]
pub async fn radio_task(port: NodePort, mut channel: NodeRadioChannel) {
    info!("{:?} radio consumer started", channel.user());
    let syncs = channel.user() == RadioUser::WideArea;
    let period = Duration::from_secs(CLOCK_SYNC_PERIOD_S);
    let mut last_sync: Option<Instant> = None;

    loop {
        let _ = serve_next(&port, &mut channel).await;

        if !syncs || last_sync.is_some_and(|at| at.elapsed() < period) {
            continue;
        }
        match channel.sync_clock().await {
            Ok(()) => last_sync = Some(Instant::now()),
            Err(Error::NotImplemented) => {
                warn!("{:?} cannot sync the clock", channel.user());
                last_sync = Some(Instant::now());
            }
            Err(e) => warn!("clock sync failed: {:?}", e),
        }
    }
}
