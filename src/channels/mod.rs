//! Channel consumers: what each output channel does with a fanned-out reading.

use core::future::Future;

use embassy_sync::blocking_mutex::raw::RawMutex;

use crate::data::DataUnit;
use crate::error::Error;
use crate::fanout::ChannelPort;

pub mod radio;
pub mod serial;

pub use radio::RadioChannel;
pub use serial::SerialChannel;

/// Output side of one channel.
pub trait ChannelSink {
    fn consume(&mut self, unit: &DataUnit) -> impl Future<Output = Result<(), Error>>;
}

/// Handles one delivery. The item is completed whatever `consume` returns.
pub async fn serve_next<M: RawMutex, S: ChannelSink>(
    port: &ChannelPort<'_, M>,
    sink: &mut S,
) -> Result<(), Error> {
    let delivery = port.next_item().await;
    let res = sink.consume(delivery.unit()).await;
    if let Err(e) = res {
        warn!(
            "{:?}: {:?} reading not delivered: {:?}",
            port.id(),
            delivery.unit().data_type(),
            e
        );
    }
    delivery.complete();
    res
}

/// Consumer task body.
pub async fn serve<M: RawMutex, S: ChannelSink>(port: ChannelPort<'_, M>, sink: &mut S) -> ! {
    info!("{:?} consumer started", port.id());
    loop {
        let _ = serve_next(&port, sink).await;
    }
}
