pub mod modem;
pub mod sht3x;

use core::future::Future;

use embassy_sync::blocking_mutex::raw::RawMutex;

use crate::data::{DataType, DataUnit};
use crate::error::Error;
use crate::fanout::Pipeline;

pub use modem::{LoRaP2pStack, LoRaWanStack, Modem};
pub use sht3x::Sht3x;

/// Anything producing readings for the pipeline.
pub trait Sensor {
    const DATA_TYPE: DataType;

    fn sample(&mut self) -> impl Future<Output = Result<DataUnit, Error>>;
}

/// Samples `sensor` once and queues the result. A failed read is queued too, as an empty
/// reading carrying the error code, so consumers see the gap.
pub async fn sample_into<M: RawMutex, S: Sensor, const N: usize>(
    sensor: &mut S,
    pipeline: &Pipeline<M, N>,
) -> Result<(), Error> {
    let unit = match sensor.sample().await {
        Ok(unit) => unit,
        Err(e) => {
            warn!("{} sample failed: {:?}", S::DATA_TYPE.name(), e);
            DataUnit::failed(S::DATA_TYPE, e)
        }
    };
    pipeline.insert(&unit)
}
