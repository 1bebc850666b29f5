use embassy_executor::task;
use embassy_time::{Duration, Ticker};

use super::{NodePipeline, NodeSensor};
use crate::config::SENSOR_SAMPLE_PERIOD_MS;
use crate::drivers::sample_into;

#[task]
pub async fn sensor_task(mut sensor: NodeSensor, pipeline: &'static NodePipeline) {
    info!(
        "sensor task started - sampling every {} ms",
        SENSOR_SAMPLE_PERIOD_MS
    );
    if let Err(e) = sensor.soft_reset() {
        warn!("sht3x reset failed: {:?}", e);
    }

    let mut ticker = Ticker::every(Duration::from_millis(SENSOR_SAMPLE_PERIOD_MS));
    let mut samples = 0u32;
    loop {
        ticker.next().await;

        // Failed reads are queued as error readings, only the insert can fail here
        if let Err(e) = sample_into(&mut sensor, pipeline).await {
            error!("reading not queued: {:?}", e);
            continue;
        }
        samples = samples.wrapping_add(1);
        if samples % 100 == 0 {
            info!(
                "{} samples, {} queued, {} evicted",
                samples,
                pipeline.buffer().len(),
                pipeline.buffer().evicted()
            );
        }
    }
}
