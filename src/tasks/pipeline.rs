use embassy_executor::task;

use super::NodePipeline;

/// The single fan-out producer.
#[task]
pub async fn coordinator_task(pipeline: &'static NodePipeline) {
    info!(
        "coordinator started, {} channel(s) in the barrier",
        pipeline.active().len()
    );
    let mut coordinator = pipeline.coordinator();
    coordinator.run().await
}
