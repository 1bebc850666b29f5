#![no_std]
#![no_main]

use defmt::*;
use embassy_executor::Spawner;
use portable_atomic::{AtomicBool, Ordering};
use static_cell::StaticCell;
use {defmt_rtt as _, panic_probe as _};

use envnode::{
    channels::{RadioChannel, SerialChannel},
    config::{PipelineConfig, RadioConfig},
    drivers::{sht3x, LoRaP2pStack, LoRaWanStack, Modem, Sht3x},
    encode::Format,
    tasks::{
        coordinator_task, radio_task, sensor_task, serial_task, NodePipeline, NodeRadio,
    },
    Board, ChannelId, ChannelRegistry, Error, Pipeline, RadioUser, SharedRadioArbiter,
};

static PIPELINE: StaticCell<NodePipeline> = StaticCell::new();
static RADIO: StaticCell<NodeRadio> = StaticCell::new();

static MODEM_UP: AtomicBool = AtomicBool::new(false);

fn serial_init() -> Result<(), Error> {
    Ok(())
}

fn radio_init() -> Result<(), Error> {
    if MODEM_UP.load(Ordering::Relaxed) {
        Ok(())
    } else {
        Err(Error::Transport)
    }
}

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    info!("Starting envnode");
    let board = Board::init();

    let mut modem = Modem::new(board.modem_uart);
    match modem.ping().await {
        Ok(()) => MODEM_UP.store(true, Ordering::Relaxed),
        Err(e) => error!("modem not answering: {:?}", e),
    }

    let mut registry = ChannelRegistry::new();
    unwrap!(registry.register(ChannelId::Uart, serial_init));
    unwrap!(registry.register(ChannelId::WideAreaRadio, radio_init));
    unwrap!(registry.register(ChannelId::PointToPointRadio, radio_init));
    let active = registry.init_all();

    let pipeline: &'static NodePipeline =
        PIPELINE.init(Pipeline::new(active, PipelineConfig::default()));
    let radio: &'static NodeRadio = RADIO.init(SharedRadioArbiter::new(
        modem,
        LoRaWanStack::new(),
        LoRaP2pStack::new(),
    ));

    let sensor = Sht3x::new(board.i2c2, sht3x::DEFAULT_ADDRESS);
    spawner.spawn(sensor_task(sensor, pipeline)).unwrap();

    if let Some(port) = pipeline.port(ChannelId::Uart) {
        let channel = SerialChannel::new(board.serial_uart, Format::MinimalText);
        spawner.spawn(serial_task(port, channel)).unwrap();
    }

    for (id, user) in [
        (ChannelId::WideAreaRadio, RadioUser::WideArea),
        (ChannelId::PointToPointRadio, RadioUser::PointToPoint),
    ] {
        if let Some(port) = pipeline.port(id) {
            let channel = RadioChannel::new(radio, user, RadioConfig::default());
            spawner.spawn(radio_task(port, channel)).unwrap();
            info!("{:?} channel spawned", id);
        }
    }

    // Consumers must be waiting before the first item is staged
    spawner.spawn(coordinator_task(pipeline)).unwrap();

    core::future::pending::<()>().await;
}
