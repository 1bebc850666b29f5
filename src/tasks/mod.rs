use embassy_stm32::mode::Async;
use embassy_stm32::{i2c::I2c, usart::BufferedUart};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;

use crate::channels::{RadioChannel, SerialChannel};
use crate::config::BUFFER_ARENA_SIZE;
use crate::drivers::{LoRaP2pStack, LoRaWanStack, Modem, Sht3x};
use crate::fanout::{ChannelPort, Pipeline};
use crate::radio::SharedRadioArbiter;

pub mod channels;
pub mod pipeline;
pub mod sensor;

pub use channels::{radio_task, serial_task};
pub use pipeline::coordinator_task;
pub use sensor::sensor_task;

// Concrete types of the firmware image. Tasks cannot be generic.
pub type NodeMutex = CriticalSectionRawMutex;
pub type NodePipeline = Pipeline<NodeMutex, BUFFER_ARENA_SIZE>;
pub type NodePort = ChannelPort<'static, NodeMutex>;
pub type NodeModem = Modem<BufferedUart<'static>>;
pub type NodeRadio = SharedRadioArbiter<NodeMutex, NodeModem, LoRaWanStack, LoRaP2pStack>;
pub type NodeRadioChannel =
    RadioChannel<'static, NodeMutex, NodeModem, LoRaWanStack, LoRaP2pStack>;
pub type NodeSerialChannel = SerialChannel<BufferedUart<'static>>;
pub type NodeSensor = Sht3x<I2c<'static, Async>>;
