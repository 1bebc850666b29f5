#![cfg_attr(not(test), no_std)]

// Must come first so the logging macros are visible everywhere below
#[macro_use]
mod fmt;

pub mod buffer;
pub mod channels;
pub mod config;
pub mod data;
pub mod drivers;
pub mod encode;
pub mod error;
pub mod fanout;
pub mod ipc;
pub mod package;
pub mod radio;
pub mod registry;
pub mod retry;

#[cfg(feature = "firmware")]
pub mod board;
#[cfg(feature = "firmware")]
pub mod tasks;

pub use buffer::{SharedRingBuffer, TypedRingBuffer};
pub use config::{AssemblyPolicy, PipelineConfig, RadioConfig};
pub use data::{DataType, DataUnit};
pub use error::Error;
pub use fanout::{ChannelPort, FanOutCoordinator, Pipeline};
pub use package::{PackageAssembler, Packing};
pub use radio::{ProtocolStack, RadioUser, SharedRadioArbiter};
pub use registry::{ChannelId, ChannelRegistry};

#[cfg(feature = "firmware")]
pub use board::Board;
