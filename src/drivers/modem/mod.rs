//! Long-range LoRa modem driven over a UART with AT commands.

pub mod driver;
pub mod protocol;
pub mod stacks;

pub use driver::Modem;
pub use stacks::{LoRaP2pStack, LoRaWanStack};
