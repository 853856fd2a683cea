//! Firmware that turns an RP2040 board into an Omron ME56PS2 modem as far
//! as the USB host can tell, bridging the modem's bulk data stream to a
//! byte transport. Everything testable lives in the library and builds on
//! the host: the controller driver, the descriptor tables, the request
//! handling, and the data bridge. The `firmware` feature gates the
//! flashable binary with the board bring-up.

#![no_std]

#[cfg(test)]
extern crate std;

pub mod bridge;
pub mod control;
pub mod descriptors;
pub mod device;
pub mod dpram;
pub mod fmt;
pub mod reg;
