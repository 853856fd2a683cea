//! Primitives for sharing data between interrupt context and main context on
//! a single-core microcontroller: a scoped interrupt-masking lock, a
//! compare-and-transition state cell, and a fixed-capacity byte-friendly ring
//! buffer. These are the only sanctioned channels between the two contexts;
//! everything they protect is touched exclusively through their critical
//! sections.
//!
//! On the firmware target the lock masks interrupts (a spinlock held by main
//! context would deadlock the interrupt handler on a single core). On every
//! other target it degrades to a real spinlock so the data structures can be
//! exercised from multi-threaded host tests.

#![no_std]

#[cfg(test)]
extern crate std;

mod lock;
mod ring;
mod state;

pub use lock::{IrqGuard, IrqLock};
pub use ring::RingBuffer;
pub use state::StateHolder;
