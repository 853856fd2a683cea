//! Cells for memory the USB controller writes while the CPU is looking at
//! it. A `Volatile<T, A>` occupies exactly the space of a `T` inside a
//! `repr(C)` block overlaid on a peripheral aperture, and every access
//! compiles to a `read_volatile`/`write_volatile`, so none can be elided,
//! folded together, or reordered against its neighbours. The `A` tag is
//! the CPU's permission on the cell: words only the hardware may write (a
//! received setup packet) are `ReadOnly`, everything else `ReadWrite`.
//!
//! Cells are never constructed. They come into being when a register block
//! is overlaid on its aperture (or on a fake image in tests), which is why
//! the type is `repr(transparent)` and carries no other API.

#![no_std]

#[cfg(test)]
extern crate std;

use core::{cell::UnsafeCell, marker::PhantomData, ptr};

/// Access permissions a cell can be tagged with. Sealed: the register
/// blocks in this tree need exactly the two below.
pub trait Access: sealed::Sealed {}

/// The hardware owns the value; the CPU only observes it.
pub enum ReadOnly {}

/// Ordinary register or buffer memory.
pub enum ReadWrite {}

impl Access for ReadOnly {}
impl Access for ReadWrite {}

mod sealed {
    pub trait Sealed {}
    impl Sealed for super::ReadOnly {}
    impl Sealed for super::ReadWrite {}
}

#[repr(transparent)]
pub struct Volatile<T, A: Access = ReadWrite> {
    value: UnsafeCell<T>,
    _access: PhantomData<A>,
}

/*
 * References to these cells are shared between main context and the
 * interrupt handler, and the hardware is a concurrent writer regardless.
 * Every access is a single volatile load or store of a `Copy` value, so
 * there is no partially-updated state for a second context to observe.
 */
unsafe impl<T: Send, A: Access> Sync for Volatile<T, A> {}

impl<T: Copy, A: Access> Volatile<T, A> {
    pub fn read(&self) -> T {
        unsafe { ptr::read_volatile(self.value.get()) }
    }
}

impl<T: Copy> Volatile<T, ReadWrite> {
    pub fn write(&self, value: T) {
        unsafe { ptr::write_volatile(self.value.get(), value) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cells_overlay_plain_memory_transparently() {
        assert_eq!(core::mem::size_of::<Volatile<u32>>(), 4);
        assert_eq!(core::mem::align_of::<Volatile<u32>>(), 4);
        assert_eq!(core::mem::size_of::<[Volatile<u8, ReadOnly>; 8]>(), 8);
    }

    #[test]
    fn accesses_reach_the_underlying_memory() {
        let mut word = 0xdead_beefu32;
        let cell = unsafe { &*(&mut word as *mut u32 as *const Volatile<u32>) };
        assert_eq!(cell.read(), 0xdead_beef);
        cell.write(0x0102_0304);
        assert_eq!(cell.read(), 0x0102_0304);
    }
}
