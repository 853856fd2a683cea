/*
 * Fixed-capacity FIFO shared between interrupt and main context. Two cursors
 * into `N` slots, one slot always left vacant so full and empty are
 * distinguishable without a separate count:
 *
 *      occupied = (N + write - read) % N        (0 ..= N-1)
 *
 * The write cursor is owned by producers, the read cursor by consumers, but
 * either side may run in either context, so every public operation takes the
 * buffer's lock for the few cursor moves and element copies it needs. All
 * cursor arithmetic lives in non-locking methods on the inner state; public
 * operations lock exactly once and never call back into the public API.
 */

use crate::IrqLock;
use core::mem::MaybeUninit;

pub struct RingBuffer<T, const N: usize> {
    inner: IrqLock<Cursors<T, N>>,
}

struct Cursors<T, const N: usize> {
    read: usize,
    write: usize,
    slots: [MaybeUninit<T>; N],
}

impl<T, const N: usize> Cursors<T, N>
where
    T: Copy,
{
    fn occupied(&self) -> usize {
        (N + self.write - self.read) % N
    }

    fn free(&self) -> usize {
        N - 1 - self.occupied()
    }

    /// Caller checks `free() > 0` first.
    fn push(&mut self, value: T) {
        self.slots[self.write].write(value);
        self.write = (self.write + 1) % N;
    }

    /// Caller checks `occupied() > 0` first.
    fn pop(&mut self) -> T {
        let value = unsafe { self.slots[self.read].assume_init_read() };
        self.read = (self.read + 1) % N;
        value
    }
}

impl<T, const N: usize> RingBuffer<T, N>
where
    T: Copy,
{
    pub const fn new() -> RingBuffer<T, N> {
        assert!(N > 1, "a ring buffer needs at least one usable slot");
        RingBuffer {
            inner: IrqLock::new(Cursors {
                read: 0,
                write: 0,
                slots: unsafe { MaybeUninit::<[MaybeUninit<T>; N]>::uninit().assume_init() },
            }),
        }
    }

    /// Appends as many of `items` as currently fit and returns how many that
    /// was. Never blocks waiting for space and never drops silently: a short
    /// count is the caller's signal that the rest was not taken.
    pub fn enqueue(&self, items: &[T]) -> usize {
        let mut inner = self.inner.lock();
        let count = items.len().min(inner.free());
        for &item in &items[..count] {
            inner.push(item);
        }
        count
    }

    /// Moves up to `out.len()` of the oldest items into `out`, returning how
    /// many were moved (less if the buffer empties first).
    pub fn dequeue(&self, out: &mut [T]) -> usize {
        let mut inner = self.inner.lock();
        let count = out.len().min(inner.occupied());
        for slot in &mut out[..count] {
            *slot = inner.pop();
        }
        count
    }

    /// Discards up to `count` of the oldest items without copying them out,
    /// returning how many were discarded.
    pub fn erase(&self, count: usize) -> usize {
        let mut inner = self.inner.lock();
        let count = count.min(inner.occupied());
        inner.read = (inner.read + count) % N;
        count
    }

    /// Moves as many items as fit from `from` into `self`, atomically with
    /// respect to both buffers, and returns how many moved.
    ///
    /// Locks are taken destination first, then source. Every `pull` call site
    /// in the tree must use that same order (it is what makes two buffers
    /// pulling from each other deadlock-free); pull cycles through three or
    /// more buffers are not defended against, and a buffer must never pull
    /// from itself.
    pub fn pull<const M: usize>(&self, from: &RingBuffer<T, M>) -> usize {
        let mut into = self.inner.lock();
        let mut from = from.inner.lock();
        let count = into.free().min(from.occupied());
        for _ in 0..count {
            let value = from.pop();
            into.push(value);
        }
        count
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.read = inner.write;
    }

    /// Scans oldest → newest for `marker` without consuming anything.
    /// Returns the 1-based distance from the read position to the first hit
    /// (so a marker at the very front reports 1, and the return value is
    /// exactly the count to `dequeue` to consume through the marker), or
    /// `None` if the marker is absent.
    pub fn find(&self, marker: T) -> Option<usize>
    where
        T: PartialEq,
    {
        let inner = self.inner.lock();
        for offset in 0..inner.occupied() {
            let slot = (inner.read + offset) % N;
            if unsafe { inner.slots[slot].assume_init_read() } == marker {
                return Some(offset + 1);
            }
        }
        None
    }

    pub fn occupied_count(&self) -> usize {
        self.inner.lock().occupied()
    }

    pub fn free_count(&self) -> usize {
        self.inner.lock().free()
    }

    pub const fn capacity(&self) -> usize {
        N - 1
    }
}
