/*
 * The scoped lock underneath every shared structure in this firmware. Two
 * flavours with one API:
 *   - on the bare-metal ARM target, `lock` saves PRIMASK and disables
 *     interrupts, so the critical section excludes the one other execution
 *     context that exists (the USB interrupt handler). Dropping the guard
 *     restores PRIMASK, which nests correctly: an inner guard taken with
 *     interrupts already masked leaves them masked on release.
 *   - everywhere else (host tests), a spinning_top spinlock, so threads
 *     contend for real.
 *
 * The lock is not re-entrant: a context that already holds it must not
 * acquire it again. On the target that is detected and panics; on the host
 * it spins forever, as any non-reentrant mutex would. Code in this tree
 * therefore keeps all cursor/table manipulation in non-locking internal
 * methods and takes the lock exactly once per public operation.
 *
 * Single-core discipline: the target flavour is sound only while nothing
 * runs on the second core. This firmware never starts core 1.
 */

#[cfg(all(target_arch = "arm", target_os = "none"))]
mod imp {
    use core::cell::UnsafeCell;
    use core::ops::{Deref, DerefMut};

    pub struct IrqLock<T> {
        held: UnsafeCell<bool>,
        value: UnsafeCell<T>,
    }

    unsafe impl<T: Send> Send for IrqLock<T> {}
    unsafe impl<T: Send> Sync for IrqLock<T> {}

    impl<T> IrqLock<T> {
        pub const fn new(value: T) -> IrqLock<T> {
            IrqLock { held: UnsafeCell::new(false), value: UnsafeCell::new(value) }
        }

        pub fn lock(&self) -> IrqGuard<'_, T> {
            let was_active = cortex_m::register::primask::read().is_active();
            cortex_m::interrupt::disable();

            /*
             * Interrupts are now masked and core 1 is never started, so we
             * are the only context touching `held`.
             */
            let held = unsafe { &mut *self.held.get() };
            if *held {
                panic!("IrqLock re-entered from the same context");
            }
            *held = true;

            IrqGuard { lock: self, restore_irqs: was_active }
        }
    }

    pub struct IrqGuard<'a, T> {
        lock: &'a IrqLock<T>,
        restore_irqs: bool,
    }

    impl<'a, T> Deref for IrqGuard<'a, T> {
        type Target = T;

        fn deref(&self) -> &T {
            unsafe { &*self.lock.value.get() }
        }
    }

    impl<'a, T> DerefMut for IrqGuard<'a, T> {
        fn deref_mut(&mut self) -> &mut T {
            unsafe { &mut *self.lock.value.get() }
        }
    }

    impl<'a, T> Drop for IrqGuard<'a, T> {
        fn drop(&mut self) {
            unsafe {
                *self.lock.held.get() = false;
                if self.restore_irqs {
                    cortex_m::interrupt::enable();
                }
            }
        }
    }
}

#[cfg(not(all(target_arch = "arm", target_os = "none")))]
mod imp {
    use core::ops::{Deref, DerefMut};
    use spinning_top::{guard::SpinlockGuard, Spinlock};

    pub struct IrqLock<T>(Spinlock<T>);

    impl<T> IrqLock<T> {
        pub const fn new(value: T) -> IrqLock<T> {
            IrqLock(Spinlock::new(value))
        }

        pub fn lock(&self) -> IrqGuard<'_, T> {
            IrqGuard(self.0.lock())
        }
    }

    pub struct IrqGuard<'a, T>(SpinlockGuard<'a, T>);

    impl<'a, T> Deref for IrqGuard<'a, T> {
        type Target = T;

        fn deref(&self) -> &T {
            &self.0
        }
    }

    impl<'a, T> DerefMut for IrqGuard<'a, T> {
        fn deref_mut(&mut self) -> &mut T {
            &mut self.0
        }
    }
}

pub use imp::{IrqGuard, IrqLock};

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::vec::Vec;

    #[test]
    fn guard_gives_access_and_releases_on_drop() {
        let lock = IrqLock::new(7u32);
        {
            let mut guard = lock.lock();
            *guard += 1;
        }
        assert_eq!(*lock.lock(), 8);
    }

    #[test]
    fn contended_increments_are_not_lost() {
        let lock = Arc::new(IrqLock::new(0u64));
        let threads: Vec<_> = (0..4)
            .map(|_| {
                let lock = lock.clone();
                thread::spawn(move || {
                    for _ in 0..10_000 {
                        *lock.lock() += 1;
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }
        assert_eq!(*lock.lock(), 40_000);
    }
}
