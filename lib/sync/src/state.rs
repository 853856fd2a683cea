use crate::IrqLock;

/// A single finite-state value shared between interrupt and main context.
/// All mutation goes through [`transition`](StateHolder::transition)
/// (compare-and-set) or [`force_transition`](StateHolder::force_transition)
/// (unconditional), so concurrent observers can race for a state change and
/// exactly one of them wins. There is no history and no notification; code
/// that wants to act "on transition" polls `transition` itself and uses the
/// return value as the edge.
pub struct StateHolder<T> {
    state: IrqLock<T>,
}

impl<T> StateHolder<T>
where
    T: Copy + PartialEq,
{
    pub const fn new(initial: T) -> StateHolder<T> {
        StateHolder { state: IrqLock::new(initial) }
    }

    pub fn get(&self) -> T {
        *self.state.lock()
    }

    pub fn is(&self, value: T) -> bool {
        *self.state.lock() == value
    }

    /// If the current state equals `expected`, move to `next` and return
    /// `true`. Otherwise leave the state untouched and return `false` — a
    /// lost race, not an error; the caller decides whether it cares.
    pub fn transition(&self, expected: T, next: T) -> bool {
        let mut state = self.state.lock();
        if *state == expected {
            *state = next;
            true
        } else {
            false
        }
    }

    /// Overwrite the state regardless of what it currently is. For reset and
    /// fault-recovery paths that must succeed from any prior state.
    pub fn force_transition(&self, next: T) {
        *self.state.lock() = next;
    }
}
