use std::sync::atomic::{AtomicI32, Ordering};

/// Sequence hands out the next consensus instance id. `next` is strictly
/// monotonic within a run; `set` rebases the allocator after recovery, or
/// when the cluster has decided ids this node never allocated locally.
pub trait Sequence: Send + Sync {
    fn next(&self) -> i32;

    fn set(&self, value: i32);

    /// current() returns the value the next call to `next` would hand out.
    fn current(&self) -> i32;
}

/// AtomicSequence guarantees atomicity of each individual operation only.
/// The driver holds its own gate around the check-then-set pairs (allocation
/// vs. rebase), so nothing stronger is needed here.
pub struct AtomicSequence {
    value: AtomicI32,
}

impl AtomicSequence {
    pub fn new() -> Self {
        Self::starting_at(0)
    }

    pub fn starting_at(value: i32) -> Self {
        AtomicSequence {
            value: AtomicI32::new(value),
        }
    }
}

impl Default for AtomicSequence {
    fn default() -> Self {
        Self::new()
    }
}

impl Sequence for AtomicSequence {
    fn next(&self) -> i32 {
        self.value.fetch_add(1, Ordering::AcqRel)
    }

    fn set(&self, value: i32) {
        self.value.store(value, Ordering::Release);
    }

    fn current(&self) -> i32 {
        self.value.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_is_strictly_increasing() {
        let sequence = AtomicSequence::new();

        let allocated: Vec<i32> = (0..10).map(|_| sequence.next()).collect();

        assert_eq!(allocated, (0..10).collect::<Vec<i32>>());
        assert_eq!(sequence.current(), 10);
    }

    #[test]
    fn set_rebases_allocation() {
        let sequence = AtomicSequence::starting_at(3);
        assert_eq!(sequence.current(), 3);

        sequence.set(42);

        assert_eq!(sequence.current(), 42);
        assert_eq!(sequence.next(), 42);
        assert_eq!(sequence.next(), 43);
    }
}
