//! Fixed-width vector clocks and the happens-before partial order.
//!
//! Every thread, lock, and event carries a clock of the same width `N`
//! (the configured thread bound). Component `i` of a thread clock is only
//! ever written by thread `i`; lock clocks only grow through `merge_max`.

use std::fmt;

/// Relation between two vector-clock snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClockOrder {
    /// Every component is equal.
    Equal,
    /// The left clock happens-before the right one.
    Before,
    /// The right clock happens-before the left one.
    After,
    /// Neither clock dominates the other.
    Concurrent,
}

impl ClockOrder {
    /// The relation seen from the other operand.
    #[must_use]
    pub const fn reversed(self) -> Self {
        match self {
            Self::Before => Self::After,
            Self::After => Self::Before,
            other => other,
        }
    }

    /// True when a definite causal order exists.
    #[must_use]
    pub const fn is_ordered(self) -> bool {
        matches!(self, Self::Before | Self::After)
    }
}

/// Per-thread logical counters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VectorClock {
    counters: Box<[u32]>,
}

impl VectorClock {
    /// Clock with every component at zero (lock clocks).
    #[must_use]
    pub fn zeroed(width: usize) -> Self {
        Self::filled(width, 0)
    }

    /// Clock with every component at `value` (thread clocks start at 1).
    #[must_use]
    pub fn filled(width: usize, value: u32) -> Self {
        Self {
            counters: vec![value; width].into_boxed_slice(),
        }
    }

    #[must_use]
    pub fn width(&self) -> usize {
        self.counters.len()
    }

    /// Component `i`, or 0 when `i` is outside the clock.
    #[must_use]
    pub fn get(&self, i: usize) -> u32 {
        self.counters.get(i).copied().unwrap_or(0)
    }

    #[must_use]
    pub fn as_slice(&self) -> &[u32] {
        &self.counters
    }

    /// Advance the component owned by `owner`.
    pub fn increment(&mut self, owner: usize) {
        let slot = &mut self.counters[owner];
        *slot = slot.saturating_add(1);
    }

    /// Component-wise maximum with `other`.
    pub fn merge_max(&mut self, other: &Self) {
        assert_eq!(
            self.width(),
            other.width(),
            "vector clocks of different widths cannot be merged"
        );
        for (mine, theirs) in self.counters.iter_mut().zip(other.counters.iter()) {
            *mine = (*mine).max(*theirs);
        }
    }

    /// Largest single component.
    #[must_use]
    pub fn max_component(&self) -> u32 {
        self.counters.iter().copied().max().unwrap_or(0)
    }

    /// Partial order between `self` and `other` in one pass.
    ///
    /// The running hypothesis starts undetermined, settles on the first
    /// non-equal component, and collapses to [`ClockOrder::Concurrent`] on the
    /// first component that contradicts it.
    #[must_use]
    pub fn compare(&self, other: &Self) -> ClockOrder {
        assert_eq!(
            self.width(),
            other.width(),
            "vector clocks of different widths cannot be compared"
        );
        assert!(self.width() > 0, "zero-width vector clock");

        let mut order = ClockOrder::Equal;
        for (mine, theirs) in self.counters.iter().zip(other.counters.iter()) {
            order = match (order, mine.cmp(theirs)) {
                (current, std::cmp::Ordering::Equal) => current,
                (ClockOrder::Equal | ClockOrder::Before, std::cmp::Ordering::Less) => {
                    ClockOrder::Before
                }
                (ClockOrder::Equal | ClockOrder::After, std::cmp::Ordering::Greater) => {
                    ClockOrder::After
                }
                _ => return ClockOrder::Concurrent,
            };
        }
        order
    }
}

impl fmt::Display for VectorClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, c) in self.counters.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{c}")?;
        }
        write!(f, "]")
    }
}
