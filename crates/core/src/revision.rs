//! Revisions and the clocks that mint them.
//!
//! Every mutation anywhere in a graph advances a clock and stamps the
//! mutated node with the new revision. The process-wide [`GlobalClock`] is
//! initialized at start and never reset; [`ManualClock`] can be injected
//! through [`ClockRef`] when a test needs deterministic revision numbers.

use alloc::rc::Rc;
use core::cell::Cell;
use core::fmt;
use core::sync::atomic::{AtomicU64, Ordering};

/// A point in a clock's issuance order.
///
/// Revisions are compared with plain ordering; overflow is not handled.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Revision(u64);

impl Revision {
    /// The revision before any mutation.
    pub const ZERO: Revision = Revision(0);

    /// Creates a revision from a raw counter value.
    #[inline]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the raw counter value.
    #[inline]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

/// A source of strictly increasing revisions.
pub trait Clock {
    /// Returns the most recently issued revision.
    fn current(&self) -> Revision;

    /// Issues and returns a new revision, greater than every earlier one.
    fn advance(&self) -> Revision;
}

/// Process-wide revision counter.
static GLOBAL_REVISION: AtomicU64 = AtomicU64::new(0);

/// The process-wide clock shared by every graph that does not inject one.
#[derive(Clone, Copy, Debug, Default)]
pub struct GlobalClock;

impl Clock for GlobalClock {
    fn current(&self) -> Revision {
        Revision(GLOBAL_REVISION.load(Ordering::SeqCst))
    }

    fn advance(&self) -> Revision {
        Revision(GLOBAL_REVISION.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

/// A single-threaded clock with a caller-chosen starting point.
#[derive(Debug, Default)]
pub struct ManualClock {
    last: Cell<u64>,
}

impl ManualClock {
    /// Creates a clock whose first issued revision is 1.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a clock whose first issued revision is `start + 1`.
    pub fn starting_at(start: u64) -> Self {
        Self {
            last: Cell::new(start),
        }
    }
}

impl Clock for ManualClock {
    fn current(&self) -> Revision {
        Revision(self.last.get())
    }

    fn advance(&self) -> Revision {
        let next = self.last.get() + 1;
        self.last.set(next);
        Revision(next)
    }
}

/// Handle to the clock a graph of nodes is bound to.
///
/// Nodes created beneath a node inherit its clock; two handles are the
/// same clock when both are global or both point at the same injected one.
#[derive(Clone, Default)]
pub enum ClockRef {
    /// The process-wide clock
    #[default]
    Global,
    /// An injected clock
    Shared(Rc<dyn Clock>),
}

impl ClockRef {
    /// Wraps an injected clock.
    pub fn shared(clock: impl Clock + 'static) -> Self {
        ClockRef::Shared(Rc::new(clock))
    }

    /// Returns true if both handles refer to the same clock.
    pub fn same(&self, other: &ClockRef) -> bool {
        match (self, other) {
            (ClockRef::Global, ClockRef::Global) => true,
            (ClockRef::Shared(a), ClockRef::Shared(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl Clock for ClockRef {
    fn current(&self) -> Revision {
        match self {
            ClockRef::Global => GlobalClock.current(),
            ClockRef::Shared(clock) => clock.current(),
        }
    }

    fn advance(&self) -> Revision {
        match self {
            ClockRef::Global => GlobalClock.advance(),
            ClockRef::Shared(clock) => clock.advance(),
        }
    }
}

impl fmt::Debug for ClockRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClockRef::Global => f.write_str("ClockRef::Global"),
            ClockRef::Shared(clock) => write!(f, "ClockRef::Shared({})", clock.current()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_global_clock_strictly_increases() {
        let a = GlobalClock.advance();
        let b = GlobalClock.advance();
        assert!(b > a);
        assert!(GlobalClock.current() >= b);
    }

    #[test]
    fn test_manual_clock_is_deterministic() {
        let clock = ManualClock::new();
        assert_eq!(clock.current(), Revision::ZERO);
        assert_eq!(clock.advance(), Revision::new(1));
        assert_eq!(clock.advance(), Revision::new(2));
        assert_eq!(clock.current(), Revision::new(2));

        let clock = ManualClock::starting_at(100);
        assert_eq!(clock.advance().get(), 101);
    }

    #[test]
    fn test_clock_ref_identity() {
        let a = ClockRef::shared(ManualClock::new());
        let b = a.clone();
        let c = ClockRef::shared(ManualClock::new());

        assert!(a.same(&b));
        assert!(!a.same(&c));
        assert!(ClockRef::Global.same(&ClockRef::default()));
        assert!(!ClockRef::Global.same(&a));

        b.advance();
        assert_eq!(a.current(), Revision::new(1));
    }
}
