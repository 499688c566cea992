//! Pending asynchronous computations.
//!
//! A [`Pending`] is a value that is not available yet. It is settled exactly
//! once through its [`Resolver`], which synchronously runs every
//! continuation registered on it (state nodes register one per slot that
//! holds the computation). `Pending` also implements [`Future`], so a layer
//! that receives the pending signal while reading a snapshot can await the
//! computation and retry.

use crate::value::Value;
use alloc::boxed::Box;
use alloc::rc::Rc;
use alloc::string::String;
use alloc::vec::Vec;
use core::cell::RefCell;
use core::fmt;
use core::future::Future;
use core::pin::Pin;
use core::sync::atomic::{AtomicU64, Ordering};
use core::task::{Context, Poll, Waker};
use ripple_core::Result;
use thiserror::Error;

/// Unique identifier for a pending computation.
pub type PendingId = u64;

static NEXT_PENDING_ID: AtomicU64 = AtomicU64::new(1);

/// The failure a computation settled with.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("{reason}")]
pub struct Rejection {
    /// Human-readable failure reason
    pub reason: String,
}

/// The outcome of a settled computation.
pub type Settled = core::result::Result<Value, Rejection>;

/// Callback run once when the computation settles.
pub(crate) type Continuation = Box<dyn FnOnce(&Settled) -> Result<()>>;

enum State {
    Waiting {
        continuations: Vec<Continuation>,
        wakers: Vec<Waker>,
    },
    Settled(Settled),
}

struct PendingInner {
    id: PendingId,
    state: RefCell<State>,
}

/// Creates a new pending computation and the handle that settles it.
pub fn pending() -> (Pending, Resolver) {
    let inner = Rc::new(PendingInner {
        id: NEXT_PENDING_ID.fetch_add(1, Ordering::SeqCst),
        state: RefCell::new(State::Waiting {
            continuations: Vec::new(),
            wakers: Vec::new(),
        }),
    });
    (
        Pending {
            inner: inner.clone(),
        },
        Resolver { inner },
    )
}

/// A shared handle to a computation that has not necessarily settled.
#[derive(Clone)]
pub struct Pending {
    inner: Rc<PendingInner>,
}

impl Pending {
    /// Creates a computation that has already resolved to `value`.
    pub fn resolved(value: impl Into<Value>) -> Self {
        Self::settled(Ok(value.into()))
    }

    /// Creates a computation that has already failed.
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::settled(Err(Rejection {
            reason: reason.into(),
        }))
    }

    fn settled(outcome: Settled) -> Self {
        Self {
            inner: Rc::new(PendingInner {
                id: NEXT_PENDING_ID.fetch_add(1, Ordering::SeqCst),
                state: RefCell::new(State::Settled(outcome)),
            }),
        }
    }

    /// Returns the unique ID of this computation.
    #[inline]
    pub fn id(&self) -> PendingId {
        self.inner.id
    }

    /// Returns true once the computation has resolved or failed.
    pub fn is_settled(&self) -> bool {
        matches!(*self.inner.state.borrow(), State::Settled(_))
    }

    /// Returns the outcome if the computation has settled.
    pub fn outcome(&self) -> Option<Settled> {
        match &*self.inner.state.borrow() {
            State::Settled(outcome) => Some(outcome.clone()),
            State::Waiting { .. } => None,
        }
    }

    /// Returns true if both handles refer to the same computation.
    #[inline]
    pub fn ptr_eq(a: &Pending, b: &Pending) -> bool {
        Rc::ptr_eq(&a.inner, &b.inner)
    }

    /// Registers a continuation to run at settlement.
    ///
    /// Returns false without registering if the computation already settled.
    pub(crate) fn on_settle(&self, continuation: Continuation) -> bool {
        match &mut *self.inner.state.borrow_mut() {
            State::Waiting { continuations, .. } => {
                continuations.push(continuation);
                true
            }
            State::Settled(_) => false,
        }
    }
}

impl Future for Pending {
    type Output = Settled;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut *self.inner.state.borrow_mut() {
            State::Settled(outcome) => Poll::Ready(outcome.clone()),
            State::Waiting { wakers, .. } => {
                if !wakers.iter().any(|w| w.will_wake(cx.waker())) {
                    wakers.push(cx.waker().clone());
                }
                Poll::Pending
            }
        }
    }
}

impl fmt::Debug for Pending {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pending")
            .field("id", &self.inner.id)
            .field("settled", &self.is_settled())
            .finish()
    }
}

/// The unique handle that settles a [`Pending`] computation.
///
/// Dropping it without settling leaves the computation pending forever.
pub struct Resolver {
    inner: Rc<PendingInner>,
}

impl Resolver {
    /// Returns the ID of the computation this resolver settles.
    #[inline]
    pub fn id(&self) -> PendingId {
        self.inner.id
    }

    /// Resolves the computation with `value`.
    ///
    /// Every live slot still holding the computation is overwritten with the
    /// value; the first error raised while applying it is returned.
    ///
    /// Resolving a computation with itself fails it instead.
    pub fn resolve(self, value: impl Into<Value>) -> Result<()> {
        match value.into() {
            Value::Pending(p) if Rc::ptr_eq(&p.inner, &self.inner) => self.settle(Err(Rejection {
                reason: String::from("computation resolved to itself"),
            })),
            value => self.settle(Ok(value)),
        }
    }

    /// Fails the computation.
    ///
    /// Returns `Error::Rejected` when at least one live slot still held the
    /// computation at the time it failed.
    pub fn reject(self, reason: impl Into<String>) -> Result<()> {
        self.settle(Err(Rejection {
            reason: reason.into(),
        }))
    }

    fn settle(self, outcome: Settled) -> Result<()> {
        let previous = core::mem::replace(
            &mut *self.inner.state.borrow_mut(),
            State::Settled(outcome.clone()),
        );
        let (continuations, wakers) = match previous {
            State::Waiting {
                continuations,
                wakers,
            } => (continuations, wakers),
            State::Settled(_) => return Ok(()),
        };

        for waker in wakers {
            waker.wake();
        }

        let mut first_err = None;
        for continuation in continuations {
            if let Err(err) = continuation(&outcome) {
                first_err.get_or_insert(err);
            }
        }
        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for Resolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolver").field("id", &self.inner.id).finish()
    }
}
