//! Bit-flag event group
//!
//! A small synchronization primitive modelled on the RTOS "event group": any
//! number of producers set or clear bits, and a waiter suspends until a mask
//! of bits is satisfied or a deadline elapses.
//!
//! Bits are latches. Nothing clears them implicitly unless the waiter asks
//! for clear-on-exit, so a producer can set a bit before anyone waits and the
//! waiter still observes it.

use core::cell::RefCell;
use core::future::poll_fn;
use core::task::Poll;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::waitqueue::MultiWakerRegistration;
use embassy_time::{Duration, with_timeout};

/// Raw bit set stored by an [`EventGroup`].
pub type EventBits = u32;

/// Maximum number of tasks that can wait on one group at the same time.
///
/// Registering more waiters than this wakes all of them so they re-register;
/// nothing is lost, it only costs a spurious poll.
pub const MAX_WAITERS: usize = 4;

/// How a wait decides that it is satisfied, and what it does on exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WaitMode {
    /// Require every bit of the mask instead of any one of them.
    pub wait_for_all: bool,
    /// Clear the waited bits when the wait is satisfied.
    pub clear_on_exit: bool,
}

impl WaitMode {
    /// Wake on any bit of the mask, leave bits untouched.
    pub const ANY: Self = Self {
        wait_for_all: false,
        clear_on_exit: false,
    };

    /// Wake once every bit of the mask is set, leave bits untouched.
    pub const ALL: Self = Self {
        wait_for_all: true,
        clear_on_exit: false,
    };

    pub const fn clearing(self) -> Self {
        Self {
            clear_on_exit: true,
            ..self
        }
    }

    const fn is_satisfied(self, bits: EventBits, mask: EventBits) -> bool {
        if self.wait_for_all {
            bits & mask == mask
        } else {
            bits & mask != 0
        }
    }
}

struct Inner {
    bits: EventBits,
    waiters: MultiWakerRegistration<MAX_WAITERS>,
}

/// Many-producer bit-flag group with async waiting.
pub struct EventGroup<M: RawMutex> {
    inner: Mutex<M, RefCell<Inner>>,
}

impl<M: RawMutex> EventGroup<M> {
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(RefCell::new(Inner {
                bits: 0,
                waiters: MultiWakerRegistration::new(),
            })),
        }
    }

    /// Current bit set.
    pub fn bits(&self) -> EventBits {
        self.inner.lock(|inner| inner.borrow().bits)
    }

    /// Set `bits` and wake every waiter. Returns the resulting bit set.
    pub fn set_bits(&self, bits: EventBits) -> EventBits {
        self.inner.lock(|inner| {
            let mut inner = inner.borrow_mut();
            inner.bits |= bits;
            inner.waiters.wake();
            inner.bits
        })
    }

    /// Clear `bits`. Returns the bit set as it was before clearing.
    pub fn clear_bits(&self, bits: EventBits) -> EventBits {
        self.inner.lock(|inner| {
            let mut inner = inner.borrow_mut();
            let previous = inner.bits;
            inner.bits &= !bits;
            previous
        })
    }

    /// Wait until `mask` is satisfied according to `mode`.
    ///
    /// Returns the bit set observed at the moment the wait was satisfied,
    /// before any clear-on-exit is applied.
    pub async fn wait_bits(&self, mask: EventBits, mode: WaitMode) -> EventBits {
        poll_fn(|cx| {
            self.inner.lock(|inner| {
                let mut inner = inner.borrow_mut();
                let bits = inner.bits;
                if mode.is_satisfied(bits, mask) {
                    if mode.clear_on_exit {
                        inner.bits &= !mask;
                    }
                    Poll::Ready(bits)
                } else {
                    inner.waiters.register(cx.waker());
                    Poll::Pending
                }
            })
        })
        .await
    }

    /// Like [`wait_bits`](Self::wait_bits), bounded by `timeout`.
    ///
    /// On timeout the current bit set is returned unchanged; the caller
    /// tells the two cases apart by checking the mask against the result.
    pub async fn wait_bits_timeout(
        &self,
        mask: EventBits,
        mode: WaitMode,
        timeout: Duration,
    ) -> EventBits {
        match with_timeout(timeout, self.wait_bits(mask, mode)).await {
            Ok(bits) => bits,
            Err(_) => self.bits(),
        }
    }
}

impl<M: RawMutex> Default for EventGroup<M> {
    fn default() -> Self {
        Self::new()
    }
}
