// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Wait strategies for environments without blocking primitives.
//!
//! Both sides of the console queue wait by re-checking a cursor. A strategy
//! only decides what happens between two checks; the checks themselves (and
//! their memory ordering) belong to the caller.

#![cfg_attr(not(any(test, feature = "std")), no_std)]
#![deny(missing_docs)]

/// What to do while a condition is not yet true.
pub trait WaitStrategy {
    /// Called once per failed check.
    fn idle(&mut self);

    /// Called after progress was made.
    fn reset(&mut self) {}
}

impl<W: WaitStrategy + ?Sized> WaitStrategy for &mut W {
    fn idle(&mut self) {
        (**self).idle();
    }

    fn reset(&mut self) {
        (**self).reset();
    }
}

/// Pure busy-poll.
#[derive(Clone, Copy, Debug, Default)]
pub struct Spin;

impl WaitStrategy for Spin {
    #[inline]
    fn idle(&mut self) {
        core::hint::spin_loop();
    }
}

/// Re-checks `ready` until it returns `true`, idling in between.
pub fn spin_until<W: WaitStrategy + ?Sized>(wait: &mut W, mut ready: impl FnMut() -> bool) {
    while !ready() {
        wait.idle();
    }
    wait.reset();
}

#[cfg(feature = "std")]
mod backoff;

#[cfg(feature = "std")]
pub use backoff::{spin_until_deadline, Backoff, StrategyKind, WaitConfig, Waiter};
