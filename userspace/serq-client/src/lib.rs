// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Client stub publishing console requests into the shared queue
//! OWNERS: @runtime
//! STATUS: Functional
//! API_STABILITY: Stable
//! TEST_COVERAGE: 10 unit tests, 1 property test
//!
//! PUBLIC API:
//!   - Client: producer side of the queue
//!   - Wait: blocking behaviour when the ring is full
//!   - ClientError: enqueue failures
//!   - format_decimal(): allocation-free integer formatting
//!
//! DEPENDENCIES:
//!   - serq-abi: queue layout and ordering contract
//!   - serq-sync: wait strategies
//!
//! The client never writes a slot the service has not released: every
//! publish is preceded by a capacity check against an Acquire load of the
//! service's cursor.

#![cfg_attr(not(feature = "std"), no_std)]
#![deny(clippy::all, missing_docs)]

use core::fmt;
use core::time::Duration;

use serq_abi::{pending, ProducerEnd, QueueRegion, Record, CAPACITY, OP_CONSOLE_WRITE};
use serq_sync::{spin_until, Spin, WaitStrategy};

/// Result type returned by client operations.
pub type Result<T> = core::result::Result<T, ClientError>;

/// Behaviour of an enqueue when the ring is full.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Wait {
    /// Wait until the service frees a slot.
    Blocking,
    /// Return [`ClientError::WouldBlock`] if the ring is full.
    NonBlocking,
    /// Wait at most this long for a free slot.
    Timeout(Duration),
}

impl Wait {
    /// Returns `true` when the caller requested a non-blocking attempt.
    pub const fn is_non_blocking(self) -> bool {
        matches!(self, Self::NonBlocking)
    }

    /// Converts a [`Wait::Timeout`] variant into its [`Duration`].
    pub const fn timeout(self) -> Option<Duration> {
        match self {
            Self::Timeout(duration) => Some(duration),
            Self::Blocking | Self::NonBlocking => None,
        }
    }
}

/// Errors produced by the client stub.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClientError {
    /// The ring is full and the caller asked not to wait.
    WouldBlock,
    /// The ring stayed full for the whole timeout.
    Timeout,
    /// The queue was closed by this client.
    Closed,
    /// Publishing would wrap the send cursor.
    Exhausted,
    /// Timeouts need a clock, which this build does not have.
    Unsupported,
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WouldBlock => write!(f, "queue full"),
            Self::Timeout => write!(f, "timed out waiting for a free slot"),
            Self::Closed => write!(f, "queue closed"),
            Self::Exhausted => write!(f, "send cursor exhausted"),
            Self::Unsupported => write!(f, "timeouts not supported in this build"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for ClientError {}

/// Producer side of a console queue.
pub struct Client<'q, W: WaitStrategy = Spin> {
    end: ProducerEnd<'q>,
    wait: W,
}

impl<'q> Client<'q, Spin> {
    /// Attaches as the producer of `region`, busy-polling when full.
    ///
    /// # Safety
    ///
    /// No other producer may use `region` while this client exists.
    pub unsafe fn attach(region: &'q QueueRegion) -> Self {
        // SAFETY: forwarded to the caller.
        unsafe { Self::with_wait(region, Spin) }
    }
}

impl<'q, W: WaitStrategy> Client<'q, W> {
    /// Attaches with an explicit wait strategy.
    ///
    /// # Safety
    ///
    /// No other producer may use `region` while this client exists.
    pub unsafe fn with_wait(region: &'q QueueRegion, wait: W) -> Self {
        // SAFETY: forwarded to the caller.
        Self { end: unsafe { region.producer() }, wait }
    }

    /// Records published but not yet consumed.
    pub fn pending(&self) -> u32 {
        pending(self.end.position(), self.end.released())
    }

    /// Whether a record can be published without waiting.
    pub fn has_space(&self) -> bool {
        self.pending() < CAPACITY
    }

    /// Total number of records published so far.
    pub fn sent(&self) -> u32 {
        self.end.position()
    }

    /// Publishes `{opcode, argument}`, waiting for space as long as needed.
    pub fn enqueue(&mut self, opcode: u64, argument: u64) -> Result<()> {
        self.send(Record::new(opcode, argument), Wait::Blocking)
    }

    /// Publishes `{opcode, argument}` only if a slot is free right now.
    pub fn try_enqueue(&mut self, opcode: u64, argument: u64) -> Result<()> {
        self.send(Record::new(opcode, argument), Wait::NonBlocking)
    }

    /// Publishes `record` following `wait` when the ring is full.
    pub fn send(&mut self, record: Record, wait: Wait) -> Result<()> {
        if self.end.is_closed() {
            return Err(ClientError::Closed);
        }
        let cursor = self.end.position();
        let next = cursor.checked_add(1).ok_or(ClientError::Exhausted)?;
        self.wait_for_space(cursor, wait)?;

        // SAFETY: wait_for_space established cursor - released < CAPACITY.
        unsafe { self.end.write(cursor, record) };
        self.end.publish(next);
        log::trace!("serq-client: published {:?} at {}", record, cursor);
        Ok(())
    }

    fn wait_for_space(&mut self, cursor: u32, wait: Wait) -> Result<()> {
        let end = self.end;
        let has_space = move || pending(cursor, end.released()) < CAPACITY;
        match wait {
            Wait::Blocking => {
                spin_until(&mut self.wait, has_space);
                Ok(())
            }
            Wait::NonBlocking => {
                if has_space() {
                    Ok(())
                } else {
                    Err(ClientError::WouldBlock)
                }
            }
            Wait::Timeout(duration) => self.wait_with_timeout(duration, has_space),
        }
    }

    #[cfg(feature = "std")]
    fn wait_with_timeout(&mut self, duration: Duration, ready: impl FnMut() -> bool) -> Result<()> {
        let deadline = std::time::Instant::now() + duration;
        if serq_sync::spin_until_deadline(&mut self.wait, deadline, ready) {
            Ok(())
        } else {
            Err(ClientError::Timeout)
        }
    }

    #[cfg(not(feature = "std"))]
    fn wait_with_timeout(&mut self, _duration: Duration, mut ready: impl FnMut() -> bool) -> Result<()> {
        if ready() {
            Ok(())
        } else {
            Err(ClientError::Unsupported)
        }
    }

    /// Requests one console byte.
    pub fn putchar(&mut self, byte: u8) -> Result<()> {
        self.enqueue(OP_CONSOLE_WRITE, byte as u64)
    }

    /// Requests every byte of `bytes`, in order.
    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        bytes.iter().try_for_each(|byte| self.putchar(*byte))
    }

    /// Prints `n` in decimal followed by a newline.
    pub fn putint(&mut self, n: u64) -> Result<()> {
        let mut buf = [0u8; MAX_DECIMAL_DIGITS];
        let digits = format_decimal(n, &mut buf);
        self.write_bytes(digits)?;
        self.putchar(b'\n')
    }

    /// Tells the service no further records will be published.
    pub fn close(&mut self) {
        if !self.end.is_closed() {
            log::debug!("serq-client: closing after {} records", self.end.position());
            self.end.close();
        }
    }

    /// Whether [`Client::close`] was called.
    pub fn is_closed(&self) -> bool {
        self.end.is_closed()
    }
}

impl<W: WaitStrategy> fmt::Write for Client<'_, W> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.write_bytes(s.as_bytes()).map_err(|_| fmt::Error)
    }
}

/// Digits in `u64::MAX`.
pub const MAX_DECIMAL_DIGITS: usize = 20;

/// Formats `n` in decimal into the tail of `buf` and returns the digits.
pub fn format_decimal(mut n: u64, buf: &mut [u8; MAX_DECIMAL_DIGITS]) -> &[u8] {
    let mut start = buf.len();
    loop {
        start -= 1;
        buf[start] = b'0' + (n % 10) as u8;
        n /= 10;
        if n == 0 {
            break;
        }
    }
    &buf[start..]
}
