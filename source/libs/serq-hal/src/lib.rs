// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Device access traits for the console request service
//! OWNERS: @runtime
//! STATUS: Functional
//! API_STABILITY: Stable
//! TEST_COVERAGE: 5 unit tests
//!
//! PUBLIC API:
//!   - Bus: byte-wide register access
//!   - ByteSink: write-only byte device the service dispatches into
//!   - MmioBus / MmioSink: volatile MMIO implementations
//!   - CaptureSink / IoSink: host sinks (std)

#![cfg_attr(not(any(test, feature = "std")), no_std)]

/// Byte-wide register access shared by console drivers.
pub trait Bus {
    fn read(&self, offset: usize) -> u8;
    fn write(&self, offset: usize, value: u8);
}

/// A write-only byte device. Writing is the whole contract: no
/// acknowledgement and no error.
pub trait ByteSink {
    fn put(&mut self, byte: u8);

    /// Pushes buffered bytes to the device, if the sink buffers at all.
    fn flush(&mut self) {}
}

impl<S: ByteSink + ?Sized> ByteSink for &mut S {
    fn put(&mut self, byte: u8) {
        (**self).put(byte);
    }

    fn flush(&mut self) {
        (**self).flush();
    }
}

/// Register window at a fixed physical or virtual address.
///
/// Register `n` lives at `base + (n << shift)`.
pub struct MmioBus {
    base: usize,
    shift: usize,
}

impl MmioBus {
    /// # Safety
    ///
    /// `base` must map a device register window that stays valid for the
    /// lifetime of the bus, and nothing else may assume exclusive access to it.
    pub const unsafe fn new(base: usize, shift: usize) -> Self {
        Self { base, shift }
    }

    fn reg(&self, offset: usize) -> usize {
        self.base + (offset << self.shift)
    }
}

impl Bus for MmioBus {
    fn read(&self, offset: usize) -> u8 {
        // SAFETY: validity of the window is the constructor's contract.
        unsafe { core::ptr::read_volatile(self.reg(offset) as *const u8) }
    }

    fn write(&self, offset: usize, value: u8) {
        // SAFETY: validity of the window is the constructor's contract.
        unsafe { core::ptr::write_volatile(self.reg(offset) as *mut u8, value) }
    }
}

/// A single volatile byte-wide write-only address.
pub struct MmioSink {
    addr: *mut u8,
}

// SAFETY: the sink only ever performs volatile stores to a device address.
unsafe impl Send for MmioSink {}

impl MmioSink {
    /// # Safety
    ///
    /// `addr` must be a writable device register (or memory) for as long as
    /// the sink is used.
    pub const unsafe fn new(addr: *mut u8) -> Self {
        Self { addr }
    }
}

impl ByteSink for MmioSink {
    fn put(&mut self, byte: u8) {
        // SAFETY: validity of the address is the constructor's contract.
        unsafe { core::ptr::write_volatile(self.addr, byte) }
    }
}

#[cfg(any(test, feature = "std"))]
mod host {
    use super::ByteSink;

    /// Records every byte; used by tests and the host harness.
    #[derive(Clone, Debug, Default, PartialEq, Eq)]
    pub struct CaptureSink {
        bytes: Vec<u8>,
    }

    impl CaptureSink {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn bytes(&self) -> &[u8] {
            &self.bytes
        }

        pub fn into_bytes(self) -> Vec<u8> {
            self.bytes
        }
    }

    impl ByteSink for CaptureSink {
        fn put(&mut self, byte: u8) {
            self.bytes.push(byte);
        }
    }

    /// Adapts any [`std::io::Write`]. Write errors are dropped, matching a
    /// device with no error signal.
    pub struct IoSink<W: std::io::Write> {
        inner: W,
    }

    impl<W: std::io::Write> IoSink<W> {
        pub fn new(inner: W) -> Self {
            Self { inner }
        }

        pub fn into_inner(self) -> W {
            self.inner
        }
    }

    impl<W: std::io::Write> ByteSink for IoSink<W> {
        fn put(&mut self, byte: u8) {
            let _ = self.inner.write_all(&[byte]);
        }

        fn flush(&mut self) {
            let _ = self.inner.flush();
        }
    }
}

#[cfg(any(test, feature = "std"))]
pub use host::{CaptureSink, IoSink};
