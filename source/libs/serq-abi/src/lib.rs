// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Shared layout of the console request queue page
//! OWNERS: @runtime
//! STATUS: Functional
//! API_STABILITY: Stable
//! TEST_COVERAGE: 11 unit tests, 1 integration test file
//!
//! PUBLIC API:
//!   - Record: opcode/argument pair stored in each slot
//!   - Opcode: decoded operation selector
//!   - QueueRegion: the page shared by client and service
//!   - ProducerEnd / ConsumerEnd: role views carrying the ordering contract
//!
//! DEPENDENCIES:
//!   - static_assertions: compile-time layout checks
//!
//! The region is written by two independently built contexts, so every offset
//! below is part of the ABI and is pinned by `const_assert_eq!`. The ordering
//! contract is: payload writes happen-before a Release store of a cursor, and
//! an Acquire load of that cursor happens-before the peer reads the payload.

#![cfg_attr(not(any(test, feature = "std")), no_std)]
#![deny(clippy::all, missing_docs)]

use core::cell::UnsafeCell;
use core::fmt;
use core::mem::{align_of, offset_of, size_of};
use core::sync::atomic::{AtomicU32, AtomicU8, Ordering};

use static_assertions::const_assert_eq;

/// Number of record slots in the ring.
pub const CAPACITY: u32 = 255;

/// Size of the shared region; one page.
pub const REGION_SIZE: usize = 0x1000;

/// Byte offset of `receive_cursor` inside the region.
pub const RECEIVE_CURSOR_OFFSET: usize = 0;
/// Byte offset of `send_cursor` inside the region.
pub const SEND_CURSOR_OFFSET: usize = 4;
/// Byte offset of the reserved `sleep_flag`.
pub const SLEEP_FLAG_OFFSET: usize = 8;
/// Byte offset of `closed_flag`.
pub const CLOSED_FLAG_OFFSET: usize = 9;
/// Byte offset of the first slot.
pub const SLOTS_OFFSET: usize = 16;

/// Raw opcode requesting "write the low byte of the argument to the console".
pub const OP_CONSOLE_WRITE: u64 = 0x1;

/// A single request as stored in a slot.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Record {
    /// Operation selector.
    pub opcode: u64,
    /// Operation payload.
    pub argument: u64,
}

impl Record {
    /// All-zero record, the content of a freshly bootstrapped slot.
    pub const ZERO: Self = Self { opcode: 0, argument: 0 };

    /// Creates a record from raw parts.
    pub const fn new(opcode: u64, argument: u64) -> Self {
        Self { opcode, argument }
    }

    /// Creates a console write request for `byte`.
    pub const fn console_write(byte: u8) -> Self {
        Self { opcode: OP_CONSOLE_WRITE, argument: byte as u64 }
    }

    /// Decodes the opcode field.
    pub const fn op(&self) -> Opcode {
        Opcode::decode(self.opcode)
    }

    /// Low eight bits of the argument; the only part a console write uses.
    pub const fn low_byte(&self) -> u8 {
        self.argument as u8
    }
}

/// Decoded operation selector.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Opcode {
    /// Emit the low byte of the argument on the console device.
    ConsoleWrite,
    /// Any opcode this version does not define.
    Unsupported(u64),
}

impl Opcode {
    /// Maps a raw opcode onto a known operation.
    pub const fn decode(raw: u64) -> Self {
        match raw {
            OP_CONSOLE_WRITE => Self::ConsoleWrite,
            other => Self::Unsupported(other),
        }
    }

    /// Returns the raw wire value.
    pub const fn raw(self) -> u64 {
        match self {
            Self::ConsoleWrite => OP_CONSOLE_WRITE,
            Self::Unsupported(raw) => raw,
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConsoleWrite => write!(f, "console-write"),
            Self::Unsupported(raw) => write!(f, "unsupported({raw:#x})"),
        }
    }
}

/// Maps a monotonic cursor onto its slot.
#[inline]
pub const fn slot_index(cursor: u32) -> usize {
    (cursor % CAPACITY) as usize
}

/// Number of published-but-unconsumed records for a cursor pair.
#[inline]
pub const fn pending(send: u32, recv: u32) -> u32 {
    send.wrapping_sub(recv)
}

#[repr(transparent)]
struct Slot(UnsafeCell<Record>);

/// The page shared between the client and the service.
///
/// `receive_cursor` is written only by the service and `send_cursor` only by
/// the client. Slot contents are handed over through those two cursors; see
/// [`ProducerEnd`] and [`ConsumerEnd`].
#[repr(C)]
pub struct QueueRegion {
    receive_cursor: AtomicU32,
    send_cursor: AtomicU32,
    // Reserved; nothing in this version reads or writes it.
    #[allow(dead_code)]
    sleep_flag: AtomicU8,
    closed_flag: AtomicU8,
    slots: [Slot; CAPACITY as usize],
}

// SAFETY: slot access is partitioned by the cursor protocol; cursors and flags
// are atomics.
unsafe impl Sync for QueueRegion {}

const_assert_eq!(size_of::<Record>(), 16);
const_assert_eq!(size_of::<QueueRegion>(), REGION_SIZE);
const_assert_eq!(align_of::<QueueRegion>(), 8);
const_assert_eq!(offset_of!(QueueRegion, receive_cursor), RECEIVE_CURSOR_OFFSET);
const_assert_eq!(offset_of!(QueueRegion, send_cursor), SEND_CURSOR_OFFSET);
const_assert_eq!(offset_of!(QueueRegion, sleep_flag), SLEEP_FLAG_OFFSET);
const_assert_eq!(offset_of!(QueueRegion, closed_flag), CLOSED_FLAG_OFFSET);
const_assert_eq!(offset_of!(QueueRegion, slots), SLOTS_OFFSET);

/// Reasons a raw pointer cannot be attached as a region.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LayoutError {
    /// The pointer was null.
    Null,
    /// The pointer does not satisfy the region's alignment.
    Misaligned {
        /// Address that was supplied.
        addr: usize,
        /// Required alignment.
        align: usize,
    },
}

impl fmt::Display for LayoutError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "queue region pointer is null"),
            Self::Misaligned { addr, align } => {
                write!(f, "queue region at {addr:#x} is not {align}-byte aligned")
            }
        }
    }
}

#[cfg(any(test, feature = "std"))]
impl std::error::Error for LayoutError {}

impl fmt::Debug for QueueRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (send, recv) = self.cursors();
        f.debug_struct("QueueRegion")
            .field("send_cursor", &send)
            .field("receive_cursor", &recv)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl Default for QueueRegion {
    fn default() -> Self {
        Self::new()
    }
}

impl QueueRegion {
    /// Returns a zeroed region, as bootstrap hands it out.
    pub const fn new() -> Self {
        Self {
            receive_cursor: AtomicU32::new(0),
            send_cursor: AtomicU32::new(0),
            sleep_flag: AtomicU8::new(0),
            closed_flag: AtomicU8::new(0),
            slots: [const { Slot(UnsafeCell::new(Record::ZERO)) }; CAPACITY as usize],
        }
    }

    /// Attaches to a region mapped by someone else.
    ///
    /// # Safety
    ///
    /// `ptr` must point to `REGION_SIZE` bytes that stay mapped for `'a` and
    /// were zeroed (or otherwise initialised as a region) before either
    /// context started using them.
    pub unsafe fn from_raw<'a>(ptr: *mut u8) -> Result<&'a Self, LayoutError> {
        if ptr.is_null() {
            return Err(LayoutError::Null);
        }
        let addr = ptr as usize;
        if addr % align_of::<Self>() != 0 {
            return Err(LayoutError::Misaligned { addr, align: align_of::<Self>() });
        }
        // SAFETY: non-null, aligned, and validity is the caller's contract.
        Ok(unsafe { &*(ptr as *const Self) })
    }

    /// Client view of the region.
    ///
    /// # Safety
    ///
    /// At most one producer end may be in use for a region at any time.
    pub unsafe fn producer(&self) -> ProducerEnd<'_> {
        ProducerEnd { region: self }
    }

    /// Service view of the region.
    ///
    /// # Safety
    ///
    /// At most one consumer end may be in use for a region at any time.
    pub unsafe fn consumer(&self) -> ConsumerEnd<'_> {
        ConsumerEnd { region: self }
    }

    /// Snapshot of both cursors, for diagnostics only.
    pub fn cursors(&self) -> (u32, u32) {
        (
            self.send_cursor.load(Ordering::Acquire),
            self.receive_cursor.load(Ordering::Acquire),
        )
    }

    /// Whether the client has closed the queue.
    pub fn is_closed(&self) -> bool {
        self.closed_flag.load(Ordering::Acquire) != 0
    }

    fn slot_ptr(&self, cursor: u32) -> *mut Record {
        self.slots[slot_index(cursor)].0.get()
    }
}

/// Write side of the region. Owns `send_cursor` and `closed_flag`.
#[derive(Clone, Copy)]
pub struct ProducerEnd<'a> {
    region: &'a QueueRegion,
}

impl<'a> ProducerEnd<'a> {
    /// Next cursor this producer will publish. Relaxed: only we write it.
    #[inline]
    pub fn position(&self) -> u32 {
        self.region.send_cursor.load(Ordering::Relaxed)
    }

    /// Service progress. Acquire pairs with the service's Release store, so a
    /// slot below this cursor is no longer being read.
    #[inline]
    pub fn released(&self) -> u32 {
        self.region.receive_cursor.load(Ordering::Acquire)
    }

    /// Stores `record` into the slot for `cursor` without publishing it.
    ///
    /// # Safety
    ///
    /// The slot must be client-owned: `cursor - released() < CAPACITY`.
    /// Writing an unreleased slot overwrites a record the service has not
    /// read yet.
    #[inline]
    pub unsafe fn write(&self, cursor: u32, record: Record) {
        // SAFETY: slot ownership is the caller's contract.
        unsafe { core::ptr::write_volatile(self.region.slot_ptr(cursor), record) }
    }

    /// Publishes every slot below `next`. Release makes the preceding slot
    /// writes visible to the service's Acquire load.
    #[inline]
    pub fn publish(&self, next: u32) {
        self.region.send_cursor.store(next, Ordering::Release);
    }

    /// Marks the queue closed. Must follow the final `publish`.
    #[inline]
    pub fn close(&self) {
        self.region.closed_flag.store(1, Ordering::Release);
    }

    /// Whether `close` has already been called.
    #[inline]
    pub fn is_closed(&self) -> bool {
        self.region.closed_flag.load(Ordering::Relaxed) != 0
    }

    /// The underlying region.
    pub fn region(&self) -> &'a QueueRegion {
        self.region
    }
}

/// Read side of the region. Owns `receive_cursor`.
#[derive(Clone, Copy)]
pub struct ConsumerEnd<'a> {
    region: &'a QueueRegion,
}

impl<'a> ConsumerEnd<'a> {
    /// Next cursor this consumer will read. Relaxed: only we write it.
    #[inline]
    pub fn position(&self) -> u32 {
        self.region.receive_cursor.load(Ordering::Relaxed)
    }

    /// Client progress. Acquire pairs with the client's Release publish, so
    /// every slot below this cursor holds its final contents.
    #[inline]
    pub fn published(&self) -> u32 {
        self.region.send_cursor.load(Ordering::Acquire)
    }

    /// Reads the slot for `cursor`.
    ///
    /// # Safety
    ///
    /// The slot must be service-owned: `cursor` is below `published()` and not
    /// yet released.
    #[inline]
    pub unsafe fn read(&self, cursor: u32) -> Record {
        // SAFETY: slot ownership is the caller's contract.
        unsafe { core::ptr::read_volatile(self.region.slot_ptr(cursor)) }
    }

    /// Hands every slot below `next` back to the client. Release keeps the
    /// slot reads ordered before the client can observe the slot as free.
    #[inline]
    pub fn release(&self, next: u32) {
        self.region.receive_cursor.store(next, Ordering::Release);
    }

    /// Whether the client has closed the queue.
    #[inline]
    pub fn is_closed(&self) -> bool {
        self.region.is_closed()
    }

    /// The underlying region.
    pub fn region(&self) -> &'a QueueRegion {
        self.region
    }
}
