// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

use log::{debug, error, info, trace, warn};
use serq_abi::{pending, ConsumerEnd, LayoutError, Opcode, QueueRegion, Record, CAPACITY};
use serq_hal::ByteSink;
use serq_sync::{WaitStrategy, Waiter};
use thiserror::Error;

use crate::config::{ServiceConfig, UnsupportedPolicy};

/// Result alias used by the service.
pub type Result<T> = core::result::Result<T, ServiceError>;

/// Errors surfaced while draining the queue.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ServiceError {
    /// The client published more records than the ring holds. Nothing was
    /// consumed; the oldest unread records have already been overwritten.
    #[error("queue overflow: send cursor {send} is more than 255 ahead of receive cursor {recv}")]
    Overflow {
        /// Observed send cursor.
        send: u32,
        /// Observed receive cursor.
        recv: u32,
    },
    /// A record carried an opcode this service does not implement. The
    /// record was consumed.
    #[error("unsupported opcode {opcode:#x} at cursor {cursor}")]
    UnsupportedOpcode {
        /// Raw opcode.
        opcode: u64,
        /// Cursor of the offending record.
        cursor: u32,
    },
    /// The region could not be attached.
    #[error("invalid queue region: {0}")]
    Layout(#[from] LayoutError),
}

/// Result of a single poll.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PollOutcome {
    /// Nothing was published since the last poll.
    Idle,
    /// One record was consumed and its byte written to the device.
    Wrote(u8),
    /// One record with an unknown opcode was consumed without side effects.
    Skipped {
        /// Raw opcode of the skipped record.
        opcode: u64,
    },
}

/// Why [`ConsoleService::run`] returned.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunExit {
    /// The client closed the queue and every published record was consumed.
    Closed,
}

/// Counters kept by the service.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ServiceStats {
    /// Records written to the device.
    pub dispatched: u64,
    /// Records consumed under [`UnsupportedPolicy::Skip`].
    pub skipped: u64,
    /// Records consumed under [`UnsupportedPolicy::Fault`].
    pub faulted: u64,
    /// Polls that found the queue empty.
    pub idle_polls: u64,
}

impl ServiceStats {
    /// Records consumed, whatever their outcome.
    pub fn consumed(&self) -> u64 {
        self.dispatched + self.skipped + self.faulted
    }
}

/// Consumer side of a console queue: reads records and drives the device.
pub struct ConsoleService<'q, S: ByteSink> {
    end: ConsumerEnd<'q>,
    sink: S,
    config: ServiceConfig,
    wait: Waiter,
    stats: ServiceStats,
}

impl<'q, S: ByteSink> ConsoleService<'q, S> {
    /// Attaches as the consumer of `region`.
    ///
    /// # Safety
    ///
    /// No other consumer may use `region` while this service exists.
    pub unsafe fn attach(region: &'q QueueRegion, sink: S, config: ServiceConfig) -> Self {
        Self {
            // SAFETY: forwarded to the caller.
            end: unsafe { region.consumer() },
            sink,
            wait: config.wait.build(),
            config,
            stats: ServiceStats::default(),
        }
    }

    /// Attaches to a region page mapped at `ptr`.
    ///
    /// # Safety
    ///
    /// See [`QueueRegion::from_raw`] and [`ConsoleService::attach`].
    pub unsafe fn attach_raw(ptr: *mut u8, sink: S, config: ServiceConfig) -> Result<Self> {
        // SAFETY: forwarded to the caller.
        let region = unsafe { QueueRegion::from_raw(ptr) }?;
        // SAFETY: forwarded to the caller.
        Ok(unsafe { Self::attach(region, sink, config) })
    }

    /// Consumes at most one record.
    ///
    /// The send cursor is loaded with Acquire so the slot contents the client
    /// wrote before publishing are visible; the receive cursor is only ever
    /// written here, so a Relaxed load suffices. The slot is handed back with
    /// a Release store only after it has been read and dispatched.
    pub fn poll_once(&mut self) -> Result<PollOutcome> {
        let send = self.end.published();
        let recv = self.end.position();
        if send == recv {
            self.stats.idle_polls += 1;
            return Ok(PollOutcome::Idle);
        }
        if self.config.check_overflow && pending(send, recv) > CAPACITY {
            error!("serqd: overflow detected (send={send}, recv={recv})");
            return Err(ServiceError::Overflow { send, recv });
        }

        // SAFETY: recv is below the published cursor and not yet released.
        let record = unsafe { self.end.read(recv) };
        let outcome = self.dispatch(recv, record);
        self.end.release(recv.wrapping_add(1));
        outcome
    }

    fn dispatch(&mut self, cursor: u32, record: Record) -> Result<PollOutcome> {
        match (record.op(), self.config.unsupported_opcode) {
            (Opcode::ConsoleWrite, _) | (Opcode::Unsupported(_), UnsupportedPolicy::Legacy) => {
                let byte = record.low_byte();
                self.sink.put(byte);
                self.stats.dispatched += 1;
                trace!("serqd: #{cursor} wrote {byte:#04x}");
                Ok(PollOutcome::Wrote(byte))
            }
            (Opcode::Unsupported(opcode), UnsupportedPolicy::Skip) => {
                warn!("serqd: skipping unsupported opcode {opcode:#x} at #{cursor}");
                self.stats.skipped += 1;
                Ok(PollOutcome::Skipped { opcode })
            }
            (Opcode::Unsupported(opcode), UnsupportedPolicy::Fault) => {
                warn!("serqd: unsupported opcode {opcode:#x} at #{cursor}");
                self.stats.faulted += 1;
                Err(ServiceError::UnsupportedOpcode { opcode, cursor })
            }
        }
    }

    /// Consumes every record published so far; returns how many.
    pub fn drain(&mut self) -> Result<usize> {
        let mut consumed = 0;
        while self.poll_once()? != PollOutcome::Idle {
            consumed += 1;
        }
        self.sink.flush();
        Ok(consumed)
    }

    /// Polls until the client closes the queue (when `honor_close` is set)
    /// or forever.
    ///
    /// Errors are returned to the caller. After
    /// [`ServiceError::UnsupportedOpcode`] the record is already consumed and
    /// `run` may simply be called again.
    pub fn run(&mut self) -> Result<RunExit> {
        info!(
            "serqd: running (policy={:?}, honor_close={}, check_overflow={}, wait={:?})",
            self.config.unsupported_opcode,
            self.config.honor_close,
            self.config.check_overflow,
            self.config.wait.strategy
        );
        loop {
            if self.poll_once()? != PollOutcome::Idle {
                self.wait.reset();
                continue;
            }
            // The closed flag is stored after the final publish and loaded
            // with Acquire, so an empty queue seen after it is final.
            if self.config.honor_close && self.end.is_closed() {
                if self.end.published() != self.end.position() {
                    continue;
                }
                self.sink.flush();
                info!("serqd: queue closed after {} records", self.stats.consumed());
                return Ok(RunExit::Closed);
            }
            self.wait.idle();
        }
    }

    /// Counters since attach.
    pub fn stats(&self) -> ServiceStats {
        self.stats
    }

    /// Active configuration.
    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// The device sink.
    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Detaches and returns the device sink.
    pub fn into_sink(self) -> S {
        debug!("serqd: detaching after {:?}", self.stats);
        self.sink
    }
}
