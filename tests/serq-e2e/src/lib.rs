// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Two-thread harness: one thread plays the service, the caller plays the
//! client. Both sides can be slowed down by seeded random jitter so tests
//! exercise different interleavings deterministically per seed.

#![deny(unsafe_code)]

use std::thread;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serq_abi::QueueRegion;
use serq_client::Client;
use serq_hal::{ByteSink, CaptureSink};
use serqd::{ConsoleService, RunExit, ServiceConfig, ServiceStats};

/// Device that stalls a random number of spins before accepting each byte.
pub struct JitterSink {
    inner: CaptureSink,
    rng: StdRng,
    max_spins: u32,
}

impl JitterSink {
    pub fn new(seed: u64, max_spins: u32) -> Self {
        Self { inner: CaptureSink::new(), rng: StdRng::seed_from_u64(seed), max_spins }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.inner.into_bytes()
    }
}

impl ByteSink for JitterSink {
    fn put(&mut self, byte: u8) {
        stall(&mut self.rng, self.max_spins);
        self.inner.put(byte);
    }
}

/// Spins up to `max_spins` times, occasionally yielding the thread.
pub fn stall(rng: &mut StdRng, max_spins: u32) {
    if max_spins == 0 {
        return;
    }
    let spins = rng.gen_range(0..=max_spins);
    for _ in 0..spins {
        std::hint::spin_loop();
    }
    if rng.gen_ratio(1, 16) {
        thread::yield_now();
    }
}

/// Outcome of one client/service session.
pub struct Session {
    pub output: Vec<u8>,
    pub stats: ServiceStats,
    pub cursors: (u32, u32),
}

/// Runs a service on a second thread, hands `produce` the client, closes the
/// queue when `produce` returns and waits for the service to drain.
pub fn run_session(
    config: ServiceConfig,
    seed: u64,
    service_max_spins: u32,
    produce: impl FnOnce(&mut Client<'_>),
) -> Session {
    let region = Box::new(QueueRegion::new());
    let (output, stats) = thread::scope(|scope| {
        let region = &*region;
        let service = scope.spawn(move || {
            let sink = JitterSink::new(seed, service_max_spins);
            let mut svc = serve(region, sink, config);
            let exit = svc.run().expect("service runs to completion");
            assert_eq!(exit, RunExit::Closed);
            let stats = svc.stats();
            (svc.into_sink().into_bytes(), stats)
        });
        let mut client = attach_client(region);
        produce(&mut client);
        client.close();
        service.join().expect("service thread exits cleanly")
    });
    Session { output, stats, cursors: region.cursors() }
}

#[allow(unsafe_code)]
fn serve<S: ByteSink>(region: &QueueRegion, sink: S, config: ServiceConfig) -> ConsoleService<'_, S> {
    // SAFETY: run_session creates exactly one service per region.
    unsafe { ConsoleService::attach(region, sink, config) }
}

#[allow(unsafe_code)]
fn attach_client(region: &QueueRegion) -> Client<'_> {
    // SAFETY: run_session creates exactly one client per region.
    unsafe { Client::attach(region) }
}
