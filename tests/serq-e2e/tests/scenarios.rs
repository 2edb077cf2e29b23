// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! End-to-end console sessions across two threads: fixed scenarios, a seeded
//! concurrency stress and order/no-loss properties.

use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serq_abi::OP_CONSOLE_WRITE;
use serq_e2e::{run_session, stall};
use serqd::ServiceConfig;

#[test]
fn scenario_a_hello_world() {
    let session = run_session(ServiceConfig::default(), 1, 0, |client| {
        for byte in b"Hello world!\n" {
            client.enqueue(OP_CONSOLE_WRITE, u64::from(*byte)).unwrap();
        }
    });
    assert_eq!(session.output, b"Hello world!\n");
    assert_eq!(session.stats.dispatched, 13);
}

#[test]
fn scenario_b_low_byte_only() {
    let session = run_session(ServiceConfig::default(), 2, 0, |client| {
        for arg in [0u64, 1, 2] {
            client.enqueue(OP_CONSOLE_WRITE, arg).unwrap();
        }
    });
    assert_eq!(session.output, vec![0x00, 0x01, 0x02]);
}

#[test]
fn scenario_c_concurrent_stress() {
    for seed in 0..8u64 {
        let mut rng = StdRng::seed_from_u64(seed);
        let payload: Vec<u8> = (0..5_000).map(|_| rng.gen()).collect();
        let client_spins = rng.gen_range(0..200);
        let service_spins = rng.gen_range(0..200);

        let mut client_rng = StdRng::seed_from_u64(seed ^ 0x5eed);
        let session = run_session(ServiceConfig::default(), seed, service_spins, |client| {
            for byte in &payload {
                stall(&mut client_rng, client_spins);
                client.putchar(*byte).unwrap();
            }
        });

        assert_eq!(session.output.len(), payload.len(), "seed {seed}: length");
        assert_eq!(session.output, payload, "seed {seed}: order or duplication");
        assert_eq!(session.cursors, (5_000, 5_000));
    }
}

#[test]
fn counter_program_prints_every_line() {
    let session = run_session(ServiceConfig::default(), 3, 16, |client| {
        for n in 0..1_000 {
            client.putint(n).unwrap();
        }
    });
    let text = String::from_utf8(session.output).unwrap();
    assert!(text.lines().map(|l| l.parse::<u64>().unwrap()).eq(0..1_000));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn order_preserved_and_nothing_lost(
        payload in proptest::collection::vec(any::<u8>(), 0..700),
        seed in any::<u64>(),
        service_spins in 0u32..64,
    ) {
        let session = run_session(ServiceConfig::default(), seed, service_spins, |client| {
            client.write_bytes(&payload).unwrap();
        });
        prop_assert_eq!(session.stats.dispatched, payload.len() as u64);
        prop_assert_eq!(session.output, payload);
    }
}
