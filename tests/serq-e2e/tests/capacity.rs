// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Capacity discipline: what the client's check prevents, and what happens
//! when a producer skips it.

use serq_abi::{QueueRegion, Record, CAPACITY};
use serq_client::{Client, ClientError};
use serq_hal::CaptureSink;
use serqd::{ConsoleService, ServiceConfig, ServiceError};

/// Publishes `count` records straight through the producer end, without the
/// client's capacity check. Record `i` carries byte `i`.
fn publish_unchecked(region: &QueueRegion, count: u32) {
    let producer = unsafe { region.producer() };
    for cursor in 0..count {
        unsafe { producer.write(cursor, Record::console_write(cursor as u8)) };
        producer.publish(cursor + 1);
    }
}

#[test]
fn client_refuses_the_256th_record() {
    let region = QueueRegion::new();
    let mut client = unsafe { Client::attach(&region) };
    for i in 0..CAPACITY {
        client.try_enqueue(serq_abi::OP_CONSOLE_WRITE, u64::from(i)).unwrap();
    }
    assert_eq!(client.try_enqueue(serq_abi::OP_CONSOLE_WRITE, 0), Err(ClientError::WouldBlock));
    assert_eq!(region.cursors(), (CAPACITY, 0));
}

#[test]
fn unchecked_overflow_overwrites_slot_zero() {
    let region = QueueRegion::new();
    publish_unchecked(&region, CAPACITY + 1);

    // Record 255 landed in slot 0 before record 0 was ever read.
    let consumer = unsafe { region.consumer() };
    assert_eq!(unsafe { consumer.read(0) }, Record::console_write(255));
}

#[test]
fn unchecked_overflow_corrupts_output_without_crashing() {
    let region = QueueRegion::new();
    publish_unchecked(&region, CAPACITY + 1);
    let config = ServiceConfig { check_overflow: false, ..Default::default() };
    let mut svc = unsafe { ConsoleService::attach(&region, CaptureSink::new(), config) };

    assert_eq!(svc.drain(), Ok(256));
    let out = svc.into_sink().into_bytes();
    let expected: Vec<u8> = (0..=255u8).collect();
    assert_ne!(out, expected);
    assert_eq!(out[0], 255, "record 0 was lost");
    assert_eq!(out[255], 255, "record 255 was delivered twice");
    assert_eq!(&out[1..255], &expected[1..255]);
}

#[test]
fn overflow_check_reports_instead_of_reading() {
    let region = QueueRegion::new();
    publish_unchecked(&region, CAPACITY + 1);
    let config = ServiceConfig { check_overflow: true, ..Default::default() };
    let mut svc = unsafe { ConsoleService::attach(&region, CaptureSink::new(), config) };

    assert_eq!(svc.poll_once(), Err(ServiceError::Overflow { send: 256, recv: 0 }));
    assert!(svc.sink().bytes().is_empty());
}
