// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

use std::thread;

use anyhow::{anyhow, Result};
use log::info;
use serq_abi::{QueueRegion, OP_CONSOLE_WRITE};
use serq_client::Client;
use serq_hal::ByteSink;
use serq_sync::{WaitConfig, WaitStrategy};
use serqd::{ConsoleService, RunExit, ServiceConfig};

const HELLO: &[u8] = b"Hello world!\n";

/// What the client publishes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Workload {
    Hello,
    Count(u64),
    Bytes(Vec<u64>),
    Text(String),
}

impl Workload {
    fn produce<W: WaitStrategy>(&self, client: &mut Client<'_, W>) -> serq_client::Result<()> {
        match self {
            Self::Hello => client.write_bytes(HELLO),
            Self::Count(n) => (0..*n).try_for_each(|i| client.putint(i)),
            Self::Bytes(values) => {
                values.iter().try_for_each(|v| client.enqueue(OP_CONSOLE_WRITE, *v))
            }
            Self::Text(text) => {
                client.write_bytes(text.as_bytes())?;
                client.putchar(b'\n')
            }
        }
    }
}

/// Plays bootstrap: one zeroed page, one service thread, one client.
/// Returns the sink once the service has drained the closed queue.
pub fn run_workload<S: ByteSink + Send>(
    config: ServiceConfig,
    client_wait: WaitConfig,
    workload: Workload,
    sink: S,
) -> Result<S> {
    if !config.honor_close {
        return Err(anyhow!("honor_close = false would never let the session finish"));
    }
    let region = Box::new(QueueRegion::new());
    let region = &*region;
    info!("serq-run: region at {:p}, workload {:?}", region, workload);

    thread::scope(|scope| {
        let service = scope.spawn(move || {
            // SAFETY: this thread is the only consumer of the region.
            let mut svc = unsafe { ConsoleService::attach(region, sink, config) };
            let exit = svc.run()?;
            debug_assert_eq!(exit, RunExit::Closed);
            info!("serq-run: service stats {:?}", svc.stats());
            Ok::<_, serqd::ServiceError>(svc.into_sink())
        });

        // SAFETY: the main thread is the only producer of the region.
        let mut client = unsafe { Client::with_wait(region, client_wait.build()) };
        let produced = workload.produce(&mut client);
        client.close();

        let sink = service.join().map_err(|_| anyhow!("service thread panicked"))??;
        produced?;
        Ok(sink)
    })
}
