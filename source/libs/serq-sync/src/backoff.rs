// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

use std::time::{Duration, Instant};

use serde::Deserialize;

use crate::{Spin, WaitStrategy};

const DEFAULT_SPIN_LIMIT: u32 = 64;
const DEFAULT_MAX_SLEEP_US: u64 = 1_000;

/// Spins, then yields, then sleeps with a doubling interval capped at
/// `max_sleep`.
#[derive(Clone, Debug)]
pub struct Backoff {
    spin_limit: u32,
    max_sleep: Duration,
    step: u32,
    sleep: Duration,
}

impl Backoff {
    /// Spins `spin_limit` times, yields as many times again, then sleeps.
    pub fn new(spin_limit: u32, max_sleep: Duration) -> Self {
        Self { spin_limit, max_sleep, step: 0, sleep: Duration::from_micros(1) }
    }

    /// Current sleep interval; mostly for tests.
    pub fn current_sleep(&self) -> Duration {
        self.sleep
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(DEFAULT_SPIN_LIMIT, Duration::from_micros(DEFAULT_MAX_SLEEP_US))
    }
}

impl WaitStrategy for Backoff {
    fn idle(&mut self) {
        if self.step < self.spin_limit {
            core::hint::spin_loop();
        } else if self.step < self.spin_limit.saturating_mul(2) {
            std::thread::yield_now();
        } else {
            std::thread::sleep(self.sleep.min(self.max_sleep));
            self.sleep = (self.sleep * 2).min(self.max_sleep);
        }
        self.step = self.step.saturating_add(1);
    }

    fn reset(&mut self) {
        self.step = 0;
        self.sleep = Duration::from_micros(1);
    }
}

/// Strategy selector as it appears in configuration files.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    /// Busy-poll with `spin_loop`.
    #[default]
    Spin,
    /// [`Backoff`] with the table's limits.
    Backoff,
}

/// `[wait]` table shared by the service and client configuration.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct WaitConfig {
    /// Which strategy to build.
    pub strategy: StrategyKind,
    /// Idle calls spent spinning (and again yielding) before sleeping.
    pub spin_limit: u32,
    /// Upper bound on a single sleep, in microseconds.
    pub max_sleep_us: u64,
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            strategy: StrategyKind::Spin,
            spin_limit: DEFAULT_SPIN_LIMIT,
            max_sleep_us: DEFAULT_MAX_SLEEP_US,
        }
    }
}

impl WaitConfig {
    /// Default limits with the backoff strategy selected.
    pub fn backoff() -> Self {
        Self { strategy: StrategyKind::Backoff, ..Self::default() }
    }

    /// Instantiates the configured strategy.
    pub fn build(&self) -> Waiter {
        match self.strategy {
            StrategyKind::Spin => Waiter::Spin(Spin),
            StrategyKind::Backoff => Waiter::Backoff(Backoff::new(
                self.spin_limit,
                Duration::from_micros(self.max_sleep_us),
            )),
        }
    }
}

/// A configured strategy.
#[derive(Clone, Debug)]
pub enum Waiter {
    /// Pure busy-poll.
    Spin(Spin),
    /// Spin, yield, then sleep.
    Backoff(Backoff),
}

impl Default for Waiter {
    fn default() -> Self {
        Self::Spin(Spin)
    }
}

impl WaitStrategy for Waiter {
    fn idle(&mut self) {
        match self {
            Self::Spin(spin) => spin.idle(),
            Self::Backoff(backoff) => backoff.idle(),
        }
    }

    fn reset(&mut self) {
        match self {
            Self::Spin(spin) => spin.reset(),
            Self::Backoff(backoff) => backoff.reset(),
        }
    }
}

/// Like [`crate::spin_until`] but gives up at `deadline`. Returns whether
/// `ready` became true.
pub fn spin_until_deadline<W: WaitStrategy + ?Sized>(
    wait: &mut W,
    deadline: Instant,
    mut ready: impl FnMut() -> bool,
) -> bool {
    loop {
        if ready() {
            wait.reset();
            return true;
        }
        if Instant::now() >= deadline {
            wait.reset();
            return false;
        }
        wait.idle();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_sleep_doubles_up_to_cap() {
        let mut backoff = Backoff::new(0, Duration::from_micros(4));
        backoff.idle();
        assert_eq!(backoff.current_sleep(), Duration::from_micros(2));
        backoff.idle();
        backoff.idle();
        backoff.idle();
        assert_eq!(backoff.current_sleep(), Duration::from_micros(4));
        backoff.reset();
        assert_eq!(backoff.current_sleep(), Duration::from_micros(1));
    }

    #[test]
    fn deadline_expires() {
        let mut wait = Spin;
        let deadline = Instant::now() + Duration::from_millis(5);
        assert!(!spin_until_deadline(&mut wait, deadline, || false));
    }

    #[test]
    fn deadline_not_needed_when_ready() {
        let deadline = Instant::now();
        assert!(spin_until_deadline(&mut Spin, deadline, || true));
    }

    #[test]
    fn wait_config_parses_and_defaults() {
        let cfg: WaitConfig = toml::from_str("strategy = \"backoff\"\nmax_sleep_us = 50").unwrap();
        assert_eq!(cfg.strategy, StrategyKind::Backoff);
        assert_eq!(cfg.spin_limit, DEFAULT_SPIN_LIMIT);
        assert!(matches!(cfg.build(), Waiter::Backoff(_)));

        let empty: WaitConfig = toml::from_str("").unwrap();
        assert_eq!(empty, WaitConfig::default());
    }

    #[test]
    fn unknown_keys_rejected() {
        assert!(toml::from_str::<WaitConfig>("spinz = 3").is_err());
    }
}
