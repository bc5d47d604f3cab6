use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.now.lock().expect("manual clock mutex poisoned");
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().expect("manual clock mutex poisoned")
    }
}

pub trait IdGenerator: Send + Sync {
    fn next_id(&self, now: DateTime<Utc>) -> String;
}

const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const SUFFIX_LEN: usize = 9;

/// Epoch milliseconds followed by nine random base-36 characters,
/// e.g. `1717171717171k3j9x0q2a`.
#[derive(Debug)]
pub struct TimeRandomIds {
    rng: Mutex<StdRng>,
}

impl TimeRandomIds {
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_os_rng()),
        }
    }

    /// Reproducible sequence of suffixes.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl Default for TimeRandomIds {
    fn default() -> Self {
        Self::new()
    }
}

impl IdGenerator for TimeRandomIds {
    fn next_id(&self, now: DateTime<Utc>) -> String {
        let mut rng = match self.rng.lock() {
            Ok(g) => g,
            Err(poison) => poison.into_inner(),
        };
        let suffix: String = (0..SUFFIX_LEN)
            .map(|_| BASE36[rng.random_range(0..BASE36.len())] as char)
            .collect();
        format!("{}{}", now.timestamp_millis(), suffix)
    }
}

/// `n000001`, `n000002`, ... independent of time.
#[derive(Debug, Default)]
pub struct SequentialIds {
    next: AtomicU64,
}

impl SequentialIds {
    pub fn new() -> Self {
        Self::default()
    }
}

impl IdGenerator for SequentialIds {
    fn next_id(&self, _now: DateTime<Utc>) -> String {
        let n = self.next.fetch_add(1, Ordering::SeqCst) + 1;
        format!("n{n:06}")
    }
}
