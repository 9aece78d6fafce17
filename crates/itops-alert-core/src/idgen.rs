// ── Monotonic 64-bit id generator ──
//
// Layout: `seconds_since(2025-01-01T00:00:00Z) << 6 | sequence`.
// At most 64 ids per second; the 65th call sleeps until the next second.
// On a multi-threaded runtime that sleep runs under `block_in_place` so the
// worker's other tasks move elsewhere.

use std::sync::{Arc, LazyLock, Mutex, PoisonError};
use std::time::Duration;

use chrono::Utc;
use tokio::runtime::{Handle, RuntimeFlavor};

use crate::error::CoreError;

/// 2025-01-01T00:00:00Z as a unix timestamp.
pub const CUSTOM_EPOCH_SECS: i64 = 1_735_689_600;

const SEQ_BITS: u32 = 6;
const SEQ_MASK: u64 = (1 << SEQ_BITS) - 1;

type ClockFn = dyn Fn() -> i64 + Send + Sync;

static GLOBAL: LazyLock<Arc<IdGenerator>> = LazyLock::new(|| Arc::new(IdGenerator::new()));

/// The process-wide generator.
pub fn shared() -> Arc<IdGenerator> {
    Arc::clone(&GLOBAL)
}

/// Allocate an id from the process-wide generator.
pub fn next_id() -> Result<u64, CoreError> {
    GLOBAL.next_id()
}

#[derive(Debug, Default)]
struct State {
    last_ts: u64,
    seq: u64,
}

/// Thread-safe time-based id generator.
pub struct IdGenerator {
    state: Mutex<State>,
    clock: Box<ClockFn>,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self::with_clock(|| Utc::now().timestamp())
    }

    /// Build a generator reading unix seconds from `clock`.
    pub fn with_clock<F>(clock: F) -> Self
    where
        F: Fn() -> i64 + Send + Sync + 'static,
    {
        Self {
            state: Mutex::new(State::default()),
            clock: Box::new(clock),
        }
    }

    fn epoch_secs(&self, last: u64) -> Result<u64, CoreError> {
        let now = (self.clock)() - CUSTOM_EPOCH_SECS;
        u64::try_from(now).map_err(|_| CoreError::ClockRegression { last, now: 0 })
    }

    /// Next strictly increasing id.
    pub fn next_id(&self) -> Result<u64, CoreError> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let mut ts = self.epoch_secs(state.last_ts)?;

        if ts < state.last_ts {
            return Err(CoreError::ClockRegression {
                last: state.last_ts,
                now: ts,
            });
        }

        if ts == state.last_ts {
            state.seq = (state.seq + 1) & SEQ_MASK;
            if state.seq == 0 {
                let last = state.last_ts;
                ts = off_worker(|| self.wait_past(last))?;
            }
        } else {
            state.seq = 0;
        }

        state.last_ts = ts;
        Ok((ts << SEQ_BITS) | state.seq)
    }

    /// Poll the clock until it passes `last`.
    fn wait_past(&self, last: u64) -> Result<u64, CoreError> {
        loop {
            let ts = self.epoch_secs(last)?;
            if ts > last {
                return Ok(ts);
            }
            std::thread::sleep(Duration::from_millis(1));
        }
    }
}

/// Run blocking `f` without stalling a multi-threaded runtime worker.
/// `block_in_place` is unavailable on the current-thread flavor, where `f`
/// runs inline.
fn off_worker<T>(f: impl FnOnce() -> T) -> T {
    match Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
            tokio::task::block_in_place(f)
        }
        _ => f(),
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for IdGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdGenerator").finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicI64, Ordering};

    use super::*;

    #[test]
    fn ids_encode_seconds_and_sequence() {
        let generator = IdGenerator::with_clock(|| CUSTOM_EPOCH_SECS + 10);
        assert_eq!(generator.next_id().unwrap(), 10 << 6);
        assert_eq!(generator.next_id().unwrap(), (10 << 6) | 1);
    }

    #[test]
    fn sequence_resets_on_new_second() {
        let now = Arc::new(AtomicI64::new(CUSTOM_EPOCH_SECS + 5));
        let clock = Arc::clone(&now);
        let generator = IdGenerator::with_clock(move || clock.load(Ordering::SeqCst));

        generator.next_id().unwrap();
        generator.next_id().unwrap();
        now.store(CUSTOM_EPOCH_SECS + 6, Ordering::SeqCst);
        assert_eq!(generator.next_id().unwrap(), 6 << 6);
    }

    #[test]
    fn exhausted_sequence_waits_for_next_second() {
        let now = Arc::new(AtomicI64::new(CUSTOM_EPOCH_SECS + 1));
        let reads = Arc::new(AtomicI64::new(0));
        let (clock, counter) = (Arc::clone(&now), Arc::clone(&reads));
        // Advance one second after the 70th clock read.
        let generator = IdGenerator::with_clock(move || {
            if counter.fetch_add(1, Ordering::SeqCst) == 70 {
                clock.fetch_add(1, Ordering::SeqCst);
            }
            clock.load(Ordering::SeqCst)
        });

        let ids: Vec<u64> = (0..65).map(|_| generator.next_id().unwrap()).collect();
        assert!(ids.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(ids[63], (1 << 6) | 63);
        assert_eq!(ids[64], 2 << 6);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn exhausted_sequence_does_not_stall_the_worker() {
        let now = Arc::new(AtomicI64::new(CUSTOM_EPOCH_SECS + 1));
        let clock = Arc::clone(&now);
        let generator = Arc::new(IdGenerator::with_clock(move || clock.load(Ordering::SeqCst)));
        for _ in 0..64 {
            generator.next_id().unwrap();
        }

        // Both tasks share the only worker: the clock advances only if the
        // waiting caller gives that worker up.
        let ticker = Arc::clone(&now);
        let advance = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            ticker.store(CUSTOM_EPOCH_SECS + 2, Ordering::SeqCst);
        });
        let caller = Arc::clone(&generator);
        let id = tokio::spawn(async move { caller.next_id() });

        assert_eq!(id.await.unwrap().unwrap(), 2 << 6);
        advance.await.unwrap();
    }

    #[test]
    fn clock_regression_is_reported() {
        let now = Arc::new(AtomicI64::new(CUSTOM_EPOCH_SECS + 100));
        let clock = Arc::clone(&now);
        let generator = IdGenerator::with_clock(move || clock.load(Ordering::SeqCst));

        generator.next_id().unwrap();
        now.store(CUSTOM_EPOCH_SECS + 99, Ordering::SeqCst);
        match generator.next_id().unwrap_err() {
            CoreError::ClockRegression { last, now } => {
                assert_eq!(last, 100);
                assert_eq!(now, 99);
            }
            other => panic!("expected ClockRegression, got {other:?}"),
        }
    }

    #[test]
    fn concurrent_callers_get_unique_increasing_ids() {
        let generator = Arc::new(IdGenerator::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let generator = Arc::clone(&generator);
                std::thread::spawn(move || {
                    (0..40)
                        .map(|_| generator.next_id().unwrap())
                        .collect::<Vec<u64>>()
                })
            })
            .collect();

        let mut all = HashSet::new();
        for handle in handles {
            let ids = handle.join().unwrap();
            assert!(ids.windows(2).all(|w| w[0] < w[1]));
            all.extend(ids);
        }
        assert_eq!(all.len(), 160);
    }
}
