//! Local-to-server clock offset used for request timestamps.

use std::sync::Mutex;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Wait after a failed sync before `/time` is tried again.
const FAILED_SYNC_BACKOFF: Duration = Duration::from_secs(30);

/// Tracks `server_time - local_time` and when it was last measured.
#[derive(Debug)]
pub struct ServerClock {
    state: Mutex<ClockState>,
    resync_after: Duration,
}

#[derive(Debug, Default)]
struct ClockState {
    offset_ms: i64,
    synced_at: Option<Instant>,
    failed_at: Option<Instant>,
}

impl ServerClock {
    pub fn new(resync_after: Duration) -> Self {
        Self {
            state: Mutex::new(ClockState::default()),
            resync_after,
        }
    }

    /// True if never synced or the last sync is older than the resync interval.
    /// A recent failed sync postpones the next attempt by [`FAILED_SYNC_BACKOFF`]
    /// (or the resync interval, if shorter).
    pub fn needs_sync(&self) -> bool {
        let state = self.lock();
        let stale = state
            .synced_at
            .is_none_or(|at| at.elapsed() >= self.resync_after);
        let backing_off = state
            .failed_at
            .is_some_and(|at| at.elapsed() < self.resync_after.min(FAILED_SYNC_BACKOFF));
        stale && !backing_off
    }

    /// Record a measured offset.
    pub fn record(&self, offset_ms: i64) {
        let mut state = self.lock();
        state.offset_ms = offset_ms;
        state.synced_at = Some(Instant::now());
        state.failed_at = None;
    }

    /// Fall back to local time after a failed sync.
    pub fn record_failure(&self) {
        let mut state = self.lock();
        state.offset_ms = 0;
        state.failed_at = Some(Instant::now());
    }

    /// Offset currently applied to local time.
    pub fn offset_ms(&self) -> i64 {
        self.lock().offset_ms
    }

    /// Local time adjusted by the offset, in Unix milliseconds.
    pub fn now_ms(&self) -> u64 {
        let local = local_time_ms() as i64;
        (local + self.offset_ms()).max(0) as u64
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ClockState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }
}

/// Local Unix time in milliseconds.
pub fn local_time_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
