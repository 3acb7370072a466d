//! Debounced triggering of deferred maintenance work.
//!
//! Producers call [`ActivityTracker::record_activity`] whenever they queue
//! work that a maintenance job will eventually consolidate. A
//! [`DebounceGate`] opens only once the tracker has been quiet for the idle
//! threshold, so a burst of activity results in one maintenance run instead
//! of one per event.
//!
//! The gate never polls. Re-checking it later is up to whoever drives it,
//! typically the scheduler re-running a [`PostProcessingTask`].

mod task;

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};

pub use task::{MaintenanceJob, PostProcessingTask};

/// Task class key under which [`PostProcessingTask`] is usually registered.
pub const POST_PROCESSING_TASK_CLASS: &str = "post-processing";

/// Process-wide clock of the most recent triggering activity.
///
/// Cloning yields a handle to the same clock. Create one at engine start
/// and hand clones to producers and gates.
///
/// # Examples
///
/// ```
/// use chrono::{TimeZone, Utc};
/// use engine_tasks::postprocessing::ActivityTracker;
///
/// let tracker = ActivityTracker::new();
/// let producer = tracker.clone();
///
/// let at = Utc.timestamp_millis_opt(5_000).unwrap();
/// producer.record_activity_at(at);
/// assert_eq!(tracker.last_activity_time(), at);
/// ```
#[derive(Debug, Clone)]
pub struct ActivityTracker {
    last_activity_ms: Arc<AtomicI64>,
}

impl ActivityTracker {
    /// Creates a tracker whose last activity is now.
    pub fn new() -> Self {
        Self::starting_at(Utc::now())
    }

    /// Creates a tracker whose last activity is `at`.
    pub fn starting_at(at: DateTime<Utc>) -> Self {
        Self {
            last_activity_ms: Arc::new(AtomicI64::new(at.timestamp_millis())),
        }
    }

    /// Records activity at the current time.
    pub fn record_activity(&self) {
        self.record_activity_at(Utc::now());
    }

    /// Records activity at `at`.
    pub fn record_activity_at(&self, at: DateTime<Utc>) {
        self.last_activity_ms
            .store(at.timestamp_millis(), Ordering::SeqCst);
    }

    /// Returns the time of the most recent recorded activity.
    pub fn last_activity_time(&self) -> DateTime<Utc> {
        let millis = self.last_activity_ms.load(Ordering::SeqCst);
        Utc.timestamp_millis_opt(millis)
            .single()
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

impl Default for ActivityTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Returns `true` iff at least `idle_threshold` has passed from `last_activity`
/// to `now`.
///
/// A `now` earlier than `last_activity` never opens the gate.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use chrono::{TimeZone, Utc};
/// use engine_tasks::postprocessing::should_run;
///
/// let ms = |n| Utc.timestamp_millis_opt(n).unwrap();
/// let threshold = Duration::from_millis(500);
///
/// assert!(!should_run(ms(1_400), ms(1_000), threshold));
/// assert!(should_run(ms(1_600), ms(1_000), threshold));
/// ```
pub fn should_run(
    now: DateTime<Utc>,
    last_activity: DateTime<Utc>,
    idle_threshold: Duration,
) -> bool {
    if now < last_activity {
        return false;
    }
    match chrono::Duration::from_std(idle_threshold) {
        Ok(threshold) => now - last_activity >= threshold,
        // Beyond chrono's range: never reached.
        Err(_) => false,
    }
}

/// An [`ActivityTracker`] paired with the idle time it must observe.
#[derive(Debug, Clone)]
pub struct DebounceGate {
    tracker: ActivityTracker,
    idle_threshold: Duration,
}

impl DebounceGate {
    /// Creates a gate over `tracker`.
    pub fn new(tracker: ActivityTracker, idle_threshold: Duration) -> Self {
        Self {
            tracker,
            idle_threshold,
        }
    }

    /// The idle time this gate waits for.
    pub fn idle_threshold(&self) -> Duration {
        self.idle_threshold
    }

    /// The tracker this gate reads.
    pub fn tracker(&self) -> &ActivityTracker {
        &self.tracker
    }

    /// Decides whether the job may run at `now`.
    pub fn should_run_at(&self, now: DateTime<Utc>) -> bool {
        let last_activity = self.tracker.last_activity_time();
        let open = should_run(now, last_activity, self.idle_threshold);
        tracing::debug!(
            %now,
            %last_activity,
            idle_threshold_ms = self.idle_threshold.as_millis() as u64,
            open,
            "debounce gate checked"
        );
        open
    }

    /// Decides whether the job may run now.
    pub fn should_run(&self) -> bool {
        self.should_run_at(Utc::now())
    }
}
