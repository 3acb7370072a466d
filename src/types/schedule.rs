//! When and how often a task is eligible to run.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::TaskError;

/// Immutable descriptor of when a task becomes eligible and whether it recurs.
///
/// The fields are public so that states can be decoded from any source, which
/// also means a malformed schedule can be built by hand. Storage calls
/// [`validate`](Self::validate) before persisting and rejects those.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use chrono::Utc;
/// use engine_tasks::TaskSchedule;
///
/// let once = TaskSchedule::now();
/// assert!(!once.recurring);
/// assert!(once.interval.is_none());
///
/// let every_minute = TaskSchedule::recurring(Utc::now(), Duration::from_secs(60));
/// assert!(every_minute.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskSchedule {
    /// Instant after which the task may start.
    pub run_at: DateTime<Utc>,

    /// Whether the task recurs after completing.
    pub recurring: bool,

    /// Period between occurrences. Present exactly when `recurring` is set.
    ///
    /// Stored as whole milliseconds (`"intervalMs"`).
    #[serde(default, rename = "intervalMs", with = "interval_millis")]
    pub interval: Option<Duration>,
}

impl TaskSchedule {
    /// A one-shot schedule that is due immediately.
    pub fn now() -> Self {
        Self::at(Utc::now())
    }

    /// A one-shot schedule due at `run_at`.
    pub fn at(run_at: DateTime<Utc>) -> Self {
        Self {
            run_at,
            recurring: false,
            interval: None,
        }
    }

    /// A recurring schedule first due at `run_at`, repeating every `interval`.
    pub fn recurring(run_at: DateTime<Utc>, interval: Duration) -> Self {
        Self {
            run_at,
            recurring: true,
            interval: Some(interval),
        }
    }

    /// Checks the recurrence invariant.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::Validation`] when `interval` is present without
    /// `recurring` (or the reverse), or when the interval is zero or not a
    /// whole number of milliseconds.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::time::Duration;
    /// use engine_tasks::TaskSchedule;
    ///
    /// let mut schedule = TaskSchedule::now();
    /// schedule.recurring = true;
    /// assert!(schedule.validate().is_err());
    ///
    /// schedule.interval = Some(Duration::ZERO);
    /// assert!(schedule.validate().is_err());
    /// ```
    pub fn validate(&self) -> Result<(), TaskError> {
        match (self.recurring, self.interval) {
            (false, None) => Ok(()),
            (true, Some(interval)) if interval.is_zero() => Err(TaskError::validation(
                "recurring schedule interval must be positive",
            )),
            (true, Some(interval)) if interval.subsec_nanos() % 1_000_000 != 0 => Err(
                TaskError::validation("recurring schedule interval must be whole milliseconds"),
            ),
            (true, Some(_)) => Ok(()),
            (true, None) => Err(TaskError::validation(
                "recurring schedule requires an interval",
            )),
            (false, Some(_)) => Err(TaskError::validation(
                "non-recurring schedule must not carry an interval",
            )),
        }
    }

    /// Returns `true` once `now` has reached `run_at`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        now >= self.run_at
    }

    /// Returns the schedule of the following occurrence of a recurring task.
    ///
    /// `None` for one-shot schedules, or when the next instant is not
    /// representable.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::time::Duration;
    /// use chrono::{TimeZone, Utc};
    /// use engine_tasks::TaskSchedule;
    ///
    /// let start = Utc.timestamp_opt(1_000, 0).unwrap();
    /// let schedule = TaskSchedule::recurring(start, Duration::from_secs(30));
    /// let next = schedule.next_occurrence().unwrap();
    /// assert_eq!(next.run_at, Utc.timestamp_opt(1_030, 0).unwrap());
    /// assert_eq!(next.interval, schedule.interval);
    ///
    /// assert!(TaskSchedule::at(start).next_occurrence().is_none());
    /// ```
    pub fn next_occurrence(&self) -> Option<Self> {
        if !self.recurring {
            return None;
        }
        let interval = chrono::Duration::from_std(self.interval?).ok()?;
        let run_at = self.run_at.checked_add_signed(interval)?;
        Some(Self {
            run_at,
            recurring: true,
            interval: self.interval,
        })
    }
}

mod interval_millis {
    use std::time::Duration;

    use serde::{ser::Error as _, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        interval: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match interval {
            Some(interval) => {
                let millis = u64::try_from(interval.as_millis())
                    .map_err(|_| S::Error::custom("interval exceeds u64 milliseconds"))?;
                serializer.serialize_some(&millis)
            },
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
    }
}
