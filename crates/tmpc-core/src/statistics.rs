//! Cleanup counters
//!
//! Only the cleanup engine mutates these; everyone else reads snapshots.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Counters for deletes-history containers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DeletesHistoryStatistics {
    /// Deletes-history containers removed
    pub containers_deleted: u64,
    /// Cookies deleted from them
    pub cookies_deleted: u64,
    /// History entries deleted
    pub urls_deleted: u64,
}

/// Persisted statistics
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Statistics {
    /// When counting started
    pub start_time: DateTime<Utc>,
    /// Temporary containers removed
    pub containers_deleted: u64,
    /// Cookies deleted with them
    pub cookies_deleted: u64,
    /// Deletes-history counters
    pub deletes_history: DeletesHistoryStatistics,
}

impl Default for Statistics {
    fn default() -> Self {
        Self {
            start_time: Utc::now(),
            containers_deleted: 0,
            cookies_deleted: 0,
            deletes_history: DeletesHistoryStatistics::default(),
        }
    }
}

/// What one container removal accomplished
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RemovalReport {
    /// The host confirmed the container is gone
    pub removed: bool,
    /// The container was a deletes-history container
    pub deletes_history: bool,
    /// Cookies deleted
    pub cookies_deleted: u64,
    /// History entries deleted
    pub urls_deleted: u64,
}

/// Thread-safe statistics holder
#[derive(Debug, Default)]
pub struct StatisticsRecorder {
    inner: Mutex<Statistics>,
}

impl StatisticsRecorder {
    /// Recorder seeded with persisted counters
    #[must_use]
    pub fn new(statistics: Statistics) -> Self {
        Self {
            inner: Mutex::new(statistics),
        }
    }

    /// Copy of the current counters
    #[must_use]
    pub fn snapshot(&self) -> Statistics {
        self.inner.lock().clone()
    }

    pub(crate) fn record(&self, report: &RemovalReport) {
        let mut stats = self.inner.lock();
        if report.removed {
            stats.containers_deleted += 1;
        }
        stats.cookies_deleted += report.cookies_deleted;

        if report.deletes_history {
            if report.removed {
                stats.deletes_history.containers_deleted += 1;
            }
            stats.deletes_history.cookies_deleted += report.cookies_deleted;
            stats.deletes_history.urls_deleted += report.urls_deleted;
        }
    }

    pub(crate) fn reset(&self) {
        *self.inner.lock() = Statistics::default();
    }
}
