//! Collection status and trip summaries.
//!
//! [`TripSummary`] is projected from the fragment list handed to the
//! aggregator, not from its output, so it reports what was actually recorded.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::Fragment;

/// Out-of-band facts about how a fragment list was collected.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct CollectionStatus {
    /// More fragments existed upstream than were retained.
    pub truncated: bool,
    /// Records that could not be fetched or parsed into a fragment.
    pub failed_fragments: usize,
    /// One message per failed fragment, for reporting.
    pub failure_messages: Vec<String>,
}

impl CollectionStatus {
    /// Status of a list collected with no truncation and no failures.
    pub fn complete() -> Self {
        Self::default()
    }

    pub fn any_fragment_failed(&self) -> bool {
        self.failed_fragments > 0
    }

    pub fn is_complete(&self) -> bool {
        !self.truncated && !self.any_fragment_failed()
    }

    pub(crate) fn record_failure(&mut self, message: String) {
        self.failed_fragments += 1;
        self.failure_messages.push(message);
    }
}

/// Counts and time span of one trip's fragments.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct TripSummary {
    pub trip_ref: Uuid,
    pub fragment_count: usize,
    pub failed_fragment_count: usize,
    pub truncated: bool,
    pub first_timestamp: DateTime<Utc>,
    pub last_timestamp: DateTime<Utc>,
    /// Raw waypoint total across fragments, seams not deduplicated.
    pub total_waypoints: usize,
}

impl TripSummary {
    /// Summarize a fragment list. Returns `None` when it is empty.
    pub fn from_fragments(fragments: &[Fragment], status: &CollectionStatus) -> Option<Self> {
        let first = fragments.first()?;

        let mut first_timestamp = first.recorded_at();
        let mut last_timestamp = first.recorded_at();
        for fragment in &fragments[1..] {
            first_timestamp = first_timestamp.min(fragment.recorded_at());
            last_timestamp = last_timestamp.max(fragment.recorded_at());
        }

        Some(Self {
            trip_ref: first.trip_ref(),
            fragment_count: fragments.len(),
            failed_fragment_count: status.failed_fragments,
            truncated: status.truncated,
            first_timestamp,
            last_timestamp,
            total_waypoints: fragments.iter().map(Fragment::waypoint_count).sum(),
        })
    }

    /// Time between the earliest and latest fragment start.
    pub fn total_duration(&self) -> Duration {
        self.last_timestamp - self.first_timestamp
    }

    pub fn is_complete(&self) -> bool {
        !self.truncated && self.failed_fragment_count == 0
    }
}

impl fmt::Display for TripSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let duration = self.total_duration();
        write!(
            f,
            "trip {}: {} fragment(s), {} waypoint(s), {} to {} ({}m{:02}s)",
            self.trip_ref,
            self.fragment_count,
            self.total_waypoints,
            self.first_timestamp.format("%Y-%m-%d %H:%M:%S"),
            self.last_timestamp.format("%H:%M:%S"),
            duration.num_minutes(),
            duration.num_seconds() % 60,
        )?;
        if self.truncated {
            write!(f, " [truncated]")?;
        }
        if self.failed_fragment_count > 0 {
            write!(f, " [{} failed]", self.failed_fragment_count)?;
        }
        Ok(())
    }
}
