//! Availability aggregation across a user's enabled calendars.
//!
//! Queries every enabled calendar handle through the [`CalendarGateway`] and
//! merges the results into one ordered busy timeline. A calendar that cannot
//! be queried is excluded and reported as a warning; a possibly-optimistic
//! availability view beats no view at all.

use std::sync::Arc;

use calbridge_domain::{BusyInterval, CalendarHandle, TimeRange};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::ports::CalendarGateway;

/// One calendar that could not be queried during aggregation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregationWarning {
    pub calendar: String,
    pub reason: String,
}

/// Merged busy timeline plus any per-calendar failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregationOutcome {
    pub timeline: Vec<BusyInterval>,
    pub warnings: Vec<AggregationWarning>,
}

/// Sort by start time and coalesce overlapping or touching intervals into
/// maximal runs (stack merge).
pub fn merge_busy_intervals(mut intervals: Vec<BusyInterval>) -> Vec<BusyInterval> {
    if intervals.is_empty() {
        return intervals;
    }

    intervals.sort_by_key(|interval| interval.range.start);

    let mut merged: Vec<BusyInterval> = Vec::with_capacity(intervals.len());
    for interval in intervals {
        match merged.last_mut() {
            Some(top) if top.range.touches(&interval.range) => {
                if interval.range.end > top.range.end {
                    top.range.end = interval.range.end;
                }
            }
            _ => merged.push(interval),
        }
    }

    merged
}

/// Aggregates busy intervals across providers.
pub struct AvailabilityService {
    gateway: Arc<dyn CalendarGateway>,
}

impl AvailabilityService {
    pub fn new(gateway: Arc<dyn CalendarGateway>) -> Self {
        Self { gateway }
    }

    /// Build the merged busy timeline for the user's enabled calendars over
    /// `range`. Disabled handles are skipped; unreachable calendars become
    /// warnings, never a hard failure.
    pub async fn busy_timeline(
        &self,
        user_id: &str,
        handles: &[CalendarHandle],
        range: &TimeRange,
    ) -> AggregationOutcome {
        let enabled: Vec<&CalendarHandle> =
            handles.iter().filter(|handle| handle.is_enabled).collect();

        let queries = enabled
            .iter()
            .map(|handle| self.gateway.busy_intervals(user_id, handle, range));
        let results = join_all(queries).await;

        let mut all = Vec::new();
        let mut warnings = Vec::new();

        for (handle, result) in enabled.iter().zip(results) {
            match result {
                Ok(intervals) => {
                    debug!(
                        calendar = %handle.external_id,
                        count = intervals.len(),
                        "fetched busy intervals"
                    );
                    all.extend(intervals);
                }
                Err(err) => {
                    warn!(
                        calendar = %handle.external_id,
                        error = %err,
                        "calendar unreachable during aggregation; excluding"
                    );
                    warnings.push(AggregationWarning {
                        calendar: handle.external_id.clone(),
                        reason: err.to_string(),
                    });
                }
            }
        }

        AggregationOutcome { timeline: merge_busy_intervals(all), warnings }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;

    fn busy(start_h: u32, end_h: u32, cal: &str) -> BusyInterval {
        BusyInterval::new(
            Utc.with_ymd_and_hms(2026, 8, 10, start_h, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2026, 8, 10, end_h, 0, 0).unwrap(),
            cal,
        )
    }

    #[test]
    fn merge_coalesces_overlapping_runs() {
        let merged = merge_busy_intervals(vec![
            busy(13, 15, "work"),
            busy(9, 11, "work"),
            busy(10, 12, "personal"),
        ]);

        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].range.start, busy(9, 11, "").range.start);
        assert_eq!(merged[0].range.end, busy(10, 12, "").range.end);
        assert_eq!(merged[1].range, busy(13, 15, "").range);
    }

    #[test]
    fn merge_coalesces_touching_intervals() {
        let merged = merge_busy_intervals(vec![busy(9, 10, "a"), busy(10, 11, "b")]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].range.end, busy(10, 11, "").range.end);
    }

    #[test]
    fn merge_keeps_disjoint_intervals_ordered() {
        let merged = merge_busy_intervals(vec![busy(14, 15, "a"), busy(9, 10, "b")]);
        assert_eq!(merged.len(), 2);
        assert!(merged[0].range.start < merged[1].range.start);
    }

    #[test]
    fn merge_handles_contained_intervals() {
        let merged = merge_busy_intervals(vec![busy(9, 17, "a"), busy(10, 11, "b")]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].range, busy(9, 17, "").range);
    }
}
