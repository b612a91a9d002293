//! Conflict checking and free-slot proposals.
//!
//! Both operations are linear sweeps over a sorted timeline; at the expected
//! scale (a few calendars, single-week windows) no interval tree is needed.

use chrono::{Duration, Timelike};

use calbridge_domain::{BusyInterval, SlotPreferences, TimeRange, TimeSlot};

use crate::availability::merge_busy_intervals;

/// Busy intervals overlapping the candidate range.
///
/// Strict half-open semantics: back-to-back intervals do not conflict.
pub fn check_conflicts(candidate: &TimeRange, timeline: &[BusyInterval]) -> Vec<BusyInterval> {
    timeline
        .iter()
        .filter(|busy| candidate.overlaps(&busy.range))
        .cloned()
        .collect()
}

/// Propose ranked free slots of at least `duration_minutes` inside
/// `window`, avoiding the busy timeline.
///
/// The complement of the (merged) timeline is swept once; gaps shorter than
/// the duration are discarded, the rest are scored by working-hours
/// membership and ordered by score descending, earliest start breaking
/// ties. Per-day and total caps are applied in chronological order before
/// ranking.
pub fn find_slots(
    duration_minutes: u32,
    window: &TimeRange,
    timeline: &[BusyInterval],
    prefs: &SlotPreferences,
) -> Vec<TimeSlot> {
    let duration = Duration::minutes(i64::from(duration_minutes));
    if duration <= Duration::zero() || window.end <= window.start {
        return Vec::new();
    }

    let merged = merge_busy_intervals(timeline.to_vec());

    // Sweep the complement of the busy timeline within the window.
    let mut gaps: Vec<TimeRange> = Vec::new();
    let mut cursor = window.start;
    for busy in &merged {
        if busy.range.end <= window.start || busy.range.start >= window.end {
            continue;
        }
        if busy.range.start > cursor {
            gaps.push(TimeRange::new(cursor, busy.range.start.min(window.end)));
        }
        cursor = cursor.max(busy.range.end);
    }
    if cursor < window.end {
        gaps.push(TimeRange::new(cursor, window.end));
    }

    // Chronological day/total caps, as the search window may span weeks.
    let mut slots: Vec<TimeSlot> = Vec::new();
    let mut current_day = None;
    let mut day_count = 0usize;

    for gap in gaps {
        if gap.duration() < duration {
            continue;
        }
        if slots.len() >= prefs.max_total {
            break;
        }

        let day = gap.start.date_naive();
        if current_day != Some(day) {
            current_day = Some(day);
            day_count = 0;
        }
        if day_count >= prefs.max_per_day {
            continue;
        }
        day_count += 1;

        slots.push(TimeSlot { range: gap, score: score_slot(&gap, prefs) });
    }

    // Rank: heavier weight inside working hours, ties by earliest start.
    slots.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.range.start.cmp(&b.range.start))
    });

    slots
}

fn score_slot(slot: &TimeRange, prefs: &SlotPreferences) -> f64 {
    let hour = slot.start.hour();
    if hour >= prefs.working_hours_start && hour < prefs.working_hours_end {
        1.0
    } else {
        0.25
    }
}
