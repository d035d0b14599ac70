//! Rolling weekly statistics over the session history.

use crate::core::session::Session;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

/// Length of the trailing aggregation window in days.
pub const WEEKLY_WINDOW_DAYS: i64 = 7;

/// Statistics for sessions started within the trailing week.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeeklyAggregate {
    pub session_count: usize,
    pub total_minutes: i64,
    pub total_energy: u64,
    pub average_minutes: f64,
    /// Most frequent region label, `None` for an empty window
    pub favorite_region: Option<String>,
}

impl WeeklyAggregate {
    fn empty() -> Self {
        Self {
            session_count: 0,
            total_minutes: 0,
            total_energy: 0,
            average_minutes: 0.0,
            favorite_region: None,
        }
    }
}

/// Compute weekly statistics as of `now`.
///
/// `history` is expected most-recent-first, which makes the most recent label
/// win ties for the favorite region.
pub fn weekly_stats(history: &[Session], now: DateTime<Utc>) -> WeeklyAggregate {
    let cutoff = now - Duration::days(WEEKLY_WINDOW_DAYS);
    let recent: Vec<&Session> = history
        .iter()
        .filter(|s| s.start >= cutoff && s.start <= now)
        .collect();

    if recent.is_empty() {
        return WeeklyAggregate::empty();
    }

    let minutes: Vec<f64> = recent.iter().map(|s| s.duration_minutes()).collect();

    WeeklyAggregate {
        session_count: recent.len(),
        total_minutes: recent.iter().map(|s| s.duration().num_minutes()).sum(),
        total_energy: recent
            .iter()
            .map(|s| s.estimated_energy.unwrap_or(0) as u64)
            .sum(),
        average_minutes: minutes.iter().mean(),
        favorite_region: favorite_label(&recent),
    }
}

/// Most frequent label, ties broken by first appearance.
fn favorite_label(sessions: &[&Session]) -> Option<String> {
    let mut counts: Vec<(&str, usize)> = Vec::new();
    for session in sessions {
        match counts
            .iter_mut()
            .find(|(label, _)| *label == session.region_label)
        {
            Some(entry) => entry.1 += 1,
            None => counts.push((&session.region_label, 1)),
        }
    }

    let mut best: Option<(&str, usize)> = None;
    for (label, count) in counts {
        if best.map_or(true, |(_, c)| count > c) {
            best = Some((label, count));
        }
    }
    best.map(|(label, _)| label.to_string())
}
