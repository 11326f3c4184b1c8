//! History Aggregator
//!
//! Turns a ledger range into work sessions and a worked-duration total.
//!
//! Sessions crossing the range boundaries are clipped: only the part inside
//! `[from, to)` counts. A session the student never closed is reported with
//! no clock-out and counted up to `min(now, to)`, raising
//! `incomplete_session_warning`.

use chrono::{DateTime, Duration, Utc};
use serde::{Serialize, Serializer};
use std::sync::Arc;

use crate::clock::Clock;
use crate::error::{CoreError, CoreResult};
use crate::storage::AttendanceLedger;
use crate::types::{Direction, LedgerKey, Punch};

fn serialize_seconds<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_i64(d.num_seconds())
}

/// One IN/OUT interval
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkSession {
    pub clock_in: DateTime<Utc>,
    /// `None` while the student is still clocked in
    pub clock_out: Option<DateTime<Utc>>,
    /// Portion of the session inside the queried range
    #[serde(rename = "duration_seconds", serialize_with = "serialize_seconds")]
    pub duration: Duration,
    /// Whether the session extends past either range boundary
    pub clipped: bool,
}

/// Worked time over a range
#[derive(Debug, Clone, Serialize)]
pub struct WorkedHistory {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    #[serde(rename = "total_duration_seconds", serialize_with = "serialize_seconds")]
    pub total_duration: Duration,
    /// Whole minutes of `total_duration`
    pub total_minutes: i64,
    pub sessions: Vec<WorkSession>,
    pub incomplete_session_warning: bool,
}

fn clip(start: DateTime<Utc>, end: DateTime<Utc>, from: DateTime<Utc>, to: DateTime<Utc>) -> Duration {
    let start = start.max(from);
    let end = end.min(to);
    if end > start {
        end - start
    } else {
        Duration::zero()
    }
}

/// Pair punches into sessions.
///
/// `before` is the last punch before `from`, `in_range` the punches inside
/// `[from, to)` and `after` the first punch at or after `to`.
pub fn aggregate(
    before: Option<&Punch>,
    in_range: &[Punch],
    after: Option<&Punch>,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
    now: DateTime<Utc>,
) -> WorkedHistory {
    let mut sessions = Vec::new();
    let mut incomplete = false;

    // Range opens mid-session: pull in the IN that started it
    let mut open: Option<&Punch> = before.filter(|p| p.direction == Direction::In);

    for punch in in_range {
        match punch.direction {
            Direction::In => {
                if let Some(dangling) = open {
                    tracing::warn!(
                        punch_id = %dangling.id,
                        "Consecutive IN punches in ledger; earlier one ignored"
                    );
                }
                open = Some(punch);
            }
            Direction::Out => match open.take() {
                Some(clock_in) => sessions.push(WorkSession {
                    clock_in: clock_in.timestamp,
                    clock_out: Some(punch.timestamp),
                    duration: clip(clock_in.timestamp, punch.timestamp, from, to),
                    clipped: clock_in.timestamp < from,
                }),
                None => tracing::warn!(punch_id = %punch.id, "OUT punch without matching IN"),
            },
        }
    }

    if let Some(clock_in) = open {
        match after.filter(|p| p.direction == Direction::Out) {
            Some(clock_out) => sessions.push(WorkSession {
                clock_in: clock_in.timestamp,
                clock_out: Some(clock_out.timestamp),
                duration: clip(clock_in.timestamp, clock_out.timestamp, from, to),
                clipped: clock_in.timestamp < from || clock_out.timestamp > to,
            }),
            None => {
                incomplete = true;
                sessions.push(WorkSession {
                    clock_in: clock_in.timestamp,
                    clock_out: None,
                    duration: clip(clock_in.timestamp, now.min(to), from, to),
                    clipped: clock_in.timestamp < from,
                });
            }
        }
    }

    let total_duration = sessions
        .iter()
        .fold(Duration::zero(), |acc, s| acc + s.duration);

    WorkedHistory {
        from,
        to,
        total_duration,
        total_minutes: total_duration.num_minutes(),
        sessions,
        incomplete_session_warning: incomplete,
    }
}

/// Reads the ledger and aggregates worked time
pub struct HistoryAggregator {
    ledger: Arc<dyn AttendanceLedger>,
    clock: Arc<dyn Clock>,
}

impl HistoryAggregator {
    pub fn new(ledger: Arc<dyn AttendanceLedger>, clock: Arc<dyn Clock>) -> Self {
        Self { ledger, clock }
    }

    /// Worked duration of one ledger over `[from, to)`
    pub async fn compute_worked_duration(
        &self,
        key: &LedgerKey,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> CoreResult<WorkedHistory> {
        if from >= to {
            return Err(CoreError::validation(format!(
                "empty range: from {} is not before to {}",
                from, to
            )));
        }

        let in_range = self.ledger.query_range(key, from, to).await?;
        let before = self.ledger.last_before(key, from).await?;

        let ends_open = match in_range.last() {
            Some(p) => p.direction == Direction::In,
            None => before.as_ref().map_or(false, |p| p.direction == Direction::In),
        };
        let after = if ends_open {
            self.ledger.first_at_or_after(key, to).await?
        } else {
            None
        };

        let history = aggregate(
            before.as_ref(),
            &in_range,
            after.as_ref(),
            from,
            to,
            self.clock.now(),
        );

        tracing::debug!(
            ledger = %key,
            sessions = history.sessions.len(),
            total_minutes = history.total_minutes,
            incomplete = history.incomplete_session_warning,
            "Computed worked duration"
        );

        Ok(history)
    }
}
