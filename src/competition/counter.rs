// Shared progress model for the counting types (skill XP, boss kills):
// self-reported deltas, or verified totals measured against a baseline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{by_score_desc, rank_standings, read_progress, to_value, with_participant};
use crate::error::BotError;
use crate::models::{Competition, CompetitionResults, Standing, UserId};

/// Largest single self-reported gain.
pub const MAX_REPORTED_DELTA: i64 = 200_000_000;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub(crate) struct CounterProgress {
    /// First verified total seen for this participant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub baseline: Option<i64>,
    /// Most recent verified total.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest: Option<i64>,
    #[serde(default)]
    pub gained: i64,
}

pub(crate) fn apply_delta(
    competition: &Competition,
    actor: UserId,
    delta: i64,
    unit: &str,
    now: DateTime<Utc>,
) -> Result<Competition, BotError> {
    if !(1..=MAX_REPORTED_DELTA).contains(&delta) {
        return Err(BotError::Validation(format!(
            "{unit} gained must be between 1 and {MAX_REPORTED_DELTA}"
        )));
    }
    with_participant(competition, actor, |participant| {
        let mut progress: CounterProgress = read_progress(&participant.progress);
        progress.gained = progress.gained.saturating_add(delta);
        participant.progress = to_value(&progress);
        participant.last_progress_at = Some(now);
        Ok(())
    })
}

/// Record a verified total. The first observation only sets the baseline.
pub(crate) fn apply_observed(
    competition: &Competition,
    actor: UserId,
    observed: i64,
    now: DateTime<Utc>,
) -> Result<Competition, BotError> {
    with_participant(competition, actor, |participant| {
        let mut progress: CounterProgress = read_progress(&participant.progress);
        let baseline = *progress.baseline.get_or_insert(observed);
        // Snapshots can lag; never let a stale one lower the score.
        let gained = (observed - baseline).max(0);
        if gained > progress.gained {
            progress.gained = gained;
            participant.last_progress_at = Some(now);
        }
        progress.latest = Some(progress.latest.map_or(observed, |l| l.max(observed)));
        participant.progress = to_value(&progress);
        Ok(())
    })
}

pub(crate) fn finalize(competition: &Competition) -> CompetitionResults {
    let standings = competition
        .participants
        .iter()
        .map(|p| {
            let progress: CounterProgress = read_progress(&p.progress);
            let finished = progress.gained > 0;
            Standing {
                user_id: p.user_id,
                rank: 0,
                score: progress.gained,
                finished,
                achieved_at: if finished { p.last_progress_at } else { None },
            }
        })
        .collect();
    rank_standings(standings, by_score_desc)
}
