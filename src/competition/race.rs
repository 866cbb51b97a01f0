// Race competitions: reach every checkpoint in order; fastest finish wins.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;

use super::{
    earliest_first, parse_params, parse_payload, rank_standings, read_progress, to_value,
    with_participant, CompetitionManager, Evidence,
};
use crate::error::BotError;
use crate::models::{Competition, CompetitionResults, Reduction, Standing, UserId};

pub const MAX_CHECKPOINTS: u32 = 50;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RaceParams {
    checkpoints: u32,
}

#[derive(Deserialize)]
struct CheckpointReport {
    checkpoint: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct RaceProgress {
    #[serde(default)]
    reached: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    finished_at: Option<DateTime<Utc>>,
}

#[derive(Default)]
pub struct RaceManager;

/// Finishers by time ascending, then the rest by checkpoints descending,
/// earliest first within ties.
fn race_order(a: &Standing, b: &Standing) -> Ordering {
    b.finished
        .cmp(&a.finished)
        .then_with(|| {
            if a.finished {
                a.score.cmp(&b.score)
            } else {
                b.score.cmp(&a.score)
            }
        })
        .then(earliest_first(a.achieved_at, b.achieved_at))
}

#[async_trait]
impl CompetitionManager for RaceManager {
    fn kind(&self) -> &'static str {
        "race"
    }

    fn reduction(&self) -> Reduction {
        Reduction::BestTime
    }

    /// A race can be settled as soon as the field is done; the end time is a deadline.
    fn is_time_bounded(&self) -> bool {
        false
    }

    async fn validate_parameters(&self, params: &Value) -> Result<Value, BotError> {
        let params: RaceParams = parse_params(params)?;
        if !(1..=MAX_CHECKPOINTS).contains(&params.checkpoints) {
            return Err(BotError::Validation(format!(
                "a race needs between 1 and {MAX_CHECKPOINTS} checkpoints"
            )));
        }
        Ok(to_value(&params))
    }

    fn record_progress(
        &self,
        competition: &Competition,
        actor: UserId,
        payload: &Value,
        _evidence: &Evidence,
        now: DateTime<Utc>,
    ) -> Result<Competition, BotError> {
        let params: RaceParams = parse_params(&competition.parameters)?;
        let report: CheckpointReport = parse_payload(payload)?;

        with_participant(competition, actor, |participant| {
            let mut progress: RaceProgress = read_progress(&participant.progress);
            if progress.finished_at.is_some() {
                return Err(BotError::Rejected("you already finished this race".into()));
            }
            let expected = progress.reached + 1;
            if report.checkpoint != expected {
                return Err(BotError::Rejected(format!(
                    "next checkpoint is {expected} of {}",
                    params.checkpoints
                )));
            }
            progress.reached = report.checkpoint;
            if progress.reached >= params.checkpoints {
                progress.finished_at = Some(now);
            }
            participant.progress = to_value(&progress);
            participant.last_progress_at = Some(now);
            Ok(())
        })
    }

    fn finalize(&self, competition: &Competition) -> CompetitionResults {
        let standings = competition
            .participants
            .iter()
            .map(|p| {
                let progress: RaceProgress = read_progress(&p.progress);
                match progress.finished_at {
                    Some(finished_at) => Standing {
                        user_id: p.user_id,
                        rank: 0,
                        score: (finished_at - competition.start_time)
                            .num_milliseconds()
                            .max(0),
                        finished: true,
                        achieved_at: Some(finished_at),
                    },
                    None => Standing {
                        user_id: p.user_id,
                        rank: 0,
                        score: i64::from(progress.reached),
                        finished: false,
                        achieved_at: p.last_progress_at,
                    },
                }
            })
            .collect();
        rank_standings(standings, race_order)
    }
}
