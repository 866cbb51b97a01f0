// Trivia competitions: one answer per question, most correct answers wins.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};

use super::{
    by_score_desc, parse_params, parse_payload, rank_standings, read_progress, to_value,
    with_participant, CompetitionManager, Evidence, ManagerDeps,
};
use crate::error::BotError;
use crate::models::{Competition, CompetitionResults, Reduction, Standing, User, UserId};

pub const MAX_QUESTIONS: usize = 50;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TriviaParams {
    question_ids: Vec<String>,
}

#[derive(Deserialize)]
struct AnswerReport {
    question_id: String,
    answer: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct AnswerRecord {
    correct: bool,
    at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct TriviaProgress {
    #[serde(default)]
    answers: BTreeMap<String, AnswerRecord>,
}

impl TriviaProgress {
    fn correct(&self) -> i64 {
        self.answers.values().filter(|a| a.correct).count() as i64
    }

    fn last_correct_at(&self) -> Option<DateTime<Utc>> {
        self.answers
            .values()
            .filter(|a| a.correct)
            .map(|a| a.at)
            .max()
    }
}

pub struct TriviaManager {
    deps: ManagerDeps,
}

impl TriviaManager {
    pub fn new(deps: &ManagerDeps) -> Self {
        Self { deps: deps.clone() }
    }
}

#[async_trait]
impl CompetitionManager for TriviaManager {
    fn kind(&self) -> &'static str {
        "trivia"
    }

    fn reduction(&self) -> Reduction {
        Reduction::Sum
    }

    async fn validate_parameters(&self, params: &Value) -> Result<Value, BotError> {
        let params: TriviaParams = parse_params(params)?;
        let ids: Vec<String> = params
            .question_ids
            .iter()
            .map(|id| id.trim().to_string())
            .collect();
        if ids.is_empty() || ids.len() > MAX_QUESTIONS {
            return Err(BotError::Validation(format!(
                "a quiz needs between 1 and {MAX_QUESTIONS} questions"
            )));
        }
        let mut seen = HashSet::new();
        for id in &ids {
            if !seen.insert(id.as_str()) {
                return Err(BotError::Validation(format!("question {id} is listed twice")));
            }
            if self.deps.questions.question(id).await?.is_none() {
                return Err(BotError::Validation(format!("unknown question id: {id}")));
            }
        }
        Ok(to_value(&TriviaParams { question_ids: ids }))
    }

    async fn gather_evidence(
        &self,
        competition: &Competition,
        _user: Option<&User>,
        payload: &Value,
    ) -> Result<Evidence, BotError> {
        let params: TriviaParams = parse_params(&competition.parameters)?;
        let report: AnswerReport = parse_payload(payload)?;
        if !params.question_ids.contains(&report.question_id) {
            return Err(BotError::Rejected(format!(
                "question {} is not part of this quiz",
                report.question_id
            )));
        }
        let question = self
            .deps
            .questions
            .question(&report.question_id)
            .await?
            .ok_or_else(|| BotError::not_found("question", &report.question_id))?;
        Ok(Evidence {
            snapshot: None,
            question: Some(question),
        })
    }

    fn record_progress(
        &self,
        competition: &Competition,
        actor: UserId,
        payload: &Value,
        evidence: &Evidence,
        now: DateTime<Utc>,
    ) -> Result<Competition, BotError> {
        let report: AnswerReport = parse_payload(payload)?;
        let question = evidence
            .question
            .as_ref()
            .filter(|q| q.id == report.question_id)
            .ok_or_else(|| BotError::Rejected("question could not be checked".into()))?;

        with_participant(competition, actor, |participant| {
            let mut progress: TriviaProgress = read_progress(&participant.progress);
            if progress.answers.contains_key(&report.question_id) {
                return Err(BotError::Rejected(
                    "you already answered this question".into(),
                ));
            }
            let correct = question.is_correct(&report.answer);
            progress
                .answers
                .insert(report.question_id.clone(), AnswerRecord { correct, at: now });
            participant.progress = to_value(&progress);
            if correct {
                participant.last_progress_at = Some(now);
            }
            Ok(())
        })
    }

    fn finalize(&self, competition: &Competition) -> CompetitionResults {
        let standings = competition
            .participants
            .iter()
            .map(|p| {
                let progress: TriviaProgress = read_progress(&p.progress);
                let correct = progress.correct();
                Standing {
                    user_id: p.user_id,
                    rank: 0,
                    score: correct,
                    finished: correct > 0,
                    achieved_at: progress.last_correct_at(),
                }
            })
            .collect();
        rank_standings(standings, by_score_desc)
    }
}
