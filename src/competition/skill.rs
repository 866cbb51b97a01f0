// Skill competitions: most experience gained in one skill.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{
    counter, parse_params, parse_payload, require_linked_account, to_value, CompetitionManager,
    Evidence, ManagerDeps,
};
use crate::error::BotError;
use crate::models::{Competition, CompetitionResults, Reduction, User, UserId};
use crate::stats;

pub const SKILLS: [&str; 23] = [
    "attack",
    "defence",
    "strength",
    "hitpoints",
    "ranged",
    "prayer",
    "magic",
    "cooking",
    "woodcutting",
    "fletching",
    "fishing",
    "firemaking",
    "crafting",
    "smithing",
    "mining",
    "herblore",
    "agility",
    "thieving",
    "slayer",
    "farming",
    "runecrafting",
    "hunter",
    "construction",
];

pub fn validate_skill_name(name: &str) -> Result<String, BotError> {
    let lower = name.trim().to_ascii_lowercase();
    let lower = match lower.as_str() {
        "runecraft" | "rc" => "runecrafting".to_string(),
        "hp" => "hitpoints".to_string(),
        "defense" => "defence".to_string(),
        _ => lower,
    };
    if SKILLS.contains(&lower.as_str()) {
        Ok(lower)
    } else {
        Err(BotError::Validation(format!("invalid skill name: {name}")))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SkillParams {
    skill: String,
    /// Gains are measured from the stats provider instead of self-reported.
    #[serde(default)]
    verified: bool,
}

#[derive(Deserialize)]
struct XpReport {
    xp_delta: i64,
}

pub struct SkillManager {
    deps: ManagerDeps,
}

impl SkillManager {
    pub fn new(deps: &ManagerDeps) -> Self {
        Self { deps: deps.clone() }
    }
}

#[async_trait]
impl CompetitionManager for SkillManager {
    fn kind(&self) -> &'static str {
        "skill"
    }

    fn reduction(&self) -> Reduction {
        Reduction::Sum
    }

    async fn validate_parameters(&self, params: &Value) -> Result<Value, BotError> {
        let mut params: SkillParams = parse_params(params)?;
        params.skill = validate_skill_name(&params.skill)?;
        Ok(to_value(&params))
    }

    fn validate_join(
        &self,
        competition: &Competition,
        user_id: UserId,
        user: Option<&User>,
    ) -> Result<(), BotError> {
        super::default_join_checks(competition, user_id, user)?;
        let params: SkillParams = parse_params(&competition.parameters)?;
        if params.verified {
            require_linked_account(user)?;
        }
        Ok(())
    }

    async fn gather_evidence(
        &self,
        competition: &Competition,
        user: Option<&User>,
        _payload: &Value,
    ) -> Result<Evidence, BotError> {
        let params: SkillParams = parse_params(&competition.parameters)?;
        if !params.verified {
            return Ok(Evidence::default());
        }
        let account = require_linked_account(user)?;
        let snapshot =
            stats::fetch_with_timeout(self.deps.stats.as_ref(), account, self.deps.stats_timeout)
                .await?;
        if snapshot.skill_xp(&params.skill).is_none() {
            return Err(BotError::Rejected(format!(
                "no {} experience on record for {account}",
                params.skill
            )));
        }
        Ok(Evidence {
            snapshot: Some(snapshot),
            question: None,
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
        let params: SkillParams = parse_params(&competition.parameters)?;
        if params.verified {
            let xp = evidence
                .snapshot
                .as_ref()
                .and_then(|s| s.skill_xp(&params.skill))
                .ok_or_else(|| BotError::Rejected("verified stats are required".into()))?;
            counter::apply_observed(competition, actor, xp, now)
        } else {
            let report: XpReport = parse_payload(payload)?;
            counter::apply_delta(competition, actor, report.xp_delta, "experience", now)
        }
    }

    fn finalize(&self, competition: &Competition) -> CompetitionResults {
        counter::finalize(competition)
    }
}
