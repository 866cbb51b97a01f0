// Boss competitions: most kills of one boss.

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

pub const KNOWN_BOSSES: [&str; 27] = [
    "zulrah",
    "vorkath",
    "alchemical hydra",
    "cerberus",
    "kraken",
    "abyssal sire",
    "grotesque guardians",
    "thermonuclear smoke devil",
    "chaos elemental",
    "crazy archaeologist",
    "scorpia",
    "venenatis",
    "callisto",
    "vet'ion",
    "chaos fanatic",
    "king black dragon",
    "giant mole",
    "deranged archaeologist",
    "sarachnis",
    "tempoross",
    "wintertodt",
    "zalcano",
    "gauntlet",
    "corrupted gauntlet",
    "theatre of blood",
    "chambers of xeric",
    "tombs of amascut",
];

/// Known bosses are lowercased; anything else is accepted as a custom name of 2-50 characters.
pub fn validate_boss_name(name: &str) -> Result<String, BotError> {
    let name = name.trim();
    let lower = name.to_ascii_lowercase();
    if KNOWN_BOSSES.contains(&lower.as_str()) {
        return Ok(lower);
    }
    let len = name.chars().count();
    if !(2..=50).contains(&len) {
        return Err(BotError::Validation(
            "boss name must be 2-50 characters".into(),
        ));
    }
    Ok(lower)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct BossParams {
    boss: String,
    #[serde(default)]
    verified: bool,
}

#[derive(Deserialize)]
struct KillReport {
    kills: i64,
}

pub struct BossManager {
    deps: ManagerDeps,
}

impl BossManager {
    pub fn new(deps: &ManagerDeps) -> Self {
        Self { deps: deps.clone() }
    }
}

#[async_trait]
impl CompetitionManager for BossManager {
    fn kind(&self) -> &'static str {
        "boss"
    }

    fn reduction(&self) -> Reduction {
        Reduction::Sum
    }

    async fn validate_parameters(&self, params: &Value) -> Result<Value, BotError> {
        let mut params: BossParams = parse_params(params)?;
        params.boss = validate_boss_name(&params.boss)?;
        Ok(to_value(&params))
    }

    fn validate_join(
        &self,
        competition: &Competition,
        user_id: UserId,
        user: Option<&User>,
    ) -> Result<(), BotError> {
        super::default_join_checks(competition, user_id, user)?;
        let params: BossParams = parse_params(&competition.parameters)?;
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
        let params: BossParams = parse_params(&competition.parameters)?;
        if !params.verified {
            return Ok(Evidence::default());
        }
        let account = require_linked_account(user)?;
        let snapshot =
            stats::fetch_with_timeout(self.deps.stats.as_ref(), account, self.deps.stats_timeout)
                .await?;
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
        let params: BossParams = parse_params(&competition.parameters)?;
        if params.verified {
            let snapshot = evidence
                .snapshot
                .as_ref()
                .ok_or_else(|| BotError::Rejected("verified stats are required".into()))?;
            // Bosses the player never killed are absent from the snapshot.
            let kills = snapshot.boss_kills(&params.boss).unwrap_or(0);
            counter::apply_observed(competition, actor, kills, now)
        } else {
            let report: KillReport = parse_payload(payload)?;
            counter::apply_delta(competition, actor, report.kills, "kills", now)
        }
    }

    fn finalize(&self, competition: &Competition) -> CompetitionResults {
        counter::finalize(competition)
    }
}
