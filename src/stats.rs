// Stats provider: snapshots of a player's in-game statistics used to verify
// skill and boss progress.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::metrics;
use crate::rate_limit::{RateLimitType, RateLimiter};

/// A possibly stale view of one player's experience and kill counts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub player: String,
    /// Experience per skill, keyed by lowercase skill name.
    #[serde(default)]
    pub skills: BTreeMap<String, i64>,
    /// Kill count per boss, keyed by [`boss_key`].
    #[serde(default)]
    pub bosses: BTreeMap<String, i64>,
    pub fetched_at: DateTime<Utc>,
}

impl StatsSnapshot {
    pub fn skill_xp(&self, skill: &str) -> Option<i64> {
        self.skills.get(&skill.to_ascii_lowercase()).copied()
    }

    pub fn boss_kills(&self, boss: &str) -> Option<i64> {
        self.bosses.get(&boss_key(boss)).copied()
    }
}

/// Normalize a boss display name to the provider's metric key
/// ("Kree'Arra" → "kreearra", "General Graardor" → "general_graardor").
pub fn boss_key(name: &str) -> String {
    name.trim()
        .to_ascii_lowercase()
        .replace('\'', "")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StatsError {
    #[error("player '{0}' not found")]
    NotFound(String),
    #[error("stats provider rate limit reached")]
    RateLimited,
    #[error("stats provider timed out")]
    Timeout,
    #[error("stats provider error: {0}")]
    Unavailable(String),
}

impl StatsError {
    fn outcome(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::RateLimited => "rate_limited",
            Self::Timeout => "timeout",
            Self::Unavailable(_) => "error",
        }
    }
}

#[async_trait]
pub trait StatsProvider: Send + Sync {
    async fn fetch_stats(&self, player: &str) -> Result<StatsSnapshot, StatsError>;
}

/// Bound a provider call and record its outcome.
pub async fn fetch_with_timeout(
    provider: &dyn StatsProvider,
    player: &str,
    timeout: Duration,
) -> Result<StatsSnapshot, StatsError> {
    let result = match tokio::time::timeout(timeout, provider.fetch_stats(player)).await {
        Ok(result) => result,
        Err(_) => Err(StatsError::Timeout),
    };
    let outcome = match &result {
        Ok(_) => "ok",
        Err(e) => e.outcome(),
    };
    metrics::STATS_LOOKUPS_TOTAL
        .with_label_values(&[outcome])
        .inc();
    if let Err(e) = &result {
        tracing::warn!(player, error = %e, "stats lookup failed");
    }
    result
}

// ── HTTP provider ────────────────────────────────────────────────────

#[derive(Deserialize)]
struct PlayerDetails {
    #[serde(rename = "latestSnapshot")]
    latest_snapshot: Option<SnapshotBody>,
}

#[derive(Deserialize)]
struct SnapshotBody {
    data: SnapshotData,
}

#[derive(Deserialize)]
struct SnapshotData {
    #[serde(default)]
    skills: HashMap<String, SkillValue>,
    #[serde(default)]
    bosses: HashMap<String, BossValue>,
}

#[derive(Deserialize)]
struct SkillValue {
    experience: i64,
}

#[derive(Deserialize)]
struct BossValue {
    kills: i64,
}

impl SnapshotData {
    // Unranked skills and bosses come back as -1.
    fn into_snapshot(self, player: &str, fetched_at: DateTime<Utc>) -> StatsSnapshot {
        StatsSnapshot {
            player: player.to_string(),
            skills: self
                .skills
                .into_iter()
                .map(|(name, v)| (name, v.experience.max(0)))
                .collect(),
            bosses: self
                .bosses
                .into_iter()
                .map(|(name, v)| (name, v.kills.max(0)))
                .collect(),
            fetched_at,
        }
    }
}

/// Player lookups against a Wise Old Man style REST API.
pub struct HttpStatsProvider {
    client: reqwest::Client,
    base_url: String,
}

impl HttpStatsProvider {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, StatsError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("clanbot/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| StatsError::Unavailable(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl StatsProvider for HttpStatsProvider {
    async fn fetch_stats(&self, player: &str) -> Result<StatsSnapshot, StatsError> {
        let url = format!("{}/players/{}", self.base_url, player.trim());
        let response = self.client.get(&url).send().await.map_err(|e| {
            if e.is_timeout() {
                StatsError::Timeout
            } else {
                StatsError::Unavailable(e.to_string())
            }
        })?;

        match response.status() {
            reqwest::StatusCode::NOT_FOUND => return Err(StatsError::NotFound(player.to_string())),
            reqwest::StatusCode::TOO_MANY_REQUESTS => return Err(StatsError::RateLimited),
            status if !status.is_success() => {
                return Err(StatsError::Unavailable(format!("HTTP {status}")))
            }
            _ => {}
        }

        let details: PlayerDetails = response
            .json()
            .await
            .map_err(|e| StatsError::Unavailable(format!("bad response body: {e}")))?;
        let data = details
            .latest_snapshot
            .ok_or_else(|| StatsError::NotFound(player.to_string()))?
            .data;

        Ok(data.into_snapshot(player, Utc::now()))
    }
}

// ── Wrappers ─────────────────────────────────────────────────────────

/// Applies a process-wide sliding-window limit before delegating.
pub struct RateLimitedStatsProvider {
    inner: Arc<dyn StatsProvider>,
    limiter: RateLimiter,
}

impl RateLimitedStatsProvider {
    pub fn new(inner: Arc<dyn StatsProvider>, per_minute: usize) -> Self {
        Self {
            inner,
            limiter: RateLimiter::new().with_limit(RateLimitType::StatsLookups, per_minute),
        }
    }
}

#[async_trait]
impl StatsProvider for RateLimitedStatsProvider {
    async fn fetch_stats(&self, player: &str) -> Result<StatsSnapshot, StatsError> {
        self.limiter
            .check_limit(0, RateLimitType::StatsLookups)
            .map_err(|_| StatsError::RateLimited)?;
        self.inner.fetch_stats(player).await
    }
}

/// Fixed snapshots, for local mode and tests.
#[derive(Default)]
pub struct InMemoryStatsProvider {
    players: Mutex<HashMap<String, StatsSnapshot>>,
    delay: Option<Duration>,
}

impl InMemoryStatsProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep before every answer.
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn set(&self, snapshot: StatsSnapshot) {
        let mut players = self.players.lock().unwrap_or_else(|e| e.into_inner());
        players.insert(snapshot.player.to_ascii_lowercase(), snapshot);
    }

    /// Set one skill's experience, creating the player if needed.
    pub fn set_skill(&self, player: &str, skill: &str, xp: i64) {
        let mut players = self.players.lock().unwrap_or_else(|e| e.into_inner());
        players
            .entry(player.to_ascii_lowercase())
            .or_insert_with(|| empty_snapshot(player))
            .skills
            .insert(skill.to_ascii_lowercase(), xp);
    }

    pub fn set_boss(&self, player: &str, boss: &str, kills: i64) {
        let mut players = self.players.lock().unwrap_or_else(|e| e.into_inner());
        players
            .entry(player.to_ascii_lowercase())
            .or_insert_with(|| empty_snapshot(player))
            .bosses
            .insert(boss_key(boss), kills);
    }
}

fn empty_snapshot(player: &str) -> StatsSnapshot {
    StatsSnapshot {
        player: player.to_string(),
        skills: BTreeMap::new(),
        bosses: BTreeMap::new(),
        fetched_at: Utc::now(),
    }
}

#[async_trait]
impl StatsProvider for InMemoryStatsProvider {
    async fn fetch_stats(&self, player: &str) -> Result<StatsSnapshot, StatsError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let players = self.players.lock().unwrap_or_else(|e| e.into_inner());
        players
            .get(&player.to_ascii_lowercase())
            .cloned()
            .ok_or_else(|| StatsError::NotFound(player.to_string()))
    }
}
