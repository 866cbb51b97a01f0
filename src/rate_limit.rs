// In-memory sliding-window rate limiter for member commands and stats lookups.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Different rate limit types with their constraints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateLimitType {
    /// Account link attempts per member.
    AccountLinks,
    AccountUnlinks,
    CompetitionJoins,
    CompetitionLeaves,
    /// `competitions` and `competition_info` lookups.
    CompetitionViews,
    /// A member listing their own competitions.
    MyCompetitions,
    ProfileViews,
    LeaderboardViews,
    /// Calls to the external stats API, shared by the whole process.
    StatsLookups,
}

impl RateLimitType {
    /// Time window for the rate limit.
    pub fn window(&self) -> Duration {
        match self {
            RateLimitType::AccountLinks | RateLimitType::AccountUnlinks => {
                Duration::from_secs(300)
            }
            _ => Duration::from_secs(60),
        }
    }

    fn default_max(&self) -> usize {
        match self {
            RateLimitType::AccountLinks => 3,
            RateLimitType::AccountUnlinks => 2,
            RateLimitType::CompetitionJoins => 5,
            RateLimitType::CompetitionLeaves => 3,
            RateLimitType::CompetitionViews => 10,
            RateLimitType::MyCompetitions => 3,
            RateLimitType::ProfileViews => 5,
            RateLimitType::LeaderboardViews => 5,
            RateLimitType::StatsLookups => 60,
        }
    }
}

impl std::fmt::Display for RateLimitType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RateLimitType::AccountLinks => write!(f, "account links per 5 minutes"),
            RateLimitType::AccountUnlinks => write!(f, "account unlinks per 5 minutes"),
            RateLimitType::CompetitionJoins => write!(f, "joins per minute"),
            RateLimitType::CompetitionLeaves => write!(f, "leaves per minute"),
            RateLimitType::CompetitionViews => write!(f, "competition lookups per minute"),
            RateLimitType::MyCompetitions => write!(f, "competition history lookups per minute"),
            RateLimitType::ProfileViews => write!(f, "profile lookups per minute"),
            RateLimitType::LeaderboardViews => write!(f, "leaderboard lookups per minute"),
            RateLimitType::StatsLookups => write!(f, "stats lookups per minute"),
        }
    }
}

/// Error returned when a rate limit is exceeded.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Rate limit exceeded: max {max} {limit_type}")]
pub struct RateLimitError {
    pub limit_type: RateLimitType,
    pub max: usize,
}

/// Key for the rate limit map: (subject, limit_type). Global limits use subject 0.
type LimitKey = (u64, RateLimitType);

/// Thread-safe in-memory rate limiter.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    inner: Arc<Mutex<HashMap<LimitKey, Vec<Instant>>>>,
    limits: HashMap<RateLimitType, usize>,
    enabled: bool,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(HashMap::new())),
            limits: HashMap::new(),
            enabled: true,
        }
    }

    /// A limiter that admits everything (local mode).
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::new()
        }
    }

    /// Override the maximum count for one limit type.
    pub fn with_limit(mut self, limit_type: RateLimitType, max: usize) -> Self {
        self.limits.insert(limit_type, max);
        self
    }

    /// Maximum number of events allowed in the window.
    pub fn max_count(&self, limit_type: RateLimitType) -> usize {
        self.limits
            .get(&limit_type)
            .copied()
            .unwrap_or_else(|| limit_type.default_max())
    }

    /// Check if the subject is within the rate limit for the given type.
    /// If within limits, records the event and returns Ok(()).
    pub fn check_limit(
        &self,
        subject: u64,
        limit_type: RateLimitType,
    ) -> Result<(), RateLimitError> {
        if !self.enabled {
            return Ok(());
        }
        let max = self.max_count(limit_type);
        let window = limit_type.window();
        let now = Instant::now();

        let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let entries = map.entry((subject, limit_type)).or_default();

        // Remove expired entries
        entries.retain(|t| now.duration_since(*t) < window);

        if entries.len() >= max {
            return Err(RateLimitError { limit_type, max });
        }

        entries.push(now);
        Ok(())
    }

    /// Give back the most recent event, e.g. when the guarded action failed
    /// validation before doing any work.
    pub fn release(&self, subject: u64, limit_type: RateLimitType) {
        let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(entries) = map.get_mut(&(subject, limit_type)) {
            entries.pop();
        }
    }

    /// Get the current count for a subject and limit type (for testing/diagnostics).
    pub fn current_count(&self, subject: u64, limit_type: RateLimitType) -> usize {
        let window = limit_type.window();
        let now = Instant::now();
        let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(entries) = map.get_mut(&(subject, limit_type)) {
            entries.retain(|t| now.duration_since(*t) < window);
            entries.len()
        } else {
            0
        }
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}
