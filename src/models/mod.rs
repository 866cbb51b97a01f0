// Domain models: plain data plus validation, no I/O.

pub mod competition;
pub mod leaderboard;
pub mod trivia;
pub mod user;

use serde::{Deserialize, Serialize};

pub use competition::{
    Competition, CompetitionResults, CompetitionStatus, NewCompetition, Participant, Standing,
};
pub use leaderboard::{month_key, Board, Category, LeaderboardEntry, Reduction, OVERALL_CATEGORY};
pub use trivia::TriviaQuestion;
pub use user::User;

/// Chat-platform account id of a member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub u64);

impl UserId {
    /// Actor used by background jobs (expiry sweeps). Never a real account.
    pub const SYSTEM: UserId = UserId(0);

    pub fn is_system(self) -> bool {
        self == Self::SYSTEM
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Server (guild) that owns competitions and leaderboards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScopeId(pub u64);

impl std::fmt::Display for ScopeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
