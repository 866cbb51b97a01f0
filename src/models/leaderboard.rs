// Leaderboard entries, one per (subject, category).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ScopeId, UserId};
use crate::store::Entity;

/// Category kind aggregating every competition type in a scope.
pub const OVERALL_CATEGORY: &str = "overall";
pub const PARTICIPATION_CATEGORY: &str = "participation";
pub const WIN_RATE_CATEGORY: &str = "win_rate";
const MONTHLY_WINS_PREFIX: &str = "monthly_wins_";
const MONTHLY_PARTICIPATION_PREFIX: &str = "monthly_participation_";

/// How per-competition standings fold into a leaderboard score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reduction {
    /// Sum of scores across competitions (XP, kills, correct answers).
    Sum,
    /// Lowest finished time across competitions, in milliseconds.
    BestTime,
    /// Number of first places.
    WinCount,
    /// Number of completed competitions entered.
    Participation,
    /// First places per competition entered, in basis points (10000 = every one won).
    WinRate,
}

impl Reduction {
    pub fn lower_is_better(self) -> bool {
        matches!(self, Self::BestTime)
    }
}

/// What a category kind ranks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Board {
    /// All-time wins across every type.
    Overall,
    Participation,
    WinRate,
    /// Wins in competitions completed during one `YYYY-MM` month.
    MonthlyWins(String),
    MonthlyParticipation(String),
    /// One competition type, reduced the way its manager says.
    Type(String),
}

impl Board {
    pub fn parse(kind: &str) -> Self {
        if let Some(month) = kind.strip_prefix(MONTHLY_WINS_PREFIX) {
            return Self::MonthlyWins(month.to_string());
        }
        if let Some(month) = kind.strip_prefix(MONTHLY_PARTICIPATION_PREFIX) {
            return Self::MonthlyParticipation(month.to_string());
        }
        match kind {
            OVERALL_CATEGORY => Self::Overall,
            PARTICIPATION_CATEGORY => Self::Participation,
            WIN_RATE_CATEGORY => Self::WinRate,
            other => Self::Type(other.to_string()),
        }
    }

    /// Month filter for periodic boards.
    pub fn month(&self) -> Option<&str> {
        match self {
            Self::MonthlyWins(m) | Self::MonthlyParticipation(m) => Some(m),
            _ => None,
        }
    }
}

/// `YYYY-MM` key of the month a timestamp falls in.
pub fn month_key(at: DateTime<Utc>) -> String {
    at.format("%Y-%m").to_string()
}

/// A leaderboard category: a scope plus either a competition type tag or
/// [`OVERALL_CATEGORY`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Category {
    pub scope: ScopeId,
    pub kind: String,
}

impl Category {
    pub fn new(scope: ScopeId, kind: impl Into<String>) -> Self {
        Self {
            scope,
            kind: kind.into(),
        }
    }

    pub fn overall(scope: ScopeId) -> Self {
        Self::new(scope, OVERALL_CATEGORY)
    }

    pub fn participation(scope: ScopeId) -> Self {
        Self::new(scope, PARTICIPATION_CATEGORY)
    }

    pub fn win_rate(scope: ScopeId) -> Self {
        Self::new(scope, WIN_RATE_CATEGORY)
    }

    pub fn monthly_wins(scope: ScopeId, month: &str) -> Self {
        Self::new(scope, format!("{MONTHLY_WINS_PREFIX}{month}"))
    }

    pub fn monthly_participation(scope: ScopeId, month: &str) -> Self {
        Self::new(scope, format!("{MONTHLY_PARTICIPATION_PREFIX}{month}"))
    }

    pub fn board(&self) -> Board {
        Board::parse(&self.kind)
    }

    pub fn entry_id(&self, user_id: UserId) -> String {
        format!("{}:{}:{}", self.scope, self.kind, user_id)
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.scope, self.kind)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub id: String,
    pub scope: ScopeId,
    pub category: String,
    pub user_id: UserId,
    pub rank: u32,
    pub score: i64,
    pub competitions: u32,
    pub wins: u32,
    #[serde(default)]
    pub achievements: Vec<String>,
    /// Completion time of the newest competition that contributed.
    pub last_updated: DateTime<Utc>,
}

impl LeaderboardEntry {
    pub fn belongs_to(&self, category: &Category) -> bool {
        self.scope == category.scope && self.category == category.kind
    }
}

impl Entity for LeaderboardEntry {
    const COLLECTION: &'static str = "leaderboards";

    fn key(&self) -> String {
        self.id.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_ids() {
        let category = Category::new(ScopeId(10), "skill");
        assert_eq!(category.to_string(), "10:skill");
        assert_eq!(category.entry_id(UserId(3)), "10:skill:3");
        assert_eq!(Category::overall(ScopeId(10)).entry_id(UserId(3)), "10:overall:3");
    }

    #[test]
    fn test_board_parsing() {
        let scope = ScopeId(10);
        assert_eq!(Category::overall(scope).board(), Board::Overall);
        assert_eq!(Category::win_rate(scope).board(), Board::WinRate);
        assert_eq!(Category::participation(scope).board(), Board::Participation);
        let monthly = Category::monthly_wins(scope, "2026-03");
        assert_eq!(monthly.kind, "monthly_wins_2026-03");
        assert_eq!(monthly.board(), Board::MonthlyWins("2026-03".into()));
        assert_eq!(monthly.board().month(), Some("2026-03"));
        assert_eq!(
            Category::monthly_participation(scope, "2026-04").board(),
            Board::MonthlyParticipation("2026-04".into())
        );
        assert_eq!(Category::new(scope, "boss").board(), Board::Type("boss".into()));
    }

    #[test]
    fn test_month_key() {
        use chrono::TimeZone;
        let at = Utc.with_ymd_and_hms(2026, 3, 31, 23, 59, 0).unwrap();
        assert_eq!(month_key(at), "2026-03");
    }

    #[test]
    fn test_reduction_direction() {
        assert!(Reduction::BestTime.lower_is_better());
        assert!(!Reduction::Sum.lower_is_better());
        assert!(!Reduction::WinCount.lower_is_better());
        assert!(!Reduction::WinRate.lower_is_better());
    }
}
