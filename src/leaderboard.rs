// Leaderboard aggregation: derive per-category rankings and achievements
// from completed competitions, replacing a category in one write.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::competition::ManagerFactory;
use crate::error::BotError;
use crate::metrics;
use crate::models::{
    month_key, Board, Category, Competition, CompetitionStatus, LeaderboardEntry, Reduction,
    ScopeId, UserId,
};
use crate::store::{Commit, Repository, Store};

const WIN_MILESTONES: [u32; 4] = [5, 10, 25, 50];
const PARTICIPATION_MILESTONES: [u32; 4] = [10, 25, 50, 100];

/// Result of one category recomputation.
#[derive(Debug, Clone)]
pub struct RecomputeOutcome {
    pub category: Category,
    pub entries: Vec<LeaderboardEntry>,
    /// sha-256 over the serialized entry set.
    pub digest: String,
    /// False when the stored entries were already identical.
    pub written: bool,
}

pub struct LeaderboardAggregator {
    competitions: Arc<Store<Competition>>,
    leaderboards: Arc<Store<LeaderboardEntry>>,
    factory: Arc<ManagerFactory>,
    /// Held for a whole read-derive-write so an older rebuild never lands
    /// after a newer one.
    rebuild: tokio::sync::Mutex<()>,
}

impl LeaderboardAggregator {
    pub fn new(
        competitions: Arc<Store<Competition>>,
        leaderboards: Arc<Store<LeaderboardEntry>>,
        factory: Arc<ManagerFactory>,
    ) -> Self {
        Self {
            competitions,
            leaderboards,
            factory,
            rebuild: tokio::sync::Mutex::new(()),
        }
    }

    /// Rebuild one category from every completed competition it covers.
    pub async fn recompute(&self, category: &Category) -> Result<RecomputeOutcome, BotError> {
        let _rebuild = self.rebuild.lock().await;
        let board = category.board();
        let (reduction, tags) = match &board {
            Board::Overall => (Reduction::WinCount, Tags::Overall),
            Board::Participation => (Reduction::Participation, Tags::Overall),
            Board::WinRate => (Reduction::WinRate, Tags::Overall),
            Board::MonthlyWins(_) => (Reduction::WinCount, Tags::None),
            Board::MonthlyParticipation(_) => (Reduction::Participation, Tags::None),
            Board::Type(kind) => (self.factory.create(kind)?.reduction(), Tags::PerType),
        };

        let mut completed = {
            let scope = category.scope;
            let board = board.clone();
            self.competitions
                .list_where(move |c| c.scope == scope && covers(&board, c))
                .await?
        };
        completed.sort_by(|a, b| {
            a.completed_at
                .cmp(&b.completed_at)
                .then_with(|| a.id.cmp(&b.id))
        });

        let entries = derive(category, reduction, tags, &completed);
        let new_digest = digest(&entries);

        let written = {
            let category = category.clone();
            let new_digest = new_digest.clone();
            let replacement = entries.clone();
            self.leaderboards
                .mutate(move |records| {
                    let mut current: Vec<LeaderboardEntry> = records
                        .iter()
                        .filter(|e| e.belongs_to(&category))
                        .cloned()
                        .collect();
                    sort_entries(&mut current);
                    if digest(&current) == new_digest {
                        return Ok::<_, BotError>(Commit::Unchanged(false));
                    }
                    records.retain(|e| !e.belongs_to(&category));
                    records.extend(replacement);
                    Ok(Commit::Write(true))
                })
                .await?
        };

        metrics::LEADERBOARD_RECOMPUTES_TOTAL.inc();
        if written {
            tracing::info!(
                category = %category,
                entries = entries.len(),
                competitions = completed.len(),
                "leaderboard updated"
            );
        } else {
            tracing::debug!(category = %category, "leaderboard unchanged");
        }

        Ok(RecomputeOutcome {
            category: category.clone(),
            entries,
            digest: new_digest,
            written,
        })
    }

    /// Recompute the categories a completed competition feeds: its type, the
    /// all-time aggregates and the boards for the month it completed in.
    pub async fn recompute_for(
        &self,
        competition: &Competition,
    ) -> Result<Vec<RecomputeOutcome>, BotError> {
        let scope = competition.scope;
        let month = month_key(completion_time(competition));
        let categories = [
            Category::new(scope, competition.kind.clone()),
            Category::overall(scope),
            Category::participation(scope),
            Category::win_rate(scope),
            Category::monthly_wins(scope, &month),
            Category::monthly_participation(scope, &month),
        ];
        let mut outcomes = Vec::with_capacity(categories.len());
        for category in categories {
            outcomes.push(self.recompute(&category).await?);
        }
        Ok(outcomes)
    }

    /// Best `limit` entries of a category, by rank then user id.
    pub async fn top(
        &self,
        category: &Category,
        limit: usize,
    ) -> Result<Vec<LeaderboardEntry>, BotError> {
        let category = category.clone();
        let mut entries = self
            .leaderboards
            .list_where(move |e| e.belongs_to(&category))
            .await?;
        sort_entries(&mut entries);
        entries.truncate(limit);
        Ok(entries)
    }

    pub async fn entries_for_user(
        &self,
        scope: ScopeId,
        user_id: UserId,
    ) -> Result<Vec<LeaderboardEntry>, BotError> {
        let mut entries = self
            .leaderboards
            .list_where(move |e| e.scope == scope && e.user_id == user_id)
            .await?;
        entries.sort_by(|a, b| a.category.cmp(&b.category));
        Ok(entries)
    }
}

// ── Derivation ───────────────────────────────────────────────────────

/// Achievement set a board awards.
#[derive(Debug, Clone, Copy)]
enum Tags {
    /// Win, participation and streak milestones.
    Overall,
    /// Podium and champion finishes in one type.
    PerType,
    None,
}

#[derive(Default)]
struct Tally {
    score: Option<i64>,
    competitions: u32,
    wins: u32,
    podiums: u32,
    /// Win flag per participated competition, in completion order.
    history: Vec<bool>,
    last_updated: Option<DateTime<Utc>>,
}

impl Tally {
    /// Board score; `None` keeps the member off the board.
    fn score(&self, reduction: Reduction) -> Option<i64> {
        match reduction {
            Reduction::Sum | Reduction::BestTime => self.score,
            Reduction::WinCount => Some(i64::from(self.wins)),
            Reduction::Participation => Some(i64::from(self.competitions)),
            Reduction::WinRate if self.competitions == 0 => Some(0),
            Reduction::WinRate => {
                Some(i64::from(self.wins) * 10_000 / i64::from(self.competitions))
            }
        }
    }
}

fn completion_time(c: &Competition) -> DateTime<Utc> {
    c.completed_at.unwrap_or(c.end_time)
}

/// Whether a competition feeds a board (scope is checked by the caller).
fn covers(board: &Board, c: &Competition) -> bool {
    if c.status != CompetitionStatus::Completed {
        return false;
    }
    if let Some(month) = board.month() {
        return month_key(completion_time(c)) == month;
    }
    match board {
        Board::Type(kind) => c.kind == *kind,
        _ => true,
    }
}

/// Fold standings of `completed` (already in completion order) per user.
fn tally(completed: &[Competition], reduction: Reduction) -> BTreeMap<UserId, Tally> {
    let mut tallies: BTreeMap<UserId, Tally> = BTreeMap::new();
    for competition in completed {
        let Some(results) = &competition.results else {
            continue;
        };
        let at = completion_time(competition);
        for standing in &results.standings {
            let t = tallies.entry(standing.user_id).or_default();
            let won = standing.finished && standing.rank == 1;
            t.competitions += 1;
            t.history.push(won);
            if won {
                t.wins += 1;
            }
            if standing.finished && standing.rank <= 3 {
                t.podiums += 1;
            }
            t.last_updated = Some(t.last_updated.map_or(at, |prev| prev.max(at)));

            match reduction {
                Reduction::Sum if standing.finished => {
                    t.score = Some(t.score.unwrap_or(0) + standing.score);
                }
                Reduction::Sum => {
                    t.score.get_or_insert(0);
                }
                Reduction::BestTime if standing.finished => {
                    t.score = Some(t.score.map_or(standing.score, |s| s.min(standing.score)));
                }
                // Counted from the tally itself.
                _ => {}
            }
        }
    }
    tallies
}

fn longest_win_streak(history: &[bool]) -> usize {
    history
        .split(|won| !won)
        .map(<[bool]>::len)
        .max()
        .unwrap_or(0)
}

fn overall_achievements(t: &Tally) -> Vec<String> {
    let mut tags = Vec::new();
    if t.wins >= 1 {
        tags.push("first_win".to_string());
    }
    for milestone in WIN_MILESTONES.into_iter().filter(|m| t.wins >= *m) {
        tags.push(format!("multiple_wins_{milestone}"));
    }
    for milestone in PARTICIPATION_MILESTONES
        .into_iter()
        .filter(|m| t.competitions >= *m)
    {
        tags.push(format!("participation_{milestone}"));
    }
    if longest_win_streak(&t.history) >= 3 {
        tags.push("win_streak_3".to_string());
    }
    tags
}

fn category_achievements(t: &Tally) -> Vec<String> {
    let mut tags = Vec::new();
    if t.podiums > 0 {
        tags.push("podium".to_string());
    }
    if t.wins > 0 {
        tags.push("champion".to_string());
    }
    tags
}

fn derive(
    category: &Category,
    reduction: Reduction,
    tags: Tags,
    completed: &[Competition],
) -> Vec<LeaderboardEntry> {
    let mut rows: Vec<(UserId, i64, Tally)> = tally(completed, reduction)
        .into_iter()
        // Best-time boards only list members with a finished run.
        .filter_map(|(user_id, t)| t.score(reduction).map(|score| (user_id, score, t)))
        .collect();
    rows.sort_by(|(ua, a, _), (ub, b, _)| {
        let by_score = if reduction.lower_is_better() {
            a.cmp(b)
        } else {
            b.cmp(a)
        };
        by_score.then(ua.cmp(ub))
    });

    let mut entries: Vec<LeaderboardEntry> = Vec::with_capacity(rows.len());
    for (i, (user_id, score, t)) in rows.into_iter().enumerate() {
        let rank = match entries.last() {
            Some(prev) if prev.score == score => prev.rank,
            _ => i as u32 + 1,
        };
        let achievements = match tags {
            Tags::Overall => overall_achievements(&t),
            Tags::PerType => category_achievements(&t),
            Tags::None => Vec::new(),
        };
        entries.push(LeaderboardEntry {
            id: category.entry_id(user_id),
            scope: category.scope,
            category: category.kind.clone(),
            user_id,
            rank,
            score,
            competitions: t.competitions,
            wins: t.wins,
            achievements,
            last_updated: t.last_updated.unwrap_or_default(),
        });
    }
    entries
}

fn sort_entries(entries: &mut [LeaderboardEntry]) {
    entries.sort_by(|a, b| a.rank.cmp(&b.rank).then(a.user_id.cmp(&b.user_id)));
}

fn digest(entries: &[LeaderboardEntry]) -> String {
    let bytes = serde_json::to_vec(entries).unwrap_or_default();
    hex::encode(Sha256::digest(&bytes))
}
