// Lifecycle orchestrator: owns every competition state transition.
//
// Draft → Active → {Completed, Cancelled}, plus Draft → Cancelled. Each
// mutation re-validates against the latest persisted record while holding the
// competitions collection lock, so a transition that lands first wins and any
// stale join/progress fails with InvalidState.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

use crate::auth::{Action, AuthorizationProvider};
use crate::clock::Clock;
use crate::competition::{CompetitionManager, ManagerFactory};
use crate::config::Config;
use crate::error::BotError;
use crate::leaderboard::LeaderboardAggregator;
use crate::metrics;
use crate::models::{
    Competition, CompetitionResults, CompetitionStatus, NewCompetition, ScopeId, User, UserId,
};
use crate::store::{Commit, Repository, StorageError, Store};

/// Drafts are activated immediately; one still in Draft after this long was
/// left behind by a failed create and is cancelled by the sweeper.
const STALE_DRAFT_MINUTES: i64 = 10;

pub const EXPIRED_EMPTY_REASON: &str = "expired with no participants";
const STALE_DRAFT_REASON: &str = "creation did not finish";

/// What one expiry sweep did.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SweepReport {
    pub completed: Vec<String>,
    pub cancelled: Vec<String>,
    pub failed: usize,
}

pub struct Orchestrator {
    config: Arc<Config>,
    competitions: Arc<Store<Competition>>,
    users: Arc<Store<User>>,
    factory: Arc<ManagerFactory>,
    authz: Arc<dyn AuthorizationProvider>,
    aggregator: Arc<LeaderboardAggregator>,
    clock: Arc<dyn Clock>,
}

impl Orchestrator {
    pub fn new(
        config: Arc<Config>,
        competitions: Arc<Store<Competition>>,
        users: Arc<Store<User>>,
        factory: Arc<ManagerFactory>,
        authz: Arc<dyn AuthorizationProvider>,
        aggregator: Arc<LeaderboardAggregator>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            competitions,
            users,
            factory,
            authz,
            aggregator,
            clock,
        }
    }

    fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// The system actor (expiry sweeper) bypasses the provider.
    async fn authorize(&self, actor: UserId, action: Action, scope: ScopeId) -> Result<(), BotError> {
        if actor.is_system() || self.authz.is_authorized(actor, action, scope).await {
            Ok(())
        } else {
            tracing::debug!(actor = %actor, action = %action, scope = %scope, "unauthorized");
            Err(BotError::Unauthorized)
        }
    }

    async fn load(&self, id: &str) -> Result<Competition, BotError> {
        self.competitions
            .get(id)
            .await?
            .ok_or_else(|| BotError::not_found("competition", id))
    }

    async fn load_user(&self, user_id: UserId) -> Result<Option<User>, BotError> {
        Ok(self.users.get(&user_id.to_string()).await?)
    }

    /// Run `f` on the latest committed version of one competition, under the
    /// collection lock.
    async fn mutate_competition<T, F>(&self, id: &str, f: F) -> Result<T, BotError>
    where
        F: FnOnce(&mut Competition) -> Result<Commit<T>, BotError> + Send,
        T: Send,
    {
        let id = id.to_string();
        self.competitions
            .mutate(move |records| {
                let competition = records
                    .iter_mut()
                    .find(|c| c.id == id)
                    .ok_or_else(|| BotError::not_found("competition", &id))?;
                f(competition)
            })
            .await
    }

    fn count_open(records: &[Competition], scope: ScopeId) -> usize {
        records
            .iter()
            .filter(|c| {
                c.scope == scope
                    && matches!(c.status, CompetitionStatus::Draft | CompetitionStatus::Active)
            })
            .count()
    }

    // ── Transitions ──────────────────────────────────────────────────

    /// Validate, persist a Draft, then activate it.
    pub async fn create_competition(
        &self,
        scope: ScopeId,
        actor: UserId,
        mut request: NewCompetition,
    ) -> Result<Competition, BotError> {
        self.authorize(actor, Action::CreateCompetition, scope).await?;

        let limit = self.config.max_active_competitions;
        let open = self
            .competitions
            .list_where(move |c| {
                c.scope == scope
                    && matches!(c.status, CompetitionStatus::Draft | CompetitionStatus::Active)
            })
            .await?
            .len();
        if open >= limit {
            return Err(BotError::LimitExceeded { limit });
        }

        let manager = self.factory.create(&request.kind)?;
        request.parameters = manager.validate_parameters(&request.parameters).await?;

        let now = self.now();
        let draft = Competition::draft(
            uuid::Uuid::new_v4().to_string(),
            scope,
            actor,
            request,
            manager.kind(),
            self.config.default_duration_hours,
            self.config.default_max_participants,
            now,
        )?;
        let id = draft.id.clone();

        // The authoritative limit check runs under the lock so concurrent
        // creates cannot overshoot.
        self.competitions
            .mutate(move |records| {
                if Self::count_open(records, scope) >= limit {
                    return Err(BotError::LimitExceeded { limit });
                }
                records.push(draft);
                Ok(Commit::Write(()))
            })
            .await?;

        let competition = self
            .mutate_competition(&id, |c| {
                c.transition(CompetitionStatus::Active, now)?;
                Ok(Commit::Write(c.clone()))
            })
            .await?;

        metrics::COMPETITIONS_CREATED_TOTAL
            .with_label_values(&[competition.kind.as_str()])
            .inc();
        tracing::info!(
            competition_id = %competition.id,
            scope = %scope,
            kind = %competition.kind,
            actor = %actor,
            "competition created"
        );
        Ok(competition)
    }

    pub async fn join(&self, id: &str, actor: UserId) -> Result<Competition, BotError> {
        let current = self.load(id).await?;
        current.ensure_active()?;
        let manager = self.factory.create(&current.kind)?;
        let user = self.load_user(actor).await?;
        let now = self.now();

        let competition = self
            .mutate_competition(id, move |c| {
                c.ensure_active()?;
                if c.has_ended(now) {
                    return Err(c.invalid_state("competition has ended"));
                }
                manager.validate_join(c, actor, user.as_ref())?;
                c.add_participant(actor, now);
                Ok(Commit::Write(c.clone()))
            })
            .await?;

        metrics::PARTICIPANT_JOINS_TOTAL.inc();
        self.touch_user(actor, now).await;
        tracing::info!(competition_id = %id, actor = %actor, "participant joined");
        Ok(competition)
    }

    /// Leaving a competition you are not in succeeds without writing.
    pub async fn leave(&self, id: &str, actor: UserId) -> Result<Competition, BotError> {
        let competition = self
            .mutate_competition(id, move |c| {
                c.ensure_active()?;
                if c.remove_participant(actor) {
                    Ok(Commit::Write(c.clone()))
                } else {
                    Ok(Commit::Unchanged(c.clone()))
                }
            })
            .await?;
        tracing::debug!(competition_id = %id, actor = %actor, "leave processed");
        Ok(competition)
    }

    pub async fn record_progress(
        &self,
        id: &str,
        actor: UserId,
        payload: Value,
    ) -> Result<Competition, BotError> {
        let current = self.load(id).await?;
        current.ensure_active()?;
        if !current.is_participant(actor) {
            return Err(BotError::Rejected(
                "you are not participating in this competition".into(),
            ));
        }
        if current.has_ended(self.now()) {
            return Err(current.invalid_state("competition has ended"));
        }
        let manager = self.factory.create(&current.kind)?;
        let user = self.load_user(actor).await?;

        // Lookups happen before the lock. Stats calls are bounded by
        // `stats_timeout` inside the manager; a failure leaves the
        // competition untouched.
        let evidence = manager
            .gather_evidence(&current, user.as_ref(), &payload)
            .await?;

        let now = self.now();
        let snapshot = evidence.snapshot.clone();
        let competition = {
            let manager = manager.clone();
            self.mutate_competition(id, move |c| {
                c.ensure_active()?;
                if c.has_ended(now) {
                    return Err(c.invalid_state("competition has ended"));
                }
                *c = manager.record_progress(c, actor, &payload, &evidence, now)?;
                Ok(Commit::Write(c.clone()))
            })
            .await?
        };

        metrics::PROGRESS_UPDATES_TOTAL
            .with_label_values(&[competition.kind.as_str()])
            .inc();
        if let Some(snapshot) = snapshot {
            self.cache_snapshot(actor, snapshot, now).await;
        } else {
            self.touch_user(actor, now).await;
        }
        tracing::debug!(competition_id = %id, actor = %actor, "progress recorded");
        Ok(competition)
    }

    /// Finalize and persist results, then update leaderboards before returning.
    /// `early` allows completion before the end time and needs `CompleteEarly`.
    pub async fn complete(
        &self,
        id: &str,
        actor: UserId,
        early: bool,
    ) -> Result<Competition, BotError> {
        let current = self.load(id).await?;
        let action = if early {
            Action::CompleteEarly
        } else {
            Action::CompleteCompetition
        };
        self.authorize(actor, action, current.scope).await?;
        let manager = self.factory.create(&current.kind)?;
        let now = self.now();

        let competition = self
            .mutate_competition(id, move |c| {
                Self::check_completable(manager.as_ref(), c, early, now)?;
                let results = manager.finalize(c);
                c.transition(CompetitionStatus::Completed, now)?;
                c.results = Some(results);
                Ok(Commit::Write(c.clone()))
            })
            .await?;

        metrics::COMPETITIONS_COMPLETED_TOTAL
            .with_label_values(&[competition.kind.as_str()])
            .inc();
        tracing::info!(
            competition_id = %id,
            actor = %actor,
            winner = ?competition.results.as_ref().and_then(|r| r.winner()),
            "competition completed"
        );

        if let Err(e) = self.aggregator.recompute_for(&competition).await {
            tracing::error!(
                competition_id = %id,
                error = %e,
                "leaderboard update failed after completion"
            );
            return Err(e);
        }
        Ok(competition)
    }

    fn check_completable(
        manager: &dyn CompetitionManager,
        c: &Competition,
        early: bool,
        now: DateTime<Utc>,
    ) -> Result<(), BotError> {
        if c.status != CompetitionStatus::Active {
            return Err(c.invalid_state("cannot move to completed"));
        }
        if c.participants.is_empty() {
            return Err(c.invalid_state("competition has no participants"));
        }
        if !early && manager.is_time_bounded() && !c.has_ended(now) {
            return Err(c.invalid_state(format!(
                "competition runs until {}",
                c.end_time.format("%Y-%m-%d %H:%M UTC")
            )));
        }
        Ok(())
    }

    /// Cancel from Draft or Active. Leaderboards are not touched.
    pub async fn cancel(
        &self,
        id: &str,
        actor: UserId,
        reason: Option<String>,
    ) -> Result<Competition, BotError> {
        let current = self.load(id).await?;
        self.authorize(actor, Action::CancelCompetition, current.scope)
            .await?;
        let now = self.now();
        let reason = reason
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty());

        let competition = self
            .mutate_competition(id, move |c| {
                c.transition(CompetitionStatus::Cancelled, now)?;
                c.cancellation_reason = reason;
                Ok(Commit::Write(c.clone()))
            })
            .await?;

        metrics::COMPETITIONS_CANCELLED_TOTAL.inc();
        tracing::info!(competition_id = %id, actor = %actor, "competition cancelled");
        Ok(competition)
    }

    // ── Views ────────────────────────────────────────────────────────

    pub async fn get_competition(&self, id: &str) -> Result<Competition, BotError> {
        self.load(id).await
    }

    /// Competitions in a scope, newest first.
    pub async fn list_competitions(
        &self,
        scope: ScopeId,
        status: Option<CompetitionStatus>,
    ) -> Result<Vec<Competition>, BotError> {
        let mut list = self
            .competitions
            .list_where(move |c| c.scope == scope && status.map_or(true, |s| c.status == s))
            .await?;
        list.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        Ok(list)
    }

    /// Final results once completed, otherwise live rankings (not persisted).
    pub async fn standings(&self, id: &str) -> Result<CompetitionResults, BotError> {
        let competition = self.load(id).await?;
        if let Some(results) = competition.results {
            return Ok(results);
        }
        let manager = self.factory.create(&competition.kind)?;
        Ok(manager.finalize(&competition))
    }

    pub async fn user_competitions(
        &self,
        user_id: UserId,
        scope: Option<ScopeId>,
    ) -> Result<Vec<Competition>, BotError> {
        let mut list = self
            .competitions
            .list_where(move |c| {
                c.is_participant(user_id) && scope.map_or(true, |s| c.scope == s)
            })
            .await?;
        list.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        Ok(list)
    }

    // ── Expiry ───────────────────────────────────────────────────────

    /// Complete expired Active competitions, cancel expired empty ones and
    /// abandoned Drafts. Failures are logged and counted; the sweep goes on.
    pub async fn sweep_expired(&self) -> Result<SweepReport, BotError> {
        let now = self.now();
        let all = self.competitions.list().await?;
        let mut report = SweepReport::default();

        metrics::ACTIVE_COMPETITIONS.set(
            all.iter()
                .filter(|c| c.status == CompetitionStatus::Active)
                .count() as i64,
        );

        for c in all {
            if c.status.is_terminal() {
                continue;
            }
            let result = match c.status {
                CompetitionStatus::Active if c.has_ended(now) && c.participants.is_empty() => self
                    .cancel(&c.id, UserId::SYSTEM, Some(EXPIRED_EMPTY_REASON.into()))
                    .await
                    .map(|_| report.cancelled.push(c.id.clone())),
                CompetitionStatus::Active if c.has_ended(now) => self
                    .complete(&c.id, UserId::SYSTEM, false)
                    .await
                    .map(|_| report.completed.push(c.id.clone())),
                CompetitionStatus::Draft
                    if now - c.created_at >= Duration::minutes(STALE_DRAFT_MINUTES) =>
                {
                    self.cancel(&c.id, UserId::SYSTEM, Some(STALE_DRAFT_REASON.into()))
                        .await
                        .map(|_| report.cancelled.push(c.id.clone()))
                }
                _ => Ok(()),
            };
            match result {
                Ok(()) => {}
                // A command got there first.
                Err(BotError::InvalidState { .. }) => {}
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(competition_id = %c.id, error = %e, "expiry sweep failed");
                }
            }
        }

        if !report.completed.is_empty() || !report.cancelled.is_empty() {
            tracing::info!(
                completed = report.completed.len(),
                cancelled = report.cancelled.len(),
                failed = report.failed,
                "expiry sweep finished"
            );
        }
        Ok(report)
    }

    // ── Member bookkeeping (best effort) ─────────────────────────────

    async fn touch_user(&self, user_id: UserId, now: DateTime<Utc>) {
        let result = self
            .users
            .update(&user_id.to_string(), |u| {
                u.last_activity = now;
                Ok::<_, StorageError>(())
            })
            .await;
        if let Err(e) = result {
            tracing::warn!(user = %user_id, error = %e, "failed to record activity");
        }
    }

    async fn cache_snapshot(
        &self,
        user_id: UserId,
        snapshot: crate::stats::StatsSnapshot,
        now: DateTime<Utc>,
    ) {
        let result = self
            .users
            .update(&user_id.to_string(), move |u| {
                u.stats = Some(snapshot);
                u.last_activity = now;
                Ok::<_, StorageError>(())
            })
            .await;
        if let Err(e) = result {
            tracing::warn!(user = %user_id, error = %e, "failed to cache stats snapshot");
        }
    }
}

/// Run the expiry sweep every `interval` until the runtime shuts down.
pub fn spawn_expiry_worker(
    orchestrator: Arc<Orchestrator>,
    interval: std::time::Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(interval).await;
            if let Err(e) = orchestrator.sweep_expired().await {
                tracing::error!("Expiry worker: sweep failed: {e}");
            }
        }
    })
}
