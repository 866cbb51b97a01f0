// Integration tests for the competition lifecycle: transitions, limits,
// progress with external stats, expiry and persistence.

mod common;

use chrono::Duration;
use futures::future::join_all;
use serde_json::json;

use clanbot::error::BotError;
use clanbot::lifecycle::EXPIRED_EMPTY_REASON;
use clanbot::models::{
    Category, Competition, CompetitionStatus, NewCompetition, TriviaQuestion, UserId,
};
use clanbot::stats::InMemoryStatsProvider;
use clanbot::store::{Repository, Store};

use common::*;

// ── Transitions ──────────────────────────────────────────────────────

#[tokio::test]
async fn test_create_activates_immediately() {
    let h = harness().await;
    let orch = &h.services.orchestrator;

    let c = orch
        .create_competition(SCOPE, ADMIN, skill_request("Mining week"))
        .await
        .unwrap();
    assert_eq!(c.status, CompetitionStatus::Active);
    assert_eq!(c.kind, "skill");
    assert_eq!(c.created_by, ADMIN);
    assert_eq!(c.end_time - c.start_time, Duration::hours(24));
    assert_eq!(c.max_participants, h.config.default_max_participants);
    assert_eq!(orch.get_competition(&c.id).await.unwrap(), c);
}

#[tokio::test]
async fn test_create_rejects_bad_input_without_persisting() {
    let h = harness().await;
    let orch = &h.services.orchestrator;

    let mut request = skill_request("Mining week");
    request.parameters = json!({ "skill": "basket weaving" });
    assert!(matches!(
        orch.create_competition(SCOPE, ADMIN, request).await,
        Err(BotError::Validation(_))
    ));

    let request = skill_request("x");
    assert!(matches!(
        orch.create_competition(SCOPE, ADMIN, request).await,
        Err(BotError::Validation(_))
    ));

    let mut request = skill_request("Mining week");
    request.kind = "pvp".into();
    assert!(matches!(
        orch.create_competition(SCOPE, ADMIN, request).await,
        Err(BotError::UnknownType { .. })
    ));

    assert!(orch.list_competitions(SCOPE, None).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_terminal_states_reject_everything() {
    let h = harness().await;
    let orch = &h.services.orchestrator;

    let done = orch
        .create_competition(SCOPE, ADMIN, skill_request("Finished"))
        .await
        .unwrap();
    orch.join(&done.id, UserId(2)).await.unwrap();
    orch.record_progress(&done.id, UserId(2), json!({ "xp_delta": 10 }))
        .await
        .unwrap();
    orch.complete(&done.id, ADMIN, true).await.unwrap();

    let cancelled = orch
        .create_competition(SCOPE, ADMIN, skill_request("Called off"))
        .await
        .unwrap();
    let cancelled = orch
        .cancel(&cancelled.id, ADMIN, Some("  weather  ".into()))
        .await
        .unwrap();
    assert_eq!(cancelled.status, CompetitionStatus::Cancelled);
    assert_eq!(cancelled.cancellation_reason.as_deref(), Some("weather"));
    assert_eq!(cancelled.cancelled_at, Some(start_time()));

    for id in [&done.id, &cancelled.id] {
        let before = orch.get_competition(id).await.unwrap();
        assert!(matches!(
            orch.join(id, UserId(3)).await,
            Err(BotError::InvalidState { .. })
        ));
        assert!(matches!(
            orch.leave(id, UserId(2)).await,
            Err(BotError::InvalidState { .. })
        ));
        assert!(matches!(
            orch.record_progress(id, UserId(2), json!({ "xp_delta": 5 })).await,
            Err(BotError::InvalidState { .. }) | Err(BotError::Rejected(_))
        ));
        assert!(matches!(
            orch.complete(id, ADMIN, true).await,
            Err(BotError::InvalidState { .. })
        ));
        assert!(matches!(
            orch.cancel(id, ADMIN, None).await,
            Err(BotError::InvalidState { .. })
        ));
        assert_eq!(orch.get_competition(id).await.unwrap(), before);
    }
}

/// Persist a Draft directly, as a create interrupted before activation leaves it.
async fn stored_draft(h: &Harness, id: &str) -> Competition {
    let draft = Competition::draft(
        id.into(),
        SCOPE,
        ADMIN,
        skill_request("Left behind"),
        "skill",
        h.config.default_duration_hours,
        h.config.default_max_participants,
        start_time(),
    )
    .unwrap();
    assert_eq!(draft.status, CompetitionStatus::Draft);
    h.services.competitions.save(draft).await.unwrap()
}

#[tokio::test]
async fn test_draft_can_be_cancelled() {
    let h = harness().await;
    let orch = &h.services.orchestrator;
    let draft = stored_draft(&h, "draft-1").await;

    assert!(matches!(
        orch.join(&draft.id, UserId(2)).await,
        Err(BotError::InvalidState { .. })
    ));
    assert!(matches!(
        orch.complete(&draft.id, ADMIN, true).await,
        Err(BotError::InvalidState { .. })
    ));
    assert!(matches!(
        orch.cancel(&draft.id, UserId(2), None).await,
        Err(BotError::Unauthorized)
    ));

    let cancelled = orch
        .cancel(&draft.id, ADMIN, Some("wrong skill".into()))
        .await
        .unwrap();
    assert_eq!(cancelled.status, CompetitionStatus::Cancelled);
    assert_eq!(cancelled.cancellation_reason.as_deref(), Some("wrong skill"));
    assert!(cancelled.results.is_none());
    assert!(h.services.leaderboards.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_sweep_cancels_stale_drafts() {
    let h = harness().await;
    let orch = &h.services.orchestrator;
    let draft = stored_draft(&h, "draft-2").await;

    h.clock.advance(Duration::minutes(9));
    let report = orch.sweep_expired().await.unwrap();
    assert!(report.cancelled.is_empty());
    assert_eq!(
        orch.get_competition(&draft.id).await.unwrap().status,
        CompetitionStatus::Draft
    );

    h.clock.advance(Duration::minutes(2));
    let report = orch.sweep_expired().await.unwrap();
    assert_eq!(report.cancelled, vec![draft.id.clone()]);
    assert_eq!(report.failed, 0);
    let swept = orch.get_competition(&draft.id).await.unwrap();
    assert_eq!(swept.status, CompetitionStatus::Cancelled);
    assert!(swept.cancellation_reason.is_some());
}

#[tokio::test]
async fn test_storage_failure_leaves_state_unchanged() {
    let h = harness().await;
    let orch = &h.services.orchestrator;
    let c = orch
        .create_competition(SCOPE, ADMIN, skill_request("Mining week"))
        .await
        .unwrap();
    orch.join(&c.id, UserId(2)).await.unwrap();
    orch.record_progress(&c.id, UserId(2), json!({ "xp_delta": 100 }))
        .await
        .unwrap();
    let before = orch.get_competition(&c.id).await.unwrap();

    // Every write backs up first; a file where the backup directory should
    // be makes that fail, even for root.
    let backups = h.dir.path().join("backups");
    std::fs::remove_dir_all(&backups).unwrap();
    std::fs::write(&backups, b"not a directory").unwrap();

    let err = orch.join(&c.id, UserId(3)).await.unwrap_err();
    assert!(matches!(err, BotError::Storage(_)));
    assert_eq!(err.kind(), "storage_failure");
    assert!(err.is_retryable());

    let err = orch.complete(&c.id, ADMIN, true).await.unwrap_err();
    assert_eq!(err.kind(), "storage_failure");
    assert_eq!(orch.get_competition(&c.id).await.unwrap(), before);
    assert!(h.services.leaderboards.list().await.unwrap().is_empty());

    // Once the disk is healthy again the same command goes through.
    std::fs::remove_file(&backups).unwrap();
    std::fs::create_dir(&backups).unwrap();
    let done = orch.complete(&c.id, ADMIN, true).await.unwrap();
    assert_eq!(done.status, CompetitionStatus::Completed);
}

#[tokio::test]
async fn test_cancel_completed_leaves_leaderboards_alone() {
    let h = harness().await;
    let orch = &h.services.orchestrator;

    let c = orch
        .create_competition(SCOPE, ADMIN, skill_request("Mining week"))
        .await
        .unwrap();
    orch.join(&c.id, UserId(2)).await.unwrap();
    orch.record_progress(&c.id, UserId(2), json!({ "xp_delta": 100 }))
        .await
        .unwrap();
    orch.complete(&c.id, ADMIN, true).await.unwrap();

    let before = h.services.leaderboards.list().await.unwrap();
    assert!(!before.is_empty());

    match orch.cancel(&c.id, ADMIN, None).await {
        Err(BotError::InvalidState { status, .. }) => {
            assert_eq!(status, CompetitionStatus::Completed)
        }
        other => panic!("expected InvalidState, got {other:?}"),
    }
    assert_eq!(h.services.leaderboards.list().await.unwrap(), before);
}

#[tokio::test]
async fn test_leave_is_idempotent() {
    let h = harness().await;
    let orch = &h.services.orchestrator;
    let c = orch
        .create_competition(SCOPE, ADMIN, skill_request("Mining week"))
        .await
        .unwrap();
    orch.join(&c.id, UserId(2)).await.unwrap();

    let first = orch.leave(&c.id, UserId(9)).await.unwrap();
    let second = orch.leave(&c.id, UserId(9)).await.unwrap();
    assert_eq!(first.participants, second.participants);
    assert_eq!(first.participants.len(), 1);

    orch.leave(&c.id, UserId(2)).await.unwrap();
    let after = orch.leave(&c.id, UserId(2)).await.unwrap();
    assert!(after.participants.is_empty());
}

#[tokio::test]
async fn test_join_rules() {
    let h = harness().await;
    let orch = &h.services.orchestrator;
    let mut request = skill_request("Tiny");
    request.max_participants = Some(2);
    let c = orch.create_competition(SCOPE, ADMIN, request).await.unwrap();

    orch.join(&c.id, UserId(2)).await.unwrap();
    assert!(matches!(
        orch.join(&c.id, UserId(2)).await,
        Err(BotError::Rejected(_))
    ));
    orch.join(&c.id, UserId(3)).await.unwrap();
    assert!(matches!(
        orch.join(&c.id, UserId(4)).await,
        Err(BotError::Rejected(_))
    ));
    assert!(matches!(
        orch.join("missing", UserId(4)).await,
        Err(BotError::NotFound { .. })
    ));

    // Past the end time nobody can join.
    let open = orch
        .create_competition(SCOPE, ADMIN, skill_request("Open"))
        .await
        .unwrap();
    h.clock.advance(Duration::hours(25));
    assert!(matches!(
        orch.join(&open.id, UserId(5)).await,
        Err(BotError::InvalidState { .. })
    ));
}

#[tokio::test]
async fn test_authorization() {
    let h = harness().await;
    let orch = &h.services.orchestrator;
    assert!(matches!(
        orch.create_competition(SCOPE, UserId(5), skill_request("Member made"))
            .await,
        Err(BotError::Unauthorized)
    ));
    assert!(orch.list_competitions(SCOPE, None).await.unwrap().is_empty());

    let c = orch
        .create_competition(SCOPE, ADMIN, skill_request("Admin made"))
        .await
        .unwrap();
    orch.join(&c.id, UserId(2)).await.unwrap();

    assert!(matches!(
        orch.cancel(&c.id, UserId(5), None).await,
        Err(BotError::Unauthorized)
    ));
    assert!(matches!(
        orch.complete(&c.id, UserId(2), true).await,
        Err(BotError::Unauthorized)
    ));
    assert_eq!(
        orch.get_competition(&c.id).await.unwrap().status,
        CompetitionStatus::Active
    );
}

#[tokio::test]
async fn test_completion_preconditions() {
    let h = harness().await;
    let orch = &h.services.orchestrator;
    let c = orch
        .create_competition(SCOPE, ADMIN, skill_request("Mining week"))
        .await
        .unwrap();

    // No participants.
    assert!(matches!(
        orch.complete(&c.id, ADMIN, true).await,
        Err(BotError::InvalidState { .. })
    ));

    orch.join(&c.id, UserId(2)).await.unwrap();
    // Still running.
    assert!(matches!(
        orch.complete(&c.id, ADMIN, false).await,
        Err(BotError::InvalidState { .. })
    ));

    h.clock.advance(Duration::hours(24));
    let done = orch.complete(&c.id, ADMIN, false).await.unwrap();
    assert_eq!(done.status, CompetitionStatus::Completed);
    assert_eq!(done.completed_at, Some(start_time() + Duration::hours(24)));
    assert!(done.results.is_some());
}

// ── Scenarios ────────────────────────────────────────────────────────

#[tokio::test]
async fn test_xp_scenario_ranks_and_aggregates() {
    let h = harness().await;
    let orch = &h.services.orchestrator;
    let c = orch
        .create_competition(SCOPE, ADMIN, skill_request("Mining week"))
        .await
        .unwrap();

    orch.join(&c.id, UserId(2)).await.unwrap();
    orch.join(&c.id, UserId(3)).await.unwrap();
    orch.record_progress(&c.id, UserId(3), json!({ "xp_delta": 200 }))
        .await
        .unwrap();
    h.clock.advance(Duration::minutes(5));
    orch.record_progress(&c.id, UserId(2), json!({ "xp_delta": 500 }))
        .await
        .unwrap();

    let live = orch.standings(&c.id).await.unwrap();
    assert_eq!(live.winner(), Some(UserId(2)));

    h.clock.advance(Duration::hours(24));
    let done = orch.complete(&c.id, ADMIN, false).await.unwrap();
    let results = done.results.unwrap();
    let ranking: Vec<(UserId, u32, i64)> = results
        .standings
        .iter()
        .map(|s| (s.user_id, s.rank, s.score))
        .collect();
    assert_eq!(ranking, vec![(UserId(2), 1, 500), (UserId(3), 2, 200)]);

    let skill = h
        .services
        .aggregator
        .top(&Category::new(SCOPE, "skill"), 10)
        .await
        .unwrap();
    assert_eq!(skill[0].user_id, UserId(2));
    assert_eq!(skill[0].score, 500);
    assert_eq!(skill[0].rank, 1);
    assert_eq!(skill[0].wins, 1);
    assert!(skill[0].achievements.contains(&"champion".to_string()));

    let overall = h
        .services
        .aggregator
        .top(&Category::overall(SCOPE), 10)
        .await
        .unwrap();
    let winner = overall.iter().find(|e| e.user_id == UserId(2)).unwrap();
    assert_eq!(winner.score, 1);
    assert!(winner.achievements.contains(&"first_win".to_string()));
}

#[tokio::test]
async fn test_scope_limit() {
    let h = harness_with(|c| c.max_active_competitions = 1, InMemoryStatsProvider::new()).await;
    let orch = &h.services.orchestrator;

    let first = orch
        .create_competition(SCOPE, ADMIN, skill_request("First"))
        .await
        .unwrap();
    assert_eq!(first.status, CompetitionStatus::Active);
    assert!(matches!(
        orch.create_competition(SCOPE, ADMIN, skill_request("Second"))
            .await,
        Err(BotError::LimitExceeded { limit: 1 })
    ));

    // Other scopes have their own budget.
    orch.create_competition(OTHER_SCOPE, ADMIN, skill_request("Elsewhere"))
        .await
        .unwrap();

    // Cancelling frees the slot.
    orch.cancel(&first.id, ADMIN, None).await.unwrap();
    orch.create_competition(SCOPE, ADMIN, skill_request("Second"))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_concurrent_creates_respect_limit() {
    let h = harness_with(|c| c.max_active_competitions = 3, InMemoryStatsProvider::new()).await;
    let orch = h.services.orchestrator.clone();

    let attempts = (0..20).map(|i| {
        let orch = orch.clone();
        async move {
            orch.create_competition(SCOPE, ADMIN, skill_request(&format!("Race {i}")))
                .await
        }
    });
    let results = join_all(attempts).await;

    let created = results.iter().filter(|r| r.is_ok()).count();
    let limited = results
        .iter()
        .filter(|r| matches!(r, Err(BotError::LimitExceeded { limit: 3 })))
        .count();
    assert_eq!(created, 3);
    assert_eq!(limited, 17);

    let active = orch
        .list_competitions(SCOPE, Some(CompetitionStatus::Active))
        .await
        .unwrap();
    assert_eq!(active.len(), 3);
}

#[tokio::test]
async fn test_concurrent_joins_all_land() {
    let h = harness().await;
    let orch = h.services.orchestrator.clone();
    let c = orch
        .create_competition(SCOPE, ADMIN, skill_request("Crowded"))
        .await
        .unwrap();

    let joins = (2..=21).map(|user| {
        let orch = orch.clone();
        let id = c.id.clone();
        async move { orch.join(&id, UserId(user)).await }
    });
    assert!(join_all(joins).await.iter().all(|r| r.is_ok()));
    assert_eq!(
        orch.get_competition(&c.id).await.unwrap().participants.len(),
        20
    );
}

// ── External stats ───────────────────────────────────────────────────

#[tokio::test]
async fn test_verified_progress_uses_stats_baseline() {
    let h = harness().await;
    let orch = &h.services.orchestrator;
    h.stats.set_skill("Zezima", "mining", 10_000);
    h.services
        .accounts
        .link_account(UserId(2), "Zezima", None)
        .await
        .unwrap();

    let c = orch
        .create_competition(SCOPE, ADMIN, verified_skill_request("Verified mining"))
        .await
        .unwrap();
    // No linked account, no entry.
    assert!(matches!(
        orch.join(&c.id, UserId(3)).await,
        Err(BotError::Rejected(_))
    ));
    orch.join(&c.id, UserId(2)).await.unwrap();

    orch.record_progress(&c.id, UserId(2), json!({})).await.unwrap();
    h.stats.set_skill("Zezima", "mining", 10_750);
    orch.record_progress(&c.id, UserId(2), json!({})).await.unwrap();

    let live = orch.standings(&c.id).await.unwrap();
    assert_eq!(live.standings[0].score, 750);

    let user = h
        .services
        .accounts
        .get_user(UserId(2))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(user.stats.unwrap().skill_xp("mining"), Some(10_750));
}

#[tokio::test]
async fn test_stats_timeout_leaves_competition_untouched() {
    let h = harness_with(
        |c| c.stats_timeout = std::time::Duration::from_millis(50),
        InMemoryStatsProvider::with_delay(std::time::Duration::from_millis(500)),
    )
    .await;
    let orch = &h.services.orchestrator;
    h.stats.set_skill("Zezima", "mining", 10_000);
    h.services
        .accounts
        .link_account(UserId(2), "Zezima", None)
        .await
        .unwrap();
    let c = orch
        .create_competition(SCOPE, ADMIN, verified_skill_request("Slow stats"))
        .await
        .unwrap();
    let joined = orch.join(&c.id, UserId(2)).await.unwrap();

    assert!(matches!(
        orch.record_progress(&c.id, UserId(2), json!({})).await,
        Err(BotError::ExternalUnavailable(_))
    ));
    let after = orch.get_competition(&c.id).await.unwrap();
    assert_eq!(after, joined);
    assert_eq!(after.status, CompetitionStatus::Active);
}

#[tokio::test]
async fn test_trivia_answers_are_not_bound_by_stats_timeout() {
    let h = harness_with(
        |c| c.stats_timeout = std::time::Duration::ZERO,
        InMemoryStatsProvider::new(),
    )
    .await;
    let orch = &h.services.orchestrator;
    h.services
        .questions
        .save(TriviaQuestion {
            id: "q1".into(),
            question: "Which skill uses a pickaxe?".into(),
            answers: vec!["Mining".into()],
            category: None,
            difficulty: None,
        })
        .await
        .unwrap();
    let c = orch
        .create_competition(
            SCOPE,
            ADMIN,
            NewCompetition {
                kind: "trivia".into(),
                title: "Skill quiz".into(),
                description: String::new(),
                duration_hours: Some(24),
                max_participants: None,
                parameters: json!({ "question_ids": ["q1"] }),
            },
        )
        .await
        .unwrap();
    orch.join(&c.id, UserId(2)).await.unwrap();

    // The question lookup reads from disk; only stats calls are time-bounded.
    orch.record_progress(&c.id, UserId(2), json!({ "question_id": "q1", "answer": "mining" }))
        .await
        .unwrap();
    let standings = orch.standings(&c.id).await.unwrap();
    assert_eq!(standings.standings[0].score, 1);
    assert_eq!(standings.winner(), Some(UserId(2)));
}

#[tokio::test]
async fn test_progress_requires_participation() {
    let h = harness().await;
    let orch = &h.services.orchestrator;
    let c = orch
        .create_competition(SCOPE, ADMIN, skill_request("Mining week"))
        .await
        .unwrap();
    assert!(matches!(
        orch.record_progress(&c.id, UserId(2), json!({ "xp_delta": 1 })).await,
        Err(BotError::Rejected(_))
    ));
    orch.join(&c.id, UserId(2)).await.unwrap();
    assert!(matches!(
        orch.record_progress(&c.id, UserId(2), json!({ "xp_delta": 0 })).await,
        Err(BotError::Validation(_))
    ));
}

// ── Expiry ───────────────────────────────────────────────────────────

#[tokio::test]
async fn test_sweep_completes_and_cancels_expired() {
    let h = harness().await;
    let orch = &h.services.orchestrator;
    let busy = orch
        .create_competition(SCOPE, ADMIN, skill_request("Busy"))
        .await
        .unwrap();
    orch.join(&busy.id, UserId(2)).await.unwrap();
    orch.record_progress(&busy.id, UserId(2), json!({ "xp_delta": 42 }))
        .await
        .unwrap();
    let empty = orch
        .create_competition(SCOPE, ADMIN, skill_request("Empty"))
        .await
        .unwrap();
    let mut long = skill_request("Long");
    long.duration_hours = Some(72);
    let long = orch.create_competition(SCOPE, ADMIN, long).await.unwrap();

    let report = orch.sweep_expired().await.unwrap();
    assert!(report.completed.is_empty() && report.cancelled.is_empty());

    h.clock.advance(Duration::hours(25));
    let report = orch.sweep_expired().await.unwrap();
    assert_eq!(report.completed, vec![busy.id.clone()]);
    assert_eq!(report.cancelled, vec![empty.id.clone()]);
    assert_eq!(report.failed, 0);

    let empty = orch.get_competition(&empty.id).await.unwrap();
    assert_eq!(empty.status, CompetitionStatus::Cancelled);
    assert_eq!(empty.cancellation_reason.as_deref(), Some(EXPIRED_EMPTY_REASON));
    assert_eq!(
        orch.get_competition(&long.id).await.unwrap().status,
        CompetitionStatus::Active
    );
    assert_eq!(
        h.services
            .aggregator
            .entries_for_user(SCOPE, UserId(2))
            .await
            .unwrap()
            .len(),
        6
    );
}

// ── Persistence ──────────────────────────────────────────────────────

#[tokio::test]
async fn test_reload_preserves_competition() {
    let h = harness().await;
    let orch = &h.services.orchestrator;
    let c = orch
        .create_competition(SCOPE, ADMIN, skill_request("Mining week"))
        .await
        .unwrap();
    for user in [4, 2, 3] {
        orch.join(&c.id, UserId(user)).await.unwrap();
    }
    orch.record_progress(&c.id, UserId(2), json!({ "xp_delta": 300 }))
        .await
        .unwrap();
    let stored = orch.get_competition(&c.id).await.unwrap();

    let reopened: Store<Competition> = Store::open(h.dir.path(), 3).await.unwrap();
    let loaded = reopened.get(&c.id).await.unwrap().unwrap();
    assert_eq!(loaded, stored);
    let order: Vec<UserId> = loaded.participants.iter().map(|p| p.user_id).collect();
    assert_eq!(order, vec![UserId(4), UserId(2), UserId(3)]);
}

#[tokio::test]
async fn test_user_views() {
    let h = harness().await;
    let orch = &h.services.orchestrator;
    let a = orch
        .create_competition(SCOPE, ADMIN, skill_request("First"))
        .await
        .unwrap();
    h.clock.advance(Duration::minutes(1));
    let b = orch
        .create_competition(SCOPE, ADMIN, skill_request("Second"))
        .await
        .unwrap();
    orch.join(&a.id, UserId(2)).await.unwrap();
    orch.join(&b.id, UserId(2)).await.unwrap();
    orch.cancel(&a.id, ADMIN, None).await.unwrap();

    let mine: Vec<String> = orch
        .user_competitions(UserId(2), Some(SCOPE))
        .await
        .unwrap()
        .into_iter()
        .map(|c| c.id)
        .collect();
    assert_eq!(mine, vec![b.id.clone(), a.id.clone()]);

    let active = orch
        .list_competitions(SCOPE, Some(CompetitionStatus::Active))
        .await
        .unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].id, b.id);
}

#[tokio::test]
async fn test_race_completes_without_waiting() {
    let h = harness().await;
    let orch = &h.services.orchestrator;
    let c = orch
        .create_competition(
            SCOPE,
            ADMIN,
            clanbot::models::NewCompetition {
                kind: "race".into(),
                title: "Agility race".into(),
                description: String::new(),
                duration_hours: Some(4),
                max_participants: None,
                parameters: json!({ "checkpoints": 2 }),
            },
        )
        .await
        .unwrap();
    orch.join(&c.id, UserId(2)).await.unwrap();
    orch.join(&c.id, UserId(3)).await.unwrap();
    for checkpoint in [1, 2] {
        h.clock.advance(Duration::minutes(3));
        orch.record_progress(&c.id, UserId(2), json!({ "checkpoint": checkpoint }))
            .await
            .unwrap();
    }
    orch.record_progress(&c.id, UserId(3), json!({ "checkpoint": 1 }))
        .await
        .unwrap();

    let done = orch.complete(&c.id, ADMIN, false).await.unwrap();
    let results = done.results.unwrap();
    assert_eq!(results.winner(), Some(UserId(2)));
    assert_eq!(results.standings[0].score, 6 * 60 * 1000);
    assert!(!results.standings[1].finished);
}
