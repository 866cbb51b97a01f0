// Integration tests for account linking, deactivation and profiles.

mod common;

use serde_json::json;

use clanbot::error::BotError;
use clanbot::models::UserId;
use clanbot::stats::InMemoryStatsProvider;

use common::*;

#[tokio::test]
async fn test_account_names_are_unique() {
    let h = harness().await;
    let accounts = &h.services.accounts;

    let user = accounts
        .link_account(UserId(2), " Zezima ", Some("Zez".into()))
        .await
        .unwrap();
    assert_eq!(user.game_account.as_deref(), Some("Zezima"));
    assert_eq!(user.display_name.as_deref(), Some("Zez"));
    assert!(user.active);

    assert!(matches!(
        accounts.link_account(UserId(3), "ZEZIMA", None).await,
        Err(BotError::Conflict(_))
    ));
    assert!(matches!(
        accounts.link_account(UserId(3), "bad!name", None).await,
        Err(BotError::Validation(_))
    ));

    // Re-linking your own account is fine.
    accounts
        .link_account(UserId(2), "zezima", None)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_unlink() {
    let h = harness().await;
    let accounts = &h.services.accounts;
    accounts
        .link_account(UserId(2), "Zezima", None)
        .await
        .unwrap();

    let user = accounts.unlink_account(UserId(2)).await.unwrap();
    assert_eq!(user.game_account, None);
    assert!(matches!(
        accounts.unlink_account(UserId(2)).await,
        Err(BotError::Rejected(_))
    ));
    assert!(matches!(
        accounts.unlink_account(UserId(9)).await,
        Err(BotError::NotFound { .. })
    ));

    // The name is free again.
    accounts
        .link_account(UserId(3), "Zezima", None)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_link_rate_limit() {
    let h = harness().await;
    let accounts = &h.services.accounts;
    for name in ["one", "two", "three"] {
        accounts.link_account(UserId(2), name, None).await.unwrap();
    }
    assert!(matches!(
        accounts.link_account(UserId(2), "four", None).await,
        Err(BotError::RateLimited(_))
    ));
    // Other members are unaffected, and failed links do not count.
    for _ in 0..3 {
        assert!(matches!(
            accounts.link_account(UserId(3), "three", None).await,
            Err(BotError::Conflict(_))
        ));
    }
    accounts.link_account(UserId(3), "four", None).await.unwrap();
}

#[tokio::test]
async fn test_local_mode_disables_rate_limits() {
    let h = harness_with(|c| c.local_mode = true, InMemoryStatsProvider::new()).await;
    for name in ["one", "two", "three", "four", "five"] {
        h.services
            .accounts
            .link_account(UserId(2), name, None)
            .await
            .unwrap();
    }
}

#[tokio::test]
async fn test_deactivate() {
    let h = harness().await;
    let accounts = &h.services.accounts;
    let orch = &h.services.orchestrator;
    accounts
        .link_account(UserId(2), "Zezima", None)
        .await
        .unwrap();

    assert!(matches!(
        accounts.deactivate(UserId(3), UserId(2), SCOPE).await,
        Err(BotError::Unauthorized)
    ));
    let user = accounts.deactivate(ADMIN, UserId(2), SCOPE).await.unwrap();
    assert!(!user.active);
    assert_eq!(user.game_account, None);

    // Deactivated members cannot join or re-link, and their name is released.
    let c = orch
        .create_competition(SCOPE, ADMIN, skill_request("Mining week"))
        .await
        .unwrap();
    assert!(matches!(
        orch.join(&c.id, UserId(2)).await,
        Err(BotError::Rejected(_))
    ));
    assert!(matches!(
        accounts.link_account(UserId(2), "Zezima", None).await,
        Err(BotError::Rejected(_))
    ));
    accounts
        .link_account(UserId(3), "Zezima", None)
        .await
        .unwrap();

    assert!(matches!(
        accounts.deactivate(ADMIN, UserId(99), SCOPE).await,
        Err(BotError::NotFound { .. })
    ));
}

#[tokio::test]
async fn test_profile_includes_leaderboard_entries() {
    let h = harness().await;
    let orch = &h.services.orchestrator;
    h.services
        .accounts
        .link_account(UserId(2), "Zezima", None)
        .await
        .unwrap();

    let c = orch
        .create_competition(SCOPE, ADMIN, skill_request("Mining week"))
        .await
        .unwrap();
    orch.join(&c.id, UserId(2)).await.unwrap();
    orch.record_progress(&c.id, UserId(2), json!({ "xp_delta": 1234 }))
        .await
        .unwrap();
    orch.complete(&c.id, ADMIN, true).await.unwrap();

    let profile = h.services.accounts.profile(SCOPE, UserId(2)).await.unwrap();
    assert_eq!(profile.user.game_account.as_deref(), Some("Zezima"));
    let categories: Vec<&str> = profile
        .entries
        .iter()
        .map(|e| e.category.as_str())
        .collect();
    assert_eq!(
        categories,
        vec![
            "monthly_participation_2026-03",
            "monthly_wins_2026-03",
            "overall",
            "participation",
            "skill",
            "win_rate",
        ]
    );

    let elsewhere = h
        .services
        .accounts
        .profile(OTHER_SCOPE, UserId(2))
        .await
        .unwrap();
    assert!(elsewhere.entries.is_empty());
}
