// Shared harness: real JSON stores in a temp dir, a manual clock and
// in-memory stats.
#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use clanbot::auth::ConfigAuthorization;
use clanbot::clock::ManualClock;
use clanbot::config::Config;
use clanbot::models::{NewCompetition, ScopeId, UserId};
use clanbot::stats::InMemoryStatsProvider;
use clanbot::Services;

pub const ADMIN: UserId = UserId(1);
pub const SCOPE: ScopeId = ScopeId(100);
pub const OTHER_SCOPE: ScopeId = ScopeId(200);

pub struct Harness {
    pub dir: TempDir,
    pub clock: Arc<ManualClock>,
    pub stats: Arc<InMemoryStatsProvider>,
    pub config: Arc<Config>,
    pub services: Services,
}

pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
}

pub async fn harness() -> Harness {
    harness_with(|_| {}, InMemoryStatsProvider::new()).await
}

pub async fn harness_with(
    configure: impl FnOnce(&mut Config),
    stats: InMemoryStatsProvider,
) -> Harness {
    let dir = TempDir::new().unwrap();
    let mut config = Config {
        data_dir: dir.path().to_path_buf(),
        admin_user_ids: vec![ADMIN],
        stats_timeout: Duration::from_millis(200),
        max_backup_files: 3,
        ..Config::default()
    };
    configure(&mut config);
    let config = Arc::new(config);

    let clock = Arc::new(ManualClock::new(start_time()));
    let stats = Arc::new(stats);
    let authz = Arc::new(ConfigAuthorization::new(
        config.admin_user_ids.iter().copied(),
        config.local_mode,
    ));
    let services = Services::open(config.clone(), stats.clone(), authz, clock.clone())
        .await
        .unwrap();

    Harness {
        dir,
        clock,
        stats,
        config,
        services,
    }
}

pub fn skill_request(title: &str) -> NewCompetition {
    NewCompetition {
        kind: "skill".into(),
        title: title.into(),
        description: String::new(),
        duration_hours: Some(24),
        max_participants: None,
        parameters: json!({ "skill": "mining" }),
    }
}

pub fn verified_skill_request(title: &str) -> NewCompetition {
    NewCompetition {
        parameters: json!({ "skill": "mining", "verified": true }),
        ..skill_request(title)
    }
}
