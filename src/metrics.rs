// Prometheus metrics definitions for the competition bot.

use lazy_static::lazy_static;
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use std::sync::Once;

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // ── Gauges ───────────────────────────────────────────────────────

    /// Competitions currently Active across all scopes, as seen by the last sweep.
    pub static ref ACTIVE_COMPETITIONS: IntGauge =
        IntGauge::new("clanbot_active_competitions", "Active competitions at last sweep").unwrap();

    // ── Counters ─────────────────────────────────────────────────────

    /// Competitions created, by type.
    pub static ref COMPETITIONS_CREATED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("clanbot_competitions_created_total", "Competitions created"),
        &["type"],
    )
    .unwrap();

    /// Competitions completed, by type.
    pub static ref COMPETITIONS_COMPLETED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("clanbot_competitions_completed_total", "Competitions completed"),
        &["type"],
    )
    .unwrap();

    pub static ref COMPETITIONS_CANCELLED_TOTAL: IntCounter = IntCounter::new(
        "clanbot_competitions_cancelled_total",
        "Competitions cancelled",
    )
    .unwrap();

    pub static ref PARTICIPANT_JOINS_TOTAL: IntCounter = IntCounter::new(
        "clanbot_participant_joins_total",
        "Successful competition joins",
    )
    .unwrap();

    /// Accepted progress reports, by type.
    pub static ref PROGRESS_UPDATES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("clanbot_progress_updates_total", "Accepted progress reports"),
        &["type"],
    )
    .unwrap();

    /// Failed collection writes, by collection.
    pub static ref STORAGE_FAILURES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("clanbot_storage_failures_total", "Failed collection writes"),
        &["collection"],
    )
    .unwrap();

    pub static ref LEADERBOARD_RECOMPUTES_TOTAL: IntCounter = IntCounter::new(
        "clanbot_leaderboard_recomputes_total",
        "Leaderboard category recomputations",
    )
    .unwrap();

    /// Stats provider calls, by outcome (ok, not_found, rate_limited, timeout, error).
    pub static ref STATS_LOOKUPS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("clanbot_stats_lookups_total", "Stats provider lookups"),
        &["outcome"],
    )
    .unwrap();
}

static REGISTER: Once = Once::new();

/// Register all metrics with the custom registry. Safe to call more than once.
pub fn register_metrics() {
    REGISTER.call_once(|| {
        let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
            Box::new(ACTIVE_COMPETITIONS.clone()),
            Box::new(COMPETITIONS_CREATED_TOTAL.clone()),
            Box::new(COMPETITIONS_COMPLETED_TOTAL.clone()),
            Box::new(COMPETITIONS_CANCELLED_TOTAL.clone()),
            Box::new(PARTICIPANT_JOINS_TOTAL.clone()),
            Box::new(PROGRESS_UPDATES_TOTAL.clone()),
            Box::new(STORAGE_FAILURES_TOTAL.clone()),
            Box::new(LEADERBOARD_RECOMPUTES_TOTAL.clone()),
            Box::new(STATS_LOOKUPS_TOTAL.clone()),
        ];

        for c in collectors {
            if let Err(e) = REGISTRY.register(c) {
                tracing::warn!("failed to register metric: {e}");
            }
        }
    });
}

/// Serialize all registered metrics to the Prometheus text exposition format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("failed to encode metrics: {e}");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
