use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing_subscriber::EnvFilter;

use clanbot::auth::ConfigAuthorization;
use clanbot::clock::SystemClock;
use clanbot::config::Config;
use clanbot::stats::{HttpStatsProvider, RateLimitedStatsProvider, StatsProvider};
use clanbot::{api, lifecycle, metrics, Services};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = Arc::new(Config::load());
    metrics::register_metrics();

    let http = HttpStatsProvider::new(config.stats_api_url.clone(), config.stats_timeout)
        .expect("Failed to build stats client");
    let stats: Arc<dyn StatsProvider> = if config.local_mode {
        Arc::new(http)
    } else {
        Arc::new(RateLimitedStatsProvider::new(
            Arc::new(http),
            config.stats_rate_limit_per_minute,
        ))
    };
    let authz = Arc::new(ConfigAuthorization::new(
        config.admin_user_ids.iter().copied(),
        config.local_mode,
    ));

    let services = Services::open(config.clone(), stats, authz, Arc::new(SystemClock))
        .await
        .expect("Failed to open data directory");

    if config.local_mode {
        tracing::warn!("Local mode enabled: every member is an admin and rate limits are off");
    }

    // Complete or cancel competitions whose end time has passed.
    lifecycle::spawn_expiry_worker(
        services.orchestrator.clone(),
        config.expiry_sweep_interval,
    );

    let app = api::router(services.commands.clone()).layer(CorsLayer::permissive());

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| panic!("Failed to bind to {addr}: {e}"));

    tracing::info!("clanbot listening on port {}", config.port);
    axum::serve(listener, app)
        .await
        .expect("Failed to start server");
}
