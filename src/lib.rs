// Community competition bot: competitions, leaderboards and linked game accounts.

pub mod api;
pub mod auth;
pub mod clock;
pub mod commands;
pub mod competition;
pub mod config;
pub mod error;
pub mod leaderboard;
pub mod lifecycle;
pub mod metrics;
pub mod models;
pub mod rate_limit;
pub mod stats;
pub mod store;
pub mod users;

use std::sync::Arc;

use auth::AuthorizationProvider;
use clock::Clock;
use commands::CommandHandler;
use competition::{ManagerDeps, ManagerFactory};
use config::Config;
use leaderboard::LeaderboardAggregator;
use lifecycle::Orchestrator;
use models::{Competition, LeaderboardEntry, TriviaQuestion, User};
use rate_limit::RateLimiter;
use stats::StatsProvider;
use store::{StorageError, Store};
use users::AccountService;

/// Every long-lived component, wired against one data directory.
pub struct Services {
    pub config: Arc<Config>,
    pub competitions: Arc<Store<Competition>>,
    pub users: Arc<Store<User>>,
    pub leaderboards: Arc<Store<LeaderboardEntry>>,
    pub questions: Arc<Store<TriviaQuestion>>,
    pub factory: Arc<ManagerFactory>,
    pub aggregator: Arc<LeaderboardAggregator>,
    pub orchestrator: Arc<Orchestrator>,
    pub accounts: Arc<AccountService>,
    pub commands: Arc<CommandHandler>,
}

impl Services {
    pub async fn open(
        config: Arc<Config>,
        stats: Arc<dyn StatsProvider>,
        authz: Arc<dyn AuthorizationProvider>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, StorageError> {
        let dir = config.data_dir.as_path();
        let keep = config.max_backup_files;
        let competitions = Arc::new(Store::<Competition>::open(dir, keep).await?);
        let users = Arc::new(Store::<User>::open(dir, keep).await?);
        let leaderboards = Arc::new(Store::<LeaderboardEntry>::open(dir, keep).await?);
        let questions = Arc::new(Store::<TriviaQuestion>::open(dir, keep).await?);

        let factory = Arc::new(ManagerFactory::with_builtin(ManagerDeps {
            stats,
            questions: questions.clone(),
            stats_timeout: config.stats_timeout,
        }));
        let aggregator = Arc::new(LeaderboardAggregator::new(
            competitions.clone(),
            leaderboards.clone(),
            factory.clone(),
        ));
        let orchestrator = Arc::new(Orchestrator::new(
            config.clone(),
            competitions.clone(),
            users.clone(),
            factory.clone(),
            authz.clone(),
            aggregator.clone(),
            clock.clone(),
        ));
        let limiter = if config.local_mode {
            RateLimiter::disabled()
        } else {
            RateLimiter::new()
        };
        let accounts = Arc::new(AccountService::new(
            users.clone(),
            aggregator.clone(),
            authz,
            limiter.clone(),
            clock.clone(),
        ));
        let commands = Arc::new(CommandHandler::new(
            orchestrator.clone(),
            accounts.clone(),
            aggregator.clone(),
            limiter,
            clock,
        ));

        tracing::info!(data_dir = %config.data_dir.display(), "storage opened");
        Ok(Self {
            config,
            competitions,
            users,
            leaderboards,
            questions,
            factory,
            aggregator,
            orchestrator,
            accounts,
            commands,
        })
    }
}
