// Registry from competition type tag to manager constructor.

use std::collections::HashMap;
use std::sync::Arc;

use super::boss::BossManager;
use super::race::RaceManager;
use super::skill::SkillManager;
use super::speedrun::SpeedrunManager;
use super::trivia::TriviaManager;
use super::{CompetitionManager, ManagerDeps};
use crate::error::BotError;

type Constructor = Arc<dyn Fn(&ManagerDeps) -> Arc<dyn CompetitionManager> + Send + Sync>;

/// Resolves type tags to managers. Adding a competition type means adding a
/// registration; the orchestrator never changes.
pub struct ManagerFactory {
    deps: ManagerDeps,
    constructors: HashMap<String, Constructor>,
}

impl ManagerFactory {
    pub fn new(deps: ManagerDeps) -> Self {
        Self {
            deps,
            constructors: HashMap::new(),
        }
    }

    /// A factory with every built-in competition type registered.
    pub fn with_builtin(deps: ManagerDeps) -> Self {
        let mut factory = Self::new(deps);
        factory.register("skill", |deps| Arc::new(SkillManager::new(deps)));
        factory.register("boss", |deps| Arc::new(BossManager::new(deps)));
        factory.register("trivia", |deps| Arc::new(TriviaManager::new(deps)));
        factory.register("race", |_| Arc::new(RaceManager));
        factory.register("speedrun", |_| Arc::new(SpeedrunManager));
        factory
    }

    /// Register (or replace) the constructor for `tag`.
    pub fn register<F>(&mut self, tag: &str, constructor: F)
    where
        F: Fn(&ManagerDeps) -> Arc<dyn CompetitionManager> + Send + Sync + 'static,
    {
        self.constructors
            .insert(normalize_tag(tag), Arc::new(constructor));
    }

    /// Instantiate the manager for `tag`. No side effects beyond construction.
    pub fn create(&self, tag: &str) -> Result<Arc<dyn CompetitionManager>, BotError> {
        let constructor =
            self.constructors
                .get(&normalize_tag(tag))
                .ok_or_else(|| BotError::UnknownType {
                    tag: tag.to_string(),
                    supported: self.supported_types().join(", "),
                })?;
        Ok(constructor(&self.deps))
    }

    pub fn supported_types(&self) -> Vec<String> {
        let mut tags: Vec<String> = self.constructors.keys().cloned().collect();
        tags.sort();
        tags
    }
}

/// "Skill", " skill " and "skill_competition" all resolve to "skill".
fn normalize_tag(tag: &str) -> String {
    let tag = tag.trim().to_ascii_lowercase();
    tag.strip_suffix("_competition")
        .map(str::to_string)
        .unwrap_or(tag)
}
