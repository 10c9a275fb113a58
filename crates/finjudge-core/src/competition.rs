//! One handle bundling every engine component over a shared store and config.

use std::sync::Arc;

use finjudge_state::CompetitionStore;

use crate::advancement::AdvancementCoordinator;
use crate::catalog::CriteriaCatalog;
use crate::config::JudgingConfig;
use crate::domain::Result;
use crate::progression::RoundProgression;
use crate::scoring::ScoringEngine;
use crate::tanks::TankAllocator;

pub struct Competition<S> {
    store: Arc<S>,
    config: Arc<JudgingConfig>,
    pub catalog: CriteriaCatalog<S>,
    pub scoring: ScoringEngine<S>,
    pub tanks: TankAllocator<S>,
    pub progression: RoundProgression<S>,
    pub advancement: AdvancementCoordinator<S>,
}

impl<S> Competition<S>
where
    S: CompetitionStore,
{
    /// Build every component. The config is validated first.
    pub fn new(store: Arc<S>, config: JudgingConfig) -> Result<Self> {
        config.validate()?;
        let config = Arc::new(config);
        Ok(Self {
            catalog: CriteriaCatalog::new(Arc::clone(&store), Arc::clone(&config)),
            scoring: ScoringEngine::new(Arc::clone(&store), Arc::clone(&config)),
            tanks: TankAllocator::new(Arc::clone(&store), Arc::clone(&config)),
            progression: RoundProgression::new(Arc::clone(&store), Arc::clone(&config)),
            advancement: AdvancementCoordinator::new(Arc::clone(&store), Arc::clone(&config)),
            store,
            config,
        })
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn config(&self) -> &JudgingConfig {
        &self.config
    }
}
