use std::sync::Arc;
use std::time::Instant;

use crate::config::Config;
use crate::store::{FlashcardRepository, SharedRepository};

#[derive(Clone)]
pub struct AppState {
    repo: SharedRepository,
    config: Arc<Config>,
    started_at: Instant,
}

impl AppState {
    pub fn new(repo: SharedRepository, config: &Config) -> Self {
        Self {
            repo,
            config: Arc::new(config.clone()),
            started_at: Instant::now(),
        }
    }

    pub fn repo(&self) -> &dyn FlashcardRepository {
        self.repo.as_ref()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

#[cfg(test)]
mod tests {
    use crate::store::{BackendKind, SqlStore, StoreOptions};

    use super::*;

    fn state() -> AppState {
        let repo: SharedRepository =
            Arc::new(SqlStore::open_in_memory(StoreOptions::default()).unwrap());
        AppState::new(repo, &Config::from_env())
    }

    #[test]
    fn clones_share_the_repository() {
        let state = state();
        let other = state.clone();
        let domain = state.repo().create_preset_domain("神经科学").unwrap();
        assert!(other.repo().list_preset_domains().unwrap().contains(&domain));
        assert_eq!(other.repo().backend(), BackendKind::Sql);
    }
}
