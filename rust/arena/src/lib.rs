//! Othello arena: game registry, the human/bot move API and bot-vs-bot simulation batches.

pub mod config;
pub mod error;
pub mod games;
pub mod simulation;

pub use config::ArenaConfig;
pub use error::{ErrorBody, ServiceError};
pub use games::{BotMoveOutcome, CreateGameRequest, GameView, Seat};
pub use simulation::{
    GameSummary, SimulationRecord, SimulationRequest, SimulationRunner, SimulationStatus,
};

use ai::{load_qtable, shared_table, QTable, SharedQTable};
use dashmap::DashMap;
use games::GameEntry;
use simulation::SharedRecord;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{info, warn};
use uuid::Uuid;

/// Cheap to clone; all clones share the same registries.
#[derive(Clone)]
pub struct Arena {
    config: Arc<ArenaConfig>,
    games: Arc<DashMap<Uuid, Arc<GameEntry>>>,
    simulations: Arc<DashMap<Uuid, SharedRecord>>,
    qtable: SharedQTable,
    sequence: Arc<AtomicU64>,
}

impl Arena {
    pub fn new(config: ArenaConfig) -> Self {
        let table = match &config.qtable_path {
            Some(path) if path.exists() => match load_qtable(path) {
                Ok(table) => {
                    info!(path = %path.display(), entries = table.len(), "q-table loaded");
                    table
                }
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "q-table unreadable, starting empty");
                    QTable::new()
                }
            },
            _ => QTable::new(),
        };
        Self {
            config: Arc::new(config),
            games: Arc::new(DashMap::new()),
            simulations: Arc::new(DashMap::new()),
            qtable: shared_table(table),
            sequence: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn from_env() -> Self {
        Self::new(ArenaConfig::from_env())
    }

    pub fn config(&self) -> &ArenaConfig {
        &self.config
    }

    pub fn qtable(&self) -> &SharedQTable {
        &self.qtable
    }

    pub fn runner(&self) -> SimulationRunner {
        SimulationRunner::new(
            self.config.sim_concurrency,
            self.config.seed,
            Arc::clone(&self.qtable),
        )
        .with_qtable_path(self.config.qtable_path.clone())
    }

    fn next_sequence(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for Arena {
    fn default() -> Self {
        Self::new(ArenaConfig::default())
    }
}

pub(crate) fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Newest-first page over `(sequence, item)` pairs.
pub(crate) fn page<T>(mut items: Vec<(u64, T)>, skip: usize, limit: usize) -> Vec<T> {
    items.sort_by(|a, b| b.0.cmp(&a.0));
    items
        .into_iter()
        .skip(skip)
        .take(limit)
        .map(|(_, item)| item)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_is_newest_first() {
        let items = vec![(1, "a"), (3, "c"), (2, "b")];
        assert_eq!(page(items.clone(), 0, 10), vec!["c", "b", "a"]);
        assert_eq!(page(items.clone(), 1, 1), vec!["b"]);
        assert!(page(items, 5, 10).is_empty());
    }

    #[test]
    fn unreadable_qtable_falls_back_to_empty() {
        let path = std::env::temp_dir().join(format!("othello_bad_qtable_{}.bin", Uuid::new_v4()));
        std::fs::write(&path, b"not a table").unwrap();
        let arena = Arena::new(ArenaConfig {
            qtable_path: Some(path.clone()),
            ..ArenaConfig::default()
        });
        let _ = std::fs::remove_file(&path);
        assert!(arena.qtable().read().is_empty());
    }
}
