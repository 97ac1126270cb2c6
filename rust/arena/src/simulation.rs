//! Bot-vs-bot simulation batches with per-game and per-side performance aggregates.

use crate::config::derive_seed;
use crate::{now_ms, page, Arena, ServiceError};
use ai::{
    build_agent, save_qtable, AgentContext, AiConfig, AiMoveMeta, MoveSelector, PlayMode,
    SharedQTable,
};
use engine::{Color, EngineError, GameState, Winner};
use parking_lot::RwLock;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

pub(crate) type SharedRecord = Arc<RwLock<SimulationRecord>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SimulationStatus {
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationRequest {
    pub num_games: u32,
    #[serde(alias = "bot_black_config")]
    pub bot_black: AiConfig,
    #[serde(alias = "bot_white_config")]
    pub bot_white: AiConfig,
}

/// One finished game. Times are seconds per decision, memory is MB per decision.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GameSummary {
    pub index: u32,
    pub winner: Winner,
    pub score_black: u32,
    pub score_white: u32,
    pub moves: u32,
    pub passes: u32,
    pub avg_time_black: f64,
    pub avg_time_white: f64,
    pub avg_memory_black: f64,
    pub avg_memory_white: f64,
}

#[derive(Debug, Clone, Copy, Default)]
struct SideSamples {
    decisions: u64,
    time_us: u64,
    memory_bytes: u64,
}

impl SideSamples {
    fn add(&mut self, meta: &AiMoveMeta) {
        self.decisions += 1;
        self.time_us += meta.time_us;
        self.memory_bytes += meta.memory_bytes;
    }

    fn merge(&mut self, other: &SideSamples) {
        self.decisions += other.decisions;
        self.time_us += other.time_us;
        self.memory_bytes += other.memory_bytes;
    }

    fn avg_time_secs(&self) -> f64 {
        if self.decisions == 0 {
            return 0.0;
        }
        self.time_us as f64 / self.decisions as f64 / 1_000_000.0
    }

    fn avg_memory_mb(&self) -> f64 {
        if self.decisions == 0 {
            return 0.0;
        }
        self.memory_bytes as f64 / self.decisions as f64 / BYTES_PER_MB
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SimulationRecord {
    pub id: Uuid,
    pub created_at_ms: u64,
    pub num_games: u32,
    pub bot_black: AiConfig,
    pub bot_white: AiConfig,
    pub status: SimulationStatus,
    pub games_played: u32,
    pub black_wins: u32,
    pub white_wins: u32,
    pub draws: u32,
    /// Wall-clock seconds since the batch started.
    pub time_elapsed: f64,
    pub global_avg_time_black: f64,
    pub global_avg_time_white: f64,
    pub global_avg_memory_black: f64,
    pub global_avg_memory_white: f64,
    pub error: Option<String>,
    pub games: Vec<GameSummary>,
    #[serde(skip)]
    seq: u64,
    #[serde(skip)]
    totals: [SideSamples; 2],
}

impl SimulationRecord {
    fn new(num_games: u32, bot_black: AiConfig, bot_white: AiConfig, seq: u64) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at_ms: now_ms(),
            num_games,
            bot_black,
            bot_white,
            status: SimulationStatus::Running,
            games_played: 0,
            black_wins: 0,
            white_wins: 0,
            draws: 0,
            time_elapsed: 0.0,
            global_avg_time_black: 0.0,
            global_avg_time_white: 0.0,
            global_avg_memory_black: 0.0,
            global_avg_memory_white: 0.0,
            error: None,
            games: Vec::new(),
            seq,
            totals: [SideSamples::default(); 2],
        }
    }

    fn record_game(&mut self, summary: GameSummary, samples: &[SideSamples; 2], elapsed: f64) {
        match summary.winner {
            Winner::Black => self.black_wins += 1,
            Winner::White => self.white_wins += 1,
            Winner::Draw => self.draws += 1,
        }
        self.totals[0].merge(&samples[0]);
        self.totals[1].merge(&samples[1]);
        self.global_avg_time_black = self.totals[0].avg_time_secs();
        self.global_avg_time_white = self.totals[1].avg_time_secs();
        self.global_avg_memory_black = self.totals[0].avg_memory_mb();
        self.global_avg_memory_white = self.totals[1].avg_memory_mb();
        self.games.push(summary);
        self.games_played += 1;
        self.time_elapsed = elapsed;
    }

    fn complete(&mut self, elapsed: f64) {
        self.games.sort_by_key(|game| game.index);
        self.time_elapsed = elapsed;
        self.status = SimulationStatus::Completed;
    }

    fn fail(&mut self, reason: String) {
        self.games.sort_by_key(|game| game.index);
        self.status = SimulationStatus::Failed;
        self.error = Some(reason);
    }
}

#[derive(Clone)]
pub struct SimulationRunner {
    concurrency: usize,
    seed: Option<u64>,
    table: SharedQTable,
    qtable_path: Option<PathBuf>,
}

impl SimulationRunner {
    pub fn new(concurrency: usize, seed: Option<u64>, table: SharedQTable) -> Self {
        Self {
            concurrency: concurrency.max(1),
            seed,
            table,
            qtable_path: None,
        }
    }

    /// Where a shared Q-table is written after a learning batch.
    pub fn with_qtable_path(mut self, path: Option<PathBuf>) -> Self {
        self.qtable_path = path;
        self
    }

    /// Blocks until the whole batch is done and returns the final record.
    pub fn run(
        &self,
        num_games: u32,
        black: &AiConfig,
        white: &AiConfig,
    ) -> Result<SimulationRecord, ServiceError> {
        validate_pair(black, white)?;
        let record = Arc::new(RwLock::new(SimulationRecord::new(
            num_games,
            black.clone(),
            white.clone(),
            0,
        )));
        if let Err(err) = self.drive(&record) {
            record.write().fail(err.to_string());
            return Err(err);
        }
        let finished = record.read().clone();
        Ok(finished)
    }

    pub(crate) fn drive(&self, record: &SharedRecord) -> Result<(), ServiceError> {
        let (id, num_games, black, white) = {
            let r = record.read();
            (r.id, r.num_games, r.bot_black.clone(), r.bot_white.clone())
        };
        let sequential = black.shares_learning() || white.shares_learning();
        info!(
            simulation_id = %id,
            num_games,
            black = %black,
            white = %white,
            sequential,
            "simulation started"
        );
        let started = Instant::now();
        let play_and_record = |index: u32| -> Result<(), ServiceError> {
            let (summary, samples) = self.play_game(index, &black, &white)?;
            debug!(simulation_id = %id, index, winner = ?summary.winner, "simulation game done");
            record
                .write()
                .record_game(summary, &samples, started.elapsed().as_secs_f64());
            Ok(())
        };

        if sequential {
            (0..num_games).try_for_each(play_and_record)?;
            if let Some(path) = &self.qtable_path {
                let table = self.table.read();
                if let Err(err) = save_qtable(path, &table) {
                    warn!(simulation_id = %id, error = %err, "failed to persist q-table");
                }
            }
        } else {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(self.concurrency)
                .build()
                .map_err(|e| ServiceError::Internal(format!("simulation pool: {e}")))?;
            pool.install(|| (0..num_games).into_par_iter().try_for_each(play_and_record))?;
        }

        let elapsed = started.elapsed().as_secs_f64();
        let mut r = record.write();
        r.complete(elapsed);
        info!(
            simulation_id = %id,
            black_wins = r.black_wins,
            white_wins = r.white_wins,
            draws = r.draws,
            elapsed_ms = (elapsed * 1000.0) as u64,
            "simulation finished"
        );
        Ok(())
    }

    fn agent(
        &self,
        config: &AiConfig,
        index: u32,
        color: Color,
    ) -> Result<Box<dyn MoveSelector>, ServiceError> {
        let seat = match color {
            Color::Black => 0,
            Color::White => 1,
        };
        let ctx = AgentContext {
            seed: derive_seed(self.seed, index as u64, seat),
            table: Some(Arc::clone(&self.table)),
            mode: PlayMode::Simulation,
        };
        Ok(build_agent(config, &ctx)?)
    }

    fn play_game(
        &self,
        index: u32,
        black: &AiConfig,
        white: &AiConfig,
    ) -> Result<(GameSummary, [SideSamples; 2]), ServiceError> {
        let mut agents = [
            self.agent(black, index, Color::Black)?,
            self.agent(white, index, Color::White)?,
        ];
        let mut samples = [SideSamples::default(); 2];
        let mut state = GameState::new();

        while !state.is_finished() {
            let color = state.turn();
            let seat = usize::from(color == Color::White);
            let legal = state.legal_moves();
            let selection = agents[seat].select_move(state.board(), color, &legal)?;
            if !legal.contains(&selection.mv) {
                error!(game = index, %color, mv = ?selection.mv, "strategy returned an illegal move");
                return Err(ServiceError::Internal(format!(
                    "{} chose an illegal move in game {index}",
                    selection.meta.algorithm
                )));
            }
            state.play(color, selection.mv).map_err(|err| {
                if let EngineError::Corrupt(detail) = &err {
                    error!(game = index, %detail, "board invariant violated");
                }
                ServiceError::from(err)
            })?;
            samples[seat].add(&selection.meta);
        }

        let winner = state
            .winner()
            .ok_or_else(|| ServiceError::Internal(format!("game {index} ended without a result")))?;
        agents[0].observe_outcome(state.board(), Color::Black, winner);
        agents[1].observe_outcome(state.board(), Color::White, winner);

        let (score_black, score_white) = state.scores();
        let summary = GameSummary {
            index,
            winner,
            score_black,
            score_white,
            moves: state.history().len() as u32,
            passes: state.passes(),
            avg_time_black: samples[0].avg_time_secs(),
            avg_time_white: samples[1].avg_time_secs(),
            avg_memory_black: samples[0].avg_memory_mb(),
            avg_memory_white: samples[1].avg_memory_mb(),
        };
        Ok((summary, samples))
    }
}

fn validate_pair(black: &AiConfig, white: &AiConfig) -> Result<(), ServiceError> {
    black.validate()?;
    white.validate()?;
    Ok(())
}

impl Arena {
    /// Registers a running batch and plays it on a blocking worker; poll with `get_simulation`.
    pub async fn run_simulation(
        &self,
        request: SimulationRequest,
    ) -> Result<SimulationRecord, ServiceError> {
        let max = self.config.max_sim_games;
        if !(1..=max).contains(&request.num_games) {
            return Err(ServiceError::InvalidConfig(format!(
                "num_games must be within 1..={max}, got {}",
                request.num_games
            )));
        }
        validate_pair(&request.bot_black, &request.bot_white)?;

        let record = Arc::new(RwLock::new(SimulationRecord::new(
            request.num_games,
            request.bot_black,
            request.bot_white,
            self.next_sequence(),
        )));
        let snapshot = record.read().clone();
        self.simulations.insert(snapshot.id, Arc::clone(&record));

        let runner = self.runner();
        let worker_record = Arc::clone(&record);
        let worker = tokio::task::spawn_blocking(move || runner.drive(&worker_record));
        tokio::spawn(async move {
            let outcome = match worker.await {
                Ok(result) => result,
                Err(join) => Err(ServiceError::from(join)),
            };
            if let Err(err) = outcome {
                let mut r = record.write();
                error!(simulation_id = %r.id, error = %err, "simulation failed");
                r.fail(err.to_string());
            }
        });
        Ok(snapshot)
    }

    pub fn get_simulation(&self, simulation_id: Uuid) -> Result<SimulationRecord, ServiceError> {
        self.simulations
            .get(&simulation_id)
            .map(|record| {
                let snapshot = record.read().clone();
                snapshot
            })
            .ok_or_else(|| ServiceError::NotFound(format!("simulation {simulation_id}")))
    }

    pub fn list_simulations(&self, skip: usize, limit: usize) -> Vec<SimulationRecord> {
        let records: Vec<(u64, SimulationRecord)> = self
            .simulations
            .iter()
            .map(|entry| {
                let record = entry.value().read();
                (record.seq, record.clone())
            })
            .collect();
        page(records, skip, limit)
    }
}
