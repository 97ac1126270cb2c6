//! Game registry operations: creation, reads, human moves and bot moves.

use crate::config::derive_seed;
use crate::{now_ms, page, Arena, ServiceError};
use ai::{build_agent, AgentContext, AiConfig, MoveSelector, PlayMode};
use engine::{
    coord_from_pair, coord_to_notation, BoardMatrix, Color, Coord, EngineError, GameState,
    GameStatus, MoveRecord, Winner,
};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Who controls one color.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Seat {
    /// `None` is an open seat any caller may play.
    Human { player_id: Option<String> },
    Bot { config: AiConfig },
}

impl Seat {
    pub fn is_bot(&self) -> bool {
        matches!(self, Seat::Bot { .. })
    }

    fn resolve(
        color: Color,
        player_id: Option<String>,
        bot: Option<AiConfig>,
    ) -> Result<Self, ServiceError> {
        match (player_id, bot) {
            (Some(_), Some(_)) => Err(ServiceError::InvalidConfig(format!(
                "{color} side has both a player id and a bot config"
            ))),
            (None, Some(config)) => {
                config.validate().map_err(ServiceError::from)?;
                Ok(Seat::Bot { config })
            }
            (player_id, None) => Ok(Seat::Human { player_id }),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateGameRequest {
    #[serde(default)]
    pub player_black_id: Option<String>,
    #[serde(default)]
    pub player_white_id: Option<String>,
    #[serde(default)]
    pub bot_black_config: Option<AiConfig>,
    #[serde(default)]
    pub bot_white_config: Option<AiConfig>,
}

impl CreateGameRequest {
    fn seats(self) -> Result<(Seat, Seat), ServiceError> {
        let nobody = self.player_black_id.is_none()
            && self.player_white_id.is_none()
            && self.bot_black_config.is_none()
            && self.bot_white_config.is_none();
        if nobody {
            return Err(ServiceError::InvalidConfig(
                "at least one side needs a player id or a bot config".to_string(),
            ));
        }
        let black = Seat::resolve(Color::Black, self.player_black_id, self.bot_black_config)?;
        let white = Seat::resolve(Color::White, self.player_white_id, self.bot_white_config)?;
        Ok((black, white))
    }
}

/// Read-only snapshot of a game as handed to callers.
#[derive(Debug, Clone, Serialize)]
pub struct GameView {
    pub id: Uuid,
    pub created_at_ms: u64,
    pub board: BoardMatrix,
    pub current_turn: Color,
    pub status: GameStatus,
    pub winner: Option<Winner>,
    pub score_black: u32,
    pub score_white: u32,
    pub black: Seat,
    pub white: Seat,
    pub move_count: u32,
    pub passes: u32,
    pub version: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct BotMoveOutcome {
    pub game: GameView,
    pub move_made: Coord,
    pub message: String,
}

type AgentSlots = [Option<Box<dyn MoveSelector>>; 2];

pub(crate) struct GameEntry {
    id: Uuid,
    created_at_ms: u64,
    seq: u64,
    black: Seat,
    white: Seat,
    state: RwLock<GameState>,
    agents: Mutex<AgentSlots>,
    busy: AtomicBool,
}

/// Held by the single in-flight mutation of a game.
pub(crate) struct WriteTicket {
    entry: Arc<GameEntry>,
}

impl Drop for WriteTicket {
    fn drop(&mut self) {
        self.entry.busy.store(false, Ordering::Release);
    }
}

fn slot(color: Color) -> usize {
    match color {
        Color::Black => 0,
        Color::White => 1,
    }
}

impl GameEntry {
    fn seat(&self, color: Color) -> &Seat {
        match color {
            Color::Black => &self.black,
            Color::White => &self.white,
        }
    }

    pub(crate) fn try_write(self: &Arc<Self>) -> Result<WriteTicket, ServiceError> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| {
                warn!(game_id = %self.id, "concurrent mutation rejected");
                ServiceError::Conflict(format!("game {} is busy with another move", self.id))
            })?;
        Ok(WriteTicket {
            entry: Arc::clone(self),
        })
    }

    fn view(&self) -> GameView {
        let state = self.state.read();
        let (score_black, score_white) = state.scores();
        GameView {
            id: self.id,
            created_at_ms: self.created_at_ms,
            board: state.board().to_matrix(),
            current_turn: state.turn(),
            status: state.status(),
            winner: state.winner(),
            score_black,
            score_white,
            black: self.black.clone(),
            white: self.white.clone(),
            move_count: state.history().len() as u32,
            passes: state.passes(),
            version: state.version(),
        }
    }

    fn take_agent(
        &self,
        color: Color,
        config: &AiConfig,
        ctx: AgentContext,
    ) -> Result<Box<dyn MoveSelector>, ServiceError> {
        if let Some(agent) = self.agents.lock()[slot(color)].take() {
            return Ok(agent);
        }
        build_agent(config, &ctx).map_err(ServiceError::from)
    }

    fn put_agent(&self, color: Color, agent: Box<dyn MoveSelector>) {
        self.agents.lock()[slot(color)] = Some(agent);
    }

    /// Applies a move under the state lock and reports the finish if it ended the game.
    fn apply(&self, color: Color, coord: Coord) -> Result<MoveRecord, ServiceError> {
        let (record, finished) = {
            let mut state = self.state.write();
            let record = state.play(color, coord).map_err(|err| {
                if let EngineError::Corrupt(detail) = &err {
                    error!(game_id = %self.id, %detail, "board invariant violated, move aborted");
                }
                ServiceError::from(err)
            })?;
            let finished = state
                .winner()
                .filter(|_| state.is_finished())
                .map(|winner| (winner, *state.board(), state.scores()));
            (record, finished)
        };
        if let Some((winner, board, (black, white))) = finished {
            info!(game_id = %self.id, ?winner, black, white, "game finished");
            let mut agents = self.agents.lock();
            for color in [Color::Black, Color::White] {
                if let Some(agent) = agents[slot(color)].as_mut() {
                    agent.observe_outcome(&board, color, winner);
                }
            }
        }
        Ok(record)
    }
}

impl Arena {
    pub(crate) fn entry(&self, game_id: Uuid) -> Result<Arc<GameEntry>, ServiceError> {
        self.games
            .get(&game_id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| ServiceError::NotFound(format!("game {game_id}")))
    }

    pub fn create_game(&self, request: CreateGameRequest) -> Result<GameView, ServiceError> {
        let (black, white) = request.seats()?;
        let id = Uuid::new_v4();
        let entry = Arc::new(GameEntry {
            id,
            created_at_ms: now_ms(),
            seq: self.next_sequence(),
            black,
            white,
            state: RwLock::new(GameState::new()),
            agents: Mutex::new([None, None]),
            busy: AtomicBool::new(false),
        });
        info!(
            game_id = %id,
            black_bot = entry.black.is_bot(),
            white_bot = entry.white.is_bot(),
            "game created"
        );
        let view = entry.view();
        self.games.insert(id, entry);
        Ok(view)
    }

    pub fn get_game(&self, game_id: Uuid) -> Result<GameView, ServiceError> {
        Ok(self.entry(game_id)?.view())
    }

    /// Empty once the game is over.
    pub fn get_valid_moves(&self, game_id: Uuid) -> Result<Vec<Coord>, ServiceError> {
        Ok(self.entry(game_id)?.state.read().legal_moves())
    }

    pub fn get_history(&self, game_id: Uuid) -> Result<Vec<MoveRecord>, ServiceError> {
        Ok(self.entry(game_id)?.state.read().history().to_vec())
    }

    pub fn list_games(&self, skip: usize, limit: usize) -> Vec<GameView> {
        let entries: Vec<(u64, Arc<GameEntry>)> = self
            .games
            .iter()
            .map(|entry| (entry.seq, Arc::clone(entry.value())))
            .collect();
        page(entries, skip, limit)
            .into_iter()
            .map(|entry| entry.view())
            .collect()
    }

    pub fn human_move(&self, game_id: Uuid, coord: [i64; 2]) -> Result<GameView, ServiceError> {
        self.play_human(game_id, None, coord)
    }

    /// Like `human_move`, but `player_id` must control the side to move.
    pub fn human_move_as(
        &self,
        game_id: Uuid,
        player_id: &str,
        coord: [i64; 2],
    ) -> Result<GameView, ServiceError> {
        self.play_human(game_id, Some(player_id), coord)
    }

    fn play_human(
        &self,
        game_id: Uuid,
        player_id: Option<&str>,
        coord: [i64; 2],
    ) -> Result<GameView, ServiceError> {
        let entry = self.entry(game_id)?;
        let _ticket = entry.try_write()?;
        let color = {
            let state = entry.state.read();
            if state.is_finished() {
                return Err(ServiceError::GameOver);
            }
            state.turn()
        };
        match (entry.seat(color), player_id) {
            (Seat::Bot { .. }, _) => {
                return Err(ServiceError::NotYourTurn(format!(
                    "{color} is played by a bot"
                )));
            }
            (Seat::Human { player_id: Some(owner) }, Some(caller)) if owner != caller => {
                return Err(ServiceError::NotYourTurn(format!(
                    "{color} belongs to another player"
                )));
            }
            _ => {}
        }
        let coord = coord_from_pair(coord[0], coord[1])?;
        let record = entry.apply(color, coord)?;
        debug!(game_id = %game_id, %color, mv = %coord_to_notation(record.position), "human move");
        Ok(entry.view())
    }

    /// Lets the bot seated on the side to move pick and play one move.
    pub async fn bot_move(&self, game_id: Uuid) -> Result<BotMoveOutcome, ServiceError> {
        let entry = self.entry(game_id)?;
        let ticket = entry.try_write()?;
        let (board, color, legal) = {
            let state = entry.state.read();
            if state.is_finished() {
                return Err(ServiceError::GameOver);
            }
            (*state.board(), state.turn(), state.legal_moves())
        };
        let config = match entry.seat(color) {
            Seat::Bot { config } => config.clone(),
            Seat::Human { .. } => {
                return Err(ServiceError::NotBotTurn(format!(
                    "{color} is played by a human"
                )));
            }
        };
        let ctx = AgentContext {
            seed: derive_seed(self.config.seed, entry.seq, slot(color) as u64),
            table: Some(Arc::clone(&self.qtable)),
            mode: PlayMode::Interactive,
        };
        let agent = entry.take_agent(color, &config, ctx)?;

        // The worker owns the ticket and returns the agent to its seat itself, so a
        // dropped request leaves the game busy until the search ends.
        let worker_entry = Arc::clone(&entry);
        let (ticket, result) = tokio::task::spawn_blocking(move || {
            let mut agent = agent;
            let result = agent.select_move(&board, color, &legal);
            worker_entry.put_agent(color, agent);
            (ticket, result.map(|selection| (selection, legal)))
        })
        .await?;
        let _ticket = ticket;
        let (selection, legal) = result?;

        if !legal.contains(&selection.mv) {
            error!(
                game_id = %game_id,
                algorithm = %selection.meta.algorithm,
                mv = ?selection.mv,
                "strategy returned an illegal move"
            );
            return Err(ServiceError::Internal(format!(
                "{} chose illegal move {}",
                selection.meta.algorithm,
                coord_to_notation(selection.mv)
            )));
        }
        entry.apply(color, selection.mv)?;

        let message = format!(
            "{} chose {} in {:.3}s",
            selection.meta.algorithm,
            coord_to_notation(selection.mv),
            selection.meta.elapsed().as_secs_f64()
        );
        debug!(game_id = %game_id, %color, nodes = selection.meta.nodes, "{message}");
        Ok(BotMoveOutcome {
            game: entry.view(),
            move_made: selection.mv,
            message,
        })
    }
}
