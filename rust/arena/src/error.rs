use ai::AiError;
use engine::EngineError;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("illegal move: {0}")]
    IllegalMove(String),
    #[error("not your turn: {0}")]
    NotYourTurn(String),
    #[error("not a bot turn: {0}")]
    NotBotTurn(String),
    #[error("game is already over")]
    GameOver,
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("{0} not found")]
    NotFound(String),
    #[error("internal error: {0}")]
    Internal(String),
}

/// Structured error payload handed back to callers.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ErrorBody {
    pub error: &'static str,
    pub detail: String,
}

impl ServiceError {
    pub fn kind(&self) -> &'static str {
        match self {
            ServiceError::InvalidConfig(_) => "invalid_config",
            ServiceError::IllegalMove(_) => "illegal_move",
            ServiceError::NotYourTurn(_) => "not_your_turn",
            ServiceError::NotBotTurn(_) => "not_bot_turn",
            ServiceError::GameOver => "game_over",
            ServiceError::Conflict(_) => "conflict",
            ServiceError::NotFound(_) => "not_found",
            ServiceError::Internal(_) => "internal",
        }
    }

    pub fn body(&self) -> ErrorBody {
        ErrorBody {
            error: self.kind(),
            detail: self.to_string(),
        }
    }

    /// Caller mistakes, as opposed to defects on our side.
    pub fn is_user_error(&self) -> bool {
        !matches!(self, ServiceError::Internal(_))
    }
}

impl From<EngineError> for ServiceError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::InvalidCoord(_)
            | EngineError::OutOfBounds(..)
            | EngineError::IllegalMove(_) => ServiceError::IllegalMove(err.to_string()),
            EngineError::Finished => ServiceError::GameOver,
            EngineError::WrongTurn(_) => ServiceError::NotYourTurn(err.to_string()),
            EngineError::InvalidBoard(detail) => ServiceError::InvalidConfig(detail),
            EngineError::Corrupt(detail) => ServiceError::Internal(detail),
        }
    }
}

impl From<AiError> for ServiceError {
    fn from(err: AiError) -> Self {
        match err {
            AiError::InvalidConfig(detail) => ServiceError::InvalidConfig(detail),
            AiError::Engine(inner) => match inner {
                EngineError::Corrupt(detail) => ServiceError::Internal(detail),
                other => ServiceError::Internal(format!("strategy failed: {other}")),
            },
            other => ServiceError::Internal(other.to_string()),
        }
    }
}

impl From<tokio::task::JoinError> for ServiceError {
    fn from(err: tokio::task::JoinError) -> Self {
        ServiceError::Internal(format!("background task failed: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_errors_map_onto_the_taxonomy() {
        assert!(matches!(
            ServiceError::from(EngineError::IllegalMove((0, 0))),
            ServiceError::IllegalMove(_)
        ));
        assert!(matches!(
            ServiceError::from(EngineError::OutOfBounds(9, 0)),
            ServiceError::IllegalMove(_)
        ));
        assert!(matches!(
            ServiceError::from(EngineError::Finished),
            ServiceError::GameOver
        ));
        let internal = ServiceError::from(EngineError::Corrupt("overlap".into()));
        assert!(!internal.is_user_error());
    }

    #[test]
    fn body_carries_kind_and_detail() {
        let body = ServiceError::NotFound("game 42".into()).body();
        assert_eq!(body.error, "not_found");
        assert_eq!(body.detail, "game 42 not found");
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["error"], "not_found");
    }

    #[test]
    fn invalid_ai_config_stays_a_user_error() {
        let err = ServiceError::from(AiError::InvalidConfig("depth".into()));
        assert!(matches!(err, ServiceError::InvalidConfig(_)));
        assert!(err.is_user_error());
        assert!(!ServiceError::from(AiError::NoLegalMoves).is_user_error());
    }
}
