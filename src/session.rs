// Game sessions: an optional start/end handshake around a score submission.
//
// Sessions live in their own document, next to but separate from the score
// log. A session is created `active` and moves to `completed` exactly once.

use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::store::{
    CorruptPolicy, DocumentBackend, FileBackend, JsonDocument, MemoryBackend, ScoreRecord,
    ScoreStore, Standing, StoreError,
};

pub const DEFAULT_GAME_MODE: &str = "classic";
pub const SUPPORTED_GAME_MODES: [&str; 3] = ["classic", "challenge", "endless"];

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("no game session with id {0}")]
    NotFound(Uuid),

    #[error("game session {0} has already been completed")]
    AlreadyCompleted(Uuid),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

impl Difficulty {
    pub const ALL: [Difficulty; 3] = [Difficulty::Easy, Difficulty::Medium, Difficulty::Hard];
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SessionState {
    Active,
    Completed { end_time: String, result: ScoreRecord },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameSession {
    pub session_id: Uuid,
    pub player_id: Option<String>,
    pub difficulty: Difficulty,
    pub game_mode: String,
    pub start_time: String,
    #[serde(flatten)]
    pub state: SessionState,
}

impl GameSession {
    pub fn new(player_id: Option<String>, difficulty: Difficulty, game_mode: String) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            player_id,
            difficulty,
            game_mode,
            start_time: now(),
            state: SessionState::Active,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self.state, SessionState::Active)
    }

    /// The single legal transition: `active -> completed`.
    pub fn complete(&mut self, result: ScoreRecord) -> Result<(), SessionError> {
        if !self.is_active() {
            return Err(SessionError::AlreadyCompleted(self.session_id));
        }
        self.state = SessionState::Completed {
            end_time: now(),
            result,
        };
        Ok(())
    }
}

fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub struct SessionStore {
    document: Mutex<JsonDocument<GameSession>>,
}

impl SessionStore {
    pub fn new(backend: impl DocumentBackend + 'static, policy: CorruptPolicy) -> Self {
        Self {
            document: Mutex::new(JsonDocument::new(backend, policy)),
        }
    }

    pub fn open(path: impl Into<PathBuf>, policy: CorruptPolicy) -> Self {
        Self::new(FileBackend::new(path), policy)
    }

    pub fn in_memory() -> Self {
        Self::new(MemoryBackend::new(), CorruptPolicy::Lenient)
    }

    fn lock(&self) -> MutexGuard<'_, JsonDocument<GameSession>> {
        self.document.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn start(
        &self,
        player_id: Option<String>,
        difficulty: Difficulty,
        game_mode: String,
    ) -> Result<GameSession, SessionError> {
        let document = self.lock();
        let mut sessions = document.load()?;
        let session = GameSession::new(player_id, difficulty, game_mode);
        sessions.push(session.clone());
        document.save(&sessions)?;
        Ok(session)
    }

    pub fn get(&self, session_id: Uuid) -> Result<GameSession, SessionError> {
        self.lock()
            .load()?
            .into_iter()
            .find(|s| s.session_id == session_id)
            .ok_or(SessionError::NotFound(session_id))
    }

    /// Results of completed sessions in session start order, optionally
    /// narrowed to one game mode and/or difficulty.
    pub fn completed_results(
        &self,
        game_mode: Option<&str>,
        difficulty: Option<Difficulty>,
    ) -> Result<Vec<ScoreRecord>, SessionError> {
        let sessions = self.lock().load()?;
        Ok(sessions
            .into_iter()
            .filter(|s| game_mode.is_none_or(|m| s.game_mode == m))
            .filter(|s| difficulty.is_none_or(|d| s.difficulty == d))
            .filter_map(|s| match s.state {
                SessionState::Completed { result, .. } => Some(result),
                SessionState::Active => None,
            })
            .collect())
    }

    /// Finish an active session with `result`.
    ///
    /// The record is appended to `scores` before the session is marked
    /// completed, all while this store's lock is held, so a session can never
    /// contribute two records. If the score cannot be stored the session stays
    /// active. The returned standing is taken under the score store's lock
    /// together with the append.
    pub fn end(
        &self,
        session_id: Uuid,
        result: ScoreRecord,
        scores: &ScoreStore,
    ) -> Result<(GameSession, Standing), SessionError> {
        let document = self.lock();
        let mut sessions = document.load()?;
        let session = sessions
            .iter_mut()
            .find(|s| s.session_id == session_id)
            .ok_or(SessionError::NotFound(session_id))?;
        if !session.is_active() {
            return Err(SessionError::AlreadyCompleted(session_id));
        }

        let (stored, standing) = scores.append_ranked(result)?;
        session.complete(stored)?;
        let finished = session.clone();

        if let Err(e) = document.save(&sessions) {
            tracing::error!(
                %session_id,
                error = %e,
                "score stored but session could not be marked completed"
            );
            return Err(e.into());
        }
        Ok((finished, standing))
    }
}
