//! The file backed user store.
//!
//! The whole store is one postcard record, rewritten atomically (write to a
//! temporary file, then rename) after every mutation that must survive a
//! crash. Load failures degrade to an empty store so a damaged file never
//! keeps the server from coming up.

use std::fs;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use protocol::{GameType, UserGame};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
    #[error("serialization error: {0}")]
    Codec(#[from] postcard::Error),
}

/// One persisted account.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct User {
    /// Stable UUID, assigned when the account is created.
    pub player_id: String,
    /// Display name, unique by convention.
    pub player_name: String,
    /// Self describing argon2 hash string, never the plaintext.
    pub password: String,
    /// Hex digests of the issued tokens. Raw tokens are never at rest.
    pub auth_tokens: Vec<String>,
    pub games: Vec<UserGame>,
    pub version: i32,
}

/// The complete store.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GameData {
    pub users: Vec<User>,
}

impl GameData {
    /// Loads the store. A missing or malformed file yields an empty store
    /// with a warning; the server keeps running either way.
    pub fn load(path: &Path) -> GameData {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(error) => {
                tracing::warn!(?error, ?path, "could not read game data, starting empty");
                return GameData::default();
            }
        };
        match postcard::from_bytes(&bytes) {
            Ok(data) => data,
            Err(error) => {
                tracing::warn!(?error, ?path, "malformed game data, starting empty");
                GameData::default()
            }
        }
    }

    /// Rewrites the whole store. Write to a sibling temp file first so a
    /// crash mid-write never clobbers the previous state.
    pub fn save(&self, path: &Path) -> Result<(), StoreError> {
        let bytes = postcard::to_stdvec(self)?;
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, &bytes)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }

    pub fn user_by_id(&self, player_id: &str) -> Option<&User> {
        self.users.iter().find(|user| user.player_id == player_id)
    }

    pub fn user_by_id_mut(&mut self, player_id: &str) -> Option<&mut User> {
        self.users.iter_mut().find(|user| user.player_id == player_id)
    }

    pub fn user_by_name(&self, player_name: &str) -> Option<&User> {
        self.users.iter().find(|user| user.player_name == player_name)
    }

    /// Registers a new account with a prepared password hash.
    pub fn add_user(&mut self, player_id: String, player_name: String, password_hash: String) {
        self.users.push(User {
            player_id,
            player_name,
            password: password_hash,
            version: 1,
            ..User::default()
        });
    }

    /// Stores one token digest for the player.
    pub fn add_auth_token(&mut self, player_id: &str, digest: String) {
        let Some(user) = self.user_by_id_mut(player_id) else {
            tracing::warn!(player_id, "add token: unknown player");
            return;
        };
        user.auth_tokens.push(digest);
        tracing::debug!(player_id, total_tokens = user.auth_tokens.len(), "token added");
    }

    /// Drops one token digest; unknown digests are a no-op.
    pub fn revoke_auth_token(&mut self, player_id: &str, digest: &str) {
        let Some(user) = self.user_by_id_mut(player_id) else {
            tracing::warn!(player_id, "revoke token: unknown player");
            return;
        };
        let before = user.auth_tokens.len();
        user.auth_tokens.retain(|stored| stored != digest);
        tracing::debug!(
            player_id,
            removed = before - user.auth_tokens.len(),
            left = user.auth_tokens.len(),
            "token revoked"
        );
    }

    /// Whether the digest belongs to one of the player's issued tokens.
    pub fn has_auth_token(&self, player_id: &str, digest: &str) -> bool {
        self.user_by_id(player_id)
            .map(|user| user.auth_tokens.iter().any(|stored| stored == digest))
            .unwrap_or(false)
    }

    /// Appends a game row, or merges into the existing row with the same id.
    /// Merging overwrites only the non-default fields of `game`, so the
    /// placeholder written at deal start survives until the deal completes.
    pub fn add_or_update_game(&mut self, player_id: &str, game: UserGame) {
        let Some(user) = self.user_by_id_mut(player_id) else {
            tracing::warn!(player_id, "game update: unknown player");
            return;
        };
        match user.games.iter_mut().find(|existing| existing.id == game.id) {
            Some(existing) => merge_game(existing, game),
            None => user.games.push(game),
        }
    }

    /// The highest game id anywhere in the store; new deals continue from it.
    pub fn last_game_id(&self) -> i32 {
        self.users
            .iter()
            .flat_map(|user| user.games.iter())
            .map(|game| game.id)
            .max()
            .unwrap_or(0)
    }

    /// The player's history, empty for unknown players.
    pub fn games_of(&self, player_id: &str) -> Vec<UserGame> {
        self.user_by_id(player_id).map(|user| user.games.clone()).unwrap_or_default()
    }
}

fn merge_game(existing: &mut UserGame, update: UserGame) {
    if update.duration != 0 {
        existing.duration = update.duration;
    }
    if update.pool != 0 {
        existing.pool = update.pool;
    }
    if update.dump != 0 {
        existing.dump = update.dump;
    }
    if update.whists != 0 {
        existing.whists = update.whists;
    }
    if update.mmr != 0 {
        existing.mmr = update.mmr;
    }
    if update.game_type != GameType::default() {
        existing.game_type = update.game_type;
    }
    if update.timestamp != 0 {
        existing.timestamp = update.timestamp;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with_user() -> GameData {
        let mut data = GameData::default();
        data.add_user("id-1".into(), "anna".into(), "$argon2id$stub".into());
        data
    }

    #[test]
    fn missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let data = GameData::load(&dir.path().join("absent.bin"));
        assert!(data.users.is_empty());
    }

    #[test]
    fn malformed_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.bin");
        fs::write(&path, [0xff, 0xff, 0xff, 0xff]).unwrap();
        assert!(GameData::load(&path).users.is_empty());
    }

    #[test]
    fn save_and_reload_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.bin");
        let mut data = store_with_user();
        data.add_auth_token("id-1", "digest".into());
        data.add_or_update_game(
            "id-1",
            UserGame {
                id: 3,
                pool: 4,
                game_type: GameType::Ranked,
                ..UserGame::default()
            },
        );
        data.save(&path).unwrap();
        assert_eq!(GameData::load(&path), data);
        // a second save goes through the same temp + rename path
        data.save(&path).unwrap();
        assert_eq!(GameData::load(&path), data);
    }

    #[test]
    fn lookups_by_id_and_name() {
        let data = store_with_user();
        assert_eq!(data.user_by_id("id-1").unwrap().player_name, "anna");
        assert_eq!(data.user_by_name("anna").unwrap().player_id, "id-1");
        assert!(data.user_by_id("id-2").is_none());
        assert!(data.user_by_name("boris").is_none());
    }

    #[test]
    fn token_lifecycle() {
        let mut data = store_with_user();
        data.add_auth_token("id-1", "aaa".into());
        data.add_auth_token("id-1", "bbb".into());
        assert!(data.has_auth_token("id-1", "aaa"));
        data.revoke_auth_token("id-1", "aaa");
        assert!(!data.has_auth_token("id-1", "aaa"));
        assert!(data.has_auth_token("id-1", "bbb"));
        // unknown player or digest is a no-op
        data.revoke_auth_token("id-9", "bbb");
        data.revoke_auth_token("id-1", "ccc");
        assert!(data.has_auth_token("id-1", "bbb"));
    }

    #[test]
    fn game_rows_merge_by_id() {
        let mut data = store_with_user();
        // placeholder at deal start
        data.add_or_update_game(
            "id-1",
            UserGame {
                id: 7,
                game_type: GameType::Ranked,
                timestamp: 1000,
                ..UserGame::default()
            },
        );
        // full row at deal end
        let update = UserGame {
            id: 7,
            duration: 60,
            pool: 2,
            dump: 0,
            whists: 4,
            mmr: -13,
            ..UserGame::default()
        };
        data.add_or_update_game("id-1", update.clone());
        let games = data.games_of("id-1");
        assert_eq!(games.len(), 1);
        let row = &games[0];
        assert_eq!(row.duration, 60);
        assert_eq!(row.whists, 4);
        assert_eq!(row.mmr, -13);
        // placeholder fields survive the merge
        assert_eq!(row.game_type, GameType::Ranked);
        assert_eq!(row.timestamp, 1000);

        // merge law: applying the same update twice equals applying it once
        let once = data.clone();
        data.add_or_update_game("id-1", update);
        assert_eq!(data, once);
    }

    #[test]
    fn last_game_id_spans_all_users() {
        let mut data = store_with_user();
        data.add_user("id-2".into(), "boris".into(), "hash".into());
        assert_eq!(data.last_game_id(), 0);
        data.add_or_update_game("id-1", UserGame { id: 4, ..UserGame::default() });
        data.add_or_update_game("id-2", UserGame { id: 9, ..UserGame::default() });
        assert_eq!(data.last_game_id(), 9);
    }
}
