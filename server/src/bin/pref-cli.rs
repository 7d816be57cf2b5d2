//! Account tool for the server's game data file.
//!
//! The server itself never creates users; this is how they come to exist.
//! Everything here is a direct read or write of the persisted store.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use pref_server::auth;
use pref_server::store::GameData;
use protocol::GameType;

#[derive(Parser)]
#[command(name = "pref-cli", about = "Inspect and edit the server's game data")]
struct Args {
    /// Path of the game data file.
    path: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Register a new user with a fresh player id.
    AddUser { name: String, password: String },
    /// List all users.
    ShowUsers,
    /// Show one user's game history.
    ShowGames { player_id: String },
    /// Delete a user and everything attached to it.
    RemoveUser { player_id: String },
    /// Revoke all auth tokens of a user.
    RevokeTokens { player_id: String },
}

fn main() -> ExitCode {
    let args = Args::parse();
    let mut data = GameData::load(&args.path);
    let mutated = match args.command {
        Command::AddUser { name, password } => {
            if data.user_by_name(&name).is_some() {
                eprintln!("user {name} already exists");
                return ExitCode::FAILURE;
            }
            let password_hash = match auth::hash_password(&password) {
                Ok(password_hash) => password_hash,
                Err(error) => {
                    eprintln!("could not hash the password: {error}");
                    return ExitCode::FAILURE;
                }
            };
            let player_id = auth::new_player_id();
            data.add_user(player_id.clone(), name, password_hash);
            println!("{player_id}");
            true
        }
        Command::ShowUsers => {
            for user in &data.users {
                println!(
                    "{} | {} | {} tokens | {} games",
                    user.player_id,
                    user.player_name,
                    user.auth_tokens.len(),
                    user.games.len()
                );
            }
            false
        }
        Command::ShowGames { player_id } => {
            let Some(user) = data.user_by_id(&player_id) else {
                eprintln!("{player_id} not found");
                return ExitCode::FAILURE;
            };
            for game in &user.games {
                println!(
                    "| #{:<3} | {} | {:>5}s | {:<6} | {:>+4} | {}/{}/{}",
                    game.id,
                    game.timestamp,
                    game.duration,
                    if game.game_type == GameType::Ranked { "Ranked" } else { "Normal" },
                    game.mmr,
                    game.pool,
                    game.dump,
                    game.whists
                );
            }
            false
        }
        Command::RemoveUser { player_id } => {
            let before = data.users.len();
            data.users.retain(|user| user.player_id != player_id);
            if data.users.len() == before {
                eprintln!("{player_id} not found");
                return ExitCode::FAILURE;
            }
            true
        }
        Command::RevokeTokens { player_id } => {
            let Some(user) = data.user_by_id_mut(&player_id) else {
                eprintln!("{player_id} not found");
                return ExitCode::FAILURE;
            };
            println!("removed {} tokens", user.auth_tokens.len());
            user.auth_tokens.clear();
            true
        }
    };
    if mutated {
        if let Err(error) = data.save(&args.path) {
            eprintln!("could not save {}: {error}", args.path.display());
            return ExitCode::FAILURE;
        }
    }
    ExitCode::SUCCESS
}
