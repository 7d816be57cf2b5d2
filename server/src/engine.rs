//! The single writer of all game state.
//!
//! Sessions hand decoded envelopes to this task over a mailbox. Every
//! transition happens synchronously between two mailbox receives: a handler
//! reads one message, computes the new state, enqueues all outbound frames
//! onto the bounded session queues and only then suspends. No lock guards
//! the table because nothing else ever touches it.
//!
//! A `PlayerTurn` is always the last frame a transition enqueues, so a
//! client that sees its turn has already seen every dependent announcement.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use tokio::sync::mpsc;

use protocol::cards;
use protocol::{
    AudioSignal, AuthRequest, AuthResponse, Bidding, DealCards, DealFinished, DiscardTalon,
    Forehand, GameStage, GameState, GameType, HowToPlay, Log, LoginRequest, LoginResponse, Logout,
    MakeOffer, Message, Method, MiserCards, OpenTalon, OpenWhistPlay, PingPong, PlayCard,
    PlayerCardsLeft, PlayerIdent, PlayerJoined, PlayerLeft, PlayerTricks, PlayerTurn, ReadyCheck,
    ReadyCheckState, SpeechBubble, TrickFinished, UserGame, UserGames, Whisting,
};

use crate::auth;
use crate::deck;
use crate::scoring::{self, ContractLevel, Declarer, WhistChoice, Whister};
use crate::senders::{send_to, send_to_all, send_to_all_except};
use crate::state::{PlayedCard, Player, PlayerId, SEATS, Table, WhistingState};
use crate::store::GameData;
use crate::transport;

/// How long a seat survives a lost transport.
const RECONNECT_GRACE: Duration = Duration::from_secs(10);
/// Pause between a finished deal and the next one.
const DEAL_PAUSE: Duration = Duration::from_secs(3);

pub type ConnId = u64;

/// Everything the engine reacts to.
pub enum Event {
    /// A socket finished its upgrade and can receive payloads.
    Opened { conn: ConnId, tx: mpsc::Sender<Bytes> },
    /// One decoded envelope from a session.
    Inbound { conn: ConnId, message: Message },
    /// The session's transport is gone.
    Closed { conn: ConnId },
    /// A reconnect grace window ran out.
    GraceExpired { player_id: PlayerId, session_id: u64 },
    /// The pause after a finished deal is over.
    NextDeal,
    /// Orderly termination: flush the store and stop.
    Shutdown,
}

/// Login state of one connection.
struct SessionInfo {
    tx: mpsc::Sender<Bytes>,
    /// Empty until a login or auth succeeded.
    player_id: PlayerId,
    /// Copy of the seat's epoch this session was admitted under.
    session_id: u64,
}

pub struct Engine {
    table: Table,
    sessions: HashMap<ConnId, SessionInfo>,
    store: GameData,
    store_path: Option<PathBuf>,
    /// Handle back into the own mailbox, for timers.
    events: mpsc::Sender<Event>,
    /// Caller provided end-of-match signal, checked after every deal.
    game_over: Arc<AtomicBool>,
}

fn epoch_seconds() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs() as i64)
        .unwrap_or(0)
}

fn decode<M: Method>(message: &Message) -> Option<M> {
    match protocol::decode_payload::<M>(message) {
        Ok(payload) => Some(payload),
        Err(error) => {
            tracing::warn!(?error, method = M::NAME, "undecodable payload, dropping frame");
            None
        }
    }
}

/// Collapses the whisting synonyms onto the value that drives the state.
fn normalize_choice(choice: &str) -> &str {
    match choice {
        cards::CATCH => cards::WHIST,
        cards::TRUST => cards::PASS,
        other => other,
    }
}

fn whist_choice(state: WhistingState) -> WhistChoice {
    match state {
        WhistingState::Whist | WhistingState::PassWhist => WhistChoice::Whist,
        WhistingState::HalfWhist => WhistChoice::HalfWhist,
        _ => WhistChoice::Pass,
    }
}

impl Engine {
    pub fn new(
        store: GameData,
        store_path: Option<PathBuf>,
        events: mpsc::Sender<Event>,
        game_over: Arc<AtomicBool>,
    ) -> Engine {
        let mut table = Table::default();
        table.game_id = store.last_game_id();
        Engine {
            table,
            sessions: HashMap::new(),
            store,
            store_path,
            events,
            game_over,
        }
    }

    /// The event loop. Returns once a [`Event::Shutdown`] arrives; the store
    /// is flushed and the seat table cleared on the way out.
    pub async fn run(mut self, mut inbox: mpsc::Receiver<Event>) {
        while let Some(event) = inbox.recv().await {
            match event {
                Event::Opened { conn, tx } => {
                    self.sessions.insert(
                        conn,
                        SessionInfo {
                            tx,
                            player_id: PlayerId::new(),
                            session_id: 0,
                        },
                    );
                }
                Event::Inbound { conn, message } => self.dispatch(conn, message).await,
                Event::Closed { conn } => self.session_closed(conn),
                Event::GraceExpired { player_id, session_id } => {
                    self.grace_expired(&player_id, session_id).await;
                }
                Event::NextDeal => self.next_deal().await,
                Event::Shutdown => break,
            }
        }
        tracing::info!("engine stopping");
        self.persist();
        self.table.players.clear();
    }

    async fn dispatch(&mut self, conn: ConnId, message: Message) {
        let method = message.method.as_str();
        if method == LoginRequest::NAME {
            return self.handle_login(conn, &message).await;
        }
        if method == AuthRequest::NAME {
            return self.handle_auth(conn, &message).await;
        }
        let admitted = self
            .sessions
            .get(&conn)
            .map(|session| !session.player_id.is_empty())
            .unwrap_or(false);
        if !admitted {
            tracing::warn!(method, conn, "message before login, dropping frame");
            return;
        }
        if method == Logout::NAME {
            return self.handle_logout(conn, &message).await;
        }
        if method == ReadyCheck::NAME {
            return self.handle_ready_check(conn, &message).await;
        }
        if method == Bidding::NAME {
            return self.handle_bidding(conn, &message).await;
        }
        if method == DiscardTalon::NAME {
            return self.handle_discard_talon(conn, &message).await;
        }
        if method == Whisting::NAME {
            return self.handle_whisting(conn, &message).await;
        }
        if method == HowToPlay::NAME {
            return self.handle_how_to_play(conn, &message).await;
        }
        if method == PlayCard::NAME {
            return self.handle_play_card(conn, &message).await;
        }
        if method == MakeOffer::NAME {
            return self.handle_make_offer(conn, &message).await;
        }
        if method == SpeechBubble::NAME {
            return self.handle_speech_bubble(conn, &message).await;
        }
        if method == AudioSignal::NAME {
            return self.handle_audio_signal(conn, &message).await;
        }
        if method == PingPong::NAME {
            return self.handle_ping_pong(conn, &message).await;
        }
        if method == Log::NAME {
            return self.handle_log(conn, &message);
        }
        tracing::warn!(method, "unknown method");
    }

    // ------------------------------------------------------------------
    // seating, login, reconnection

    fn players_idents(&self) -> Vec<PlayerIdent> {
        self.table
            .players
            .iter()
            .map(|player| PlayerIdent {
                player_id: player.id.clone(),
                player_name: player.name.clone(),
            })
            .collect()
    }

    fn session_tx(&self, conn: ConnId) -> Option<mpsc::Sender<Bytes>> {
        self.sessions.get(&conn).map(|session| session.tx.clone())
    }

    /// Every player-action message must name the player the session logged
    /// in as; anything else is a rule violation and dropped.
    fn guard_own(&self, conn: ConnId, player_id: &str) -> bool {
        let owned = self
            .sessions
            .get(&conn)
            .map(|session| session.player_id == player_id)
            .unwrap_or(false);
        if !owned {
            tracing::warn!(conn, claimed = player_id, "player id does not match the session");
        }
        owned
    }

    fn guard_turn(&self, player_id: &str, stage: GameStage) -> bool {
        if self.table.stage != stage {
            tracing::warn!(player_id, stage = ?self.table.stage, expected = ?stage, "action in the wrong stage");
            return false;
        }
        if self.table.whose_turn_id() != player_id {
            tracing::warn!(player_id, turn = self.table.whose_turn_id(), "action out of turn");
            return false;
        }
        true
    }

    async fn handle_login(&mut self, conn: ConnId, message: &Message) {
        let Some(request) = decode::<LoginRequest>(message) else {
            return;
        };
        let Some(session_tx) = self.session_tx(conn) else {
            return;
        };
        let verified = self
            .store
            .user_by_name(&request.player_name)
            .filter(|user| auth::verify_password(&request.password, &user.password))
            .map(|user| user.player_id.clone());
        let Some(player_id) = verified else {
            // never reveal whether the name or the password was wrong
            tracing::warn!(player_name = %request.player_name, "unknown player name or wrong password");
            let response = LoginResponse {
                error: "unknown player name or wrong password".into(),
                ..LoginResponse::default()
            };
            send_to(&session_tx, protocol::encode(&response)).await;
            return;
        };
        let seated = self.table.player(&player_id).is_some();
        if !seated && self.table.players.len() >= SEATS {
            tracing::warn!(%player_id, "login rejected, the table is full");
            let response = LoginResponse {
                error: "the table is full".into(),
                ..LoginResponse::default()
            };
            send_to(&session_tx, protocol::encode(&response)).await;
            return;
        }
        let auth_token = auth::new_client_token();
        self.store
            .add_auth_token(&player_id, auth::server_token_digest(&auth_token));
        self.persist();
        tracing::info!(%player_id, player_name = %request.player_name, "login accepted");
        if seated {
            self.reconnect_player(conn, &player_id).await;
        } else {
            self.join_player(conn, &player_id, &request.player_name);
        }
        let response = LoginResponse {
            error: String::new(),
            player_id: player_id.clone(),
            auth_token,
            stage: self.table.stage,
            players: self.players_idents(),
        };
        send_to(&session_tx, protocol::encode(&response)).await;
        if seated {
            self.resend_game_state(&player_id).await;
        } else {
            let joined = PlayerJoined {
                player_id: player_id.clone(),
                player_name: request.player_name.clone(),
            };
            send_to_all_except(&self.table, &player_id, protocol::encode(&joined)).await;
        }
    }

    async fn handle_auth(&mut self, conn: ConnId, message: &Message) {
        let Some(request) = decode::<AuthRequest>(message) else {
            return;
        };
        let Some(session_tx) = self.session_tx(conn) else {
            return;
        };
        let digest = auth::server_token_digest(&request.auth_token);
        let verified = self.store.has_auth_token(&request.player_id, &digest);
        let player_name = self
            .store
            .user_by_id(&request.player_id)
            .map(|user| user.player_name.clone());
        let (Some(player_name), true) = (player_name, verified) else {
            tracing::warn!(player_id = %request.player_id, "unknown player id or wrong auth token");
            let response = AuthResponse {
                error: "unknown player id or wrong auth token".into(),
                ..AuthResponse::default()
            };
            send_to(&session_tx, protocol::encode(&response)).await;
            return;
        };
        let player_id = request.player_id.clone();
        let seated = self.table.player(&player_id).is_some();
        if !seated && self.table.players.len() >= SEATS {
            tracing::warn!(%player_id, "auth rejected, the table is full");
            let response = AuthResponse {
                error: "the table is full".into(),
                ..AuthResponse::default()
            };
            send_to(&session_tx, protocol::encode(&response)).await;
            return;
        }
        tracing::info!(%player_id, %player_name, "auth accepted");
        if seated {
            self.reconnect_player(conn, &player_id).await;
        } else {
            self.join_player(conn, &player_id, &player_name);
        }
        let response = AuthResponse {
            error: String::new(),
            player_id: player_id.clone(),
            player_name: player_name.clone(),
            stage: self.table.stage,
            players: self.players_idents(),
        };
        send_to(&session_tx, protocol::encode(&response)).await;
        if seated {
            self.resend_game_state(&player_id).await;
        } else {
            let joined = PlayerJoined {
                player_id: player_id.clone(),
                player_name,
            };
            send_to_all_except(&self.table, &player_id, protocol::encode(&joined)).await;
        }
    }

    /// Seats a new player at the end of the table.
    fn join_player(&mut self, conn: ConnId, player_id: &str, player_name: &str) {
        let Some(session) = self.sessions.get_mut(&conn) else {
            return;
        };
        session.player_id = player_id.to_string();
        session.session_id = 1;
        self.table.players.push(Player::new(
            player_id.to_string(),
            player_name.to_string(),
            1,
            session.tx.clone(),
        ));
    }

    /// Replaces the channel of an already seated player. The previous
    /// session is closed with a reason, and its epoch is left behind so it
    /// can no longer touch the seat.
    async fn reconnect_player(&mut self, conn: ConnId, player_id: &str) {
        let Some(new_tx) = self.session_tx(conn) else {
            return;
        };
        let Some(player) = self.table.player_mut(player_id) else {
            return;
        };
        player.session_id += 1;
        let session_id = player.session_id;
        player.conn.cancel_grace();
        let old_tx = std::mem::replace(&mut player.conn.tx, new_tx);
        send_to(&old_tx, transport::close_payload("Another tab connected")).await;
        if let Some(session) = self.sessions.get_mut(&conn) {
            session.player_id = player_id.to_string();
            session.session_id = session_id;
        }
        tracing::info!(player_id, session_id, "player reconnected");
    }

    /// Brings a reconnected client back up to date. The hand sent here is
    /// the live one: picked talon cards included, discarded cards gone.
    async fn resend_game_state(&mut self, player_id: &str) {
        if self.table.stage == GameStage::Unknown {
            return;
        }
        let Some(player) = self.table.player(player_id) else {
            return;
        };
        let tx = player.conn.tx.clone();
        let hand: Vec<String> = player.hand.iter().cloned().collect();
        let forehand = Forehand {
            player_id: self.table.forehand_id.clone(),
        };
        send_to(&tx, protocol::encode(&forehand)).await;
        let deal_cards = DealCards {
            player_id: player_id.to_string(),
            cards: hand,
        };
        send_to(&tx, protocol::encode(&deal_cards)).await;
        if let Some(declarer_id) = self.table.declarer_id() {
            if let Some(declarer) = self.table.player(declarer_id) {
                let contract = Bidding {
                    player_id: declarer.id.clone(),
                    bid: declarer.bid.clone(),
                };
                send_to(&tx, protocol::encode(&contract)).await;
            }
        }
        let snapshot = GameState {
            last_trick: self.table.last_trick.clone(),
            taken_tricks: self.taken_tricks(),
            cards_left: self
                .table
                .players
                .iter()
                .map(|player| PlayerCardsLeft {
                    player_id: player.id.clone(),
                    count: player.hand.len() as i32,
                })
                .collect(),
        };
        send_to(&tx, protocol::encode(&snapshot)).await;
        for played in &self.table.trick {
            let card = PlayCard {
                player_id: played.player_id.clone(),
                card: played.name.clone(),
            };
            send_to(&tx, protocol::encode(&card)).await;
        }
        if !self.table.talon.current.is_empty() {
            let open = OpenTalon {
                card: self.table.talon.current.clone(),
            };
            send_to(&tx, protocol::encode(&open)).await;
        }
        if self.miser_contract_running() {
            if let Some(miser) = self.miser_cards() {
                send_to(&tx, protocol::encode(&miser)).await;
            }
        }
        let turn = self.player_turn_snapshot(player_id);
        send_to(&tx, protocol::encode(&turn)).await;
    }

    /// The current turn as a [`PlayerTurn`], without side effects. The talon
    /// rides along only for the declarer during talon picking.
    fn player_turn_snapshot(&self, recipient_id: &str) -> PlayerTurn {
        let turn_player = self.table.whose_turn_id().to_string();
        let talon = if self.table.stage == GameStage::TalonPicking && turn_player == recipient_id {
            self.table.talon.cards.clone()
        } else {
            Vec::new()
        };
        PlayerTurn {
            can_half_whist: self.table.stage == GameStage::Whisting && self.can_half_whist(&turn_player),
            player_id: turn_player,
            stage: self.table.stage,
            min_bid: self.table.pass_game.min_bid().to_string(),
            pass_round: self.table.pass_game.round,
            talon,
        }
    }

    async fn handle_logout(&mut self, conn: ConnId, message: &Message) {
        let Some(logout) = decode::<Logout>(message) else {
            return;
        };
        if !self.guard_own(conn, &logout.player_id) {
            return;
        }
        tracing::info!(player_id = %logout.player_id, "logout");
        self.store
            .revoke_auth_token(&logout.player_id, &auth::server_token_digest(&logout.auth_token));
        self.persist();
        self.remove_player(&logout.player_id).await;
        if let Some(session) = self.sessions.get_mut(&conn) {
            session.player_id.clear();
            session.session_id = 0;
        }
    }

    /// Erases a seat and tells the remaining players.
    async fn remove_player(&mut self, player_id: &str) {
        let Some(seat) = self.table.seat_of(player_id) else {
            return;
        };
        let mut player = self.table.players.remove(seat);
        player.conn.cancel_grace();
        // keep the cursor on the seat it pointed at
        if seat < self.table.whose_turn {
            self.table.whose_turn -= 1;
        } else if self.table.whose_turn >= self.table.players.len() {
            self.table.whose_turn = 0;
        }
        tracing::info!(player_id, "player left");
        let left = PlayerLeft {
            player_id: player_id.to_string(),
        };
        send_to_all(&self.table, protocol::encode(&left)).await;
    }

    fn session_closed(&mut self, conn: ConnId) {
        let Some(session) = self.sessions.remove(&conn) else {
            return;
        };
        if session.player_id.is_empty() {
            return;
        }
        let events = self.events.clone();
        let Some(player) = self.table.player_mut(&session.player_id) else {
            tracing::debug!(player_id = %session.player_id, "session closed for a seat that already left");
            return;
        };
        if player.session_id != session.session_id {
            tracing::info!(player_id = %session.player_id, "an older session ended after a reconnect");
            return;
        }
        let player_id = session.player_id.clone();
        let session_id = session.session_id;
        tracing::info!(%player_id, "connection lost, holding the seat");
        let grace = tokio::spawn(async move {
            tokio::time::sleep(RECONNECT_GRACE).await;
            let _ = events.send(Event::GraceExpired { player_id, session_id }).await;
        });
        player.conn.cancel_grace();
        player.conn.grace = Some(grace.abort_handle());
    }

    async fn grace_expired(&mut self, player_id: &str, session_id: u64) {
        let still_current = self
            .table
            .player(player_id)
            .map(|player| player.session_id == session_id)
            .unwrap_or(false);
        if !still_current {
            return;
        }
        tracing::info!(player_id, "reconnect grace expired");
        self.remove_player(player_id).await;
    }

    // ------------------------------------------------------------------
    // ready check and deal lifecycle

    async fn handle_ready_check(&mut self, conn: ConnId, message: &Message) {
        let Some(ready) = decode::<ReadyCheck>(message) else {
            return;
        };
        if !self.guard_own(conn, &ready.player_id) {
            return;
        }
        if self.table.stage != GameStage::Unknown || self.table.players.len() != SEATS {
            tracing::warn!(player_id = %ready.player_id, "ready check outside the lobby");
            return;
        }
        tracing::info!(player_id = %ready.player_id, state = ?ready.state, "ready check");
        if ready.state == ReadyCheckState::Requested {
            for player in &mut self.table.players {
                player.ready_state = ReadyCheckState::NotRequested;
            }
        }
        if let Some(player) = self.table.player_mut(&ready.player_id) {
            // the requester implicitly accepts their own request
            player.ready_state = if ready.state == ReadyCheckState::Requested {
                ReadyCheckState::Accepted
            } else {
                ready.state
            };
        }
        send_to_all_except(&self.table, &ready.player_id, protocol::encode_message(message)).await;
        if ready.state == ReadyCheckState::Declined {
            // one decline cancels the whole round
            for player in &mut self.table.players {
                player.ready_state = ReadyCheckState::NotRequested;
            }
            return;
        }
        let all_accepted = self
            .table
            .players
            .iter()
            .all(|player| player.ready_state == ReadyCheckState::Accepted);
        if all_accepted {
            self.start_match().await;
        }
    }

    /// First deal of a match: the first seat becomes the forehand.
    async fn start_match(&mut self) {
        self.table.whose_turn = 0;
        self.table.forehand_id = self.table.whose_turn_id().to_string();
        self.begin_deal(deck::shuffled_deck()).await;
    }

    /// The deal after the pause: the forehand rotates by one seat.
    async fn next_deal(&mut self) {
        if self.table.players.len() != SEATS {
            tracing::warn!("a seat was vacated during the pause, back to the lobby");
            self.table.reset_match();
            return;
        }
        self.table.next_deal_turn();
        self.begin_deal(deck::shuffled_deck()).await;
    }

    /// Common deal setup: bump the game id, write the history placeholders,
    /// deal the given deck and hand the first turn to the forehand.
    async fn begin_deal(&mut self, deck: Vec<String>) {
        self.table.game_id += 1;
        self.table.game_started = epoch_seconds();
        tracing::info!(game_id = self.table.game_id, forehand = %self.table.forehand_id, "deal started");
        let ids: Vec<PlayerId> = self.table.players.iter().map(|player| player.id.clone()).collect();
        for player_id in &ids {
            self.store.add_or_update_game(
                player_id,
                UserGame {
                    id: self.table.game_id,
                    game_type: GameType::Ranked,
                    timestamp: self.table.game_started,
                    ..UserGame::default()
                },
            );
        }
        self.persist();
        self.send_user_games().await;
        self.deal_cards(deck).await;
        let forehand = Forehand {
            player_id: self.table.forehand_id.clone(),
        };
        send_to_all(&self.table, protocol::encode(&forehand)).await;
        self.emit_player_turn(GameStage::Bidding).await;
    }

    /// Splits the deck into three hands and the talon and tells every
    /// player their own cards.
    async fn deal_cards(&mut self, deck: Vec<String>) {
        if deck.len() != SEATS * deck::HAND_SIZE + deck::TALON_SIZE {
            tracing::warn!(cards = deck.len(), "refusing to deal a short deck");
            return;
        }
        let mut chunks = deck.chunks(deck::HAND_SIZE);
        for player in &mut self.table.players {
            player.hand = chunks.next().map(|chunk| chunk.iter().cloned().collect()).unwrap_or_default();
        }
        self.table.talon.cards = deck[SEATS * deck::HAND_SIZE..].to_vec();
        tracing::info!(talon = ?self.table.talon.cards, "cards dealt");
        let hands: Vec<(mpsc::Sender<Bytes>, DealCards)> = self
            .table
            .players
            .iter()
            .map(|player| {
                (
                    player.conn.tx.clone(),
                    DealCards {
                        player_id: player.id.clone(),
                        cards: player.hand.iter().cloned().collect(),
                    },
                )
            })
            .collect();
        for (tx, deal) in hands {
            send_to(&tx, protocol::encode(&deal)).await;
        }
    }

    /// Enters a stage and grants the turn. During talon picking the two
    /// talon cards join the declarer's hand and ride only in their copy.
    async fn emit_player_turn(&mut self, stage: GameStage) {
        self.table.stage = stage;
        let turn_player = self.table.whose_turn_id().to_string();
        if stage == GameStage::TalonPicking {
            let talon = self.table.talon.cards.clone();
            if let Some(player) = self.table.player_mut(&turn_player) {
                for card in talon {
                    player.hand.insert(card);
                }
            }
        }
        let turn = PlayerTurn {
            player_id: turn_player.clone(),
            stage,
            min_bid: self.table.pass_game.min_bid().to_string(),
            can_half_whist: stage == GameStage::Whisting && self.can_half_whist(&turn_player),
            pass_round: self.table.pass_game.round,
            talon: Vec::new(),
        };
        if stage == GameStage::TalonPicking {
            let full = PlayerTurn {
                talon: self.table.talon.cards.clone(),
                ..turn.clone()
            };
            if let Some(player) = self.table.player(&turn_player) {
                send_to(&player.conn.tx, protocol::encode(&full)).await;
            }
            send_to_all_except(&self.table, &turn_player, protocol::encode(&turn)).await;
        } else {
            send_to_all(&self.table, protocol::encode(&turn)).await;
        }
    }

    /// Half-whist is on the table only at the six and seven levels, for a
    /// whister who has not spoken yet while the other one passed.
    fn can_half_whist(&self, player_id: &str) -> bool {
        let Some(level) = self
            .table
            .declarer_id()
            .and_then(|declarer_id| self.table.player(declarer_id))
            .and_then(|declarer| ContractLevel::from_bid(&declarer.bid))
        else {
            return false;
        };
        if !matches!(level, ContractLevel::Six | ContractLevel::Seven) {
            return false;
        }
        let whisters = self.table.whister_ids();
        let me_undecided = whisters.iter().any(|whister_id| whister_id == player_id)
            && self
                .table
                .player(player_id)
                .map(|player| player.whisting == WhistingState::Undecided)
                .unwrap_or(false);
        let other_passed = whisters
            .iter()
            .filter(|whister_id| *whister_id != player_id)
            .filter_map(|whister_id| self.table.player(whister_id))
            .any(|other| other.whisting == WhistingState::Pass);
        me_undecided && other_passed
    }

    // ------------------------------------------------------------------
    // auction

    fn is_acceptable_bid(&self, bid: &str) -> bool {
        if bid == cards::PASS {
            return true;
        }
        let Some(rank) = cards::bid_rank(bid) else {
            return false;
        };
        if rank < cards::level_floor(self.table.pass_game.min_bid()) {
            return false;
        }
        let highest = self
            .table
            .players
            .iter()
            .filter(|player| !player.bid.is_empty() && player.bid != cards::PASS)
            .filter_map(|player| cards::bid_rank(&player.bid))
            .max();
        highest.map(|highest| rank > highest).unwrap_or(true)
    }

    /// Where the auction stands after the latest bid.
    fn stage_after_bidding(&mut self) -> GameStage {
        let pass_count = self
            .table
            .players
            .iter()
            .filter(|player| player.bid == cards::PASS)
            .count();
        let active_count = self
            .table
            .players
            .iter()
            .filter(|player| !player.bid.is_empty() && player.bid != cards::PASS)
            .count();
        if pass_count == SEATS - 1 && active_count == 1 {
            let contract = self
                .table
                .players
                .iter()
                .find(|player| !player.bid.is_empty() && player.bid != cards::PASS)
                .map(|player| player.bid.clone())
                .unwrap_or_default();
            return if contract.contains(cards::WITHOUT_TALON) {
                GameStage::WithoutTalon
            } else {
                GameStage::TalonPicking
            };
        }
        if pass_count == SEATS {
            self.table.pass_game.update();
            return GameStage::Playing;
        }
        GameStage::Bidding
    }

    async fn handle_bidding(&mut self, conn: ConnId, message: &Message) {
        let Some(bidding) = decode::<Bidding>(message) else {
            return;
        };
        if !self.guard_own(conn, &bidding.player_id) || !self.guard_turn(&bidding.player_id, GameStage::Bidding) {
            return;
        }
        if !self.is_acceptable_bid(&bidding.bid) {
            tracing::warn!(player_id = %bidding.player_id, bid = %bidding.bid, "illegal bid");
            return;
        }
        tracing::info!(player_id = %bidding.player_id, bid = %bidding.bid, "bid");
        if let Some(player) = self.table.player_mut(&bidding.player_id) {
            player.bid = bidding.bid.clone();
        }
        send_to_all_except(&self.table, &bidding.player_id, protocol::encode_message(message)).await;
        let stage = self.stage_after_bidding();
        if self.table.pass_game.active {
            // all three passed: the first talon card seeds the first trick
            self.open_talon().await;
        }
        self.table.advance_turn_for(stage);
        self.emit_player_turn(stage).await;
    }

    /// Reveals the next talon card as the face up lead seed.
    async fn open_talon(&mut self) {
        let Some(card) = self.table.talon.cards.get(self.table.talon.open).cloned() else {
            tracing::warn!(open = self.table.talon.open, "no talon card left to open");
            return;
        };
        self.table.talon.current = card.clone();
        send_to_all(&self.table, protocol::encode(&OpenTalon { card })).await;
    }

    async fn handle_discard_talon(&mut self, conn: ConnId, message: &Message) {
        let Some(discard) = decode::<DiscardTalon>(message) else {
            return;
        };
        if !self.guard_own(conn, &discard.player_id) {
            return;
        }
        let picking = self.table.stage == GameStage::TalonPicking;
        if !picking && self.table.stage != GameStage::WithoutTalon {
            tracing::warn!(player_id = %discard.player_id, stage = ?self.table.stage, "discard outside talon stages");
            return;
        }
        if self.table.whose_turn_id() != discard.player_id {
            tracing::warn!(player_id = %discard.player_id, "discard out of turn");
            return;
        }
        // the final contract may only go up from the winning auction bid
        let auction_rank = self
            .table
            .player(&discard.player_id)
            .and_then(|player| cards::bid_rank(&player.bid));
        let final_rank = cards::bid_rank(&discard.bid);
        let acceptable = discard.bid != cards::PASS
            && matches!((final_rank, auction_rank), (Some(final_rank), Some(auction_rank)) if final_rank >= auction_rank);
        if !acceptable {
            tracing::warn!(player_id = %discard.player_id, bid = %discard.bid, "illegal final bid");
            return;
        }
        let expected_cards = if picking { deck::TALON_SIZE } else { 0 };
        let in_hand = self
            .table
            .player(&discard.player_id)
            .map(|player| discard.cards.iter().all(|card| player.hand.contains(card)))
            .unwrap_or(false);
        if discard.cards.len() != expected_cards || !in_hand {
            tracing::warn!(player_id = %discard.player_id, cards = ?discard.cards, "illegal discard");
            return;
        }
        if let Some(player) = self.table.player_mut(&discard.player_id) {
            for card in &discard.cards {
                player.hand.remove(card);
            }
            player.bid = discard.bid.clone();
        }
        self.table.talon.discarded.extend(discard.cards.iter().cloned());
        self.table.trump = cards::trump_of_bid(&discard.bid).to_string();
        tracing::info!(player_id = %discard.player_id, bid = %discard.bid, trump = %self.table.trump, "contract fixed");
        let contract = Bidding {
            player_id: discard.player_id.clone(),
            bid: discard.bid.clone(),
        };
        send_to_all_except(&self.table, &discard.player_id, protocol::encode(&contract)).await;
        let stalingrad = discard.bid.contains(cards::SIX) && discard.bid.contains(cards::SPADE_SIGN);
        let stage = if stalingrad {
            // six of spades: both whisters whist by rule, play starts at once
            let whisters = self.table.whister_ids();
            for whister_id in &whisters {
                if let Some(whister) = self.table.player_mut(whister_id) {
                    whister.whisting = WhistingState::Whist;
                }
                let forced = Whisting {
                    player_id: whister_id.clone(),
                    choice: cards::WHIST.to_string(),
                };
                send_to_all(&self.table, protocol::encode(&forced)).await;
            }
            self.table.forehand_turn();
            GameStage::Playing
        } else {
            self.table.advance_turn();
            GameStage::Whisting
        };
        self.emit_player_turn(stage).await;
    }

    // ------------------------------------------------------------------
    // whisting

    fn fulfil_declarer_contract(&mut self) {
        let Some(declarer_id) = self.table.declarer_id().map(str::to_string) else {
            return;
        };
        let Some(declarer) = self.table.player_mut(&declarer_id) else {
            return;
        };
        if let Some(level) = ContractLevel::from_bid(&declarer.bid) {
            declarer.tricks_taken = level.declarer_required();
        }
    }

    /// Opens both whisters' hands to each other. The declarer sees nothing.
    async fn open_cards(&mut self) {
        let whisters = self.table.whister_ids();
        if whisters.len() != 2 {
            return;
        }
        for (owner, receiver) in [(0, 1), (1, 0)] {
            let Some(hand) = self
                .table
                .player(&whisters[owner])
                .map(|player| player.hand.iter().cloned().collect::<Vec<_>>())
            else {
                continue;
            };
            let Some(tx) = self.table.player(&whisters[receiver]).map(|player| player.conn.tx.clone()) else {
                continue;
            };
            let deal = DealCards {
                player_id: whisters[owner].clone(),
                cards: hand,
            };
            send_to(&tx, protocol::encode(&deal)).await;
        }
    }

    /// One whister plays for both: announce who, then open the hands
    /// between the whisters.
    async fn open_whist_play(&mut self) {
        let Some(active_id) = self
            .table
            .player_by_whisting(WhistingState::Whist)
            .map(|player| player.id.clone())
        else {
            return;
        };
        let Some(passive_id) = self
            .table
            .player_by_whisting(WhistingState::Pass)
            .map(|player| player.id.clone())
        else {
            return;
        };
        let open = OpenWhistPlay {
            active_whister_id: active_id.clone(),
            passive_whister_id: passive_id.clone(),
        };
        send_to_all(&self.table, protocol::encode(&open)).await;
        self.open_cards().await;
    }

    fn miser_contract_running(&self) -> bool {
        self.table
            .declarer_id()
            .and_then(|declarer_id| self.table.player(declarer_id))
            .map(|declarer| declarer.bid.contains(cards::MISER_PREFIX))
            .unwrap_or(false)
    }

    /// Which of the declarer's cards are still alive, for the observers of
    /// an open miser. The discarded talon stays in the remaining pool, only
    /// actually played cards leave it.
    fn miser_cards(&self) -> Option<MiserCards> {
        let declarer = self
            .table
            .declarer_id()
            .and_then(|declarer_id| self.table.player(declarer_id))?;
        let played = declarer.played_cards.clone();
        let pool = if self.table.talon.discarded.is_empty() {
            &self.table.talon.cards
        } else {
            &self.table.talon.discarded
        };
        let remaining = declarer
            .hand
            .iter()
            .cloned()
            .chain(pool.iter().cloned())
            .filter(|card| !played.contains(card))
            .collect();
        Some(MiserCards {
            remaining_cards: remaining,
            played_cards: played,
        })
    }

    async fn send_miser_cards(&mut self) {
        if let Some(miser) = self.miser_cards() {
            send_to_all(&self.table, protocol::encode(&miser)).await;
        }
    }

    async fn handle_whisting(&mut self, conn: ConnId, message: &Message) {
        let Some(whisting) = decode::<Whisting>(message) else {
            return;
        };
        if !self.guard_own(conn, &whisting.player_id) || !self.guard_turn(&whisting.player_id, GameStage::Whisting) {
            return;
        }
        let choice = normalize_choice(&whisting.choice).to_string();
        if choice == cards::HALF_WHIST && !self.can_half_whist(&whisting.player_id) {
            tracing::warn!(player_id = %whisting.player_id, "half-whist not on the table");
            return;
        }
        let recorded = self
            .table
            .player(&whisting.player_id)
            .and_then(|player| player.whisting.record(&choice));
        let Some(next_state) = recorded else {
            tracing::warn!(player_id = %whisting.player_id, choice = %whisting.choice, "illegal whisting choice");
            return;
        };
        if let Some(player) = self.table.player_mut(&whisting.player_id) {
            player.whisting = next_state;
        }
        tracing::info!(player_id = %whisting.player_id, %choice, "whisting");
        let forward = Whisting {
            player_id: whisting.player_id.clone(),
            choice: choice.clone(),
        };
        send_to_all_except(&self.table, &whisting.player_id, protocol::encode(&forward)).await;

        if self.table.is_half_whist_after_pass() {
            // the first passer decides once more; skip the declarer
            self.table.advance_turn();
            self.table.advance_turn();
            return self.emit_player_turn(GameStage::Whisting).await;
        }
        if self.table.is_whist_after_half_whist() {
            // the half-whist collapses back to a pass...
            if let Some(half_whister) = self.table.player_by_whisting_mut(WhistingState::HalfWhist) {
                half_whister.whisting = WhistingState::Pass;
                let withdrawn = Whisting {
                    player_id: half_whister.id.clone(),
                    choice: cards::PASS.to_string(),
                };
                send_to_all(&self.table, protocol::encode(&withdrawn)).await;
            }
            // ...and the former passer is now the whisting player
            if let Some(whister) = self.table.player_by_whisting_mut(WhistingState::PassWhist) {
                whister.whisting = WhistingState::Whist;
            }
            return self.emit_player_turn(GameStage::HowToPlay).await;
        }
        if self.table.is_pass_after_half_whist() {
            if let Some(whister) = self.table.player_by_whisting_mut(WhistingState::PassPass) {
                whister.whisting = WhistingState::Pass;
            }
            self.fulfil_declarer_contract();
            return self.finish_deal().await;
        }
        if self.table.are_whisters_pass() {
            self.fulfil_declarer_contract();
            return self.finish_deal().await;
        }
        let is_miser = self.miser_contract_running();
        let one_whist = self.table.are_whisters_pass_and_whist();
        let both_whist = self.table.are_whisters_whist();
        if is_miser && (one_whist || both_whist) {
            let declarer_at_forehand = self
                .table
                .declarer_id()
                .map(|declarer_id| declarer_id == self.table.forehand_id)
                .unwrap_or(false);
            if declarer_at_forehand {
                // opening waits until the declarer led the first card
                self.table.declarer_first_miser_turn = true;
            } else if both_whist {
                self.open_cards().await;
            } else {
                self.open_whist_play().await;
            }
            self.send_miser_cards().await;
            self.table.forehand_turn();
            return self.emit_player_turn(GameStage::Playing).await;
        }
        if both_whist {
            self.table.forehand_turn();
            return self.emit_player_turn(GameStage::Playing).await;
        }
        if one_whist {
            if choice != cards::WHIST {
                // the pass came last, hand the turn to the whisting player
                if let Some(seat) = self
                    .table
                    .player_by_whisting(WhistingState::Whist)
                    .map(|player| player.id.clone())
                    .and_then(|whister_id| self.table.seat_of(&whister_id))
                {
                    self.table.whose_turn = seat;
                }
            }
            return self.emit_player_turn(GameStage::HowToPlay).await;
        }
        self.table.advance_turn();
        self.emit_player_turn(GameStage::Whisting).await;
    }

    async fn handle_how_to_play(&mut self, conn: ConnId, message: &Message) {
        let Some(how) = decode::<HowToPlay>(message) else {
            return;
        };
        if !self.guard_own(conn, &how.player_id) || !self.guard_turn(&how.player_id, GameStage::HowToPlay) {
            return;
        }
        if how.choice != cards::OPENLY && how.choice != cards::CLOSED {
            tracing::warn!(player_id = %how.player_id, choice = %how.choice, "illegal how-to-play choice");
            return;
        }
        tracing::info!(player_id = %how.player_id, choice = %how.choice, "how to play");
        if let Some(player) = self.table.player_mut(&how.player_id) {
            player.how_to_play = how.choice.clone();
        }
        send_to_all_except(&self.table, &how.player_id, protocol::encode_message(message)).await;
        if how.choice == cards::OPENLY {
            self.open_whist_play().await;
        }
        self.table.forehand_turn();
        self.emit_player_turn(GameStage::Playing).await;
    }

    // ------------------------------------------------------------------
    // trick play

    /// The suit a played card has to follow right now, if any.
    fn current_lead_suit(&self) -> Option<String> {
        if !self.table.talon.current.is_empty() {
            return Some(cards::card_suit(&self.table.talon.current).to_string());
        }
        self.table
            .trick
            .first()
            .map(|played| cards::card_suit(&played.name).to_string())
    }

    async fn handle_play_card(&mut self, conn: ConnId, message: &Message) {
        let Some(play) = decode::<PlayCard>(message) else {
            return;
        };
        if !self.guard_own(conn, &play.player_id) || !self.guard_turn(&play.player_id, GameStage::Playing) {
            return;
        }
        let lead_suit = self.current_lead_suit();
        let legal = self
            .table
            .player(&play.player_id)
            .map(|player| {
                player.hand.contains(&play.card)
                    && cards::is_playable(&player.hand, lead_suit.as_deref(), &self.table.trump, &play.card)
            })
            .unwrap_or(false);
        if !legal {
            tracing::warn!(player_id = %play.player_id, card = %play.card, "illegal card");
            return;
        }
        if let Some(player) = self.table.player_mut(&play.player_id) {
            player.hand.remove(&play.card);
            player.played_cards.push(play.card.clone());
        }
        self.table.trick.push(PlayedCard {
            player_id: play.player_id.clone(),
            name: play.card.clone(),
        });
        tracing::info!(player_id = %play.player_id, card = %play.card, "card played");
        send_to_all(&self.table, protocol::encode_message(message)).await;
        if self.table.declarer_first_miser_turn {
            // the deferred miser opening, now that the declarer has led
            self.table.declarer_first_miser_turn = false;
            if self.table.are_whisters_whist() {
                self.open_cards().await;
            } else {
                self.open_whist_play().await;
            }
        }
        if self.table.trick.len() != SEATS {
            self.table.advance_turn();
        } else {
            let Some(winner_id) = self.resolve_trick() else {
                return;
            };
            self.send_trick_finished().await;
            let deal_done = self.table.players.iter().all(|player| player.hand.is_empty());
            if deal_done {
                if self.table.pass_game.round != 0 && self.declarer_fulfilled() {
                    // a made contract ends the pass escalation
                    self.table.pass_game.reset_round();
                }
                return self.finish_deal().await;
            }
            if !self.table.pass_game.active {
                if let Some(seat) = self.table.seat_of(&winner_id) {
                    self.table.whose_turn = seat;
                }
            } else {
                self.table.talon.open += 1;
                match self.table.talon.open {
                    1 => {
                        self.open_talon().await;
                        self.table.forehand_turn();
                    }
                    2 => self.table.forehand_turn(),
                    _ => {
                        if let Some(seat) = self.table.seat_of(&winner_id) {
                            self.table.whose_turn = seat;
                        }
                    }
                }
            }
        }
        let declarer_played = self
            .table
            .declarer_id()
            .map(|declarer_id| declarer_id == play.player_id)
            .unwrap_or(false);
        if declarer_played && self.miser_contract_running() {
            self.send_miser_cards().await;
        }
        self.emit_player_turn(GameStage::Playing).await;
    }

    /// Scores the full trick buffer, clears it into `last_trick` and hands
    /// the trick to the winner.
    fn resolve_trick(&mut self) -> Option<PlayerId> {
        let lead_card = if !self.table.talon.current.is_empty() {
            self.table.talon.current.clone()
        } else {
            self.table.trick.first()?.name.clone()
        };
        let lead_suit = cards::card_suit(&lead_card).to_string();
        // a face up talon card seeds exactly one trick
        self.table.talon.current.clear();
        let winner_id = deck::trick_winner(&self.table.trick, &lead_suit, &self.table.trump)?.to_string();
        if let Some(winner) = self.table.player_mut(&winner_id) {
            winner.tricks_taken += 1;
            tracing::info!(winner = %winner_id, tricks_taken = winner.tricks_taken, "trick finished");
        }
        self.table.last_trick = self.table.trick.drain(..).map(|played| played.name).collect();
        Some(winner_id)
    }

    fn taken_tricks(&self) -> Vec<PlayerTricks> {
        self.table
            .players
            .iter()
            .map(|player| PlayerTricks {
                player_id: player.id.clone(),
                taken: player.tricks_taken,
            })
            .collect()
    }

    async fn send_trick_finished(&mut self) {
        let finished = TrickFinished {
            tricks: self.taken_tricks(),
        };
        send_to_all(&self.table, protocol::encode(&finished)).await;
    }

    fn declarer_fulfilled(&self) -> bool {
        self.table
            .declarer_id()
            .and_then(|declarer_id| self.table.player(declarer_id))
            .and_then(|declarer| {
                ContractLevel::from_bid(&declarer.bid).map(|level| level.fulfilled(declarer.tricks_taken))
            })
            .unwrap_or(false)
    }

    // ------------------------------------------------------------------
    // deal end

    /// Appends this deal's entries to the running sheet.
    fn update_score_sheet(&mut self) {
        if let Some(declarer_id) = self.table.declarer_id().map(str::to_string) {
            let Some(level) = self
                .table
                .player(&declarer_id)
                .and_then(|declarer| ContractLevel::from_bid(&declarer.bid))
            else {
                tracing::warn!(%declarer_id, "declarer without a contract level");
                return;
            };
            let declarer = Declarer {
                id: declarer_id.clone(),
                level,
                tricks_taken: self
                    .table
                    .player(&declarer_id)
                    .map(|player| player.tricks_taken)
                    .unwrap_or(0),
            };
            let whister_ids = self.table.whister_ids();
            if whister_ids.len() != 2 {
                tracing::warn!(?whister_ids, "contract deal without two whisters");
                return;
            }
            let whister = |whister_id: &PlayerId| Whister {
                id: whister_id.clone(),
                choice: self
                    .table
                    .player(whister_id)
                    .map(|player| whist_choice(player.whisting))
                    .unwrap_or(WhistChoice::Pass),
                tricks_taken: self
                    .table
                    .player(whister_id)
                    .map(|player| player.tricks_taken)
                    .unwrap_or(0),
            };
            let whisters = [whister(&whister_ids[0]), whister(&whister_ids[1])];
            for (player_id, entry) in scoring::deal_score(&declarer, &whisters) {
                let line = self.table.score_sheet.entry(player_id.clone()).or_default();
                line.dump.push(entry.dump);
                line.pool.push(entry.pool);
                if player_id != declarer_id {
                    line.whists.entry(declarer_id.clone()).or_default().push(entry.whist);
                }
            }
        } else {
            // pass deal: the price grows with the round, everyone pays their
            // distance to the emptiest hand
            let price = self.table.pass_game.round;
            let min_taken = self
                .table
                .players
                .iter()
                .map(|player| player.tricks_taken)
                .min()
                .unwrap_or(0);
            for player in &self.table.players {
                let line = self.table.score_sheet.entry(player.id.clone()).or_default();
                if player.tricks_taken == 0 {
                    line.pool.push(price);
                } else {
                    line.dump.push((player.tricks_taken - min_taken) * price);
                }
            }
        }
    }

    async fn send_user_games(&mut self) {
        let targets: Vec<(mpsc::Sender<Bytes>, PlayerId)> = self
            .table
            .players
            .iter()
            .map(|player| (player.conn.tx.clone(), player.id.clone()))
            .collect();
        for (tx, player_id) in targets {
            let games = UserGames {
                games: self.store.games_of(&player_id),
            };
            send_to(&tx, protocol::encode(&games)).await;
        }
    }

    /// Scores the deal, settles the running sheet into per player rating
    /// deltas, persists the history and either schedules the next deal or
    /// folds the table back into the lobby.
    async fn finish_deal(&mut self) {
        let duration = (epoch_seconds() - self.table.game_started).max(0) as i32;
        tracing::info!(game_id = self.table.game_id, duration, "deal finished");
        self.update_score_sheet();
        let result = scoring::final_result(scoring::final_score(&self.table.score_sheet));
        let ids: Vec<PlayerId> = self.table.players.iter().map(|player| player.id.clone()).collect();
        for player_id in &ids {
            let line = self.table.score_sheet.get(player_id).cloned().unwrap_or_default();
            let whists_total: i32 = line.whists.values().flat_map(|whists| whists.iter()).sum();
            self.store.add_or_update_game(
                player_id,
                UserGame {
                    id: self.table.game_id,
                    duration,
                    pool: line.pool.iter().sum(),
                    dump: line.dump.iter().sum(),
                    whists: whists_total,
                    mmr: result.get(player_id).copied().unwrap_or(0),
                    ..UserGame::default()
                },
            );
        }
        self.persist();
        self.send_user_games().await;
        let is_game_over = self.game_over.load(Ordering::Relaxed);
        let finished = DealFinished {
            score_sheet: self.table.score_sheet.clone(),
            is_game_over,
        };
        send_to_all(&self.table, protocol::encode(&finished)).await;
        self.table.clear_deal();
        if is_game_over {
            tracing::info!("match over, table back to the lobby");
            self.table.reset_match();
            return;
        }
        let events = self.events.clone();
        tokio::spawn(async move {
            tokio::time::sleep(DEAL_PAUSE).await;
            let _ = events.send(Event::NextDeal).await;
        });
    }

    // ------------------------------------------------------------------
    // relays and bookkeeping

    async fn handle_make_offer(&mut self, conn: ConnId, message: &Message) {
        let Some(offer) = decode::<MakeOffer>(message) else {
            return;
        };
        if !self.guard_own(conn, &offer.player_id) {
            return;
        }
        if let Some(player) = self.table.player_mut(&offer.player_id) {
            player.offer = offer.offer;
        }
        send_to_all_except(&self.table, &offer.player_id, protocol::encode_message(message)).await;
    }

    async fn handle_speech_bubble(&mut self, conn: ConnId, message: &Message) {
        let Some(bubble) = decode::<SpeechBubble>(message) else {
            return;
        };
        if !self.guard_own(conn, &bubble.player_id) {
            return;
        }
        send_to_all_except(&self.table, &bubble.player_id, protocol::encode_message(message)).await;
    }

    /// Signaling blobs go to exactly one peer, never broadcast.
    async fn handle_audio_signal(&mut self, conn: ConnId, message: &Message) {
        let Some(signal) = decode::<AudioSignal>(message) else {
            return;
        };
        if !self.guard_own(conn, &signal.from_player_id) {
            return;
        }
        let Some(tx) = self
            .table
            .player(&signal.to_player_id)
            .map(|player| player.conn.tx.clone())
        else {
            tracing::warn!(to = %signal.to_player_id, "audio signal for an unknown seat");
            return;
        };
        send_to(&tx, protocol::encode_message(message)).await;
    }

    async fn handle_ping_pong(&mut self, conn: ConnId, message: &Message) {
        if decode::<PingPong>(message).is_none() {
            return;
        }
        let Some(tx) = self.session_tx(conn) else {
            return;
        };
        send_to(&tx, protocol::encode_message(message)).await;
    }

    fn handle_log(&mut self, conn: ConnId, message: &Message) {
        let Some(log) = decode::<Log>(message) else {
            return;
        };
        tracing::info!(conn, player_id = %log.player_id, "[client] {}", log.text);
    }

    fn persist(&self) {
        let Some(path) = &self.store_path else {
            return;
        };
        if let Err(error) = self.store.save(path) {
            tracing::warn!(?error, ?path, "failed to persist game data");
        }
    }
}
