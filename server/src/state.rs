//! The in-memory table: seats, talon, trick buffer and pass game state.
//!
//! The seat list is insertion ordered; the physical turn order is the order
//! in which the players first joined, and `whose_turn` is an index into it.
//! Only the engine task mutates anything in here.

use std::collections::BTreeSet;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;

use protocol::cards;
use protocol::scores::ScoreSheet;
use protocol::{GameStage, Offer, ReadyCheckState};

/// Number of seats at the table.
pub const SEATS: usize = 3;

pub type PlayerId = String;

/// One card inside the current trick, with its owner.
#[derive(Debug, Clone)]
pub struct PlayedCard {
    pub player_id: PlayerId,
    pub name: String,
}

/// Whisting progress of one whister. The wire speaks plain choice strings;
/// this is the small state machine those strings drive. The two `Pass*`
/// states exist because a half-whist hands the first passer one more turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WhistingState {
    #[default]
    Undecided,
    Pass,
    Whist,
    HalfWhist,
    /// Passed first, then whisted after the other whister's half-whist.
    PassWhist,
    /// Passed first and passed again after the half-whist offer.
    PassPass,
}

impl WhistingState {
    /// Applies one normalized wire choice. `None` when the choice is not
    /// legal in the current state.
    pub fn record(self, choice: &str) -> Option<WhistingState> {
        use WhistingState::*;
        match (self, choice) {
            (Undecided, cards::WHIST) => Some(Whist),
            (Undecided, cards::PASS) => Some(Pass),
            (Undecided, cards::HALF_WHIST) => Some(HalfWhist),
            (Pass, cards::WHIST) => Some(PassWhist),
            (Pass, cards::PASS) => Some(PassPass),
            _ => None,
        }
    }
}

/// The outbound side of one seat: the current session's bounded queue plus
/// the reconnect grace timer while the transport is gone.
#[derive(Debug)]
pub struct Connection {
    pub tx: mpsc::Sender<Bytes>,
    pub grace: Option<AbortHandle>,
}

impl Connection {
    pub fn new(tx: mpsc::Sender<Bytes>) -> Connection {
        Connection { tx, grace: None }
    }

    /// Stops a pending eviction, typically because the player came back.
    pub fn cancel_grace(&mut self) {
        if let Some(handle) = self.grace.take() {
            handle.abort();
        }
    }
}

/// One seat of the table.
#[derive(Debug)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    /// Epoch token, bumped on every reconnect. A task holding an older value
    /// must not touch the seat.
    pub session_id: u64,
    pub conn: Connection,
    pub hand: BTreeSet<String>,
    /// Cards played this deal, in play order.
    pub played_cards: Vec<String>,
    pub bid: String,
    pub whisting: WhistingState,
    pub how_to_play: String,
    pub tricks_taken: i32,
    pub ready_state: ReadyCheckState,
    pub offer: Offer,
}

impl Player {
    pub fn new(id: PlayerId, name: String, session_id: u64, tx: mpsc::Sender<Bytes>) -> Player {
        Player {
            id,
            name,
            session_id,
            conn: Connection::new(tx),
            hand: BTreeSet::new(),
            played_cards: Vec::new(),
            bid: String::new(),
            whisting: WhistingState::Undecided,
            how_to_play: String::new(),
            tricks_taken: 0,
            ready_state: ReadyCheckState::NotRequested,
            offer: Offer::NoOffer,
        }
    }

    /// Wipes everything a new deal starts from scratch.
    pub fn clear_deal(&mut self) {
        self.hand.clear();
        self.played_cards.clear();
        self.bid.clear();
        self.whisting = WhistingState::Undecided;
        self.how_to_play.clear();
        self.tricks_taken = 0;
        self.ready_state = ReadyCheckState::NotRequested;
        self.offer = Offer::NoOffer;
    }
}

/// The two cards set aside at the deal.
#[derive(Debug, Default)]
pub struct Talon {
    /// How many pass game tricks have completed, drives the reveals.
    pub open: usize,
    /// The face up card currently seeding the lead suit, empty otherwise.
    pub current: String,
    pub cards: Vec<String>,
    /// What the declarer threw away; kept for miser card tracking.
    pub discarded: Vec<String>,
}

impl Talon {
    pub fn clear(&mut self) {
        self.open = 0;
        self.current.clear();
        self.cards.clear();
        self.discarded.clear();
    }
}

/// Escalation state of the all-pass deals.
#[derive(Debug, Default)]
pub struct PassGame {
    /// 0 outside a pass sequence, then 1..=3.
    pub round: i32,
    /// True only while a pass deal is being played.
    pub active: bool,
}

impl PassGame {
    const ROUNDS: i32 = 3;

    /// The auction floor: "6" for the first two rounds, "7" afterwards.
    pub fn min_bid(&self) -> &'static str {
        if self.round >= 2 { cards::SEVEN } else { cards::SIX }
    }

    /// Enters the next pass deal.
    pub fn update(&mut self) {
        self.active = true;
        self.round = (self.round + 1).min(Self::ROUNDS);
    }

    /// A fulfilled contract ends the escalation.
    pub fn reset_round(&mut self) {
        self.round = 0;
    }

    /// Per deal reset. The round deliberately survives between deals.
    pub fn clear(&mut self) {
        self.active = false;
    }
}

/// Everything one match owns. The engine task is the single writer.
#[derive(Debug, Default)]
pub struct Table {
    pub players: Vec<Player>,
    /// Seat index of the player whose action the server waits for.
    pub whose_turn: usize,
    pub forehand_id: PlayerId,
    pub stage: GameStage,
    pub talon: Talon,
    pub trick: Vec<PlayedCard>,
    pub last_trick: Vec<String>,
    /// Trump suit of the running contract, empty for no trump.
    pub trump: String,
    pub pass_game: PassGame,
    pub score_sheet: ScoreSheet,
    /// Set when a forehand miser declarer still has to play the first card
    /// before the whisters' hands open up.
    pub declarer_first_miser_turn: bool,
    pub game_id: i32,
    pub game_started: i64,
}

impl Table {
    pub fn player(&self, player_id: &str) -> Option<&Player> {
        self.players.iter().find(|player| player.id == player_id)
    }

    pub fn player_mut(&mut self, player_id: &str) -> Option<&mut Player> {
        self.players.iter_mut().find(|player| player.id == player_id)
    }

    pub fn seat_of(&self, player_id: &str) -> Option<usize> {
        self.players.iter().position(|player| player.id == player_id)
    }

    /// Id of the player at the turn cursor, empty when nobody is seated.
    pub fn whose_turn_id(&self) -> &str {
        self.players
            .get(self.whose_turn)
            .map(|player| player.id.as_str())
            .unwrap_or_default()
    }

    /// Moves the cursor one seat forward, wrapping around.
    pub fn advance_turn(&mut self) {
        if !self.players.is_empty() {
            self.whose_turn = (self.whose_turn + 1) % self.players.len();
        }
    }

    /// Moves the cursor forward; during the auction stages players who
    /// already passed are skipped.
    pub fn advance_turn_for(&mut self, stage: GameStage) {
        self.advance_turn();
        if !matches!(
            stage,
            GameStage::Bidding | GameStage::TalonPicking | GameStage::WithoutTalon
        ) {
            return;
        }
        for _ in 0..self.players.len() {
            let passed = self
                .players
                .get(self.whose_turn)
                .map(|player| player.bid == cards::PASS)
                .unwrap_or(false);
            if !passed {
                break;
            }
            self.advance_turn();
        }
    }

    /// Puts the cursor on the forehand.
    pub fn forehand_turn(&mut self) {
        if let Some(seat) = self.seat_of(&self.forehand_id) {
            self.whose_turn = seat;
        }
    }

    /// Rotates the forehand by one seat and starts the new deal there.
    pub fn next_deal_turn(&mut self) {
        let seat = self.seat_of(&self.forehand_id).unwrap_or(0);
        if !self.players.is_empty() {
            self.whose_turn = (seat + 1) % self.players.len();
        }
        self.forehand_id = self.whose_turn_id().to_string();
    }

    /// The unique non-pass bidder, if the auction produced one.
    pub fn declarer_id(&self) -> Option<&str> {
        self.players
            .iter()
            .find(|player| !player.bid.is_empty() && player.bid != cards::PASS)
            .map(|player| player.id.as_str())
    }

    /// The players whose auction bid was a pass, in seat order.
    pub fn whister_ids(&self) -> Vec<PlayerId> {
        self.players
            .iter()
            .filter(|player| player.bid == cards::PASS)
            .map(|player| player.id.clone())
            .collect()
    }

    pub fn count_whisting(&self, state: WhistingState) -> usize {
        self.players.iter().filter(|player| player.whisting == state).count()
    }

    pub fn player_by_whisting_mut(&mut self, state: WhistingState) -> Option<&mut Player> {
        self.players.iter_mut().find(|player| player.whisting == state)
    }

    pub fn player_by_whisting(&self, state: WhistingState) -> Option<&Player> {
        self.players.iter().find(|player| player.whisting == state)
    }

    pub fn are_whisters_pass(&self) -> bool {
        self.count_whisting(WhistingState::Pass) == 2
    }

    pub fn are_whisters_whist(&self) -> bool {
        self.count_whisting(WhistingState::Whist) == 2
    }

    pub fn are_whisters_pass_and_whist(&self) -> bool {
        self.count_whisting(WhistingState::Pass) == 1 && self.count_whisting(WhistingState::Whist) == 1
    }

    pub fn is_half_whist_after_pass(&self) -> bool {
        self.count_whisting(WhistingState::Pass) == 1 && self.count_whisting(WhistingState::HalfWhist) == 1
    }

    pub fn is_pass_after_half_whist(&self) -> bool {
        self.count_whisting(WhistingState::PassPass) == 1
    }

    pub fn is_whist_after_half_whist(&self) -> bool {
        self.count_whisting(WhistingState::PassWhist) == 1
    }

    /// Per deal reset. The score sheet and the pass round carry over.
    pub fn clear_deal(&mut self) {
        self.talon.clear();
        self.trick.clear();
        self.last_trick.clear();
        self.trump.clear();
        self.pass_game.clear();
        self.declarer_first_miser_turn = false;
        for player in &mut self.players {
            player.clear_deal();
        }
    }

    /// Full reset after a match ended. The seats stay occupied.
    pub fn reset_match(&mut self) {
        self.clear_deal();
        self.score_sheet.clear();
        self.pass_game.reset_round();
        self.stage = GameStage::Unknown;
        self.forehand_id.clear();
        self.whose_turn = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn table_with_seats(ids: &[&str]) -> Table {
        let mut table = Table::default();
        for id in ids {
            let (tx, _rx) = mpsc::channel(4);
            table
                .players
                .push(Player::new(id.to_string(), format!("name-{id}"), 1, tx));
        }
        table
    }

    #[test]
    fn turn_cursor_wraps_in_seat_order() {
        let mut table = table_with_seats(&["a", "b", "c"]);
        assert_eq!(table.whose_turn_id(), "a");
        table.advance_turn();
        assert_eq!(table.whose_turn_id(), "b");
        table.advance_turn();
        table.advance_turn();
        assert_eq!(table.whose_turn_id(), "a");
    }

    #[test]
    fn auction_advance_skips_passed_players() {
        let mut table = table_with_seats(&["a", "b", "c"]);
        table.player_mut("b").unwrap().bid = cards::PASS.into();
        table.advance_turn_for(GameStage::Bidding);
        assert_eq!(table.whose_turn_id(), "c");
    }

    #[test]
    fn forehand_rotates_by_one_seat_per_deal() {
        let mut table = table_with_seats(&["a", "b", "c"]);
        table.forehand_id = "a".into();
        table.next_deal_turn();
        assert_eq!(table.forehand_id, "b");
        assert_eq!(table.whose_turn_id(), "b");
        table.next_deal_turn();
        table.next_deal_turn();
        assert_eq!(table.forehand_id, "a");
    }

    #[test]
    fn whisting_state_machine_accepts_only_legal_moves() {
        use WhistingState::*;
        assert_eq!(Undecided.record(cards::WHIST), Some(Whist));
        assert_eq!(Undecided.record(cards::PASS), Some(Pass));
        assert_eq!(Undecided.record(cards::HALF_WHIST), Some(HalfWhist));
        assert_eq!(Pass.record(cards::WHIST), Some(PassWhist));
        assert_eq!(Pass.record(cards::PASS), Some(PassPass));
        assert_eq!(Whist.record(cards::PASS), None);
        assert_eq!(HalfWhist.record(cards::WHIST), None);
        assert_eq!(Undecided.record("garbage"), None);
    }

    #[test]
    fn pass_game_floor_and_rounds() {
        let mut pass = PassGame::default();
        assert_eq!(pass.min_bid(), cards::SIX);
        pass.update();
        assert_eq!(pass.round, 1);
        assert_eq!(pass.min_bid(), cards::SIX);
        pass.update();
        assert_eq!(pass.min_bid(), cards::SEVEN);
        pass.update();
        pass.update();
        assert_eq!(pass.round, 3);
        pass.clear();
        assert!(!pass.active);
        assert_eq!(pass.round, 3);
        pass.reset_round();
        assert_eq!(pass.round, 0);
    }
}
