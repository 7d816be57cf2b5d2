//! The wire vocabulary the server and its clients share.
//!
//! Every frame on the socket is a postcard encoded [`Message`] envelope. The
//! `method` field carries the exact type name of the payload struct; the
//! `payload` field carries the postcard encoding of that struct. Both sides
//! dispatch on the method string, which keeps the traffic readable in logs.

pub mod cards;
pub mod scores;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::scores::ScoreSheet;

/// The buffer size of the engine mailbox for intra server communication.
pub const ENGINE_MAILBOX_SIZE: usize = 256;

/// The buffer size of one session's outbound queue. Senders are
/// back-pressured once this many payloads are pending.
pub const SESSION_SEND_BUFFER: usize = 128;

/// The outer envelope of every frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// The exact type name of the payload struct.
    pub method: String,
    /// The postcard encoded payload.
    pub payload: Vec<u8>,
}

/// A payload type together with its wire method name.
pub trait Method: Serialize + DeserializeOwned {
    /// The method string carried in the envelope, always the type name.
    const NAME: &'static str;
}

macro_rules! wire_method {
    ($($ty:ident),+ $(,)?) => {
        $(impl Method for $ty {
            const NAME: &'static str = stringify!($ty);
        })+
    };
}

/// Wraps a payload into its envelope and serializes the complete frame.
pub fn encode<M: Method>(payload: &M) -> Vec<u8> {
    let message = Message {
        method: M::NAME.to_string(),
        payload: postcard::to_stdvec(payload).expect("could not serialize payload"),
    };
    encode_message(&message)
}

/// Serializes an already assembled envelope, for forwarding received frames.
pub fn encode_message(message: &Message) -> Vec<u8> {
    postcard::to_stdvec(message).expect("could not serialize message envelope")
}

/// Parses one frame into its envelope.
pub fn decode_frame(frame: &[u8]) -> postcard::Result<Message> {
    postcard::from_bytes(frame)
}

/// Parses the payload of an envelope into the expected method struct.
pub fn decode_payload<M: Method>(message: &Message) -> postcard::Result<M> {
    postcard::from_bytes(&message.payload)
}

/// The phase the table is currently in. `Unknown` doubles as the lobby state
/// before a match has started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum GameStage {
    #[default]
    Unknown,
    Bidding,
    TalonPicking,
    WithoutTalon,
    Whisting,
    HowToPlay,
    Playing,
}

/// Progress of the ready check handshake that gates a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ReadyCheckState {
    #[default]
    NotRequested,
    Requested,
    Accepted,
    Declined,
}

/// Peer to peer offers (draw, rematch and the like). The server relays them
/// without interpreting them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Offer {
    #[default]
    NoOffer,
    OfferRequested,
    OfferAccepted,
    OfferDeclined,
}

/// Whether a game counted for the rating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum GameType {
    #[default]
    Normal,
    Ranked,
}

/// Identity of one seated player as shown to the others.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PlayerIdent {
    pub player_id: String,
    pub player_name: String,
}

/// Trick count of one player.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PlayerTricks {
    pub player_id: String,
    pub taken: i32,
}

/// Hand size of one player, for reconnect snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PlayerCardsLeft {
    pub player_id: String,
    pub count: i32,
}

/// One row of a player's persisted game history.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UserGame {
    /// Server assigned id, monotonic over the whole store.
    pub id: i32,
    pub duration: i32,
    pub pool: i32,
    pub dump: i32,
    pub whists: i32,
    /// Rating delta of this deal, the settlement total at that point.
    pub mmr: i32,
    pub game_type: GameType,
    /// Epoch seconds.
    pub timestamp: i64,
}

// Client -> server.

/// First message of a fresh session: name and password login.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LoginRequest {
    pub player_name: String,
    pub password: String,
}

/// First message of a returning session: id and previously issued token.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AuthRequest {
    pub player_id: String,
    /// Lowercase hex, as handed out by the login response.
    pub auth_token: String,
}

/// Revokes the presented token and leaves the table.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Logout {
    pub player_id: String,
    pub auth_token: String,
}

/// One step of the ready check handshake. Sent by clients and forwarded to
/// the other seats by the server.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ReadyCheck {
    pub player_id: String,
    pub state: ReadyCheckState,
}

/// A bid during the auction; also sent by the server to announce the final
/// contract after the talon discard.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Bidding {
    pub player_id: String,
    /// A literal from the bid vocabulary, see [`cards::BIDS`].
    pub bid: String,
}

/// The declarer's contract commitment. `cards` holds the two discarded talon
/// cards, or nothing for a without-talon contract.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DiscardTalon {
    pub player_id: String,
    pub bid: String,
    pub cards: Vec<String>,
}

/// A whister's answer during the whisting phase.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Whisting {
    pub player_id: String,
    /// Whist, Catch, Pass, Trust or Half-whist.
    pub choice: String,
}

/// The lone whister's decision to play openly or closed.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct HowToPlay {
    pub player_id: String,
    pub choice: String,
}

/// One card played into the current trick. Echoed by the server to every
/// seat once accepted.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PlayCard {
    pub player_id: String,
    pub card: String,
}

/// A relayed offer between the players. Not part of the game state.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MakeOffer {
    pub player_id: String,
    pub offer: Offer,
}

/// Free text chat bubble, relayed to the other seats.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SpeechBubble {
    pub player_id: String,
    pub text: String,
}

/// Opaque voice signaling blob, relayed to exactly one peer. The server does
/// not interpret `kind` or `data`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AudioSignal {
    pub from_player_id: String,
    pub to_player_id: String,
    pub kind: String,
    pub data: Vec<u8>,
}

/// Round trip probe; the server echoes it back unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PingPong {
    pub id: u64,
}

/// Client side log line, written into the server log.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Log {
    pub player_id: String,
    pub text: String,
}

// Server -> client.

/// Answer to a [`LoginRequest`]. Either `error` is set, or the session is
/// admitted and the remaining fields are filled.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LoginResponse {
    pub error: String,
    pub player_id: String,
    pub auth_token: String,
    pub stage: GameStage,
    pub players: Vec<PlayerIdent>,
}

/// Answer to an [`AuthRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AuthResponse {
    pub error: String,
    pub player_id: String,
    pub player_name: String,
    pub stage: GameStage,
    pub players: Vec<PlayerIdent>,
}

/// A new player took a seat.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PlayerJoined {
    pub player_id: String,
    pub player_name: String,
}

/// A seat was vacated, by logout or by an expired reconnect grace.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PlayerLeft {
    pub player_id: String,
}

/// Announces the forehand of the deal that is about to start.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Forehand {
    pub player_id: String,
}

/// A hand of cards. Unicast to the owner after the deal; also used when
/// hands are opened between the whisters.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DealCards {
    pub player_id: String,
    pub cards: Vec<String>,
}

/// Grants the next turn. This is always the last server message of the
/// transition it concludes.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PlayerTurn {
    pub player_id: String,
    pub stage: GameStage,
    pub min_bid: String,
    pub can_half_whist: bool,
    pub pass_round: i32,
    /// The two talon cards; only filled in the declarer's copy during talon
    /// picking.
    pub talon: Vec<String>,
}

/// Announces open whist play and which of the two whisters actually plays.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OpenWhistPlay {
    pub active_whister_id: String,
    pub passive_whister_id: String,
}

/// Reveals one talon card as the lead seed of a pass game trick.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OpenTalon {
    pub card: String,
}

/// Card tracking broadcast during an open miser, so everyone can follow
/// which of the declarer's cards are still alive.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MiserCards {
    pub remaining_cards: Vec<String>,
    pub played_cards: Vec<String>,
}

/// Snapshot for a reconnecting client.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GameState {
    pub last_trick: Vec<String>,
    pub taken_tricks: Vec<PlayerTricks>,
    pub cards_left: Vec<PlayerCardsLeft>,
}

/// Per player trick counts after a resolved trick.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TrickFinished {
    pub tricks: Vec<PlayerTricks>,
}

/// The running score sheet after a finished deal.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DealFinished {
    pub score_sheet: ScoreSheet,
    pub is_game_over: bool,
}

/// A player's complete game history.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UserGames {
    pub games: Vec<UserGame>,
}

wire_method!(
    LoginRequest,
    LoginResponse,
    AuthRequest,
    AuthResponse,
    Logout,
    ReadyCheck,
    Bidding,
    DiscardTalon,
    Whisting,
    HowToPlay,
    PlayCard,
    MakeOffer,
    SpeechBubble,
    AudioSignal,
    PingPong,
    Log,
    PlayerJoined,
    PlayerLeft,
    Forehand,
    DealCards,
    PlayerTurn,
    OpenWhistPlay,
    OpenTalon,
    MiserCards,
    GameState,
    TrickFinished,
    DealFinished,
    UserGames,
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_carries_the_type_name() {
        let frame = encode(&PlayCard {
            player_id: "p1".into(),
            card: "ace_of_spades".into(),
        });
        let message = decode_frame(&frame).unwrap();
        assert_eq!(message.method, "PlayCard");
        let payload: PlayCard = decode_payload(&message).unwrap();
        assert_eq!(payload.card, "ace_of_spades");
    }

    #[test]
    fn malformed_frames_fail_without_panicking() {
        assert!(decode_frame(&[0xff, 0xff, 0xff, 0xff, 0xff]).is_err());
        let mut frame = encode(&PingPong { id: 7 });
        frame.truncate(frame.len() - 1);
        assert!(decode_frame(&frame).is_err());
    }

    #[test]
    fn payload_decoding_is_strict_per_method() {
        let frame = encode(&Forehand {
            player_id: "p2".into(),
        });
        let message = decode_frame(&frame).unwrap();
        // A Forehand payload is not a valid ReadyCheck payload.
        assert!(decode_payload::<ReadyCheck>(&message).is_err());
    }
}
