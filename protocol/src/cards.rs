//! Card names, the bid vocabulary and the playability rule.
//!
//! A card is identified everywhere by its canonical `"<rank>_of_<suit>"`
//! name, e.g. `"ace_of_spades"`. There is deliberately no numeric card id;
//! scoring and playability are stated over the string form on both sides of
//! the wire.

use std::collections::BTreeSet;

pub const SPADES: &str = "spades";
pub const CLUBS: &str = "clubs";
pub const DIAMONDS: &str = "diamonds";
pub const HEARTS: &str = "hearts";

/// All suits, in deck construction order.
pub const SUITS: [&str; 4] = [SPADES, CLUBS, DIAMONDS, HEARTS];

/// Lowest contract level. Not a card rank, the deck starts at the seven.
pub const SIX: &str = "6";
pub const SEVEN: &str = "7";
pub const EIGHT: &str = "8";
pub const NINE: &str = "9";
pub const TEN: &str = "10";
pub const JACK: &str = "jack";
pub const QUEEN: &str = "queen";
pub const KING: &str = "king";
pub const ACE: &str = "ace";

/// All ranks, lowest first.
pub const RANKS: [&str; 8] = [SEVEN, EIGHT, NINE, TEN, JACK, QUEEN, KING, ACE];

pub const SPADE_SIGN: &str = "♠";
pub const CLUB_SIGN: &str = "♣";
pub const DIAMOND_SIGN: &str = "♦";
pub const HEART_SIGN: &str = "♥";

/// Marker inside a bid for a contract played without the talon.
pub const WITHOUT_TALON: &str = "WT";
/// Prefix shared by both miser bids.
pub const MISER_PREFIX: &str = "Mis";
pub const MISER: &str = "Misère";
pub const MISER_WT: &str = "Mis.WT";
pub const NINE_WT: &str = "9 WT";
pub const PASS: &str = "Pass";

pub const WHIST: &str = "Whist";
pub const HALF_WHIST: &str = "Half-whist";
pub const CATCH: &str = "Catch";
pub const TRUST: &str = "Trust";
pub const OPENLY: &str = "Openly";
pub const CLOSED: &str = "Closed";

const OF: &str = "_of_";

/// Every legal bid, ordered from the lowest to the highest. A bid outranks
/// another iff its index is larger; `Pass` ranks above everything.
pub const BIDS: [&str; 29] = [
    "6♠", "6♣", "6♦", "6♥", "6", //
    "7♠", "7♣", "7♦", "7♥", "7", //
    "8♠", "8♣", "8♦", "8♥", "8", //
    MISER, //
    "9♠", "9♣", "9♦", "9♥", "9", //
    MISER_WT, NINE_WT, //
    "10♠", "10♣", "10♦", "10♥", "10", //
    PASS,
];

/// Position of a bid in the vocabulary, `None` for anything else.
pub fn bid_rank(bid: &str) -> Option<usize> {
    BIDS.iter().position(|known| *known == bid)
}

/// Index of the lowest contract at the given minimum level ("6" or "7").
pub fn level_floor(min_bid: &str) -> usize {
    bid_rank(&format!("{min_bid}{SPADE_SIGN}")).unwrap_or(0)
}

/// Builds the canonical card name.
pub fn card_name(rank: &str, suit: &str) -> String {
    format!("{rank}{OF}{suit}")
}

/// The suit part of a card name. Empty for a malformed name.
pub fn card_suit(card: &str) -> &str {
    card.split_once(OF).map(|(_, suit)| suit).unwrap_or_default()
}

/// The rank part of a card name. Empty for a malformed name.
pub fn card_rank(card: &str) -> &str {
    card.split_once(OF).map(|(rank, _)| rank).unwrap_or_default()
}

/// Rank strength, 1 for the seven up to 8 for the ace. 0 for garbage.
pub fn rank_value(rank: &str) -> i32 {
    match rank {
        SEVEN => 1,
        EIGHT => 2,
        NINE => 3,
        TEN => 4,
        JACK => 5,
        QUEEN => 6,
        KING => 7,
        ACE => 8,
        _ => 0,
    }
}

/// The trump suit a contract names. Empty for no-trump contracts, misers,
/// without-talon bids and passes.
pub fn trump_of_bid(bid: &str) -> &'static str {
    if bid.contains(WITHOUT_TALON) || bid.contains(MISER_PREFIX) || bid.contains(PASS) {
        return "";
    }
    if bid.contains(SPADE_SIGN) {
        SPADES
    } else if bid.contains(CLUB_SIGN) {
        CLUBS
    } else if bid.contains(HEART_SIGN) {
        HEARTS
    } else if bid.contains(DIAMOND_SIGN) {
        DIAMONDS
    } else {
        ""
    }
}

/// The full 32 card deck, unshuffled.
pub fn full_deck() -> Vec<String> {
    let mut deck = Vec::with_capacity(RANKS.len() * SUITS.len());
    for rank in RANKS {
        for suit in SUITS {
            deck.push(card_name(rank, suit));
        }
    }
    deck
}

/// Whether `card` may be played from `hand`. The same check runs on the
/// client before submitting and on the server when accepting a play.
///
/// `lead_suit` is `None` for the first card of a trick. A player holding the
/// lead suit must follow it; a player void in the lead suit but holding a
/// trump must trump; anything else is free.
pub fn is_playable(hand: &BTreeSet<String>, lead_suit: Option<&str>, trump: &str, card: &str) -> bool {
    let Some(lead) = lead_suit else {
        return true;
    };
    if card_suit(card) == lead {
        return true;
    }
    if hand.iter().any(|held| card_suit(held) == lead) {
        return false;
    }
    if !trump.is_empty() && hand.iter().any(|held| card_suit(held) == trump) {
        return card_suit(card) == trump;
    }
    true
}
