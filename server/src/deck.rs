//! Shuffling and trick resolution.

use rand::seq::SliceRandom;
use rand::thread_rng;

use protocol::cards;

use crate::state::PlayedCard;

/// Cards each seat receives at the deal.
pub const HAND_SIZE: usize = 10;
/// Cards set aside as the talon.
pub const TALON_SIZE: usize = 2;

/// A fresh 32 card deck in random order. Fisher-Yates driven by an OS
/// seeded generator.
pub fn shuffled_deck() -> Vec<String> {
    let mut deck = cards::full_deck();
    deck.shuffle(&mut thread_rng());
    deck
}

/// One card's claim against the current best card of the trick.
#[derive(Debug, Clone, Copy)]
pub struct Beat<'a> {
    pub candidate: &'a str,
    pub best: &'a str,
    pub lead_suit: &'a str,
    /// Empty for no trump (miser, no-trump contracts, pass games).
    pub trump: &'a str,
}

/// Whether the candidate takes the trick over the current best card.
pub fn beats(beat: Beat<'_>) -> bool {
    let candidate_suit = cards::card_suit(beat.candidate);
    let best_suit = cards::card_suit(beat.best);
    if candidate_suit == best_suit {
        return cards::rank_value(cards::card_rank(beat.candidate))
            > cards::rank_value(cards::card_rank(beat.best));
    }
    if !beat.trump.is_empty() && candidate_suit == beat.trump && best_suit != beat.trump {
        return true;
    }
    if !beat.trump.is_empty() && candidate_suit != beat.trump && best_suit == beat.trump {
        return false;
    }
    candidate_suit == beat.lead_suit
}

/// Folds over a complete trick and names the winner. `None` on an empty
/// trick, which the engine never produces.
pub fn trick_winner<'a>(trick: &'a [PlayedCard], lead_suit: &str, trump: &str) -> Option<&'a str> {
    let (first, rest) = trick.split_first()?;
    let mut best = first;
    for candidate in rest {
        if beats(Beat {
            candidate: &candidate.name,
            best: &best.name,
            lead_suit,
            trump,
        }) {
            best = candidate;
        }
    }
    Some(&best.player_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use protocol::cards::{HEARTS, SPADES};

    fn trick(cards: [(&str, &str); 3]) -> Vec<PlayedCard> {
        cards
            .into_iter()
            .map(|(player_id, name)| PlayedCard {
                player_id: player_id.into(),
                name: name.into(),
            })
            .collect()
    }

    #[test]
    fn beat_cases() {
        // same suit: rank decides
        assert!(!beats(Beat { candidate: "7_of_hearts", best: "8_of_hearts", lead_suit: HEARTS, trump: SPADES }));
        assert!(!beats(Beat { candidate: "7_of_hearts", best: "7_of_hearts", lead_suit: HEARTS, trump: SPADES }));
        assert!(beats(Beat { candidate: "8_of_hearts", best: "7_of_hearts", lead_suit: HEARTS, trump: SPADES }));
        // trump over anything that is not trump
        assert!(beats(Beat { candidate: "7_of_spades", best: "8_of_hearts", lead_suit: HEARTS, trump: SPADES }));
        assert!(!beats(Beat { candidate: "7_of_hearts", best: "7_of_spades", lead_suit: HEARTS, trump: SPADES }));
        // without trump the lead suit decides between different suits
        assert!(beats(Beat { candidate: "7_of_hearts", best: "7_of_spades", lead_suit: HEARTS, trump: "" }));
    }

    #[test]
    fn exactly_one_winner_for_any_rotation() {
        // the trump card takes the trick no matter where it sits
        let names = ["9_of_hearts", "7_of_spades", "7_of_hearts"];
        for shift in 0..3 {
            let order = [names[shift], names[(shift + 1) % 3], names[(shift + 2) % 3]];
            let trick = trick([("1", order[0]), ("2", order[1]), ("3", order[2])]);
            let lead = cards::card_suit(order[0]);
            let winner = trick_winner(&trick, lead, SPADES).unwrap();
            let winning_card = &trick.iter().find(|played| played.player_id == winner).unwrap().name;
            assert_eq!(winning_card, "7_of_spades");
        }
    }

    #[test]
    fn higher_rank_wins_last() {
        let trick = trick([("1", "7_of_hearts"), ("2", "8_of_hearts"), ("3", "9_of_hearts")]);
        assert_eq!(trick_winner(&trick, HEARTS, SPADES), Some("3"));
    }

    #[test]
    fn higher_rank_wins_first() {
        let trick = trick([("1", "9_of_hearts"), ("2", "8_of_hearts"), ("3", "7_of_hearts")]);
        assert_eq!(trick_winner(&trick, HEARTS, SPADES), Some("1"));
    }

    #[test]
    fn trump_wins_over_lead() {
        let trick = trick([("1", "9_of_hearts"), ("2", "7_of_spades"), ("3", "7_of_hearts")]);
        assert_eq!(trick_winner(&trick, HEARTS, SPADES), Some("2"));
    }

    #[test]
    fn lead_suit_wins_against_offsuit() {
        let trick = trick([("1", "7_of_hearts"), ("2", "7_of_diamonds"), ("3", "7_of_clubs")]);
        assert_eq!(trick_winner(&trick, HEARTS, SPADES), Some("1"));
    }

    #[test]
    fn higher_rank_wins_without_trump() {
        let trick = trick([("1", "7_of_hearts"), ("2", "8_of_hearts"), ("3", "8_of_clubs")]);
        assert_eq!(trick_winner(&trick, HEARTS, ""), Some("2"));
    }

    #[test]
    fn shuffle_keeps_the_deck_complete() {
        let deck = shuffled_deck();
        assert_eq!(deck.len(), crate::state::SEATS * HAND_SIZE + TALON_SIZE);
        let mut sorted = deck.clone();
        sorted.sort();
        let mut reference = cards::full_deck();
        reference.sort();
        assert_eq!(sorted, reference);
    }
}
