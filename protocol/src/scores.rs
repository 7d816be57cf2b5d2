//! The three score columns and their aggregated forms.
//!
//! Every deal appends one element per list; nothing is pruned while a match
//! runs, so the sheet is the full history the settlement works from.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// What one deal added for one player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DealScoreEntry {
    pub dump: i32,
    pub pool: i32,
    pub whist: i32,
}

/// The running columns of one player. `whists` is keyed by the opponent the
/// whists are owed by.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Score {
    pub dump: Vec<i32>,
    pub pool: Vec<i32>,
    pub whists: BTreeMap<String, Vec<i32>>,
}

/// The complete sheet, player id to score columns.
pub type ScoreSheet = BTreeMap<String, Score>;

/// One player's columns collapsed into totals.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FinalScoreEntry {
    pub dump: i32,
    pub pool: i32,
    pub whists: BTreeMap<String, i32>,
}

/// Collapsed sheet, the input of the settlement.
pub type FinalScore = BTreeMap<String, FinalScoreEntry>;

/// Settlement output: the signed total of each player. Sums to zero.
pub type FinalResult = BTreeMap<String, i32>;
