//! Deal scoring and the end of match settlement.

use std::collections::BTreeMap;

use protocol::cards;
use protocol::scores::{DealScoreEntry, FinalResult, FinalScore, FinalScoreEntry, ScoreSheet};

use crate::state::PlayerId;

/// Whist price per trick during the settlement.
const SETTLEMENT_PRICE: i32 = 10;

/// The six contract levels. Miser sits between eight and nine in the bid
/// vocabulary but has its own row in the price table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContractLevel {
    Six,
    Seven,
    Eight,
    Nine,
    Ten,
    Miser,
}

impl ContractLevel {
    /// Maps a bid literal onto its level by prefix, e.g. `"7♦"` to `Seven`
    /// and `"Mis.WT"` to `Miser`.
    pub fn from_bid(bid: &str) -> Option<ContractLevel> {
        use ContractLevel::*;
        if bid.starts_with(cards::TEN) {
            return Some(Ten);
        }
        if bid.starts_with(cards::SIX) {
            return Some(Six);
        }
        if bid.starts_with(cards::SEVEN) {
            return Some(Seven);
        }
        if bid.starts_with(cards::EIGHT) {
            return Some(Eight);
        }
        if bid.starts_with(cards::NINE) {
            return Some(Nine);
        }
        if bid.starts_with(cards::MISER_PREFIX) {
            return Some(Miser);
        }
        None
    }

    /// Whist price per trick of the contract.
    pub fn price(self) -> i32 {
        use ContractLevel::*;
        match self {
            Six => 2,
            Seven => 4,
            Eight => 6,
            Nine => 8,
            Ten | Miser => 10,
        }
    }

    /// Tricks the declarer has to take; for a miser, the most they may take.
    pub fn declarer_required(self) -> i32 {
        use ContractLevel::*;
        match self {
            Six => 6,
            Seven => 7,
            Eight => 8,
            Nine => 9,
            Ten => 10,
            Miser => 0,
        }
    }

    /// Combined tricks two whisting whisters have to take.
    pub fn two_whisters_required(self) -> i32 {
        use ContractLevel::*;
        match self {
            Six => 4,
            Seven => 2,
            Eight | Nine | Ten => 1,
            Miser => 0,
        }
    }

    /// Tricks one whister owes when both whisters whisted.
    pub fn one_whister_required(self) -> i32 {
        use ContractLevel::*;
        match self {
            Six => 2,
            Seven | Eight | Nine | Ten => 1,
            Miser => 0,
        }
    }

    /// Fulfillment check; miser inverts the comparison.
    pub fn fulfilled(self, tricks_taken: i32) -> bool {
        if self == ContractLevel::Miser {
            tricks_taken <= self.declarer_required()
        } else {
            tricks_taken >= self.declarer_required()
        }
    }
}

/// The final whisting stance that feeds the score, after all half-whist
/// conversions are done.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WhistChoice {
    Whist,
    Pass,
    HalfWhist,
}

pub struct Declarer {
    pub id: PlayerId,
    pub level: ContractLevel,
    pub tricks_taken: i32,
}

pub struct Whister {
    pub id: PlayerId,
    pub choice: WhistChoice,
    pub tricks_taken: i32,
}

fn shortfall(required: i32, taken: i32) -> i32 {
    (required - taken).max(0)
}

/// The dump/pool/whist entries one contracted deal produces.
pub fn deal_score(declarer: &Declarer, whisters: &[Whister; 2]) -> BTreeMap<PlayerId, DealScoreEntry> {
    let price = declarer.level.price();
    let declarer_required = declarer.level.declarer_required();
    let two_whisters_required = declarer.level.two_whisters_required();
    let whisters_taken = whisters[0].tricks_taken + whisters[1].tricks_taken;

    let declarer_failed = if declarer.level == ContractLevel::Miser {
        shortfall(declarer.tricks_taken, declarer_required)
    } else {
        shortfall(declarer_required, declarer.tricks_taken)
    };

    let declarer_entry = if declarer.level.fulfilled(declarer.tricks_taken) {
        DealScoreEntry {
            pool: price,
            ..DealScoreEntry::default()
        }
    } else {
        DealScoreEntry {
            dump: declarer_failed * price,
            ..DealScoreEntry::default()
        }
    };

    let whister_entry = |whister: &Whister| {
        let mut entry = DealScoreEntry::default();
        // against a miser the whisters neither earn nor owe anything
        if declarer.level == ContractLevel::Miser {
            return entry;
        }
        match whister.choice {
            WhistChoice::Whist => {
                entry.whist += whister.tricks_taken * price;
                if shortfall(two_whisters_required, whisters_taken) > 0 {
                    let both_whisted = whisters
                        .iter()
                        .all(|whister| whister.choice == WhistChoice::Whist);
                    let required = if both_whisted {
                        declarer.level.one_whister_required()
                    } else {
                        two_whisters_required
                    };
                    entry.dump += shortfall(required, whister.tricks_taken) * price;
                }
            }
            WhistChoice::HalfWhist => {
                entry.whist += (two_whisters_required * price) / 2;
            }
            WhistChoice::Pass => {}
        }
        entry.whist += declarer_failed * price;
        entry
    };

    BTreeMap::from([
        (declarer.id.clone(), declarer_entry),
        (whisters[0].id.clone(), whister_entry(&whisters[0])),
        (whisters[1].id.clone(), whister_entry(&whisters[1])),
    ])
}

/// Collapses the running sheet into per player totals.
pub fn final_score(sheet: &ScoreSheet) -> FinalScore {
    sheet
        .iter()
        .map(|(player_id, score)| {
            (
                player_id.clone(),
                FinalScoreEntry {
                    dump: score.dump.iter().sum(),
                    pool: score.pool.iter().sum(),
                    whists: score
                        .whists
                        .iter()
                        .map(|(other_id, whists)| (other_id.clone(), whists.iter().sum()))
                        .collect(),
                },
            )
        })
        .collect()
}

/// Correction that keeps the integer division of a distributed score exact:
/// 0 when it already divides, -1 when it is one price unit over, +1 else.
fn adjust_score(score: i32, players: i32) -> i32 {
    let value = score * SETTLEMENT_PRICE;
    if value % players == 0 {
        0
    } else if (value - SETTLEMENT_PRICE) % players == 0 {
        -1
    } else {
        1
    }
}

/// The end of match settlement. Dump and pool are normalized by the table
/// minimum, converted into whists between the players and netted out; the
/// resulting totals sum to zero across the table.
pub fn final_result(mut totals: FinalScore) -> FinalResult {
    if totals.is_empty() {
        return FinalResult::new();
    }
    let players = totals.len() as i32;
    let ids: Vec<PlayerId> = totals.keys().cloned().collect();

    let min_dump = totals.values().map(|entry| entry.dump).min().unwrap_or(0);
    let min_pool = totals.values().map(|entry| entry.pool).min().unwrap_or(0);
    for entry in totals.values_mut() {
        entry.dump -= min_dump;
        entry.pool -= min_pool;
    }

    // dump becomes whists the others hold against the dumping player
    for player_id in &ids {
        let dump = totals.get(player_id).map(|entry| entry.dump).unwrap_or(0);
        if dump == 0 {
            continue;
        }
        let adjust = adjust_score(dump, players);
        let amount = (dump + adjust) * SETTLEMENT_PRICE / players + adjust * -players;
        for other_id in ids.iter().filter(|other_id| *other_id != player_id) {
            if let Some(other) = totals.get_mut(other_id) {
                *other.whists.entry(player_id.clone()).or_insert(0) += amount;
            }
        }
    }

    // pool becomes whists the player holds against every other player
    for player_id in &ids {
        let pool = totals.get(player_id).map(|entry| entry.pool).unwrap_or(0);
        if pool == 0 {
            continue;
        }
        let adjust = adjust_score(pool, players);
        let amount = (pool + adjust) * SETTLEMENT_PRICE / players + adjust * -players;
        for other_id in ids.iter().filter(|other_id| *other_id != player_id) {
            if let Some(entry) = totals.get_mut(player_id) {
                *entry.whists.entry(other_id.clone()).or_insert(0) += amount;
            }
        }
    }

    // net the mutual whists out into one signed total per player
    ids.iter()
        .map(|player_id| {
            let net = ids
                .iter()
                .filter(|other_id| *other_id != player_id)
                .map(|other_id| {
                    let mine = totals
                        .get(player_id)
                        .and_then(|entry| entry.whists.get(other_id))
                        .copied()
                        .unwrap_or(0);
                    let theirs = totals
                        .get(other_id)
                        .and_then(|entry| entry.whists.get(player_id))
                        .copied()
                        .unwrap_or(0);
                    mine - theirs
                })
                .sum();
            (player_id.clone(), net)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use protocol::scores::Score;

    fn declarer(level: ContractLevel, tricks_taken: i32) -> Declarer {
        Declarer {
            id: "0-declarer".into(),
            level,
            tricks_taken,
        }
    }

    fn whisters(first: (WhistChoice, i32), second: (WhistChoice, i32)) -> [Whister; 2] {
        [
            Whister {
                id: "1-whister".into(),
                choice: first.0,
                tricks_taken: first.1,
            },
            Whister {
                id: "2-whister".into(),
                choice: second.0,
                tricks_taken: second.1,
            },
        ]
    }

    fn entry(dump: i32, pool: i32, whist: i32) -> DealScoreEntry {
        DealScoreEntry { dump, pool, whist }
    }

    #[test]
    fn level_from_bid_prefix() {
        use ContractLevel::*;
        assert_eq!(ContractLevel::from_bid("6♠"), Some(Six));
        assert_eq!(ContractLevel::from_bid("7"), Some(Seven));
        assert_eq!(ContractLevel::from_bid("9 WT"), Some(Nine));
        assert_eq!(ContractLevel::from_bid("10♥"), Some(Ten));
        assert_eq!(ContractLevel::from_bid("Misère"), Some(Miser));
        assert_eq!(ContractLevel::from_bid("Mis.WT"), Some(Miser));
        assert_eq!(ContractLevel::from_bid("Pass"), None);
        assert_eq!(ContractLevel::from_bid(""), None);
    }

    #[test]
    fn miser_sweep() {
        // declarer tricks -> (dump, pool); whisters always score nothing
        for (tricks, dump, pool) in [
            (0, 0, 10),
            (1, 10, 0),
            (2, 20, 0),
            (5, 50, 0),
            (10, 100, 0),
        ] {
            let scores = deal_score(
                &declarer(ContractLevel::Miser, tricks),
                &whisters((WhistChoice::Whist, 10 - tricks), (WhistChoice::Whist, 0)),
            );
            assert_eq!(scores["0-declarer"], entry(dump, pool, 0));
            assert_eq!(scores["1-whister"], entry(0, 0, 0));
            assert_eq!(scores["2-whister"], entry(0, 0, 0));
        }
    }

    #[test]
    fn everyone_fulfilled_what_they_declared() {
        use ContractLevel::*;
        for (level, declarer_tricks, w1, w2, whist1, whist2, pool) in [
            (Six, 6, 2, 2, 2 * 2, 2 * 2, 2),
            (Seven, 7, 1, 2, 1 * 4, 2 * 4, 4),
            (Eight, 8, 1, 1, 1 * 6, 1 * 6, 6),
            (Nine, 9, 1, 0, 1 * 8, 0 * 8, 8),
        ] {
            let scores = deal_score(
                &declarer(level, declarer_tricks),
                &whisters((WhistChoice::Whist, w1), (WhistChoice::Whist, w2)),
            );
            assert_eq!(scores["0-declarer"], entry(0, pool, 0));
            assert_eq!(scores["1-whister"], entry(0, 0, whist1));
            assert_eq!(scores["2-whister"], entry(0, 0, whist2));
        }
    }

    #[test]
    fn declarer_busts() {
        use ContractLevel::*;
        // five tricks taken against every level; whisters took 3 and 2
        for (level, dump, whist1, whist2) in [
            (Six, 2, (3 * 2) + 2, (2 * 2) + 2),
            (Seven, 2 * 4, (3 * 4) + (2 * 4), (2 * 4) + (2 * 4)),
            (Eight, 3 * 6, (3 * 6) + (3 * 6), (2 * 6) + (3 * 6)),
            (Nine, 4 * 8, (3 * 8) + (4 * 8), (2 * 8) + (4 * 8)),
            (Ten, 5 * 10, (3 * 10) + (5 * 10), (2 * 10) + (5 * 10)),
        ] {
            let scores = deal_score(
                &declarer(level, 5),
                &whisters((WhistChoice::Whist, 3), (WhistChoice::Whist, 2)),
            );
            assert_eq!(scores["0-declarer"], entry(dump, 0, 0));
            assert_eq!(scores["1-whister"], entry(0, 0, whist1));
            assert_eq!(scores["2-whister"], entry(0, 0, whist2));
        }
    }

    #[test]
    fn lone_whister_misses_the_required_tricks() {
        use ContractLevel::*;
        // declarer sweeps all ten; the whisting whister alone owes the
        // two-whister quota
        for (level, pool, dump1) in [
            (Six, 2, 4 * 2),
            (Seven, 4, 2 * 4),
            (Eight, 6, 1 * 6),
            (Nine, 8, 1 * 8),
            (Ten, 10, 1 * 10),
        ] {
            let scores = deal_score(
                &declarer(level, 10),
                &whisters((WhistChoice::Whist, 0), (WhistChoice::Pass, 0)),
            );
            assert_eq!(scores["0-declarer"], entry(0, pool, 0));
            assert_eq!(scores["1-whister"], entry(dump1, 0, 0));
            assert_eq!(scores["2-whister"], entry(0, 0, 0));
        }
    }

    #[test]
    fn both_whisters_miss_the_required_tricks() {
        use ContractLevel::*;
        for (level, pool, dump) in [
            (Six, 2, 2 * 2),
            (Seven, 4, 1 * 4),
            (Eight, 6, 1 * 6),
            (Nine, 8, 1 * 8),
            (Ten, 10, 1 * 10),
        ] {
            let scores = deal_score(
                &declarer(level, 10),
                &whisters((WhistChoice::Whist, 0), (WhistChoice::Whist, 0)),
            );
            assert_eq!(scores["0-declarer"], entry(0, pool, 0));
            assert_eq!(scores["1-whister"], entry(dump, 0, 0));
            assert_eq!(scores["2-whister"], entry(dump, 0, 0));
        }
    }

    #[test]
    fn half_whist_pays_half_the_quota() {
        let scores = deal_score(
            &declarer(ContractLevel::Six, 6),
            &whisters((WhistChoice::Pass, 0), (WhistChoice::HalfWhist, 0)),
        );
        assert_eq!(scores["0-declarer"], entry(0, 2, 0));
        assert_eq!(scores["1-whister"], entry(0, 0, 0));
        // (two_whisters_required * price) / 2 with a truncating divide
        assert_eq!(scores["2-whister"], entry(0, 0, (4 * 2) / 2));
    }

    fn sheet_entry(dump: &[i32], pool: &[i32], whists: &[(&str, &[i32])]) -> Score {
        Score {
            dump: dump.to_vec(),
            pool: pool.to_vec(),
            whists: whists
                .iter()
                .map(|(other_id, values)| (other_id.to_string(), values.to_vec()))
                .collect(),
        }
    }

    #[test]
    fn final_score_sums_every_column() {
        let sheet = ScoreSheet::from([
            (
                "p0".to_string(),
                sheet_entry(&[1, 2, 3], &[4, 5, 6], &[("p1", &[7, 8, 9]), ("p2", &[10, 11, 12])]),
            ),
            (
                "p1".to_string(),
                sheet_entry(&[13, 14, 15], &[16, 17, 18], &[("p0", &[19, 20, 21]), ("p2", &[22, 23, 24])]),
            ),
            (
                "p2".to_string(),
                sheet_entry(&[25, 26, 27], &[28, 29, 30], &[("p0", &[31, 32, 33]), ("p1", &[34, 35, 36])]),
            ),
        ]);
        let totals = final_score(&sheet);
        assert_eq!(totals["p0"].dump, 6);
        assert_eq!(totals["p0"].pool, 15);
        assert_eq!(totals["p0"].whists["p1"], 24);
        assert_eq!(totals["p0"].whists["p2"], 33);
        assert_eq!(totals["p1"].dump, 42);
        assert_eq!(totals["p1"].pool, 51);
        assert_eq!(totals["p1"].whists["p0"], 60);
        assert_eq!(totals["p2"].whists["p1"], 105);
    }

    fn totals(dump: i32, pool: i32, whists: &[(&str, i32)]) -> FinalScoreEntry {
        FinalScoreEntry {
            dump,
            pool,
            whists: whists
                .iter()
                .map(|(other_id, value)| (other_id.to_string(), *value))
                .collect(),
        }
    }

    #[test]
    fn settlement_of_a_filled_sheet() {
        let result = final_result(FinalScore::from([
            ("p0".to_string(), totals(12, 14, &[("p1", 12), ("p2", 0)])),
            ("p1".to_string(), totals(26, 8, &[("p0", 22), ("p2", 0)])),
            ("p2".to_string(), totals(6, 0, &[("p0", 22), ("p1", 4)])),
        ]));
        assert_eq!(result["p0"], 62);
        assert_eq!(result["p1"], -101);
        assert_eq!(result["p2"], 39);
        assert_eq!(result.values().sum::<i32>(), 0);
    }

    #[test]
    fn settlement_of_a_sparse_sheet() {
        let result = final_result(FinalScore::from([
            ("p0".to_string(), totals(2, 0, &[])),
            ("p1".to_string(), totals(0, 0, &[("p0", 4)])),
            ("p2".to_string(), totals(0, 0, &[("p0", 10)])),
        ]));
        assert_eq!(result["p0"], -28);
        assert_eq!(result["p1"], 11);
        assert_eq!(result["p2"], 17);
        assert_eq!(result.values().sum::<i32>(), 0);
    }

    #[test]
    fn settlement_with_large_mutual_whists() {
        let result = final_result(FinalScore::from([
            ("p0".to_string(), totals(0, 2, &[("p1", 110), ("p2", 14)])),
            ("p1".to_string(), totals(62, 0, &[("p0", 2), ("p2", 12)])),
            ("p2".to_string(), totals(6, 0, &[("p0", 4), ("p1", 70)])),
        ]));
        assert_eq!(result["p0"], 359);
        assert_eq!(result["p1"], -567);
        assert_eq!(result["p2"], 208);
        assert_eq!(result.values().sum::<i32>(), 0);
    }

    #[test]
    fn settlement_is_zero_sum_for_arbitrary_sheets() {
        // a handful of uneven fixtures, all must net out to zero
        let fixtures = [
            [(5, 0), (0, 7), (13, 2)],
            [(1, 1), (2, 2), (3, 3)],
            [(0, 0), (0, 0), (17, 9)],
            [(40, 3), (11, 0), (7, 21)],
        ];
        for fixture in fixtures {
            let result = final_result(FinalScore::from([
                ("p0".to_string(), totals(fixture[0].0, fixture[0].1, &[])),
                ("p1".to_string(), totals(fixture[1].0, fixture[1].1, &[])),
                ("p2".to_string(), totals(fixture[2].0, fixture[2].1, &[])),
            ]));
            assert_eq!(result.values().sum::<i32>(), 0, "fixture {fixture:?}");
        }
    }

    #[test]
    fn settlement_of_an_empty_sheet() {
        assert!(final_result(FinalScore::new()).is_empty());
    }
}
