//! Ranking & tie-break resolver.
//!
//! Ranks are a pure function of the current result set. Order keys:
//! 1. primary: total score descending (elimination rounds: Pass above Fail);
//!    unscored entries sort last and carry no rank
//! 2. secondary: previously recorded rank, absent ranks sort last
//! 3. tertiary: registration number ascending
//!
//! Equal primary keys share a rank and the next distinct key skips ahead
//! (competition ranking: 1, 1, 3).

use std::cmp::Ordering;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use finjudge_state::{
    EntryId, RegistrationRoundId, RegistrationRoundRecord, RoundResultRecord, Verdict,
};

/// Which results a standings view may show.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    /// Only results whose `is_public` flag is set.
    #[default]
    Public,
    /// Every registration round, scored or not.
    Internal,
}

/// One row of a ranked round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Standing {
    pub registration_round_id: RegistrationRoundId,
    pub entry_id: EntryId,
    pub registration_number: String,
    pub status: Option<Verdict>,
    pub total_score: Option<f64>,
    /// Rank recorded by an earlier computation, used as a tie-break only
    pub previous_rank: Option<u32>,
    pub rank: Option<u32>,
    pub is_public: bool,
}

impl Standing {
    pub fn from_row(row: &RegistrationRoundRecord, result: Option<&RoundResultRecord>) -> Self {
        Self {
            registration_round_id: row.registration_round_id.clone(),
            entry_id: row.entry_id.clone(),
            registration_number: row.registration_number.clone(),
            status: result.and_then(|r| r.status),
            total_score: result.and_then(|r| r.total_score),
            previous_rank: result.and_then(|r| r.rank),
            rank: None,
            is_public: result.map(|r| r.is_public).unwrap_or(false),
        }
    }

    /// Primary ordering key; `None` means unscored.
    pub fn primary_key(&self) -> Option<f64> {
        self.total_score.or(match self.status {
            Some(Verdict::Pass) => Some(1.0),
            Some(Verdict::Fail) => Some(0.0),
            None => None,
        })
    }
}

fn compare(a: &Standing, b: &Standing) -> Ordering {
    let primary = match (a.primary_key(), b.primary_key()) {
        (Some(x), Some(y)) => y.total_cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };
    primary
        .then_with(|| {
            a.previous_rank
                .unwrap_or(u32::MAX)
                .cmp(&b.previous_rank.unwrap_or(u32::MAX))
        })
        .then_with(|| a.registration_number.cmp(&b.registration_number))
}

/// Sort and assign competition ranks.
pub fn rank(mut entries: Vec<Standing>) -> Vec<Standing> {
    entries.sort_by(compare);

    let mut last: Option<(f64, u32)> = None;
    for (idx, entry) in entries.iter_mut().enumerate() {
        entry.rank = match entry.primary_key() {
            None => None,
            Some(key) => {
                let rank = match last {
                    Some((prev, prev_rank)) if prev == key => prev_rank,
                    _ => idx as u32 + 1,
                };
                last = Some((key, rank));
                Some(rank)
            }
        };
    }
    entries
}

/// Build standings for a round from its rows and results.
///
/// `Visibility::Public` drops every entry without a public result.
pub fn standings(
    rows: &[RegistrationRoundRecord],
    results: &[RoundResultRecord],
    visibility: Visibility,
) -> Vec<Standing> {
    let by_id: HashMap<&RegistrationRoundId, &RoundResultRecord> = results
        .iter()
        .map(|r| (&r.registration_round_id, r))
        .collect();
    let entries = rows
        .iter()
        .map(|row| Standing::from_row(row, by_id.get(&row.registration_round_id).copied()))
        .filter(|s| visibility == Visibility::Internal || s.is_public)
        .collect();
    rank(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use finjudge_state::RoundId;

    fn scored(regno: &str, score: Option<f64>) -> Standing {
        Standing {
            registration_round_id: RegistrationRoundId::from(regno),
            entry_id: EntryId::from(regno),
            registration_number: regno.to_string(),
            status: None,
            total_score: score,
            previous_rank: None,
            rank: None,
            is_public: true,
        }
    }

    fn ranks(entries: &[Standing]) -> Vec<(String, Option<u32>)> {
        entries
            .iter()
            .map(|e| (e.registration_number.clone(), e.rank))
            .collect()
    }

    #[test]
    fn ties_share_rank_and_skip() {
        let ranked = rank(vec![
            scored("C", Some(80.0)),
            scored("B", Some(90.0)),
            scored("A", Some(90.0)),
        ]);
        assert_eq!(
            ranks(&ranked),
            vec![
                ("A".to_string(), Some(1)),
                ("B".to_string(), Some(1)),
                ("C".to_string(), Some(3)),
            ]
        );
    }

    #[test]
    fn unscored_sort_last_without_rank() {
        let ranked = rank(vec![scored("001", None), scored("002", Some(50.0))]);
        assert_eq!(ranked[0].registration_number, "002");
        assert_eq!(ranked[0].rank, Some(1));
        assert_eq!(ranked[1].rank, None);
    }

    #[test]
    fn previous_rank_breaks_order_within_tie() {
        let mut a = scored("001", Some(70.0));
        a.previous_rank = Some(4);
        let mut b = scored("002", Some(70.0));
        b.previous_rank = Some(2);
        let ranked = rank(vec![a, b]);
        assert_eq!(ranked[0].registration_number, "002");
        assert_eq!(ranked[0].rank, ranked[1].rank);
    }

    #[test]
    fn pass_ranks_above_fail() {
        let mut fail = scored("001", None);
        fail.status = Some(Verdict::Fail);
        let mut pass = scored("002", None);
        pass.status = Some(Verdict::Pass);
        let ranked = rank(vec![fail, pass]);
        assert_eq!(ranked[0].status, Some(Verdict::Pass));
        assert_eq!(ranked[1].rank, Some(2));
    }

    #[test]
    fn rank_is_pure() {
        let input = vec![
            scored("003", Some(60.0)),
            scored("001", Some(75.5)),
            scored("002", Some(60.0)),
        ];
        assert_eq!(rank(input.clone()), rank(input));
    }

    #[test]
    fn public_view_hides_private_results() {
        let round = RoundId::from("r1");
        let a = RegistrationRoundRecord::new(round.clone(), EntryId::from("a"), "001".to_string());
        let b = RegistrationRoundRecord::new(round.clone(), EntryId::from("b"), "002".to_string());
        let result = RoundResultRecord {
            registration_round_id: a.registration_round_id.clone(),
            round_id: round,
            status: None,
            total_score: Some(88.0),
            score_detail_ids: vec![],
            referee_count: 2,
            rank: Some(1),
            is_public: false,
            finalized_at: chrono::Utc::now(),
            published_at: None,
        };
        let rows = vec![a, b];
        let results = vec![result];
        assert!(standings(&rows, &results, Visibility::Public).is_empty());
        let internal = standings(&rows, &results, Visibility::Internal);
        assert_eq!(internal.len(), 2);
        assert_eq!(internal[0].rank, Some(1));
        assert_eq!(internal[1].rank, None);
    }
}
