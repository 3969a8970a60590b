use crate::error::{SessionError, SessionResult};
use crate::types::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// What a voting window decides
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VoteStage {
    TaskReview,
    Elimination,
    Overtime,
    NightAction(NightStep),
    Antagonist,
}

impl VoteStage {
    /// Stages decided by YES/NO rather than by naming a participant
    pub fn is_yes_no(&self) -> bool {
        matches!(self, VoteStage::TaskReview | VoteStage::Overtime)
    }

    /// Night stages: who may vote gives the voters' roles away
    pub fn is_secret(&self) -> bool {
        matches!(self, VoteStage::NightAction(_) | VoteStage::Antagonist)
    }
}

/// Identity of one voting window. A resolution names the window it resolves,
/// so a late or repeated resolution for a closed window is rejected.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct VoteWindowKey {
    pub round: u32,
    pub stage: VoteStage,
    pub review_index: usize,
    pub attempt: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", content = "target", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VoteValue {
    Yes,
    No,
    Target(ParticipantId),
}

impl VoteValue {
    /// Value stored under `rooms/{code}/votes/{id}`
    pub fn as_store_value(&self) -> String {
        match self {
            VoteValue::Yes => "YES".to_string(),
            VoteValue::No => "NO".to_string(),
            VoteValue::Target(id) => id.clone(),
        }
    }

    pub fn target(&self) -> Option<&ParticipantId> {
        match self {
            VoteValue::Target(id) => Some(id),
            _ => None,
        }
    }
}

/// One open collection of votes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoteWindow {
    pub key: VoteWindowKey,
    pub eligible: BTreeSet<ParticipantId>,
    pub votes: BTreeMap<ParticipantId, VoteValue>,
}

impl VoteWindow {
    pub fn new(key: VoteWindowKey, eligible: BTreeSet<ParticipantId>) -> Self {
        Self {
            key,
            eligible,
            votes: BTreeMap::new(),
        }
    }

    /// Record a vote, replacing any earlier vote by the same participant.
    /// Returns true when this overwrote a previous vote.
    pub fn record(&mut self, voter: &str, value: VoteValue) -> SessionResult<bool> {
        if !self.eligible.contains(voter) {
            return Err(SessionError::NotEligible(voter.to_string()));
        }
        Ok(self.votes.insert(voter.to_string(), value).is_some())
    }

    /// Every eligible participant has voted
    pub fn is_complete(&self) -> bool {
        !self.eligible.is_empty() && self.eligible.iter().all(|id| self.votes.contains_key(id))
    }

    pub fn has_voted(&self, voter: &str) -> bool {
        self.votes.contains_key(voter)
    }
}

/// Count YES and NO votes
pub fn count_yes_no(votes: &BTreeMap<ParticipantId, VoteValue>) -> (usize, usize) {
    votes.values().fold((0, 0), |(yes, no), v| match v {
        VoteValue::Yes => (yes + 1, no),
        VoteValue::No => (yes, no + 1),
        VoteValue::Target(_) => (yes, no),
    })
}

/// Task review: strict majority of YES over NO, ties are rejected
pub fn tally_task(votes: &BTreeMap<ParticipantId, VoteValue>) -> ReviewVerdict {
    let (yes, no) = count_yes_no(votes);
    if yes > no {
        ReviewVerdict::Approved
    } else {
        ReviewVerdict::Rejected
    }
}

/// Votes received per target
pub fn tally_targets(votes: &BTreeMap<ParticipantId, VoteValue>) -> BTreeMap<ParticipantId, u32> {
    let mut counts: BTreeMap<ParticipantId, u32> = BTreeMap::new();
    for target in votes.values().filter_map(VoteValue::target) {
        *counts.entry(target.clone()).or_insert(0) += 1;
    }
    counts
}

/// Target with the most votes. Among tied targets the smallest identity wins.
pub fn plurality(counts: &BTreeMap<ParticipantId, u32>) -> Option<ParticipantId> {
    let mut best: Option<(&ParticipantId, u32)> = None;
    // BTreeMap iterates in ascending identity order, so only a strictly
    // higher count may replace the current best
    for (target, &count) in counts {
        match best {
            Some((_, best_count)) if count <= best_count => {}
            _ => best = Some((target, count)),
        }
    }
    best.map(|(target, _)| target.clone())
}

/// Target whose votes exceed half of `voters`, if any
pub fn majority_target(counts: &BTreeMap<ParticipantId, u32>, voters: usize) -> Option<ParticipantId> {
    counts
        .iter()
        .find(|(_, &count)| count as usize * 2 > voters)
        .map(|(target, _)| target.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn yes_no(yes: usize, no: usize) -> BTreeMap<ParticipantId, VoteValue> {
        let mut votes = BTreeMap::new();
        for i in 0..yes {
            votes.insert(format!("y{}", i), VoteValue::Yes);
        }
        for i in 0..no {
            votes.insert(format!("n{}", i), VoteValue::No);
        }
        votes
    }

    fn targets(picks: &[(&str, &str)]) -> BTreeMap<ParticipantId, VoteValue> {
        picks
            .iter()
            .map(|(voter, target)| (voter.to_string(), VoteValue::Target(target.to_string())))
            .collect()
    }

    #[test]
    fn test_task_vote_strict_majority() {
        assert_eq!(tally_task(&yes_no(4, 3)), ReviewVerdict::Approved);
        assert_eq!(tally_task(&yes_no(3, 3)), ReviewVerdict::Rejected);
        assert_eq!(tally_task(&yes_no(0, 0)), ReviewVerdict::Rejected);
        assert_eq!(tally_task(&yes_no(1, 0)), ReviewVerdict::Approved);
    }

    #[test]
    fn test_task_vote_exhaustive_small_counts() {
        for yes in 0..=8 {
            for no in 0..=(8 - yes) {
                let expected = if yes > no {
                    ReviewVerdict::Approved
                } else {
                    ReviewVerdict::Rejected
                };
                assert_eq!(tally_task(&yes_no(yes, no)), expected, "yes={yes} no={no}");
            }
        }
    }

    #[test]
    fn test_plurality_tie_picks_smallest_identity() {
        // P1:3, P2:3, P3:1
        let votes = targets(&[
            ("a", "P2"),
            ("b", "P2"),
            ("c", "P2"),
            ("d", "P1"),
            ("e", "P1"),
            ("f", "P1"),
            ("g", "P3"),
        ]);
        let counts = tally_targets(&votes);
        assert_eq!(counts.get("P1"), Some(&3));
        assert_eq!(counts.get("P2"), Some(&3));
        assert_eq!(plurality(&counts), Some("P1".to_string()));
    }

    #[test]
    fn test_plurality_clear_winner() {
        let votes = targets(&[("a", "P3"), ("b", "P3"), ("c", "P1")]);
        assert_eq!(plurality(&tally_targets(&votes)), Some("P3".to_string()));
        assert_eq!(plurality(&BTreeMap::new()), None);
    }

    #[test]
    fn test_majority_needs_more_than_half() {
        let votes = targets(&[("a", "P1"), ("b", "P2")]);
        assert_eq!(majority_target(&tally_targets(&votes), 2), None);

        let votes = targets(&[("a", "P1"), ("b", "P1")]);
        assert_eq!(majority_target(&tally_targets(&votes), 3), Some("P1".to_string()));

        let votes = targets(&[("a", "P1")]);
        assert_eq!(majority_target(&tally_targets(&votes), 1), Some("P1".to_string()));
    }

    #[test]
    fn test_window_records_revote_and_rejects_outsiders() {
        let key = VoteWindowKey {
            round: 1,
            stage: VoteStage::TaskReview,
            review_index: 0,
            attempt: 0,
        };
        let eligible: BTreeSet<_> = ["a", "b"].iter().map(|s| s.to_string()).collect();
        let mut window = VoteWindow::new(key, eligible);

        assert_eq!(window.record("a", VoteValue::Yes), Ok(false));
        assert_eq!(window.record("a", VoteValue::No), Ok(true));
        assert!(!window.is_complete());
        assert_eq!(
            window.record("z", VoteValue::Yes),
            Err(SessionError::NotEligible("z".to_string()))
        );

        window.record("b", VoteValue::No).unwrap();
        assert!(window.is_complete());
        assert_eq!(window.votes.get("a"), Some(&VoteValue::No));
    }

    #[test]
    fn test_store_value_mapping() {
        assert_eq!(VoteValue::Yes.as_store_value(), "YES");
        assert_eq!(VoteValue::No.as_store_value(), "NO");
        assert_eq!(VoteValue::Target("x".to_string()).as_store_value(), "x");
    }
}
