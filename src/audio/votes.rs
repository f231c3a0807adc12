use std::collections::HashSet;
use tracing::debug;

use super::MemberId;

/// Votos distintos necesarios para saltar una canción ajena.
pub const DEFAULT_SKIP_THRESHOLD: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteOutcome {
    /// Quien pidió la canción la salta sin votación.
    RequesterSkip,
    /// Se alcanzó el umbral; la canción se salta.
    ThresholdReached,
    VoteAdded { count: usize, required: usize },
    /// Voto repetido: informativo, no cambia el conteo.
    AlreadyVoted { count: usize, required: usize },
}

impl VoteOutcome {
    pub fn skips(&self) -> bool {
        matches!(self, VoteOutcome::RequesterSkip | VoteOutcome::ThresholdReached)
    }
}

#[derive(Debug)]
pub struct SkipVoteTracker {
    voters: HashSet<MemberId>,
    threshold: usize,
}

impl SkipVoteTracker {
    pub fn new(threshold: usize) -> Self {
        Self {
            voters: HashSet::new(),
            threshold: threshold.max(1),
        }
    }

    pub fn register_vote(&mut self, voter: MemberId, requester: MemberId) -> VoteOutcome {
        if voter == requester {
            return VoteOutcome::RequesterSkip;
        }

        if !self.voters.insert(voter) {
            return VoteOutcome::AlreadyVoted {
                count: self.voters.len(),
                required: self.threshold,
            };
        }

        let count = self.voters.len();
        debug!("🗳️ Voto para saltar: {}/{}", count, self.threshold);
        if count >= self.threshold {
            VoteOutcome::ThresholdReached
        } else {
            VoteOutcome::VoteAdded {
                count,
                required: self.threshold,
            }
        }
    }

    pub fn reset(&mut self) {
        self.voters.clear();
    }

    pub fn count(&self) -> usize {
        self.voters.len()
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }
}

impl Default for SkipVoteTracker {
    fn default() -> Self {
        Self::new(DEFAULT_SKIP_THRESHOLD)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const REQUESTER: MemberId = MemberId(1);

    #[test]
    fn test_requester_always_forces_skip() {
        let mut votes = SkipVoteTracker::default();
        votes.register_vote(MemberId(2), REQUESTER);
        votes.register_vote(MemberId(3), REQUESTER);
        assert_eq!(votes.register_vote(REQUESTER, REQUESTER), VoteOutcome::RequesterSkip);
        assert_eq!(votes.count(), 2);
    }

    #[test]
    fn test_three_distinct_votes_reach_threshold() {
        let mut votes = SkipVoteTracker::default();
        assert_eq!(
            votes.register_vote(MemberId(2), REQUESTER),
            VoteOutcome::VoteAdded { count: 1, required: 3 }
        );
        assert_eq!(
            votes.register_vote(MemberId(3), REQUESTER),
            VoteOutcome::VoteAdded { count: 2, required: 3 }
        );
        assert_eq!(votes.register_vote(MemberId(4), REQUESTER), VoteOutcome::ThresholdReached);
    }

    #[test]
    fn test_duplicate_vote_does_not_count() {
        let mut votes = SkipVoteTracker::default();
        votes.register_vote(MemberId(2), REQUESTER);
        assert_eq!(
            votes.register_vote(MemberId(2), REQUESTER),
            VoteOutcome::AlreadyVoted { count: 1, required: 3 }
        );
        assert_eq!(votes.count(), 1);
    }

    #[test]
    fn test_reset_clears_votes() {
        let mut votes = SkipVoteTracker::new(2);
        votes.register_vote(MemberId(2), REQUESTER);
        votes.reset();
        assert_eq!(votes.count(), 0);
        assert_eq!(
            votes.register_vote(MemberId(2), REQUESTER),
            VoteOutcome::VoteAdded { count: 1, required: 2 }
        );
    }
}
