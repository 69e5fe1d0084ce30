//! Proposal numbers: the totally-ordered, structurally-unique tokens a
//! proposer attaches to each round of Paxos.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// A proposal number. Round takes precedence over the proposing peer's
/// index, so that two proposers who pick the same round never tie: the one
/// with the higher peer index wins the comparison, which is all that's
/// needed to make the numbers totally ordered and structurally unique.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ProposalNumber {
    pub round: u64,
    pub proposer: u32,
}

impl ProposalNumber {
    pub const MIN: ProposalNumber = ProposalNumber {
        round: 0,
        proposer: 0,
    };
}

impl Ord for ProposalNumber {
    fn cmp(&self, other: &Self) -> Ordering {
        self.round
            .cmp(&other.round)
            .then_with(|| self.proposer.cmp(&other.proposer))
    }
}

impl PartialOrd for ProposalNumber {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[cfg(test)]
mod tests {
    use super::ProposalNumber;

    #[test]
    fn round_takes_precedence() {
        let lo = ProposalNumber {
            round: 0,
            proposer: 9,
        };
        let hi = ProposalNumber {
            round: 1,
            proposer: 0,
        };
        assert!(hi > lo);
    }

    #[test]
    fn proposer_breaks_ties() {
        let a = ProposalNumber {
            round: 3,
            proposer: 0,
        };
        let b = ProposalNumber {
            round: 3,
            proposer: 1,
        };
        assert!(b > a);
    }

    #[test]
    fn distinct_peers_never_tie() {
        // For any two distinct (round, proposer) pairs the numbers differ,
        // which is the structural-uniqueness requirement.
        let a = ProposalNumber {
            round: 5,
            proposer: 2,
        };
        let b = ProposalNumber {
            round: 5,
            proposer: 3,
        };
        assert_ne!(a, b);
    }
}
