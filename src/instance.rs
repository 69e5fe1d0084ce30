//! The per-instance acceptor state: the promised and accepted proposal
//! numbers, and the decided value once one exists.

use crate::proposal::ProposalNumber;
use crate::value::Value;

/// One Paxos instance's promise/accept state, plus the learned decision if
/// any. `decided` is terminal: once true it never reverts.
#[derive(Clone, Default)]
pub struct Instance {
    /// Highest proposal number promised (`n_p`).
    pub min_proposal: Option<ProposalNumber>,
    /// Highest proposal number accepted (`n_a`), with the value accepted
    /// alongside it (`v_a`). Always `Some` together.
    pub accepted: Option<(ProposalNumber, Value)>,
    pub decided_value: Option<Value>,
}

impl Instance {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_decided(&self) -> bool {
        self.decided_value.is_some()
    }

    /// `n_p ≥ n_a` whenever `n_a` is set.
    #[cfg(debug_assertions)]
    pub fn check_invariant(&self) {
        if let Some((n_a, _)) = &self.accepted {
            debug_assert!(
                self.min_proposal.is_some_and(|n_p| n_p >= *n_a),
                "acceptor invariant violated: n_p must be >= n_a"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Instance;

    #[test]
    fn fresh_instance_is_undecided() {
        let instance = Instance::new();
        assert!(!instance.is_decided());
        assert!(instance.min_proposal.is_none());
        assert!(instance.accepted.is_none());
    }
}
