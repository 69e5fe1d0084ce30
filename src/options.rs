//! Runtime configuration recognised by the library.

use std::time::Duration;

/// Tunables a caller may set when constructing a peer. None of these
/// affect correctness, only timing and (for `unreliable`) whether the
/// transport deliberately misbehaves for testing.
#[derive(Clone, Debug)]
pub struct RuntimeOptions {
    /// Inject random RPC loss, for testing tolerance of a lossy network.
    pub unreliable: bool,
    /// Per-call bound on how long a proposer waits for one RPC to answer.
    pub rpc_timeout: Duration,
    /// Upper bound on the randomised delay between failed Paxos rounds.
    pub backoff_max: Duration,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        RuntimeOptions {
            unreliable: false,
            rpc_timeout: Duration::from_millis(250),
            backoff_max: Duration::from_millis(100),
        }
    }
}
