//! The instance store: the per-peer map from instance number to instance
//! record, the done vector, and the Min/Max/prune machinery. This is the
//! one piece of shared mutable state in the whole peer; every mutation
//! serializes under a single short critical section that is never held
//! across a network call.

use crate::instance::Instance;
use crate::proposal::ProposalNumber;
use crate::protocol::{
    AcceptRequest, AcceptResponse, DecidedRequest, DecidedResponse, PrepareRequest,
    PrepareResponse, Status,
};
use crate::value::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tokio::task::JoinHandle;

struct Inner {
    instances: HashMap<u64, Instance>,
    done: Vec<i64>,
    max_seen: i64,
}

impl Inner {
    fn global_min(&self) -> i64 {
        // `done` always has at least one entry (n_peers >= 1).
        self.done.iter().copied().min().unwrap_or(-1)
    }

    fn prune(&mut self) {
        let cutoff = self.global_min();
        self.instances.retain(|&seq, _| i64::try_from(seq).unwrap_or(i64::MAX) > cutoff);
    }
}

/// The per-peer shared state: instance records, done-watermarks, and the
/// registry of live proposer tasks so pruning or `Kill` can cancel them.
pub struct Store {
    me: u32,
    n_peers: usize,
    inner: Mutex<Inner>,
    proposers: Mutex<HashMap<u64, JoinHandle<()>>>,
    dead: AtomicBool,
}

/// What `Get` observes for an instance: decided with its value, not yet
/// decided, or forgotten because it has been pruned below `Min()`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum GetResult {
    Decided(Value),
    Pending,
    Forgotten,
}

impl Store {
    pub fn new(n_peers: usize, me: u32) -> Self {
        assert!(n_peers > 0, "a Paxos peer needs at least one peer");
        assert!((me as usize) < n_peers, "me must be a valid peer index");
        Store {
            me,
            n_peers,
            inner: Mutex::new(Inner {
                instances: HashMap::new(),
                done: vec![-1; n_peers],
                max_seen: -1,
            }),
            proposers: Mutex::new(HashMap::new()),
            dead: AtomicBool::new(false),
        }
    }

    pub fn me(&self) -> u32 {
        self.me
    }

    pub fn n_peers(&self) -> usize {
        self.n_peers
    }

    pub fn majority(&self) -> usize {
        self.n_peers / 2 + 1
    }

    pub fn is_dead(&self) -> bool {
        self.dead.load(Ordering::SeqCst)
    }

    /// Records that `seq` has been referenced, for `Max()`.
    pub fn note_seen(&self, seq: u64) {
        let mut inner = self.inner.lock().unwrap();
        inner.max_seen = inner.max_seen.max(i64::try_from(seq).unwrap_or(i64::MAX));
    }

    pub fn max(&self) -> i64 {
        self.inner.lock().unwrap().max_seen
    }

    pub fn min(&self) -> i64 {
        self.inner.lock().unwrap().global_min() + 1
    }

    pub fn is_forgotten(&self, seq: u64) -> bool {
        i64::try_from(seq).unwrap_or(i64::MAX) < self.min()
    }

    /// This peer's own done-watermark, for piggybacking on outbound RPCs.
    pub fn done_watermark(&self) -> i64 {
        self.inner.lock().unwrap().done[self.me as usize]
    }

    /// `Done(seq)`: advances this peer's own done-watermark. Does not
    /// contact any other peer.
    pub fn done(&self, seq: u64) {
        {
            let mut inner = self.inner.lock().unwrap();
            let me = self.me as usize;
            inner.done[me] = inner.done[me].max(i64::try_from(seq).unwrap_or(i64::MAX));
            inner.prune();
        }
        self.reap_pruned_proposers();
    }

    /// Updates the view of a peer's done-watermark from a piggybacked RPC
    /// field and prunes anything newly safe.
    fn observe_peer_done(&self, peer: u32, peer_done: i64) {
        {
            let mut inner = self.inner.lock().unwrap();
            let idx = peer as usize;
            if idx < inner.done.len() {
                inner.done[idx] = inner.done[idx].max(peer_done);
            }
            inner.prune();
        }
        self.reap_pruned_proposers();
    }

    pub fn get(&self, seq: u64) -> GetResult {
        self.note_seen(seq);
        if self.is_forgotten(seq) {
            return GetResult::Forgotten;
        }
        let inner = self.inner.lock().unwrap();
        match inner.instances.get(&seq) {
            Some(instance) if instance.is_decided() => {
                GetResult::Decided(instance.decided_value.clone().unwrap())
            }
            _ => GetResult::Pending,
        }
    }

    pub fn prepare(&self, request: &PrepareRequest) -> PrepareResponse {
        self.note_seen(request.seq);
        self.observe_peer_done(request.sender, request.sender_done);

        if self.is_forgotten(request.seq) {
            return self.reply_prepare(Status::Forgotten, None, None);
        }

        let mut inner = self.inner.lock().unwrap();
        let instance = inner.instances.entry(request.seq).or_default();

        let promote = instance
            .min_proposal
            .is_none_or(|n_p| request.proposal > n_p);
        if promote {
            instance.min_proposal = Some(request.proposal);
            let accepted = instance.accepted.clone();
            #[cfg(debug_assertions)]
            instance.check_invariant();
            drop(inner);
            let (n_a, v_a) = accepted.map_or((None, None), |(n, v)| (Some(n), Some(v)));
            self.reply_prepare(Status::Ok, n_a, v_a)
        } else {
            drop(inner);
            self.reply_prepare(Status::Reject, None, None)
        }
    }

    fn reply_prepare(
        &self,
        status: Status,
        accepted_proposal: Option<ProposalNumber>,
        accepted_value: Option<Value>,
    ) -> PrepareResponse {
        let inner = self.inner.lock().unwrap();
        PrepareResponse {
            status,
            accepted_proposal,
            accepted_value,
            responder: self.me,
            responder_done: inner.done[self.me as usize],
        }
    }

    pub fn accept(&self, request: &AcceptRequest) -> AcceptResponse {
        self.note_seen(request.seq);
        self.observe_peer_done(request.sender, request.sender_done);

        if self.is_forgotten(request.seq) {
            return self.reply_accept(Status::Forgotten, None);
        }

        let mut inner = self.inner.lock().unwrap();
        let instance = inner.instances.entry(request.seq).or_default();

        // Note the `>=`, not `>`: a proposer that just prepared with `n`
        // must be able to accept with `n` even if nothing else touched
        // `min_proposal` in between.
        let accept_ok = instance.min_proposal.is_none_or(|n_p| request.proposal >= n_p);
        if accept_ok {
            instance.min_proposal = Some(request.proposal);
            instance.accepted = Some((request.proposal, request.value.clone()));
            #[cfg(debug_assertions)]
            instance.check_invariant();
            let accepted_proposal = instance.min_proposal;
            drop(inner);
            self.reply_accept(Status::Ok, accepted_proposal)
        } else {
            let min_proposal = instance.min_proposal;
            drop(inner);
            self.reply_accept(Status::Reject, min_proposal)
        }
    }

    fn reply_accept(
        &self,
        status: Status,
        accepted_proposal: Option<ProposalNumber>,
    ) -> AcceptResponse {
        let inner = self.inner.lock().unwrap();
        AcceptResponse {
            status,
            accepted_proposal,
            responder: self.me,
            responder_done: inner.done[self.me as usize],
        }
    }

    pub fn decided(&self, request: &DecidedRequest) -> DecidedResponse {
        self.note_seen(request.seq);
        self.observe_peer_done(request.sender, request.sender_done);

        if !self.is_forgotten(request.seq) {
            let mut inner = self.inner.lock().unwrap();
            let instance = inner.instances.entry(request.seq).or_default();
            if let Some(existing) = &instance.decided_value {
                // Two peers must never learn different values for the same seq.
                debug_assert_eq!(
                    existing, &request.value,
                    "agreement violated: conflicting decisions for seq {}",
                    request.seq
                );
            } else {
                instance.decided_value = Some(request.value.clone());
            }
        }

        let inner = self.inner.lock().unwrap();
        DecidedResponse {
            responder: self.me,
            responder_done: inner.done[self.me as usize],
        }
    }

    /// Registers the task driving `seq`'s proposer so it can be cancelled
    /// on pruning or `Kill`. Returns `false` (and does not store the
    /// handle) if one is already registered, matching the "second `Start`
    /// call's value is discarded" rule.
    pub fn register_proposer(&self, seq: u64, handle: JoinHandle<()>) -> bool {
        use std::collections::hash_map::Entry;
        let mut proposers = self.proposers.lock().unwrap();
        match proposers.entry(seq) {
            Entry::Occupied(_) => {
                handle.abort();
                false
            }
            Entry::Vacant(slot) => {
                slot.insert(handle);
                true
            }
        }
    }

    pub fn has_proposer(&self, seq: u64) -> bool {
        self.proposers.lock().unwrap().contains_key(&seq)
    }

    /// Aborts and forgets every proposer task for a pruned instance.
    fn cancel_proposer(&self, seq: u64) {
        if let Some(handle) = self.proposers.lock().unwrap().remove(&seq) {
            handle.abort();
        }
    }

    /// Cancels proposer tasks for instances newly pruned by a done-vector
    /// update. Call after `done`/`observe_peer_done` advances `Min()`.
    pub fn reap_pruned_proposers(&self) {
        let min = self.min();
        let seqs: Vec<u64> = {
            let proposers = self.proposers.lock().unwrap();
            proposers
                .keys()
                .copied()
                .filter(|&seq| i64::try_from(seq).unwrap_or(i64::MAX) < min)
                .collect()
        };
        for seq in seqs {
            self.cancel_proposer(seq);
        }
    }

    /// Terminates the peer: stops accepting inbound RPCs and cancels every
    /// running proposer task. Idempotent.
    pub fn kill(&self) {
        if self.dead.swap(true, Ordering::SeqCst) {
            return;
        }
        let mut proposers = self.proposers.lock().unwrap();
        for (_, handle) in proposers.drain() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{PrepareRequest, Status};

    fn prepare_req(seq: u64, round: u64, proposer: u32) -> PrepareRequest {
        PrepareRequest {
            seq,
            proposal: ProposalNumber { round, proposer },
            sender: proposer,
            sender_done: -1,
        }
    }

    #[test]
    fn prepare_promises_higher_number() {
        let store = Store::new(3, 0);
        let reply = store.prepare(&prepare_req(0, 5, 0));
        assert_eq!(reply.status, Status::Ok);
        assert!(reply.accepted_proposal.is_none());
    }

    #[test]
    fn prepare_rejects_stale_number() {
        let store = Store::new(3, 0);
        store.prepare(&prepare_req(0, 5, 0));
        let reply = store.prepare(&prepare_req(0, 4, 0));
        assert_eq!(reply.status, Status::Reject);
    }

    #[test]
    fn accept_allows_equal_to_prepared_number() {
        let store = Store::new(3, 0);
        store.prepare(&prepare_req(0, 5, 0));
        let reply = store.accept(&AcceptRequest {
            seq: 0,
            proposal: ProposalNumber {
                round: 5,
                proposer: 0,
            },
            value: b"hello".to_vec(),
            sender: 0,
            sender_done: -1,
        });
        assert_eq!(reply.status, Status::Ok);
    }

    #[test]
    fn min_and_prune_track_done_vector() {
        let store = Store::new(3, 0);
        store.decided(&DecidedRequest {
            seq: 0,
            value: b"v".to_vec(),
            sender: 0,
            sender_done: -1,
        });
        assert_eq!(store.min(), 0);
        assert!(matches!(store.get(0), GetResult::Decided(_)));

        store.done(0);
        store.observe_peer_done(1, 0);
        store.observe_peer_done(2, 0);
        assert_eq!(store.min(), 1);
        assert!(matches!(store.get(0), GetResult::Forgotten));
    }

    #[test]
    fn forgotten_below_min() {
        let store = Store::new(3, 0);
        store.done(10);
        store.observe_peer_done(1, 10);
        store.observe_peer_done(2, 10);
        assert_eq!(store.min(), 11);
        let reply = store.prepare(&prepare_req(3, 1, 0));
        assert_eq!(reply.status, Status::Forgotten);
    }

    #[test]
    fn max_tracks_largest_seen() {
        let store = Store::new(3, 0);
        assert_eq!(store.max(), -1);
        store.note_seen(7);
        store.note_seen(3);
        assert_eq!(store.max(), 7);
    }
}
