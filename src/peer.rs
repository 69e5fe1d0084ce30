//! The public façade: `Make`, `Start`, `Get`, `Done`, `Max`, `Min`, `Kill`.

use crate::options::RuntimeOptions;
use crate::proposer;
use crate::rpc::{self, HttpClient};
use crate::store::{GetResult, Store};
use crate::transport;
use crate::value::Value;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;

/// A single peer in a Paxos cluster. Cloning shares the same underlying
/// peer (cheap, `Arc`-backed), which is convenient for handing a peer to
/// multiple callers in the same process, as the test suite does.
#[derive(Clone)]
pub struct Peer {
    store: Arc<Store>,
    client: HttpClient,
    peers: Vec<SocketAddr>,
    options: RuntimeOptions,
    round_counter: Arc<AtomicU64>,
}

impl Peer {
    /// Constructs a peer, binds its RPC server to `peers[me]`, and starts
    /// serving inbound requests in the background. `peers[me]` may use
    /// port 0 to bind an ephemeral port; the address actually bound is
    /// available via [`Peer::local_addr`].
    ///
    /// Corresponds to `Make(peers, me, rpc_server?)`.
    pub async fn make(
        peers: Vec<SocketAddr>,
        me: usize,
        options: RuntimeOptions,
    ) -> io::Result<Peer> {
        let store = Arc::new(Store::new(peers.len(), u32::try_from(me).unwrap_or(u32::MAX)));
        let bound = transport::serve(store.clone(), peers[me], options.unreliable).await?;

        let mut peers = peers;
        peers[me] = bound;

        Ok(Peer {
            store,
            client: rpc::new_client(),
            peers,
            options,
            round_counter: Arc::new(AtomicU64::new(0)),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.peers[self.store.me() as usize]
    }

    /// Requests agreement on `value` for instance `seq`. Asynchronous: it
    /// schedules proposer work and returns immediately without waiting
    /// for a decision.
    ///
    /// A no-op if the peer is dead, `seq` has already been pruned, `seq`
    /// is already decided locally, or a proposer for `seq` is already
    /// running (the earlier call's value wins).
    pub fn start(&self, seq: u64, value: Value) {
        if self.store.is_dead() {
            return;
        }
        self.store.note_seen(seq);
        if self.store.is_forgotten(seq) {
            return;
        }
        if matches!(self.store.get(seq), GetResult::Decided(_)) {
            return;
        }
        if self.store.has_proposer(seq) {
            return;
        }

        let store = self.store.clone();
        let client = self.client.clone();
        let peers = self.peers.clone();
        let options = self.options.clone();
        let round_counter = self.round_counter.clone();

        let handle = tokio::spawn(async move {
            proposer::run(store, client, peers, options, round_counter, seq, value).await;
        });

        self.store.register_proposer(seq, handle);
    }

    /// Returns whether `seq` is decided and, if so, its value. A
    /// `seq` below `Min()` is reported as not decided ("forgotten"), the
    /// same as one that was never started.
    pub fn get(&self, seq: u64) -> (bool, Option<Value>) {
        self.store.note_seen(seq);
        match self.store.get(seq) {
            GetResult::Decided(value) => (true, Some(value)),
            GetResult::Pending | GetResult::Forgotten => (false, None),
        }
    }

    /// Asserts that this peer's client will never `Get` any seq at or
    /// below `seq` again.
    pub fn done(&self, seq: u64) {
        self.store.done(seq);
    }

    /// The largest seq this peer has ever referenced, or -1 if none.
    pub fn max(&self) -> i64 {
        self.store.max()
    }

    /// The smallest seq that has not been pruned.
    pub fn min(&self) -> i64 {
        self.store.min()
    }

    /// Terminates the peer: stops serving inbound RPCs and cancels every
    /// proposer task. Idempotent.
    pub fn kill(&self) {
        self.store.kill();
    }

    pub fn is_dead(&self) -> bool {
        self.store.is_dead()
    }
}
