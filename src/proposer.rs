//! The proposer: for each instance the local peer is actively driving, a
//! task that runs round-numbered Paxos phases until the instance is
//! decided.

use crate::options::RuntimeOptions;
use crate::proposal::ProposalNumber;
use crate::protocol::{
    AcceptRequest, AcceptResponse, DecidedRequest, DecidedResponse, PrepareRequest,
    PrepareResponse, Status, ACCEPT_ENDPOINT, DECIDED_ENDPOINT, PREPARE_ENDPOINT,
};
use crate::rpc::{self, HttpClient};
use crate::store::{GetResult, Store};
use crate::value::Value;
use futures::stream::{FuturesUnordered, StreamExt};
use rand::Rng;
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Drives `seq` to a decision. Runs until the instance is decided by this
/// task's own success, learned through some other path (an inbound
/// `Decided`, or a piggyback), or the instance is pruned out from under
/// it.
pub async fn run(
    store: Arc<Store>,
    client: HttpClient,
    peers: Vec<SocketAddr>,
    options: RuntimeOptions,
    round_counter: Arc<AtomicU64>,
    seq: u64,
    preferred_value: Value,
) {
    loop {
        if store.is_dead() || store.is_forgotten(seq) {
            return;
        }
        if matches!(store.get(seq), GetResult::Decided(_)) {
            return;
        }

        let round = round_counter.fetch_add(1, Ordering::SeqCst);
        let proposal = ProposalNumber {
            round,
            proposer: store.me(),
        };

        info!(
            "Instance {}: proposing round {} with a preferred value of {} bytes.",
            seq,
            round,
            preferred_value.len()
        );

        let promises = prepare_phase(&store, &client, &options, &peers, seq, proposal).await;
        if promises.len() < store.majority() {
            debug!(
                "Instance {}: round {} failed to reach a prepare quorum.",
                seq, round
            );
            backoff(&options).await;
            continue;
        }

        let value_to_propose = promises
            .into_iter()
            .filter_map(|response| response.accepted_proposal.zip(response.accepted_value))
            .max_by_key(|(accepted_proposal, _)| *accepted_proposal)
            .map_or_else(|| preferred_value.clone(), |(_, value)| value);

        let accepts = accept_phase(
            &store,
            &client,
            &options,
            &peers,
            seq,
            proposal,
            value_to_propose.clone(),
        )
        .await;
        if accepts.len() < store.majority() {
            debug!(
                "Instance {}: round {} failed to reach an accept quorum.",
                seq, round
            );
            backoff(&options).await;
            continue;
        }

        info!("Instance {}: consensus reached; notifying all peers.", seq);
        decided_phase(&store, &client, &options, &peers, seq, value_to_propose);
        return;
    }
}

async fn backoff(options: &RuntimeOptions) {
    let delay = rand::rng().random_range(Duration::ZERO..=options.backoff_max);
    tokio::time::sleep(delay).await;
}

/// Fans a request out to every peer, calling `local` in-process for this
/// peer's own index rather than going over the network.
fn fanout<Req, Resp>(
    client: &HttpClient,
    rpc_timeout: Duration,
    peers: &[SocketAddr],
    me: u32,
    endpoint: &'static str,
    request_for: impl Fn(u32) -> Req,
    local: impl Fn(Req) -> Resp + Clone + Send + 'static,
) -> FuturesUnordered<Pin<Box<dyn Future<Output = Option<Resp>> + Send>>>
where
    Req: serde::Serialize + Send + Sync + 'static,
    Resp: serde::de::DeserializeOwned + Send + 'static,
{
    let futures = FuturesUnordered::new();
    for (index, &addr) in peers.iter().enumerate() {
        let index = u32::try_from(index).unwrap_or(u32::MAX);
        let request = request_for(index);
        if index == me {
            let local = local.clone();
            futures.push(Box::pin(async move { Some(local(request)) })
                as Pin<Box<dyn Future<Output = Option<Resp>> + Send>>);
        } else {
            let client = client.clone();
            futures.push(Box::pin(async move {
                rpc::call::<Req, Resp>(&client, rpc_timeout, addr, endpoint, &request)
                    .await
                    .ok()
            }) as Pin<Box<dyn Future<Output = Option<Resp>> + Send>>);
        }
    }
    futures
}

/// Drains `futures` until either a majority of accepted responses have
/// arrived, or too many peers have rejected/failed for a majority to
/// still be reachable this round.
async fn collect_quorum<Resp: Send + 'static>(
    mut futures: FuturesUnordered<Pin<Box<dyn Future<Output = Option<Resp>> + Send>>>,
    n_peers: usize,
    majority: usize,
    is_accepted: impl Fn(&Resp) -> bool,
) -> Vec<Resp> {
    let mut accepted = Vec::new();
    let mut seen = 0usize;
    while let Some(outcome) = futures.next().await {
        seen += 1;
        if let Some(response) = outcome {
            if is_accepted(&response) {
                accepted.push(response);
            }
        }
        if accepted.len() >= majority {
            break;
        }
        if accepted.len() + (n_peers - seen) < majority {
            break;
        }
    }
    accepted
}

async fn prepare_phase(
    store: &Arc<Store>,
    client: &HttpClient,
    options: &RuntimeOptions,
    peers: &[SocketAddr],
    seq: u64,
    proposal: ProposalNumber,
) -> Vec<PrepareResponse> {
    let me = store.me();
    let sender_done = store.done_watermark();
    let store_for_local = store.clone();
    let futures = fanout(
        client,
        options.rpc_timeout,
        peers,
        me,
        PREPARE_ENDPOINT,
        move |_| PrepareRequest {
            seq,
            proposal,
            sender: me,
            sender_done,
        },
        move |request: PrepareRequest| store_for_local.prepare(&request),
    );
    collect_quorum(
        futures,
        peers.len(),
        store.majority(),
        |response: &PrepareResponse| response.status == Status::Ok,
    )
    .await
}

async fn accept_phase(
    store: &Arc<Store>,
    client: &HttpClient,
    options: &RuntimeOptions,
    peers: &[SocketAddr],
    seq: u64,
    proposal: ProposalNumber,
    value: Value,
) -> Vec<AcceptResponse> {
    let me = store.me();
    let sender_done = store.done_watermark();
    let store_for_local = store.clone();
    let futures = fanout(
        client,
        options.rpc_timeout,
        peers,
        me,
        ACCEPT_ENDPOINT,
        move |_| AcceptRequest {
            seq,
            proposal,
            value: value.clone(),
            sender: me,
            sender_done,
        },
        move |request: AcceptRequest| store_for_local.accept(&request),
    );
    collect_quorum(
        futures,
        peers.len(),
        store.majority(),
        |response: &AcceptResponse| response.status == Status::Ok,
    )
    .await
}

/// Commits the decision locally, then hands each remote peer a redelivery
/// task that keeps retrying `Decided` until it is acknowledged. Unlike the
/// Prepare/Accept rounds, which self-heal through the round loop, there is
/// no other path by which a non-proposing peer learns a seq's decision, so
/// a dropped `Decided` must not be left to chance under the lossy
/// transport: every live peer must eventually learn it (spec.md §8,
/// Majority liveness).
fn decided_phase(
    store: &Arc<Store>,
    client: &HttpClient,
    options: &RuntimeOptions,
    peers: &[SocketAddr],
    seq: u64,
    value: Value,
) {
    let me = store.me();
    store.decided(&DecidedRequest {
        seq,
        value: value.clone(),
        sender: me,
        sender_done: store.done_watermark(),
    });

    for (index, &addr) in peers.iter().enumerate() {
        let index = u32::try_from(index).unwrap_or(u32::MAX);
        if index == me {
            continue;
        }
        let store = store.clone();
        let client = client.clone();
        let options = options.clone();
        let value = value.clone();
        tokio::spawn(async move {
            redeliver_decided(&store, &client, &options, addr, seq, me, value).await;
        });
    }
}

/// Retries one peer's `Decided` RPC until it succeeds, the local peer is
/// killed, or `seq` is pruned locally (at which point the cluster has
/// already moved past needing this peer's acknowledgement).
async fn redeliver_decided(
    store: &Arc<Store>,
    client: &HttpClient,
    options: &RuntimeOptions,
    addr: SocketAddr,
    seq: u64,
    me: u32,
    value: Value,
) {
    loop {
        if store.is_dead() || store.is_forgotten(seq) {
            return;
        }
        let request = DecidedRequest {
            seq,
            value: value.clone(),
            sender: me,
            sender_done: store.done_watermark(),
        };
        let outcome = rpc::call::<DecidedRequest, DecidedResponse>(
            client,
            options.rpc_timeout,
            addr,
            DECIDED_ENDPOINT,
            &request,
        )
        .await;
        if outcome.is_ok() {
            return;
        }
        backoff(options).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn proposal_numbers_increase_monotonically() {
        let counter = AtomicU64::new(0);
        let first = counter.fetch_add(1, Ordering::SeqCst);
        let second = counter.fetch_add(1, Ordering::SeqCst);
        assert!(second > first);
    }
}
