//! End-to-end scenarios exercising real in-process peers over the actual
//! hyper transport, bound to ephemeral `127.0.0.1` ports. These mirror the
//! literal scenarios in `spec.md` §8 and a few supplemental cases pulled
//! from the MIT 6.824 Paxos lab's own test suite that the distilled spec
//! dropped (see `DESIGN.md`).

use paxos_core::{Peer, RuntimeOptions};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::Duration;

fn ephemeral_addrs(n: usize) -> Vec<SocketAddr> {
    (0..n)
        .map(|_| SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0)))
        .collect()
}

async fn make_cluster(n: usize, options: RuntimeOptions) -> Vec<Peer> {
    let addrs = ephemeral_addrs(n);
    let mut peers = Vec::with_capacity(n);
    for me in 0..n {
        peers.push(
            Peer::make(addrs.clone(), me, options.clone())
                .await
                .expect("peer should bind an ephemeral port"),
        );
    }
    peers
}

/// How many peers currently report `seq` decided, panicking if any two
/// disagree on the value.
fn ndecided(peers: &[Peer], seq: u64) -> usize {
    let mut count = 0;
    let mut agreed_value: Option<Vec<u8>> = None;
    for peer in peers {
        if let (true, Some(value)) = peer.get(seq) {
            if let Some(existing) = &agreed_value {
                assert_eq!(
                    existing, &value,
                    "peers disagree on the decided value for seq {seq}"
                );
            } else {
                agreed_value = Some(value);
            }
            count += 1;
        }
    }
    count
}

/// Polls for up to ~5 seconds until at least `wanted` peers report `seq`
/// decided, then asserts the condition actually holds.
async fn wait_n(peers: &[Peer], seq: u64, wanted: usize) {
    for _ in 0..50 {
        if ndecided(peers, seq) >= wanted {
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    let got = ndecided(peers, seq);
    assert!(
        got >= wanted,
        "too few decided for seq {seq}: wanted {wanted}, got {got}"
    );
}

async fn wait_majority(peers: &[Peer], seq: u64) {
    wait_n(peers, seq, peers.len() / 2 + 1).await;
}

/// Asserts that no more than `max` peers have decided `seq`, after giving
/// the cluster a few seconds to (wrongly) make progress if it were going
/// to.
async fn check_max_decided(peers: &[Peer], seq: u64, max: usize) {
    tokio::time::sleep(Duration::from_secs(3)).await;
    let got = ndecided(peers, seq);
    assert!(got <= max, "too many decided for seq {seq}: max {max}, got {got}");
}

fn kill_all(peers: &[Peer]) {
    for peer in peers {
        peer.kill();
    }
}

#[tokio::test]
async fn single_proposer() {
    let peers = make_cluster(3, RuntimeOptions::default()).await;

    peers[0].start(0, b"hello".to_vec());
    wait_n(&peers, 0, peers.len()).await;

    for peer in &peers {
        assert_eq!(peer.get(0), (true, Some(b"hello".to_vec())));
    }

    kill_all(&peers);
}

#[tokio::test]
async fn concurrent_same_value() {
    let peers = make_cluster(3, RuntimeOptions::default()).await;

    for peer in &peers {
        peer.start(1, vec![77]);
    }
    wait_n(&peers, 1, peers.len()).await;

    for peer in &peers {
        assert_eq!(peer.get(1), (true, Some(vec![77])));
    }

    kill_all(&peers);
}

#[tokio::test]
async fn concurrent_different_values() {
    let peers = make_cluster(3, RuntimeOptions::default()).await;

    peers[0].start(2, vec![100]);
    peers[1].start(2, vec![101]);
    peers[2].start(2, vec![102]);
    wait_n(&peers, 2, peers.len()).await;

    let (_, first) = peers[0].get(2);
    let winner = first.expect("instance 2 should be decided");
    assert!([vec![100], vec![101], vec![102]].contains(&winner));
    for peer in &peers {
        assert_eq!(peer.get(2), (true, Some(winner.clone())));
    }

    kill_all(&peers);
}

#[tokio::test]
async fn out_of_order_instances() {
    let peers = make_cluster(3, RuntimeOptions::default()).await;

    peers[0].start(7, vec![70]);
    peers[0].start(6, vec![60]);
    peers[1].start(5, vec![50]);
    wait_n(&peers, 7, peers.len()).await;

    peers[0].start(4, vec![40]);
    peers[1].start(3, vec![30]);
    wait_n(&peers, 6, peers.len()).await;
    wait_n(&peers, 5, peers.len()).await;
    wait_n(&peers, 4, peers.len()).await;
    wait_n(&peers, 3, peers.len()).await;

    assert_eq!(peers[0].max(), 7);

    kill_all(&peers);
}

#[tokio::test]
async fn minority_crash() {
    let peers = make_cluster(5, RuntimeOptions::default()).await;

    peers[0].kill();
    peers[1].kill();

    peers[2].start(1, vec![101]);
    wait_majority(&peers[2..], 1).await;

    let alive = &peers[2..];
    assert_eq!(ndecided(alive, 1), alive.len());

    kill_all(&peers);
}

#[tokio::test]
async fn majority_crash() {
    let peers = make_cluster(5, RuntimeOptions::default()).await;

    peers[0].kill();
    peers[1].kill();
    peers[2].kill();

    peers[3].start(2, vec![102]);
    check_max_decided(&peers, 2, 0).await;

    kill_all(&peers);
}

#[tokio::test]
async fn garbage_collection() {
    let peers = make_cluster(6, RuntimeOptions::default()).await;

    for peer in &peers {
        assert!(peer.min() <= 0, "wrong initial Min()");
    }

    peers[0].start(0, b"00".to_vec());
    peers[1].start(1, b"11".to_vec());
    peers[2].start(2, b"22".to_vec());
    peers[0].start(6, b"66".to_vec());
    peers[1].start(7, b"77".to_vec());

    wait_n(&peers, 0, peers.len()).await;
    for peer in &peers {
        assert_eq!(peer.min(), 0);
    }

    wait_n(&peers, 1, peers.len()).await;
    for peer in &peers {
        assert_eq!(peer.min(), 0);
    }

    for peer in &peers {
        peer.done(0);
    }
    for peer in &peers[1..] {
        peer.done(1);
    }
    for (i, peer) in peers.iter().enumerate() {
        peer.start(8 + u64::try_from(i).unwrap(), b"xx".to_vec());
    }

    let mut all_ok = false;
    for _ in 0..30 {
        all_ok = peers.iter().all(|peer| peer.min() == 1);
        if all_ok {
            break;
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
    assert!(all_ok, "Min() did not advance to 1 after Done()");

    for peer in &peers {
        assert_eq!(peer.get(0), (false, None), "seq 0 should be forgotten");
    }

    kill_all(&peers);
}

#[tokio::test]
async fn minority_proposal_ignored() {
    let peers = make_cluster(3, RuntimeOptions::default()).await;

    peers[0].start(0, vec![1]);
    wait_n(&peers, 0, peers.len()).await;

    // A late, conflicting proposal for an already-decided instance must
    // never flip the decision anywhere.
    peers[1].start(0, vec![2]);
    tokio::time::sleep(Duration::from_millis(300)).await;

    for peer in &peers {
        assert_eq!(peer.get(0), (true, Some(vec![1])));
    }

    kill_all(&peers);
}

#[tokio::test]
async fn many_instances() {
    let peers = make_cluster(3, RuntimeOptions::default()).await;

    const COUNT: u64 = 20;
    for seq in 0..COUNT {
        let proposer = usize::try_from(seq).unwrap() % peers.len();
        peers[proposer].start(seq, seq.to_le_bytes().to_vec());
    }
    for seq in 0..COUNT {
        wait_n(&peers, seq, peers.len()).await;
    }
    for seq in 0..COUNT {
        for peer in &peers {
            assert_eq!(peer.get(seq), (true, Some(seq.to_le_bytes().to_vec())));
        }
    }

    kill_all(&peers);
}

#[tokio::test]
async fn kill_is_idempotent_and_stops_proposing() {
    let peers = make_cluster(3, RuntimeOptions::default()).await;

    peers[0].kill();
    peers[0].kill();
    assert!(peers[0].is_dead());

    peers[0].start(0, vec![9]);
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(peers[0].get(0), (false, None));

    kill_all(&peers);
}

#[tokio::test]
async fn start_below_min_is_a_no_op() {
    let peers = make_cluster(3, RuntimeOptions::default()).await;

    peers[0].start(0, vec![1]);
    wait_n(&peers, 0, peers.len()).await;

    for peer in &peers {
        peer.done(0);
    }
    let mut all_ok = false;
    for _ in 0..30 {
        all_ok = peers.iter().all(|peer| peer.min() == 1);
        if all_ok {
            break;
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
    assert!(all_ok, "Min() should advance to 1");

    peers[1].start(0, vec![2]);
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(peers[1].get(0), (false, None));

    kill_all(&peers);
}

#[tokio::test]
async fn unreliable_transport_still_reaches_agreement() {
    let options = RuntimeOptions {
        unreliable: true,
        rpc_timeout: Duration::from_millis(250),
        backoff_max: Duration::from_millis(100),
    };
    let peers = make_cluster(5, options).await;

    peers[0].start(0, b"lossy".to_vec());
    for _ in 0..100 {
        if ndecided(&peers, 0) >= peers.len() / 2 + 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert!(ndecided(&peers, 0) >= peers.len() / 2 + 1);

    kill_all(&peers);
}
