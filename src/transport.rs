//! The inbound side of the RPC transport: a bare-bones hyper server that
//! routes the three Paxos RPC kinds to the store's acceptor handlers. The
//! wire format and transport are explicitly out of scope for the core
//! protocol; this is one reasonable choice among many, kept
//! deliberately small.

use crate::protocol::{
    AcceptRequest, DecidedRequest, PrepareRequest, ACCEPT_ENDPOINT, DECIDED_ENDPOINT,
    PREPARE_ENDPOINT,
};
use crate::store::Store;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use hyper_util::server::conn::http1;
use rand::Rng;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

/// The probability with which an unreliable transport drops a single
/// inbound request or outbound reply.
const DROP_PROBABILITY: f64 = 1.0 / 3.0;

/// How often the accept loop wakes up on its own to notice `Kill`, even
/// with no inbound connections to prompt it.
const DEATH_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Binds a listener for `addr` and starts serving the acceptor's RPC
/// endpoints in the background. Returns the address actually bound to,
/// which differs from `addr` when the caller asked for an ephemeral port
/// (port 0), as the test suite does.
pub async fn serve(store: Arc<Store>, addr: SocketAddr, unreliable: bool) -> io::Result<SocketAddr> {
    let listener = TcpListener::bind(addr).await?;
    let local_addr = listener.local_addr()?;

    tokio::spawn(async move {
        loop {
            if store.is_dead() {
                // Release the transport endpoint entirely.
                break;
            }

            let accepted = tokio::select! {
                result = listener.accept() => result,
                () = tokio::time::sleep(DEATH_POLL_INTERVAL) => continue,
            };
            let (stream, _) = match accepted {
                Ok(pair) => pair,
                Err(error) => {
                    warn!("Failed to accept an inbound connection: {}", error);
                    continue;
                }
            };

            if store.is_dead() {
                drop(stream);
                break;
            }

            let store = store.clone();
            tokio::spawn(async move {
                let io = TokioIo::new(stream);
                let service = service_fn(move |request| {
                    let store = store.clone();
                    async move { handle(store, request, unreliable).await }
                });
                if let Err(error) = http1::Builder::new().serve_connection(io, service).await {
                    debug!("Connection error: {}", error);
                }
            });
        }
    });

    Ok(local_addr)
}

async fn handle(
    store: Arc<Store>,
    request: Request<Incoming>,
    unreliable: bool,
) -> io::Result<Response<Full<Bytes>>> {
    if store.is_dead() {
        return Err(io::Error::new(io::ErrorKind::ConnectionAborted, "peer is dead"));
    }

    if unreliable && drop_roll() {
        debug!("Unreliable mode: dropping an inbound request.");
        return Err(io::Error::new(io::ErrorKind::ConnectionAborted, "dropped"));
    }

    let path = request.uri().path().to_owned();
    let body = request
        .into_body()
        .collect()
        .await
        .map_err(|error| io::Error::new(io::ErrorKind::InvalidData, error))?
        .to_bytes();

    let reply_bytes = match path.as_str() {
        PREPARE_ENDPOINT => dispatch(&body, |request: PrepareRequest| store.prepare(&request)),
        ACCEPT_ENDPOINT => dispatch(&body, |request: AcceptRequest| store.accept(&request)),
        DECIDED_ENDPOINT => dispatch(&body, |request: DecidedRequest| store.decided(&request)),
        _ => None,
    };

    let Some(reply_bytes) = reply_bytes else {
        return Ok(Response::builder()
            .status(StatusCode::BAD_REQUEST)
            .body(Full::new(Bytes::new()))
            .unwrap());
    };

    if unreliable && drop_roll() {
        debug!("Unreliable mode: dropping an outbound reply.");
        return Err(io::Error::new(io::ErrorKind::ConnectionAborted, "dropped"));
    }

    Ok(Response::new(Full::new(Bytes::from(reply_bytes))))
}

fn dispatch<Req, Resp>(body: &Bytes, handler: impl FnOnce(Req) -> Resp) -> Option<Vec<u8>>
where
    Req: serde::de::DeserializeOwned,
    Resp: serde::Serialize,
{
    let request: Req = bincode::deserialize(body).ok()?;
    bincode::serialize(&handler(request)).ok()
}

fn drop_roll() -> bool {
    rand::rng().random_bool(DROP_PROBABILITY)
}
