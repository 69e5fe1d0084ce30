//! Outbound RPC calls. A single attempt per call, bounded by a timeout;
//! nothing here retries. The proposer's round-based retry is the only
//! retry mechanism.

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::{Method, Request};
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::TokioExecutor;
use serde::{de::DeserializeOwned, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

pub type HttpClient = Client<HttpConnector, Full<Bytes>>;

pub fn new_client() -> HttpClient {
    Client::builder(TokioExecutor::new()).build_http()
}

/// Why an RPC did not produce a usable response. The proposer treats any
/// variant identically: as a non-vote for the current round.
#[derive(Debug)]
pub enum RpcError {
    Timeout,
    Transport,
    Malformed,
}

/// Sends one request and waits for one reply, or gives up after
/// `rpc_timeout`. Never retried here.
pub async fn call<Req, Resp>(
    client: &HttpClient,
    rpc_timeout: Duration,
    addr: SocketAddr,
    endpoint: &str,
    request: &Req,
) -> Result<Resp, RpcError>
where
    Req: Serialize,
    Resp: DeserializeOwned,
{
    let attempt = async {
        let body =
            bincode::serialize(request).map_err(|_| RpcError::Malformed)?;
        let http_request = Request::builder()
            .method(Method::POST)
            .uri(format!("http://{addr}{endpoint}"))
            .body(Full::new(Bytes::from(body)))
            .map_err(|_| RpcError::Transport)?;

        let response = client
            .request(http_request)
            .await
            .map_err(|_| RpcError::Transport)?;

        if !response.status().is_success() {
            return Err(RpcError::Transport);
        }

        let bytes = response
            .into_body()
            .collect()
            .await
            .map_err(|_| RpcError::Transport)?
            .to_bytes();

        bincode::deserialize(&bytes).map_err(|_| RpcError::Malformed)
    };

    match tokio::time::timeout(rpc_timeout, attempt).await {
        Ok(result) => result,
        Err(_) => Err(RpcError::Timeout),
    }
}
