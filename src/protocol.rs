//! The wire protocol: three request/reply RPC kinds, each carrying the
//! sender's and responder's done-watermark alongside its payload.

use crate::proposal::ProposalNumber;
use crate::value::Value;
use serde::{Deserialize, Serialize};

/// The outcome of a `Prepare` or `Accept` at the acceptor. `Forgotten` is
/// returned instead of `Reject` when the instance has already been pruned
/// below the local `Min`; the proposer treats the two identically.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum Status {
    Ok,
    Reject,
    Forgotten,
}

#[derive(Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PrepareRequest {
    pub seq: u64,
    pub proposal: ProposalNumber,
    pub sender: u32,
    pub sender_done: i64,
}

#[derive(Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PrepareResponse {
    pub status: Status,
    pub accepted_proposal: Option<ProposalNumber>,
    pub accepted_value: Option<Value>,
    pub responder: u32,
    pub responder_done: i64,
}

#[derive(Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AcceptRequest {
    pub seq: u64,
    pub proposal: ProposalNumber,
    pub value: Value,
    pub sender: u32,
    pub sender_done: i64,
}

#[derive(Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AcceptResponse {
    pub status: Status,
    pub accepted_proposal: Option<ProposalNumber>,
    pub responder: u32,
    pub responder_done: i64,
}

#[derive(Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DecidedRequest {
    pub seq: u64,
    pub value: Value,
    pub sender: u32,
    pub sender_done: i64,
}

#[derive(Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DecidedResponse {
    pub responder: u32,
    pub responder_done: i64,
}

// RPC endpoint paths.
pub const PREPARE_ENDPOINT: &str = "/prepare";
pub const ACCEPT_ENDPOINT: &str = "/accept";
pub const DECIDED_ENDPOINT: &str = "/decided";
