//! A library implementing single-decree Paxos, applied independently to
//! an unbounded sequence of numbered instances. Each instance reaches
//! agreement on one immutable value among a fixed set of peers; a client
//! uses this library to propose values and to learn decisions.
//!
//! The public entry point is [`Peer`]: construct one with [`Peer::make`]
//! per process, per cluster member.

#![deny(clippy::all, clippy::pedantic, warnings)]
#![allow(clippy::missing_errors_doc, clippy::module_name_repetitions)]

#[macro_use]
extern crate log;

pub mod config;
mod instance;
pub mod options;
mod peer;
mod proposal;
mod proposer;
mod protocol;
mod rpc;
mod store;
mod transport;
pub mod util;
mod value;

pub use options::RuntimeOptions;
pub use peer::Peer;
pub use proposal::ProposalNumber;
pub use value::Value;
