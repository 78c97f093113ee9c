//! notary-rpc
//!
//! JSON-RPC 2.0 server exposing the §6 stable wire command set under the
//! `notary` namespace.

pub mod api;
pub mod server;
pub mod types;

pub use api::{NotaryApiClient, NotaryApiServer};
pub use server::{CashBook, RpcServer, RpcServerState};
pub use types::{
    RpcAccount, RpcItem, RpcOfferRequest, RpcOfferSummary, RpcRecentTrade, RpcTransaction,
};
