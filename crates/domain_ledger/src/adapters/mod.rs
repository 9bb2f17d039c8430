//! Adapters for services outside the ledger

pub mod remote_funding;

pub use remote_funding::{HttpRemoteFundingAdapter, RemoteFundingConfig};
