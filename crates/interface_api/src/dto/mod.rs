//! Request/response bodies
//!
//! Field names are camelCase on the wire.

pub mod accounts;
pub mod history;
pub mod operations;
