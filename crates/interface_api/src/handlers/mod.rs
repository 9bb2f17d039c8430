//! Request handlers

pub mod accounts;
pub mod health;
pub mod history;
pub mod payments;
pub mod transfers;
