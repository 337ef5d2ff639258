//! Coordinator server: HTTP surface over the vendo ledger.
//!
//! The binary in `main.rs` wires configuration and logging around
//! [`api::router`]; everything request-shaped lives in [`api`].

pub mod api;
