//! Unit-side agent for the vendo coordinator.
//!
//! Each dispensing unit runs one agent, which:
//!
//! - emits a heartbeat to the server every 30 seconds from a background task
//! - blocks on the card reader, and for each presented token checks
//!   eligibility, records the usage, then triggers the physical dispense
//! - forwards notable events to the server's audit log, best effort
//!
//! The two activities run concurrently and never block each other; a failed
//! server call is logged and retried on the next natural cycle — nothing
//! here is fatal to the agent loop.
//!
//! Physical hardware is opaque to this crate: the card reader and the
//! dispenser are capabilities behind the [`hardware`] traits, with
//! development implementations (stdin reader, logging dispenser) built in.
//!
//! # Configuration
//!
//! | Environment Variable | Description |
//! |---------------------|-------------|
//! | `VENDO_SERVER_URL` | Coordinator base URL (default: `http://127.0.0.1:5000`) |
//! | `VENDO_UNIT_NAME` | Name identifying this unit |
//! | `VENDO_UNIT_PASSWORD` | Credential established at auto-registration |

pub mod agent;
pub mod client;
pub mod config;
pub mod error;
pub mod hardware;

pub use agent::UnitAgent;
pub use client::ServerClient;
pub use config::AgentConfig;
pub use error::AgentError;
