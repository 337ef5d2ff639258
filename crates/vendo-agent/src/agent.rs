//! The agent loop: concurrent heartbeats plus single-flight card handling.

use std::time::Duration;

use anyhow::Context;
use tracing::{info, warn};

use crate::client::{HeartbeatAck, ServerClient};
use crate::hardware::{CardReader, DispenseOutcome, Dispenser};
use crate::AgentError;

/// How one presented card was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanOutcome {
    /// Usage recorded and the item dispensed.
    Dispensed,
    /// Usage recorded but the physical dispense failed.
    DispenseFailed,
    /// Token unknown to the server.
    NotRegistered,
    /// Token exists but usage permission is off.
    NotAllowed,
    /// Allotment spent, or a concurrent usage won the last unit of stock.
    NoStock,
    /// Server call failed; nothing was accounted.
    ServerUnavailable,
}

/// Unit-side agent. One per physical unit.
pub struct UnitAgent {
    client: ServerClient,
    reader: Box<dyn CardReader>,
    dispenser: Box<dyn Dispenser>,
    heartbeat_interval: Duration,
}

impl UnitAgent {
    pub fn new(
        client: ServerClient,
        reader: Box<dyn CardReader>,
        dispenser: Box<dyn Dispenser>,
        heartbeat_interval: Duration,
    ) -> Self {
        Self {
            client,
            reader,
            dispenser,
            heartbeat_interval,
        }
    }

    /// Run the agent until the process is stopped.
    ///
    /// An unreachable server is fatal at startup only; once running, every
    /// failure is logged and the loop continues.
    pub async fn run(mut self) -> anyhow::Result<()> {
        self.client
            .check_health()
            .await
            .context("server unreachable at startup")?;
        info!("server connection verified");

        tokio::spawn(heartbeat_loop(
            self.client.clone(),
            self.heartbeat_interval,
        ));

        loop {
            let card_id = match self.reader.wait_for_card().await {
                Ok(card_id) => card_id,
                Err(e) => {
                    warn!(error = %e, "card reader failure");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    continue;
                }
            };

            // One card at a time: a second tap during handling is simply
            // not read until this one is resolved.
            let outcome = self.handle_card(&card_id).await;
            info!(card_id = %card_id, outcome = ?outcome, "scan resolved");
        }
    }

    /// Resolve one presented card: eligibility check, usage recording,
    /// physical dispense. Never returns an error; every failure path is a
    /// [`ScanOutcome`] so the loop always continues.
    pub async fn handle_card(&mut self, card_id: &str) -> ScanOutcome {
        let user = match self.client.fetch_user(card_id).await {
            Ok(user) => user,
            Err(AgentError::NotFound { .. }) => {
                self.log_remote(&format!("unregistered card rejected ({card_id})"))
                    .await;
                return ScanOutcome::NotRegistered;
            }
            Err(e) => {
                warn!(card_id = %card_id, error = %e, "card lookup failed");
                return ScanOutcome::ServerUnavailable;
            }
        };

        if !user.allowed {
            self.log_remote(&format!("disallowed card rejected ({card_id})"))
                .await;
            return ScanOutcome::NotAllowed;
        }
        if user.stock <= 0 {
            self.log_remote(&format!("no stock remaining ({card_id})"))
                .await;
            return ScanOutcome::NoStock;
        }

        match self.client.record_usage(card_id).await {
            Ok(()) => {}
            Err(AgentError::NoStock { .. }) => {
                // Lost a race for the last unit of stock since the lookup
                self.log_remote(&format!("no stock remaining ({card_id})"))
                    .await;
                return ScanOutcome::NoStock;
            }
            Err(AgentError::NotFound { .. }) => {
                self.log_remote(&format!("unregistered card rejected ({card_id})"))
                    .await;
                return ScanOutcome::NotRegistered;
            }
            Err(e) => {
                warn!(card_id = %card_id, error = %e, "usage recording failed");
                return ScanOutcome::ServerUnavailable;
            }
        }

        match self.dispenser.dispense().await {
            DispenseOutcome::Success => {
                self.log_remote("dispense complete").await;
                ScanOutcome::Dispensed
            }
            DispenseOutcome::Failure => {
                self.log_remote(&format!("dispense failed after usage recorded ({card_id})"))
                    .await;
                ScanOutcome::DispenseFailed
            }
        }
    }

    /// Forward a line to the server's audit log; failures are only warned.
    async fn log_remote(&self, message: &str) {
        if let Err(e) = self.client.send_log(message).await {
            warn!(error = %e, message = %message, "log forwarding failed");
        }
    }
}

/// Background heartbeat task: one beat per interval, failures logged and
/// retried on the next tick. Runs detached from the scan loop so a slow
/// dispense cycle never starves liveness.
pub async fn heartbeat_loop(client: ServerClient, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        match client.heartbeat().await {
            Ok(HeartbeatAck::Registered) => info!("auto-registered with the server"),
            Ok(HeartbeatAck::Accepted) => {}
            Err(e) if e.is_transient() => warn!(error = %e, "heartbeat failed, will retry"),
            Err(e) => warn!(error = %e, "heartbeat rejected"),
        }
    }
}
