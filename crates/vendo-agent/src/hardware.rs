//! Hardware capability seams.
//!
//! The physical card reader and dispensing mechanism are external
//! collaborators; the agent only sees these two traits. The built-in
//! implementations cover development on a machine with neither: tokens are
//! typed on stdin and "dispensing" is a log line.

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing::info;

use crate::error::{AgentError, AgentResult};

/// Result of a physical dispense attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispenseOutcome {
    Success,
    Failure,
}

/// Card-presence sensor: blocks until a card is presented, yielding its
/// opaque token.
#[async_trait]
pub trait CardReader: Send {
    async fn wait_for_card(&mut self) -> AgentResult<String>;
}

/// Physical actuation: one dispense cycle, reporting success or failure.
#[async_trait]
pub trait Dispenser: Send {
    async fn dispense(&mut self) -> DispenseOutcome;
}

/// Development reader: each line on stdin is one card token.
pub struct StdinCardReader {
    lines: Lines<BufReader<Stdin>>,
}

impl StdinCardReader {
    pub fn new() -> Self {
        Self {
            lines: BufReader::new(tokio::io::stdin()).lines(),
        }
    }
}

impl Default for StdinCardReader {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CardReader for StdinCardReader {
    async fn wait_for_card(&mut self) -> AgentResult<String> {
        loop {
            let line = self
                .lines
                .next_line()
                .await
                .map_err(|e| AgentError::Reader {
                    message: e.to_string(),
                })?
                .ok_or_else(|| AgentError::Reader {
                    message: "stdin closed".to_string(),
                })?;
            let token = line.trim();
            if !token.is_empty() {
                return Ok(token.to_string());
            }
        }
    }
}

/// Development dispenser: always succeeds, visibly.
#[derive(Debug, Default)]
pub struct LoggingDispenser;

#[async_trait]
impl Dispenser for LoggingDispenser {
    async fn dispense(&mut self) -> DispenseOutcome {
        info!("dispense cycle triggered");
        DispenseOutcome::Success
    }
}
