//! Per-cell inbound channel with a single-consumer dispatch loop.
//!
//! Scheduler calls, driver notifications and instructor responses are all
//! posted to the same unbounded channel, so each cell sees them one at a
//! time and in arrival order. Posting never blocks.

use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TryRecvError, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info};

use super::{Cell, CellInput};
use crate::models::CellId;

/// Posting side of a cell's mailbox.
#[derive(Debug, Clone)]
pub struct CellHandle {
    id: CellId,
    sender: UnboundedSender<CellInput>,
}

impl CellHandle {
    /// Cell the handle posts to.
    pub fn id(&self) -> CellId {
        self.id
    }

    /// Posts an input. Returns false when the mailbox is closed.
    pub fn post(&self, input: CellInput) -> bool {
        self.sender.send(input).is_ok()
    }
}

/// Consuming side of a cell's mailbox.
pub struct CellMailbox {
    cell: Arc<dyn Cell>,
    inbox: UnboundedReceiver<CellInput>,
}

impl CellMailbox {
    /// Creates the mailbox of `cell` and its posting handle.
    pub fn new(cell: Arc<dyn Cell>) -> (CellHandle, Self) {
        let (sender, inbox) = mpsc::unbounded_channel();
        let handle = CellHandle {
            id: cell.id(),
            sender,
        };
        (handle, Self { cell, inbox })
    }

    /// The cell served by this mailbox.
    pub fn cell(&self) -> &Arc<dyn Cell> {
        &self.cell
    }

    /// Dispatches inputs until every handle is dropped.
    pub async fn run(mut self) {
        info!(cell = %self.cell.id(), "cell mailbox started");
        while let Some(input) = self.inbox.recv().await {
            self.cell.handle(input);
        }
        info!(cell = %self.cell.id(), "cell mailbox stopped (channel closed)");
    }

    /// Dispatches queued inputs without waiting. Returns how many ran.
    pub fn drain(&mut self) -> usize {
        let mut count = 0;
        loop {
            match self.inbox.try_recv() {
                Ok(input) => {
                    self.cell.handle(input);
                    count += 1;
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    debug!(cell = %self.cell.id(), "mailbox disconnected during drain");
                    break;
                }
            }
        }
        count
    }
}

impl std::fmt::Debug for CellMailbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CellMailbox")
            .field("cell", &self.cell.id())
            .finish()
    }
}
