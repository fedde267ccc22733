//! Events published by cells.

use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tracing::warn;

use crate::capabilities::CapabilitySet;
use crate::models::CellId;
use crate::session::{ActivityCompleted, ReadyToWork, SessionId};

/// Something the scheduler must learn about.
#[derive(Debug, Clone)]
pub enum CellEvent {
    /// A session offers itself for work.
    ReadyToWork {
        /// Publishing cell.
        cell: CellId,
        /// The offer.
        offer: ReadyToWork,
    },
    /// An offer is withdrawn until further notice.
    NotReadyToWork {
        /// Publishing cell.
        cell: CellId,
        /// Paused session.
        session_id: SessionId,
    },
    /// An activity finished (successfully or not).
    ActivityCompleted {
        /// Publishing cell.
        cell: CellId,
        /// The completion.
        completed: ActivityCompleted,
    },
    /// The cell's capability set was replaced.
    CapabilitiesChanged {
        /// Publishing cell.
        cell: CellId,
        /// New set.
        capabilities: Arc<CapabilitySet>,
    },
}

impl CellEvent {
    /// Publishing cell.
    pub fn cell(&self) -> CellId {
        match self {
            CellEvent::ReadyToWork { cell, .. }
            | CellEvent::NotReadyToWork { cell, .. }
            | CellEvent::ActivityCompleted { cell, .. }
            | CellEvent::CapabilitiesChanged { cell, .. } => *cell,
        }
    }
}

/// Receiver of cell events.
pub trait CellEventSink: Send + Sync {
    /// Publishes an event. Must not call back into the cell.
    fn publish(&self, event: CellEvent);
}

impl CellEventSink for UnboundedSender<CellEvent> {
    fn publish(&self, event: CellEvent) {
        let cell = event.cell();
        if self.send(event).is_err() {
            warn!(cell = %cell, "event receiver dropped");
        }
    }
}
