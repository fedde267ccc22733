//! Cell registry and read-only cell views.
//!
//! Selection works on [`CellView`] snapshots: id, name and the capability
//! set the cell provided at snapshot time. Capability sets are shared
//! `Arc`s, so a snapshot never observes a set mid-recompute.

use parking_lot::RwLock;
use std::sync::Arc;

use crate::capabilities::CapabilitySet;
use crate::cells::Cell;
use crate::models::CellId;

/// Snapshot of one cell as seen by matching and selection.
#[derive(Debug, Clone)]
pub struct CellView {
    /// Cell identifier.
    pub id: CellId,
    /// Display name.
    pub name: String,
    /// Capabilities provided when the snapshot was taken.
    pub capabilities: Arc<CapabilitySet>,
}

impl CellView {
    /// Creates a view.
    pub fn new(id: CellId, name: impl Into<String>, capabilities: Arc<CapabilitySet>) -> Self {
        Self {
            id,
            name: name.into(),
            capabilities,
        }
    }

    /// Snapshot of a live cell.
    pub fn of(cell: &dyn Cell) -> Self {
        Self {
            id: cell.id(),
            name: cell.name().to_string(),
            capabilities: cell.capabilities(),
        }
    }
}

/// Registry of live cells.
#[derive(Default)]
pub struct CellRegistry {
    cells: RwLock<Vec<Arc<dyn Cell>>>,
}

impl CellRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a cell, replacing one with the same id.
    pub fn register(&self, cell: Arc<dyn Cell>) {
        let mut cells = self.cells.write();
        cells.retain(|c| c.id() != cell.id());
        cells.push(cell);
    }

    /// Removes a cell.
    pub fn remove(&self, id: CellId) -> Option<Arc<dyn Cell>> {
        let mut cells = self.cells.write();
        let index = cells.iter().position(|c| c.id() == id)?;
        Some(cells.remove(index))
    }

    /// Looks up a cell.
    pub fn get(&self, id: CellId) -> Option<Arc<dyn Cell>> {
        self.cells.read().iter().find(|c| c.id() == id).cloned()
    }

    /// Number of registered cells.
    pub fn len(&self) -> usize {
        self.cells.read().len()
    }

    /// Whether no cell is registered.
    pub fn is_empty(&self) -> bool {
        self.cells.read().is_empty()
    }

    /// Views of all cells, in registration order.
    pub fn snapshot(&self) -> Vec<CellView> {
        let cells: Vec<Arc<dyn Cell>> = self.cells.read().clone();
        cells.iter().map(|c| CellView::of(c.as_ref())).collect()
    }
}

impl std::fmt::Debug for CellRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CellRegistry")
            .field(
                "cells",
                &self
                    .cells
                    .read()
                    .iter()
                    .map(|c| c.id())
                    .collect::<Vec<_>>(),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::Capability;
    use crate::cells::testing::rig;
    use crate::cells::{AssemblyCell, PackagingCell};
    use crate::config::{AssemblyCellConfig, PackagingCellConfig};

    fn packaging(id: u64) -> Arc<dyn Cell> {
        let (core, _probe) = rig(id).into_parts();
        Arc::new(PackagingCell::new(core, PackagingCellConfig::default()))
    }

    #[test]
    fn test_register_replaces_same_id() {
        let registry = CellRegistry::new();
        registry.register(packaging(1));
        registry.register(packaging(2));
        registry.register(packaging(1));
        assert_eq!(registry.len(), 2);

        let ids: Vec<_> = registry.snapshot().iter().map(|v| v.id).collect();
        assert_eq!(ids, vec![CellId(2), CellId(1)]);
    }

    #[test]
    fn test_remove_and_get() {
        let registry = CellRegistry::new();
        registry.register(packaging(1));
        assert!(registry.get(CellId(1)).is_some());
        assert!(registry.remove(CellId(1)).is_some());
        assert!(registry.remove(CellId(1)).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_snapshot_keeps_old_capabilities() {
        let (core, _probe) = rig(3).into_parts();
        let cell = Arc::new(AssemblyCell::new(core, AssemblyCellConfig::default()));
        let registry = CellRegistry::new();
        registry.register(cell.clone());

        let before = registry.snapshot();
        cell.set_disabled(true);
        let after = registry.snapshot();

        assert!(before[0].capabilities.provides(&Capability::Material));
        assert!(after[0].capabilities.is_null());
        assert_eq!(format!("{registry:?}"), "CellRegistry { cells: [CellId(3)] }");
    }
}
