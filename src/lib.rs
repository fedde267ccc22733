//! Capability matching, cell selection and cell-session scheduling for
//! discrete-manufacturing work cells.
//!
//! Activities declare the capability they need; cells publish the
//! capabilities they provide. Dispatching matches the two and ranks the
//! matching cells, and each cell runs a session state machine that turns
//! workpiece arrivals, starts, driver results and aborts into exactly one
//! published result per activity.
//!
//! # Modules
//!
//! - **`capabilities`**: Capability kinds, `CapabilitySet`, provision matching
//! - **`models`**: `Activity`, result enumerations, tracing, identifiers
//! - **`session`**: Session phases, `SessionController`, `Workspace`
//! - **`dispatching`**: `DispatchEngine`, `LoadBalancer`, `SolderingOptimizer`
//! - **`cells`**: `Cell` trait, the six cell types, mailbox, simulated driver
//! - **`registry`**: Live cells and `CellView` snapshots
//! - **`config`** / **`validation`**: JSON configuration and its checks
//!
//! # Example
//!
//! ```
//! use cell_dispatch::cells::{Cell, CellEvent, CellEventSink, SimulatedDriver};
//! use cell_dispatch::config::FactoryConfig;
//! use cell_dispatch::dispatching::InMemoryActivityPool;
//! use cell_dispatch::models::{Activity, ActivityId, ActivityParameters};
//! use cell_dispatch::registry::CellRegistry;
//! use std::sync::Arc;
//!
//! let config = FactoryConfig::from_json(r#"{ "cells": [
//!     { "id": 1, "name": "Packing 1", "type": "packaging" },
//!     { "id": 2, "name": "Packing 2", "type": "packaging" }
//! ] }"#).unwrap();
//!
//! let (tx, _rx) = tokio::sync::mpsc::unbounded_channel::<CellEvent>();
//! let events: Arc<dyn CellEventSink> = Arc::new(tx);
//! let registry = CellRegistry::new();
//! for cell in &config.cells {
//!     let driver = Arc::new(SimulatedDriver::new());
//!     registry.register(cell.build(driver, Arc::clone(&events), None).unwrap());
//! }
//!
//! let pool = Arc::new(InMemoryActivityPool::new());
//! let engine = config.dispatch_engine(pool).unwrap();
//! let activity = Arc::new(Activity::new(ActivityId(1), ActivityParameters::Packing));
//! let ranked = engine.dispatch(&activity, &registry.snapshot());
//! assert_eq!(ranked.len(), 2);
//! ```

pub mod capabilities;
pub mod cells;
pub mod config;
pub mod dispatching;
pub mod error;
pub mod models;
pub mod registry;
pub mod session;
pub mod validation;

pub use capabilities::{Capability, CapabilitySet, MatchPolicy, ReservationPolicy};
pub use cells::{Cell, CellEvent, CellState};
pub use config::FactoryConfig;
pub use dispatching::{CellSelector, DispatchEngine};
pub use error::{ConfigError, SessionError, WorkspaceError};
pub use models::{Activity, ActivityId, CellId, ProcessId};
pub use registry::{CellRegistry, CellView};
