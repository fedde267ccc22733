//! Cell selection for activities.
//!
//! Selection runs in two stages: capability matching filters the registry
//! view down to cells that can run the activity, then a chain of
//! [`CellSelector`]s ranks or filters the candidates further.
//!
//! # Usage
//!
//! ```
//! use cell_dispatch::dispatching::{DispatchEngine, InMemoryActivityPool, LoadBalancer, SolderingOptimizer};
//! use std::sync::Arc;
//!
//! let pool = Arc::new(InMemoryActivityPool::new());
//! let engine = DispatchEngine::new()
//!     .with_selector(SolderingOptimizer::new(pool))
//!     .with_selector(LoadBalancer::new());
//!
//! // let ranked = engine.dispatch(&activity, &registry.snapshot());
//! ```

mod engine;
mod pool;
mod selectors;

pub use engine::DispatchEngine;
pub use pool::{ActivityPool, InMemoryActivityPool};
pub use selectors::{LoadBalancer, SolderingOptimizer, SolderingOptimizerConfig, ThresholdBoundary};

use std::fmt::Debug;
use std::sync::Arc;

use crate::models::Activity;
use crate::registry::CellView;

/// A strategy ranking or filtering capability-matched cells.
///
/// `available` is already capability-filtered; implementations never
/// re-check capabilities. Activities a selector does not handle pass through
/// unchanged, and so does empty input.
pub trait CellSelector: Send + Sync + Debug {
    /// Selector name, for logs.
    fn name(&self) -> &'static str;

    /// Returns the cells to offer `activity` to, best first.
    fn select_cells(&self, activity: &Arc<Activity>, available: &[CellView]) -> Vec<CellView>;
}
