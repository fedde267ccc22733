//! Built-in cell selectors.
//!
//! - **LoadBalancer**: spreads activities over equally capable cells by the
//!   number of pending activities already assigned to each.
//! - **SolderingOptimizer**: keeps soldering on automatic cells until the
//!   backlog outgrows them, then lets manual workplaces help.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use super::{ActivityPool, CellSelector};
use crate::capabilities::Capability;
use crate::error::ConfigError;
use crate::models::{Activity, ActivityId, ActivityKind, CellId};
use crate::registry::CellView;

// ======================== Load balancing ========================

#[derive(Debug)]
struct PrimaryTarget {
    activity: Arc<Activity>,
    cell: CellId,
}

/// Orders cells ascending by pending load.
///
/// Keeps the cell each in-flight activity was last sent to (its primary
/// target). Targets of activities that have a result are pruned on every
/// call. Ties keep the input order.
#[derive(Debug, Default)]
pub struct LoadBalancer {
    targets: Mutex<HashMap<ActivityId, PrimaryTarget>>,
}

impl LoadBalancer {
    /// Creates a balancer with no recorded targets.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of activities with a recorded target (including finished ones
    /// not yet pruned).
    pub fn tracked(&self) -> usize {
        self.targets.lock().len()
    }

    /// Recorded target of an activity.
    pub fn primary_target(&self, activity_id: ActivityId) -> Option<CellId> {
        self.targets.lock().get(&activity_id).map(|t| t.cell)
    }

    /// Prunes finished activities and counts pending ones per candidate.
    fn loads(&self, activity_id: ActivityId, cells: &[CellView]) -> Vec<usize> {
        let mut targets = self.targets.lock();
        targets.retain(|_, t| !t.activity.is_completed());
        cells
            .iter()
            .map(|cell| {
                targets
                    .iter()
                    .filter(|(id, t)| **id != activity_id && t.cell == cell.id)
                    .count()
            })
            .collect()
    }
}

impl CellSelector for LoadBalancer {
    fn name(&self) -> &'static str {
        "LoadBalancer"
    }

    fn select_cells(&self, activity: &Arc<Activity>, available: &[CellView]) -> Vec<CellView> {
        if available.len() <= 1 {
            return available.to_vec();
        }

        let loads = self.loads(activity.id, available);
        let mut ranked: Vec<(usize, &CellView)> = loads.into_iter().zip(available).collect();
        ranked.sort_by_key(|(load, _)| *load);
        let ranked: Vec<CellView> = ranked.into_iter().map(|(_, c)| c.clone()).collect();

        if let Some(top) = ranked.first() {
            self.targets.lock().insert(
                activity.id,
                PrimaryTarget {
                    activity: Arc::clone(activity),
                    cell: top.id,
                },
            );
            debug!(activity = %activity.id, cell = %top.id, "primary target recorded");
        }
        ranked
    }
}

// ======================== Threshold routing ========================

/// Comparison used against `threshold × automatic cells`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdBoundary {
    /// `open >= limit` opens manual cells.
    #[default]
    Inclusive,
    /// `open > limit` opens manual cells.
    Exclusive,
}

impl ThresholdBoundary {
    fn reached(self, open: usize, limit: usize) -> bool {
        match self {
            ThresholdBoundary::Inclusive => open >= limit,
            ThresholdBoundary::Exclusive => open > limit,
        }
    }
}

/// Configuration of [`SolderingOptimizer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolderingOptimizerConfig {
    /// Open soldering activities per automatic cell before manual cells help.
    pub threshold: u32,
    /// Boundary comparison.
    pub boundary: ThresholdBoundary,
}

impl Default for SolderingOptimizerConfig {
    fn default() -> Self {
        Self {
            threshold: 3,
            boundary: ThresholdBoundary::Inclusive,
        }
    }
}

/// Routes soldering to automatic cells unless the backlog is large.
///
/// With `threshold × automatic` or more open soldering activities in the
/// pool, all candidates are returned; otherwise only automatic cells.
pub struct SolderingOptimizer {
    pool: Arc<dyn ActivityPool>,
    config: SolderingOptimizerConfig,
}

impl SolderingOptimizer {
    /// Creates an optimizer with the default threshold of 3.
    pub fn new(pool: Arc<dyn ActivityPool>) -> Self {
        Self {
            pool,
            config: SolderingOptimizerConfig::default(),
        }
    }

    /// Creates an optimizer from configuration.
    pub fn with_config(
        pool: Arc<dyn ActivityPool>,
        config: SolderingOptimizerConfig,
    ) -> Result<Self, ConfigError> {
        if config.threshold == 0 {
            return Err(ConfigError::ZeroThreshold);
        }
        Ok(Self { pool, config })
    }

    /// Active configuration.
    pub fn config(&self) -> &SolderingOptimizerConfig {
        &self.config
    }
}

fn is_manual_soldering(cell: &CellView) -> bool {
    cell.capabilities
        .iter()
        .any(|c| matches!(c, Capability::Soldering(s) if s.manual_soldering))
}

impl CellSelector for SolderingOptimizer {
    fn name(&self) -> &'static str {
        "SolderingOptimizer"
    }

    fn select_cells(&self, activity: &Arc<Activity>, available: &[CellView]) -> Vec<CellView> {
        if activity.kind() != ActivityKind::Soldering || available.len() <= 1 {
            return available.to_vec();
        }

        let automatic: Vec<CellView> = available
            .iter()
            .filter(|c| !is_manual_soldering(c))
            .cloned()
            .collect();
        let open = self
            .pool
            .count_open(&|a: &Activity| a.kind() == ActivityKind::Soldering);
        let limit = self.config.threshold as usize * automatic.len();

        if self.config.boundary.reached(open, limit) {
            debug!(activity = %activity.id, open, limit, "backlog high, manual cells allowed");
            available.to_vec()
        } else {
            debug!(activity = %activity.id, open, limit, "automatic cells only");
            automatic
        }
    }
}

impl std::fmt::Debug for SolderingOptimizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SolderingOptimizer")
            .field("config", &self.config)
            .finish()
    }
}
