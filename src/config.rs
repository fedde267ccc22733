//! Configuration.
//!
//! All structs deserialize from JSON with every field optional; missing
//! fields take the defaults below. [`FactoryConfig::from_json`] parses and
//! validates in one step.
//!
//! ```
//! use cell_dispatch::config::{CellSettings, FactoryConfig};
//!
//! let config = FactoryConfig::from_json(r#"{
//!     "cells": [
//!         { "id": 1, "name": "Assembly 1", "type": "assembly", "material": "M-100" },
//!         { "id": 2, "name": "Manual soldering", "type": "manual_soldering", "positions": 2 }
//!     ]
//! }"#).unwrap();
//! assert_eq!(config.cells.len(), 2);
//! assert!(matches!(config.cells[1].settings, CellSettings::ManualSoldering(_)));
//! ```

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::capabilities::MatchPolicy;
use crate::cells::{
    AssemblyCell, Cell, CellCore, CellEventSink, FixUpCell, ManualSolderingCell, MessageDriver,
    PackagingCell, SolderingCell, TestCell, VisualInstructor,
};
use crate::dispatching::{
    ActivityPool, DispatchEngine, LoadBalancer, SolderingOptimizer, SolderingOptimizerConfig,
};
use crate::error::ConfigError;
use crate::models::CellId;
use crate::validation::validate_config;

/// Assembly cell settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssemblyCellConfig {
    /// Assemble through worker instructions instead of the driver.
    pub manual_mode: bool,
    /// Material equipped at start-up.
    pub material: Option<String>,
    /// Nominal power in watts.
    pub nominal_power: u32,
}

impl Default for AssemblyCellConfig {
    fn default() -> Self {
        Self {
            manual_mode: false,
            material: None,
            nominal_power: 225,
        }
    }
}

/// Automatic soldering cell settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolderingCellConfig {
    /// Set-point temperature in °C.
    pub temperature: i32,
    /// Hysteresis below the set point in °C.
    pub hysteresis: i32,
    /// Nominal power of a freshly maintained cell, in watts.
    pub nominal_power: u32,
    /// Nominal power at which wear forces maintenance.
    pub power_threshold: u32,
}

impl Default for SolderingCellConfig {
    fn default() -> Self {
        Self {
            temperature: 200,
            hysteresis: 20,
            nominal_power: 240,
            power_threshold: 270,
        }
    }
}

/// Manual soldering workplace settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManualSolderingCellConfig {
    /// Workspace positions (1..=10).
    pub positions: usize,
    /// Soldering iron temperature in °C.
    pub iron_temperature: i32,
    /// Nominal power in watts.
    pub nominal_power: u32,
}

impl Default for ManualSolderingCellConfig {
    fn default() -> Self {
        Self {
            positions: 4,
            iron_temperature: 180,
            nominal_power: 240,
        }
    }
}

/// Simulated test cell settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TestCellConfig {
    /// Voltage the cell tests at.
    pub voltage: u32,
    /// Percentage of passing tests (0..=100).
    pub success_rate: u8,
    /// Nominal power in watts.
    pub nominal_power: u32,
    /// Seed for reproducible results; random when unset.
    pub seed: Option<u64>,
}

impl Default for TestCellConfig {
    fn default() -> Self {
        Self {
            voltage: 12,
            success_rate: 90,
            nominal_power: 220,
            seed: None,
        }
    }
}

/// Packaging cell settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PackagingCellConfig {
    /// Products per box.
    pub packaging_amount: u32,
    /// Cycles between maintenances. `0` disables maintenance.
    pub maintenance_threshold: u32,
    /// Extra maintenance instruction (e.g. a media link).
    pub maintenance_instruction: Option<String>,
    /// Nominal power in watts.
    pub nominal_power: u32,
}

impl Default for PackagingCellConfig {
    fn default() -> Self {
        Self {
            packaging_amount: 10,
            maintenance_threshold: 100,
            maintenance_instruction: None,
            nominal_power: 230,
        }
    }
}

/// Fix-up cell settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FixUpCellConfig {
    /// Wait for a worker's confirmation before completing.
    pub manual_mode: bool,
}

/// Type-specific cell settings, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CellSettings {
    /// [`AssemblyCell`].
    Assembly(AssemblyCellConfig),
    /// [`SolderingCell`].
    Soldering(SolderingCellConfig),
    /// [`ManualSolderingCell`].
    ManualSoldering(ManualSolderingCellConfig),
    /// [`TestCell`].
    Test(TestCellConfig),
    /// [`PackagingCell`].
    Packaging(PackagingCellConfig),
    /// [`FixUpCell`].
    FixUp(FixUpCellConfig),
}

/// One configured cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellConfig {
    /// Cell identifier.
    pub id: CellId,
    /// Display name.
    pub name: String,
    /// Type-specific settings.
    #[serde(flatten)]
    pub settings: CellSettings,
}

impl CellConfig {
    /// Builds the configured cell.
    pub fn build(
        &self,
        driver: Arc<dyn MessageDriver>,
        events: Arc<dyn CellEventSink>,
        instructor: Option<Arc<dyn VisualInstructor>>,
    ) -> Result<Arc<dyn Cell>, ConfigError> {
        let mut core = CellCore::new(self.id, self.name.clone(), driver, events);
        if let Some(instructor) = instructor {
            core = core.with_instructor(instructor);
        }
        let cell: Arc<dyn Cell> = match &self.settings {
            CellSettings::Assembly(c) => Arc::new(AssemblyCell::new(core, c.clone())),
            CellSettings::Soldering(c) => Arc::new(SolderingCell::new(core, c.clone())),
            CellSettings::ManualSoldering(c) => Arc::new(ManualSolderingCell::new(core, c.clone())?),
            CellSettings::Test(c) => Arc::new(TestCell::new(core, c.clone())?),
            CellSettings::Packaging(c) => Arc::new(PackagingCell::new(core, c.clone())),
            CellSettings::FixUp(c) => Arc::new(FixUpCell::new(core, c.clone())),
        };
        Ok(cell)
    }
}

/// Configuration of a whole line.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FactoryConfig {
    /// Provision matching policy.
    pub match_policy: MatchPolicy,
    /// Soldering threshold routing.
    pub soldering_optimizer: SolderingOptimizerConfig,
    /// Cells of the line.
    pub cells: Vec<CellConfig>,
}

impl FactoryConfig {
    /// Parses and validates a JSON document.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: FactoryConfig = serde_json::from_str(json)?;
        validate_config(&config)?;
        Ok(config)
    }

    /// Dispatch engine with threshold routing followed by load balancing.
    pub fn dispatch_engine(&self, pool: Arc<dyn ActivityPool>) -> Result<DispatchEngine, ConfigError> {
        let optimizer = SolderingOptimizer::with_config(pool, self.soldering_optimizer)?;
        Ok(DispatchEngine::new()
            .with_match_policy(self.match_policy)
            .with_selector(optimizer)
            .with_selector(LoadBalancer::new()))
    }
}
