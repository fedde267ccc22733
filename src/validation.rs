//! Configuration validation.
//!
//! Checks a [`FactoryConfig`] as a whole before any cell is built and
//! reports every problem at once. Detects:
//! - Duplicate cell IDs
//! - Workspace position counts outside 1..=10
//! - Zero selector thresholds
//! - Success rates above 100 %

use std::collections::HashSet;

use crate::config::{CellSettings, FactoryConfig};
use crate::error::ConfigError;
use crate::session::{MAX_POSITIONS, MIN_POSITIONS};

/// Validation result.
pub type ValidationResult = Result<(), Vec<ValidationError>>;

/// A validation error.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    /// Error category.
    pub kind: ValidationErrorKind,
    /// Human-readable description.
    pub message: String,
}

/// Categories of validation errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationErrorKind {
    /// Two cells share the same ID.
    DuplicateId,
    /// A workspace has too few or too many positions.
    InvalidPositionCount,
    /// A threshold that must be positive is zero.
    ZeroThreshold,
    /// A percentage exceeds 100.
    InvalidSuccessRate,
}

impl ValidationError {
    fn new(kind: ValidationErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl From<Vec<ValidationError>> for ConfigError {
    fn from(errors: Vec<ValidationError>) -> Self {
        ConfigError::Invalid(errors.into_iter().map(|e| e.message).collect())
    }
}

/// Validates a factory configuration.
///
/// Checks:
/// 1. No duplicate cell IDs
/// 2. Manual soldering workspaces have 1..=10 positions
/// 3. The soldering optimizer threshold is positive
/// 4. Test cell success rates are at most 100
///
/// # Returns
/// `Ok(())` if all checks pass, `Err(errors)` with all detected issues.
pub fn validate_config(config: &FactoryConfig) -> ValidationResult {
    let mut errors = Vec::new();

    if config.soldering_optimizer.threshold == 0 {
        errors.push(ValidationError::new(
            ValidationErrorKind::ZeroThreshold,
            "Soldering optimizer threshold must be greater than zero",
        ));
    }

    let mut cell_ids = HashSet::new();
    for cell in &config.cells {
        if !cell_ids.insert(cell.id) {
            errors.push(ValidationError::new(
                ValidationErrorKind::DuplicateId,
                format!("Duplicate cell ID: {}", cell.id),
            ));
        }

        match &cell.settings {
            CellSettings::ManualSoldering(c)
                if !(MIN_POSITIONS..=MAX_POSITIONS).contains(&c.positions) =>
            {
                errors.push(ValidationError::new(
                    ValidationErrorKind::InvalidPositionCount,
                    format!(
                        "Cell '{}' has {} positions, expected {}..={}",
                        cell.name, c.positions, MIN_POSITIONS, MAX_POSITIONS
                    ),
                ));
            }
            CellSettings::Test(c) if c.success_rate > 100 => {
                errors.push(ValidationError::new(
                    ValidationErrorKind::InvalidSuccessRate,
                    format!(
                        "Cell '{}' has success rate {} %, expected at most 100",
                        cell.name, c.success_rate
                    ),
                ));
            }
            _ => {}
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CellConfig, ManualSolderingCellConfig, PackagingCellConfig, TestCellConfig};
    use crate::models::CellId;

    fn cell(id: u64, settings: CellSettings) -> CellConfig {
        CellConfig {
            id: CellId(id),
            name: format!("cell {id}"),
            settings,
        }
    }

    fn sample_config() -> FactoryConfig {
        FactoryConfig {
            cells: vec![
                cell(1, CellSettings::Packaging(PackagingCellConfig::default())),
                cell(2, CellSettings::ManualSoldering(ManualSolderingCellConfig::default())),
                cell(3, CellSettings::Test(TestCellConfig::default())),
            ],
            ..Default::default()
        }
    }

    #[test]
    fn test_valid_config() {
        assert!(validate_config(&sample_config()).is_ok());
        assert!(validate_config(&FactoryConfig::default()).is_ok());
    }

    #[test]
    fn test_duplicate_cell_id() {
        let mut config = sample_config();
        config.cells[2].id = CellId(1);

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind, ValidationErrorKind::DuplicateId);
        assert!(errors[0].message.contains("C1"));
    }

    #[test]
    fn test_position_count_bounds() {
        for positions in [0, 11] {
            let mut config = sample_config();
            config.cells[1].settings = CellSettings::ManualSoldering(ManualSolderingCellConfig {
                positions,
                ..Default::default()
            });
            let errors = validate_config(&config).unwrap_err();
            assert!(errors
                .iter()
                .any(|e| e.kind == ValidationErrorKind::InvalidPositionCount));
        }
    }

    #[test]
    fn test_all_issues_reported() {
        let mut config = sample_config();
        config.soldering_optimizer.threshold = 0;
        config.cells[2].settings = CellSettings::Test(TestCellConfig {
            success_rate: 150,
            ..Default::default()
        });
        config.cells.push(cell(1, CellSettings::Packaging(PackagingCellConfig::default())));

        let errors = validate_config(&config).unwrap_err();
        let kinds: Vec<_> = errors.iter().map(|e| e.kind.clone()).collect();
        assert_eq!(
            kinds,
            vec![
                ValidationErrorKind::ZeroThreshold,
                ValidationErrorKind::InvalidSuccessRate,
                ValidationErrorKind::DuplicateId,
            ]
        );

        match ConfigError::from(errors) {
            ConfigError::Invalid(messages) => assert_eq!(messages.len(), 3),
            other => panic!("unexpected {other:?}"),
        }
    }
}
