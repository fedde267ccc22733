//! Kind-specific capability declarations.
//!
//! Each struct is used in two roles: as the *requirement* an activity
//! declares and as the *provision* a cell publishes. The `provided_by`
//! predicates are therefore not symmetric: the receiver is always the
//! requirement.

use serde::{Deserialize, Serialize};

use super::ReservationPolicy;

/// Assembly capabilities: equipped material and order reservations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssemblyCapabilities {
    /// Identifier of the equipped material. `None` = don't care / nothing equipped.
    pub equipped_material: Option<String>,
    /// Order tokens. On a requirement, `None` = unconstrained and
    /// `Some(empty)` = the cell must be unreserved.
    pub reservations: Option<Vec<String>>,
}

impl AssemblyCapabilities {
    /// Requirement for any assembly cell.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the equipped material.
    pub fn with_material(mut self, material: impl Into<String>) -> Self {
        self.equipped_material = Some(material.into());
        self
    }

    /// Sets the reservation list.
    pub fn with_reservations<I, S>(mut self, reservations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.reservations = Some(reservations.into_iter().map(Into::into).collect());
        self
    }

    /// Requirement that only matches cells without reservations.
    pub fn unreserved() -> Self {
        Self {
            equipped_material: None,
            reservations: Some(Vec::new()),
        }
    }

    /// Reservation tokens, treating `None` as empty.
    pub fn reservation_tokens(&self) -> &[String] {
        self.reservations.as_deref().unwrap_or(&[])
    }

    /// Whether `provided` satisfies this requirement.
    ///
    /// Material and reservation constraints are evaluated independently and
    /// must both hold, so a release requirement naming a material and an
    /// order only matches the cell equipped with that material holding that
    /// order.
    pub fn provided_by(&self, provided: &AssemblyCapabilities, policy: ReservationPolicy) -> bool {
        if let Some(material) = &self.equipped_material {
            if provided.equipped_material.as_deref() != Some(material.as_str()) {
                return false;
            }
        }

        let available = provided.reservation_tokens();
        match &self.reservations {
            None => true,
            Some(required) if required.is_empty() => match policy {
                ReservationPolicy::RequireUnreserved => available.is_empty(),
                ReservationPolicy::Unconstrained => true,
            },
            Some(required) => required.iter().all(|token| available.contains(token)),
        }
    }
}

/// Soldering capabilities.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SolderingCapabilities {
    /// Manual (repair) soldering. A `true` requirement needs a manual cell.
    pub manual_soldering: bool,
}

impl SolderingCapabilities {
    /// Automatic soldering.
    pub fn automatic() -> Self {
        Self {
            manual_soldering: false,
        }
    }

    /// Manual soldering.
    pub fn manual() -> Self {
        Self {
            manual_soldering: true,
        }
    }

    /// Whether `provided` satisfies this requirement.
    pub fn provided_by(&self, provided: &SolderingCapabilities) -> bool {
        !self.manual_soldering || provided.manual_soldering
    }
}

/// Electrical test capabilities.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCapabilities {
    /// Test voltage in volts. `0` on a requirement = don't care.
    pub voltage: u32,
}

impl TestCapabilities {
    /// Creates a test capability for a voltage.
    pub fn with_voltage(voltage: u32) -> Self {
        Self { voltage }
    }

    /// Whether `provided` satisfies this requirement.
    pub fn provided_by(&self, provided: &TestCapabilities) -> bool {
        self.voltage == 0 || self.voltage == provided.voltage
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provided(material: Option<&str>, reservations: &[&str]) -> AssemblyCapabilities {
        AssemblyCapabilities {
            equipped_material: material.map(String::from),
            reservations: Some(reservations.iter().map(|s| s.to_string()).collect()),
        }
    }

    #[test]
    fn test_assembly_material_equality() {
        let req = AssemblyCapabilities::new().with_material("HOUSING-1");
        assert!(req.provided_by(&provided(Some("HOUSING-1"), &[]), ReservationPolicy::default()));
        assert!(!req.provided_by(&provided(Some("HOUSING-2"), &[]), ReservationPolicy::default()));
        assert!(!req.provided_by(&provided(None, &[]), ReservationPolicy::default()));
    }

    #[test]
    fn test_assembly_unset_material_is_dont_care() {
        let req = AssemblyCapabilities::new();
        assert!(req.provided_by(&provided(Some("X"), &["O1"]), ReservationPolicy::default()));
        assert!(req.provided_by(&provided(None, &[]), ReservationPolicy::default()));
    }

    #[test]
    fn test_assembly_explicit_empty_reservations() {
        let req = AssemblyCapabilities::unreserved();
        assert!(req.provided_by(&provided(None, &[]), ReservationPolicy::RequireUnreserved));
        assert!(!req.provided_by(&provided(None, &["O1"]), ReservationPolicy::RequireUnreserved));
        // Unconstrained policy treats an empty list like an unspecified one
        assert!(req.provided_by(&provided(None, &["O1"]), ReservationPolicy::Unconstrained));
    }

    #[test]
    fn test_assembly_reservation_subset() {
        let req = AssemblyCapabilities::new().with_reservations(["O1"]);
        assert!(req.provided_by(&provided(None, &["O1", "O2"]), ReservationPolicy::default()));
        assert!(!req.provided_by(&provided(None, &["O2"]), ReservationPolicy::default()));

        let req = AssemblyCapabilities::new().with_reservations(["O1", "O3"]);
        assert!(!req.provided_by(&provided(None, &["O1", "O2"]), ReservationPolicy::default()));
    }

    #[test]
    fn test_assembly_material_and_reservation_both_checked() {
        let req = AssemblyCapabilities::new()
            .with_material("PCB")
            .with_reservations(["O1"]);
        assert!(req.provided_by(&provided(Some("PCB"), &["O1"]), ReservationPolicy::default()));
        assert!(!req.provided_by(&provided(Some("PCB"), &[]), ReservationPolicy::default()));
        assert!(!req.provided_by(&provided(Some("HOUSING"), &["O1"]), ReservationPolicy::default()));
    }

    #[test]
    fn test_soldering_manual_implication() {
        let manual = SolderingCapabilities::manual();
        let auto = SolderingCapabilities::automatic();
        assert!(manual.provided_by(&manual));
        assert!(!manual.provided_by(&auto));
        assert!(auto.provided_by(&manual));
        assert!(auto.provided_by(&auto));
    }

    #[test]
    fn test_voltage_dont_care() {
        let any = TestCapabilities::default();
        let twelve = TestCapabilities::with_voltage(12);
        let five = TestCapabilities::with_voltage(5);
        assert!(any.provided_by(&twelve));
        assert!(twelve.provided_by(&twelve));
        assert!(!twelve.provided_by(&five));
    }
}
