//! Capability model and provision matching.
//!
//! Activities declare what they *require*, cells declare what they currently
//! *provide*. Both sides use the same [`Capability`] variants; matching
//! dispatches on the variant tag and never compares different kinds.
//!
//! # Matching Rules
//!
//! | Kind | Rule |
//! |------|------|
//! | Assembly material | unset requirement or equal identifier |
//! | Assembly reservations | unspecified = any, empty = unreserved, else subset |
//! | Soldering | manual requirement needs a manual cell |
//! | Test voltage | `0` requirement or equal voltage |
//! | Material, Packing, ProcessFixup | kind equality |
//!
//! A cell that is disabled provides [`CapabilitySet::Null`], which satisfies
//! nothing.

mod kinds;
mod set;

pub use kinds::{AssemblyCapabilities, SolderingCapabilities, TestCapabilities};
pub use set::{CapabilitySet, CapabilitySlot};

use serde::{Deserialize, Serialize};

/// How an explicitly empty reservation requirement is interpreted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReservationPolicy {
    /// Empty list = the cell must hold no reservation.
    #[default]
    RequireUnreserved,
    /// Empty list imposes no constraint.
    Unconstrained,
}

/// Policy knobs for provision matching.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchPolicy {
    /// Interpretation of an empty reservation requirement.
    pub empty_reservations: ReservationPolicy,
}

/// Discriminant of a [`Capability`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CapabilityKind {
    /// Assembly stations.
    Assembly,
    /// Material containers.
    Material,
    /// Soldering stations.
    Soldering,
    /// Electrical test stations.
    Test,
    /// Packing stations.
    Packing,
    /// Process fix-up stations.
    ProcessFixup,
}

/// A capability declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Capability {
    /// Assembly with material and reservations.
    Assembly(AssemblyCapabilities),
    /// Holds material for other cells.
    Material,
    /// Soldering, automatic or manual.
    Soldering(SolderingCapabilities),
    /// Electrical test at a voltage.
    Test(TestCapabilities),
    /// Packing.
    Packing,
    /// Clean-up of virtually mounted processes.
    ProcessFixup,
}

impl Capability {
    /// Returns the variant tag.
    pub fn kind(&self) -> CapabilityKind {
        match self {
            Capability::Assembly(_) => CapabilityKind::Assembly,
            Capability::Material => CapabilityKind::Material,
            Capability::Soldering(_) => CapabilityKind::Soldering,
            Capability::Test(_) => CapabilityKind::Test,
            Capability::Packing => CapabilityKind::Packing,
            Capability::ProcessFixup => CapabilityKind::ProcessFixup,
        }
    }

    /// Whether `provided` satisfies this requirement under the default policy.
    pub fn provided_by(&self, provided: &Capability) -> bool {
        self.provided_by_with(provided, &MatchPolicy::default())
    }

    /// Whether `provided` satisfies this requirement.
    ///
    /// Different kinds return `false`.
    pub fn provided_by_with(&self, provided: &Capability, policy: &MatchPolicy) -> bool {
        match (self, provided) {
            (Capability::Assembly(req), Capability::Assembly(prov)) => {
                req.provided_by(prov, policy.empty_reservations)
            }
            (Capability::Soldering(req), Capability::Soldering(prov)) => req.provided_by(prov),
            (Capability::Test(req), Capability::Test(prov)) => req.provided_by(prov),
            (Capability::Material, Capability::Material)
            | (Capability::Packing, Capability::Packing)
            | (Capability::ProcessFixup, Capability::ProcessFixup) => true,
            _ => false,
        }
    }
}

impl From<AssemblyCapabilities> for Capability {
    fn from(value: AssemblyCapabilities) -> Self {
        Capability::Assembly(value)
    }
}

impl From<SolderingCapabilities> for Capability {
    fn from(value: SolderingCapabilities) -> Self {
        Capability::Soldering(value)
    }
}

impl From<TestCapabilities> for Capability {
    fn from(value: TestCapabilities) -> Self {
        Capability::Test(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn all_kinds() -> Vec<Capability> {
        vec![
            Capability::Assembly(AssemblyCapabilities::new()),
            Capability::Material,
            Capability::Soldering(SolderingCapabilities::automatic()),
            Capability::Test(TestCapabilities::default()),
            Capability::Packing,
            Capability::ProcessFixup,
        ]
    }

    #[test]
    fn test_different_kinds_never_match() {
        let kinds = all_kinds();
        for (i, req) in kinds.iter().enumerate() {
            for (j, prov) in kinds.iter().enumerate() {
                assert_eq!(req.provided_by(prov), i == j, "{req:?} vs {prov:?}");
            }
        }
    }

    #[test]
    fn test_kind_tags() {
        let kinds: Vec<CapabilityKind> = all_kinds().iter().map(Capability::kind).collect();
        assert_eq!(
            kinds,
            vec![
                CapabilityKind::Assembly,
                CapabilityKind::Material,
                CapabilityKind::Soldering,
                CapabilityKind::Test,
                CapabilityKind::Packing,
                CapabilityKind::ProcessFixup,
            ]
        );
    }

    #[test]
    fn test_not_symmetric() {
        let manual: Capability = SolderingCapabilities::manual().into();
        let auto: Capability = SolderingCapabilities::automatic().into();
        assert!(auto.provided_by(&manual));
        assert!(!manual.provided_by(&auto));
    }

    #[test]
    fn test_policy_is_applied() {
        let req: Capability = AssemblyCapabilities::unreserved().into();
        let prov: Capability = AssemblyCapabilities::new().with_reservations(["O1"]).into();
        assert!(!req.provided_by(&prov));
        let relaxed = MatchPolicy {
            empty_reservations: ReservationPolicy::Unconstrained,
        };
        assert!(req.provided_by_with(&prov, &relaxed));
    }

    #[test]
    fn test_serde_tagged() {
        let cap: Capability = TestCapabilities::with_voltage(24).into();
        let json = serde_json::to_string(&cap).unwrap();
        assert_eq!(json, r#"{"kind":"Test","voltage":24}"#);
        let back: Capability = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cap);
    }

    proptest! {
        #[test]
        fn prop_dont_care_voltage_matches_any(voltage in 0u32..1000) {
            let req = Capability::Test(TestCapabilities::default());
            let prov = Capability::Test(TestCapabilities::with_voltage(voltage));
            prop_assert!(req.provided_by(&prov));
        }

        #[test]
        fn prop_dont_care_assembly_matches_any(
            material in proptest::option::of("[A-Z]{1,6}"),
            tokens in proptest::collection::vec("[0-9]{1,4}", 0..5),
        ) {
            let req = Capability::Assembly(AssemblyCapabilities::new());
            let prov = Capability::Assembly(AssemblyCapabilities {
                equipped_material: material,
                reservations: Some(tokens),
            });
            prop_assert!(req.provided_by(&prov));
        }

        #[test]
        fn prop_reservation_subset(
            provided in proptest::collection::btree_set("[a-d]", 0..4),
            required in proptest::collection::btree_set("[a-d]", 1..4),
        ) {
            let req = Capability::Assembly(AssemblyCapabilities::new().with_reservations(required.clone()));
            let prov = Capability::Assembly(AssemblyCapabilities::new().with_reservations(provided.clone()));
            prop_assert_eq!(req.provided_by(&prov), required.is_subset(&provided));
        }
    }
}
