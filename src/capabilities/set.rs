//! Capability sets and the per-cell capability slot.

use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use super::{Capability, MatchPolicy};

/// The capabilities one cell currently provides.
///
/// `Null` represents a disabled cell and satisfies no requirement.
/// `Provided` combines any number of declarations; a requirement is met when
/// at least one member satisfies it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CapabilitySet {
    /// Nothing is provided.
    Null,
    /// The declarations currently provided.
    Provided(Vec<Capability>),
}

impl CapabilitySet {
    /// The "no capability" sentinel.
    pub fn null() -> Self {
        CapabilitySet::Null
    }

    /// A set with a single declaration.
    pub fn single(capability: impl Into<Capability>) -> Self {
        CapabilitySet::Provided(vec![capability.into()])
    }

    /// A set combining several declarations.
    pub fn combined(capabilities: impl IntoIterator<Item = Capability>) -> Self {
        CapabilitySet::Provided(capabilities.into_iter().collect())
    }

    /// Whether this is the null set.
    pub fn is_null(&self) -> bool {
        matches!(self, CapabilitySet::Null)
    }

    /// Iterates the provided declarations (none for the null set).
    pub fn iter(&self) -> std::slice::Iter<'_, Capability> {
        let caps: &[Capability] = match self {
            CapabilitySet::Null => &[],
            CapabilitySet::Provided(caps) => caps,
        };
        caps.iter()
    }

    /// Whether any member satisfies `required` under the default policy.
    pub fn provides(&self, required: &Capability) -> bool {
        self.provides_with(required, &MatchPolicy::default())
    }

    /// Whether any member satisfies `required`.
    pub fn provides_with(&self, required: &Capability, policy: &MatchPolicy) -> bool {
        self.iter().any(|provided| required.provided_by_with(provided, policy))
    }

    /// Whether every requirement in `required` is satisfied.
    ///
    /// Each requirement is checked independently against the whole set. A
    /// null set on either side never matches, so a disabled cell does not
    /// even satisfy an empty requirement list.
    pub fn provides_all(&self, required: &CapabilitySet, policy: &MatchPolicy) -> bool {
        if self.is_null() || required.is_null() {
            return false;
        }
        required.iter().all(|req| self.provides_with(req, policy))
    }
}

impl Default for CapabilitySet {
    fn default() -> Self {
        CapabilitySet::Null
    }
}

impl From<Capability> for CapabilitySet {
    fn from(value: Capability) -> Self {
        CapabilitySet::Provided(vec![value])
    }
}

/// Holds a cell's current capability set behind an atomically swapped `Arc`.
///
/// Readers get a complete snapshot; writers replace the whole set.
#[derive(Debug, Default)]
pub struct CapabilitySlot {
    current: RwLock<Arc<CapabilitySet>>,
}

impl CapabilitySlot {
    /// Creates a slot holding `initial`.
    pub fn new(initial: CapabilitySet) -> Self {
        Self {
            current: RwLock::new(Arc::new(initial)),
        }
    }

    /// Returns the current snapshot.
    pub fn load(&self) -> Arc<CapabilitySet> {
        Arc::clone(&self.current.read())
    }

    /// Replaces the set. Returns `true` if it differs from the previous one.
    pub fn store(&self, set: CapabilitySet) -> bool {
        let mut current = self.current.write();
        if **current == set {
            return false;
        }
        *current = Arc::new(set);
        true
    }
}
