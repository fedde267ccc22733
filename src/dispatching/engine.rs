//! Dispatch engine: capability matching followed by a selector chain.

use std::sync::Arc;
use tracing::debug;

use super::CellSelector;
use crate::capabilities::MatchPolicy;
use crate::models::Activity;
use crate::registry::CellView;

/// Matches activities against cells and runs the selector chain.
///
/// # Example
/// ```
/// use cell_dispatch::dispatching::{DispatchEngine, LoadBalancer};
///
/// let engine = DispatchEngine::new().with_selector(LoadBalancer::new());
/// ```
#[derive(Clone, Default)]
pub struct DispatchEngine {
    selectors: Vec<Arc<dyn CellSelector>>,
    policy: MatchPolicy,
}

impl DispatchEngine {
    /// Creates an engine without selectors and with the default match policy.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a selector to the chain.
    pub fn with_selector<S: CellSelector + 'static>(mut self, selector: S) -> Self {
        self.selectors.push(Arc::new(selector));
        self
    }

    /// Appends a shared selector to the chain.
    pub fn with_shared_selector(mut self, selector: Arc<dyn CellSelector>) -> Self {
        self.selectors.push(selector);
        self
    }

    /// Sets the match policy.
    pub fn with_match_policy(mut self, policy: MatchPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Match policy in use.
    pub fn match_policy(&self) -> &MatchPolicy {
        &self.policy
    }

    /// Cells whose capabilities satisfy the activity's requirement, in input order.
    ///
    /// An empty result means no cell can run the activity right now.
    pub fn candidates(&self, activity: &Activity, cells: &[CellView]) -> Vec<CellView> {
        let required = activity.required_capabilities();
        cells
            .iter()
            .filter(|cell| cell.capabilities.provides_with(&required, &self.policy))
            .cloned()
            .collect()
    }

    /// Matches, then applies every selector in order.
    pub fn dispatch(&self, activity: &Arc<Activity>, cells: &[CellView]) -> Vec<CellView> {
        let mut ranked = self.candidates(activity, cells);
        for selector in &self.selectors {
            ranked = selector.select_cells(activity, &ranked);
        }
        debug!(
            activity = %activity.id,
            candidates = ranked.len(),
            top = ?ranked.first().map(|c| c.id),
            "dispatched"
        );
        ranked
    }

    /// The best cell for the activity.
    pub fn select_best(&self, activity: &Arc<Activity>, cells: &[CellView]) -> Option<CellView> {
        self.dispatch(activity, cells).into_iter().next()
    }
}

impl std::fmt::Debug for DispatchEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchEngine")
            .field(
                "selectors",
                &self.selectors.iter().map(|s| s.name()).collect::<Vec<_>>(),
            )
            .field("policy", &self.policy)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::{
        AssemblyCapabilities, Capability, CapabilitySet, ReservationPolicy, TestCapabilities,
    };
    use crate::dispatching::LoadBalancer;
    use crate::models::{
        ActivityId, ActivityParameters, CellId, MaterialChangeParameters, TestParameters,
    };

    fn view(id: u64, set: CapabilitySet) -> CellView {
        CellView::new(CellId(id), format!("cell-{id}"), Arc::new(set))
    }

    fn test_activity(voltage: u32) -> Arc<Activity> {
        Arc::new(Activity::new(
            ActivityId(1),
            ActivityParameters::Test(TestParameters {
                voltage,
                execution_time_sec: 1,
            }),
        ))
    }

    #[test]
    fn test_candidates_filter_by_capability() {
        let cells = vec![
            view(1, CapabilitySet::single(TestCapabilities::with_voltage(12))),
            view(2, CapabilitySet::single(TestCapabilities::with_voltage(24))),
            view(3, CapabilitySet::null()),
            view(4, CapabilitySet::single(Capability::Packing)),
        ];
        let engine = DispatchEngine::new();

        let ids: Vec<_> = engine
            .candidates(&test_activity(24), &cells)
            .iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(ids, vec![CellId(2)]);

        // don't-care voltage
        assert_eq!(engine.candidates(&test_activity(0), &cells).len(), 2);
    }

    #[test]
    fn test_no_match_is_empty() {
        let cells = vec![view(1, CapabilitySet::single(Capability::Packing))];
        let engine = DispatchEngine::new().with_selector(LoadBalancer::new());
        assert!(engine.dispatch(&test_activity(12), &cells).is_empty());
        assert!(engine.select_best(&test_activity(12), &cells).is_none());
    }

    #[test]
    fn test_match_policy_applies() {
        let reserved = view(
            1,
            CapabilitySet::single(AssemblyCapabilities::new().with_reservations(["O-1"])),
        );
        let change = Arc::new(Activity::new(
            ActivityId(2),
            ActivityParameters::MaterialChange(MaterialChangeParameters {
                material: Some("M-2".into()),
                instructions: Vec::new(),
            }),
        ));

        let strict = DispatchEngine::new();
        assert!(strict.dispatch(&change, &[reserved.clone()]).is_empty());

        let lenient = DispatchEngine::new().with_match_policy(MatchPolicy {
            empty_reservations: ReservationPolicy::Unconstrained,
        });
        assert_eq!(lenient.dispatch(&change, &[reserved]).len(), 1);
    }
}
