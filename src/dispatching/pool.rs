//! Activity pool contract.

use parking_lot::RwLock;
use std::sync::Arc;

use crate::models::Activity;

/// Read access to the currently open activities of the line.
pub trait ActivityPool: Send + Sync {
    /// Number of open (not completed) activities matching `predicate`.
    fn count_open(&self, predicate: &dyn Fn(&Activity) -> bool) -> usize;
}

/// Activity pool kept in memory.
#[derive(Debug, Default)]
pub struct InMemoryActivityPool {
    activities: RwLock<Vec<Arc<Activity>>>,
}

impl InMemoryActivityPool {
    /// Creates an empty pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an activity.
    pub fn add(&self, activity: Arc<Activity>) {
        self.activities.write().push(activity);
    }

    /// Drops completed activities, returning how many were removed.
    pub fn purge_completed(&self) -> usize {
        let mut activities = self.activities.write();
        let before = activities.len();
        activities.retain(|a| !a.is_completed());
        before - activities.len()
    }

    /// Number of activities held, open or not.
    pub fn len(&self) -> usize {
        self.activities.read().len()
    }

    /// Whether the pool is empty.
    pub fn is_empty(&self) -> bool {
        self.activities.read().is_empty()
    }
}

impl ActivityPool for InMemoryActivityPool {
    fn count_open(&self, predicate: &dyn Fn(&Activity) -> bool) -> usize {
        self.activities
            .read()
            .iter()
            .filter(|a| !a.is_completed() && predicate(a))
            .count()
    }
}
