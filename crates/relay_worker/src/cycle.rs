use std::time::Instant;

use enostr::RelayReqId;

use crate::job::Category;

/// The subscription a batched category has open on the relay
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionHandle {
    pub category: Category,
    pub sub_id: RelayReqId,
    pub batch: Vec<String>,
    /// `None` when the timeout is too large to ever fire
    pub deadline: Option<Instant>,
}

/// A category either has nothing on the wire or exactly one dispatched
/// batch. Resolving a batch returns the category straight to `Idle`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum CycleState {
    #[default]
    Idle,
    Dispatched(SubscriptionHandle),
}

impl CycleState {
    pub fn is_in_flight(&self) -> bool {
        matches!(self, CycleState::Dispatched(_))
    }

    pub fn handle(&self) -> Option<&SubscriptionHandle> {
        match self {
            CycleState::Idle => None,
            CycleState::Dispatched(handle) => Some(handle),
        }
    }
}

/// Why a cycle ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    EndOfStoredEvents,
    FirstEvent,
    Timeout,
    ClosedByRelay(String),
}

#[derive(Debug, Default)]
pub struct Cycles {
    states: [CycleState; Category::COUNT],
}

impl Cycles {
    pub fn get(&self, category: Category) -> &CycleState {
        &self.states[category.index()]
    }

    pub fn in_flight(&self, category: Category) -> bool {
        self.get(category).is_in_flight()
    }

    /// Record a freshly dispatched batch
    pub fn dispatch(&mut self, handle: SubscriptionHandle) {
        let index = handle.category.index();
        self.states[index] = CycleState::Dispatched(handle);
    }

    /// Return `category` to idle, handing back whatever was in flight
    pub fn take(&mut self, category: Category) -> Option<SubscriptionHandle> {
        match std::mem::take(&mut self.states[category.index()]) {
            CycleState::Idle => None,
            CycleState::Dispatched(handle) => Some(handle),
        }
    }

    /// Like [`Cycles::take`], but only when the in-flight batch was sent
    /// under `sub_id`. Late signals for an older batch leave state alone.
    pub fn take_matching(
        &mut self,
        category: Category,
        sub_id: Option<&str>,
    ) -> Option<SubscriptionHandle> {
        let current = self.get(category).handle()?;
        if let Some(sub_id) = sub_id {
            if current.sub_id.as_str() != sub_id {
                return None;
            }
        }
        self.take(category)
    }

    /// Forget every in-flight batch
    pub fn take_all(&mut self) -> Vec<SubscriptionHandle> {
        Category::DRAIN_ORDER
            .into_iter()
            .filter_map(|category| self.take(category))
            .collect()
    }
}
