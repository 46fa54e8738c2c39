use super::{Action, ActionCatalog, ActionId, ActionRequestData};
use log::{debug, warn};
use std::collections::HashMap;
use std::sync::Arc;

/// Per-prototype pool of [`Action`] instances.
///
/// An instance is owned by exactly one holder at a time: the pool, a
/// blocking queue, a non-blocking set, or a client's playing list. Moving the
/// `Box` between them is the transfer; releasing twice cannot happen.
pub struct ActionFactory {
    catalog: Arc<ActionCatalog>,
    pools: HashMap<ActionId, Vec<Box<Action>>>,
    next_serial: u64,
    created: usize,
}

impl ActionFactory {
    pub fn new(catalog: Arc<ActionCatalog>) -> Self {
        Self {
            catalog,
            pools: HashMap::new(),
            next_serial: 1,
            created: 0,
        }
    }

    pub fn catalog(&self) -> &ActionCatalog {
        &self.catalog
    }

    /// Checks out an instance for `data.action_id`, initialized with `data`.
    /// Returns `None` for an id missing from the catalog.
    pub fn create(&mut self, data: ActionRequestData) -> Option<Box<Action>> {
        let id = data.action_id;
        let mut action = match self.pools.get_mut(&id).and_then(Vec::pop) {
            Some(action) => action,
            None => {
                let Some(config) = self.catalog.get(id) else {
                    warn!("Requested unknown action {}", id);
                    return None;
                };
                self.created += 1;
                debug!("Allocating new instance of {} ({})", config.name, id);
                Box::new(Action::new(Arc::clone(config)))
            }
        };

        let serial = self.next_serial;
        self.next_serial += 1;
        action.initialize(data, serial);
        Some(action)
    }

    /// Resets `action` and returns it to its pool.
    pub fn return_action(&mut self, mut action: Box<Action>) {
        action.reset();
        self.pools.entry(action.action_id()).or_default().push(action);
    }

    /// Instances currently idle in the pool for `id`.
    pub fn pooled_count(&self, id: ActionId) -> usize {
        self.pools.get(&id).map_or(0, Vec::len)
    }

    /// Instances ever allocated, across all prototypes.
    pub fn allocated_count(&self) -> usize {
        self.created
    }
}
