//! In-flight call registry.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use basalt_core::CallId;

use crate::call::Call;

#[derive(Default)]
struct RegistryState {
    calls: HashMap<CallId, Arc<dyn Call>>,
    closed: bool,
}

/// Calls that have been written and await a response, keyed by call ID.
#[derive(Default)]
pub(crate) struct CallRegistry {
    state: Mutex<RegistryState>,
}

impl CallRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Records a call about to be written.
    ///
    /// Returns the call back if the registry has been closed.
    pub(crate) fn register(&self, id: CallId, call: Arc<dyn Call>) -> Result<(), Arc<dyn Call>> {
        let mut state = self.state.lock().expect("call registry lock poisoned");
        if state.closed {
            return Err(call);
        }
        state.calls.insert(id, call);
        Ok(())
    }

    /// Removes and returns the call registered under `id`.
    pub(crate) fn take(&self, id: CallId) -> Option<Arc<dyn Call>> {
        self.state
            .lock()
            .expect("call registry lock poisoned")
            .calls
            .remove(&id)
    }

    /// Closes the registry and returns every outstanding call.
    pub(crate) fn close(&self) -> Vec<Arc<dyn Call>> {
        let mut state = self.state.lock().expect("call registry lock poisoned");
        state.closed = true;
        state.calls.drain().map(|(_, call)| call).collect()
    }

    /// Returns the outstanding call IDs in ascending order.
    pub(crate) fn ids(&self) -> Vec<CallId> {
        let state = self.state.lock().expect("call registry lock poisoned");
        let mut ids: Vec<_> = state.calls.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub(crate) fn len(&self) -> usize {
        self.state.lock().expect("call registry lock poisoned").calls.len()
    }
}
