//! Change notification for hosts holding derived state.

use std::sync::Arc;

use crate::cache::TagDefId;
use crate::tag_definition::TagDefinition;

/// Receives schema-change events from the manager.
pub trait MannequinListener: Send + Sync {
    /// `def` changed structurally (renamed tags, fragment ids added or
    /// removed, definition replaced). Cached tag states may be stale.
    fn on_tag_def_invalidated(&self, id: TagDefId, def: &TagDefinition);
}

/// Token returned by registration, used to unregister.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

#[derive(Default)]
pub struct Listeners {
    next_id: u64,
    entries: Vec<(ListenerId, Arc<dyn MannequinListener>)>,
}

impl std::fmt::Debug for Listeners {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listeners")
            .field("count", &self.entries.len())
            .finish()
    }
}

impl Listeners {
    pub fn register(&mut self, listener: Arc<dyn MannequinListener>) -> ListenerId {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        self.entries.push((id, listener));
        id
    }

    pub fn unregister(&mut self, id: ListenerId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(entry, _)| *entry != id);
        self.entries.len() != before
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Listeners registered right now. Notification iterates this copy so the
    /// live list may change while callbacks run.
    pub fn snapshot(&self) -> Vec<Arc<dyn MannequinListener>> {
        self.entries.iter().map(|(_, l)| Arc::clone(l)).collect()
    }

    pub fn notify(&self, id: TagDefId, def: &TagDefinition) {
        for listener in self.snapshot() {
            listener.on_tag_def_invalidated(id, def);
        }
    }
}
