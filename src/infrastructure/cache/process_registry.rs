//! Registry of in-flight loading processes and their listeners.
//!
//! Processes live in an arena keyed by [`ProcessId`]; listeners refer to them
//! by id instead of by pointer. A record stays in the arena until its owner has
//! seen every listener leave, even after it stopped being the active process
//! for its key.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, trace};

use crate::domain::entities::{CacheKey, LoadedImage, LoadingDescription};
use crate::domain::ports::LoadSaveNotifier;
use crate::infrastructure::tasks::AccessMode;

/// Handle of a loading process record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProcessId(u64);

/// Handle of a listener registration inside a process record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// A second request waiting for the result of someone else's process.
pub struct Listener {
    description: LoadingDescription,
    access_mode: AccessMode,
    notifier: Arc<dyn LoadSaveNotifier>,
    result: Option<LoadedImage>,
}

impl Listener {
    #[must_use]
    pub fn new(
        description: LoadingDescription,
        access_mode: AccessMode,
        notifier: Arc<dyn LoadSaveNotifier>,
    ) -> Self {
        Self {
            description,
            access_mode,
            notifier,
            result: None,
        }
    }
}

/// One in-flight load.
struct ProcessRecord {
    key: CacheKey,
    description: LoadingDescription,
    completed: bool,
    listeners: HashMap<ListenerId, Listener>,
}

/// Arena of loading processes plus the index of the active one per key.
///
/// Lives inside the loading cache state and is only touched under its lock.
#[derive(Default)]
pub struct ProcessRegistry {
    records: HashMap<ProcessId, ProcessRecord>,
    active: HashMap<CacheKey, ProcessId>,
    next_id: u64,
}

impl ProcessRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    /// Registers a new active process for `description`'s cache key.
    ///
    /// The caller must have seen [`Self::retrieve_loading_process`] return
    /// `None` for that key under the same lock hold.
    pub fn add_loading_process(&mut self, description: &LoadingDescription) -> ProcessId {
        let key = description.cache_key();
        debug_assert!(
            !self.active.contains_key(&key),
            "second active process for {key}"
        );
        let id = ProcessId(self.next_id());
        trace!(key = %key, "Registered loading process");
        self.active.insert(key.clone(), id);
        self.records.insert(
            id,
            ProcessRecord {
                key,
                description: description.clone(),
                completed: false,
                listeners: HashMap::new(),
            },
        );
        id
    }

    /// Returns the active process loading `key`, if any.
    #[must_use]
    pub fn retrieve_loading_process(&self, key: &CacheKey) -> Option<ProcessId> {
        self.active.get(key).copied()
    }

    /// Stops `id` from being found by new requests. The record itself stays
    /// until [`Self::release_process`].
    pub fn remove_loading_process(&mut self, id: ProcessId) {
        let Some(record) = self.records.get(&id) else {
            return;
        };
        if self.active.get(&record.key) == Some(&id) {
            self.active.remove(&record.key);
        }
    }

    /// Attaches a listener. Returns `None` if the process is already gone.
    pub fn add_listener(&mut self, id: ProcessId, listener: Listener) -> Option<ListenerId> {
        let listener_id = ListenerId(self.next_id());
        let record = self.records.get_mut(&id)?;
        record.listeners.insert(listener_id, listener);
        Some(listener_id)
    }

    /// Detaches a listener, handing back whatever result it was given.
    pub fn remove_listener(&mut self, id: ProcessId, listener: ListenerId) -> Option<LoadedImage> {
        self.records
            .get_mut(&id)?
            .listeners
            .remove(&listener)?
            .result
    }

    /// Description the process is loading.
    #[must_use]
    pub fn description(&self, id: ProcessId) -> Option<&LoadingDescription> {
        self.records.get(&id).map(|record| &record.description)
    }

    /// True once the owner has dispatched its result. A released record
    /// counts as completed.
    #[must_use]
    pub fn is_completed(&self, id: ProcessId) -> bool {
        self.records.get(&id).is_none_or(|record| record.completed)
    }

    pub fn set_completed(&mut self, id: ProcessId) {
        if let Some(record) = self.records.get_mut(&id) {
            record.completed = true;
        }
    }

    #[must_use]
    pub fn has_listeners(&self, id: ProcessId) -> bool {
        self.records
            .get(&id)
            .is_some_and(|record| !record.listeners.is_empty())
    }

    #[must_use]
    pub fn listener_count(&self, id: ProcessId) -> usize {
        self.records.get(&id).map_or(0, |record| record.listeners.len())
    }

    /// Hands `image` to every listener: a deep copy for read-write listeners,
    /// a shared handle otherwise.
    pub fn dispatch_result(&mut self, id: ProcessId, image: &LoadedImage) {
        let Some(record) = self.records.get_mut(&id) else {
            return;
        };
        for listener in record.listeners.values_mut() {
            listener.result = Some(match listener.access_mode {
                AccessMode::ReadWrite => image.deep_copy(),
                AccessMode::ReadOnly => image.clone(),
            });
        }
    }

    /// Notifiers of all listeners, paired with the description each of them
    /// asked for. Used to fan progress out.
    #[must_use]
    pub fn listener_notifiers(
        &self,
        id: ProcessId,
    ) -> Vec<(Arc<dyn LoadSaveNotifier>, LoadingDescription)> {
        self.records.get(&id).map_or_else(Vec::new, |record| {
            record
                .listeners
                .values()
                .map(|listener| (Arc::clone(&listener.notifier), listener.description.clone()))
                .collect()
        })
    }

    /// Finds running processes that load a reduced version of the file that
    /// `new_process` now loads in full.
    ///
    /// Returns, for every listener of such a process, its notifier and the
    /// reduced description it is waiting on.
    #[must_use]
    pub fn notify_new_loading_process(
        &self,
        new_process: ProcessId,
    ) -> Vec<(Arc<dyn LoadSaveNotifier>, LoadingDescription)> {
        let Some(new_description) = self.description(new_process) else {
            return Vec::new();
        };
        if new_description.is_reduced_version() {
            return Vec::new();
        }

        let mut targets = Vec::new();
        for &id in self.active.values() {
            if id == new_process {
                continue;
            }
            let Some(record) = self.records.get(&id) else {
                continue;
            };
            if record.description.is_reduced_version()
                && record
                    .description
                    .equals_ignore_reduced_version(new_description)
            {
                debug!(
                    current = %record.key,
                    more_complete = %new_description,
                    "More complete loading started"
                );
                targets.extend(
                    record
                        .listeners
                        .values()
                        .map(|l| (Arc::clone(&l.notifier), record.description.clone())),
                );
            }
        }
        targets
    }

    /// Drops the record. Refused while listeners are still attached.
    pub fn release_process(&mut self, id: ProcessId) -> bool {
        if self.has_listeners(id) {
            return false;
        }
        self.remove_loading_process(id);
        self.records.remove(&id).is_some()
    }

    /// Number of processes that can currently be joined.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Number of records not yet released.
    #[must_use]
    pub fn record_count(&self) -> usize {
        self.records.len()
    }
}
