//! Routines collection as seen by the UI.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, warn};

use crate::cache::{DrainOutcome, LocalFirstCache, QueueEntry, RefreshOutcome};
use crate::clock::Clock;
use crate::config::CacheConfig;
use crate::models::{Exercise, Routine, RoutinePatch};
use crate::remote::RemoteStore;
use crate::storage::KeyValueStore;

/// Local-first cache of one user's workout routines.
pub struct RoutinesCache<R, S>
where
    R: RemoteStore,
    S: KeyValueStore,
{
    cache: LocalFirstCache<Routine, R, S>,
    clock: Arc<dyn Clock>,
}

impl<R, S> RoutinesCache<R, S>
where
    R: RemoteStore,
    S: KeyValueStore,
{
    pub fn new(
        uid: &str,
        config: CacheConfig,
        storage: Arc<S>,
        remote: Arc<R>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            cache: LocalFirstCache::new(uid, config, storage, remote, clock.clone()),
            clock,
        }
    }

    pub fn retrieve_on_load(&self) {
        self.cache.retrieve_on_load();
    }

    pub fn subscribe(&self) -> watch::Receiver<Vec<Routine>> {
        self.cache.subscribe()
    }

    pub fn routines(&self) -> Vec<Routine> {
        self.cache.records()
    }

    pub fn routine(&self, id: &str) -> Option<Routine> {
        self.cache.records().into_iter().find(|r| r.id == id)
    }

    /// Create an empty "Untitled routine" and return its id.
    pub fn add_new_routine(&self) -> String {
        let routine = Routine::untitled(self.cache.uid(), self.clock.now());
        let id = routine.id.clone();
        debug!(id = %id, "Adding routine");
        self.cache.insert(routine);
        id
    }

    /// Apply a partial update. An empty patch does nothing.
    pub fn update_routine(&self, id: &str, patch: RoutinePatch) {
        if patch.is_empty() {
            return;
        }
        match patch.into_fields() {
            Ok(fields) => self.cache.update(id, fields),
            Err(e) => warn!(id, error = %e, "Failed to encode routine patch"),
        }
    }

    pub fn delete_routine(&self, id: &str) {
        self.cache.remove(id);
    }

    /// Append an exercise to a routine. Returns `false` if the routine is not
    /// in the current snapshot.
    pub fn add_exercise(&self, routine_id: &str, exercise: Exercise) -> bool {
        let Some(routine) = self.routine(routine_id) else {
            return false;
        };
        let mut exercises = routine.exercises;
        exercises.push(exercise);
        self.update_routine(routine_id, RoutinePatch::exercises(exercises));
        true
    }

    /// Drop an exercise from a routine. Returns `false` if either is missing.
    pub fn remove_exercise(&self, routine_id: &str, exercise_id: &str) -> bool {
        let Some(routine) = self.routine(routine_id) else {
            return false;
        };
        if routine.exercise(exercise_id).is_none() {
            return false;
        }
        let exercises = routine
            .exercises
            .into_iter()
            .filter(|e| e.id != exercise_id)
            .collect();
        self.update_routine(routine_id, RoutinePatch::exercises(exercises));
        true
    }

    pub fn pending(&self) -> Vec<QueueEntry<Routine>> {
        self.cache.pending()
    }

    pub async fn sync_queue(&self) -> DrainOutcome {
        self.cache.sync_queue().await
    }

    pub async fn refresh_from_remote(&self) -> RefreshOutcome {
        self.cache.refresh_from_remote().await
    }

    pub fn set_online(&self, online: bool) {
        self.cache.set_online(online);
    }

    pub fn shutdown(&self) {
        self.cache.shutdown();
    }
}
