//! Process-lifetime cell cache with a per-key build gate.
//!
//! # Invariants
//! - At most one `ResidentCell` is ever built per key.
//! - Cached cells are never removed; eviction only deactivates them.
//! - A key is in the cache or in the in-flight table, never both.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use cellworld_common::{CellCoord, NodeId};
use cellworld_records::CellRecord;
use cellworld_scene::Scene;

use crate::pool::{BuildOutcome, PendingBuild};

/// Cache key: the interior name, or `exterior (x, z)` for exterior cells.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellKey(String);

impl CellKey {
    pub fn exterior(coord: CellCoord) -> Self {
        Self(format!("exterior {coord}"))
    }

    /// Interior names are case-insensitive.
    pub fn interior(name: &str) -> Self {
        Self(name.to_ascii_lowercase())
    }

    pub fn for_record(record: &CellRecord) -> Self {
        if record.is_interior() {
            Self::interior(&record.name)
        } else {
            Self::exterior(record.coord)
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CellKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A cell instantiated into the scene.
#[derive(Debug, Clone, PartialEq)]
pub struct ResidentCell {
    pub key: CellKey,
    pub root: NodeId,
    /// Container every placed object is parented under. Toggled for
    /// distance-based visibility.
    pub objects: NodeId,
    pub terrain: Option<NodeId>,
    pub record: Arc<CellRecord>,
}

impl ResidentCell {
    pub fn is_interior(&self) -> bool {
        self.record.is_interior()
    }
}

/// Result of [`CellCache::claim`].
#[derive(Debug)]
pub enum Claim {
    Cached(Arc<ResidentCell>),
    /// Somebody else is building the key.
    InFlight(Arc<PendingBuild>),
    /// The caller now owns the build and must resolve it through
    /// [`CellCache::complete`] or [`CellCache::abandon`].
    Claimed(Arc<PendingBuild>),
}

/// Resident cells keyed by [`CellKey`], shared between the streamer and its
/// build pool.
#[derive(Debug, Default)]
pub struct CellCache {
    cells: RwLock<HashMap<CellKey, Arc<ResidentCell>>>,
    in_flight: Mutex<HashMap<CellKey, Arc<PendingBuild>>>,
    builds: AtomicUsize,
}

impl CellCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &CellKey) -> Option<Arc<ResidentCell>> {
        self.read().get(key).cloned()
    }

    pub fn contains(&self, key: &CellKey) -> bool {
        self.read().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Completed builds since the cache was created.
    pub fn build_count(&self) -> usize {
        self.builds.load(Ordering::Relaxed)
    }

    pub fn in_flight_count(&self) -> usize {
        self.lock_in_flight().len()
    }

    pub fn pending(&self, key: &CellKey) -> Option<Arc<PendingBuild>> {
        self.lock_in_flight().get(key).cloned()
    }

    /// Look the key up and, on a miss, take the build for it unless someone
    /// already has.
    pub fn claim(&self, key: &CellKey) -> Claim {
        if let Some(cell) = self.get(key) {
            return Claim::Cached(cell);
        }
        let mut in_flight = self.lock_in_flight();
        // A build may have completed between the read and taking the lock.
        if let Some(cell) = self.get(key) {
            return Claim::Cached(cell);
        }
        if let Some(pending) = in_flight.get(key) {
            return Claim::InFlight(Arc::clone(pending));
        }
        let pending = Arc::new(PendingBuild::new(key.clone()));
        in_flight.insert(key.clone(), Arc::clone(&pending));
        Claim::Claimed(pending)
    }

    /// Finish a claimed build. `None` marks the key as void: nothing is
    /// cached and waiters see [`BuildOutcome::Empty`].
    pub fn complete(
        &self,
        key: &CellKey,
        cell: Option<ResidentCell>,
    ) -> Option<Arc<ResidentCell>> {
        let cell = cell.map(Arc::new);
        let mut in_flight = self.lock_in_flight();
        let outcome = match &cell {
            Some(cell) => {
                self.write().insert(key.clone(), Arc::clone(cell));
                self.builds.fetch_add(1, Ordering::Relaxed);
                BuildOutcome::Ready(Arc::clone(cell))
            }
            None => BuildOutcome::Empty,
        };
        if let Some(pending) = in_flight.remove(key) {
            pending.resolve(outcome);
        }
        cell
    }

    /// Drop a claimed build without caching anything.
    pub fn abandon(&self, key: &CellKey, outcome: BuildOutcome) {
        if let Some(pending) = self.lock_in_flight().remove(key) {
            pending.resolve(outcome);
        }
    }

    /// Return the cached cell for `key`, building it with `build` on a miss.
    ///
    /// A hit reactivates the cell's root. `build` returning `None` caches
    /// nothing. Blocks while another thread builds the same key; callers that
    /// own a [`crate::BuildPool`] on this thread go through
    /// [`crate::BuildPool::wait`] instead.
    pub fn get_or_build<F>(
        &self,
        key: &CellKey,
        scene: &mut Scene,
        build: F,
    ) -> Option<Arc<ResidentCell>>
    where
        F: FnOnce(&mut Scene) -> Option<ResidentCell>,
    {
        let cell = match self.claim(key) {
            Claim::Cached(cell) => cell,
            Claim::InFlight(pending) => match pending.wait() {
                BuildOutcome::Ready(cell) => cell,
                BuildOutcome::Empty | BuildOutcome::Cancelled => return None,
            },
            Claim::Claimed(_) => return self.complete(key, build(scene)),
        };
        scene.set_active(cell.root, true);
        Some(cell)
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<CellKey, Arc<ResidentCell>>> {
        self.cells.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<CellKey, Arc<ResidentCell>>> {
        self.cells.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_in_flight(&self) -> MutexGuard<'_, HashMap<CellKey, Arc<PendingBuild>>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cellworld_common::Transform;

    fn build_cell(scene: &mut Scene, key: &CellKey) -> ResidentCell {
        let root = scene.spawn(key.as_str(), Transform::default());
        let objects = scene.spawn_child(root, "objects", Transform::default());
        ResidentCell {
            key: key.clone(),
            root,
            objects,
            terrain: None,
            record: Arc::new(CellRecord::exterior(CellCoord::new(0, 0))),
        }
    }

    #[test]
    fn keys() {
        assert_eq!(CellKey::exterior(CellCoord::new(3, -2)).as_str(), "exterior (3, -2)");
        assert_eq!(CellKey::interior("Balmora, Guild"), CellKey::interior("balmora, guild"));
        let interior = CellRecord::interior("Vivec");
        assert_eq!(CellKey::for_record(&interior).as_str(), "vivec");
    }

    #[test]
    fn second_request_is_a_hit() {
        let cache = CellCache::new();
        let mut scene = Scene::new();
        let key = CellKey::exterior(CellCoord::new(0, 0));

        let a = cache
            .get_or_build(&key, &mut scene, |s| Some(build_cell(s, &key)))
            .unwrap();
        scene.set_active(a.root, false);

        let b = cache
            .get_or_build(&key, &mut scene, |_| panic!("must not rebuild"))
            .unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.build_count(), 1);
        assert!(scene.is_active(b.root));
    }

    #[test]
    fn void_build_caches_nothing() {
        let cache = CellCache::new();
        let mut scene = Scene::new();
        let key = CellKey::exterior(CellCoord::new(9, 9));

        assert!(cache.get_or_build(&key, &mut scene, |_| None).is_none());
        assert!(cache.is_empty());
        assert_eq!(cache.build_count(), 0);
        assert_eq!(cache.in_flight_count(), 0);
    }

    #[test]
    fn claim_is_exclusive() {
        let cache = CellCache::new();
        let key = CellKey::interior("vault");

        let Claim::Claimed(owner) = cache.claim(&key) else {
            panic!("first claim should own the build");
        };
        let Claim::InFlight(other) = cache.claim(&key) else {
            panic!("second claim should see the build in flight");
        };
        assert!(Arc::ptr_eq(&owner, &other));

        cache.abandon(&key, BuildOutcome::Cancelled);
        assert!(matches!(other.outcome(), Some(BuildOutcome::Cancelled)));
        assert!(matches!(cache.claim(&key), Claim::Claimed(_)));
    }

    #[test]
    fn waiter_on_another_thread_sees_result() {
        let cache = Arc::new(CellCache::new());
        let key = CellKey::exterior(CellCoord::new(1, 1));
        let Claim::Claimed(_) = cache.claim(&key) else {
            panic!("expected to own the build");
        };

        let waiter = {
            let cache = Arc::clone(&cache);
            let key = key.clone();
            std::thread::spawn(move || {
                let mut scene = Scene::new();
                cache
                    .get_or_build(&key, &mut scene, |_| panic!("must not build"))
                    .map(|cell| cell.key.clone())
            })
        };

        let mut scene = Scene::new();
        let cell = build_cell(&mut scene, &key);
        cache.complete(&key, Some(cell));

        assert_eq!(waiter.join().unwrap(), Some(key));
        assert_eq!(cache.build_count(), 1);
    }
}
