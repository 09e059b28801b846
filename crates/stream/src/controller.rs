use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use cellworld_common::CellCoord;
use cellworld_records::{CellRecord, WorldDatabase};
use cellworld_scene::{Scene, SceneEvent};
use glam::Vec3;

use crate::build::CellFactory;
use crate::cache::{CellCache, CellKey, ResidentCell};
use crate::config::{BuildMode, MAX_STREAMING_RADIUS, StreamConfig};
use crate::grid::{CellGrid, in_window, rings};
use crate::pool::{BuildOutcome, BuildPool, BuildTicket};
use crate::stats::StreamStats;

/// Ways to name an interior cell.
#[derive(Debug, Clone)]
pub enum InteriorLookup {
    Name(String),
    Coord(CellCoord),
    Record(Arc<CellRecord>),
}

/// What one [`CellStreamer::update_streaming`] call did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateReport {
    pub viewer_cell: CellCoord,
    /// Cells that became tracked, in the order they were requested.
    pub loaded: Vec<CellCoord>,
    pub evicted: Vec<CellCoord>,
    /// Coordinates inside the window with no cell record.
    pub skipped: Vec<CellCoord>,
    /// Background builds still outstanding after the update.
    pub pending: usize,
    /// Background builds cancelled because they left the window.
    pub cancelled: usize,
}

/// Keeps the cells around a moving viewpoint resident.
///
/// Owns the streaming set: the cells currently tracked, keyed by coordinate.
/// Interiors are tracked under [`CellCoord::INTERIOR`].
pub struct CellStreamer {
    config: StreamConfig,
    grid: CellGrid,
    db: Arc<dyn WorldDatabase>,
    cache: Arc<CellCache>,
    factory: CellFactory,
    pool: Option<BuildPool>,
    tracked: BTreeMap<CellCoord, Arc<ResidentCell>>,
    pending: BTreeMap<CellCoord, BuildTicket>,
    /// Viewer cell and detail radius of the last update.
    last_view: Option<(CellCoord, u32)>,
    stats: StreamStats,
}

impl CellStreamer {
    pub fn new(config: StreamConfig, factory: CellFactory) -> Self {
        Self::with_cache(config, factory, Arc::new(CellCache::new()))
    }

    /// Streamer sharing an existing cache.
    pub fn with_cache(
        config: StreamConfig,
        mut factory: CellFactory,
        cache: Arc<CellCache>,
    ) -> Self {
        let config = config.validated();
        factory.set_cell_side_length(config.cell_side_length);
        let db = Arc::clone(factory.database());

        let pool = match config.build_mode {
            BuildMode::Synchronous => None,
            BuildMode::Background { workers } => {
                match BuildPool::new(workers, Arc::clone(&db), Arc::clone(&cache)) {
                    Ok(pool) => Some(pool),
                    Err(err) => {
                        tracing::warn!(
                            %err,
                            "failed to start build workers, building synchronously"
                        );
                        None
                    }
                }
            }
        };

        Self {
            grid: CellGrid::new(config.cell_side_length),
            config,
            db,
            cache,
            factory,
            pool,
            tracked: BTreeMap::new(),
            pending: BTreeMap::new(),
            last_view: None,
            stats: StreamStats::default(),
        }
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    pub fn grid(&self) -> &CellGrid {
        &self.grid
    }

    pub fn cache(&self) -> &Arc<CellCache> {
        &self.cache
    }

    pub fn factory(&self) -> &CellFactory {
        &self.factory
    }

    pub fn stats(&self) -> &StreamStats {
        &self.stats
    }

    pub fn is_background(&self) -> bool {
        self.pool.is_some()
    }

    pub fn tracked(&self) -> &BTreeMap<CellCoord, Arc<ResidentCell>> {
        &self.tracked
    }

    pub fn is_tracked(&self, coord: CellCoord) -> bool {
        self.tracked.contains_key(&coord)
    }

    pub fn tracked_cell(&self, coord: CellCoord) -> Option<&Arc<ResidentCell>> {
        self.tracked.get(&coord)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Bring the streaming set in line with `viewpoint`.
    ///
    /// `radius_override` replaces the streaming radius for this call only and
    /// is capped at [`MAX_STREAMING_RADIUS`]. The scene's event log is drained
    /// into [`StreamStats`].
    pub fn update_streaming(
        &mut self,
        scene: &mut Scene,
        viewpoint: Vec3,
        radius_override: Option<u32>,
    ) -> UpdateReport {
        let _span = tracing::info_span!("stream_update").entered();
        let start = Instant::now();

        let radius = radius_override
            .unwrap_or(self.config.streaming_radius)
            .min(MAX_STREAMING_RADIUS);
        let detail = self.config.detail_radius.min(radius);
        let viewer = self.grid.position_to_cell(viewpoint);
        let mut report = UpdateReport {
            viewer_cell: viewer,
            ..UpdateReport::default()
        };

        // Evict everything outside the window.
        let outside: Vec<CellCoord> = self
            .tracked
            .keys()
            .filter(|c| !in_window(viewer, radius, **c))
            .copied()
            .collect();
        for coord in outside {
            if self.untrack(scene, coord) {
                report.evicted.push(coord);
            }
        }
        let stale: Vec<CellCoord> = self
            .pending
            .keys()
            .filter(|c| !in_window(viewer, radius, **c))
            .copied()
            .collect();
        for coord in stale {
            self.cancel_pending(coord);
            report.cancelled += 1;
        }

        self.collect_finished(scene, &mut report);

        // Request missing cells, nearest ring first.
        let budget = self.config.load_budget.unwrap_or(usize::MAX);
        let mut requested = 0;
        for coord in rings(viewer, radius) {
            if self.tracked.contains_key(&coord) || self.pending.contains_key(&coord) {
                continue;
            }
            if requested >= budget {
                break;
            }
            match self.request_exterior(scene, coord) {
                Requested::Loaded(cell) => {
                    requested += 1;
                    self.track(scene, coord, cell);
                    report.loaded.push(coord);
                }
                Requested::Pending => requested += 1,
                Requested::Void => {
                    tracing::trace!(%coord, "no cell record");
                    report.skipped.push(coord);
                }
            }
        }

        self.apply_visibility(scene, viewer, detail);
        self.last_view = Some((viewer, detail));
        report.pending = self.pending.len();

        let events = scene.drain_events();
        let activations = events
            .iter()
            .filter(|e| matches!(e, SceneEvent::ActivationChanged { .. }))
            .count();

        self.stats = StreamStats {
            cells_loaded_this_update: report.loaded.len(),
            cells_evicted_this_update: report.evicted.len(),
            cells_skipped_this_update: report.skipped.len(),
            tracked_cells: self.tracked.len(),
            pending_builds: self.pending.len(),
            scene_events_this_update: events.len(),
            activations_this_update: activations,
            update_time: start.elapsed(),
        };

        tracing::trace!(
            viewer = %viewer,
            loaded = report.loaded.len(),
            evicted = report.evicted.len(),
            skipped = report.skipped.len(),
            pending = report.pending,
            total = self.tracked.len(),
            scene_events = events.len(),
            "stream update complete"
        );

        report
    }

    /// Block until every background build requested so far has committed,
    /// then track the results. Returns the coordinates that became tracked.
    pub fn flush_pending(&mut self, scene: &mut Scene) -> Vec<CellCoord> {
        if let Some(pool) = self.pool.as_mut() {
            pool.wait_all(scene, &mut self.factory);
        }
        let mut report = UpdateReport::default();
        self.collect_finished(scene, &mut report);
        if let Some((viewer, detail)) = self.last_view {
            self.apply_visibility(scene, viewer, detail);
        }
        report.loaded
    }

    /// Stop tracking `coord`: its root is deactivated and the cache keeps the
    /// cell. Returns `false` (with a warning) if the coordinate is not
    /// tracked.
    pub fn evict(&mut self, scene: &mut Scene, coord: CellCoord) -> bool {
        if self.pending.contains_key(&coord) {
            self.cancel_pending(coord);
        }
        if self.untrack(scene, coord) {
            return true;
        }
        tracing::warn!(%coord, "evict requested for untracked cell");
        false
    }

    /// Leave the exterior and track a single interior cell.
    ///
    /// Once the interior resolves, every other tracked cell is deactivated.
    /// Returns `None` (and changes nothing) if the interior cannot be found
    /// or is still being built elsewhere.
    pub fn request_interior_cell(
        &mut self,
        scene: &mut Scene,
        lookup: InteriorLookup,
    ) -> Option<Arc<ResidentCell>> {
        let _span = tracing::info_span!("interior_request").entered();
        let record = match &lookup {
            InteriorLookup::Name(name) => self.db.find_interior_cell(name),
            InteriorLookup::Coord(coord) => self.db.find_interior_cell_at(*coord),
            InteriorLookup::Record(record) => Some(Arc::clone(record)),
        };
        let Some(record) = record else {
            tracing::warn!(?lookup, "interior cell not found");
            return None;
        };

        let key = CellKey::for_record(&record);
        let cell = match self.pool.as_mut() {
            Some(pool) => {
                let ticket = pool.request(record);
                let outcome = match ticket.try_outcome() {
                    Some(outcome) => Some(outcome),
                    None => pool.wait(&key, scene, &mut self.factory),
                };
                outcome.and_then(|o| o.cell().cloned())
            }
            None => {
                let factory = &mut self.factory;
                self.cache
                    .get_or_build(&key, scene, |scene| Some(factory.build(scene, record)))
            }
        };
        let Some(cell) = cell else {
            tracing::warn!(%key, "interior did not resolve, staying put");
            return None;
        };

        self.destroy_all_tracked(scene);
        self.track(scene, CellCoord::INTERIOR, Arc::clone(&cell));
        scene.set_active(cell.objects, true);
        Some(cell)
    }

    /// Deactivate and forget every tracked cell and cancel outstanding
    /// builds. Cached cells survive.
    pub fn destroy_all_tracked(&mut self, scene: &mut Scene) {
        let coords: Vec<CellCoord> = self.tracked.keys().copied().collect();
        for coord in coords {
            self.untrack(scene, coord);
        }
        let pending: Vec<CellCoord> = self.pending.keys().copied().collect();
        for coord in pending {
            self.cancel_pending(coord);
        }
    }

    fn request_exterior(&mut self, scene: &mut Scene, coord: CellCoord) -> Requested {
        let key = CellKey::exterior(coord);
        match self.pool.as_mut() {
            None => {
                let db = &self.db;
                let factory = &mut self.factory;
                let cell = self.cache.get_or_build(&key, scene, |scene| {
                    let record = db.find_exterior_cell(coord)?;
                    Some(factory.build(scene, record))
                });
                match cell {
                    Some(cell) => Requested::Loaded(cell),
                    None => Requested::Void,
                }
            }
            Some(pool) => {
                if let Some(cell) = self.cache.get(&key) {
                    return Requested::Loaded(cell);
                }
                let Some(record) = self.db.find_exterior_cell(coord) else {
                    return Requested::Void;
                };
                let ticket = pool.request(record);
                match ticket.try_outcome() {
                    Some(BuildOutcome::Ready(cell)) => Requested::Loaded(cell),
                    Some(BuildOutcome::Empty) => Requested::Void,
                    Some(BuildOutcome::Cancelled) | None => {
                        self.pending.insert(coord, ticket);
                        Requested::Pending
                    }
                }
            }
        }
    }

    /// Commit finished background builds and track the ones still wanted.
    fn collect_finished(&mut self, scene: &mut Scene, report: &mut UpdateReport) {
        let Some(pool) = self.pool.as_mut() else {
            return;
        };
        pool.poll(scene, &mut self.factory);

        let ready: Vec<CellCoord> = self
            .pending
            .iter()
            .filter(|(_, ticket)| ticket.is_ready())
            .map(|(coord, _)| *coord)
            .collect();
        for coord in ready {
            let Some(ticket) = self.pending.remove(&coord) else {
                continue;
            };
            match ticket.try_outcome() {
                Some(BuildOutcome::Ready(cell)) => {
                    self.track(scene, coord, cell);
                    report.loaded.push(coord);
                }
                Some(BuildOutcome::Empty) => report.skipped.push(coord),
                Some(BuildOutcome::Cancelled) | None => {}
            }
        }
    }

    fn track(&mut self, scene: &mut Scene, coord: CellCoord, cell: Arc<ResidentCell>) {
        tracing::debug!(%coord, key = %cell.key, "loading cell");
        scene.set_active(cell.root, true);
        self.tracked.insert(coord, cell);
    }

    fn untrack(&mut self, scene: &mut Scene, coord: CellCoord) -> bool {
        let Some(cell) = self.tracked.remove(&coord) else {
            return false;
        };
        tracing::debug!(%coord, key = %cell.key, "evicting cell");
        scene.set_active(cell.root, false);
        true
    }

    fn cancel_pending(&mut self, coord: CellCoord) {
        if let Some(ticket) = self.pending.remove(&coord) {
            if let Some(pool) = self.pool.as_mut() {
                pool.cancel(ticket.key());
            }
        }
    }

    fn apply_visibility(&self, scene: &mut Scene, viewer: CellCoord, detail: u32) {
        for (coord, cell) in &self.tracked {
            let visible = coord.is_interior_sentinel() || in_window(viewer, detail, *coord);
            scene.set_active(cell.objects, visible);
        }
    }
}

enum Requested {
    Loaded(Arc<ResidentCell>),
    Pending,
    Void,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::Claim;
    use crate::grid::MAX_CELL_COORD;
    use cellworld_records::MemoryDatabase;
    use cellworld_terrain::TerrainConfig;

    fn world(radius: i32) -> Arc<dyn WorldDatabase> {
        let mut db = MemoryDatabase::new();
        for x in -radius..=radius {
            for z in -radius..=radius {
                db.insert_cell(CellRecord::exterior(CellCoord::new(x, z))).unwrap();
            }
        }
        db.insert_cell(CellRecord::interior("Cellar")).unwrap();
        Arc::new(db)
    }

    fn streamer(config: StreamConfig, radius: i32) -> CellStreamer {
        let factory = CellFactory::placeholder(world(radius), TerrainConfig::default());
        CellStreamer::new(config, factory)
    }

    fn small() -> StreamConfig {
        StreamConfig {
            streaming_radius: 1,
            detail_radius: 0,
            cell_side_length: 16.0,
            ..StreamConfig::default()
        }
    }

    #[test]
    fn loads_window_in_ring_order() {
        let mut streamer = streamer(small(), 4);
        let mut scene = Scene::new();

        let report = streamer.update_streaming(&mut scene, Vec3::new(8.0, 0.0, 8.0), None);
        assert_eq!(report.viewer_cell, CellCoord::new(0, 0));
        assert_eq!(report.loaded.len(), 9);
        assert_eq!(report.loaded[0], CellCoord::new(0, 0));
        assert_eq!(streamer.stats().tracked_cells, 9);
    }

    #[test]
    fn void_cells_are_skipped_and_retried() {
        let mut streamer = streamer(small(), 0);
        let mut scene = Scene::new();

        let report = streamer.update_streaming(&mut scene, Vec3::ZERO, None);
        assert_eq!(report.loaded, vec![CellCoord::new(0, 0)]);
        assert_eq!(report.skipped.len(), 8);

        let report = streamer.update_streaming(&mut scene, Vec3::ZERO, None);
        assert!(report.loaded.is_empty());
        assert_eq!(report.skipped.len(), 8);
        assert_eq!(streamer.cache().build_count(), 1);
    }

    #[test]
    fn load_budget_spreads_requests() {
        let config = StreamConfig {
            load_budget: Some(4),
            ..small()
        };
        let mut streamer = streamer(config, 4);
        let mut scene = Scene::new();

        let first = streamer.update_streaming(&mut scene, Vec3::ZERO, None);
        assert_eq!(first.loaded.len(), 4);
        let second = streamer.update_streaming(&mut scene, Vec3::ZERO, None);
        assert_eq!(second.loaded.len(), 4);
        let third = streamer.update_streaming(&mut scene, Vec3::ZERO, None);
        assert_eq!(third.loaded.len(), 1);
        assert_eq!(streamer.tracked().len(), 9);
    }

    #[test]
    fn radius_override_is_one_shot() {
        let mut streamer = streamer(small(), 4);
        let mut scene = Scene::new();

        let report = streamer.update_streaming(&mut scene, Vec3::ZERO, Some(2));
        assert_eq!(report.loaded.len(), 25);
        let report = streamer.update_streaming(&mut scene, Vec3::ZERO, None);
        assert_eq!(report.evicted.len(), 16);
        assert_eq!(streamer.tracked().len(), 9);
    }

    #[test]
    fn evict_untracked_is_rejected() {
        let mut streamer = streamer(small(), 4);
        let mut scene = Scene::new();
        streamer.update_streaming(&mut scene, Vec3::ZERO, None);

        assert!(!streamer.evict(&mut scene, CellCoord::new(40, 40)));
        let cell = Arc::clone(streamer.tracked_cell(CellCoord::new(1, 1)).unwrap());
        assert!(streamer.evict(&mut scene, CellCoord::new(1, 1)));
        assert!(!scene.is_active(cell.root));
        assert!(streamer.cache().contains(&cell.key));
    }

    #[test]
    fn interior_replaces_exterior() {
        let mut streamer = streamer(small(), 4);
        let mut scene = Scene::new();
        streamer.update_streaming(&mut scene, Vec3::ZERO, None);
        let exterior = Arc::clone(streamer.tracked_cell(CellCoord::new(0, 0)).unwrap());

        let interior = streamer
            .request_interior_cell(&mut scene, InteriorLookup::Name("cellar".into()))
            .unwrap();
        assert_eq!(streamer.tracked().len(), 1);
        assert!(streamer.is_tracked(CellCoord::INTERIOR));
        assert!(!scene.is_active(exterior.root));
        assert!(scene.is_active_in_hierarchy(interior.objects));

        // Walking back out evicts the interior like any other cell.
        let report = streamer.update_streaming(&mut scene, Vec3::ZERO, None);
        assert_eq!(report.evicted, vec![CellCoord::INTERIOR]);
        assert!(!scene.is_active(interior.root));
        assert!(scene.is_active(exterior.root));
        assert_eq!(streamer.cache().build_count(), 10);
    }

    #[test]
    fn unknown_interior_changes_nothing() {
        let mut streamer = streamer(small(), 4);
        let mut scene = Scene::new();
        streamer.update_streaming(&mut scene, Vec3::ZERO, None);

        let result =
            streamer.request_interior_cell(&mut scene, InteriorLookup::Name("nowhere".into()));
        assert!(result.is_none());
        assert_eq!(streamer.tracked().len(), 9);
    }

    #[test]
    fn destroy_all_tracked_keeps_cache() {
        let mut streamer = streamer(small(), 4);
        let mut scene = Scene::new();
        streamer.update_streaming(&mut scene, Vec3::ZERO, None);

        streamer.destroy_all_tracked(&mut scene);
        assert!(streamer.tracked().is_empty());
        assert_eq!(streamer.cache().len(), 9);

        let report = streamer.update_streaming(&mut scene, Vec3::ZERO, None);
        assert_eq!(report.loaded.len(), 9);
        assert_eq!(streamer.cache().build_count(), 9);
    }

    #[test]
    fn far_viewpoints_and_huge_radius_do_not_panic() {
        let mut streamer = streamer(small(), 4);
        let mut scene = Scene::new();

        let report =
            streamer.update_streaming(&mut scene, Vec3::new(1.0e30, 0.0, 0.0), Some(u32::MAX));
        assert_eq!(report.viewer_cell, CellCoord::new(MAX_CELL_COORD, 0));
        assert!(report.loaded.is_empty());
        let side = 2 * MAX_STREAMING_RADIUS as usize + 1;
        assert_eq!(report.skipped.len(), side * side);

        let report = streamer.update_streaming(&mut scene, Vec3::splat(-1.0e30), None);
        assert!(!report.viewer_cell.is_interior_sentinel());
        assert!(streamer.tracked().is_empty());

        let report = streamer.update_streaming(&mut scene, Vec3::ZERO, None);
        assert_eq!(report.loaded.len(), 9);
    }

    #[test]
    fn scene_events_drained_each_update() {
        let mut streamer = streamer(small(), 4);
        let mut scene = Scene::new();
        let east = Vec3::new(24.0, 0.0, 8.0);

        for step in 0..200 {
            let viewpoint = if step % 2 == 0 { Vec3::ZERO } else { east };
            streamer.update_streaming(&mut scene, viewpoint, None);
            assert!(scene.events().is_empty());
            if step > 0 {
                assert!(streamer.stats().activations_this_update > 0);
            }
        }
        let stats = streamer.stats();
        assert!(stats.scene_events_this_update >= stats.activations_this_update);
    }

    #[test]
    fn interior_building_elsewhere_keeps_exterior() {
        let cache = Arc::new(CellCache::new());
        let config = StreamConfig {
            build_mode: BuildMode::Background { workers: 1 },
            ..small()
        };
        let factory = CellFactory::placeholder(world(4), TerrainConfig::default());
        let mut streamer = CellStreamer::with_cache(config, factory, Arc::clone(&cache));
        let mut scene = Scene::new();
        streamer.update_streaming(&mut scene, Vec3::ZERO, None);
        streamer.flush_pending(&mut scene);
        assert_eq!(streamer.tracked().len(), 9);

        let Claim::Claimed(_other_builder) = cache.claim(&CellKey::interior("Cellar")) else {
            panic!("interior should be unclaimed");
        };
        let result =
            streamer.request_interior_cell(&mut scene, InteriorLookup::Name("cellar".into()));
        assert!(result.is_none());
        assert_eq!(streamer.tracked().len(), 9);
        assert!(!streamer.is_tracked(CellCoord::INTERIOR));
        let origin = streamer.tracked_cell(CellCoord::new(0, 0)).unwrap();
        assert!(scene.is_active(origin.root));
    }
}
