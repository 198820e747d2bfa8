//! Update statistics and the per-tick report

use serde::Serialize;
use std::collections::BTreeSet;
use strata_ir::SceneId;

/// Counters kept by the scene updater
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UpdateStatistics {
    pub ticks: u64,
    pub flushes_received: u64,
    pub flushes_applied: u64,
    pub flushes_force_applied: u64,
    pub flushes_rejected: u64,
    /// Flushes for scenes that were not subscribed
    pub flushes_dropped: u64,
    pub scenes_force_unsubscribed: u64,
    pub resources_uploaded: u64,
    pub effects_requested: u64,
    pub resources_unloaded: u64,
    pub uploads_discarded: u64,
    pub upload_failures: u64,
}

impl UpdateStatistics {
    /// Add another set of counters to this one
    pub fn accumulate(&mut self, other: &UpdateStatistics) {
        self.ticks += other.ticks;
        self.flushes_received += other.flushes_received;
        self.flushes_applied += other.flushes_applied;
        self.flushes_force_applied += other.flushes_force_applied;
        self.flushes_rejected += other.flushes_rejected;
        self.flushes_dropped += other.flushes_dropped;
        self.scenes_force_unsubscribed += other.scenes_force_unsubscribed;
        self.resources_uploaded += other.resources_uploaded;
        self.effects_requested += other.effects_requested;
        self.resources_unloaded += other.resources_unloaded;
        self.uploads_discarded += other.uploads_discarded;
        self.upload_failures += other.upload_failures;
    }
}

/// What one tick did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TickReport {
    pub tick: u64,
    pub now_ms: u64,
    /// Scenes that must be re-rendered
    pub dirty_scenes: BTreeSet<SceneId>,
    /// Scenes whose own content changed this tick
    pub modified_scenes: BTreeSet<SceneId>,
    /// Counters for this tick only
    pub counters: UpdateStatistics,
}

impl TickReport {
    /// Check if a scene must be re-rendered
    pub fn is_dirty(&self, scene: SceneId) -> bool {
        self.dirty_scenes.contains(&scene)
    }
}

/// Callback run once per tick after the dirty set is known
///
/// This is where a scene-reference layer resends or retargets cross-scene
/// references.
pub trait SceneReferenceHook: Send {
    fn on_tick(&mut self, report: &TickReport);
}

impl<F> SceneReferenceHook for F
where
    F: FnMut(&TickReport) + Send,
{
    fn on_tick(&mut self, report: &TickReport) {
        self(report)
    }
}
