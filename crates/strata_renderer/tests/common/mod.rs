//! Shared fixtures for the renderer integration tests

#![allow(dead_code)]

use strata_ir::*;
use strata_renderer::*;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Updater on a manual clock, plus the clock
pub fn updater_with(config: RendererConfig) -> (SceneUpdater, ManualClock) {
    init_logging();
    let clock = ManualClock::new(1_000);
    let context = RendererContext::new(config, clock.clone()).unwrap();
    (SceneUpdater::new(context).unwrap(), clock)
}

pub fn updater() -> (SceneUpdater, ManualClock) {
    updater_with(RendererConfig::default())
}

/// Publish and subscribe `scene`, applying `first` as its first flush
pub fn subscribe_with(updater: &mut SceneUpdater, scene: SceneId, first: Flush) {
    updater.publish(scene).unwrap();
    updater.subscribe(scene).unwrap();
    updater.handle_scene_update(scene, first).unwrap();
    updater.update_scenes();
    assert_eq!(updater.scene_state(scene), SceneState::Subscribed);
}

pub fn subscribe(updater: &mut SceneUpdater, scene: SceneId) {
    subscribe_with(updater, scene, Flush::new(scene, FlushIndex::new(1)));
}

/// Subscribe and map `scene`; a display must exist
pub fn map(updater: &mut SceneUpdater, scene: SceneId) {
    subscribe(updater, scene);
    updater.map(scene).unwrap();
    updater.update_scenes();
    assert_eq!(updater.scene_state(scene), SceneState::Mapped);
}

pub fn slot_flush(scene: SceneId, index: u64, slot: u32, kind: DataSlotKind, value: DataValue) -> Flush {
    FlushBuilder::new(scene, FlushIndex::new(index))
        .action(SceneAction::CreateDataSlot {
            slot: DataSlotId::new(slot),
            kind,
            value,
        })
        .build()
}

pub fn set_value(scene: SceneId, index: u64, slot: u32, value: DataValue) -> Flush {
    FlushBuilder::new(scene, FlushIndex::new(index))
        .action(SceneAction::SetDataValue {
            slot: DataSlotId::new(slot),
            value,
        })
        .build()
}

/// Unmap, unpublish everything and hand back the device
pub fn teardown(mut updater: SceneUpdater) -> RenderDevice {
    for scene in updater.scenes().to_vec() {
        updater.unpublish(scene).unwrap();
    }
    updater.update_scenes();
    updater.destroy_display().unwrap()
}
