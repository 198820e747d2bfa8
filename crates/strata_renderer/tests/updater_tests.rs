//! Integration tests for the scene updater
//!
//! Full flows through the public API: transport to tick, mapping with
//! uploads, links, offscreen and stream buffers, expiration and the display.

mod common;

use common::*;
use std::sync::{Arc, Mutex};
use strata_ir::*;
use strata_renderer::*;

#[test]
fn test_transport_to_rendered_scene() {
    let (mut updater, _clock) = updater();
    updater.create_display(RenderDevice::software(None)).unwrap();

    let transport = SceneTransport::default();
    let mut producer = transport.producer();
    let scene = SceneId::new(1);

    producer.publish(scene).unwrap();
    assert!(updater.dispatch_transport(&transport).is_empty());
    updater.subscribe(scene).unwrap();

    let effect = ResourceDescriptor::effect("flat", "void main() {}");
    let flush = producer
        .begin_flush(scene)
        .unwrap()
        .action(SceneAction::AllocateDataBuffer {
            handle: DataBufferHandle::new(1),
            kind: DataBufferKind::Vertex,
            max_size_bytes: 12,
        })
        .action(SceneAction::UpdateDataBuffer {
            handle: DataBufferHandle::new(1),
            offset: 0,
            data: vec![1; 12],
        })
        .action(SceneAction::AllocateVertexArray {
            handle: VertexArrayHandle::new(1),
            effect: effect.hash,
            index_buffer: None,
            vertex_buffers: vec![DataBufferHandle::new(1)],
        })
        .add_resource(effect.clone())
        .build();
    producer.send(flush).unwrap();
    assert!(updater.dispatch_transport(&transport).is_empty());

    updater.update_scenes();
    assert_eq!(updater.scene_state(scene), SceneState::Subscribed);

    updater.map(scene).unwrap();
    updater.update_scenes();
    assert_eq!(updater.scene_state(scene), SceneState::MapRequested);
    assert!(matches!(
        updater.resource_status(effect.hash),
        Some(ResourceStatus::Uploading(_))
    ));

    assert!(updater.wait_for_pending_uploads(std::time::Duration::from_secs(5)));
    updater.update_scenes();
    assert_eq!(updater.resource_status(effect.hash), Some(ResourceStatus::Uploaded));
    assert_eq!(updater.scene_state(scene), SceneState::Mapped);
    assert_eq!(updater.resource_memory_usage(scene, MemoryCategory::DataBuffers), 12);

    updater.show(scene).unwrap();
    let report = updater.update_scenes();
    assert_eq!(updater.scene_state(scene), SceneState::Rendered);
    assert!(report.is_dirty(scene));

    let events = updater.drain_events();
    assert!(events.contains(&RendererEvent::SceneMapped {
        scene,
        result: EventResult::Ok,
    }));

    let device = teardown(updater);
    assert_eq!(device.object_count(), 0);
    assert_eq!(device.memory_used(), 0);
}

#[test]
fn test_lifecycle_events() {
    let (mut updater, _clock) = updater();
    updater.create_display(RenderDevice::null(None)).unwrap();
    let scene = SceneId::new(1);
    map(&mut updater, scene);
    updater.unmap(scene).unwrap();
    updater.update_scenes();
    updater.unsubscribe(scene).unwrap();
    updater.update_scenes();
    updater.unpublish(scene).unwrap();

    let lifecycle: Vec<_> = updater
        .drain_events()
        .into_iter()
        .filter(|event| event.scene() == Some(scene))
        .collect();
    assert_eq!(
        lifecycle,
        vec![
            RendererEvent::ScenePublished { scene, result: EventResult::Ok },
            RendererEvent::SceneSubscribed { scene, result: EventResult::Ok },
            RendererEvent::SceneMapped { scene, result: EventResult::Ok },
            RendererEvent::SceneUnmapped { scene, result: EventResult::Ok },
            RendererEvent::SceneUnsubscribed { scene, result: EventResult::Ok },
            RendererEvent::SceneUnpublished { scene, result: EventResult::Ok },
        ]
    );
    assert_eq!(updater.scene_state(scene), SceneState::Unknown);
}

#[test]
fn test_illegal_request_emits_failed_event() {
    let (mut updater, _clock) = updater();
    let scene = SceneId::new(1);
    updater.publish(scene).unwrap();
    updater.drain_events();

    assert!(matches!(updater.show(scene), Err(RendererError::State { .. })));
    assert_eq!(
        updater.drain_events(),
        vec![RendererEvent::SceneShown {
            scene,
            result: EventResult::Failed,
        }]
    );
    assert_eq!(updater.scene_state(scene), SceneState::Published);
}

#[test]
fn test_show_and_hide_mark_scene_dirty() {
    let (mut updater, _clock) = updater();
    updater.create_display(RenderDevice::null(None)).unwrap();
    let scene = SceneId::new(1);
    map(&mut updater, scene);
    updater.show(scene).unwrap();
    updater.hide(scene).unwrap();

    let report = updater.update_scenes();
    assert!(report.is_dirty(scene));
    teardown(updater);
}

#[test]
fn test_version_tag_reported() {
    let (mut updater, _clock) = updater();
    let scene = SceneId::new(1);
    subscribe(&mut updater, scene);
    updater.drain_events();

    let flush = FlushBuilder::new(scene, FlushIndex::new(2)).version_tag(77).build();
    updater.handle_scene_update(scene, flush).unwrap();
    updater.update_scenes();

    assert_eq!(
        updater.drain_events(),
        vec![RendererEvent::SceneFlushed {
            scene,
            version_tag: 77,
        }]
    );
}

#[test]
fn test_invalid_flush_is_rejected_whole() {
    let (mut updater, _clock) = updater();
    let scene = SceneId::new(1);
    subscribe(&mut updater, scene);
    updater.drain_events();

    let flush = FlushBuilder::new(scene, FlushIndex::new(2))
        .action(SceneAction::AllocateDataBuffer {
            handle: DataBufferHandle::new(1),
            kind: DataBufferKind::Index,
            max_size_bytes: 4,
        })
        .action(SceneAction::UpdateDataBuffer {
            handle: DataBufferHandle::new(1),
            offset: 2,
            data: vec![0; 4],
        })
        .build();
    updater.handle_scene_update(scene, flush).unwrap();
    let report = updater.update_scenes();

    assert_eq!(report.counters.flushes_rejected, 1);
    assert!(!report.is_dirty(scene));
    let content = updater.scene_content(scene).unwrap();
    assert_eq!(content.resource_count(), 0);
    assert_eq!(content.last_applied(), Some(FlushIndex::new(1)));
    assert!(matches!(
        updater.drain_events().as_slice(),
        [RendererEvent::SceneFlushRejected { index, .. }] if *index == FlushIndex::new(2)
    ));
}

#[test]
fn test_expiration_and_recovery() {
    let (mut updater, clock) = updater();
    updater.create_display(RenderDevice::null(None)).unwrap();
    let scene = SceneId::new(1);
    map(&mut updater, scene);
    updater.show(scene).unwrap();

    let flush = FlushBuilder::new(scene, FlushIndex::new(2)).expires_at(1_500).build();
    updater.handle_scene_update(scene, flush).unwrap();
    updater.update_scenes();
    updater.drain_events();

    clock.advance(1_000);
    updater.update_scenes();
    updater.update_scenes();
    assert_eq!(
        updater.drain_events(),
        vec![RendererEvent::SceneExpired { scene }]
    );

    let flush = FlushBuilder::new(scene, FlushIndex::new(3)).expires_at(10_000).build();
    updater.handle_scene_update(scene, flush).unwrap();
    updater.update_scenes();
    assert_eq!(
        updater.drain_events(),
        vec![RendererEvent::SceneRecoveredFromExpiration { scene }]
    );
    teardown(updater);
}

#[test]
fn test_expiration_check_disabled() {
    let config = RendererConfig {
        expiration_check: false,
        ..Default::default()
    };
    let (mut updater, clock) = updater_with(config);
    updater.create_display(RenderDevice::null(None)).unwrap();
    let scene = SceneId::new(1);
    map(&mut updater, scene);
    updater.show(scene).unwrap();

    let flush = FlushBuilder::new(scene, FlushIndex::new(2)).expires_at(1_001).build();
    updater.handle_scene_update(scene, flush).unwrap();
    clock.advance(10);
    updater.update_scenes();

    assert!(!updater
        .drain_events()
        .iter()
        .any(|event| matches!(event, RendererEvent::SceneExpired { .. })));
    teardown(updater);
}

#[test]
fn test_force_apply_by_deadline() {
    let (mut updater, clock) = updater();
    updater.create_display(RenderDevice::null(None)).unwrap();
    let scene = SceneId::new(1);
    map(&mut updater, scene);
    updater.drain_events();

    let missing = ResourceContentHash::new(0xdead);
    let flush = FlushBuilder::new(scene, FlushIndex::new(2))
        .reference_resource(missing)
        .force_apply_by(1_050)
        .build();
    updater.handle_scene_update(scene, flush).unwrap();

    updater.update_scenes();
    assert_eq!(updater.pending_flush_count(scene), 1);

    clock.advance(100);
    updater.update_scenes();
    assert_eq!(updater.pending_flush_count(scene), 0);
    assert!(updater
        .drain_events()
        .contains(&RendererEvent::SceneFlushesForceApplied { scene, count: 1 }));
    teardown(updater);
}

#[test]
fn test_force_apply_by_age() {
    let config = RendererConfig {
        force_apply_after_ms: Some(200),
        ..Default::default()
    };
    let (mut updater, clock) = updater_with(config);
    updater.create_display(RenderDevice::null(None)).unwrap();
    let scene = SceneId::new(1);
    map(&mut updater, scene);

    let flush = FlushBuilder::new(scene, FlushIndex::new(2))
        .reference_resource(ResourceContentHash::new(0xbeef))
        .build();
    updater.handle_scene_update(scene, flush).unwrap();
    updater.update_scenes();
    assert_eq!(updater.pending_flush_count(scene), 1);

    clock.advance(200);
    let report = updater.update_scenes();
    assert_eq!(report.counters.flushes_force_applied, 1);
    assert_eq!(updater.pending_flush_count(scene), 0);
    teardown(updater);
}

#[test]
fn test_broken_effect_reported_to_every_scene() {
    let (mut updater, _clock) = updater();
    updater.create_display(RenderDevice::null(None)).unwrap();
    let broken = ResourceDescriptor::effect("broken", "no entry point here");

    for id in [1, 2] {
        map(&mut updater, SceneId::new(id));
    }
    for id in [1, 2] {
        let scene = SceneId::new(id);
        let flush = FlushBuilder::new(scene, FlushIndex::new(2))
            .add_resource(broken.clone())
            .build();
        updater.handle_scene_update(scene, flush).unwrap();
    }
    updater.update_scenes();
    assert!(updater.wait_for_pending_uploads(std::time::Duration::from_secs(5)));
    let report = updater.update_scenes();

    assert_eq!(report.counters.upload_failures, 1);
    assert_eq!(updater.resource_status(broken.hash), Some(ResourceStatus::Broken));
    let failures = updater
        .drain_events()
        .into_iter()
        .filter(|event| matches!(event, RendererEvent::ResourceUploadFailed { .. }))
        .count();
    assert_eq!(failures, 2);

    // Waiting on a broken resource only ends through force-apply
    assert_eq!(updater.pending_flush_count(SceneId::new(1)), 1);
    teardown(updater);
}

#[test]
fn test_offscreen_buffer_flow() {
    let (mut updater, _clock) = updater();
    updater.create_display(RenderDevice::software(None)).unwrap();
    let producer = SceneId::new(1);
    let consumer = SceneId::new(2);
    let buffer = OffscreenBufferId::new(1);

    map(&mut updater, producer);
    subscribe_with(
        &mut updater,
        consumer,
        slot_flush(
            consumer,
            1,
            5,
            DataSlotKind::TextureConsumer,
            DataValue::Texture(ResourceContentHash::new(0)),
        ),
    );

    updater.create_offscreen_buffer(buffer, 16, 16).unwrap();
    assert!(updater.create_offscreen_buffer(buffer, 16, 16).is_err());
    updater.assign_scene_to_offscreen_buffer(producer, Some(buffer)).unwrap();
    updater.link_offscreen_buffer(buffer, consumer, DataSlotId::new(5)).unwrap();
    updater.update_scenes();
    assert_eq!(
        updater.resolved_value(consumer, DataSlotId::new(5)),
        Some(&ResolvedSlot::OffscreenBuffer(buffer))
    );

    // A change in the producer dirties whoever samples its buffer
    updater
        .handle_scene_update(producer, Flush::new(producer, FlushIndex::new(2)))
        .unwrap();
    let report = updater.update_scenes();
    assert!(report.is_dirty(producer));
    assert!(report.is_dirty(consumer));

    let refused = updater.destroy_offscreen_buffer(buffer);
    assert!(matches!(
        refused,
        Err(RendererError::Buffer(BufferError::OffscreenBufferInUse { consumers: 1, .. }))
    ));
    assert!(matches!(
        updater.destroy_display(),
        Err(RendererError::DisplayInUse { .. })
    ));

    updater.unlink_data(consumer, DataSlotId::new(5)).unwrap();
    updater.destroy_offscreen_buffer(buffer).unwrap();
    assert_eq!(updater.scene_assignment(producer), None);
    assert!(updater.drain_events().contains(&RendererEvent::SceneAssignedToBuffer {
        scene: producer,
        buffer: None,
        result: EventResult::Indirect,
    }));

    let device = teardown(updater);
    assert_eq!(device.object_count(), 0);
}

#[test]
fn test_offscreen_buffer_needs_display() {
    let (mut updater, _clock) = updater();
    assert!(matches!(
        updater.create_offscreen_buffer(OffscreenBufferId::new(1), 8, 8),
        Err(RendererError::NoDisplay)
    ));
    assert_eq!(
        updater.drain_events(),
        vec![RendererEvent::OffscreenBufferCreated {
            buffer: OffscreenBufferId::new(1),
            result: EventResult::Failed,
        }]
    );
}

#[test]
fn test_stream_source_marks_consumers_dirty() {
    let (mut updater, _clock) = updater();
    let scene = SceneId::new(1);
    let stream = StreamBufferId::new(3);
    let source = StreamSourceId::new(9);

    subscribe_with(
        &mut updater,
        scene,
        slot_flush(
            scene,
            1,
            1,
            DataSlotKind::TextureConsumer,
            DataValue::Texture(ResourceContentHash::new(0)),
        ),
    );
    updater.create_stream_buffer(stream, source).unwrap();
    updater.link_stream_buffer(stream, scene, DataSlotId::new(1)).unwrap();
    updater.update_scenes();
    assert_eq!(
        updater.resolved_value(scene, DataSlotId::new(1)),
        Some(&ResolvedSlot::StreamBuffer {
            buffer: stream,
            available: false,
        })
    );

    assert!(updater.update_scenes().dirty_scenes.is_empty());

    updater.stream_source_updated(source, true);
    let report = updater.update_scenes();
    assert!(report.is_dirty(scene));
    assert_eq!(
        updater.resolved_value(scene, DataSlotId::new(1)),
        Some(&ResolvedSlot::StreamBuffer {
            buffer: stream,
            available: true,
        })
    );

    // Unrelated sources leave the scene alone
    updater.stream_source_updated(StreamSourceId::new(10), true);
    assert!(!updater.update_scenes().is_dirty(scene));

    updater.destroy_stream_buffer(stream).unwrap();
    assert!(updater.links().is_empty());
    assert!(updater.drain_events().contains(&RendererEvent::DataUnlinked {
        consumer: scene,
        slot: DataSlotId::new(1),
        result: EventResult::Indirect,
    }));
}

#[test]
fn test_destroyed_provider_slot_unlinks() {
    let (mut updater, _clock) = updater();
    let provider = SceneId::new(1);
    let consumer = SceneId::new(2);

    subscribe_with(
        &mut updater,
        provider,
        slot_flush(provider, 1, 1, DataSlotKind::DataProvider, DataValue::Float(1.0)),
    );
    subscribe_with(
        &mut updater,
        consumer,
        slot_flush(consumer, 1, 2, DataSlotKind::DataConsumer, DataValue::Float(0.0)),
    );
    updater
        .link_data(provider, DataSlotId::new(1), consumer, DataSlotId::new(2))
        .unwrap();

    let flush = FlushBuilder::new(provider, FlushIndex::new(2))
        .action(SceneAction::DestroyDataSlot { slot: DataSlotId::new(1) })
        .build();
    updater.handle_scene_update(provider, flush).unwrap();
    let report = updater.update_scenes();

    assert!(updater.links().is_empty());
    assert!(report.is_dirty(consumer));
    assert_eq!(
        updater.resolved_value(consumer, DataSlotId::new(2)),
        Some(&ResolvedSlot::Local(DataValue::Float(0.0)))
    );
}

#[test]
fn test_link_validation() {
    let (mut updater, _clock) = updater();
    let a = SceneId::new(1);
    let b = SceneId::new(2);

    subscribe_with(
        &mut updater,
        a,
        FlushBuilder::new(a, FlushIndex::new(1))
            .action(SceneAction::CreateDataSlot {
                slot: DataSlotId::new(1),
                kind: DataSlotKind::DataProvider,
                value: DataValue::Float(1.0),
            })
            .action(SceneAction::CreateDataSlot {
                slot: DataSlotId::new(2),
                kind: DataSlotKind::DataConsumer,
                value: DataValue::Float(0.0),
            })
            .build(),
    );
    subscribe_with(
        &mut updater,
        b,
        FlushBuilder::new(b, FlushIndex::new(1))
            .action(SceneAction::CreateDataSlot {
                slot: DataSlotId::new(1),
                kind: DataSlotKind::DataProvider,
                value: DataValue::Float(2.0),
            })
            .action(SceneAction::CreateDataSlot {
                slot: DataSlotId::new(2),
                kind: DataSlotKind::DataConsumer,
                value: DataValue::Float(0.0),
            })
            .action(SceneAction::CreateDataSlot {
                slot: DataSlotId::new(3),
                kind: DataSlotKind::DataConsumer,
                value: DataValue::Int(0),
            })
            .build(),
    );

    let slot = DataSlotId::new;
    assert!(matches!(
        updater.link_data(a, slot(1), a, slot(2)),
        Err(RendererError::Link(LinkError::SelfLink { .. }))
    ));
    assert!(matches!(
        updater.link_data(a, slot(2), b, slot(2)),
        Err(RendererError::Link(LinkError::ProviderSlotNotFound { .. }))
    ));
    assert!(matches!(
        updater.link_data(a, slot(1), b, slot(3)),
        Err(RendererError::Link(LinkError::ValueTypeMismatch { .. }))
    ));
    assert!(matches!(
        updater.link_data(a, slot(1), SceneId::new(9), slot(2)),
        Err(RendererError::Link(LinkError::UnknownScene(_)))
    ));

    updater.link_data(a, slot(1), b, slot(2)).unwrap();
    assert!(matches!(
        updater.link_data(b, slot(1), a, slot(2)),
        Err(RendererError::Link(LinkError::DependencyCycle { .. }))
    ));
    assert!(matches!(
        updater.unlink_data(a, slot(2)),
        Err(RendererError::Link(LinkError::NotLinked { .. }))
    ));
    assert_eq!(updater.links().len(), 1);

    let failed = updater
        .drain_events()
        .into_iter()
        .filter(|event| matches!(event, RendererEvent::DataLinked { .. }) && event.result() == EventResult::Failed)
        .count();
    assert_eq!(failed, 5);
}

#[test]
fn test_scene_reference_hook_runs_every_tick() {
    let (mut updater, _clock) = updater();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    updater.set_scene_reference_hook(move |report: &TickReport| {
        sink.lock().unwrap().push((report.tick, report.dirty_scenes.len()));
    });

    let scene = SceneId::new(1);
    subscribe(&mut updater, scene);
    updater.update_scenes();

    assert_eq!(*seen.lock().unwrap(), vec![(1, 1), (2, 0)]);
    assert_eq!(updater.statistics().ticks, 2);
}

#[test]
fn test_destroy_display_refused_while_mapped() {
    let (mut updater, _clock) = updater();
    updater.create_display(RenderDevice::null(None)).unwrap();
    let scene = SceneId::new(1);
    map(&mut updater, scene);

    assert!(matches!(
        updater.destroy_display(),
        Err(RendererError::DisplayInUse { scenes: 1, offscreen_buffers: 0 })
    ));
    assert!(updater.has_display());

    updater.unmap(scene).unwrap();
    updater.update_scenes();
    let device = updater.destroy_display().unwrap();
    assert_eq!(device.object_count(), 0);
    assert!(!updater.has_display());
}

#[test]
fn test_config_from_toml_drives_updater() {
    let config = RendererConfig::from_toml_str(
        r#"
            max_pending_flushes_to_force_apply = 3
            max_pending_flushes_to_kill_scene = 5
            expiration_check = false
        "#,
    )
    .unwrap();
    let (updater, _clock) = updater_with(config.clone());
    assert_eq!(updater.context().config, config);
    assert_eq!(updater.context().config.uploader_queue_capacity, 256);

    let invalid = RendererConfig {
        max_pending_flushes_to_force_apply: 5,
        max_pending_flushes_to_kill_scene: 5,
        ..Default::default()
    };
    let context = RendererContext {
        config: invalid,
        clock: FrameClock::from(ManualClock::new(0)),
    };
    assert!(matches!(SceneUpdater::new(context), Err(RendererError::Config(_))));
}

#[test]
fn test_relink_reports_replaced_link() {
    let (mut updater, _clock) = updater();
    let a = SceneId::new(1);
    let b = SceneId::new(2);
    let c = SceneId::new(3);
    subscribe_with(&mut updater, a, slot_flush(a, 1, 1, DataSlotKind::DataProvider, DataValue::Float(1.0)));
    subscribe_with(&mut updater, b, slot_flush(b, 1, 1, DataSlotKind::DataProvider, DataValue::Float(2.0)));
    subscribe_with(&mut updater, c, slot_flush(c, 1, 5, DataSlotKind::DataConsumer, DataValue::Float(0.0)));

    updater.link_data(a, DataSlotId::new(1), c, DataSlotId::new(5)).unwrap();
    updater.drain_events();

    updater.link_data(b, DataSlotId::new(1), c, DataSlotId::new(5)).unwrap();
    assert_eq!(
        updater.drain_events(),
        vec![
            RendererEvent::DataUnlinked {
                consumer: c,
                slot: DataSlotId::new(5),
                result: EventResult::Indirect,
            },
            RendererEvent::DataLinked {
                source: LinkSource::Scene {
                    scene: b,
                    slot: DataSlotId::new(1),
                },
                consumer: c,
                slot: DataSlotId::new(5),
                result: EventResult::Ok,
            },
        ]
    );
    assert_eq!(updater.links().len(), 1);

    updater.update_scenes();
    assert_eq!(
        updater.resolved_value(c, DataSlotId::new(5)),
        Some(&ResolvedSlot::Linked(DataValue::Float(2.0)))
    );
}

#[test]
fn test_configured_memory_budget_caps_display() {
    let config = RendererConfig {
        device_memory_budget: Some(64),
        ..Default::default()
    };
    let (mut updater, _clock) = updater_with(config);
    updater.create_display(RenderDevice::software(None)).unwrap();
    assert_eq!(updater.device().and_then(|d| d.memory_budget()), Some(64));

    let scene = SceneId::new(1);
    map(&mut updater, scene);
    updater.drain_events();

    let flush = FlushBuilder::new(scene, FlushIndex::new(2))
        .action(SceneAction::AllocateDataBuffer {
            handle: DataBufferHandle::new(1),
            kind: DataBufferKind::Vertex,
            max_size_bytes: 100,
        })
        .build();
    updater.handle_scene_update(scene, flush).unwrap();
    updater.update_scenes();

    assert_eq!(updater.resource_memory_usage(scene, MemoryCategory::All), 0);
    assert_eq!(updater.device().map(|d| d.memory_used()), Some(0));
    assert!(updater.drain_events().iter().any(|event| matches!(
        event,
        RendererEvent::SceneResourceFailed { scene: s, .. } if *s == scene
    )));

    let device = teardown(updater);
    assert_eq!(device.memory_budget(), Some(64));
}

#[test]
fn test_device_keeps_tighter_budget() {
    let config = RendererConfig {
        device_memory_budget: Some(1_024),
        ..Default::default()
    };
    let (mut updater, _clock) = updater_with(config);
    updater.create_display(RenderDevice::null(Some(256))).unwrap();
    assert_eq!(updater.device().and_then(|d| d.memory_budget()), Some(256));
}
