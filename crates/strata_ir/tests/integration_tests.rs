//! Integration tests for strata_ir
//!
//! Producer to transport flow, serialization of flushes and whole-flush
//! validation.

use std::collections::{HashMap, HashSet};
use strata_ir::*;

#[derive(Default)]
struct Content {
    resources: HashSet<SceneResource>,
    slots: HashMap<DataSlotId, (DataSlotKind, DataValueType)>,
}

impl SceneContent for Content {
    fn contains_resource(&self, resource: SceneResource) -> bool {
        self.resources.contains(&resource)
    }

    fn data_buffer_capacity(&self, _handle: DataBufferHandle) -> Option<u32> {
        None
    }

    fn texture_properties(&self, _handle: TextureBufferHandle) -> Option<&TextureBufferProperties> {
        None
    }

    fn data_slot(&self, slot: DataSlotId) -> Option<(DataSlotKind, DataValueType)> {
        self.slots.get(&slot).copied()
    }
}

#[test]
fn test_flush_survives_json() {
    let effect = ResourceDescriptor::effect("unlit", "void main() { gl_FragColor = vec4(1.0); }");
    let flush = FlushBuilder::new(SceneId::new(4), FlushIndex::new(9))
        .action(SceneAction::AllocateRenderBuffer {
            handle: RenderBufferHandle::new(1),
            properties: RenderBufferProperties::depth(64, 64),
        })
        .action(SceneAction::CreateDataSlot {
            slot: DataSlotId::new(2),
            kind: DataSlotKind::TransformationProvider,
            value: DataValue::translation_matrix(0.0, 1.0, 0.0),
        })
        .add_resource(effect)
        .expires_at(5_000)
        .version_tag(42)
        .build();

    let json = serde_json::to_string(&TransportMessage::SceneUpdate(flush.clone())).unwrap();
    let decoded: TransportMessage = serde_json::from_str(&json).unwrap();

    assert_eq!(decoded, TransportMessage::SceneUpdate(flush));
    assert_eq!(decoded.scene(), SceneId::new(4));
}

#[test]
fn test_two_producers_share_one_transport() {
    let transport = SceneTransport::default();
    let mut first = transport.producer();
    let mut second = transport.producer();

    first.publish(SceneId::new(1)).unwrap();
    second.publish(SceneId::new(2)).unwrap();

    for _ in 0..3 {
        let flush = first.begin_flush(SceneId::new(1)).unwrap().build();
        first.send(flush).unwrap();
    }
    let flush = second.begin_flush(SceneId::new(2)).unwrap().build();
    second.send(flush).unwrap();

    let messages = transport.receive_pending();
    assert_eq!(messages.len(), 6);

    let indices: Vec<_> = messages
        .iter()
        .filter_map(|m| match m {
            TransportMessage::SceneUpdate(f) if f.scene == SceneId::new(1) => Some(f.index.raw()),
            _ => None,
        })
        .collect();
    assert_eq!(indices, vec![1, 2, 3]);

    let stats = transport.stats();
    assert_eq!(stats.flushes_sent, 4);
    assert_eq!(stats.messages_received, 6);
}

#[test]
fn test_send_after_renderer_gone() {
    let transport = SceneTransport::default();
    let mut producer = transport.producer();
    drop(transport);

    assert_eq!(producer.publish(SceneId::new(1)), Err(TransportError::Disconnected));
    assert!(!producer.is_published(SceneId::new(1)));
}

#[test]
fn test_validation_against_existing_content() {
    let mut content = Content::default();
    content.resources.insert(SceneResource::DataBuffer(DataBufferHandle::new(1)));
    content
        .slots
        .insert(DataSlotId::new(7), (DataSlotKind::TextureConsumer, DataValueType::Texture));

    let validator = FlushValidator::default();

    let ok = FlushBuilder::new(SceneId::new(1), FlushIndex::new(1))
        .action(SceneAction::AllocateVertexArray {
            handle: VertexArrayHandle::new(1),
            effect: ResourceContentHash::new(77),
            index_buffer: Some(DataBufferHandle::new(1)),
            vertex_buffers: vec![],
        })
        .action(SceneAction::SetDataValue {
            slot: DataSlotId::new(7),
            value: DataValue::Texture(ResourceContentHash::new(5)),
        })
        .build();
    assert!(validator.validate(&ok, &content).is_ok());

    let missing_buffer = FlushBuilder::new(SceneId::new(1), FlushIndex::new(2))
        .action(SceneAction::AllocateVertexArray {
            handle: VertexArrayHandle::new(1),
            effect: ResourceContentHash::new(77),
            index_buffer: None,
            vertex_buffers: vec![DataBufferHandle::new(2)],
        })
        .build();
    assert_eq!(
        validator.validate(&missing_buffer, &content),
        Err(ValidationError::ResourceNotFound(SceneResource::DataBuffer(DataBufferHandle::new(2))))
    );

    let wrong_kind = FlushBuilder::new(SceneId::new(1), FlushIndex::new(3))
        .action(SceneAction::CreateDataSlot {
            slot: DataSlotId::new(8),
            kind: DataSlotKind::TextureProvider,
            value: DataValue::Float(1.0),
        })
        .build();
    assert!(matches!(
        validator.validate(&wrong_kind, &content),
        Err(ValidationError::SlotKindMismatch { .. })
    ));
}
