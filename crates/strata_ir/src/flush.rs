//! Flushes - ordered, atomic batches of scene actions
//!
//! A producer numbers its flushes per scene. The renderer applies them in
//! strictly increasing index order and never applies half a flush.

use crate::action::SceneAction;
use crate::ids::SceneId;
use crate::resource::{ResourceContentHash, ResourceDescriptor};
use serde::{Deserialize, Serialize};
use strata_core::typed_id;

typed_id! {
    /// Producer-assigned position of a flush within its scene's stream
    #[derive(Serialize, Deserialize)]
    pub struct FlushIndex(u64);
}

impl FlushIndex {
    /// The index following this one
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }
}

/// Timing metadata attached to a flush (milliseconds on the renderer clock)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlushTimeInfo {
    /// Content of the scene is stale after this point in time
    pub expiration_ms: Option<u64>,
    /// Flush must be applied by this point even if resources are missing
    pub force_apply_deadline_ms: Option<u64>,
}

/// Client resources newly referenced or released by a flush
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceChanges {
    pub added: Vec<ResourceContentHash>,
    pub removed: Vec<ResourceContentHash>,
}

impl ResourceChanges {
    /// Check if nothing changed
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// An ordered unit of scene mutation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flush {
    /// Scene this flush belongs to
    pub scene: SceneId,
    /// Producer order
    pub index: FlushIndex,
    /// Structural actions, applied in order
    pub actions: Vec<SceneAction>,
    /// Resource references added/removed by this flush
    pub resource_changes: ResourceChanges,
    /// Data for resources the renderer may not have seen yet
    pub resources: Vec<ResourceDescriptor>,
    /// Timing metadata
    pub time_info: FlushTimeInfo,
    /// Producer tag reported back when the flush is applied
    pub version_tag: Option<u64>,
}

impl Flush {
    /// Create an empty flush
    pub fn new(scene: SceneId, index: FlushIndex) -> Self {
        Self {
            scene,
            index,
            actions: Vec::new(),
            resource_changes: ResourceChanges::default(),
            resources: Vec::new(),
            time_info: FlushTimeInfo::default(),
            version_tag: None,
        }
    }

    /// Check if the flush carries no change at all
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty() && self.resource_changes.is_empty()
    }

    /// Number of actions
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    /// Resources that must be on the device before this flush is applied
    pub fn required_resources(&self) -> impl Iterator<Item = ResourceContentHash> + '_ {
        self.resource_changes.added.iter().copied()
    }

    /// Total payload carried by the flush's resource descriptors
    pub fn resource_payload_bytes(&self) -> u64 {
        self.resources.iter().map(|r| r.byte_size()).sum()
    }
}

/// Builder for flushes with a fluent API
pub struct FlushBuilder {
    flush: Flush,
}

impl FlushBuilder {
    /// Start a flush for `scene` at `index`
    pub fn new(scene: SceneId, index: FlushIndex) -> Self {
        Self {
            flush: Flush::new(scene, index),
        }
    }

    /// Append an action
    pub fn action(mut self, action: SceneAction) -> Self {
        self.flush.actions.push(action);
        self
    }

    /// Append several actions
    pub fn actions(mut self, actions: impl IntoIterator<Item = SceneAction>) -> Self {
        self.flush.actions.extend(actions);
        self
    }

    /// Reference a resource and ship its data with the flush
    pub fn add_resource(mut self, descriptor: ResourceDescriptor) -> Self {
        if !self.flush.resource_changes.added.contains(&descriptor.hash) {
            self.flush.resource_changes.added.push(descriptor.hash);
        }
        self.flush.resources.push(descriptor);
        self
    }

    /// Reference a resource whose data the renderer already has
    pub fn reference_resource(mut self, hash: ResourceContentHash) -> Self {
        if !self.flush.resource_changes.added.contains(&hash) {
            self.flush.resource_changes.added.push(hash);
        }
        self
    }

    /// Drop a resource reference
    pub fn remove_resource(mut self, hash: ResourceContentHash) -> Self {
        self.flush.resource_changes.removed.push(hash);
        self
    }

    /// Set the expiration timestamp
    pub fn expires_at(mut self, expiration_ms: u64) -> Self {
        self.flush.time_info.expiration_ms = Some(expiration_ms);
        self
    }

    /// Set the force-apply deadline
    pub fn force_apply_by(mut self, deadline_ms: u64) -> Self {
        self.flush.time_info.force_apply_deadline_ms = Some(deadline_ms);
        self
    }

    /// Set the version tag
    pub fn version_tag(mut self, tag: u64) -> Self {
        self.flush.version_tag = Some(tag);
        self
    }

    /// Finish the flush
    pub fn build(self) -> Flush {
        self.flush
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::DataSlotKind;
    use crate::ids::DataSlotId;
    use crate::value::DataValue;

    #[test]
    fn test_builder_deduplicates_added_resources() {
        let effect = ResourceDescriptor::effect("flat", "void main() {}");
        let flush = FlushBuilder::new(SceneId::new(1), FlushIndex::new(1))
            .add_resource(effect.clone())
            .reference_resource(effect.hash)
            .build();

        assert_eq!(flush.resource_changes.added, vec![effect.hash]);
        assert_eq!(flush.resources.len(), 1);
        assert_eq!(flush.required_resources().count(), 1);
    }

    #[test]
    fn test_empty_flush() {
        let flush = Flush::new(SceneId::new(1), FlushIndex::new(1));
        assert!(flush.is_empty());

        let flush = FlushBuilder::new(SceneId::new(1), FlushIndex::new(2))
            .action(SceneAction::CreateDataSlot {
                slot: DataSlotId::new(1),
                kind: DataSlotKind::DataProvider,
                value: DataValue::Float(1.0),
            })
            .version_tag(7)
            .build();
        assert!(!flush.is_empty());
        assert_eq!(flush.len(), 1);
        assert_eq!(flush.version_tag, Some(7));
    }

    #[test]
    fn test_index_ordering() {
        let a = FlushIndex::new(3);
        assert_eq!(a.next(), FlushIndex::new(4));
        assert!(a < a.next());
    }
}
