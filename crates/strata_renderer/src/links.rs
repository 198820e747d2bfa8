//! Data-link graph
//!
//! A data link binds a consumer slot in one scene to a source: a provider
//! slot in another scene, an offscreen buffer or a stream buffer. Every
//! consumer slot has at most one incoming link; linking it again replaces
//! the old link. Unbound consumers fall back to their own local value.
//!
//! The graph keeps no dirty state. The updater recomputes propagation from
//! the link set each tick.

use crate::buffers::{OffscreenBufferId, StreamBufferId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use strata_ir::{DataSlotId, DataValueType, SceneId};
use thiserror::Error;

/// Where a consumer slot gets its value from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LinkSource {
    Scene { scene: SceneId, slot: DataSlotId },
    OffscreenBuffer(OffscreenBufferId),
    StreamBuffer(StreamBufferId),
}

impl LinkSource {
    /// Providing scene, for scene-to-scene links
    pub fn scene(&self) -> Option<SceneId> {
        match self {
            Self::Scene { scene, .. } => Some(*scene),
            _ => None,
        }
    }
}

/// Kind of data link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LinkKind {
    /// Plain data value
    Data,
    /// Transformation matrix
    Transformation,
    /// Texture reference
    Texture,
    /// Offscreen buffer sampled as a texture
    OffscreenBuffer,
    /// Stream buffer sampled as a texture
    StreamBuffer,
}

/// A directed binding from a source to a consumer slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataLink {
    pub source: LinkSource,
    pub consumer: SceneId,
    pub consumer_slot: DataSlotId,
    pub kind: LinkKind,
}

/// Errors from link operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LinkError {
    #[error("scene {0} is not known to the renderer")]
    UnknownScene(SceneId),

    #[error("scene {scene} cannot be linked to itself")]
    SelfLink { scene: SceneId },

    #[error("scene {scene} has no provider slot {slot}")]
    ProviderSlotNotFound { scene: SceneId, slot: DataSlotId },

    #[error("scene {scene} has no consumer slot {slot}")]
    ConsumerSlotNotFound { scene: SceneId, slot: DataSlotId },

    #[error("consumer slot {slot} of scene {scene} cannot take a {kind:?} link")]
    KindMismatch { scene: SceneId, slot: DataSlotId, kind: LinkKind },

    #[error("provider value {provider} does not match consumer value {consumer}")]
    ValueTypeMismatch { provider: DataValueType, consumer: DataValueType },

    #[error("linking scene {provider} into scene {consumer} would create a dependency cycle")]
    DependencyCycle { provider: SceneId, consumer: SceneId },

    #[error("consumer slot {slot} of scene {scene} is not linked")]
    NotLinked { scene: SceneId, slot: DataSlotId },
}

/// All data links, keyed by consumer slot
#[derive(Debug, Clone, Default)]
pub struct DataLinkGraph {
    links: BTreeMap<(SceneId, DataSlotId), DataLink>,
}

impl DataLinkGraph {
    /// Create an empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a consumer slot, returning the link it replaced
    pub fn link(
        &mut self,
        source: LinkSource,
        consumer: SceneId,
        consumer_slot: DataSlotId,
        kind: LinkKind,
    ) -> Option<DataLink> {
        let link = DataLink {
            source,
            consumer,
            consumer_slot,
            kind,
        };
        self.links.insert((consumer, consumer_slot), link)
    }

    /// Remove the link on a consumer slot, if any
    pub fn unlink(&mut self, consumer: SceneId, consumer_slot: DataSlotId) -> Option<DataLink> {
        self.links.remove(&(consumer, consumer_slot))
    }

    /// Source bound to a consumer slot, `None` when unbound
    pub fn resolve(&self, consumer: SceneId, consumer_slot: DataSlotId) -> Option<LinkSource> {
        self.links.get(&(consumer, consumer_slot)).map(|link| link.source)
    }

    /// Link on a consumer slot
    pub fn link_of(&self, consumer: SceneId, consumer_slot: DataSlotId) -> Option<&DataLink> {
        self.links.get(&(consumer, consumer_slot))
    }

    /// Distinct scenes consuming anything `producer` provides (one hop)
    pub fn scenes_dependent_on(&self, producer: SceneId) -> Vec<SceneId> {
        let consumers: BTreeSet<_> = self
            .links
            .values()
            .filter(|link| link.source.scene() == Some(producer))
            .map(|link| link.consumer)
            .collect();
        consumers.into_iter().collect()
    }

    /// Check if `consumer` already feeds `provider`, directly or transitively
    pub fn would_create_cycle(&self, provider: SceneId, consumer: SceneId) -> bool {
        if provider == consumer {
            return true;
        }
        let mut visited = BTreeSet::new();
        let mut stack = vec![consumer];
        while let Some(scene) = stack.pop() {
            if !visited.insert(scene) {
                continue;
            }
            for dependent in self.scenes_dependent_on(scene) {
                if dependent == provider {
                    return true;
                }
                stack.push(dependent);
            }
        }
        false
    }

    /// Consumer slots bound to an offscreen buffer
    pub fn consumers_of_offscreen_buffer(&self, buffer: OffscreenBufferId) -> Vec<(SceneId, DataSlotId)> {
        self.consumers_of(LinkSource::OffscreenBuffer(buffer))
    }

    /// Consumer slots bound to a stream buffer
    pub fn consumers_of_stream_buffer(&self, buffer: StreamBufferId) -> Vec<(SceneId, DataSlotId)> {
        self.consumers_of(LinkSource::StreamBuffer(buffer))
    }

    fn consumers_of(&self, source: LinkSource) -> Vec<(SceneId, DataSlotId)> {
        self.links
            .values()
            .filter(|link| link.source == source)
            .map(|link| (link.consumer, link.consumer_slot))
            .collect()
    }

    /// Links into a consumer scene
    pub fn links_of_consumer(&self, consumer: SceneId) -> Vec<DataLink> {
        self.links
            .range((consumer, DataSlotId::new(0))..=(consumer, DataSlotId::new(u32::MAX)))
            .map(|(_, link)| *link)
            .collect()
    }

    /// Remove every link a scene provides or consumes
    pub fn remove_scene(&mut self, scene: SceneId) -> Vec<DataLink> {
        self.remove_where(|link| link.consumer == scene || link.source.scene() == Some(scene))
    }

    /// Remove every link touching one slot of a scene
    pub fn remove_slot(&mut self, scene: SceneId, slot: DataSlotId) -> Vec<DataLink> {
        self.remove_where(|link| {
            (link.consumer == scene && link.consumer_slot == slot)
                || link.source == LinkSource::Scene { scene, slot }
        })
    }

    /// Remove every link consuming a stream buffer
    pub fn remove_stream_buffer(&mut self, buffer: StreamBufferId) -> Vec<DataLink> {
        self.remove_where(|link| link.source == LinkSource::StreamBuffer(buffer))
    }

    fn remove_where(&mut self, predicate: impl Fn(&DataLink) -> bool) -> Vec<DataLink> {
        let removed: Vec<DataLink> = self.links.values().filter(|l| predicate(l)).copied().collect();
        for link in &removed {
            self.links.remove(&(link.consumer, link.consumer_slot));
        }
        removed
    }

    /// Iterate over all links in consumer order
    pub fn iter(&self) -> impl Iterator<Item = &DataLink> {
        self.links.values()
    }

    /// Number of links
    pub fn len(&self) -> usize {
        self.links.len()
    }

    /// Check if there are no links
    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }
}
