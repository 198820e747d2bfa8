//! Device cache of immutable client resources
//!
//! Keyed by content hash, so scenes using identical effects or textures
//! share one device object. An entry lives as long as at least one mapped
//! scene references it; the updater unloads entries nobody references.

use crate::device::DeviceHandle;
use crate::uploader::UploadToken;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use strata_ir::{ResourceContentHash, ResourceDescriptor, SceneId};

/// Where a cached resource is in its upload lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceStatus {
    /// Referenced, but no scene has supplied its data yet
    Missing,
    /// Data known, upload not started
    Registered,
    /// Waiting for the effect compiler
    Uploading(UploadToken),
    /// On the device
    Uploaded,
    /// Upload failed; will not be retried
    Broken,
}

#[derive(Debug)]
struct CacheEntry {
    descriptor: Option<ResourceDescriptor>,
    status: ResourceStatus,
    device: Option<DeviceHandle>,
    scenes: BTreeSet<SceneId>,
}

/// A resource that nobody references any more
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnloadedResource {
    pub hash: ResourceContentHash,
    pub device: Option<DeviceHandle>,
    /// Upload that was still running and is now discarded
    pub discarded: Option<UploadToken>,
}

/// Content-hash keyed cache of client resources
#[derive(Debug, Default)]
pub struct ResourceCache {
    entries: BTreeMap<ResourceContentHash, CacheEntry>,
    tokens: HashMap<UploadToken, ResourceContentHash>,
    discarded: HashSet<UploadToken>,
}

impl ResourceCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Note that `scene` needs `hash` on the device
    pub fn reference(&mut self, hash: ResourceContentHash, scene: SceneId) {
        self.entries
            .entry(hash)
            .or_insert_with(|| CacheEntry {
                descriptor: None,
                status: ResourceStatus::Missing,
                device: None,
                scenes: BTreeSet::new(),
            })
            .scenes
            .insert(scene);
    }

    /// Drop `scene`'s reference to `hash`
    pub fn unreference(&mut self, hash: ResourceContentHash, scene: SceneId) {
        if let Some(entry) = self.entries.get_mut(&hash) {
            entry.scenes.remove(&scene);
        }
    }

    /// Drop every reference `scene` holds
    pub fn unreference_scene(&mut self, scene: SceneId) {
        for entry in self.entries.values_mut() {
            entry.scenes.remove(&scene);
        }
    }

    /// Attach data to a referenced resource that has none yet
    pub fn provide(&mut self, descriptor: &ResourceDescriptor) -> bool {
        match self.entries.get_mut(&descriptor.hash) {
            Some(entry) if entry.status == ResourceStatus::Missing => {
                entry.descriptor = Some(descriptor.clone());
                entry.status = ResourceStatus::Registered;
                true
            }
            _ => false,
        }
    }

    /// Referenced resources without data
    pub fn missing(&self) -> Vec<ResourceContentHash> {
        self.with_status(|status| status == ResourceStatus::Missing)
    }

    /// Referenced resources whose upload can start
    pub fn ready_to_upload(&self) -> Vec<ResourceContentHash> {
        self.with_status(|status| status == ResourceStatus::Registered)
    }

    fn with_status(&self, predicate: impl Fn(ResourceStatus) -> bool) -> Vec<ResourceContentHash> {
        self.entries
            .iter()
            .filter(|(_, entry)| !entry.scenes.is_empty() && predicate(entry.status))
            .map(|(hash, _)| *hash)
            .collect()
    }

    /// Data of a resource awaiting upload
    pub fn descriptor(&self, hash: ResourceContentHash) -> Option<&ResourceDescriptor> {
        self.entries.get(&hash).and_then(|entry| entry.descriptor.as_ref())
    }

    /// Record that an upload was handed to the compiler
    pub fn mark_uploading(&mut self, hash: ResourceContentHash, token: UploadToken) {
        if let Some(entry) = self.entries.get_mut(&hash) {
            entry.status = ResourceStatus::Uploading(token);
            self.tokens.insert(token, hash);
        }
    }

    /// Record a finished upload; the host copy of the data is dropped
    pub fn mark_uploaded(&mut self, hash: ResourceContentHash, device: DeviceHandle) {
        if let Some(entry) = self.entries.get_mut(&hash) {
            entry.status = ResourceStatus::Uploaded;
            entry.device = Some(device);
            entry.descriptor = None;
        }
    }

    /// Record a failed upload
    pub fn mark_broken(&mut self, hash: ResourceContentHash) {
        if let Some(entry) = self.entries.get_mut(&hash) {
            entry.status = ResourceStatus::Broken;
            entry.descriptor = None;
        }
    }

    /// Match a compiler completion to its resource
    ///
    /// Returns `None` when the upload was discarded in the meantime; the
    /// caller drops the result.
    pub fn complete_upload(&mut self, token: UploadToken) -> Option<ResourceContentHash> {
        if self.discarded.remove(&token) {
            return None;
        }
        let hash = self.tokens.remove(&token)?;
        match self.entries.get(&hash) {
            Some(entry) if entry.status == ResourceStatus::Uploading(token) => Some(hash),
            _ => None,
        }
    }

    /// Remove every entry with no referencing scene
    pub fn collect_unreferenced(&mut self) -> Vec<UnloadedResource> {
        let unreferenced: Vec<_> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.scenes.is_empty())
            .map(|(hash, _)| *hash)
            .collect();

        let mut unloaded = Vec::with_capacity(unreferenced.len());
        for hash in unreferenced {
            if let Some(entry) = self.entries.remove(&hash) {
                unloaded.push(self.retire(hash, entry));
            }
        }
        unloaded
    }

    /// Remove every entry, regardless of references
    pub fn clear(&mut self) -> Vec<UnloadedResource> {
        let entries = std::mem::take(&mut self.entries);
        entries
            .into_iter()
            .map(|(hash, entry)| self.retire(hash, entry))
            .collect()
    }

    fn retire(&mut self, hash: ResourceContentHash, entry: CacheEntry) -> UnloadedResource {
        let discarded = match entry.status {
            ResourceStatus::Uploading(token) => {
                self.tokens.remove(&token);
                self.discarded.insert(token);
                Some(token)
            }
            _ => None,
        };
        UnloadedResource {
            hash,
            device: entry.device,
            discarded,
        }
    }

    /// Upload status of a resource
    pub fn status(&self, hash: ResourceContentHash) -> Option<ResourceStatus> {
        self.entries.get(&hash).map(|entry| entry.status)
    }

    /// Check if a resource is on the device
    pub fn is_uploaded(&self, hash: ResourceContentHash) -> bool {
        self.status(hash) == Some(ResourceStatus::Uploaded)
    }

    /// Device handle of an uploaded resource
    pub fn device_handle(&self, hash: ResourceContentHash) -> Option<DeviceHandle> {
        self.entries.get(&hash).and_then(|entry| entry.device)
    }

    /// Scenes referencing a resource
    pub fn referencing_scenes(&self, hash: ResourceContentHash) -> Vec<SceneId> {
        self.entries
            .get(&hash)
            .map(|entry| entry.scenes.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Uploads whose results will be dropped on arrival
    pub fn discarded_count(&self) -> usize {
        self.discarded.len()
    }

    /// Number of cached resources
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the cache is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
