//! Scene update orchestrator
//!
//! [`SceneUpdater`] owns all renderer-side scene state on the update thread.
//! Flushes are queued per scene as they arrive and applied at tick
//! boundaries by [`SceneUpdater::update_scenes`], which runs five phases,
//! each over all scenes in registration order before the next one starts:
//!
//! ```text
//! 1. poll uploads, consolidate     - compiler results in, flush resources into the scene stores
//! 2. reference resources           - mapped scenes reference what they need in the cache
//! 3. upload / unload               - sync uploads, effect requests, unreferenced entries out
//! 4. apply flushes                 - kill / force-apply / ready prefix, map completion
//! 5. links, dirty set, expiration  - resolve consumer slots, propagate, report
//! ```
//!
//! Backpressure uses two independent knobs: a scene with more than
//! `max_pending_flushes_to_force_apply` pending flushes has all of them
//! applied regardless of resources, and a scene reaching
//! `max_pending_flushes_to_kill_scene` is force-unsubscribed.

use crate::buffers::{BufferError, BufferManager, OffscreenBuffer, OffscreenBufferId, StreamBufferId, StreamSourceId};
use crate::context::RendererContext;
use crate::device::{DeviceObjectKind, RenderDevice};
use crate::error::{RendererError, RendererResult};
use crate::event::{EventCollector, EventResult, RendererEvent};
use crate::links::{DataLink, DataLinkGraph, LinkError, LinkKind, LinkSource};
use crate::registry::{MemoryCategory, ResourceRegistry};
use crate::resource_cache::{ResourceCache, ResourceStatus};
use crate::scene::RendererScene;
use crate::state::{SceneCompletion, SceneRequest, SceneState, SceneStateMachine};
use crate::stats::{SceneReferenceHook, TickReport, UpdateStatistics};
use crate::uploader::{AsyncEffectUploader, DefaultEffectCompiler, EffectCompiler, UploadError};
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::time::Duration;
use strata_ir::{
    DataSlotId, DataSlotKind, DataValue, Flush, FlushIndex, FlushValidator, ResourceContentHash,
    ResourceDescriptor, SceneAction, SceneId, SceneTransport, TransportError, TransportMessage,
};

/// Value a consumer slot resolves to after link resolution
#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedSlot {
    /// Unbound; the slot's own value
    Local(DataValue),
    /// Value of the linked provider slot
    Linked(DataValue),
    /// Sampling an offscreen buffer
    OffscreenBuffer(OffscreenBufferId),
    /// Sampling a stream buffer; unavailable sources show the fallback
    StreamBuffer { buffer: StreamBufferId, available: bool },
}

impl ResolvedSlot {
    /// Data value, for slots resolving to one
    pub fn value(&self) -> Option<&DataValue> {
        match self {
            Self::Local(value) | Self::Linked(value) => Some(value),
            _ => None,
        }
    }
}

struct PendingFlush {
    flush: Flush,
    enqueued_ms: u64,
}

struct SceneEntry {
    state: SceneStateMachine,
    content: RendererScene,
    registry: ResourceRegistry,
    pending: VecDeque<PendingFlush>,
    last_received: Option<FlushIndex>,
    /// Client resource data supplied by this scene's flushes
    known_resources: HashMap<ResourceContentHash, ResourceDescriptor>,
    /// Hashes this scene currently references in the cache
    referenced: BTreeSet<ResourceContentHash>,
    /// Scene resources are mirrored on the device
    realized: bool,
    modified: bool,
    expired: bool,
}

impl SceneEntry {
    fn new(scene: SceneId) -> Self {
        Self {
            state: SceneStateMachine::new(),
            content: RendererScene::new(scene),
            registry: ResourceRegistry::new(scene),
            pending: VecDeque::new(),
            last_received: None,
            known_resources: HashMap::new(),
            referenced: BTreeSet::new(),
            realized: false,
            modified: false,
            expired: false,
        }
    }

    /// Applied client resources plus those pending flushes add
    fn required_resources(&self) -> BTreeSet<ResourceContentHash> {
        let mut required = self.content.client_resources().clone();
        // Pending removals take effect once their flush is applied
        for pending in &self.pending {
            required.extend(pending.flush.required_resources());
        }
        required
    }

    /// Number of pending flushes that can be applied without waiting
    fn ready_prefix(&self, cache: &ResourceCache) -> usize {
        if !self.realized {
            return self.pending.len();
        }
        self.pending
            .iter()
            .take_while(|pending| pending.flush.required_resources().all(|hash| cache.is_uploaded(hash)))
            .count()
    }
}

fn release_registry(registry: &mut ResourceRegistry, device: Option<&mut RenderDevice>) {
    let entries = registry.drain();
    let Some(device) = device else {
        return;
    };
    for (resource, entry) in entries {
        if let Err(e) = device.release(entry.device) {
            log::warn!("Scene {}: failed to release {}: {}", registry.scene(), resource, e);
        }
    }
}

fn outcome<T>(result: &RendererResult<T>) -> EventResult {
    if result.is_ok() {
        EventResult::Ok
    } else {
        EventResult::Failed
    }
}

fn lifecycle_event(scene: SceneId, request: SceneRequest, result: EventResult) -> RendererEvent {
    match request {
        SceneRequest::Publish => RendererEvent::ScenePublished { scene, result },
        SceneRequest::Unpublish => RendererEvent::SceneUnpublished { scene, result },
        SceneRequest::Subscribe => RendererEvent::SceneSubscribed { scene, result },
        SceneRequest::Unsubscribe => RendererEvent::SceneUnsubscribed { scene, result },
        SceneRequest::Map => RendererEvent::SceneMapped { scene, result },
        SceneRequest::Unmap => RendererEvent::SceneUnmapped { scene, result },
        SceneRequest::Show => RendererEvent::SceneShown { scene, result },
        SceneRequest::Hide => RendererEvent::SceneHidden { scene, result },
    }
}

/// The renderer's scene update orchestrator
pub struct SceneUpdater {
    context: RendererContext,
    /// Registration order; every phase walks scenes in this order
    order: Vec<SceneId>,
    scenes: HashMap<SceneId, SceneEntry>,
    links: DataLinkGraph,
    buffers: BufferManager,
    cache: ResourceCache,
    device: Option<RenderDevice>,
    uploader: AsyncEffectUploader,
    validator: FlushValidator,
    events: EventCollector,
    dirty: BTreeSet<SceneId>,
    /// Scenes made dirty by something other than their own flushes
    pending_dirty: BTreeSet<SceneId>,
    resolved: HashMap<(SceneId, DataSlotId), ResolvedSlot>,
    stats: UpdateStatistics,
    tick_counters: UpdateStatistics,
    hook: Option<Box<dyn SceneReferenceHook>>,
    tick: u64,
}

impl SceneUpdater {
    /// Create a new updater with the default effect compiler
    pub fn new(context: RendererContext) -> RendererResult<Self> {
        Self::with_compiler(context, DefaultEffectCompiler)
    }

    /// Create a new updater with a custom effect compiler
    pub fn with_compiler(context: RendererContext, compiler: impl EffectCompiler) -> RendererResult<Self> {
        context.config.validate()?;
        let uploader = AsyncEffectUploader::new(compiler, context.config.uploader_queue_capacity)?;
        let validator = FlushValidator::new(context.config.max_actions_per_flush);

        log::info!(
            "Scene updater created (force-apply above {} pending, kill at {})",
            context.config.max_pending_flushes_to_force_apply,
            context.config.max_pending_flushes_to_kill_scene
        );

        Ok(Self {
            context,
            order: Vec::new(),
            scenes: HashMap::new(),
            links: DataLinkGraph::new(),
            buffers: BufferManager::new(),
            cache: ResourceCache::new(),
            device: None,
            uploader,
            validator,
            events: EventCollector::new(),
            dirty: BTreeSet::new(),
            pending_dirty: BTreeSet::new(),
            resolved: HashMap::new(),
            stats: UpdateStatistics::default(),
            tick_counters: UpdateStatistics::default(),
            hook: None,
            tick: 0,
        })
    }

    /// The context the updater was built with
    pub fn context(&self) -> &RendererContext {
        &self.context
    }

    fn register_scene(&mut self, scene: SceneId) -> &mut SceneEntry {
        if !self.scenes.contains_key(&scene) {
            log::debug!("Registering scene {}", scene);
            self.order.push(scene);
        }
        self.scenes.entry(scene).or_insert_with(|| SceneEntry::new(scene))
    }

    fn request_transition(&mut self, scene: SceneId, request: SceneRequest) -> RendererResult<SceneState> {
        let result = match self.scenes.get_mut(&scene) {
            Some(entry) => entry
                .state
                .request(request)
                .map_err(|source| RendererError::State { scene, source }),
            None => Err(RendererError::UnknownScene(scene)),
        };
        if let Err(e) = &result {
            log::warn!("Scene {}: {:?} refused: {}", scene, request, e);
            self.events.push(lifecycle_event(scene, request, EventResult::Failed));
        }
        result
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// A producer made `scene` available
    pub fn publish(&mut self, scene: SceneId) -> RendererResult<()> {
        self.register_scene(scene);
        self.request_transition(scene, SceneRequest::Publish)?;
        log::info!("Scene {} published", scene);
        self.events.push(RendererEvent::ScenePublished {
            scene,
            result: EventResult::Ok,
        });
        Ok(())
    }

    /// A producer withdrew `scene`; everything it owns is released
    pub fn unpublish(&mut self, scene: SceneId) -> RendererResult<()> {
        self.request_transition(scene, SceneRequest::Unpublish)?;
        self.remove_scene(scene);
        log::info!("Scene {} unpublished", scene);
        self.events.push(RendererEvent::SceneUnpublished {
            scene,
            result: EventResult::Ok,
        });
        Ok(())
    }

    /// Start receiving flushes for `scene`
    ///
    /// The subscription completes when the first flush is applied.
    pub fn subscribe(&mut self, scene: SceneId) -> RendererResult<()> {
        self.request_transition(scene, SceneRequest::Subscribe)?;
        log::info!("Scene {} subscription requested", scene);
        Ok(())
    }

    /// Stop receiving flushes for `scene` and drop its content
    pub fn unsubscribe(&mut self, scene: SceneId) -> RendererResult<()> {
        self.request_transition(scene, SceneRequest::Unsubscribe)?;
        self.reset_scene_content(scene);
        log::info!("Scene {} unsubscribing", scene);
        Ok(())
    }

    /// Request device resources for `scene`
    ///
    /// The map completes once nothing is pending and every client resource
    /// the scene uses is uploaded (or known to be broken).
    pub fn map(&mut self, scene: SceneId) -> RendererResult<()> {
        if self.device.is_none() {
            log::warn!("Scene {}: map refused, no display", scene);
            self.events.push(RendererEvent::SceneMapped {
                scene,
                result: EventResult::Failed,
            });
            return Err(RendererError::NoDisplay);
        }
        self.request_transition(scene, SceneRequest::Map)?;
        log::info!("Scene {} map requested", scene);
        Ok(())
    }

    /// Release device resources of `scene`
    pub fn unmap(&mut self, scene: SceneId) -> RendererResult<()> {
        self.request_transition(scene, SceneRequest::Unmap)?;
        log::info!("Scene {} unmap requested", scene);
        Ok(())
    }

    /// Start rendering a mapped scene
    pub fn show(&mut self, scene: SceneId) -> RendererResult<()> {
        self.request_transition(scene, SceneRequest::Show)?;
        self.pending_dirty.insert(scene);
        log::info!("Scene {} shown", scene);
        self.events.push(RendererEvent::SceneShown {
            scene,
            result: EventResult::Ok,
        });
        Ok(())
    }

    /// Stop rendering a shown scene
    pub fn hide(&mut self, scene: SceneId) -> RendererResult<()> {
        self.request_transition(scene, SceneRequest::Hide)?;
        self.pending_dirty.insert(scene);
        log::info!("Scene {} hidden", scene);
        self.events.push(RendererEvent::SceneHidden {
            scene,
            result: EventResult::Ok,
        });
        Ok(())
    }

    /// Release device objects, cache references, links and content of a scene
    fn reset_scene_content(&mut self, scene: SceneId) {
        let Some(entry) = self.scenes.get_mut(&scene) else {
            return;
        };

        release_registry(&mut entry.registry, self.device.as_mut());
        entry.realized = false;
        entry.referenced.clear();
        self.cache.unreference_scene(scene);

        entry.pending.clear();
        entry.content.reset();
        entry.known_resources.clear();
        entry.modified = false;
        entry.expired = false;

        for link in self.links.remove_scene(scene) {
            if link.consumer != scene {
                self.events.push(RendererEvent::DataUnlinked {
                    consumer: link.consumer,
                    slot: link.consumer_slot,
                    result: EventResult::Indirect,
                });
                self.pending_dirty.insert(link.consumer);
            }
        }
        self.resolved.retain(|(consumer, _), _| *consumer != scene);
    }

    fn remove_scene(&mut self, scene: SceneId) {
        self.reset_scene_content(scene);
        self.buffers.remove_scene(scene);
        self.scenes.remove(&scene);
        self.order.retain(|id| *id != scene);
        self.dirty.remove(&scene);
        self.pending_dirty.remove(&scene);
    }

    // ------------------------------------------------------------------
    // Flush intake
    // ------------------------------------------------------------------

    /// Queue a flush for `scene`
    ///
    /// Flushes must arrive in strictly increasing index order; anything
    /// else is rejected and never applied. Flushes for scenes that are not
    /// subscribed are dropped.
    pub fn handle_scene_update(&mut self, scene: SceneId, flush: Flush) -> RendererResult<()> {
        if flush.scene != scene {
            log::warn!("Flush for scene {} handed to scene {}", flush.scene, scene);
            return Err(RendererError::SceneMismatch {
                expected: scene,
                flush: flush.scene,
            });
        }

        if !self.scenes.contains_key(&scene) {
            let entry = self.register_scene(scene);
            if entry.state.request(SceneRequest::Publish).is_ok() {
                log::info!("Scene {} published by its first flush", scene);
                self.events.push(RendererEvent::ScenePublished {
                    scene,
                    result: EventResult::Indirect,
                });
            }
        }

        let now = self.context.now_ms();
        let Some(entry) = self.scenes.get_mut(&scene) else {
            return Err(RendererError::UnknownScene(scene));
        };

        if !entry.state.state().is_subscribed() {
            log::warn!(
                "Scene {}: dropping flush {} received in state {}",
                scene,
                flush.index,
                entry.state.state()
            );
            self.tick_counters.flushes_dropped += 1;
            return Ok(());
        }

        if let Some(last) = entry.last_received {
            if flush.index <= last {
                log::warn!("Scene {}: flush {} arrived after flush {}", scene, flush.index, last);
                return Err(TransportError::OutOfOrderFlush {
                    scene,
                    last,
                    got: flush.index,
                }
                .into());
            }
        }

        log::trace!("Scene {}: queued flush {} ({} actions)", scene, flush.index, flush.len());
        entry.last_received = Some(flush.index);
        entry.pending.push_back(PendingFlush {
            flush,
            enqueued_ms: now,
        });
        self.tick_counters.flushes_received += 1;
        Ok(())
    }

    /// Forward every message waiting on `transport`
    ///
    /// Returns the errors of messages that were refused.
    pub fn dispatch_transport(&mut self, transport: &SceneTransport) -> Vec<RendererError> {
        let mut errors = Vec::new();
        for message in transport.receive_pending() {
            let result = match message {
                TransportMessage::ScenePublished(scene) => self.publish(scene),
                TransportMessage::SceneUnpublished(scene) => self.unpublish(scene),
                TransportMessage::SceneUpdate(flush) => self.handle_scene_update(flush.scene, flush),
            };
            if let Err(e) = result {
                errors.push(e);
            }
        }
        errors
    }

    // ------------------------------------------------------------------
    // Tick
    // ------------------------------------------------------------------

    /// Run one tick and report what it did
    pub fn update_scenes(&mut self) -> TickReport {
        self.tick += 1;
        self.tick_counters.ticks += 1;
        let now = self.context.now_ms();
        log::trace!("Update tick {} at {} ms", self.tick, now);

        // Phase 1
        self.process_upload_completions();
        self.consolidate_pending_flushes();

        // Phase 2
        self.reference_scene_resources();

        // Phase 3
        self.upload_and_unload_resources();

        // Phase 4
        let order = self.order.clone();
        for scene in &order {
            self.apply_pending_flushes(*scene, now);
        }

        // Phase 5
        self.resolve_data_links();
        let modified: BTreeSet<SceneId> = order
            .iter()
            .copied()
            .filter(|scene| self.scenes.get(scene).is_some_and(|entry| entry.modified))
            .collect();
        let dirty = self.propagate_dirty(&modified);
        if self.context.config.expiration_check {
            self.check_expiration(now);
        }

        let counters = std::mem::take(&mut self.tick_counters);
        self.stats.accumulate(&counters);
        let report = TickReport {
            tick: self.tick,
            now_ms: now,
            dirty_scenes: dirty.clone(),
            modified_scenes: modified,
            counters,
        };
        if let Some(hook) = self.hook.as_mut() {
            hook.on_tick(&report);
        }

        for entry in self.scenes.values_mut() {
            entry.modified = false;
        }
        self.pending_dirty.clear();
        self.dirty = dirty;

        if !report.dirty_scenes.is_empty() {
            log::debug!("Tick {}: {} dirty scenes", report.tick, report.dirty_scenes.len());
        }
        report
    }

    fn process_upload_completions(&mut self) {
        for (token, result) in self.uploader.poll_completed() {
            let Some(hash) = self.cache.complete_upload(token) else {
                log::debug!("Dropping result of discarded upload {}", token);
                self.tick_counters.uploads_discarded += 1;
                continue;
            };

            let registered = match (result, self.device.as_mut()) {
                (Ok(effect), Some(device)) => device.register_effect(&effect).map_err(|e| e.to_string()),
                (Ok(_), None) => Err("no display".to_string()),
                (Err(e), _) => Err(e.to_string()),
            };
            match registered {
                Ok(handle) => {
                    log::debug!("Effect {} uploaded", hash);
                    self.cache.mark_uploaded(hash, handle);
                    self.tick_counters.resources_uploaded += 1;
                }
                Err(reason) => self.resource_failed(hash, reason),
            }
        }
    }

    fn resource_failed(&mut self, hash: ResourceContentHash, reason: String) {
        self.cache.mark_broken(hash);
        self.tick_counters.upload_failures += 1;
        for scene in self.cache.referencing_scenes(hash) {
            log::error!("Scene {}: resource {} failed to upload: {}", scene, hash, reason);
            self.events.push(RendererEvent::ResourceUploadFailed {
                scene,
                hash,
                reason: reason.clone(),
            });
        }
    }

    fn consolidate_pending_flushes(&mut self) {
        for scene in &self.order {
            let Some(entry) = self.scenes.get_mut(scene) else {
                continue;
            };
            for pending in entry.pending.iter_mut() {
                for descriptor in std::mem::take(&mut pending.flush.resources) {
                    entry.known_resources.entry(descriptor.hash).or_insert(descriptor);
                }
            }
        }
    }

    fn reference_scene_resources(&mut self) {
        let order = self.order.clone();
        for scene in order {
            let Some(entry) = self.scenes.get_mut(&scene) else {
                continue;
            };
            let state = entry.state.state();

            if state.wants_device() {
                if !entry.realized {
                    let Some(device) = self.device.as_mut() else {
                        continue;
                    };
                    for (resource, e) in entry.content.realize(&mut entry.registry, device) {
                        log::error!("Scene {}: failed to realize {}: {}", scene, resource, e);
                        self.events.push(RendererEvent::SceneResourceFailed {
                            scene,
                            resource,
                            reason: e.to_string(),
                        });
                    }
                    entry.realized = true;
                    log::debug!("Scene {}: {} resources on device", scene, entry.registry.len());
                }

                let required = entry.required_resources();
                for hash in &required {
                    if entry.referenced.insert(*hash) {
                        self.cache.reference(*hash, scene);
                    }
                }
                let stale: Vec<_> = entry.referenced.difference(&required).copied().collect();
                for hash in stale {
                    entry.referenced.remove(&hash);
                    self.cache.unreference(hash, scene);
                }
            } else if state == SceneState::Unmapping {
                release_registry(&mut entry.registry, self.device.as_mut());
                entry.realized = false;
                entry.referenced.clear();
                self.cache.unreference_scene(scene);
                if entry.state.complete(SceneCompletion::UnmapCompleted).is_ok() {
                    log::info!("Scene {} unmapped", scene);
                    self.events.push(RendererEvent::SceneUnmapped {
                        scene,
                        result: EventResult::Ok,
                    });
                }
            }
        }

        for hash in self.cache.missing() {
            let descriptor = self
                .scenes
                .values()
                .find_map(|entry| entry.known_resources.get(&hash));
            if let Some(descriptor) = descriptor {
                self.cache.provide(descriptor);
            }
        }
    }

    fn upload_and_unload_resources(&mut self) {
        for unloaded in self.cache.collect_unreferenced() {
            if let (Some(handle), Some(device)) = (unloaded.device, self.device.as_mut()) {
                if let Err(e) = device.release(handle) {
                    log::warn!("Failed to release resource {}: {}", unloaded.hash, e);
                }
            }
            if let Some(token) = unloaded.discarded {
                log::debug!("Resource {} unloaded while upload {} was running", unloaded.hash, token);
            }
            self.tick_counters.resources_unloaded += 1;
        }

        if self.device.is_none() {
            return;
        }

        let mut queue_full = false;
        for hash in self.cache.ready_to_upload() {
            let Some(descriptor) = self.cache.descriptor(hash).cloned() else {
                continue;
            };

            if descriptor.kind.is_async() {
                if queue_full {
                    continue;
                }
                match self.uploader.request_upload(descriptor) {
                    Ok(token) => {
                        self.cache.mark_uploading(hash, token);
                        self.tick_counters.effects_requested += 1;
                    }
                    Err(UploadError::QueueFull) => {
                        log::debug!("Effect queue full, {} waits for the next tick", hash);
                        queue_full = true;
                    }
                    Err(e) => self.resource_failed(hash, e.to_string()),
                }
                continue;
            }

            let uploaded = match self.device.as_mut() {
                Some(device) => device.upload_resource(&descriptor),
                None => continue,
            };
            match uploaded {
                Ok(handle) => {
                    self.cache.mark_uploaded(hash, handle);
                    self.tick_counters.resources_uploaded += 1;
                }
                Err(e) => self.resource_failed(hash, e.to_string()),
            }
        }
    }

    fn apply_pending_flushes(&mut self, scene: SceneId, now: u64) {
        let force_threshold = self.context.config.max_pending_flushes_to_force_apply;
        let kill_threshold = self.context.config.max_pending_flushes_to_kill_scene;
        let max_age = self.context.config.force_apply_after_ms;

        let Some(entry) = self.scenes.get_mut(&scene) else {
            return;
        };

        if entry.state.state() == SceneState::Unsubscribing {
            if entry.state.complete(SceneCompletion::UnsubscribeCompleted).is_ok() {
                log::info!("Scene {} unsubscribed", scene);
                self.events.push(RendererEvent::SceneUnsubscribed {
                    scene,
                    result: EventResult::Ok,
                });
            }
            return;
        }

        let pending = entry.pending.len();
        if pending >= kill_threshold {
            self.force_unsubscribe(scene, pending);
            return;
        }

        let ready = entry.ready_prefix(&self.cache);
        let count = if ready < pending {
            let oldest_age = entry
                .pending
                .front()
                .map_or(0, |oldest| now.saturating_sub(oldest.enqueued_ms));
            let deadline_passed = entry.pending.iter().any(|p| {
                p.flush
                    .time_info
                    .force_apply_deadline_ms
                    .is_some_and(|deadline| deadline <= now)
            });
            let too_old = max_age.is_some_and(|max| oldest_age >= max);

            if pending > force_threshold || too_old || deadline_passed {
                log::warn!(
                    "Scene {}: force-applying {} pending flushes ({} ready, oldest {} ms)",
                    scene,
                    pending,
                    ready,
                    oldest_age
                );
                self.events.push(RendererEvent::SceneFlushesForceApplied { scene, count: pending });
                self.tick_counters.flushes_force_applied += pending as u64;
                pending
            } else {
                ready
            }
        } else {
            pending
        };

        let flushes: Vec<Flush> = entry.pending.drain(..count).map(|p| p.flush).collect();
        for flush in flushes {
            self.apply_flush(scene, flush);
        }
        self.try_complete_map(scene);
    }

    fn force_unsubscribe(&mut self, scene: SceneId, pending: usize) {
        log::error!(
            "Scene {}: {} pending flushes reached the limit, force-unsubscribing",
            scene,
            pending
        );
        self.reset_scene_content(scene);
        if let Some(entry) = self.scenes.get_mut(&scene) {
            entry.state.force_unsubscribe();
        }
        self.buffers.remove_scene(scene);
        self.events.push(RendererEvent::SceneForceUnsubscribed { scene, pending });
        self.tick_counters.scenes_force_unsubscribed += 1;
    }

    fn apply_flush(&mut self, scene: SceneId, flush: Flush) {
        let Some(entry) = self.scenes.get_mut(&scene) else {
            return;
        };

        if let Err(e) = self.validator.validate(&flush, &entry.content) {
            log::warn!("Scene {}: flush {} rejected: {}", scene, flush.index, e);
            self.events.push(RendererEvent::SceneFlushRejected {
                scene,
                index: flush.index,
                reason: e.to_string(),
            });
            self.tick_counters.flushes_rejected += 1;
            return;
        }

        let mut destroyed_slots = Vec::new();
        for action in &flush.actions {
            entry.content.apply_action(action);
            if entry.realized {
                if let Some(device) = self.device.as_mut() {
                    if let Err(e) = entry.content.sync_action(action, &mut entry.registry, device) {
                        log::error!("Scene {}: {} failed on the device: {}", scene, action.name(), e);
                        if let Some(resource) = action.allocated_resource() {
                            self.events.push(RendererEvent::SceneResourceFailed {
                                scene,
                                resource,
                                reason: e.to_string(),
                            });
                        }
                    }
                }
            }
            if let SceneAction::DestroyDataSlot { slot } = action {
                destroyed_slots.push(*slot);
            }
        }
        entry.content.finish_flush(&flush);
        for hash in &flush.resource_changes.removed {
            if !entry.content.client_resources().contains(hash) {
                entry.known_resources.remove(hash);
            }
        }
        entry.modified = true;

        if entry.state.state() == SceneState::SubscriptionRequested
            && entry.state.complete(SceneCompletion::SubscriptionReceived).is_ok()
        {
            log::info!("Scene {} subscribed", scene);
            self.events.push(RendererEvent::SceneSubscribed {
                scene,
                result: EventResult::Ok,
            });
        }
        entry.state.mark_flush_applied();

        if let Some(version_tag) = flush.version_tag {
            self.events.push(RendererEvent::SceneFlushed { scene, version_tag });
        }
        self.tick_counters.flushes_applied += 1;
        log::trace!("Scene {}: applied flush {}", scene, flush.index);

        for slot in destroyed_slots {
            for link in self.links.remove_slot(scene, slot) {
                self.events.push(RendererEvent::DataUnlinked {
                    consumer: link.consumer,
                    slot: link.consumer_slot,
                    result: EventResult::Indirect,
                });
                self.pending_dirty.insert(link.consumer);
            }
        }
    }

    fn try_complete_map(&mut self, scene: SceneId) {
        let Some(entry) = self.scenes.get_mut(&scene) else {
            return;
        };
        if entry.state.state() != SceneState::MapRequested || !entry.pending.is_empty() || !entry.realized {
            return;
        }
        let resources_done = entry.referenced.iter().all(|hash| {
            matches!(
                self.cache.status(*hash),
                Some(ResourceStatus::Uploaded | ResourceStatus::Broken)
            )
        });
        if resources_done && entry.state.complete(SceneCompletion::MapCompleted).is_ok() {
            log::info!("Scene {} mapped", scene);
            self.events.push(RendererEvent::SceneMapped {
                scene,
                result: EventResult::Ok,
            });
        }
    }

    fn resolve_data_links(&mut self) {
        self.resolved.clear();
        for scene in &self.order {
            let Some(entry) = self.scenes.get(scene) else {
                continue;
            };
            for (slot_id, slot) in entry.content.slots() {
                if !slot.kind.is_consumer() {
                    continue;
                }
                let local = || ResolvedSlot::Local(slot.value.clone());
                let resolved = match self.links.resolve(*scene, *slot_id) {
                    Some(LinkSource::Scene { scene: provider, slot: provider_slot }) => self
                        .scenes
                        .get(&provider)
                        .and_then(|p| p.content.slot(provider_slot))
                        .map(|p| ResolvedSlot::Linked(p.value.clone()))
                        .unwrap_or_else(local),
                    Some(LinkSource::OffscreenBuffer(buffer)) => ResolvedSlot::OffscreenBuffer(buffer),
                    Some(LinkSource::StreamBuffer(buffer)) => ResolvedSlot::StreamBuffer {
                        buffer,
                        available: self.buffers.stream(buffer).is_some_and(|s| s.available),
                    },
                    None => local(),
                };
                self.resolved.insert((*scene, *slot_id), resolved);
            }
        }
    }

    fn propagate_dirty(&self, modified: &BTreeSet<SceneId>) -> BTreeSet<SceneId> {
        let mut dirty: BTreeSet<SceneId> = modified.union(&self.pending_dirty).copied().collect();
        let mut stack: Vec<SceneId> = dirty.iter().copied().collect();

        while let Some(scene) = stack.pop() {
            let mut next = self.links.scenes_dependent_on(scene);
            if let Some(buffer) = self.buffers.assignment(scene) {
                next.extend(
                    self.links
                        .consumers_of_offscreen_buffer(buffer)
                        .into_iter()
                        .map(|(consumer, _)| consumer),
                );
            }
            for consumer in next {
                if dirty.insert(consumer) {
                    stack.push(consumer);
                }
            }
        }

        dirty.retain(|scene| self.scenes.contains_key(scene));
        dirty
    }

    fn check_expiration(&mut self, now: u64) {
        for scene in &self.order {
            let Some(entry) = self.scenes.get_mut(scene) else {
                continue;
            };
            let past = entry.content.expiration_ms().is_some_and(|expiration| expiration < now);

            if past && !entry.expired && entry.state.state() == SceneState::Rendered {
                log::warn!("Scene {} shows expired content", scene);
                entry.expired = true;
                self.events.push(RendererEvent::SceneExpired { scene: *scene });
            } else if !past && entry.expired {
                log::info!("Scene {} recovered from expiration", scene);
                entry.expired = false;
                self.events.push(RendererEvent::SceneRecoveredFromExpiration { scene: *scene });
            }
        }
    }

    // ------------------------------------------------------------------
    // Display
    // ------------------------------------------------------------------

    /// Take ownership of the device, capping its budget at the configured one
    pub fn create_display(&mut self, mut device: RenderDevice) -> RendererResult<()> {
        if self.device.is_some() {
            log::warn!("Display creation refused, a display already exists");
            self.events.push(RendererEvent::DisplayCreated {
                result: EventResult::Failed,
            });
            return Err(RendererError::DisplayAlreadyExists);
        }
        if let Some(limit) = self.context.config.device_memory_budget {
            let budget = device.memory_budget().map_or(limit, |own| own.min(limit));
            device.set_memory_budget(Some(budget));
        }
        log::info!("Display created on {} device", device.kind());
        self.device = Some(device);
        self.events.push(RendererEvent::DisplayCreated { result: EventResult::Ok });
        Ok(())
    }

    /// Give the device back; fails while anything still lives on it
    pub fn destroy_display(&mut self) -> RendererResult<RenderDevice> {
        let result = self.try_destroy_display();
        if let Err(e) = &result {
            log::warn!("Display destruction refused: {}", e);
        }
        self.events.push(RendererEvent::DisplayDestroyed {
            result: outcome(&result),
        });
        result
    }

    fn try_destroy_display(&mut self) -> RendererResult<RenderDevice> {
        if self.device.is_none() {
            return Err(RendererError::NoDisplay);
        }
        let scenes = self
            .scenes
            .values()
            .filter(|entry| entry.realized || entry.state.state().wants_device() || entry.state.state() == SceneState::Unmapping)
            .count();
        let offscreen_buffers = self.buffers.offscreen_count();
        if scenes > 0 || offscreen_buffers > 0 {
            return Err(RendererError::DisplayInUse {
                scenes,
                offscreen_buffers,
            });
        }

        let mut device = self.device.take().ok_or(RendererError::NoDisplay)?;
        for unloaded in self.cache.clear() {
            if let Some(handle) = unloaded.device {
                if let Err(e) = device.release(handle) {
                    log::warn!("Failed to release resource {}: {}", unloaded.hash, e);
                }
            }
        }
        log::info!("Display destroyed, {} device objects left", device.object_count());
        Ok(device)
    }

    /// Whether a display exists
    pub fn has_display(&self) -> bool {
        self.device.is_some()
    }

    /// The display's device
    pub fn device(&self) -> Option<&RenderDevice> {
        self.device.as_ref()
    }

    // ------------------------------------------------------------------
    // Offscreen and stream buffers
    // ------------------------------------------------------------------

    /// Create an offscreen buffer on the display
    pub fn create_offscreen_buffer(&mut self, id: OffscreenBufferId, width: u32, height: u32) -> RendererResult<()> {
        let result = self.try_create_offscreen_buffer(id, width, height);
        if let Err(e) = &result {
            log::warn!("Offscreen buffer {} not created: {}", id, e);
        }
        self.events.push(RendererEvent::OffscreenBufferCreated {
            buffer: id,
            result: outcome(&result),
        });
        result
    }

    fn try_create_offscreen_buffer(&mut self, id: OffscreenBufferId, width: u32, height: u32) -> RendererResult<()> {
        let device = self.device.as_mut().ok_or(RendererError::NoDisplay)?;
        self.buffers.check_create_offscreen(id, width, height)?;
        let handle = device.allocate(
            DeviceObjectKind::OffscreenBuffer,
            OffscreenBuffer::byte_size_for(width, height),
            &format!("offscreen buffer {}", id),
        )?;
        let buffer = OffscreenBuffer {
            id,
            width,
            height,
            device: handle,
        };
        if let Err(e) = self.buffers.insert_offscreen(buffer) {
            let _ = device.release(handle);
            return Err(e.into());
        }
        log::info!("Offscreen buffer {} created ({}x{})", id, width, height);
        Ok(())
    }

    /// Destroy an offscreen buffer; fails while consumer links remain
    ///
    /// Scenes assigned to the buffer go back to the framebuffer.
    pub fn destroy_offscreen_buffer(&mut self, id: OffscreenBufferId) -> RendererResult<()> {
        let result = self.try_destroy_offscreen_buffer(id);
        if let Err(e) = &result {
            log::warn!("Offscreen buffer {} not destroyed: {}", id, e);
        }
        self.events.push(RendererEvent::OffscreenBufferDestroyed {
            buffer: id,
            result: outcome(&result),
        });
        result
    }

    fn try_destroy_offscreen_buffer(&mut self, id: OffscreenBufferId) -> RendererResult<()> {
        if self.buffers.offscreen(id).is_none() {
            return Err(BufferError::UnknownOffscreenBuffer(id).into());
        }
        let consumers = self.links.consumers_of_offscreen_buffer(id).len();
        if consumers > 0 {
            return Err(BufferError::OffscreenBufferInUse { buffer: id, consumers }.into());
        }

        let (buffer, reassigned) = self.buffers.remove_offscreen(id)?;
        if let Some(device) = self.device.as_mut() {
            device.release(buffer.device)?;
        }
        for scene in reassigned {
            self.events.push(RendererEvent::SceneAssignedToBuffer {
                scene,
                buffer: None,
                result: EventResult::Indirect,
            });
            self.pending_dirty.insert(scene);
        }
        log::info!("Offscreen buffer {} destroyed", id);
        Ok(())
    }

    /// Render `scene` into an offscreen buffer, or the framebuffer for `None`
    pub fn assign_scene_to_offscreen_buffer(
        &mut self,
        scene: SceneId,
        buffer: Option<OffscreenBufferId>,
    ) -> RendererResult<()> {
        let result = if self.scenes.contains_key(&scene) {
            self.buffers.assign(scene, buffer).map_err(RendererError::from)
        } else {
            Err(RendererError::UnknownScene(scene))
        };
        match &result {
            Ok(()) => {
                log::debug!("Scene {} assigned to {:?}", scene, buffer);
                self.pending_dirty.insert(scene);
            }
            Err(e) => log::warn!("Scene {} not assigned: {}", scene, e),
        }
        self.events.push(RendererEvent::SceneAssignedToBuffer {
            scene,
            buffer,
            result: outcome(&result),
        });
        result
    }

    /// Create a stream buffer fed by a compositor source
    pub fn create_stream_buffer(&mut self, id: StreamBufferId, source: StreamSourceId) -> RendererResult<()> {
        let result = self
            .buffers
            .create_stream(id, source)
            .map(|buffer| buffer.available)
            .map_err(RendererError::from);
        match &result {
            Ok(available) => log::info!("Stream buffer {} created (source {}, available: {})", id, source, available),
            Err(e) => log::warn!("Stream buffer {} not created: {}", id, e),
        }
        self.events.push(RendererEvent::StreamBufferCreated {
            buffer: id,
            result: outcome(&result),
        });
        result.map(|_| ())
    }

    /// Destroy a stream buffer and every link consuming it
    pub fn destroy_stream_buffer(&mut self, id: StreamBufferId) -> RendererResult<()> {
        let result = self.buffers.destroy_stream(id).map_err(RendererError::from);
        if result.is_ok() {
            for link in self.links.remove_stream_buffer(id) {
                self.events.push(RendererEvent::DataUnlinked {
                    consumer: link.consumer,
                    slot: link.consumer_slot,
                    result: EventResult::Indirect,
                });
                self.pending_dirty.insert(link.consumer);
            }
            log::info!("Stream buffer {} destroyed", id);
        } else if let Err(e) = &result {
            log::warn!("Stream buffer {} not destroyed: {}", id, e);
        }
        self.events.push(RendererEvent::StreamBufferDestroyed {
            buffer: id,
            result: outcome(&result),
        });
        result.map(|_| ())
    }

    /// The compositor reports a stream source (dis)appearing
    pub fn stream_source_updated(&mut self, source: StreamSourceId, available: bool) {
        let changed = self.buffers.set_source_available(source, available);
        for buffer in &changed {
            for (consumer, _) in self.links.consumers_of_stream_buffer(*buffer) {
                self.pending_dirty.insert(consumer);
            }
        }
        log::debug!(
            "Stream source {} available: {} ({} stream buffers changed)",
            source,
            available,
            changed.len()
        );
        self.events
            .push(RendererEvent::StreamSourceAvailabilityChanged { source, available });
    }

    // ------------------------------------------------------------------
    // Data links
    // ------------------------------------------------------------------

    /// Bind a consumer slot to a provider slot of another scene
    pub fn link_data(
        &mut self,
        provider: SceneId,
        provider_slot: DataSlotId,
        consumer: SceneId,
        consumer_slot: DataSlotId,
    ) -> RendererResult<()> {
        let source = LinkSource::Scene {
            scene: provider,
            slot: provider_slot,
        };
        let result = self
            .check_scene_link(provider, provider_slot, consumer, consumer_slot)
            .map(|kind| self.links.link(source, consumer, consumer_slot, kind));
        self.finish_link(source, consumer, consumer_slot, result)
    }

    fn check_scene_link(
        &self,
        provider: SceneId,
        provider_slot: DataSlotId,
        consumer: SceneId,
        consumer_slot: DataSlotId,
    ) -> RendererResult<LinkKind> {
        let provider_entry = self.scenes.get(&provider).ok_or(LinkError::UnknownScene(provider))?;
        let consumer_entry = self.scenes.get(&consumer).ok_or(LinkError::UnknownScene(consumer))?;
        if provider == consumer {
            return Err(LinkError::SelfLink { scene: provider }.into());
        }

        let provided = provider_entry
            .content
            .slot(provider_slot)
            .filter(|slot| slot.kind.is_provider())
            .ok_or(LinkError::ProviderSlotNotFound {
                scene: provider,
                slot: provider_slot,
            })?;
        let kind = match provided.kind {
            DataSlotKind::TransformationProvider => LinkKind::Transformation,
            DataSlotKind::TextureProvider => LinkKind::Texture,
            _ => LinkKind::Data,
        };

        let consumed = consumer_entry
            .content
            .slot(consumer_slot)
            .filter(|slot| slot.kind.is_consumer())
            .ok_or(LinkError::ConsumerSlotNotFound {
                scene: consumer,
                slot: consumer_slot,
            })?;
        if provided.kind.matching_consumer() != Some(consumed.kind) {
            return Err(LinkError::KindMismatch {
                scene: consumer,
                slot: consumer_slot,
                kind,
            }
            .into());
        }

        let provider_type = provided.value.value_type();
        let consumer_type = consumed.value.value_type();
        if provider_type != consumer_type {
            return Err(LinkError::ValueTypeMismatch {
                provider: provider_type,
                consumer: consumer_type,
            }
            .into());
        }

        if self.links.would_create_cycle(provider, consumer) {
            return Err(LinkError::DependencyCycle { provider, consumer }.into());
        }
        Ok(kind)
    }

    /// Bind a texture consumer slot to an offscreen buffer
    pub fn link_offscreen_buffer(
        &mut self,
        buffer: OffscreenBufferId,
        consumer: SceneId,
        consumer_slot: DataSlotId,
    ) -> RendererResult<()> {
        let source = LinkSource::OffscreenBuffer(buffer);
        let result = self
            .check_buffer_link(source, consumer, consumer_slot)
            .map(|kind| self.links.link(source, consumer, consumer_slot, kind));
        self.finish_link(source, consumer, consumer_slot, result)
    }

    /// Bind a texture consumer slot to a stream buffer
    pub fn link_stream_buffer(
        &mut self,
        buffer: StreamBufferId,
        consumer: SceneId,
        consumer_slot: DataSlotId,
    ) -> RendererResult<()> {
        let source = LinkSource::StreamBuffer(buffer);
        let result = self
            .check_buffer_link(source, consumer, consumer_slot)
            .map(|kind| self.links.link(source, consumer, consumer_slot, kind));
        self.finish_link(source, consumer, consumer_slot, result)
    }

    fn check_buffer_link(
        &self,
        source: LinkSource,
        consumer: SceneId,
        consumer_slot: DataSlotId,
    ) -> RendererResult<LinkKind> {
        let kind = match source {
            LinkSource::OffscreenBuffer(buffer) => {
                if self.buffers.offscreen(buffer).is_none() {
                    return Err(BufferError::UnknownOffscreenBuffer(buffer).into());
                }
                if self.buffers.assignment(consumer) == Some(buffer) {
                    return Err(LinkError::SelfLink { scene: consumer }.into());
                }
                LinkKind::OffscreenBuffer
            }
            LinkSource::StreamBuffer(buffer) => {
                if self.buffers.stream(buffer).is_none() {
                    return Err(BufferError::UnknownStreamBuffer(buffer).into());
                }
                LinkKind::StreamBuffer
            }
            LinkSource::Scene { .. } => LinkKind::Data,
        };

        let entry = self.scenes.get(&consumer).ok_or(LinkError::UnknownScene(consumer))?;
        let slot = entry.content.slot(consumer_slot).ok_or(LinkError::ConsumerSlotNotFound {
            scene: consumer,
            slot: consumer_slot,
        })?;
        if slot.kind != DataSlotKind::TextureConsumer {
            return Err(LinkError::KindMismatch {
                scene: consumer,
                slot: consumer_slot,
                kind,
            }
            .into());
        }
        Ok(kind)
    }

    fn finish_link(
        &mut self,
        source: LinkSource,
        consumer: SceneId,
        consumer_slot: DataSlotId,
        result: RendererResult<Option<DataLink>>,
    ) -> RendererResult<()> {
        match &result {
            Ok(replaced) => {
                if let Some(replaced) = replaced {
                    log::debug!(
                        "Slot {} of scene {} dropped its link to {:?}",
                        consumer_slot,
                        consumer,
                        replaced.source
                    );
                    self.events.push(RendererEvent::DataUnlinked {
                        consumer,
                        slot: consumer_slot,
                        result: EventResult::Indirect,
                    });
                }
                log::info!("Linked {:?} into slot {} of scene {}", source, consumer_slot, consumer);
                self.pending_dirty.insert(consumer);
            }
            Err(e) => log::warn!("Link into slot {} of scene {} refused: {}", consumer_slot, consumer, e),
        }
        let result = result.map(|_| ());
        self.events.push(RendererEvent::DataLinked {
            source,
            consumer,
            slot: consumer_slot,
            result: outcome(&result),
        });
        result
    }

    /// Remove the link on a consumer slot
    pub fn unlink_data(&mut self, consumer: SceneId, consumer_slot: DataSlotId) -> RendererResult<()> {
        let result = match self.links.unlink(consumer, consumer_slot) {
            Some(_) => Ok(()),
            None => Err(LinkError::NotLinked {
                scene: consumer,
                slot: consumer_slot,
            }
            .into()),
        };
        match &result {
            Ok(()) => {
                log::info!("Unlinked slot {} of scene {}", consumer_slot, consumer);
                self.pending_dirty.insert(consumer);
            }
            Err(e) => log::warn!("Unlink refused: {}", e),
        }
        self.events.push(RendererEvent::DataUnlinked {
            consumer,
            slot: consumer_slot,
            result: outcome(&result),
        });
        result
    }

    /// All current data links
    pub fn links(&self) -> &DataLinkGraph {
        &self.links
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Scenes that must be re-rendered, as of the last tick
    pub fn dirty_scenes(&self) -> &BTreeSet<SceneId> {
        &self.dirty
    }

    /// Lifecycle state of a scene; `Unknown` for scenes never seen
    pub fn scene_state(&self, scene: SceneId) -> SceneState {
        self.scenes
            .get(&scene)
            .map_or(SceneState::Unknown, |entry| entry.state.state())
    }

    /// Flushes received but not yet applied
    pub fn pending_flush_count(&self, scene: SceneId) -> usize {
        self.scenes.get(&scene).map_or(0, |entry| entry.pending.len())
    }

    /// Device memory a scene's resources use in `category`
    pub fn resource_memory_usage(&self, scene: SceneId, category: MemoryCategory) -> u64 {
        self.scenes
            .get(&scene)
            .map_or(0, |entry| entry.registry.memory_usage(category))
    }

    /// Resolved value of a consumer slot, as of the last tick
    pub fn resolved_value(&self, scene: SceneId, slot: DataSlotId) -> Option<&ResolvedSlot> {
        self.resolved.get(&(scene, slot))
    }

    /// Logical content of a scene
    pub fn scene_content(&self, scene: SceneId) -> Option<&RendererScene> {
        self.scenes.get(&scene).map(|entry| &entry.content)
    }

    /// Resource registry of a scene
    pub fn scene_registry(&self, scene: SceneId) -> Option<&ResourceRegistry> {
        self.scenes.get(&scene).map(|entry| &entry.registry)
    }

    /// Upload status of a client resource
    pub fn resource_status(&self, hash: ResourceContentHash) -> Option<ResourceStatus> {
        self.cache.status(hash)
    }

    /// Number of client resources in the cache
    pub fn cached_resource_count(&self) -> usize {
        self.cache.len()
    }

    /// Offscreen buffer a scene renders into
    pub fn scene_assignment(&self, scene: SceneId) -> Option<OffscreenBufferId> {
        self.buffers.assignment(scene)
    }

    /// Known scenes in registration order
    pub fn scenes(&self) -> &[SceneId] {
        &self.order
    }

    /// Cumulative statistics, including the tick in progress
    pub fn statistics(&self) -> UpdateStatistics {
        let mut stats = self.stats;
        stats.accumulate(&self.tick_counters);
        stats
    }

    /// Take every event since the last drain
    pub fn drain_events(&mut self) -> Vec<RendererEvent> {
        self.events.drain()
    }

    /// Block until every requested effect compilation has a result
    ///
    /// For tools and tests; results are still only picked up by the next
    /// tick.
    pub fn wait_for_pending_uploads(&self, timeout: Duration) -> bool {
        self.uploader.wait_idle(timeout)
    }

    /// Install the callback run at the end of every tick
    pub fn set_scene_reference_hook(&mut self, hook: impl SceneReferenceHook + 'static) {
        self.hook = Some(Box::new(hook));
    }
}

impl Drop for SceneUpdater {
    fn drop(&mut self) {
        for entry in self.scenes.values_mut() {
            release_registry(&mut entry.registry, self.device.as_mut());
        }
        let offscreen = self.buffers.drain_offscreen();
        let unloaded = self.cache.clear();
        if let Some(device) = self.device.as_mut() {
            for buffer in offscreen {
                if let Err(e) = device.release(buffer.device) {
                    log::warn!("Failed to release offscreen buffer {}: {}", buffer.id, e);
                }
            }
            for resource in unloaded {
                if let Some(handle) = resource.device {
                    if let Err(e) = device.release(handle) {
                        log::warn!("Failed to release resource {}: {}", resource.hash, e);
                    }
                }
            }
        }
        log::info!("Scene updater dropped after {} ticks", self.tick);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RendererConfig;
    use crate::context::ManualClock;
    use strata_ir::{DataBufferHandle, DataBufferKind, FlushBuilder};

    fn updater() -> SceneUpdater {
        let context = RendererContext::new(RendererConfig::default(), ManualClock::new(0)).unwrap();
        SceneUpdater::new(context).unwrap()
    }

    fn subscribed(updater: &mut SceneUpdater, scene: SceneId) {
        updater.publish(scene).unwrap();
        updater.subscribe(scene).unwrap();
        updater
            .handle_scene_update(scene, Flush::new(scene, FlushIndex::new(1)))
            .unwrap();
        updater.update_scenes();
    }

    #[test]
    fn test_first_flush_completes_subscription() {
        let mut updater = updater();
        let scene = SceneId::new(1);
        subscribed(&mut updater, scene);

        assert_eq!(updater.scene_state(scene), SceneState::Subscribed);
        let events = updater.drain_events();
        assert!(events.contains(&RendererEvent::SceneSubscribed {
            scene,
            result: EventResult::Ok,
        }));
    }

    #[test]
    fn test_flush_for_unsubscribed_scene_is_dropped() {
        let mut updater = updater();
        let scene = SceneId::new(1);
        updater.publish(scene).unwrap();

        updater
            .handle_scene_update(scene, Flush::new(scene, FlushIndex::new(1)))
            .unwrap();
        assert_eq!(updater.pending_flush_count(scene), 0);
        assert_eq!(updater.statistics().flushes_dropped, 1);
    }

    #[test]
    fn test_scene_mismatch() {
        let mut updater = updater();
        let result = updater.handle_scene_update(SceneId::new(1), Flush::new(SceneId::new(2), FlushIndex::new(1)));
        assert!(matches!(result, Err(RendererError::SceneMismatch { .. })));
    }

    #[test]
    fn test_map_without_display() {
        let mut updater = updater();
        let scene = SceneId::new(1);
        subscribed(&mut updater, scene);

        assert!(matches!(updater.map(scene), Err(RendererError::NoDisplay)));
        assert_eq!(updater.scene_state(scene), SceneState::Subscribed);
    }

    #[test]
    fn test_map_realizes_scene_resources() {
        let mut updater = updater();
        let scene = SceneId::new(1);
        subscribed(&mut updater, scene);
        updater.create_display(RenderDevice::null(None)).unwrap();

        let flush = FlushBuilder::new(scene, FlushIndex::new(2))
            .action(SceneAction::AllocateDataBuffer {
                handle: DataBufferHandle::new(1),
                kind: DataBufferKind::Uniform,
                max_size_bytes: 64,
            })
            .build();
        updater.handle_scene_update(scene, flush).unwrap();
        updater.update_scenes();
        assert_eq!(updater.resource_memory_usage(scene, MemoryCategory::All), 0);

        updater.map(scene).unwrap();
        updater.update_scenes();
        assert_eq!(updater.scene_state(scene), SceneState::Mapped);
        assert_eq!(updater.resource_memory_usage(scene, MemoryCategory::DataBuffers), 64);

        updater.unmap(scene).unwrap();
        updater.update_scenes();
        assert_eq!(updater.scene_state(scene), SceneState::Subscribed);
        assert_eq!(updater.resource_memory_usage(scene, MemoryCategory::All), 0);

        let device = updater.destroy_display().unwrap();
        assert_eq!(device.object_count(), 0);
    }

    #[test]
    fn test_display_created_once() {
        let mut updater = updater();
        updater.create_display(RenderDevice::null(None)).unwrap();
        assert!(matches!(
            updater.create_display(RenderDevice::null(None)),
            Err(RendererError::DisplayAlreadyExists)
        ));
        assert!(updater.destroy_display().is_ok());
        assert!(matches!(updater.destroy_display(), Err(RendererError::NoDisplay)));
    }
}
