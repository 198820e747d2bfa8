//! Scene transport - in-process channel from producers to the renderer
//!
//! Producers publish scenes and send numbered flushes through a
//! [`ProducerHandle`]. The renderer drains everything that arrived since the
//! last tick with [`SceneTransport::receive_pending`]. Delivery is in order
//! and at most once per scene.

use crate::flush::{Flush, FlushBuilder, FlushIndex};
use crate::ids::SceneId;
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Configuration for the transport
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Maximum number of undelivered messages
    pub capacity: usize,
    /// Maximum actions a producer may put in one flush
    pub max_actions_per_flush: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            capacity: 4096,
            max_actions_per_flush: 100_000,
        }
    }
}

/// A message carried by the transport
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TransportMessage {
    /// A producer made a scene available
    ScenePublished(SceneId),
    /// A producer withdrew a scene
    SceneUnpublished(SceneId),
    /// A flush for a published scene
    SceneUpdate(Flush),
}

impl TransportMessage {
    /// Scene the message is about
    pub fn scene(&self) -> SceneId {
        match self {
            Self::ScenePublished(scene) | Self::SceneUnpublished(scene) => *scene,
            Self::SceneUpdate(flush) => flush.scene,
        }
    }
}

/// Statistics about transport usage
#[derive(Debug, Clone, Default)]
pub struct TransportStats {
    /// Messages accepted from producers
    pub messages_sent: u64,
    /// Messages handed to the renderer
    pub messages_received: u64,
    /// Flushes accepted from producers
    pub flushes_sent: u64,
    /// Sends refused because the channel was full
    pub sends_refused: u64,
    /// Largest backlog seen by `receive_pending`
    pub peak_backlog: usize,
}

/// Errors from the transport
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("transport channel is full")]
    ChannelFull,

    #[error("transport channel is disconnected")]
    Disconnected,

    #[error("scene {0} is already published")]
    SceneAlreadyPublished(SceneId),

    #[error("scene {0} is not published")]
    SceneNotPublished(SceneId),

    #[error("flush {got} for scene {scene} does not follow flush {last}")]
    OutOfOrderFlush {
        scene: SceneId,
        last: FlushIndex,
        got: FlushIndex,
    },

    #[error("flush has {count} actions, limit is {max}")]
    TooManyActions { count: usize, max: usize },
}

/// The renderer side of the transport
pub struct SceneTransport {
    config: TransportConfig,
    sender: Sender<TransportMessage>,
    receiver: Receiver<TransportMessage>,
    stats: Arc<RwLock<TransportStats>>,
}

impl SceneTransport {
    /// Create a new transport
    pub fn new(config: TransportConfig) -> Self {
        let (sender, receiver) = bounded(config.capacity);
        Self {
            config,
            sender,
            receiver,
            stats: Arc::new(RwLock::new(TransportStats::default())),
        }
    }

    /// Create a producer endpoint
    pub fn producer(&self) -> ProducerHandle {
        ProducerHandle {
            sender: self.sender.clone(),
            config: self.config.clone(),
            published: HashMap::new(),
            stats: Arc::clone(&self.stats),
        }
    }

    /// Drain every message that arrived since the last call
    pub fn receive_pending(&self) -> Vec<TransportMessage> {
        let backlog = self.receiver.len();
        let messages: Vec<_> = self.receiver.try_iter().collect();

        let mut stats = self.stats.write();
        stats.messages_received += messages.len() as u64;
        stats.peak_backlog = stats.peak_backlog.max(backlog);

        if !messages.is_empty() {
            log::trace!("transport delivered {} messages", messages.len());
        }
        messages
    }

    /// Number of undelivered messages
    pub fn backlog(&self) -> usize {
        self.receiver.len()
    }

    /// Get current statistics
    pub fn stats(&self) -> TransportStats {
        self.stats.read().clone()
    }
}

impl Default for SceneTransport {
    fn default() -> Self {
        Self::new(TransportConfig::default())
    }
}

/// Handle a producer uses to publish scenes and send flushes
///
/// Each handle numbers flushes per scene, so two handles must not publish
/// the same scene.
pub struct ProducerHandle {
    sender: Sender<TransportMessage>,
    config: TransportConfig,
    /// Last flush index handed out per published scene
    published: HashMap<SceneId, FlushIndex>,
    stats: Arc<RwLock<TransportStats>>,
}

impl ProducerHandle {
    /// Publish a scene
    pub fn publish(&mut self, scene: SceneId) -> Result<(), TransportError> {
        if self.published.contains_key(&scene) {
            return Err(TransportError::SceneAlreadyPublished(scene));
        }
        self.send_message(TransportMessage::ScenePublished(scene))?;
        self.published.insert(scene, FlushIndex::new(0));
        log::debug!("producer published scene {}", scene);
        Ok(())
    }

    /// Withdraw a scene
    pub fn unpublish(&mut self, scene: SceneId) -> Result<(), TransportError> {
        if !self.published.contains_key(&scene) {
            return Err(TransportError::SceneNotPublished(scene));
        }
        self.send_message(TransportMessage::SceneUnpublished(scene))?;
        self.published.remove(&scene);
        log::debug!("producer unpublished scene {}", scene);
        Ok(())
    }

    /// Check if this producer has published `scene`
    pub fn is_published(&self, scene: SceneId) -> bool {
        self.published.contains_key(&scene)
    }

    /// Begin building the next flush for `scene`
    pub fn begin_flush(&self, scene: SceneId) -> Result<FlushBuilder, TransportError> {
        let last = self
            .published
            .get(&scene)
            .ok_or(TransportError::SceneNotPublished(scene))?;
        Ok(FlushBuilder::new(scene, last.next()))
    }

    /// Send a flush; its index must follow the last one sent for the scene
    pub fn send(&mut self, flush: Flush) -> Result<FlushIndex, TransportError> {
        let scene = flush.scene;
        let index = flush.index;
        let last = *self
            .published
            .get(&scene)
            .ok_or(TransportError::SceneNotPublished(scene))?;

        if index <= last {
            return Err(TransportError::OutOfOrderFlush { scene, last, got: index });
        }
        if flush.actions.len() > self.config.max_actions_per_flush {
            return Err(TransportError::TooManyActions {
                count: flush.actions.len(),
                max: self.config.max_actions_per_flush,
            });
        }

        self.send_message(TransportMessage::SceneUpdate(flush))?;
        self.published.insert(scene, index);
        self.stats.write().flushes_sent += 1;
        Ok(index)
    }

    fn send_message(&self, message: TransportMessage) -> Result<(), TransportError> {
        match self.sender.try_send(message) {
            Ok(()) => {
                self.stats.write().messages_sent += 1;
                Ok(())
            }
            Err(TrySendError::Full(_)) => {
                self.stats.write().sends_refused += 1;
                Err(TransportError::ChannelFull)
            }
            Err(TrySendError::Disconnected(_)) => Err(TransportError::Disconnected),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_and_flush() {
        let transport = SceneTransport::default();
        let mut producer = transport.producer();
        let scene = SceneId::new(1);

        producer.publish(scene).unwrap();
        let flush = producer.begin_flush(scene).unwrap().version_tag(3).build();
        assert_eq!(flush.index, FlushIndex::new(1));
        producer.send(flush).unwrap();

        let messages = transport.receive_pending();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0], TransportMessage::ScenePublished(scene));
        assert!(matches!(&messages[1], TransportMessage::SceneUpdate(f) if f.version_tag == Some(3)));
        assert!(transport.receive_pending().is_empty());
    }

    #[test]
    fn test_indices_increase_per_scene() {
        let transport = SceneTransport::default();
        let mut producer = transport.producer();
        let a = SceneId::new(1);
        let b = SceneId::new(2);
        producer.publish(a).unwrap();
        producer.publish(b).unwrap();

        let a1 = producer.begin_flush(a).unwrap().build();
        producer.send(a1).unwrap();
        let a2 = producer.begin_flush(a).unwrap().build();
        let b1 = producer.begin_flush(b).unwrap().build();

        assert_eq!(a2.index, FlushIndex::new(2));
        assert_eq!(b1.index, FlushIndex::new(1));
    }

    #[test]
    fn test_out_of_order_send_rejected() {
        let transport = SceneTransport::default();
        let mut producer = transport.producer();
        let scene = SceneId::new(1);
        producer.publish(scene).unwrap();

        let first = producer.begin_flush(scene).unwrap().build();
        let stale = first.clone();
        producer.send(first).unwrap();

        assert_eq!(
            producer.send(stale),
            Err(TransportError::OutOfOrderFlush {
                scene,
                last: FlushIndex::new(1),
                got: FlushIndex::new(1),
            })
        );
        assert_eq!(transport.stats().flushes_sent, 1);
    }

    #[test]
    fn test_unpublished_scene_rejected() {
        let transport = SceneTransport::default();
        let mut producer = transport.producer();
        let scene = SceneId::new(5);

        assert!(producer.begin_flush(scene).is_err());
        assert_eq!(producer.unpublish(scene), Err(TransportError::SceneNotPublished(scene)));

        producer.publish(scene).unwrap();
        assert_eq!(producer.publish(scene), Err(TransportError::SceneAlreadyPublished(scene)));
        producer.unpublish(scene).unwrap();
        assert!(!producer.is_published(scene));
    }

    #[test]
    fn test_channel_full() {
        let transport = SceneTransport::new(TransportConfig {
            capacity: 1,
            ..Default::default()
        });
        let mut producer = transport.producer();

        producer.publish(SceneId::new(1)).unwrap();
        assert_eq!(producer.publish(SceneId::new(2)), Err(TransportError::ChannelFull));
        assert!(!producer.is_published(SceneId::new(2)));
        assert_eq!(transport.stats().sends_refused, 1);
        assert_eq!(transport.backlog(), 1);
    }
}
