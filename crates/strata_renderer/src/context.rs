//! Renderer context and tick clock
//!
//! The process's top-level assembly builds one [`RendererContext`] and hands
//! it to the [`SceneUpdater`](crate::SceneUpdater). Nothing in the renderer
//! reads configuration or time from anywhere else.

use crate::config::{ConfigResult, RendererConfig};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Clock driven by hand, shared between the renderer and whoever drives it
#[derive(Debug, Clone, Default)]
pub struct ManualClock(Arc<AtomicU64>);

impl ManualClock {
    /// Create a new manual clock starting at `start_ms`
    pub fn new(start_ms: u64) -> Self {
        Self(Arc::new(AtomicU64::new(start_ms)))
    }

    /// Move time forward
    pub fn advance(&self, ms: u64) {
        self.0.fetch_add(ms, Ordering::SeqCst);
    }

    /// Jump to an absolute time
    pub fn set(&self, now_ms: u64) {
        self.0.store(now_ms, Ordering::SeqCst);
    }

    /// Current time in milliseconds
    pub fn now_ms(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }
}

/// Source of tick timestamps
#[derive(Debug, Clone)]
pub enum FrameClock {
    /// Monotonic milliseconds since the clock was created
    System(Instant),
    /// Milliseconds set explicitly (tests, replay)
    Manual(ManualClock),
}

impl FrameClock {
    /// Create a system clock starting now
    pub fn system() -> Self {
        Self::System(Instant::now())
    }

    /// Current time in milliseconds
    pub fn now_ms(&self) -> u64 {
        match self {
            Self::System(start) => start.elapsed().as_millis() as u64,
            Self::Manual(clock) => clock.now_ms(),
        }
    }
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::system()
    }
}

impl From<ManualClock> for FrameClock {
    fn from(clock: ManualClock) -> Self {
        Self::Manual(clock)
    }
}

/// Everything the renderer core needs from its environment
#[derive(Debug, Clone, Default)]
pub struct RendererContext {
    pub config: RendererConfig,
    pub clock: FrameClock,
}

impl RendererContext {
    /// Create a new context, validating the configuration
    pub fn new(config: RendererConfig, clock: impl Into<FrameClock>) -> ConfigResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            clock: clock.into(),
        })
    }

    /// Current time in milliseconds
    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_is_shared() {
        let clock = ManualClock::new(10);
        let context = RendererContext::new(RendererConfig::default(), clock.clone()).unwrap();

        assert_eq!(context.now_ms(), 10);
        clock.advance(5);
        assert_eq!(context.now_ms(), 15);
        clock.set(100);
        assert_eq!(context.now_ms(), 100);
    }

    #[test]
    fn test_context_rejects_invalid_config() {
        let config = RendererConfig {
            max_pending_flushes_to_kill_scene: 1,
            ..Default::default()
        };
        assert!(RendererContext::new(config, FrameClock::system()).is_err());
    }
}
