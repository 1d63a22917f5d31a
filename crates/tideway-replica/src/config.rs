//! Replica configuration.

use crate::message::Notify;

/// Force-ship threshold: once this many deltas pile up beyond the last
/// shipped sequence number, the next ship trigger fires even if the
/// system has not quiesced at its snapshot.
pub const SHIP_AFTER_X_DELTAS: u64 = 1000;

/// Configuration for a replica's shipping and collection behaviour.
#[derive(Clone, Debug)]
pub struct ReplicaConfig {
    /// Replica name, used in log output. Required.
    pub name: Option<String>,
    /// How often to consider shipping (in milliseconds).
    pub ship_interval_ms: u64,
    /// How long to let a burst of mutations settle before shipping
    /// (in milliseconds).
    pub ship_debounce_ms: u64,
    /// How often to garbage-collect acknowledged deltas (in milliseconds).
    pub gc_interval_ms: u64,
    /// Optional target signalled after each successful outbound ship.
    pub notify: Option<Notify>,
}

impl Default for ReplicaConfig {
    fn default() -> Self {
        Self {
            name: None,
            ship_interval_ms: 50,
            ship_debounce_ms: 50,
            gc_interval_ms: 10_000,
            notify: None,
        }
    }
}

/// Builder for replica configuration.
pub struct ReplicaConfigBuilder {
    config: ReplicaConfig,
}

impl ReplicaConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: ReplicaConfig::default(),
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = Some(name.into());
        self
    }

    pub fn ship_interval(mut self, ms: u64) -> Self {
        self.config.ship_interval_ms = ms;
        self
    }

    pub fn ship_debounce(mut self, ms: u64) -> Self {
        self.config.ship_debounce_ms = ms;
        self
    }

    pub fn gc_interval(mut self, ms: u64) -> Self {
        self.config.gc_interval_ms = ms;
        self
    }

    pub fn notify(mut self, notify: Notify) -> Self {
        self.config.notify = Some(notify);
        self
    }

    pub fn build(self) -> ReplicaConfig {
        self.config
    }
}

impl Default for ReplicaConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
