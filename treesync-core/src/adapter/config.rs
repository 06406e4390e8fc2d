//! Adapter configuration.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::registry::IdStyle;

/// Configuration for the sync adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// How client node ids are generated
    pub id_style: IdStyle,
    /// Send all-nodes-deleted when the last top-level node goes away
    pub collapse_full_deletes: bool,
    /// Overrides the model's auto-check flag for nodes-checked events
    pub auto_check_child_nodes: Option<bool>,
    /// Capacity of the broadcast channel created by [`Self::broadcast_emitter`]
    pub event_channel_capacity: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            id_style: IdStyle::Uuid,
            collapse_full_deletes: true,
            auto_check_child_nodes: None,
            event_channel_capacity: 256,
        }
    }
}

impl SyncConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from JSON; missing fields keep their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.event_channel_capacity == 0 {
            return Err(Error::Config(
                "event_channel_capacity must be greater than zero".to_string(),
            ));
        }
        if let IdStyle::Sequential { prefix } = &self.id_style {
            if prefix.is_empty() {
                return Err(Error::Config(
                    "sequential ids need a non-empty prefix".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Set the id style.
    pub fn id_style(mut self, style: IdStyle) -> Self {
        self.id_style = style;
        self
    }

    /// Use `prefix1`, `prefix2`, ... as ids.
    pub fn sequential_ids(self, prefix: impl Into<String>) -> Self {
        self.id_style(IdStyle::Sequential {
            prefix: prefix.into(),
        })
    }

    /// Enable or disable the all-nodes-deleted optimization.
    pub fn collapse_full_deletes(mut self, enabled: bool) -> Self {
        self.collapse_full_deletes = enabled;
        self
    }

    /// Force auto-check of child nodes on or off.
    pub fn auto_check_child_nodes(mut self, enabled: bool) -> Self {
        self.auto_check_child_nodes = Some(enabled);
        self
    }

    /// Set event channel capacity.
    pub fn event_channel_capacity(mut self, capacity: usize) -> Self {
        self.event_channel_capacity = capacity;
        self
    }

    /// Broadcast emitter sized by this configuration.
    pub fn broadcast_emitter(&self) -> crate::emitter::BroadcastEmitter {
        crate::emitter::BroadcastEmitter::new(self.event_channel_capacity)
    }
}
