//! Node configuration.

use crate::{
    error::{ConfigError, TxError},
    protocol::MsgPriority,
    NODE_ID_MAX, STALE_SWEEP_INTERVAL_US, TRANSFER_TIMEOUT_US,
};

/// Default cap on a reassembled transfer's payload, in bytes.
pub const MAX_TRANSFER_PAYLOAD: usize = 4_096;

#[derive(Clone, Debug, PartialEq)]
pub struct NodeConfig {
    /// Between 1 and 127. 0 makes the node anonymous: it can only publish single-frame
    /// messages, and can't take part in services.
    pub node_id: u8,
    /// Used when a transfer doesn't specify one.
    pub default_priority: MsgPriority,
    /// A partial transfer with no activity for this long is abandoned.
    pub transfer_timeout_us: u64,
    /// Stale transfers are swept at most this often.
    pub sweep_interval_us: u64,
    /// Transfers whose payload grows past this are dropped as `PayloadTooLong`.
    pub max_transfer_payload: usize,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            node_id: 0,
            default_priority: MsgPriority::default(),
            transfer_timeout_us: TRANSFER_TIMEOUT_US,
            sweep_interval_us: STALE_SWEEP_INTERVAL_US,
            max_transfer_payload: MAX_TRANSFER_PAYLOAD,
        }
    }
}

impl NodeConfig {
    pub fn new(node_id: u8) -> Self {
        Self {
            node_id,
            ..Default::default()
        }
    }

    pub fn with_priority(mut self, priority: MsgPriority) -> Self {
        self.default_priority = priority;
        self
    }

    pub fn with_transfer_timeout(mut self, timeout_us: u64) -> Self {
        self.transfer_timeout_us = timeout_us;
        self
    }

    pub fn with_sweep_interval(mut self, interval_us: u64) -> Self {
        self.sweep_interval_us = interval_us;
        self
    }

    pub fn with_max_transfer_payload(mut self, len: usize) -> Self {
        self.max_transfer_payload = len;
        self
    }

    pub fn is_anonymous(&self) -> bool {
        self.node_id == 0
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.node_id > NODE_ID_MAX {
            return Err(ConfigError::Tx(TxError::InvalidNodeId(self.node_id)));
        }
        if self.default_priority.val() > 31 {
            return Err(ConfigError::Tx(TxError::InvalidPriority(
                self.default_priority.val(),
            )));
        }
        if self.transfer_timeout_us == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        Ok(())
    }
}
