// Copyright (c) EVM Bridge Contributors
// SPDX-License-Identifier: Apache-2.0

use evm_bridge_types::error::{BridgeError, BridgeResult};
use serde::{Deserialize, Serialize};

/// Module parameters. Persisted under the params key; governance swaps
/// the whole set atomically.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeParams {
    /// Blocks a validator has to confirm an outgoing tx before being
    /// reported for NoConfirm slashing.
    pub signed_blocks_window: u64,
    /// How long a batch stays valid on the counterparty, in
    /// milliseconds of counterparty time.
    pub target_batch_timeout_ms: u64,
    /// Average chain block time, used to project the current
    /// counterparty height between observed events.
    pub average_block_time_ms: u64,
    /// Average counterparty block time.
    pub average_counterparty_block_time_ms: u64,
    /// Cumulative normalized-power drift (basis points of the 2^32
    /// total) that triggers a new signer-set tx.
    pub power_change_threshold_bps: u64,
    /// Batch size used by permissionless batch requests.
    pub batch_size_limit: usize,
}

impl Default for BridgeParams {
    fn default() -> Self {
        Self {
            signed_blocks_window: 10_000,
            target_batch_timeout_ms: 43_200_000,
            average_block_time_ms: 5_000,
            average_counterparty_block_time_ms: 15_000,
            power_change_threshold_bps: 500,
            batch_size_limit: 100,
        }
    }
}

impl BridgeParams {
    pub fn validate(&self) -> BridgeResult<()> {
        if self.signed_blocks_window == 0 {
            return Err(BridgeError::ConfigInvalid(
                "signed_blocks_window must be positive".to_string(),
            ));
        }
        if self.average_block_time_ms == 0 || self.average_counterparty_block_time_ms == 0 {
            return Err(BridgeError::ConfigInvalid(
                "block time estimates must be positive".to_string(),
            ));
        }
        if self.target_batch_timeout_ms < self.average_counterparty_block_time_ms {
            return Err(BridgeError::ConfigInvalid(
                "target_batch_timeout_ms shorter than one counterparty block".to_string(),
            ));
        }
        if self.power_change_threshold_bps > 10_000 {
            return Err(BridgeError::ConfigInvalid(
                "power_change_threshold_bps above 100%".to_string(),
            ));
        }
        if self.batch_size_limit == 0 {
            return Err(BridgeError::ConfigInvalid(
                "batch_size_limit must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Batch validity window expressed in counterparty blocks.
    pub fn batch_timeout_blocks(&self) -> u64 {
        self.target_batch_timeout_ms / self.average_counterparty_block_time_ms
    }
}
