// Copyright (c) EVM Bridge Contributors
// SPDX-License-Identifier: Apache-2.0

//! Per-block hooks, invoked by the host's block pipeline. There are no
//! background tasks anywhere in the module: everything periodic runs
//! here, deterministically, on every replica.

use crate::external::{AssetKeeper, BridgeHooks, SlashingHooks, StakingKeeper};
use crate::keeper::{Context, Keeper};

impl<A, S, L, H> Keeper<A, S, L, H>
where
    A: AssetKeeper,
    S: StakingKeeper,
    L: SlashingHooks,
    H: BridgeHooks,
{
    /// Start-of-block work: slashing scans, batch/call timeouts, and
    /// pruning of fully confirmed completed txs.
    pub fn begin_block(&mut self, ctx: &mut Context<'_>) {
        self.process_slashing(ctx);
        self.cancel_timed_out_batch_txs(ctx);
        self.cancel_timed_out_contract_call_txs(ctx);
        self.prune_completed_outgoing_txs(ctx);
    }

    /// End-of-block work: emit a new signer-set tx when bonded power
    /// drifted past the threshold.
    pub fn end_block(&mut self, ctx: &mut Context<'_>) {
        self.check_signer_set_change(ctx);
    }
}
