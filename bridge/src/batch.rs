// Copyright (c) EVM Bridge Contributors
// SPDX-License-Identifier: Apache-2.0

//! Batch construction and retirement. A batch bundles the most
//! profitable pooled transfers of one token under a strictly ascending
//! per-token nonce. Concurrent batches for one token are allowed: the
//! counterparty contract enforces nonce order, so executing a newer
//! batch makes every older one unexecutable, and those are cancelled
//! back into the pool.

use crate::external::{AssetKeeper, BridgeHooks, SlashingHooks, StakingKeeper};
use crate::keeper::{Context, Keeper};
use crate::MODULE_NAME;
use ethers::types::{Address as EthAddress, U256};
use evm_bridge_types::base_types::Coin;
use evm_bridge_types::error::{BridgeError, BridgeResult};
use evm_bridge_types::keys;
use evm_bridge_types::otx::{BatchTx, OutgoingTx, OutgoingTxKind};
use tracing::{debug, info, warn};

impl<A, S, L, H> Keeper<A, S, L, H>
where
    A: AssetKeeper,
    S: StakingKeeper,
    L: SlashingHooks,
    H: BridgeHooks,
{
    /// Builds a batch from the up-to-`max_elements` highest-fee pooled
    /// transfers of `token`. Returns `None` when the pool is empty for
    /// that token; empty batches are never created and no nonce is
    /// consumed.
    pub fn create_batch_tx(
        &mut self,
        ctx: &mut Context<'_>,
        token: EthAddress,
        max_elements: usize,
    ) -> Option<BatchTx> {
        let selected: Vec<_> = self
            .iterate_unbatched_send_to_evms_by_token(ctx, token)
            .into_iter()
            .take(max_elements)
            .collect();
        if selected.is_empty() {
            debug!(token = ?token, "no pooled transfers, skipping batch");
            return None;
        }

        for transfer in &selected {
            self.remove_unbatched_send_to_evm(ctx, transfer);
        }

        let nonce = self.last_batch_nonce(ctx, token) + 1;
        self.set_last_batch_nonce(ctx, token, nonce);

        let params = self.params(ctx);
        let batch = BatchTx {
            batch_nonce: nonce,
            token_contract: token,
            height: ctx.block_height,
            timeout: self.projected_counterparty_height(ctx) + params.batch_timeout_blocks(),
            transactions: selected,
        };
        self.set_outgoing_tx(ctx, &OutgoingTx::from(batch.clone()));

        info!(
            token = ?token,
            nonce,
            transfers = batch.transactions.len(),
            timeout = batch.timeout,
            "created outgoing batch"
        );
        Some(batch)
    }

    /// Handles an attested `BatchExecutedEvent`: the executed batch is
    /// completed and its transfers permanently retired, while older
    /// live batches of the same token (now unexecutable under the
    /// counterparty's nonce ordering) are cancelled back into the pool.
    pub(crate) fn batch_tx_executed(
        &mut self,
        ctx: &mut Context<'_>,
        token: EthAddress,
        nonce: u64,
    ) -> BridgeResult<()> {
        let store_index = keys::make_batch_tx_index(token, nonce);
        let Some(OutgoingTx::Batch(executed)) = self.get_outgoing_tx(ctx, &store_index) else {
            // Nothing to retire: the batch was already executed or
            // timed out. The event is still consumed.
            warn!(token = ?token, nonce, "executed batch not found in live registry");
            return Ok(());
        };

        // Vouchers leave the chain for good; burn the escrow. Chain-
        // originated assets stay locked in the module account while
        // they circulate on the counterparty.
        let (chain_originated, denom) = self.erc20_to_denom(ctx, token);
        if !chain_originated {
            let mut total = U256::zero();
            for transfer in &executed.transactions {
                total = total + transfer.erc20_token.amount + transfer.erc20_fee.amount;
            }
            self.assets.burn(MODULE_NAME, &Coin::new(denom, total))?;
        }

        let older: Vec<BatchTx> = self
            .iterate_outgoing_txs(ctx, keys::BATCH_TX_PREFIX)
            .into_iter()
            .filter_map(|(_, otx)| match otx {
                OutgoingTx::Batch(batch)
                    if batch.token_contract == token && batch.batch_nonce < nonce =>
                {
                    Some(batch)
                }
                _ => None,
            })
            .collect();
        for batch in older {
            self.restore_batch(ctx, batch);
        }

        info!(token = ?token, nonce, "outgoing batch executed");
        self.complete_outgoing_tx(ctx, OutgoingTx::Batch(executed));
        Ok(())
    }

    /// Cancels a live batch, returning its transfers to the pool with
    /// their original ids. A second cancellation is `NotFound`.
    pub fn cancel_batch_tx(
        &mut self,
        ctx: &mut Context<'_>,
        token: EthAddress,
        nonce: u64,
    ) -> BridgeResult<()> {
        let store_index = keys::make_batch_tx_index(token, nonce);
        let Some(OutgoingTx::Batch(batch)) = self.get_outgoing_tx(ctx, &store_index) else {
            return Err(BridgeError::NotFound(format!(
                "no live batch for token {token:?} with nonce {nonce}"
            )));
        };
        self.restore_batch(ctx, batch);
        Ok(())
    }

    fn restore_batch(&mut self, ctx: &mut Context<'_>, batch: BatchTx) {
        let store_index = batch.store_index();
        for transfer in &batch.transactions {
            self.add_unbatched_send_to_evm(ctx, transfer);
        }
        self.delete_outgoing_tx(ctx, &store_index);
        self.delete_confirmations(ctx, &store_index);
        info!(
            token = ?batch.token_contract,
            nonce = batch.batch_nonce,
            transfers = batch.transactions.len(),
            "cancelled batch, transfers restored to pool"
        );
    }

    /// Cancels every live batch whose validity window on the
    /// counterparty has passed.
    pub(crate) fn cancel_timed_out_batch_txs(&mut self, ctx: &mut Context<'_>) {
        let projected = self.projected_counterparty_height(ctx);
        let timed_out: Vec<BatchTx> = self
            .iterate_outgoing_txs(ctx, keys::BATCH_TX_PREFIX)
            .into_iter()
            .filter_map(|(_, otx)| match otx {
                OutgoingTx::Batch(batch) if batch.timeout < projected => Some(batch),
                _ => None,
            })
            .collect();
        for batch in timed_out {
            self.restore_batch(ctx, batch);
        }
    }
}
