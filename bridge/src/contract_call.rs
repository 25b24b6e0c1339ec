// Copyright (c) EVM Bridge Contributors
// SPDX-License-Identifier: Apache-2.0

//! Outgoing contract calls. Calls are namespaced by an opaque
//! invalidation scope; within a scope, executing a call retires it and
//! every older call, so a caller module can supersede its own pending
//! work by issuing a higher nonce.

use crate::external::{AssetKeeper, BridgeHooks, SlashingHooks, StakingKeeper};
use crate::keeper::{Context, Keeper};
use ethers::types::Address as EthAddress;
use evm_bridge_types::keys;
use evm_bridge_types::otx::{ContractCallTx, Erc20Token, OutgoingTx};
use tracing::info;

impl<A, S, L, H> Keeper<A, S, L, H>
where
    A: AssetKeeper,
    S: StakingKeeper,
    L: SlashingHooks,
    H: BridgeHooks,
{
    /// Registers an outgoing contract call for validator signing.
    #[allow(clippy::too_many_arguments)]
    pub fn create_contract_call_tx(
        &mut self,
        ctx: &mut Context<'_>,
        invalidation_nonce: u64,
        invalidation_scope: Vec<u8>,
        address: EthAddress,
        payload: Vec<u8>,
        tokens: Vec<Erc20Token>,
        fees: Vec<Erc20Token>,
    ) -> ContractCallTx {
        let params = self.params(ctx);
        let call = ContractCallTx {
            invalidation_nonce,
            invalidation_scope,
            address,
            payload,
            timeout: self.projected_counterparty_height(ctx) + params.batch_timeout_blocks(),
            tokens,
            fees,
            height: ctx.block_height,
        };
        self.set_outgoing_tx(ctx, &OutgoingTx::from(call.clone()));
        info!(
            scope = ?call.invalidation_scope,
            nonce = invalidation_nonce,
            address = ?address,
            "created outgoing contract call"
        );
        call
    }

    /// Handles an attested `ContractCallExecutedEvent`: the executed
    /// call is completed, and every lower-nonce call in the same scope
    /// is deleted.
    pub(crate) fn contract_call_executed(
        &mut self,
        ctx: &mut Context<'_>,
        invalidation_scope: &[u8],
        invalidation_nonce: u64,
    ) {
        let calls: Vec<(Vec<u8>, ContractCallTx)> = self
            .iterate_outgoing_txs(ctx, keys::CONTRACT_CALL_TX_PREFIX)
            .into_iter()
            .filter_map(|(store_index, otx)| match otx {
                OutgoingTx::ContractCall(call)
                    if call.invalidation_scope == invalidation_scope
                        && call.invalidation_nonce <= invalidation_nonce =>
                {
                    Some((store_index, call))
                }
                _ => None,
            })
            .collect();

        for (store_index, call) in calls {
            if call.invalidation_nonce == invalidation_nonce {
                info!(
                    scope = ?invalidation_scope,
                    nonce = invalidation_nonce,
                    "outgoing contract call executed"
                );
                self.complete_outgoing_tx(ctx, OutgoingTx::ContractCall(call));
            } else {
                info!(
                    scope = ?invalidation_scope,
                    nonce = call.invalidation_nonce,
                    superseded_by = invalidation_nonce,
                    "invalidated outgoing contract call"
                );
                self.delete_outgoing_tx(ctx, &store_index);
                self.delete_confirmations(ctx, &store_index);
            }
        }
    }

    /// Deletes live contract calls whose validity window has passed.
    /// Unlike batches there is nothing to restore; the caller module
    /// re-issues if it still wants the call.
    pub(crate) fn cancel_timed_out_contract_call_txs(&mut self, ctx: &mut Context<'_>) {
        let projected = self.projected_counterparty_height(ctx);
        let timed_out: Vec<Vec<u8>> = self
            .iterate_outgoing_txs(ctx, keys::CONTRACT_CALL_TX_PREFIX)
            .into_iter()
            .filter_map(|(store_index, otx)| match otx {
                OutgoingTx::ContractCall(call) if call.timeout < projected => Some(store_index),
                _ => None,
            })
            .collect();
        for store_index in timed_out {
            self.delete_outgoing_tx(ctx, &store_index);
            self.delete_confirmations(ctx, &store_index);
        }
    }
}
