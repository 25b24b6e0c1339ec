// Copyright (c) EVM Bridge Contributors
// SPDX-License-Identifier: Apache-2.0

//! Confirmation-window enforcement. Validators bonded when an outgoing
//! tx was created must confirm it within `signed_blocks_window` blocks
//! or be reported to the host slashing machinery. Watermarks (last
//! slashed height for batches and contract calls, last slashed nonce
//! for signer sets) guarantee each tx is scanned exactly once.
//! Completed txs that served their retention purpose are pruned here.

use crate::external::{AssetKeeper, BridgeHooks, SlashingHooks, StakingKeeper};
use crate::keeper::{Context, Keeper};
use evm_bridge_types::keys;
use evm_bridge_types::otx::{OutgoingTx, SignerSetTx};
use tracing::{debug, warn};

fn otx_height(otx: &OutgoingTx) -> u64 {
    match otx {
        OutgoingTx::Batch(batch) => batch.height,
        OutgoingTx::ContractCall(call) => call.height,
        OutgoingTx::SignerSet(signer_set) => signer_set.height,
    }
}

impl<A, S, L, H> Keeper<A, S, L, H>
where
    A: AssetKeeper,
    S: StakingKeeper,
    L: SlashingHooks,
    H: BridgeHooks,
{
    /// Per-block slashing scan.
    pub(crate) fn process_slashing(&mut self, ctx: &mut Context<'_>) {
        let params = self.params(ctx);
        let Some(max_height) = ctx.block_height.checked_sub(params.signed_blocks_window) else {
            return;
        };
        if max_height == 0 {
            return;
        }

        self.slash_unsigned_outgoing_txs(ctx, max_height);
        self.slash_unsigned_signer_sets(ctx, max_height);
    }

    /// Reports validators that failed to confirm batches and contract
    /// calls created in `(last_slashed_height, max_height]`. Both live
    /// and completed txs are in scope: quick execution does not excuse
    /// a missing signature.
    fn slash_unsigned_outgoing_txs(&mut self, ctx: &mut Context<'_>, max_height: u64) {
        let last_slashed = self.last_slashed_outgoing_tx_height(ctx);
        if max_height <= last_slashed {
            return;
        }

        for variant_prefix in [keys::BATCH_TX_PREFIX, keys::CONTRACT_CALL_TX_PREFIX] {
            let in_window: Vec<(Vec<u8>, OutgoingTx)> = self
                .iterate_outgoing_txs(ctx, variant_prefix)
                .into_iter()
                .chain(self.iterate_completed_outgoing_txs(ctx, variant_prefix))
                .filter(|(_, otx)| {
                    let height = otx_height(otx);
                    height > last_slashed && height <= max_height
                })
                .collect();

            for (store_index, otx) in in_window {
                self.report_missing_confirmations(ctx, &store_index, otx_height(&otx));
            }
        }

        self.set_last_slashed_outgoing_tx_height(ctx, max_height);
    }

    /// Signer sets are scanned by nonce: every set above the last
    /// slashed nonce whose creation height has left the window.
    fn slash_unsigned_signer_sets(&mut self, ctx: &mut Context<'_>, max_height: u64) {
        let last_slashed_nonce = self.last_slashed_signer_set_nonce(ctx);

        let in_window: Vec<(Vec<u8>, SignerSetTx)> = self
            .iterate_outgoing_txs(ctx, keys::SIGNER_SET_TX_PREFIX)
            .into_iter()
            .chain(self.iterate_completed_outgoing_txs(ctx, keys::SIGNER_SET_TX_PREFIX))
            .filter_map(|(store_index, otx)| match otx {
                OutgoingTx::SignerSet(signer_set)
                    if signer_set.nonce > last_slashed_nonce
                        && signer_set.height <= max_height =>
                {
                    Some((store_index, signer_set))
                }
                _ => None,
            })
            .collect();

        let mut highest_nonce = last_slashed_nonce;
        for (store_index, signer_set) in in_window {
            self.report_missing_confirmations(ctx, &store_index, signer_set.height);
            highest_nonce = highest_nonce.max(signer_set.nonce);
        }
        if highest_nonce > last_slashed_nonce {
            self.set_last_slashed_signer_set_nonce(ctx, highest_nonce);
        }
    }

    fn report_missing_confirmations(
        &mut self,
        ctx: &Context<'_>,
        store_index: &[u8],
        height: u64,
    ) {
        for validator in self.staking.bonded_validators_at(height) {
            if !self.has_confirmation(ctx, store_index, &validator) {
                warn!(
                    validator = %validator,
                    otx_height = height,
                    "validator failed to confirm outgoing tx within the signing window"
                );
                self.slashing.report_no_confirm(&validator, store_index);
            }
        }
    }

    /// Deletes completed txs that are past the signing window and fully
    /// confirmed by every validator that was bonded at their creation
    /// height. Until then they are retained so late signers can still
    /// submit confirmations instead of being slashed.
    pub(crate) fn prune_completed_outgoing_txs(&mut self, ctx: &mut Context<'_>) {
        let params = self.params(ctx);

        for variant_prefix in [
            keys::BATCH_TX_PREFIX,
            keys::CONTRACT_CALL_TX_PREFIX,
            keys::SIGNER_SET_TX_PREFIX,
        ] {
            let completed = self.iterate_completed_outgoing_txs(ctx, variant_prefix);
            for (store_index, otx) in completed {
                let height = otx_height(&otx);
                if height + params.signed_blocks_window >= ctx.block_height {
                    continue;
                }
                let fully_confirmed = self
                    .staking
                    .bonded_validators_at(height)
                    .iter()
                    .all(|validator| self.has_confirmation(ctx, &store_index, validator));
                if !fully_confirmed {
                    continue;
                }
                debug!(store_index = ?store_index, "pruning completed outgoing tx");
                self.delete_completed_outgoing_tx(ctx, &store_index);
                self.delete_confirmations(ctx, &store_index);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{test_sender, test_token, TestEnv};
    use evm_bridge_types::confirmation::{BatchTxConfirmation, Confirmation};
    use evm_bridge_types::otx::OutgoingTxKind;

    fn batch_confirmation(nonce: u64) -> Confirmation {
        Confirmation::Batch(BatchTxConfirmation {
            token_contract: test_token(),
            batch_nonce: nonce,
            evm_signer: ethers::types::Address::zero(),
            signature: b"dummysig".to_vec(),
        })
    }

    #[test]
    fn test_no_slashing_inside_window() {
        let mut env = TestEnv::new();
        env.mint_vouchers(test_sender(), 99_999);
        env.add_send_to_evm_txs_to_pool(&[2]);

        let (mut ctx, keeper) = env.split();
        keeper.create_batch_tx(&mut ctx, test_token(), 1).unwrap();
        keeper.process_slashing(&mut ctx);

        assert!(env.keeper.slashing.no_confirm_reports.is_empty());
    }

    #[test]
    fn test_unsigned_batch_past_window_reports_nonsigners() {
        let mut env = TestEnv::new();
        env.mint_vouchers(test_sender(), 99_999);
        env.add_send_to_evm_txs_to_pool(&[2]);
        let window = env.params().signed_blocks_window;
        let val1 = env.validators[0].operator;

        let batch = {
            let (mut ctx, keeper) = env.split();
            let batch = keeper.create_batch_tx(&mut ctx, test_token(), 1).unwrap();
            keeper.set_confirmation(&mut ctx, &val1, &batch_confirmation(batch.batch_nonce));
            batch
        };

        env.height += window + 1;
        {
            let (mut ctx, keeper) = env.split();
            keeper.process_slashing(&mut ctx);
        }

        // the two validators without a confirmation were reported
        let reported: Vec<_> = env
            .keeper
            .slashing
            .no_confirm_reports
            .iter()
            .map(|(validator, _)| *validator)
            .collect();
        assert_eq!(
            reported,
            vec![env.validators[1].operator, env.validators[2].operator]
        );
        assert!(env
            .keeper
            .slashing
            .no_confirm_reports
            .iter()
            .all(|(_, index)| index == &evm_bridge_types::otx::OutgoingTx::from(batch.clone()).store_index()));

        // the watermark prevents double reporting
        env.keeper.slashing.no_confirm_reports.clear();
        env.height += 1;
        {
            let (mut ctx, keeper) = env.split();
            keeper.process_slashing(&mut ctx);
        }
        assert!(env.keeper.slashing.no_confirm_reports.is_empty());
    }

    #[test]
    fn test_completed_txs_are_slashed_too() {
        let mut env = TestEnv::new();
        env.mint_vouchers(test_sender(), 99_999);
        env.add_send_to_evm_txs_to_pool(&[2]);
        let window = env.params().signed_blocks_window;

        {
            let (mut ctx, keeper) = env.split();
            let batch = keeper.create_batch_tx(&mut ctx, test_token(), 1).unwrap();
            keeper
                .batch_tx_executed(&mut ctx, test_token(), batch.batch_nonce)
                .unwrap();
        }

        env.height += window + 1;
        {
            let (mut ctx, keeper) = env.split();
            keeper.process_slashing(&mut ctx);
        }
        assert_eq!(env.keeper.slashing.no_confirm_reports.len(), 3);
    }

    #[test]
    fn test_signer_set_slashing_tracks_nonce_watermark() {
        let mut env = TestEnv::new();
        let window = env.params().signed_blocks_window;

        {
            let (mut ctx, keeper) = env.split();
            keeper.create_signer_set_tx(&mut ctx).unwrap();
        }

        env.height += window + 1;
        {
            let (mut ctx, keeper) = env.split();
            keeper.process_slashing(&mut ctx);
            assert_eq!(keeper.last_slashed_signer_set_nonce(&ctx), 1);
        }
        assert_eq!(env.keeper.slashing.no_confirm_reports.len(), 3);

        env.keeper.slashing.no_confirm_reports.clear();
        env.height += 1;
        {
            let (mut ctx, keeper) = env.split();
            keeper.process_slashing(&mut ctx);
        }
        assert!(env.keeper.slashing.no_confirm_reports.is_empty());
    }

    #[test]
    fn test_prune_requires_window_and_full_coverage() {
        let mut env = TestEnv::new();
        env.mint_vouchers(test_sender(), 99_999);
        env.add_send_to_evm_txs_to_pool(&[2]);
        let window = env.params().signed_blocks_window;
        let validators: Vec<_> = env.validators.iter().map(|v| v.operator).collect();

        let store_index = {
            let (mut ctx, keeper) = env.split();
            let batch = keeper.create_batch_tx(&mut ctx, test_token(), 1).unwrap();
            keeper
                .batch_tx_executed(&mut ctx, test_token(), batch.batch_nonce)
                .unwrap();
            OutgoingTx::from(batch).store_index()
        };

        env.height += window + 2;
        {
            let (mut ctx, keeper) = env.split();
            // two of three confirmations: retained
            keeper.set_confirmation(&mut ctx, &validators[0], &batch_confirmation(1));
            keeper.set_confirmation(&mut ctx, &validators[1], &batch_confirmation(1));
            keeper.prune_completed_outgoing_txs(&mut ctx);
            assert!(keeper.get_completed_outgoing_tx(&ctx, &store_index).is_some());

            // full coverage: pruned
            keeper.set_confirmation(&mut ctx, &validators[2], &batch_confirmation(1));
            keeper.prune_completed_outgoing_txs(&mut ctx);
            assert!(keeper.get_completed_outgoing_tx(&ctx, &store_index).is_none());
            assert!(keeper.confirmations_of(&ctx, &store_index).is_empty());
        }
    }
}
