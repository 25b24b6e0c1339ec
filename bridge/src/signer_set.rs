// Copyright (c) EVM Bridge Contributors
// SPDX-License-Identifier: Apache-2.0

//! Signer-set tracking. The counterparty contract holds a weighted
//! snapshot of the validator set; when bonded power drifts far enough
//! from the last emitted snapshot, a new signer-set tx is created for
//! the validators to sign. Powers are normalized to a fixed 2^32 total
//! so counterparty gas costs do not depend on raw stake figures.

use crate::external::{AssetKeeper, BridgeHooks, SlashingHooks, StakingKeeper};
use crate::keeper::{encode, must_decode, Context, Keeper};
use evm_bridge_types::keys;
use evm_bridge_types::otx::{CounterpartySigner, OutgoingTx, SignerSetTx};
use evm_bridge_types::NORMALIZED_POWER_TOTAL;
use tracing::info;

impl<A, S, L, H> Keeper<A, S, L, H>
where
    A: AssetKeeper,
    S: StakingKeeper,
    L: SlashingHooks,
    H: BridgeHooks,
{
    /// The current validator set as a normalized signer list: powers
    /// scaled to sum to (at most) 2^32, sorted by descending power with
    /// ties broken by address so the encoding is canonical.
    pub fn current_signer_set(&self) -> Vec<CounterpartySigner> {
        let validator_set = self.staking.current_validator_set();
        let total_power: u128 = validator_set
            .iter()
            .map(|entry| u128::from(entry.power))
            .sum();
        if total_power == 0 {
            return vec![];
        }

        let mut signers: Vec<CounterpartySigner> = validator_set
            .iter()
            .map(|entry| CounterpartySigner {
                power: ((u128::from(entry.power) * u128::from(NORMALIZED_POWER_TOTAL))
                    / total_power) as u64,
                evm_address: entry.evm_address,
            })
            .collect();
        signers.sort_by(|a, b| {
            b.power
                .cmp(&a.power)
                .then_with(|| a.evm_address.cmp(&b.evm_address))
        });
        signers
    }

    /// Creates the next signer-set tx from the current validator set
    /// and remembers it as the latest emitted snapshot.
    pub fn create_signer_set_tx(&mut self, ctx: &mut Context<'_>) -> Option<SignerSetTx> {
        let signers = self.current_signer_set();
        if signers.is_empty() {
            return None;
        }

        let nonce = self.last_created_signer_set_nonce(ctx) + 1;
        self.set_last_created_signer_set_nonce(ctx, nonce);
        let signer_set = SignerSetTx {
            nonce,
            height: ctx.block_height,
            signers,
        };
        ctx.store.set(
            &[keys::LATEST_SIGNER_SET_KEY],
            encode(&signer_set, "signer set"),
        );
        self.set_outgoing_tx(ctx, &OutgoingTx::from(signer_set.clone()));
        info!(
            nonce,
            signers = signer_set.signers.len(),
            "created signer set tx"
        );
        Some(signer_set)
    }

    /// The most recently created signer-set snapshot, if any.
    pub fn latest_signer_set(&self, ctx: &Context<'_>) -> Option<SignerSetTx> {
        ctx.store
            .get(&[keys::LATEST_SIGNER_SET_KEY])
            .map(|bytes| must_decode(&bytes, "signer set"))
    }

    /// End-of-block check: emit a new signer set when none exists yet
    /// or when normalized power drifted beyond the configured
    /// threshold. At most one signer set is created per block.
    pub(crate) fn check_signer_set_change(&mut self, ctx: &mut Context<'_>) {
        let current = self.current_signer_set();
        if current.is_empty() {
            return;
        }

        let Some(latest) = self.latest_signer_set(ctx) else {
            let _ = self.create_signer_set_tx(ctx);
            return;
        };

        let params = self.params(ctx);
        let threshold =
            (u128::from(NORMALIZED_POWER_TOTAL) * u128::from(params.power_change_threshold_bps))
                / 10_000;
        if u128::from(power_diff(&latest.signers, &current)) > threshold {
            let _ = self.create_signer_set_tx(ctx);
        }
    }

    /// Handles an attested `SignerSetExecutedEvent`: the executed
    /// signer set is completed, older ones are deleted, and the
    /// acknowledged nonce is recorded.
    pub(crate) fn signer_set_executed(&mut self, ctx: &mut Context<'_>, nonce: u64) {
        let signer_sets: Vec<(Vec<u8>, SignerSetTx)> = self
            .iterate_outgoing_txs(ctx, keys::SIGNER_SET_TX_PREFIX)
            .into_iter()
            .filter_map(|(store_index, otx)| match otx {
                OutgoingTx::SignerSet(signer_set) if signer_set.nonce <= nonce => {
                    Some((store_index, signer_set))
                }
                _ => None,
            })
            .collect();

        for (store_index, signer_set) in signer_sets {
            if signer_set.nonce == nonce {
                self.complete_outgoing_tx(ctx, OutgoingTx::SignerSet(signer_set));
            } else {
                self.delete_outgoing_tx(ctx, &store_index);
                self.delete_confirmations(ctx, &store_index);
            }
        }

        if nonce > self.last_observed_signer_set_nonce(ctx) {
            self.set_last_observed_signer_set_nonce(ctx, nonce);
        }
        info!(nonce, "signer set acknowledged by counterparty");
    }
}

/// Cumulative absolute difference between two normalized signer sets,
/// keyed by EVM address. Joining and leaving signers count with their
/// whole power.
pub fn power_diff(old: &[CounterpartySigner], new: &[CounterpartySigner]) -> u64 {
    use std::collections::BTreeMap;

    let mut powers: BTreeMap<_, (u64, u64)> = BTreeMap::new();
    for signer in old {
        powers.entry(signer.evm_address).or_default().0 = signer.power;
    }
    for signer in new {
        powers.entry(signer.evm_address).or_default().1 = signer.power;
    }
    powers
        .values()
        .map(|(before, after)| before.abs_diff(*after))
        .sum()
}
