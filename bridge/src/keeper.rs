// Copyright (c) EVM Bridge Contributors
// SPDX-License-Identifier: Apache-2.0

//! The keeper owns every state transition of the bridge module. It is a
//! thin layer over the key-value store plus the external subsystem
//! traits; all methods are synchronous and deterministic.

use crate::external::{AssetKeeper, BridgeHooks, NoopHooks, SlashingHooks, StakingKeeper};
use crate::params::BridgeParams;
use crate::store::Store;
use crate::VOUCHER_DENOM_PREFIX;
use ethers::types::Address as EthAddress;
use evm_bridge_types::base_types::{ChainAddress, ValidatorAddress};
use evm_bridge_types::confirmation::{Confirmation, ConfirmationKind};
use evm_bridge_types::error::{BridgeError, BridgeResult};
use evm_bridge_types::keys;
use evm_bridge_types::otx::{
    order_batches_by_nonce_ascending, order_contract_calls_by_nonce_ascending, BatchTx,
    ContractCallTx, OutgoingTx, OutgoingTxKind, SignerSetTx,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

/// Per-message/per-block execution context: the store handle and the
/// current chain height, both supplied by the host dispatcher.
pub struct Context<'a> {
    pub store: &'a mut dyn Store,
    pub block_height: u64,
}

impl<'a> Context<'a> {
    pub fn new(store: &'a mut dyn Store, block_height: u64) -> Self {
        Self {
            store,
            block_height,
        }
    }
}

/// Counterparty height as last attested, paired with the chain height
/// the observation landed at so later blocks can extrapolate.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatestCounterpartyHeight {
    pub counterparty_height: u64,
    pub chain_height: u64,
}

pub struct Keeper<A, S, L, H = NoopHooks> {
    pub assets: A,
    pub staking: S,
    pub slashing: L,
    pub hooks: H,
    /// Receivers that are module accounts; inbound transfers to them
    /// are routed module-to-module.
    pub receiver_module_accounts: BTreeMap<ChainAddress, String>,
}

impl<A, S, L> Keeper<A, S, L, NoopHooks>
where
    A: AssetKeeper,
    S: StakingKeeper,
    L: SlashingHooks,
{
    pub fn new(assets: A, staking: S, slashing: L) -> Self {
        Self {
            assets,
            staking,
            slashing,
            hooks: NoopHooks,
            receiver_module_accounts: BTreeMap::new(),
        }
    }
}

pub(crate) fn must_decode<T: DeserializeOwned>(bytes: &[u8], what: &str) -> T {
    // A value that fails to decode means the store is corrupt; halting
    // the host is the only safe reaction.
    bcs::from_bytes(bytes).unwrap_or_else(|e| panic!("corrupt {what} entry in store: {e}"))
}

pub(crate) fn encode<T: Serialize>(value: &T, what: &str) -> Vec<u8> {
    bcs::to_bytes(value).unwrap_or_else(|e| panic!("failed to encode {what}: {e}"))
}

/// The voucher denom minted for a counterparty-originated token.
pub fn voucher_denom(token: EthAddress) -> String {
    format!("{VOUCHER_DENOM_PREFIX}{token:#x}")
}

/// Parses a voucher denom back into its ERC20 contract.
pub fn parse_voucher_denom(denom: &str) -> Option<EthAddress> {
    denom
        .strip_prefix(VOUCHER_DENOM_PREFIX)
        .and_then(|hex| EthAddress::from_str(hex).ok())
}

fn get_u64(ctx: &Context<'_>, key: &[u8]) -> u64 {
    ctx.store
        .get(key)
        .map(|bytes| {
            let mut out = [0u8; 8];
            out.copy_from_slice(&bytes);
            u64::from_be_bytes(out)
        })
        .unwrap_or(0)
}

fn set_u64(ctx: &mut Context<'_>, key: &[u8], value: u64) {
    ctx.store.set(key, value.to_be_bytes().to_vec());
}

impl<A, S, L, H> Keeper<A, S, L, H>
where
    A: AssetKeeper,
    S: StakingKeeper,
    L: SlashingHooks,
    H: BridgeHooks,
{
    pub fn with_hooks(assets: A, staking: S, slashing: L, hooks: H) -> Self {
        Self {
            assets,
            staking,
            slashing,
            hooks,
            receiver_module_accounts: BTreeMap::new(),
        }
    }

    // ----- parameters -----

    pub fn params(&self, ctx: &Context<'_>) -> BridgeParams {
        ctx.store
            .get(&[keys::PARAMS_KEY])
            .map(|bytes| must_decode(&bytes, "params"))
            .unwrap_or_default()
    }

    pub fn set_params(
        &self,
        ctx: &mut Context<'_>,
        params: &BridgeParams,
    ) -> BridgeResult<()> {
        params.validate()?;
        ctx.store.set(&[keys::PARAMS_KEY], encode(params, "params"));
        Ok(())
    }

    // ----- observed-state counters -----

    pub fn last_observed_event_nonce(&self, ctx: &Context<'_>) -> u64 {
        get_u64(ctx, &[keys::LAST_OBSERVED_EVENT_NONCE_KEY])
    }

    pub(crate) fn set_last_observed_event_nonce(&self, ctx: &mut Context<'_>, nonce: u64) {
        set_u64(ctx, &[keys::LAST_OBSERVED_EVENT_NONCE_KEY], nonce);
    }

    pub fn latest_counterparty_height(&self, ctx: &Context<'_>) -> LatestCounterpartyHeight {
        ctx.store
            .get(&[keys::LAST_OBSERVED_COUNTERPARTY_HEIGHT_KEY])
            .map(|bytes| must_decode(&bytes, "latest counterparty height"))
            .unwrap_or_default()
    }

    /// Raises the observed counterparty height; lower observations are
    /// ignored so the value is monotonic.
    pub(crate) fn record_counterparty_height(
        &self,
        ctx: &mut Context<'_>,
        counterparty_height: u64,
    ) {
        let latest = self.latest_counterparty_height(ctx);
        if counterparty_height <= latest.counterparty_height {
            return;
        }
        let updated = LatestCounterpartyHeight {
            counterparty_height,
            chain_height: ctx.block_height,
        };
        ctx.store.set(
            &[keys::LAST_OBSERVED_COUNTERPARTY_HEIGHT_KEY],
            encode(&updated, "latest counterparty height"),
        );
    }

    /// Extrapolates the current counterparty height from the last
    /// observation and the configured block-time ratio. Every replica
    /// computes the same projection at the same chain height.
    pub fn projected_counterparty_height(&self, ctx: &Context<'_>) -> u64 {
        let params = self.params(ctx);
        let latest = self.latest_counterparty_height(ctx);
        if latest.counterparty_height == 0 {
            return 0;
        }
        let elapsed_blocks = ctx.block_height.saturating_sub(latest.chain_height);
        let elapsed_ms = elapsed_blocks.saturating_mul(params.average_block_time_ms);
        latest.counterparty_height + elapsed_ms / params.average_counterparty_block_time_ms
    }

    // ----- outgoing tx registry -----

    pub fn get_outgoing_tx(&self, ctx: &Context<'_>, store_index: &[u8]) -> Option<OutgoingTx> {
        ctx.store
            .get(&keys::make_outgoing_tx_key(store_index))
            .map(|bytes| must_decode(&bytes, "outgoing tx"))
    }

    pub fn set_outgoing_tx(&self, ctx: &mut Context<'_>, otx: &OutgoingTx) {
        ctx.store.set(
            &keys::make_outgoing_tx_key(&otx.store_index()),
            encode(otx, "outgoing tx"),
        );
    }

    pub fn delete_outgoing_tx(&self, ctx: &mut Context<'_>, store_index: &[u8]) {
        ctx.store.delete(&keys::make_outgoing_tx_key(store_index));
    }

    pub fn get_completed_outgoing_tx(
        &self,
        ctx: &Context<'_>,
        store_index: &[u8],
    ) -> Option<OutgoingTx> {
        ctx.store
            .get(&keys::make_completed_outgoing_tx_key(store_index))
            .map(|bytes| must_decode(&bytes, "completed outgoing tx"))
    }

    pub fn set_completed_outgoing_tx(&self, ctx: &mut Context<'_>, otx: &OutgoingTx) {
        ctx.store.set(
            &keys::make_completed_outgoing_tx_key(&otx.store_index()),
            encode(otx, "completed outgoing tx"),
        );
    }

    pub fn delete_completed_outgoing_tx(&self, ctx: &mut Context<'_>, store_index: &[u8]) {
        ctx.store
            .delete(&keys::make_completed_outgoing_tx_key(store_index));
    }

    /// Moves an execution-attested tx from the live registry to the
    /// completed subspace, where it is retained for late signers.
    pub fn complete_outgoing_tx(&self, ctx: &mut Context<'_>, otx: OutgoingTx) {
        let store_index = otx.store_index();
        self.delete_outgoing_tx(ctx, &store_index);
        self.set_completed_outgoing_tx(ctx, &otx);
    }

    /// Live outgoing txs of one variant, ascending by store index.
    pub fn iterate_outgoing_txs(
        &self,
        ctx: &Context<'_>,
        variant_prefix: u8,
    ) -> Vec<(Vec<u8>, OutgoingTx)> {
        ctx.store
            .prefix_scan(&[keys::OUTGOING_TX_KEY, variant_prefix])
            .into_iter()
            .map(|(key, value)| (key[1..].to_vec(), must_decode(&value, "outgoing tx")))
            .collect()
    }

    /// Completed outgoing txs of one variant, ascending by store index.
    pub fn iterate_completed_outgoing_txs(
        &self,
        ctx: &Context<'_>,
        variant_prefix: u8,
    ) -> Vec<(Vec<u8>, OutgoingTx)> {
        ctx.store
            .prefix_scan(&[keys::COMPLETED_OUTGOING_TX_KEY, variant_prefix])
            .into_iter()
            .map(|(key, value)| {
                (
                    key[1..].to_vec(),
                    must_decode(&value, "completed outgoing tx"),
                )
            })
            .collect()
    }

    // ----- confirmations -----

    pub fn set_confirmation(
        &self,
        ctx: &mut Context<'_>,
        validator: &ValidatorAddress,
        confirmation: &Confirmation,
    ) {
        ctx.store.set(
            &keys::make_confirmation_key(&confirmation.store_index(), validator),
            encode(confirmation, "confirmation"),
        );
    }

    pub fn get_confirmation(
        &self,
        ctx: &Context<'_>,
        store_index: &[u8],
        validator: &ValidatorAddress,
    ) -> Option<Confirmation> {
        ctx.store
            .get(&keys::make_confirmation_key(store_index, validator))
            .map(|bytes| must_decode(&bytes, "confirmation"))
    }

    pub fn has_confirmation(
        &self,
        ctx: &Context<'_>,
        store_index: &[u8],
        validator: &ValidatorAddress,
    ) -> bool {
        ctx.store
            .has(&keys::make_confirmation_key(store_index, validator))
    }

    /// Every (validator, confirmation) recorded for one outgoing tx.
    pub fn confirmations_of(
        &self,
        ctx: &Context<'_>,
        store_index: &[u8],
    ) -> Vec<(ValidatorAddress, Confirmation)> {
        ctx.store
            .prefix_scan(&keys::make_confirmation_prefix(store_index))
            .into_iter()
            .map(|(key, value)| {
                let validator = ValidatorAddress::from_slice(&key[key.len() - 20..])
                    .expect("confirmation key must end in a validator address");
                (validator, must_decode(&value, "confirmation"))
            })
            .collect()
    }

    pub fn delete_confirmations(&self, ctx: &mut Context<'_>, store_index: &[u8]) {
        for (key, _) in ctx
            .store
            .prefix_scan(&keys::make_confirmation_prefix(store_index))
        {
            ctx.store.delete(&key);
        }
    }

    // ----- unsigned-otx queries (relayer/off-chain signer surface) -----

    /// Live and completed batches the validator has not confirmed,
    /// ascending by nonce.
    pub fn get_unsigned_batch_txs(
        &self,
        ctx: &Context<'_>,
        validator: &ValidatorAddress,
    ) -> Vec<BatchTx> {
        let mut batches = Vec::new();
        for (store_index, otx) in self
            .iterate_completed_outgoing_txs(ctx, keys::BATCH_TX_PREFIX)
            .into_iter()
            .chain(self.iterate_outgoing_txs(ctx, keys::BATCH_TX_PREFIX))
        {
            if self.has_confirmation(ctx, &store_index, validator) {
                continue;
            }
            if let OutgoingTx::Batch(batch) = otx {
                batches.push(batch);
            }
        }
        order_batches_by_nonce_ascending(batches)
    }

    /// Live and completed contract calls the validator has not
    /// confirmed, ascending by invalidation nonce.
    pub fn get_unsigned_contract_call_txs(
        &self,
        ctx: &Context<'_>,
        validator: &ValidatorAddress,
    ) -> Vec<ContractCallTx> {
        let mut calls = Vec::new();
        for (store_index, otx) in self
            .iterate_completed_outgoing_txs(ctx, keys::CONTRACT_CALL_TX_PREFIX)
            .into_iter()
            .chain(self.iterate_outgoing_txs(ctx, keys::CONTRACT_CALL_TX_PREFIX))
        {
            if self.has_confirmation(ctx, &store_index, validator) {
                continue;
            }
            if let OutgoingTx::ContractCall(call) = otx {
                calls.push(call);
            }
        }
        order_contract_calls_by_nonce_ascending(calls)
    }

    /// Live and completed signer sets the validator has not confirmed,
    /// ascending by nonce.
    pub fn get_unsigned_signer_set_txs(
        &self,
        ctx: &Context<'_>,
        validator: &ValidatorAddress,
    ) -> Vec<SignerSetTx> {
        let mut signer_sets = Vec::new();
        for (store_index, otx) in self
            .iterate_completed_outgoing_txs(ctx, keys::SIGNER_SET_TX_PREFIX)
            .into_iter()
            .chain(self.iterate_outgoing_txs(ctx, keys::SIGNER_SET_TX_PREFIX))
        {
            if self.has_confirmation(ctx, &store_index, validator) {
                continue;
            }
            if let OutgoingTx::SignerSet(signer_set) = otx {
                signer_sets.push(signer_set);
            }
        }
        signer_sets.sort_by_key(|signer_set| signer_set.nonce);
        signer_sets
    }

    /// Everything the validator still has to sign, across all variants.
    pub fn get_unsigned_outgoing_txs(
        &self,
        ctx: &Context<'_>,
        validator: &ValidatorAddress,
    ) -> Vec<OutgoingTx> {
        let mut out: Vec<OutgoingTx> = Vec::new();
        out.extend(
            self.get_unsigned_batch_txs(ctx, validator)
                .into_iter()
                .map(OutgoingTx::from),
        );
        out.extend(
            self.get_unsigned_contract_call_txs(ctx, validator)
                .into_iter()
                .map(OutgoingTx::from),
        );
        out.extend(
            self.get_unsigned_signer_set_txs(ctx, validator)
                .into_iter()
                .map(OutgoingTx::from),
        );
        out
    }

    // ----- denom <-> ERC20 mapping -----

    /// Resolves a token contract to its chain denom. Returns whether
    /// the denom is chain-originated; unknown contracts resolve to
    /// their (possibly not yet minted) voucher denom.
    pub fn erc20_to_denom(&self, ctx: &Context<'_>, token: EthAddress) -> (bool, String) {
        match ctx.store.get(&keys::make_erc20_to_denom_key(token)) {
            Some(bytes) => (
                true,
                String::from_utf8(bytes).expect("corrupt denom entry in store"),
            ),
            None => (false, voucher_denom(token)),
        }
    }

    /// Resolves a denom to its token contract. Voucher denoms carry the
    /// contract in their name; chain-originated denoms must have been
    /// registered by an ERC20 deployment event.
    pub fn denom_to_erc20(
        &self,
        ctx: &Context<'_>,
        denom: &str,
    ) -> BridgeResult<(bool, EthAddress)> {
        if let Some(token) = parse_voucher_denom(denom) {
            return Ok((false, token));
        }
        match ctx.store.get(&keys::make_denom_to_erc20_key(denom)) {
            Some(bytes) => Ok((true, EthAddress::from_slice(&bytes))),
            None => Err(BridgeError::DenomNotMapped(denom.to_string())),
        }
    }

    pub(crate) fn set_denom_erc20_mapping(
        &self,
        ctx: &mut Context<'_>,
        denom: &str,
        token: EthAddress,
    ) {
        ctx.store.set(
            &keys::make_denom_to_erc20_key(denom),
            token.as_bytes().to_vec(),
        );
        ctx.store
            .set(&keys::make_erc20_to_denom_key(token), denom.as_bytes().to_vec());
    }

    pub fn denom_has_erc20(&self, ctx: &Context<'_>, denom: &str) -> bool {
        ctx.store.has(&keys::make_denom_to_erc20_key(denom))
    }

    // ----- watermark counters used by pool/batch/slashing -----

    pub(crate) fn last_send_to_evm_id(&self, ctx: &Context<'_>) -> u64 {
        get_u64(ctx, &[keys::LAST_SEND_TO_EVM_ID_KEY])
    }

    pub(crate) fn set_last_send_to_evm_id(&self, ctx: &mut Context<'_>, id: u64) {
        set_u64(ctx, &[keys::LAST_SEND_TO_EVM_ID_KEY], id);
    }

    pub fn last_batch_nonce(&self, ctx: &Context<'_>, token: EthAddress) -> u64 {
        get_u64(ctx, &keys::make_last_batch_nonce_key(token))
    }

    pub(crate) fn set_last_batch_nonce(
        &self,
        ctx: &mut Context<'_>,
        token: EthAddress,
        nonce: u64,
    ) {
        set_u64(ctx, &keys::make_last_batch_nonce_key(token), nonce);
    }

    pub(crate) fn last_slashed_outgoing_tx_height(&self, ctx: &Context<'_>) -> u64 {
        get_u64(ctx, &[keys::LAST_SLASHED_OUTGOING_TX_HEIGHT_KEY])
    }

    pub(crate) fn set_last_slashed_outgoing_tx_height(&self, ctx: &mut Context<'_>, height: u64) {
        set_u64(ctx, &[keys::LAST_SLASHED_OUTGOING_TX_HEIGHT_KEY], height);
    }

    pub(crate) fn last_slashed_signer_set_nonce(&self, ctx: &Context<'_>) -> u64 {
        get_u64(ctx, &[keys::LAST_SLASHED_SIGNER_SET_NONCE_KEY])
    }

    pub(crate) fn set_last_slashed_signer_set_nonce(&self, ctx: &mut Context<'_>, nonce: u64) {
        set_u64(ctx, &[keys::LAST_SLASHED_SIGNER_SET_NONCE_KEY], nonce);
    }

    pub fn last_created_signer_set_nonce(&self, ctx: &Context<'_>) -> u64 {
        get_u64(ctx, &[keys::LAST_CREATED_SIGNER_SET_NONCE_KEY])
    }

    pub(crate) fn set_last_created_signer_set_nonce(&self, ctx: &mut Context<'_>, nonce: u64) {
        set_u64(ctx, &[keys::LAST_CREATED_SIGNER_SET_NONCE_KEY], nonce);
    }

    pub fn last_observed_signer_set_nonce(&self, ctx: &Context<'_>) -> u64 {
        get_u64(ctx, &[keys::LAST_OBSERVED_SIGNER_SET_NONCE_KEY])
    }

    pub(crate) fn set_last_observed_signer_set_nonce(&self, ctx: &mut Context<'_>, nonce: u64) {
        set_u64(ctx, &[keys::LAST_OBSERVED_SIGNER_SET_NONCE_KEY], nonce);
    }
}
