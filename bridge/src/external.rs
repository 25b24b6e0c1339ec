// Copyright (c) EVM Bridge Contributors
// SPDX-License-Identifier: Apache-2.0

//! Interfaces to the host chain subsystems the bridge consumes or
//! notifies. The module never reaches around these traits: supply
//! conservation is the asset keeper's invariant, validator weights are
//! the staking keeper's, and misbehavior reports are handed to the
//! host's slashing machinery.

use evm_bridge_types::base_types::{ChainAddress, Coin, DenomMetadata, ValidatorAddress};
use evm_bridge_types::error::BridgeResult;
use evm_bridge_types::events::{
    BatchExecutedEvent, ContractCallExecutedEvent, Erc20DeployedEvent, SendToChainEvent,
    SignerSetExecutedEvent,
};
use ethers::types::Address as EthAddress;

/// Mint/burn/transfer surface of the host token subsystem.
pub trait AssetKeeper {
    fn mint(&mut self, module: &str, coin: &Coin) -> BridgeResult<()>;
    fn burn(&mut self, module: &str, coin: &Coin) -> BridgeResult<()>;
    fn send_from_account_to_module(
        &mut self,
        sender: &ChainAddress,
        module: &str,
        coin: &Coin,
    ) -> BridgeResult<()>;
    fn send_from_module_to_account(
        &mut self,
        module: &str,
        receiver: &ChainAddress,
        coin: &Coin,
    ) -> BridgeResult<()>;
    fn send_from_module_to_module(
        &mut self,
        from_module: &str,
        to_module: &str,
        coin: &Coin,
    ) -> BridgeResult<()>;
    /// Current total supply of a denom; zero when unknown.
    fn supply_of(&self, denom: &str) -> ethers::types::U256;
    fn denom_metadata(&self, denom: &str) -> Option<DenomMetadata>;
    /// Moves funds out of the community pool into a module account.
    fn spend_community_pool(&mut self, to_module: &str, coin: &Coin) -> BridgeResult<()>;
    /// The account that owns (and can be refunded for) community-pool
    /// spends.
    fn community_pool_account(&self) -> ChainAddress;
}

/// One validator of the current weighted set, with the EVM address it
/// registered for signing outgoing transactions.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidatorPower {
    pub operator: ValidatorAddress,
    pub evm_address: EthAddress,
    pub power: u64,
}

/// Read-only view of the host staking subsystem.
pub trait StakingKeeper {
    /// The current bonded validator set with consensus powers.
    fn current_validator_set(&self) -> Vec<ValidatorPower>;
    /// Operators that were bonded at a past chain height. Used to scope
    /// NoConfirm slashing to validators that were responsible when the
    /// outgoing tx was created.
    fn bonded_validators_at(&self, height: u64) -> Vec<ValidatorAddress>;
    /// The EVM address a validator registered for confirmations.
    fn evm_address_of(&self, validator: &ValidatorAddress) -> Option<EthAddress>;
}

/// Misbehavior reports handed to the host slashing machinery. The
/// bridge only detects; penalties are the host's policy.
pub trait SlashingHooks {
    fn report_no_confirm(&mut self, validator: &ValidatorAddress, store_index: &[u8]);
    fn report_wrong_attestation(&mut self, validator: &ValidatorAddress, event_nonce: u64);
}

/// Post-event notifications for downstream modules. All default to
/// no-ops.
pub trait BridgeHooks {
    fn after_send_to_chain(&mut self, _event: &SendToChainEvent) {}
    fn after_batch_executed(&mut self, _event: &BatchExecutedEvent) {}
    fn after_contract_call_executed(&mut self, _event: &ContractCallExecutedEvent) {}
    fn after_erc20_deployed(&mut self, _event: &Erc20DeployedEvent) {}
    fn after_signer_set_executed(&mut self, _event: &SignerSetExecutedEvent) {}
}

/// Hook implementation for hosts that do not subscribe to bridge
/// events.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopHooks;

impl BridgeHooks for NoopHooks {}
