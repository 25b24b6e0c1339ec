// Copyright (c) EVM Bridge Contributors
// SPDX-License-Identifier: Apache-2.0

//! Application of observed counterparty events. Each observed event's
//! side effects run exactly once, inside the block that completed its
//! attestation; any error aborts the surrounding message and the host
//! rolls the writes back.

use crate::external::{AssetKeeper, BridgeHooks, SlashingHooks, StakingKeeper};
use crate::keeper::{Context, Keeper};
use crate::MODULE_NAME;
use ethers::types::U256;
use evm_bridge_types::base_types::Coin;
use evm_bridge_types::error::{BridgeError, BridgeResult};
use evm_bridge_types::events::{CounterpartyEvent, Erc20DeployedEvent};
use tracing::info;

impl<A, S, L, H> Keeper<A, S, L, H>
where
    A: AssetKeeper,
    S: StakingKeeper,
    L: SlashingHooks,
    H: BridgeHooks,
{
    /// Entry point for observed event processing.
    pub(crate) fn handle_event(
        &mut self,
        ctx: &mut Context<'_>,
        event: &CounterpartyEvent,
    ) -> BridgeResult<()> {
        match event {
            CounterpartyEvent::SendToChain(event) => {
                let (chain_originated, denom) = self.erc20_to_denom(ctx, event.token_contract);
                let coin = Coin::new(denom.clone(), event.amount);

                if !chain_originated {
                    self.detect_malicious_supply(&denom, event.amount)?;
                    // counterparty-originated: mint vouchers
                    self.assets.mint(MODULE_NAME, &coin)?;
                }

                if let Some(receiver_module) =
                    self.receiver_module_accounts.get(&event.receiver).cloned()
                {
                    self.assets
                        .send_from_module_to_module(MODULE_NAME, &receiver_module, &coin)?;
                } else {
                    self.assets
                        .send_from_module_to_account(MODULE_NAME, &event.receiver, &coin)?;
                }
                info!(
                    receiver = %event.receiver,
                    amount = %event.amount,
                    denom = %denom,
                    "inbound transfer credited"
                );
                self.hooks.after_send_to_chain(event);
                Ok(())
            }

            CounterpartyEvent::BatchExecuted(event) => {
                self.batch_tx_executed(ctx, event.token_contract, event.batch_nonce)?;
                self.hooks.after_batch_executed(event);
                Ok(())
            }

            CounterpartyEvent::ContractCallExecuted(event) => {
                self.contract_call_executed(
                    ctx,
                    &event.invalidation_scope,
                    event.invalidation_nonce,
                );
                self.hooks.after_contract_call_executed(event);
                Ok(())
            }

            CounterpartyEvent::Erc20Deployed(event) => {
                self.verify_erc20_deployed_event(ctx, event)?;
                self.set_denom_erc20_mapping(ctx, &event.denom, event.token_contract);
                info!(
                    denom = %event.denom,
                    token = ?event.token_contract,
                    "registered chain-originated ERC20"
                );
                self.hooks.after_erc20_deployed(event);
                Ok(())
            }

            CounterpartyEvent::SignerSetExecuted(event) => {
                self.signer_set_executed(ctx, event.signer_set_nonce);
                self.hooks.after_signer_set_executed(event);
                Ok(())
            }
        }
    }

    /// Rejects inbound mints that would push a voucher supply past
    /// 2^256. A compromised counterparty contract must not be able to
    /// wrap the supply around.
    pub(crate) fn detect_malicious_supply(&self, denom: &str, amount: U256) -> BridgeResult<()> {
        let current = self.assets.supply_of(denom);
        if current.checked_add(amount).is_none() {
            return Err(BridgeError::SupplyOverflow(format!(
                "malicious supply of {denom} detected"
            )));
        }
        Ok(())
    }

    /// Bit-exact validation of an ERC20 deployment against the denom's
    /// metadata. Tokens without metadata are accepted only when they
    /// already have supply and the ERC20 mirrors the bare denom: name
    /// equal to the denom, empty symbol, zero decimals.
    fn verify_erc20_deployed_event(
        &self,
        ctx: &Context<'_>,
        event: &Erc20DeployedEvent,
    ) -> BridgeResult<()> {
        if self.denom_has_erc20(ctx, &event.denom) {
            return Err(BridgeError::InvalidErc20Event(format!(
                "an ERC20 already exists for denom {}",
                event.denom
            )));
        }

        if let Some(metadata) = self
            .assets
            .denom_metadata(&event.denom)
            .filter(|metadata| !metadata.base.is_empty())
        {
            if event.erc20_name != metadata.display {
                return Err(BridgeError::InvalidErc20Event(format!(
                    "ERC20 name {} does not match denom display {}",
                    event.erc20_name, metadata.display
                )));
            }
            if event.erc20_symbol != metadata.display {
                return Err(BridgeError::InvalidErc20Event(format!(
                    "ERC20 symbol {} does not match denom display {}",
                    event.erc20_symbol, metadata.display
                )));
            }
            if event.erc20_decimals != u64::from(metadata.display_decimals()) {
                return Err(BridgeError::InvalidErc20Event(format!(
                    "ERC20 decimals {} do not match denom decimals {}",
                    event.erc20_decimals,
                    metadata.display_decimals()
                )));
            }
            return Ok(());
        }

        if self.assets.supply_of(&event.denom).is_zero() {
            return Err(BridgeError::InvalidErc20Event(format!(
                "no supply exists for token {} without metadata",
                event.denom
            )));
        }
        if event.erc20_name != event.denom {
            return Err(BridgeError::InvalidErc20Event(format!(
                "invalid ERC20 name for token without metadata; got: {}, expected: {}",
                event.erc20_name, event.denom
            )));
        }
        if !event.erc20_symbol.is_empty() {
            return Err(BridgeError::InvalidErc20Event(format!(
                "expected empty ERC20 symbol for token without metadata; got: {}",
                event.erc20_symbol
            )));
        }
        if event.erc20_decimals != 0 {
            return Err(BridgeError::InvalidErc20Event(format!(
                "expected zero ERC20 decimals for token without metadata; got: {}",
                event.erc20_decimals
            )));
        }
        Ok(())
    }
}
