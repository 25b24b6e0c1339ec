// Copyright (c) EVM Bridge Contributors
// SPDX-License-Identifier: Apache-2.0

//! Governance entry point: an approved community-pool spend proposal
//! turns community funds into an ordinary pool entry addressed to a
//! counterparty recipient. The entry is owned by the community pool
//! account, so the refund path (batch cancellation, pool cancellation)
//! returns funds where they came from.

use crate::external::{AssetKeeper, BridgeHooks, SlashingHooks, StakingKeeper};
use crate::keeper::{Context, Keeper};
use crate::MODULE_NAME;
use ethers::types::Address as EthAddress;
use evm_bridge_types::base_types::Coin;
use evm_bridge_types::error::{BridgeError, BridgeResult};
use evm_bridge_types::otx::{Erc20Token, SendToEvm};
use tracing::info;

/// An approved `CommunityPoolEvmSpend` governance proposal.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommunityPoolEvmSpendProposal {
    pub title: String,
    pub description: String,
    pub recipient: EthAddress,
    pub amount: Coin,
    pub bridge_fee: Coin,
}

impl<A, S, L, H> Keeper<A, S, L, H>
where
    A: AssetKeeper,
    S: StakingKeeper,
    L: SlashingHooks,
    H: BridgeHooks,
{
    /// Moves `amount + fee` out of the community pool and into the
    /// outgoing pool as a transfer owned by the community pool account.
    pub fn handle_community_pool_evm_spend(
        &mut self,
        ctx: &mut Context<'_>,
        proposal: &CommunityPoolEvmSpendProposal,
    ) -> BridgeResult<u64> {
        if proposal.amount.denom != proposal.bridge_fee.denom {
            return Err(BridgeError::InvalidCoins(format!(
                "fee denom {} does not match amount denom {}",
                proposal.bridge_fee.denom, proposal.amount.denom
            )));
        }
        if proposal.amount.amount.is_zero() {
            return Err(BridgeError::InvalidCoins(
                "zero-value community pool spend".to_string(),
            ));
        }
        if proposal.recipient.is_zero() {
            return Err(BridgeError::InvalidAddress(
                "zero counterparty recipient".to_string(),
            ));
        }

        let (_, token_contract) = self.denom_to_erc20(ctx, &proposal.amount.denom)?;

        let total = Coin::new(
            proposal.amount.denom.clone(),
            proposal
                .amount
                .amount
                .checked_add(proposal.bridge_fee.amount)
                .ok_or_else(|| {
                    BridgeError::InvalidCoins("amount + fee overflows".to_string())
                })?,
        );
        self.assets.spend_community_pool(MODULE_NAME, &total)?;

        let id = self.last_send_to_evm_id(ctx) + 1;
        self.set_last_send_to_evm_id(ctx, id);
        let transfer = SendToEvm {
            id,
            sender: self.assets.community_pool_account(),
            evm_recipient: proposal.recipient,
            erc20_token: Erc20Token::new(token_contract, proposal.amount.amount),
            erc20_fee: Erc20Token::new(token_contract, proposal.bridge_fee.amount),
        };
        self.add_unbatched_send_to_evm(ctx, &transfer);

        info!(
            id,
            recipient = ?proposal.recipient,
            amount = %proposal.amount,
            "community pool spend added to outgoing pool"
        );
        Ok(id)
    }
}
