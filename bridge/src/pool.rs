// Copyright (c) EVM Bridge Contributors
// SPDX-License-Identifier: Apache-2.0

//! The pool of individual outbound transfers awaiting batch selection.
//! Entries live under a fee-complement key, so ascending store order is
//! `(fee desc, id desc)` and batch selection never sorts in memory; a
//! secondary id index supports cancellation. Escrowed funds stay in the
//! module account until the transfer is retired or refunded.

use crate::external::{AssetKeeper, BridgeHooks, SlashingHooks, StakingKeeper};
use crate::keeper::{must_decode, encode, Context, Keeper};
use crate::MODULE_NAME;
use ethers::types::Address as EthAddress;
use evm_bridge_types::base_types::{ChainAddress, Coin};
use evm_bridge_types::error::{BridgeError, BridgeResult};
use evm_bridge_types::keys;
use evm_bridge_types::otx::{Erc20Token, SendToEvm};
use tracing::{debug, info};

impl<A, S, L, H> Keeper<A, S, L, H>
where
    A: AssetKeeper,
    S: StakingKeeper,
    L: SlashingHooks,
    H: BridgeHooks,
{
    /// Escrows `amount + fee` from the sender and adds the transfer to
    /// the pool. Returns the assigned transfer id.
    pub fn create_send_to_evm(
        &mut self,
        ctx: &mut Context<'_>,
        sender: ChainAddress,
        evm_recipient: EthAddress,
        amount: Coin,
        fee: Coin,
    ) -> BridgeResult<u64> {
        if amount.denom != fee.denom {
            return Err(BridgeError::InvalidCoins(format!(
                "fee denom {} does not match amount denom {}",
                fee.denom, amount.denom
            )));
        }
        if amount.amount.is_zero() {
            return Err(BridgeError::InvalidCoins(
                "zero-value transfer".to_string(),
            ));
        }
        if evm_recipient.is_zero() {
            return Err(BridgeError::InvalidAddress(
                "zero counterparty recipient".to_string(),
            ));
        }

        let (_, token_contract) = self.denom_to_erc20(ctx, &amount.denom)?;

        let escrow = Coin::new(
            amount.denom.clone(),
            amount
                .amount
                .checked_add(fee.amount)
                .ok_or_else(|| BridgeError::InvalidCoins("amount + fee overflows".to_string()))?,
        );
        self.assets
            .send_from_account_to_module(&sender, MODULE_NAME, &escrow)?;

        let id = self.last_send_to_evm_id(ctx) + 1;
        self.set_last_send_to_evm_id(ctx, id);

        let transfer = SendToEvm {
            id,
            sender,
            evm_recipient,
            erc20_token: Erc20Token::new(token_contract, amount.amount),
            erc20_fee: Erc20Token::new(token_contract, fee.amount),
        };
        self.add_unbatched_send_to_evm(ctx, &transfer);

        info!(
            id,
            sender = %sender,
            token = ?token_contract,
            amount = %amount.amount,
            fee = %fee.amount,
            "added transfer to outgoing pool"
        );
        Ok(id)
    }

    /// Removes a still-pooled transfer and refunds the sender. Batched
    /// transfers cannot be cancelled; they are either executed or
    /// restored when their batch is cancelled.
    pub fn cancel_send_to_evm(
        &mut self,
        ctx: &mut Context<'_>,
        id: u64,
        requester: &ChainAddress,
    ) -> BridgeResult<()> {
        let transfer = self
            .get_unbatched_send_to_evm(ctx, id)
            .ok_or_else(|| BridgeError::NotFound(format!("transfer {id} is not in the pool")))?;
        if &transfer.sender != requester {
            return Err(BridgeError::Unauthorized(format!(
                "transfer {id} belongs to {}",
                transfer.sender
            )));
        }

        let (_, denom) = self.erc20_to_denom(ctx, transfer.erc20_token.contract);
        let refund = Coin::new(
            denom,
            transfer.erc20_token.amount + transfer.erc20_fee.amount,
        );
        self.assets
            .send_from_module_to_account(MODULE_NAME, requester, &refund)?;

        self.remove_unbatched_send_to_evm(ctx, &transfer);
        info!(id, sender = %requester, refund = %refund, "cancelled pooled transfer");
        Ok(())
    }

    /// All pooled transfers of one token, `(fee desc, id desc)`.
    pub fn iterate_unbatched_send_to_evms_by_token(
        &self,
        ctx: &Context<'_>,
        token: EthAddress,
    ) -> Vec<SendToEvm> {
        ctx.store
            .prefix_scan(&keys::make_send_to_evm_token_prefix(token))
            .into_iter()
            .map(|(_, value)| must_decode(&value, "pooled transfer"))
            .collect()
    }

    /// All pooled transfers, grouped by token in store order and
    /// `(fee desc, id desc)` within each token.
    pub fn iterate_unbatched_send_to_evms(&self, ctx: &Context<'_>) -> Vec<SendToEvm> {
        ctx.store
            .prefix_scan(&[keys::SEND_TO_EVM_KEY])
            .into_iter()
            .map(|(_, value)| must_decode(&value, "pooled transfer"))
            .collect()
    }

    pub(crate) fn get_unbatched_send_to_evm(
        &self,
        ctx: &Context<'_>,
        id: u64,
    ) -> Option<SendToEvm> {
        let pool_key = ctx.store.get(&keys::make_send_to_evm_id_index_key(id))?;
        let value = ctx
            .store
            .get(&pool_key)
            .expect("pool id index points at a missing entry");
        Some(must_decode(&value, "pooled transfer"))
    }

    /// Inserts a transfer into the pool, preserving its id. Also the
    /// restoration path for cancelled batches.
    pub(crate) fn add_unbatched_send_to_evm(&self, ctx: &mut Context<'_>, transfer: &SendToEvm) {
        let pool_key = keys::make_send_to_evm_key(transfer.id, &transfer.erc20_fee);
        ctx.store.set(&pool_key, encode(transfer, "pooled transfer"));
        ctx.store
            .set(&keys::make_send_to_evm_id_index_key(transfer.id), pool_key);
        debug!(id = transfer.id, "transfer in pool");
    }

    pub(crate) fn remove_unbatched_send_to_evm(
        &self,
        ctx: &mut Context<'_>,
        transfer: &SendToEvm,
    ) {
        ctx.store
            .delete(&keys::make_send_to_evm_key(transfer.id, &transfer.erc20_fee));
        ctx.store
            .delete(&keys::make_send_to_evm_id_index_key(transfer.id));
    }
}
