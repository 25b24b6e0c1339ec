// Copyright (c) EVM Bridge Contributors
// SPDX-License-Identifier: Apache-2.0

//! The transaction surface of the module. Each handler validates its
//! message and delegates to the keeper; any error aborts the message
//! and the host rolls its writes back.

use crate::external::{AssetKeeper, BridgeHooks, SlashingHooks, StakingKeeper};
use crate::keeper::{Context, Keeper};
use ethers::types::Address as EthAddress;
use evm_bridge_types::base_types::{ChainAddress, Coin, ValidatorAddress};
use evm_bridge_types::confirmation::{Confirmation, ConfirmationKind};
use evm_bridge_types::crypto::verify_outgoing_tx_signature;
use evm_bridge_types::error::{BridgeError, BridgeResult};
use evm_bridge_types::events::CounterpartyEvent;
use evm_bridge_types::otx::BatchTx;
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgSendToEvm {
    pub sender: ChainAddress,
    pub evm_recipient: EthAddress,
    pub amount: Coin,
    pub bridge_fee: Coin,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgCancelSendToEvm {
    pub sender: ChainAddress,
    pub id: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgSubmitEvent {
    pub validator: ValidatorAddress,
    pub event: CounterpartyEvent,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgSendConfirmation {
    pub validator: ValidatorAddress,
    pub confirmation: Confirmation,
}

/// Permissionless request to build a batch for a denom.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgRequestBatchTx {
    pub signer: ChainAddress,
    pub denom: String,
}

impl<A, S, L, H> Keeper<A, S, L, H>
where
    A: AssetKeeper,
    S: StakingKeeper,
    L: SlashingHooks,
    H: BridgeHooks,
{
    pub fn handle_send_to_evm(
        &mut self,
        ctx: &mut Context<'_>,
        msg: MsgSendToEvm,
    ) -> BridgeResult<u64> {
        self.create_send_to_evm(ctx, msg.sender, msg.evm_recipient, msg.amount, msg.bridge_fee)
    }

    pub fn handle_cancel_send_to_evm(
        &mut self,
        ctx: &mut Context<'_>,
        msg: MsgCancelSendToEvm,
    ) -> BridgeResult<()> {
        self.cancel_send_to_evm(ctx, msg.id, &msg.sender)
    }

    pub fn handle_submit_event(
        &mut self,
        ctx: &mut Context<'_>,
        msg: MsgSubmitEvent,
    ) -> BridgeResult<()> {
        self.record_event_vote(ctx, &msg.validator, msg.event)
    }

    /// Records a validator's confirmation of an outgoing tx. The
    /// signature must recover to the EVM address the validator
    /// registered with the staking subsystem, over the checkpoint of
    /// the tx being confirmed. Confirmations are accepted for both live
    /// and completed txs, so late signers can still comply while the
    /// retention window lasts.
    pub fn handle_send_confirmation(
        &mut self,
        ctx: &mut Context<'_>,
        msg: MsgSendConfirmation,
    ) -> BridgeResult<()> {
        let store_index = msg.confirmation.store_index();
        let otx = self
            .get_outgoing_tx(ctx, &store_index)
            .or_else(|| self.get_completed_outgoing_tx(ctx, &store_index))
            .ok_or_else(|| {
                BridgeError::NotFound("no outgoing tx for confirmation".to_string())
            })?;

        let registered = self
            .staking
            .evm_address_of(&msg.validator)
            .ok_or_else(|| {
                BridgeError::Unauthorized(format!(
                    "{} has no registered EVM address",
                    msg.validator
                ))
            })?;
        if msg.confirmation.evm_signer() != registered {
            return Err(BridgeError::Unauthorized(format!(
                "confirmation signer {:?} is not the registered address {:?}",
                msg.confirmation.evm_signer(),
                registered
            )));
        }

        verify_outgoing_tx_signature(&otx, registered, msg.confirmation.signature())?;

        if self.has_confirmation(ctx, &store_index, &msg.validator) {
            return Err(BridgeError::DuplicateConfirmation(format!(
                "{} already confirmed this outgoing tx",
                msg.validator
            )));
        }

        self.set_confirmation(ctx, &msg.validator, &msg.confirmation);
        info!(validator = %msg.validator, "recorded outgoing tx confirmation");
        Ok(())
    }

    /// Builds a batch for the requested denom with the configured size
    /// limit. Succeeds with `None` when the pool holds nothing for that
    /// token.
    pub fn handle_request_batch_tx(
        &mut self,
        ctx: &mut Context<'_>,
        msg: MsgRequestBatchTx,
    ) -> BridgeResult<Option<BatchTx>> {
        let (_, token) = self.denom_to_erc20(ctx, &msg.denom)?;
        let batch_size_limit = self.params(ctx).batch_size_limit;
        Ok(self.create_batch_tx(ctx, token, batch_size_limit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{test_sender, test_token, voucher_coin, TestEnv};
    use evm_bridge_types::confirmation::BatchTxConfirmation;
    use evm_bridge_types::crypto::{evm_address_of_keypair, sign_outgoing_tx};
    use evm_bridge_types::otx::OutgoingTx;

    fn confirmation_for(
        env_validator: &crate::test_utils::TestValidator,
        batch: &BatchTx,
    ) -> MsgSendConfirmation {
        let otx = OutgoingTx::from(batch.clone());
        MsgSendConfirmation {
            validator: env_validator.operator,
            confirmation: Confirmation::Batch(BatchTxConfirmation {
                token_contract: batch.token_contract,
                batch_nonce: batch.batch_nonce,
                evm_signer: evm_address_of_keypair(&env_validator.keypair()),
                signature: sign_outgoing_tx(&otx, &env_validator.keypair()),
            }),
        }
    }

    fn env_with_batch() -> (TestEnv, BatchTx) {
        let mut env = TestEnv::new();
        env.mint_vouchers(test_sender(), 99_999);
        env.add_send_to_evm_txs_to_pool(&[2, 3]);
        let batch = {
            let (mut ctx, keeper) = env.split();
            keeper.create_batch_tx(&mut ctx, test_token(), 2).unwrap()
        };
        (env, batch)
    }

    #[test]
    fn test_send_and_cancel_messages() {
        let mut env = TestEnv::new();
        env.mint_vouchers(test_sender(), 1_000);

        let (mut ctx, keeper) = env.split();
        let id = keeper
            .handle_send_to_evm(
                &mut ctx,
                MsgSendToEvm {
                    sender: test_sender(),
                    evm_recipient: crate::test_utils::test_receiver(),
                    amount: voucher_coin(100),
                    bridge_fee: voucher_coin(1),
                },
            )
            .unwrap();

        keeper
            .handle_cancel_send_to_evm(
                &mut ctx,
                MsgCancelSendToEvm {
                    sender: test_sender(),
                    id,
                },
            )
            .unwrap();
        assert!(keeper.iterate_unbatched_send_to_evms(&ctx).is_empty());
    }

    #[test]
    fn test_send_confirmation_happy_path_and_duplicate() {
        let (mut env, batch) = env_with_batch();
        let validator = env.validators[0].clone();
        let msg = confirmation_for(&validator, &batch);

        let (mut ctx, keeper) = env.split();
        keeper.handle_send_confirmation(&mut ctx, msg.clone()).unwrap();
        assert!(keeper.get_unsigned_batch_txs(&ctx, &validator.operator).is_empty());

        assert!(matches!(
            keeper.handle_send_confirmation(&mut ctx, msg),
            Err(BridgeError::DuplicateConfirmation(_))
        ));
    }

    #[test]
    fn test_send_confirmation_accepted_for_completed_tx() {
        let (mut env, batch) = env_with_batch();
        let validator = env.validators[0].clone();
        let msg = confirmation_for(&validator, &batch);

        let (mut ctx, keeper) = env.split();
        keeper
            .batch_tx_executed(&mut ctx, test_token(), batch.batch_nonce)
            .unwrap();
        // the batch is completed, not live, but late signing still works
        keeper.handle_send_confirmation(&mut ctx, msg).unwrap();
    }

    #[test]
    fn test_send_confirmation_rejects_bad_signatures() {
        let (mut env, batch) = env_with_batch();
        let val0 = env.validators[0].clone();
        let val1 = env.validators[1].clone();

        // signed by a different key than the registered one
        let mut msg = confirmation_for(&val0, &batch);
        if let Confirmation::Batch(ref mut confirmation) = msg.confirmation {
            confirmation.signature =
                sign_outgoing_tx(&OutgoingTx::from(batch.clone()), &val1.keypair());
        }
        let (mut ctx, keeper) = env.split();
        assert!(matches!(
            keeper.handle_send_confirmation(&mut ctx, msg),
            Err(BridgeError::InvalidSignature(_))
        ));

        // claiming someone else's EVM signer address
        let mut msg = confirmation_for(&val0, &batch);
        if let Confirmation::Batch(ref mut confirmation) = msg.confirmation {
            confirmation.evm_signer = evm_address_of_keypair(&val1.keypair());
        }
        assert!(matches!(
            keeper.handle_send_confirmation(&mut ctx, msg),
            Err(BridgeError::Unauthorized(_))
        ));

        // confirming a tx that does not exist
        let msg = MsgSendConfirmation {
            validator: val0.operator,
            confirmation: Confirmation::Batch(BatchTxConfirmation {
                token_contract: test_token(),
                batch_nonce: 99,
                evm_signer: evm_address_of_keypair(&val0.keypair()),
                signature: vec![0u8; 65],
            }),
        };
        assert!(matches!(
            keeper.handle_send_confirmation(&mut ctx, msg),
            Err(BridgeError::NotFound(_))
        ));
    }

    #[test]
    fn test_request_batch_tx() {
        let mut env = TestEnv::new();
        env.mint_vouchers(test_sender(), 99_999);
        env.add_send_to_evm_txs_to_pool(&[2, 3]);
        let denom = env.voucher_denom();

        let (mut ctx, keeper) = env.split();
        let batch = keeper
            .handle_request_batch_tx(
                &mut ctx,
                MsgRequestBatchTx {
                    signer: test_sender(),
                    denom: denom.clone(),
                },
            )
            .unwrap()
            .unwrap();
        assert_eq!(batch.transactions.len(), 2);

        // empty pool: no batch, no error
        assert!(keeper
            .handle_request_batch_tx(
                &mut ctx,
                MsgRequestBatchTx {
                    signer: test_sender(),
                    denom,
                },
            )
            .unwrap()
            .is_none());
    }
}
