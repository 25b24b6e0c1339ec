// Copyright (c) EVM Bridge Contributors
// SPDX-License-Identifier: Apache-2.0

//! End-to-end flow over the whole module: an inbound transfer mints
//! vouchers, the vouchers go back out through a batch, validators
//! confirm it, the counterparty executes it, and a community-pool spend
//! plus an ERC20 deployment exercise the governance and registration
//! paths.

use crate::external::AssetKeeper;
use crate::governance::CommunityPoolEvmSpendProposal;
use crate::keeper::voucher_denom;
use crate::msgs::{MsgRequestBatchTx, MsgSendConfirmation, MsgSendToEvm, MsgSubmitEvent};
use crate::test_utils::{init_test_logging, test_sender, test_token, TestEnv};
use ethers::types::{Address as EthAddress, U256};
use evm_bridge_types::base_types::{Coin, DenomMetadata, DenomUnit};
use evm_bridge_types::confirmation::{BatchTxConfirmation, Confirmation};
use evm_bridge_types::crypto::{evm_address_of_keypair, sign_outgoing_tx};
use evm_bridge_types::events::{
    BatchExecutedEvent, CounterpartyEvent, Erc20DeployedEvent, SendToChainEvent,
};
use evm_bridge_types::otx::{OutgoingTx, OutgoingTxKind};

#[test]
fn test_happy_path() -> anyhow::Result<()> {
    init_test_logging();
    let mut env = TestEnv::new();
    let user = test_sender();
    let denom = voucher_denom(test_token());
    let validators = env.validators.clone();

    // the first block bootstraps a signer set for the counterparty
    {
        let (mut ctx, keeper) = env.split();
        keeper.end_block(&mut ctx);
        assert_eq!(keeper.last_created_signer_set_nonce(&ctx), 1);
    }

    // ---- send to chain: 200 of the test ERC20 arrive as vouchers ----

    let deposit = CounterpartyEvent::SendToChain(SendToChainEvent {
        event_nonce: 1,
        counterparty_height: 1_000,
        token_contract: test_token(),
        amount: U256::from(200u64),
        evm_sender: EthAddress::repeat_byte(0x05),
        receiver: user,
    });
    {
        let (mut ctx, keeper) = env.split();
        for validator in &validators {
            keeper
                .handle_submit_event(
                    &mut ctx,
                    MsgSubmitEvent {
                        validator: validator.operator,
                        event: deposit.clone(),
                    },
                )
                .unwrap();
        }
    }
    assert_eq!(
        env.keeper.assets.balance_of(&user, &denom),
        U256::from(200u64)
    );

    // ---- send to counterparty: 100 + 1 fee go back out ----

    let batch = {
        let (mut ctx, keeper) = env.split();
        keeper
            .handle_send_to_evm(
                &mut ctx,
                MsgSendToEvm {
                    sender: user,
                    evm_recipient: EthAddress::repeat_byte(0x09),
                    amount: Coin::new(denom.clone(), 100u64),
                    bridge_fee: Coin::new(denom.clone(), 1u64),
                },
            )
            .unwrap();

        keeper
            .handle_request_batch_tx(
                &mut ctx,
                MsgRequestBatchTx {
                    signer: user,
                    denom: denom.clone(),
                },
            )
            .unwrap()
            .expect("pool has one transfer, a batch must come out")
    };
    assert_eq!(batch.batch_nonce, 1);
    assert_eq!(batch.transactions.len(), 1);

    // ---- validators confirm the batch ----

    {
        let (mut ctx, keeper) = env.split();
        let otx = OutgoingTx::from(batch.clone());
        for validator in &validators {
            keeper
                .handle_send_confirmation(
                    &mut ctx,
                    MsgSendConfirmation {
                        validator: validator.operator,
                        confirmation: Confirmation::Batch(BatchTxConfirmation {
                            token_contract: batch.token_contract,
                            batch_nonce: batch.batch_nonce,
                            evm_signer: evm_address_of_keypair(&validator.keypair()),
                            signature: sign_outgoing_tx(&otx, &validator.keypair()),
                        }),
                    },
                )
                .unwrap();
            assert!(keeper
                .get_unsigned_batch_txs(&ctx, &validator.operator)
                .is_empty());
        }
    }

    // ---- the counterparty executes the batch ----

    let executed = CounterpartyEvent::BatchExecuted(BatchExecutedEvent {
        event_nonce: 2,
        counterparty_height: 1_050,
        token_contract: test_token(),
        batch_nonce: batch.batch_nonce,
    });
    {
        let (mut ctx, keeper) = env.split();
        for validator in &validators {
            keeper
                .handle_submit_event(
                    &mut ctx,
                    MsgSubmitEvent {
                        validator: validator.operator,
                        event: executed.clone(),
                    },
                )
                .unwrap();
        }
        assert!(keeper
            .get_outgoing_tx(&ctx, &OutgoingTx::from(batch.clone()).store_index())
            .is_none());
        assert!(keeper
            .get_completed_outgoing_tx(&ctx, &OutgoingTx::from(batch.clone()).store_index())
            .is_some());
    }

    // 101 vouchers were burned: 99 remain with the user, none escrowed
    assert_eq!(
        env.keeper.assets.balance_of(&user, &denom),
        U256::from(99u64)
    );
    assert_eq!(
        env.keeper.assets.module_balance_of(crate::MODULE_NAME, &denom),
        U256::zero()
    );
    assert_eq!(
        env.keeper.assets.supply_of(&denom),
        U256::from(99u64)
    );

    // ---- deploy the chain-native denom as an ERC20 ----

    env.keeper.assets.set_metadata(
        "testgb",
        DenomMetadata {
            base: "testgb".to_string(),
            display: "testgb".to_string(),
            denom_units: vec![DenomUnit {
                denom: "testgb".to_string(),
                exponent: 0,
            }],
        },
    );
    let erc20_contract = EthAddress::repeat_byte(0x0e);
    let deployed = CounterpartyEvent::Erc20Deployed(Erc20DeployedEvent {
        event_nonce: 3,
        counterparty_height: 1_080,
        denom: "testgb".to_string(),
        token_contract: erc20_contract,
        erc20_name: "testgb".to_string(),
        erc20_symbol: "testgb".to_string(),
        erc20_decimals: 0,
    });
    {
        let (mut ctx, keeper) = env.split();
        for validator in &validators {
            keeper
                .handle_submit_event(
                    &mut ctx,
                    MsgSubmitEvent {
                        validator: validator.operator,
                        event: deployed.clone(),
                    },
                )
                .unwrap();
        }
        assert_eq!(
            keeper.denom_to_erc20(&ctx, "testgb").unwrap(),
            (true, erc20_contract)
        );
    }

    // ---- a community-pool spend funds a counterparty address ----

    env.keeper.assets.fund_community_pool("testgb", 1_000_000_000);
    {
        let (mut ctx, keeper) = env.split();
        keeper
            .handle_community_pool_evm_spend(
                &mut ctx,
                &CommunityPoolEvmSpendProposal {
                    title: "community pool spend ethereum".to_string(),
                    description: "community pool spend ethereum".to_string(),
                    recipient: EthAddress::repeat_byte(0x0c),
                    amount: Coin::new("testgb", 900u64),
                    bridge_fee: Coin::new("testgb", 1_000_000u64),
                },
            )
            .unwrap();

        let community_batch = keeper
            .handle_request_batch_tx(
                &mut ctx,
                MsgRequestBatchTx {
                    signer: user,
                    denom: "testgb".to_string(),
                },
            )
            .unwrap()
            .expect("community spend must be batchable");
        assert_eq!(community_batch.token_contract, erc20_contract);
        assert_eq!(community_batch.batch_nonce, 1);
        assert_eq!(
            community_batch.transactions[0].erc20_token.amount,
            U256::from(900u64)
        );
    }

    // the observed event nonce advanced gap-free through the flow
    {
        let (ctx, keeper) = env.split();
        assert_eq!(keeper.last_observed_event_nonce(&ctx), 3);
        assert_eq!(
            keeper.latest_counterparty_height(&ctx).counterparty_height,
            1_080
        );
    }

    Ok(())
}
