// Copyright (c) EVM Bridge Contributors
// SPDX-License-Identifier: Apache-2.0

//! The outgoing-transaction (OTX) sum: batches of transfers, arbitrary
//! contract calls and signer-set updates, all sharing one registry via
//! their store index.

use crate::base_types::ChainAddress;
use crate::encoding::CheckpointEncoding;
use crate::keys;
use enum_dispatch::enum_dispatch;
use ethers::types::{Address as EthAddress, U256};
use serde::{Deserialize, Serialize};

/// An amount of a counterparty ERC20 token.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Erc20Token {
    pub contract: EthAddress,
    pub amount: U256,
}

impl Erc20Token {
    pub fn new(contract: EthAddress, amount: U256) -> Self {
        Self { contract, amount }
    }
}

/// An individual outbound transfer. Lives in the pool until selected
/// into a batch; the amount and fee are escrowed in the module account
/// for its whole lifetime.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendToEvm {
    pub id: u64,
    pub sender: ChainAddress,
    pub evm_recipient: EthAddress,
    pub erc20_token: Erc20Token,
    pub erc20_fee: Erc20Token,
}

impl SendToEvm {
    pub fn new(
        id: u64,
        token_contract: EthAddress,
        sender: ChainAddress,
        evm_recipient: EthAddress,
        amount: u64,
        fee: u64,
    ) -> Self {
        Self {
            id,
            sender,
            evm_recipient,
            erc20_token: Erc20Token::new(token_contract, U256::from(amount)),
            erc20_fee: Erc20Token::new(token_contract, U256::from(fee)),
        }
    }
}

/// A bundle of transfers of a single token, executed by the counterparty
/// contract as one transaction. Nonces are strictly ascending per token.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchTx {
    pub batch_nonce: u64,
    pub token_contract: EthAddress,
    pub height: u64,
    pub timeout: u64,
    pub transactions: Vec<SendToEvm>,
}

/// An arbitrary counterparty contract call. Nonces are namespaced by the
/// opaque invalidation scope: executing a call retires every older call
/// in the same scope.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractCallTx {
    pub invalidation_nonce: u64,
    pub invalidation_scope: Vec<u8>,
    pub address: EthAddress,
    pub payload: Vec<u8>,
    pub timeout: u64,
    pub tokens: Vec<Erc20Token>,
    pub fees: Vec<Erc20Token>,
    pub height: u64,
}

/// One entry of a signer set: a validator's delegated EVM address and
/// its normalized power in `[0, 2^32)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterpartySigner {
    pub power: u64,
    pub evm_address: EthAddress,
}

/// The weighted validator set as the counterparty contract should see
/// it. Signers are kept sorted by descending power (ties broken by
/// address) so the checkpoint digest is canonical.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignerSetTx {
    pub nonce: u64,
    pub height: u64,
    pub signers: Vec<CounterpartySigner>,
}

#[enum_dispatch]
pub trait OutgoingTxKind {
    /// The store index that is this transaction's identity.
    fn store_index(&self) -> Vec<u8>;
}

impl OutgoingTxKind for BatchTx {
    fn store_index(&self) -> Vec<u8> {
        keys::make_batch_tx_index(self.token_contract, self.batch_nonce)
    }
}

impl OutgoingTxKind for ContractCallTx {
    fn store_index(&self) -> Vec<u8> {
        keys::make_contract_call_tx_index(&self.invalidation_scope, self.invalidation_nonce)
    }
}

impl OutgoingTxKind for SignerSetTx {
    fn store_index(&self) -> Vec<u8> {
        keys::make_signer_set_tx_index(self.nonce)
    }
}

#[enum_dispatch(OutgoingTxKind, CheckpointEncoding)]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutgoingTx {
    Batch(BatchTx),
    ContractCall(ContractCallTx),
    SignerSet(SignerSetTx),
}

/// Stable ascending-nonce ordering for batches collected from the
/// store. Batches of one token already iterate in nonce order; this
/// pins the order across tokens and tolerates duplicate nonces.
pub fn order_batches_by_nonce_ascending(mut batches: Vec<BatchTx>) -> Vec<BatchTx> {
    batches.sort_by_key(|batch| batch.batch_nonce);
    batches
}

/// Stable ascending-nonce ordering for contract calls.
pub fn order_contract_calls_by_nonce_ascending(
    mut calls: Vec<ContractCallTx>,
) -> Vec<ContractCallTx> {
    calls.sort_by_key(|call| call.invalidation_nonce);
    calls
}
