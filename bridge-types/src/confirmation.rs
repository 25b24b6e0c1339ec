// Copyright (c) EVM Bridge Contributors
// SPDX-License-Identifier: Apache-2.0

//! Validator confirmations: a recoverable signature over an outgoing
//! transaction's checkpoint, keyed by the OTX store index it confirms.
//! Relayers collect these until the signatures cover a supermajority of
//! the signer set, then submit the OTX to the counterparty contract.

use crate::keys;
use enum_dispatch::enum_dispatch;
use ethers::types::Address as EthAddress;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchTxConfirmation {
    pub token_contract: EthAddress,
    pub batch_nonce: u64,
    pub evm_signer: EthAddress,
    pub signature: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractCallTxConfirmation {
    pub invalidation_scope: Vec<u8>,
    pub invalidation_nonce: u64,
    pub evm_signer: EthAddress,
    pub signature: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignerSetTxConfirmation {
    pub signer_set_nonce: u64,
    pub evm_signer: EthAddress,
    pub signature: Vec<u8>,
}

#[enum_dispatch]
pub trait ConfirmationKind {
    /// Store index of the outgoing transaction being confirmed.
    fn store_index(&self) -> Vec<u8>;
    fn evm_signer(&self) -> EthAddress;
    fn signature(&self) -> &[u8];
}

impl ConfirmationKind for BatchTxConfirmation {
    fn store_index(&self) -> Vec<u8> {
        keys::make_batch_tx_index(self.token_contract, self.batch_nonce)
    }

    fn evm_signer(&self) -> EthAddress {
        self.evm_signer
    }

    fn signature(&self) -> &[u8] {
        &self.signature
    }
}

impl ConfirmationKind for ContractCallTxConfirmation {
    fn store_index(&self) -> Vec<u8> {
        keys::make_contract_call_tx_index(&self.invalidation_scope, self.invalidation_nonce)
    }

    fn evm_signer(&self) -> EthAddress {
        self.evm_signer
    }

    fn signature(&self) -> &[u8] {
        &self.signature
    }
}

impl ConfirmationKind for SignerSetTxConfirmation {
    fn store_index(&self) -> Vec<u8> {
        keys::make_signer_set_tx_index(self.signer_set_nonce)
    }

    fn evm_signer(&self) -> EthAddress {
        self.evm_signer
    }

    fn signature(&self) -> &[u8] {
        &self.signature
    }
}

#[enum_dispatch(ConfirmationKind)]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Confirmation {
    Batch(BatchTxConfirmation),
    ContractCall(ContractCallTxConfirmation),
    SignerSet(SignerSetTxConfirmation),
}
