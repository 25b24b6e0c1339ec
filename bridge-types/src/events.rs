// Copyright (c) EVM Bridge Contributors
// SPDX-License-Identifier: Apache-2.0

//! Counterparty events, as relayed by validators in `MsgSubmitEvent`.
//! Every event carries the globally monotonic nonce the counterparty
//! contract assigned to it and the counterparty block height it was
//! emitted at. The canonical keccak256 hash over the declared fields is
//! the attestation key: validators voting for byte-identical events
//! vote for the same hash.

use crate::base_types::ChainAddress;
use crate::error::{BridgeError, BridgeResult};
use enum_dispatch::enum_dispatch;
use ethers::types::{Address as EthAddress, U256};
use fastcrypto::hash::{HashFunction, Keccak256};
use num_enum::TryFromPrimitive;
use serde::{Deserialize, Serialize};
use strum_macros::Display;

#[derive(
    Clone, Copy, Debug, Display, PartialEq, Eq, Hash, TryFromPrimitive, Serialize, Deserialize,
)]
#[repr(u8)]
pub enum EventType {
    SendToChain = 0x01,
    BatchExecuted = 0x02,
    ContractCallExecuted = 0x03,
    Erc20Deployed = 0x04,
    SignerSetExecuted = 0x05,
}

/// A deposit into the counterparty bridge contract, crediting a chain
/// account with vouchers (or releasing escrowed chain-originated
/// assets).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendToChainEvent {
    pub event_nonce: u64,
    pub counterparty_height: u64,
    pub token_contract: EthAddress,
    pub amount: U256,
    pub evm_sender: EthAddress,
    pub receiver: ChainAddress,
}

/// The counterparty contract executed an outgoing batch.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchExecutedEvent {
    pub event_nonce: u64,
    pub counterparty_height: u64,
    pub token_contract: EthAddress,
    pub batch_nonce: u64,
}

/// The counterparty contract executed an outgoing contract call.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractCallExecutedEvent {
    pub event_nonce: u64,
    pub counterparty_height: u64,
    pub invalidation_scope: Vec<u8>,
    pub invalidation_nonce: u64,
}

/// The counterparty factory deployed an ERC20 representing a
/// chain-originated denom.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Erc20DeployedEvent {
    pub event_nonce: u64,
    pub counterparty_height: u64,
    pub denom: String,
    pub token_contract: EthAddress,
    pub erc20_name: String,
    pub erc20_symbol: String,
    pub erc20_decimals: u64,
}

/// The counterparty contract adopted a new signer set.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignerSetExecutedEvent {
    pub event_nonce: u64,
    pub counterparty_height: u64,
    pub signer_set_nonce: u64,
}

#[enum_dispatch]
pub trait EvmEvent {
    fn event_nonce(&self) -> u64;
    fn counterparty_height(&self) -> u64;
    fn event_type(&self) -> EventType;
    /// Canonical field bytes, hashed (together with nonce, height and
    /// the variant tag) into the attestation key.
    fn field_bytes(&self) -> Vec<u8>;
    /// Wire-form validation; rejected events never reach the
    /// attestation store.
    fn validate(&self) -> BridgeResult<()>;
}

fn put_bytes(out: &mut Vec<u8>, bytes: &[u8]) {
    out.extend_from_slice(&(bytes.len() as u64).to_be_bytes());
    out.extend_from_slice(bytes);
}

impl EvmEvent for SendToChainEvent {
    fn event_nonce(&self) -> u64 {
        self.event_nonce
    }

    fn counterparty_height(&self) -> u64 {
        self.counterparty_height
    }

    fn event_type(&self) -> EventType {
        EventType::SendToChain
    }

    fn field_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(self.token_contract.as_bytes());
        let mut amount = [0u8; 32];
        self.amount.to_big_endian(&mut amount);
        out.extend_from_slice(&amount);
        out.extend_from_slice(self.evm_sender.as_bytes());
        out.extend_from_slice(self.receiver.as_bytes());
        out
    }

    fn validate(&self) -> BridgeResult<()> {
        if self.amount.is_zero() {
            return Err(BridgeError::InvalidEvent(
                "zero-value send to chain".to_string(),
            ));
        }
        Ok(())
    }
}

impl EvmEvent for BatchExecutedEvent {
    fn event_nonce(&self) -> u64 {
        self.event_nonce
    }

    fn counterparty_height(&self) -> u64 {
        self.counterparty_height
    }

    fn event_type(&self) -> EventType {
        EventType::BatchExecuted
    }

    fn field_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(self.token_contract.as_bytes());
        out.extend_from_slice(&self.batch_nonce.to_be_bytes());
        out
    }

    fn validate(&self) -> BridgeResult<()> {
        if self.batch_nonce == 0 {
            return Err(BridgeError::InvalidEvent("zero batch nonce".to_string()));
        }
        Ok(())
    }
}

impl EvmEvent for ContractCallExecutedEvent {
    fn event_nonce(&self) -> u64 {
        self.event_nonce
    }

    fn counterparty_height(&self) -> u64 {
        self.counterparty_height
    }

    fn event_type(&self) -> EventType {
        EventType::ContractCallExecuted
    }

    fn field_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        put_bytes(&mut out, &self.invalidation_scope);
        out.extend_from_slice(&self.invalidation_nonce.to_be_bytes());
        out
    }

    fn validate(&self) -> BridgeResult<()> {
        if self.invalidation_scope.is_empty() {
            return Err(BridgeError::InvalidEvent(
                "empty invalidation scope".to_string(),
            ));
        }
        Ok(())
    }
}

impl EvmEvent for Erc20DeployedEvent {
    fn event_nonce(&self) -> u64 {
        self.event_nonce
    }

    fn counterparty_height(&self) -> u64 {
        self.counterparty_height
    }

    fn event_type(&self) -> EventType {
        EventType::Erc20Deployed
    }

    fn field_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        put_bytes(&mut out, self.denom.as_bytes());
        out.extend_from_slice(self.token_contract.as_bytes());
        put_bytes(&mut out, self.erc20_name.as_bytes());
        put_bytes(&mut out, self.erc20_symbol.as_bytes());
        out.extend_from_slice(&self.erc20_decimals.to_be_bytes());
        out
    }

    fn validate(&self) -> BridgeResult<()> {
        if self.denom.is_empty() {
            return Err(BridgeError::InvalidEvent("empty denom".to_string()));
        }
        Ok(())
    }
}

impl EvmEvent for SignerSetExecutedEvent {
    fn event_nonce(&self) -> u64 {
        self.event_nonce
    }

    fn counterparty_height(&self) -> u64 {
        self.counterparty_height
    }

    fn event_type(&self) -> EventType {
        EventType::SignerSetExecuted
    }

    fn field_bytes(&self) -> Vec<u8> {
        self.signer_set_nonce.to_be_bytes().to_vec()
    }

    fn validate(&self) -> BridgeResult<()> {
        if self.signer_set_nonce == 0 {
            return Err(BridgeError::InvalidEvent(
                "zero signer set nonce".to_string(),
            ));
        }
        Ok(())
    }
}

#[enum_dispatch(EvmEvent)]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CounterpartyEvent {
    SendToChain(SendToChainEvent),
    BatchExecuted(BatchExecutedEvent),
    ContractCallExecuted(ContractCallExecutedEvent),
    Erc20Deployed(Erc20DeployedEvent),
    SignerSetExecuted(SignerSetExecutedEvent),
}

impl CounterpartyEvent {
    /// The attestation key hash: `keccak256(be(event_nonce) ||
    /// be(counterparty_height) || variant_tag || field_bytes)`.
    pub fn hash(&self) -> [u8; 32] {
        let fields = self.field_bytes();
        let mut bytes = Vec::with_capacity(8 + 8 + 1 + fields.len());
        bytes.extend_from_slice(&self.event_nonce().to_be_bytes());
        bytes.extend_from_slice(&self.counterparty_height().to_be_bytes());
        bytes.push(self.event_type() as u8);
        bytes.extend_from_slice(&fields);
        Keccak256::digest(bytes).digest
    }
}
