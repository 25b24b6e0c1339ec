// Copyright (c) EVM Bridge Contributors
// SPDX-License-Identifier: Apache-2.0

//! Bit-exact store key layout. Every key starts with a single-byte
//! discriminator followed by fixed- or variable-length fields
//! concatenated without separators. The layout is consensus-critical:
//! iteration order over the backing store must be identical on every
//! replica.

use crate::base_types::ValidatorAddress;
use crate::otx::Erc20Token;
use ethers::types::{Address as EthAddress, U256};

pub const LAST_SEND_TO_EVM_ID_KEY: u8 = 0x01;
pub const SEND_TO_EVM_KEY: u8 = 0x02;
pub const SEND_TO_EVM_ID_INDEX_KEY: u8 = 0x03;
pub const LAST_BATCH_NONCE_KEY: u8 = 0x04;
pub const OUTGOING_TX_KEY: u8 = 0x05;
pub const CONFIRMATION_KEY: u8 = 0x06;
pub const COMPLETED_OUTGOING_TX_KEY: u8 = 0x07;
pub const ATTESTATION_KEY: u8 = 0x08;
pub const DENOM_TO_ERC20_KEY: u8 = 0x09;
pub const ERC20_TO_DENOM_KEY: u8 = 0x0a;
pub const LAST_OBSERVED_EVENT_NONCE_KEY: u8 = 0x0b;
pub const LAST_OBSERVED_COUNTERPARTY_HEIGHT_KEY: u8 = 0x0c;
pub const LAST_SLASHED_OUTGOING_TX_HEIGHT_KEY: u8 = 0x0d;
pub const LAST_SLASHED_SIGNER_SET_NONCE_KEY: u8 = 0x0e;
pub const LAST_CREATED_SIGNER_SET_NONCE_KEY: u8 = 0x0f;
pub const LATEST_SIGNER_SET_KEY: u8 = 0x10;
pub const LAST_OBSERVED_SIGNER_SET_NONCE_KEY: u8 = 0x11;
pub const PARAMS_KEY: u8 = 0x12;

// Second byte under OUTGOING_TX_KEY / COMPLETED_OUTGOING_TX_KEY,
// selecting the outgoing-tx variant. Part of the store index.
pub const BATCH_TX_PREFIX: u8 = 0x01;
pub const CONTRACT_CALL_TX_PREFIX: u8 = 0x02;
pub const SIGNER_SET_TX_PREFIX: u8 = 0x03;

/// Pool entry key: `0x02 || token(20) || be(U256::MAX - fee, 32) ||
/// be(u64::MAX - id, 8)`. Complementing both fields makes ascending
/// store order equal to `(fee desc, id desc)`, so batch selection never
/// sorts in memory and matches the counterparty payout order.
pub fn make_send_to_evm_key(id: u64, fee: &Erc20Token) -> Vec<u8> {
    let mut fee_complement = [0u8; 32];
    (U256::MAX - fee.amount).to_big_endian(&mut fee_complement);
    let mut key = Vec::with_capacity(1 + 20 + 32 + 8);
    key.push(SEND_TO_EVM_KEY);
    key.extend_from_slice(fee.contract.as_bytes());
    key.extend_from_slice(&fee_complement);
    key.extend_from_slice(&(u64::MAX - id).to_be_bytes());
    key
}

/// Prefix covering every pool entry of one token.
pub fn make_send_to_evm_token_prefix(token: EthAddress) -> Vec<u8> {
    let mut key = Vec::with_capacity(1 + 20);
    key.push(SEND_TO_EVM_KEY);
    key.extend_from_slice(token.as_bytes());
    key
}

/// Secondary index `0x03 || be(id, 8)`, pointing at the fee-ordered
/// pool key. Needed to cancel a transfer by id without scanning.
pub fn make_send_to_evm_id_index_key(id: u64) -> Vec<u8> {
    let mut key = Vec::with_capacity(1 + 8);
    key.push(SEND_TO_EVM_ID_INDEX_KEY);
    key.extend_from_slice(&id.to_be_bytes());
    key
}

pub fn make_last_batch_nonce_key(token: EthAddress) -> Vec<u8> {
    let mut key = Vec::with_capacity(1 + 20);
    key.push(LAST_BATCH_NONCE_KEY);
    key.extend_from_slice(token.as_bytes());
    key
}

/// Store index of a batch: `0x01 || token(20) || be(nonce, 8)`. Batches
/// of one token share a prefix, so store order is nonce order.
pub fn make_batch_tx_index(token: EthAddress, nonce: u64) -> Vec<u8> {
    let mut index = Vec::with_capacity(1 + 20 + 8);
    index.push(BATCH_TX_PREFIX);
    index.extend_from_slice(token.as_bytes());
    index.extend_from_slice(&nonce.to_be_bytes());
    index
}

/// Store index of a contract call: `0x02 || scope || be(nonce, 8)`.
pub fn make_contract_call_tx_index(invalidation_scope: &[u8], invalidation_nonce: u64) -> Vec<u8> {
    let mut index = Vec::with_capacity(1 + invalidation_scope.len() + 8);
    index.push(CONTRACT_CALL_TX_PREFIX);
    index.extend_from_slice(invalidation_scope);
    index.extend_from_slice(&invalidation_nonce.to_be_bytes());
    index
}

/// Store index of a signer set: `0x03 || be(nonce, 8)`.
pub fn make_signer_set_tx_index(nonce: u64) -> Vec<u8> {
    let mut index = Vec::with_capacity(1 + 8);
    index.push(SIGNER_SET_TX_PREFIX);
    index.extend_from_slice(&nonce.to_be_bytes());
    index
}

pub fn make_outgoing_tx_key(store_index: &[u8]) -> Vec<u8> {
    let mut key = Vec::with_capacity(1 + store_index.len());
    key.push(OUTGOING_TX_KEY);
    key.extend_from_slice(store_index);
    key
}

pub fn make_completed_outgoing_tx_key(store_index: &[u8]) -> Vec<u8> {
    let mut key = Vec::with_capacity(1 + store_index.len());
    key.push(COMPLETED_OUTGOING_TX_KEY);
    key.extend_from_slice(store_index);
    key
}

/// Confirmation key: `0x06 || store_index || validator(20)`. The
/// trailing fixed-width validator address lets one prefix scan collect
/// every signer of an outgoing tx.
pub fn make_confirmation_key(store_index: &[u8], validator: &ValidatorAddress) -> Vec<u8> {
    let mut key = Vec::with_capacity(1 + store_index.len() + 20);
    key.push(CONFIRMATION_KEY);
    key.extend_from_slice(store_index);
    key.extend_from_slice(validator.as_bytes());
    key
}

pub fn make_confirmation_prefix(store_index: &[u8]) -> Vec<u8> {
    let mut key = Vec::with_capacity(1 + store_index.len());
    key.push(CONFIRMATION_KEY);
    key.extend_from_slice(store_index);
    key
}

/// Attestation key: `0x08 || be(event_nonce, 8) || hash(32)`. Scanning
/// the nonce prefix yields every competing hash at that nonce in
/// deterministic (hash) order.
pub fn make_attestation_key(event_nonce: u64, event_hash: [u8; 32]) -> Vec<u8> {
    let mut key = Vec::with_capacity(1 + 8 + 32);
    key.push(ATTESTATION_KEY);
    key.extend_from_slice(&event_nonce.to_be_bytes());
    key.extend_from_slice(&event_hash);
    key
}

pub fn make_attestation_nonce_prefix(event_nonce: u64) -> Vec<u8> {
    let mut key = Vec::with_capacity(1 + 8);
    key.push(ATTESTATION_KEY);
    key.extend_from_slice(&event_nonce.to_be_bytes());
    key
}

pub fn make_denom_to_erc20_key(denom: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(1 + denom.len());
    key.push(DENOM_TO_ERC20_KEY);
    key.extend_from_slice(denom.as_bytes());
    key
}

pub fn make_erc20_to_denom_key(token: EthAddress) -> Vec<u8> {
    let mut key = Vec::with_capacity(1 + 20);
    key.push(ERC20_TO_DENOM_KEY);
    key.extend_from_slice(token.as_bytes());
    key
}
