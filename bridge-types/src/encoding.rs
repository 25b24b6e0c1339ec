// Copyright (c) EVM Bridge Contributors
// SPDX-License-Identifier: Apache-2.0

//! Canonical encodings. Every outgoing transaction has a checkpoint: a
//! 32-byte keccak256 digest of its ABI encoding, which is what
//! validators sign and what the counterparty contract reconstructs to
//! verify those signatures. The encodings here are consensus- and
//! contract-critical; changing a single byte invalidates every
//! signature in flight.

use crate::otx::{BatchTx, ContractCallTx, OutgoingTx, SignerSetTx};
use enum_dispatch::enum_dispatch;
use ethers::abi::Token;
use ethers::types::U256;
use fastcrypto::hash::{HashFunction, Keccak256};

pub const BATCH_TX_CHECKPOINT_METHOD: &[u8] = b"batchTx";
pub const CONTRACT_CALL_TX_CHECKPOINT_METHOD: &[u8] = b"contractCallTx";
pub const SIGNER_SET_TX_CHECKPOINT_METHOD: &[u8] = b"signerSetTx";

const ETHEREUM_SIGNED_MESSAGE_PREFIX: &[u8] = b"\x19Ethereum Signed Message:\n32";

// Method names are embedded as right-padded fixed 32-byte words, the
// way the counterparty contract declares them.
fn method_word(name: &[u8]) -> Token {
    let mut word = vec![0u8; 32];
    word[..name.len()].copy_from_slice(name);
    Token::FixedBytes(word)
}

#[enum_dispatch]
pub trait CheckpointEncoding {
    /// The ABI-encoded body the checkpoint digest is computed over.
    fn checkpoint_bytes(&self) -> Vec<u8>;
}

impl CheckpointEncoding for BatchTx {
    fn checkpoint_bytes(&self) -> Vec<u8> {
        let mut ids = Vec::with_capacity(self.transactions.len());
        let mut amounts = Vec::with_capacity(self.transactions.len());
        let mut destinations = Vec::with_capacity(self.transactions.len());
        let mut fees = Vec::with_capacity(self.transactions.len());
        for tx in &self.transactions {
            ids.push(Token::Uint(U256::from(tx.id)));
            amounts.push(Token::Uint(tx.erc20_token.amount));
            destinations.push(Token::Address(tx.evm_recipient));
            fees.push(Token::Uint(tx.erc20_fee.amount));
        }

        ethers::abi::encode(&[
            method_word(BATCH_TX_CHECKPOINT_METHOD),
            Token::Address(self.token_contract),
            Token::Uint(U256::from(self.batch_nonce)),
            Token::Uint(U256::from(self.timeout)),
            Token::Array(ids),
            Token::Array(amounts),
            Token::Array(destinations),
            Token::Array(fees),
        ])
    }
}

impl CheckpointEncoding for ContractCallTx {
    fn checkpoint_bytes(&self) -> Vec<u8> {
        let token_contracts = self
            .tokens
            .iter()
            .map(|t| Token::Address(t.contract))
            .collect();
        let token_amounts = self.tokens.iter().map(|t| Token::Uint(t.amount)).collect();
        let fee_contracts = self
            .fees
            .iter()
            .map(|t| Token::Address(t.contract))
            .collect();
        let fee_amounts = self.fees.iter().map(|t| Token::Uint(t.amount)).collect();

        ethers::abi::encode(&[
            method_word(CONTRACT_CALL_TX_CHECKPOINT_METHOD),
            Token::Bytes(self.invalidation_scope.clone()),
            Token::Uint(U256::from(self.invalidation_nonce)),
            Token::Address(self.address),
            Token::Bytes(self.payload.clone()),
            Token::Array(token_contracts),
            Token::Array(token_amounts),
            Token::Array(fee_contracts),
            Token::Array(fee_amounts),
            Token::Uint(U256::from(self.timeout)),
        ])
    }
}

impl CheckpointEncoding for SignerSetTx {
    fn checkpoint_bytes(&self) -> Vec<u8> {
        let addresses = self
            .signers
            .iter()
            .map(|s| Token::Address(s.evm_address))
            .collect();
        let powers = self
            .signers
            .iter()
            .map(|s| Token::Uint(U256::from(s.power)))
            .collect();

        ethers::abi::encode(&[
            method_word(SIGNER_SET_TX_CHECKPOINT_METHOD),
            Token::Uint(U256::from(self.nonce)),
            Token::Array(addresses),
            Token::Array(powers),
        ])
    }
}

impl OutgoingTx {
    /// The canonical 32-byte digest of this transaction.
    pub fn checkpoint(&self) -> [u8; 32] {
        Keccak256::digest(self.checkpoint_bytes()).digest
    }
}

/// The raw message a validator signs: the Ethereum signed-message
/// prefix followed by the checkpoint. Hashing this with keccak256
/// yields the digest the counterparty contract recovers against.
pub fn eth_signed_message_bytes(checkpoint: &[u8; 32]) -> Vec<u8> {
    let mut message =
        Vec::with_capacity(ETHEREUM_SIGNED_MESSAGE_PREFIX.len() + checkpoint.len());
    message.extend_from_slice(ETHEREUM_SIGNED_MESSAGE_PREFIX);
    message.extend_from_slice(checkpoint);
    message
}

/// `keccak256("\x19Ethereum Signed Message:\n32" || checkpoint)`.
pub fn eth_signed_message_digest(checkpoint: &[u8; 32]) -> [u8; 32] {
    Keccak256::digest(eth_signed_message_bytes(checkpoint)).digest
}
