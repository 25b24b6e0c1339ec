// Copyright (c) EVM Bridge Contributors
// SPDX-License-Identifier: Apache-2.0

//! The validator signature scheme: 65-byte recoverable ECDSA over
//! secp256k1, over `keccak256("\x19Ethereum Signed Message:\n32" ||
//! checkpoint)`. Verification recovers the signer's EVM address rather
//! than taking a public key, matching what the counterparty contract
//! does with `ecrecover`.

use crate::encoding::{eth_signed_message_bytes, eth_signed_message_digest};
use crate::error::{BridgeError, BridgeResult};
use crate::otx::OutgoingTx;
use ethers::core::k256::ecdsa::VerifyingKey;
use ethers::core::k256::elliptic_curve::sec1::ToEncodedPoint;
use ethers::types::{Address as EthAddress, RecoveryMessage, Signature};
use fastcrypto::hash::{HashFunction, Keccak256};
use fastcrypto::secp256k1::{Secp256k1KeyPair, Secp256k1PublicKey};
use fastcrypto::traits::{KeyPair, RecoverableSigner, ToFromBytes};

pub type BridgeSignerKeyPair = Secp256k1KeyPair;
pub type BridgeSignerPublicKey = Secp256k1PublicKey;

pub const RECOVERABLE_SIGNATURE_LENGTH: usize = 65;

/// Derives the EVM address of a secp256k1 public key: the low 20 bytes
/// of the keccak256 of the uncompressed point.
pub fn evm_address_from_pubkey(pubkey: &BridgeSignerPublicKey) -> EthAddress {
    // unwrap: fastcrypto only hands out valid sec1 encodings
    let verifying_key = VerifyingKey::from_sec1_bytes(pubkey.as_bytes()).unwrap();
    let affine: &ethers::core::k256::AffinePoint = verifying_key.as_ref();
    let encoded = affine.to_encoded_point(false);
    let uncompressed = &encoded.as_bytes()[1..];
    let hash = Keccak256::digest(uncompressed).digest;
    EthAddress::from_slice(&hash[12..])
}

/// Signs an outgoing transaction's checkpoint, returning the 65-byte
/// `r || s || v` signature the counterparty contract can recover.
pub fn sign_outgoing_tx(otx: &OutgoingTx, keypair: &BridgeSignerKeyPair) -> Vec<u8> {
    let message = eth_signed_message_bytes(&otx.checkpoint());
    keypair
        .sign_recoverable_with_hash::<Keccak256>(&message)
        .as_bytes()
        .to_vec()
}

pub fn evm_address_of_keypair(keypair: &BridgeSignerKeyPair) -> EthAddress {
    evm_address_from_pubkey(keypair.public())
}

/// Verifies a confirmation signature over an outgoing transaction,
/// requiring recovery to the expected EVM address.
pub fn verify_outgoing_tx_signature(
    otx: &OutgoingTx,
    expected_signer: EthAddress,
    signature: &[u8],
) -> BridgeResult<()> {
    if signature.len() != RECOVERABLE_SIGNATURE_LENGTH {
        return Err(BridgeError::InvalidSignature(format!(
            "expected {} bytes, got {}",
            RECOVERABLE_SIGNATURE_LENGTH,
            signature.len()
        )));
    }

    let signature = Signature::try_from(signature)
        .map_err(|e| BridgeError::InvalidSignature(e.to_string()))?;
    let digest = eth_signed_message_digest(&otx.checkpoint());
    let recovered = signature
        .recover(RecoveryMessage::Hash(digest.into()))
        .map_err(|e| BridgeError::InvalidSignature(e.to_string()))?;

    if recovered != expected_signer {
        return Err(BridgeError::InvalidSignature(format!(
            "signature recovered to {recovered:?}, expected {expected_signer:?}"
        )));
    }
    Ok(())
}
