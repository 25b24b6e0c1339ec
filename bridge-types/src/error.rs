// Copyright (c) EVM Bridge Contributors
// SPDX-License-Identifier: Apache-2.0

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeError {
    // Sender cannot cover the escrowed amount + fee
    InsufficientBalance(String),
    // Requester is not allowed to perform the operation
    Unauthorized(String),
    // Entity does not exist (or is no longer in the expected subspace)
    NotFound(String),
    // Malformed chain or counterparty address
    InvalidAddress(String),
    // Rejected wire form of a counterparty event
    InvalidEvent(String),
    // Amount/fee coins are malformed or mismatched
    InvalidCoins(String),
    // Attempted to apply an event nonce out of order
    NonceGap { expected: u64, got: u64 },
    // Vote for an event nonce at or below the last observed one
    AlreadyObserved(u64),
    // Inbound mint would push the voucher supply past 2^256
    SupplyOverflow(String),
    // ERC20 deployment event does not match the denom metadata
    InvalidErc20Event(String),
    // Denom has no ERC20 counterpart registered
    DenomNotMapped(String),
    // Confirmation signature does not recover to the validator's EVM key
    InvalidSignature(String),
    // A validator already confirmed this outgoing transaction
    DuplicateConfirmation(String),
    // Rejected parameter set
    ConfigInvalid(String),
    // Uncategorized internal error
    Internal(String),
}

impl BridgeError {
    /// Returns a short string identifying the error kind, stable enough
    /// to key dashboards and log filters on.
    pub fn error_type(&self) -> &'static str {
        match self {
            BridgeError::InsufficientBalance(_) => "insufficient_balance",
            BridgeError::Unauthorized(_) => "unauthorized",
            BridgeError::NotFound(_) => "not_found",
            BridgeError::InvalidAddress(_) => "invalid_address",
            BridgeError::InvalidEvent(_) => "invalid_event",
            BridgeError::InvalidCoins(_) => "invalid_coins",
            BridgeError::NonceGap { .. } => "nonce_gap",
            BridgeError::AlreadyObserved(_) => "already_observed",
            BridgeError::SupplyOverflow(_) => "supply_overflow",
            BridgeError::InvalidErc20Event(_) => "invalid_erc20_event",
            BridgeError::DenomNotMapped(_) => "denom_not_mapped",
            BridgeError::InvalidSignature(_) => "invalid_signature",
            BridgeError::DuplicateConfirmation(_) => "duplicate_confirmation",
            BridgeError::ConfigInvalid(_) => "config_invalid",
            BridgeError::Internal(_) => "internal",
        }
    }
}

pub type BridgeResult<T> = Result<T, BridgeError>;
