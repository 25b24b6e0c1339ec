// Copyright (c) EVM Bridge Contributors
// SPDX-License-Identifier: Apache-2.0

//! Core state machine of the EVM bridge module. Everything here runs
//! strictly sequentially inside the host chain's block pipeline: message
//! handlers mutate the persistent key-value store, per-block hooks run
//! the batch timeout, slashing and signer-set scans, and determinism
//! across replicas is a hard requirement.

pub mod attestation;
pub mod batch;
pub mod block;
pub mod contract_call;
pub mod event_handler;
pub mod external;
pub mod governance;
pub mod keeper;
pub mod msgs;
pub mod params;
pub mod pool;
pub mod signer_set;
pub mod slashing;
pub mod store;

#[cfg(test)]
pub mod test_utils;

#[cfg(test)]
mod happy_path;

/// Name of the module account holding escrowed and minted funds.
pub const MODULE_NAME: &str = "evmbridge";

/// Prefix of voucher denoms for counterparty-originated tokens. The
/// full denom embeds the ERC20 contract: `evmbridge/0x…`.
pub const VOUCHER_DENOM_PREFIX: &str = "evmbridge/";
