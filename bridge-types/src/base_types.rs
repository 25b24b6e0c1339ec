// Copyright (c) EVM Bridge Contributors
// SPDX-License-Identifier: Apache-2.0

use crate::error::{BridgeError, BridgeResult};
use ethers::types::U256;
use fastcrypto::encoding::{Encoding, Hex};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const CHAIN_ADDRESS_LENGTH: usize = 20;

macro_rules! chain_address_type {
    ($name:ident, $doc:literal) => {
        #[doc = $doc]
        #[derive(
            Clone,
            Copy,
            Default,
            PartialEq,
            Eq,
            PartialOrd,
            Ord,
            Hash,
            Serialize,
            Deserialize,
        )]
        pub struct $name(pub [u8; CHAIN_ADDRESS_LENGTH]);

        impl $name {
            pub fn new(bytes: [u8; CHAIN_ADDRESS_LENGTH]) -> Self {
                Self(bytes)
            }

            pub fn as_bytes(&self) -> &[u8] {
                &self.0
            }

            pub fn from_slice(bytes: &[u8]) -> BridgeResult<Self> {
                if bytes.len() != CHAIN_ADDRESS_LENGTH {
                    return Err(BridgeError::InvalidAddress(format!(
                        "expected {} bytes, got {}",
                        CHAIN_ADDRESS_LENGTH,
                        bytes.len()
                    )));
                }
                let mut out = [0u8; CHAIN_ADDRESS_LENGTH];
                out.copy_from_slice(bytes);
                Ok(Self(out))
            }

            pub fn repeat_byte(byte: u8) -> Self {
                Self([byte; CHAIN_ADDRESS_LENGTH])
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "0x{}", Hex::encode(self.0))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "(0x{})"), Hex::encode(self.0))
            }
        }

        impl FromStr for $name {
            type Err = BridgeError;

            fn from_str(s: &str) -> BridgeResult<Self> {
                let bytes = Hex::decode(s)
                    .map_err(|e| BridgeError::InvalidAddress(format!("{s}: {e}")))?;
                Self::from_slice(&bytes)
            }
        }
    };
}

chain_address_type!(ChainAddress, "A chain account address (20 bytes).");
chain_address_type!(
    ValidatorAddress,
    "A validator operator address (20 bytes)."
);

/// An amount of a chain-native denomination.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coin {
    pub denom: String,
    pub amount: U256,
}

impl Coin {
    pub fn new(denom: impl Into<String>, amount: impl Into<U256>) -> Self {
        Self {
            denom: denom.into(),
            amount: amount.into(),
        }
    }
}

impl fmt::Display for Coin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.amount, self.denom)
    }
}

/// One named denomination unit of a denom, e.g. the display unit with
/// its decimal exponent.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DenomUnit {
    pub denom: String,
    pub exponent: u32,
}

/// Chain-side denom metadata, as maintained by the asset keeper. May be
/// absent for externally originated (e.g. IBC-style) tokens.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DenomMetadata {
    pub base: String,
    pub display: String,
    pub denom_units: Vec<DenomUnit>,
}

impl DenomMetadata {
    /// The ERC20 decimals implied by this metadata: the exponent of the
    /// denom unit whose name matches the display denom, defaulting to 0
    /// when no unit matches.
    pub fn display_decimals(&self) -> u32 {
        self.denom_units
            .iter()
            .find(|unit| unit.denom == self.display)
            .map(|unit| unit.exponent)
            .unwrap_or(0)
    }
}
