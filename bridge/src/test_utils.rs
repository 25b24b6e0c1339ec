// Copyright (c) EVM Bridge Contributors
// SPDX-License-Identifier: Apache-2.0

//! Shared test environment: an in-memory store plus mock asset,
//! staking and slashing keepers wired into a keeper, and the literal
//! token/sender/receiver fixtures used across the module tests.

use crate::external::{AssetKeeper, SlashingHooks, StakingKeeper, ValidatorPower};
use crate::keeper::{voucher_denom, Context, Keeper};
use crate::params::BridgeParams;
use crate::store::MemStore;
use ethers::types::{Address as EthAddress, U256};
use evm_bridge_types::base_types::{ChainAddress, Coin, DenomMetadata, ValidatorAddress};
use evm_bridge_types::crypto::{evm_address_of_keypair, BridgeSignerKeyPair};
use evm_bridge_types::error::{BridgeError, BridgeResult};
use evm_bridge_types::events::{CounterpartyEvent, SendToChainEvent};
use fastcrypto::traits::KeyPair;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::BTreeMap;
use std::str::FromStr;

pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_test_writer()
        .try_init();
}

pub fn test_token() -> EthAddress {
    EthAddress::from_str("0x429881672B9AE42b8EbA0E26cD9C73711b891Ca5").unwrap()
}

pub fn test_receiver() -> EthAddress {
    EthAddress::from_str("0xd041c41EA1bf0F006ADBb6d2c9ef9D425dE5eaD7").unwrap()
}

pub fn test_sender() -> ChainAddress {
    ChainAddress::repeat_byte(0xab)
}

pub fn voucher_coin(amount: u64) -> Coin {
    Coin::new(voucher_denom(test_token()), amount)
}

pub fn send_to_chain_event(event_nonce: u64, amount: u64) -> CounterpartyEvent {
    CounterpartyEvent::SendToChain(SendToChainEvent {
        event_nonce,
        counterparty_height: 1_000 + event_nonce,
        token_contract: test_token(),
        amount: U256::from(amount),
        evm_sender: EthAddress::repeat_byte(0x05),
        receiver: test_sender(),
    })
}

/// A test validator identified by a fixed keypair seed. The keypair is
/// re-derived on demand so the struct stays cheap to clone.
#[derive(Clone, Debug)]
pub struct TestValidator {
    pub operator: ValidatorAddress,
    pub seed: u8,
}

impl TestValidator {
    pub fn keypair(&self) -> BridgeSignerKeyPair {
        BridgeSignerKeyPair::generate(&mut StdRng::from_seed([self.seed; 32]))
    }

    pub fn evm_address(&self) -> EthAddress {
        evm_address_of_keypair(&self.keypair())
    }
}

#[derive(Debug, Default)]
pub struct MockAssetKeeper {
    balances: BTreeMap<(ChainAddress, String), U256>,
    module_balances: BTreeMap<(String, String), U256>,
    supplies: BTreeMap<String, U256>,
    metadata: BTreeMap<String, DenomMetadata>,
    community_pool: BTreeMap<String, U256>,
}

impl MockAssetKeeper {
    pub fn balance_of(&self, account: &ChainAddress, denom: &str) -> U256 {
        self.balances
            .get(&(*account, denom.to_string()))
            .copied()
            .unwrap_or_default()
    }

    pub fn module_balance_of(&self, module: &str, denom: &str) -> U256 {
        self.module_balances
            .get(&(module.to_string(), denom.to_string()))
            .copied()
            .unwrap_or_default()
    }

    /// Credits an account and grows the supply, like a genesis mint.
    pub fn fund_account(&mut self, account: ChainAddress, denom: &str, amount: u64) {
        *self
            .balances
            .entry((account, denom.to_string()))
            .or_default() += U256::from(amount);
        *self.supplies.entry(denom.to_string()).or_default() += U256::from(amount);
    }

    /// Credits a module account and grows the supply.
    pub fn fund_module(&mut self, module: &str, denom: &str, amount: u64) {
        *self
            .module_balances
            .entry((module.to_string(), denom.to_string()))
            .or_default() += U256::from(amount);
        *self.supplies.entry(denom.to_string()).or_default() += U256::from(amount);
    }

    pub fn fund_community_pool(&mut self, denom: &str, amount: u64) {
        *self.community_pool.entry(denom.to_string()).or_default() += U256::from(amount);
        *self.supplies.entry(denom.to_string()).or_default() += U256::from(amount);
    }

    pub fn set_supply(&mut self, denom: &str, supply: U256) {
        self.supplies.insert(denom.to_string(), supply);
    }

    pub fn set_metadata(&mut self, denom: &str, metadata: DenomMetadata) {
        self.metadata.insert(denom.to_string(), metadata);
    }
}

impl AssetKeeper for MockAssetKeeper {
    fn mint(&mut self, module: &str, coin: &Coin) -> BridgeResult<()> {
        let supply = self.supplies.entry(coin.denom.clone()).or_default();
        *supply = supply.checked_add(coin.amount).ok_or_else(|| {
            BridgeError::SupplyOverflow(format!("mint overflows supply of {}", coin.denom))
        })?;
        *self
            .module_balances
            .entry((module.to_string(), coin.denom.clone()))
            .or_default() += coin.amount;
        Ok(())
    }

    fn burn(&mut self, module: &str, coin: &Coin) -> BridgeResult<()> {
        let balance = self
            .module_balances
            .entry((module.to_string(), coin.denom.clone()))
            .or_default();
        if *balance < coin.amount {
            return Err(BridgeError::InsufficientBalance(format!(
                "module {module} holds {balance} {}",
                coin.denom
            )));
        }
        *balance -= coin.amount;
        let supply = self.supplies.entry(coin.denom.clone()).or_default();
        *supply -= coin.amount;
        Ok(())
    }

    fn send_from_account_to_module(
        &mut self,
        sender: &ChainAddress,
        module: &str,
        coin: &Coin,
    ) -> BridgeResult<()> {
        let balance = self
            .balances
            .entry((*sender, coin.denom.clone()))
            .or_default();
        if *balance < coin.amount {
            return Err(BridgeError::InsufficientBalance(format!(
                "{sender} holds {balance} {}",
                coin.denom
            )));
        }
        *balance -= coin.amount;
        *self
            .module_balances
            .entry((module.to_string(), coin.denom.clone()))
            .or_default() += coin.amount;
        Ok(())
    }

    fn send_from_module_to_account(
        &mut self,
        module: &str,
        receiver: &ChainAddress,
        coin: &Coin,
    ) -> BridgeResult<()> {
        let balance = self
            .module_balances
            .entry((module.to_string(), coin.denom.clone()))
            .or_default();
        if *balance < coin.amount {
            return Err(BridgeError::InsufficientBalance(format!(
                "module {module} holds {balance} {}",
                coin.denom
            )));
        }
        *balance -= coin.amount;
        *self
            .balances
            .entry((*receiver, coin.denom.clone()))
            .or_default() += coin.amount;
        Ok(())
    }

    fn send_from_module_to_module(
        &mut self,
        from_module: &str,
        to_module: &str,
        coin: &Coin,
    ) -> BridgeResult<()> {
        let balance = self
            .module_balances
            .entry((from_module.to_string(), coin.denom.clone()))
            .or_default();
        if *balance < coin.amount {
            return Err(BridgeError::InsufficientBalance(format!(
                "module {from_module} holds {balance} {}",
                coin.denom
            )));
        }
        *balance -= coin.amount;
        *self
            .module_balances
            .entry((to_module.to_string(), coin.denom.clone()))
            .or_default() += coin.amount;
        Ok(())
    }

    fn supply_of(&self, denom: &str) -> U256 {
        self.supplies.get(denom).copied().unwrap_or_default()
    }

    fn denom_metadata(&self, denom: &str) -> Option<DenomMetadata> {
        self.metadata.get(denom).cloned()
    }

    fn spend_community_pool(&mut self, to_module: &str, coin: &Coin) -> BridgeResult<()> {
        let pooled = self.community_pool.entry(coin.denom.clone()).or_default();
        if *pooled < coin.amount {
            return Err(BridgeError::InsufficientBalance(format!(
                "community pool holds {pooled} {}",
                coin.denom
            )));
        }
        *pooled -= coin.amount;
        *self
            .module_balances
            .entry((to_module.to_string(), coin.denom.clone()))
            .or_default() += coin.amount;
        Ok(())
    }

    fn community_pool_account(&self) -> ChainAddress {
        ChainAddress::repeat_byte(0xcc)
    }
}

#[derive(Debug, Default)]
pub struct MockStakingKeeper {
    pub validators: Vec<ValidatorPower>,
}

impl StakingKeeper for MockStakingKeeper {
    fn current_validator_set(&self) -> Vec<ValidatorPower> {
        self.validators.clone()
    }

    fn bonded_validators_at(&self, _height: u64) -> Vec<ValidatorAddress> {
        self.validators.iter().map(|entry| entry.operator).collect()
    }

    fn evm_address_of(&self, validator: &ValidatorAddress) -> Option<EthAddress> {
        self.validators
            .iter()
            .find(|entry| &entry.operator == validator)
            .map(|entry| entry.evm_address)
    }
}

#[derive(Debug, Default)]
pub struct MockSlashingHooks {
    pub no_confirm_reports: Vec<(ValidatorAddress, Vec<u8>)>,
    pub wrong_attestation_reports: Vec<(ValidatorAddress, u64)>,
}

impl SlashingHooks for MockSlashingHooks {
    fn report_no_confirm(&mut self, validator: &ValidatorAddress, store_index: &[u8]) {
        self.no_confirm_reports
            .push((*validator, store_index.to_vec()));
    }

    fn report_wrong_attestation(&mut self, validator: &ValidatorAddress, event_nonce: u64) {
        self.wrong_attestation_reports
            .push((*validator, event_nonce));
    }
}

pub type TestKeeper = Keeper<MockAssetKeeper, MockStakingKeeper, MockSlashingHooks>;

pub struct TestEnv {
    pub store: MemStore,
    pub keeper: TestKeeper,
    pub validators: Vec<TestValidator>,
    pub height: u64,
}

impl TestEnv {
    /// Three equal-power validators, an empty store, and the default
    /// parameters.
    pub fn new() -> Self {
        let validators: Vec<TestValidator> = (1u8..=3)
            .map(|seed| TestValidator {
                operator: ValidatorAddress::repeat_byte(0x10 + seed),
                seed,
            })
            .collect();

        let staking = MockStakingKeeper {
            validators: validators
                .iter()
                .map(|validator| ValidatorPower {
                    operator: validator.operator,
                    evm_address: validator.evm_address(),
                    power: 1_000,
                })
                .collect(),
        };

        Self {
            store: MemStore::new(),
            keeper: Keeper::new(
                MockAssetKeeper::default(),
                staking,
                MockSlashingHooks::default(),
            ),
            validators,
            height: 1_234_567,
        }
    }

    /// A fresh context over the env's store at the current height,
    /// alongside the keeper. The borrows are disjoint fields, so both
    /// can be used together.
    pub fn split(&mut self) -> (Context<'_>, &mut TestKeeper) {
        (
            Context::new(&mut self.store, self.height),
            &mut self.keeper,
        )
    }

    pub fn params(&mut self) -> BridgeParams {
        let (ctx, keeper) = self.split();
        keeper.params(&ctx)
    }

    pub fn voucher_denom(&self) -> String {
        voucher_denom(test_token())
    }

    /// Mints vouchers of the test token to an account, like the "mint
    /// some voucher first" preamble of the reference tests.
    pub fn mint_vouchers(&mut self, account: ChainAddress, amount: u64) {
        let denom = self.voucher_denom();
        self.keeper.assets.fund_account(account, &denom, amount);
    }

    /// Seeds the pool with one transfer per fee: amounts 100, 101, …
    /// against the given fees, from the test sender to the test
    /// receiver.
    pub fn add_send_to_evm_txs_to_pool(&mut self, fees: &[u64]) {
        let entries: Vec<(u64, u64)> = fees
            .iter()
            .enumerate()
            .map(|(i, fee)| (100 + i as u64, *fee))
            .collect();
        self.add_send_to_evm_txs_to_pool_with_amounts(&entries);
    }

    pub fn add_send_to_evm_txs_to_pool_with_amounts(&mut self, entries: &[(u64, u64)]) {
        let denom = self.voucher_denom();
        let (mut ctx, keeper) = self.split();
        for (amount, fee) in entries {
            keeper
                .create_send_to_evm(
                    &mut ctx,
                    test_sender(),
                    test_receiver(),
                    Coin::new(denom.clone(), *amount),
                    Coin::new(denom.clone(), *fee),
                )
                .expect("failed to seed pool transfer");
        }
    }
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}
