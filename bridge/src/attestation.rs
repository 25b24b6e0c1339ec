// Copyright (c) EVM Bridge Contributors
// SPDX-License-Identifier: Apache-2.0

//! Per-event voting. Validators relay counterparty events; votes
//! accumulate per `(event_nonce, event_hash)` until strictly more than
//! two thirds of the current voting power agrees, at which point the
//! event's side effects are applied exactly once, in gap-free nonce
//! order. Competing hashes at one nonce may keep collecting votes but
//! only the first to reach quorum ever executes; voters on losing
//! hashes are reported for slashing.

use crate::external::{AssetKeeper, BridgeHooks, SlashingHooks, StakingKeeper, ValidatorPower};
use crate::keeper::{encode, must_decode, Context, Keeper};
use evm_bridge_types::base_types::ValidatorAddress;
use evm_bridge_types::error::{BridgeError, BridgeResult};
use evm_bridge_types::events::{CounterpartyEvent, EvmEvent};
use evm_bridge_types::keys;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// The voting state of one candidate event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attestation {
    pub observed: bool,
    /// Chain height the first vote arrived at.
    pub height: u64,
    /// Voters in consensus arrival order, deduplicated.
    pub votes: Vec<ValidatorAddress>,
    pub event: CounterpartyEvent,
}

impl<A, S, L, H> Keeper<A, S, L, H>
where
    A: AssetKeeper,
    S: StakingKeeper,
    L: SlashingHooks,
    H: BridgeHooks,
{
    /// Records a validator's vote for an event and applies every event
    /// that a quorum now exists for, in nonce order.
    pub fn record_event_vote(
        &mut self,
        ctx: &mut Context<'_>,
        validator: &ValidatorAddress,
        event: CounterpartyEvent,
    ) -> BridgeResult<()> {
        event.validate()?;

        let validator_set = self.staking.current_validator_set();
        if !validator_set
            .iter()
            .any(|entry| &entry.operator == validator)
        {
            return Err(BridgeError::Unauthorized(format!(
                "{validator} is not in the current validator set"
            )));
        }

        let event_nonce = event.event_nonce();
        let last_observed = self.last_observed_event_nonce(ctx);
        if event_nonce <= last_observed {
            return Err(BridgeError::AlreadyObserved(event_nonce));
        }

        let event_hash = event.hash();
        let key = keys::make_attestation_key(event_nonce, event_hash);
        let mut attestation = ctx
            .store
            .get(&key)
            .map(|bytes| must_decode::<Attestation>(&bytes, "attestation"))
            .unwrap_or_else(|| Attestation {
                observed: false,
                height: ctx.block_height,
                votes: vec![],
                event,
            });

        if attestation.votes.contains(validator) {
            // Duplicate votes are deduplicated silently.
            debug!(event_nonce, validator = %validator, "duplicate event vote ignored");
            return Ok(());
        }
        attestation.votes.push(*validator);
        ctx.store.set(&key, encode(&attestation, "attestation"));
        debug!(
            event_nonce,
            validator = %validator,
            votes = attestation.votes.len(),
            "recorded event vote"
        );

        self.try_observe_events(ctx, &validator_set)
    }

    /// All attestations competing at one nonce, in hash order.
    pub fn attestations_at_nonce(
        &self,
        ctx: &Context<'_>,
        event_nonce: u64,
    ) -> Vec<(Vec<u8>, Attestation)> {
        ctx.store
            .prefix_scan(&keys::make_attestation_nonce_prefix(event_nonce))
            .into_iter()
            .map(|(key, value)| (key, must_decode(&value, "attestation")))
            .collect()
    }

    /// Advances from the last observed nonce as far as consecutive
    /// quorum attestations allow. Observation never skips a nonce: a
    /// later event at quorum stays pending until every earlier nonce
    /// has been observed.
    fn try_observe_events(
        &mut self,
        ctx: &mut Context<'_>,
        validator_set: &[ValidatorPower],
    ) -> BridgeResult<()> {
        let total_power: u64 = validator_set.iter().map(|entry| entry.power).sum();

        loop {
            let next_nonce = self.last_observed_event_nonce(ctx) + 1;
            let candidates = self.attestations_at_nonce(ctx, next_nonce);

            let winner = candidates.iter().find(|(_, attestation)| {
                !attestation.observed
                    && has_quorum(
                        voted_power(&attestation.votes, validator_set),
                        total_power,
                    )
            });
            let Some((winning_key, mut attestation)) = winner.cloned() else {
                return Ok(());
            };

            attestation.observed = true;
            ctx.store
                .set(&winning_key, encode(&attestation, "attestation"));
            self.set_last_observed_event_nonce(ctx, next_nonce);
            self.record_counterparty_height(ctx, attestation.event.counterparty_height());
            info!(
                event_nonce = next_nonce,
                event_type = %attestation.event.event_type(),
                votes = attestation.votes.len(),
                "event observed"
            );

            // Votes on any competing hash at this nonce lost; report
            // them and drop the dead attestations.
            for (key, loser) in candidates {
                if key == winning_key {
                    continue;
                }
                for voter in &loser.votes {
                    warn!(
                        event_nonce = next_nonce,
                        validator = %voter,
                        "vote on losing event hash"
                    );
                    self.slashing.report_wrong_attestation(voter, next_nonce);
                }
                ctx.store.delete(&key);
            }

            self.handle_event(ctx, &attestation.event)?;
        }
    }
}

/// Strictly-greater-than-two-thirds check, in integer arithmetic.
fn has_quorum(voted_power: u64, total_power: u64) -> bool {
    if total_power == 0 {
        return false;
    }
    (voted_power as u128) * 3 > (total_power as u128) * 2
}

fn voted_power(votes: &[ValidatorAddress], validator_set: &[ValidatorPower]) -> u64 {
    votes
        .iter()
        .map(|voter| {
            validator_set
                .iter()
                .find(|entry| &entry.operator == voter)
                .map(|entry| entry.power)
                .unwrap_or(0)
        })
        .sum()
}
