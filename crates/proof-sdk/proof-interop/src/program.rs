//! The interop client program: one step of the transition from an agreed super root to the next.

use crate::{consolidation::run_consolidation, errors::InteropProgramError, BootInfo};
use alloc::{format, sync::Arc};
use alloy_primitives::B256;
use interlock_interop::{
    OptimisticBlock, TransitionState, CONSOLIDATE_STEP, INVALID_TRANSITION_HASH,
};
use interlock_preimage::CommsClient;
use interlock_proof::{
    chain::BlockExecutor,
    derivation::{run_derivation, DerivationRequest, Driver},
    l2::{CachingL2Oracle, L2Oracle, PreimageL2Oracle},
    validate_claim, MemoryKv,
};

/// Runs the interop program: advance the agreed pre-state by one step and compare the result
/// with the claim.
pub fn run_interop_program<C, D, E>(
    client: Arc<C>,
    driver: &mut D,
    executor: E,
) -> Result<(), InteropProgramError>
where
    C: CommsClient,
    D: Driver,
    E: BlockExecutor + Clone,
{
    let boot = BootInfo::load(client.as_ref())?;
    info!(
        target: "interop_client",
        "Verifying claim {} from pre-state {} at game timestamp {}",
        boot.claimed_post_state,
        boot.agreed_pre_state,
        boot.game_timestamp
    );

    let oracle = CachingL2Oracle::new(PreimageL2Oracle::new(client, true));
    let computed = state_transition(&boot, oracle, driver, executor)?;
    validate_claim(boot.claimed_post_state, computed).map_err(|_| {
        InteropProgramError::InvalidClaim { expected: boot.claimed_post_state, actual: computed }
    })
}

/// Computes the post-state of one step from the agreed pre-state.
///
/// While chains remain to be derived, the next chain is derived one block past the agreed super
/// root. Once every chain has been derived the step counter pads up to [CONSOLIDATE_STEP], where
/// the pending blocks are consolidated into the next super root.
///
/// # Panics
///
/// Panics if the agreed pre-state is newer than the game timestamp. No honest pre-state can be.
pub fn state_transition<O, D, E>(
    boot: &BootInfo,
    oracle: O,
    driver: &mut D,
    executor: E,
) -> Result<B256, InteropProgramError>
where
    O: L2Oracle + Clone,
    D: Driver,
    E: BlockExecutor + Clone,
{
    if boot.agreed_pre_state == INVALID_TRANSITION_HASH {
        info!(target: "interop_client", "Agreed pre-state is the invalid transition");
        return Ok(INVALID_TRANSITION_HASH);
    }

    let state = oracle.transition_state_by_root(boot.agreed_pre_state)?;
    let super_root = &state.pre_state;
    if super_root.timestamp == boot.game_timestamp {
        info!(
            target: "interop_client",
            "Agreed pre-state is at the game timestamp {}, extending the trace",
            boot.game_timestamp
        );
        return Ok(boot.agreed_pre_state);
    }
    if super_root.timestamp > boot.game_timestamp {
        panic!(
            "agreed prestate timestamp {} is after the game timestamp {}",
            super_root.timestamp, boot.game_timestamp
        );
    }

    let chains = super_root.output_roots.len();
    if chains as u64 > CONSOLIDATE_STEP {
        return Err(InteropProgramError::InvalidPrestate(format!(
            "{chains} chains exceed the limit of {CONSOLIDATE_STEP}"
        )));
    }

    if state.step < chains as u64 {
        let chain = super_root.output_roots[state.step as usize];
        let config = *boot.rollup_config(chain.chain_id)?;
        let target_block = config.target_block_number(super_root.timestamp + 1)?;
        info!(
            target: "interop_client",
            "Step {}: deriving chain {} to block #{}",
            state.step,
            chain.chain_id,
            target_block
        );

        let request = DerivationRequest {
            config,
            l1_head: boot.l1_head,
            agreed_output_root: chain.output_root,
            target_block,
            store_block_data: true,
        };
        let outcome = run_derivation(driver, oracle, executor, MemoryKv::default(), &request)?;
        if outcome.head.number < target_block {
            warn!(
                target: "interop_client",
                "Chain {} stopped at block #{} before #{}, transition is invalid",
                chain.chain_id,
                outcome.head.number,
                target_block
            );
            return Ok(INVALID_TRANSITION_HASH);
        }

        let mut pending_progress = state.pending_progress.clone();
        pending_progress.push(OptimisticBlock::new(outcome.block_hash, outcome.output_root));
        let next = TransitionState::new(super_root.clone(), pending_progress, state.step + 1);
        return Ok(next.hash());
    }

    if state.is_consolidation_step() {
        if state.pending_progress.len() as u64 > CONSOLIDATE_STEP {
            return Err(InteropProgramError::InvalidPrestate(format!(
                "{} pending blocks exceed the limit of {CONSOLIDATE_STEP}",
                state.pending_progress.len()
            )));
        }
        info!(target: "interop_client", "Step {}: consolidating", state.step);
        let next = run_consolidation(boot, oracle, executor, state)?;
        return Ok(next.hash());
    }

    debug!(target: "interop_client", "Step {}: padding", state.step);
    let next = TransitionState::new(state.pre_state, state.pending_progress, state.step + 1);
    Ok(next.hash())
}
