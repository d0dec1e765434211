//! The single-chain client program.

use crate::{
    chain::BlockExecutor,
    derivation::{run_derivation, DerivationRequest, Driver},
    errors::ProgramError,
    l2::{CachingL2Oracle, PreimageL2Oracle},
    BootInfo, MemoryKv,
};
use alloc::sync::Arc;
use alloy_primitives::B256;
use interlock_preimage::CommsClient;

/// Checks a computed value against the claim.
pub fn validate_claim(claim: B256, computed: B256) -> Result<(), ProgramError> {
    if claim != computed {
        error!(target: "client", "Failed to validate claim: claimed {claim}, computed {computed}");
        return Err(ProgramError::InvalidClaim { expected: claim, actual: computed });
    }
    info!(target: "client", "Successfully validated claim {claim}");
    Ok(())
}

/// Runs the single-chain program: derive the chain from the agreed output root to the claimed
/// block and compare the resulting output root with the claim.
pub fn run_single_chain<C, D, E>(
    client: Arc<C>,
    driver: &mut D,
    executor: E,
) -> Result<(), ProgramError>
where
    C: CommsClient,
    D: Driver,
    E: BlockExecutor,
{
    let boot = BootInfo::load(client.as_ref())?;
    info!(
        target: "client",
        "Verifying claim {} at block #{} of chain {}",
        boot.claimed_l2_output_root,
        boot.claimed_l2_block_number,
        boot.chain_id
    );

    let oracle = CachingL2Oracle::new(PreimageL2Oracle::new(client, false));
    let request = DerivationRequest {
        config: boot.rollup_config,
        l1_head: boot.l1_head,
        agreed_output_root: boot.agreed_l2_output_root,
        target_block: boot.claimed_l2_block_number,
        store_block_data: false,
    };
    let outcome = run_derivation(driver, oracle, executor, MemoryKv::default(), &request)?;
    validate_claim(boot.claimed_l2_output_root, outcome.output_root)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        boot::{
            AGREED_L2_PRE_STATE_KEY, CLAIMED_L2_POST_STATE_KEY, L1_HEAD_KEY, L2_CHAIN_ID_KEY,
            L2_CLAIM_BLOCK_NUMBER_KEY, L2_ROLLUP_CONFIG_KEY,
        },
        test_utils::{AttributesDriver, FakeExecutor, MemoryPreimageClient, TestChain},
    };

    fn boot_client(
        chain: &TestChain,
        agreed: u64,
        claimed: u64,
        claim: B256,
    ) -> Arc<MemoryPreimageClient> {
        let client = MemoryPreimageClient::default();
        chain.register_preimages(&client);
        client.insert_local(L1_HEAD_KEY.to(), B256::repeat_byte(0x11).to_vec());
        client.insert_local(AGREED_L2_PRE_STATE_KEY.to(), chain.output(agreed).root().to_vec());
        client.insert_local(CLAIMED_L2_POST_STATE_KEY.to(), claim.to_vec());
        client.insert_local(L2_CLAIM_BLOCK_NUMBER_KEY.to(), claimed.to_be_bytes().to_vec());
        client.insert_local(L2_CHAIN_ID_KEY.to(), chain.config().l2_chain_id.to_be_bytes().to_vec());
        client.insert_local(L2_ROLLUP_CONFIG_KEY.to(), serde_json::to_vec(&chain.config()).unwrap());
        Arc::new(client)
    }

    #[test]
    fn test_validate_claim() {
        assert!(validate_claim(B256::ZERO, B256::ZERO).is_ok());
        assert!(matches!(
            validate_claim(B256::repeat_byte(1), B256::repeat_byte(2)),
            Err(ProgramError::InvalidClaim { expected, actual })
                if expected == B256::repeat_byte(1) && actual == B256::repeat_byte(2)
        ));
    }

    #[test]
    fn test_valid_claim() {
        let chain = TestChain::new(901, 5);
        let client = boot_client(&chain, 2, 5, chain.output(5).root());
        let mut driver = AttributesDriver::new((3..=5).map(|n| chain.attributes(n)));
        run_single_chain(client, &mut driver, FakeExecutor::default()).unwrap();
    }

    #[test]
    fn test_invalid_claim() {
        let chain = TestChain::new(901, 5);
        let claim = chain.output(4).root();
        let client = boot_client(&chain, 2, 5, claim);
        let mut driver = AttributesDriver::new((3..=5).map(|n| chain.attributes(n)));
        let err = run_single_chain(client, &mut driver, FakeExecutor::default()).unwrap_err();
        assert!(matches!(
            err,
            ProgramError::InvalidClaim { expected, actual }
                if expected == claim && actual == chain.output(5).root()
        ));
    }

    #[test]
    fn test_trace_extension_claim() {
        let chain = TestChain::new(901, 5);
        let client = boot_client(&chain, 4, 4, chain.output(4).root());
        let mut driver = AttributesDriver::new(core::iter::empty());
        run_single_chain(client, &mut driver, FakeExecutor::default()).unwrap();
        assert_eq!(driver.calls(), 0);
    }
}
