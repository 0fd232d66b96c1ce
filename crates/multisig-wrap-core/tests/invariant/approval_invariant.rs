//! Invariant tests for approvals
//!
//! - An owner slot approves at most once
//! - A rejected approval leaves the record untouched
//! - Approvals never exceed the number of owners
//! - Execution happens only at or above the threshold

use crate::simulator::smart_wallet;
use multisig_wrap_core::ledger::submit_partitioned;
use multisig_wrap_core::{Bundle, Error, wrap};
use multisig_wrap_core::config::SMART_WALLET_PROGRAM_ID;
use multisig_wrap_core::smart_wallet::state::NOT_EXECUTED;
use multisig_wrap_core::smart_wallet::{SmartWalletBackend, WalletTransaction};
use proptest::prelude::*;
use solana_sdk::instruction::{AccountMeta, Instruction};
use solana_sdk::pubkey::Pubkey;
use std::collections::HashSet;

fn pending(owners: usize) -> WalletTransaction {
    WalletTransaction {
        smart_wallet: Pubkey::new_unique(),
        index: 0,
        bump: 255,
        proposer: Pubkey::new_unique(),
        instructions: vec![],
        signers: vec![false; owners],
        owner_set_seqno: 0,
        eta: -1,
        executor: Pubkey::default(),
        executed_at: NOT_EXECUTED,
    }
}

proptest! {
    /// INVARIANT: approvals equal the distinct in-range slots that approved
    #[test]
    fn approvals_track_distinct_owners(
        owners in 1usize..10,
        attempts in prop::collection::vec(0usize..12, 0..30),
    ) {
        let mut tx = pending(owners);
        let mut approved = HashSet::new();

        for slot in attempts {
            let before = tx.clone();
            let result = tx.approve(slot);
            if slot < owners && approved.insert(slot) {
                prop_assert!(result.is_ok());
            } else {
                prop_assert!(matches!(result, Err(Error::ApprovalRejected(_))));
                prop_assert_eq!(&tx, &before);
            }
            prop_assert_eq!(tx.approvals(), approved.len() as u64);
            prop_assert!(tx.approvals() <= owners as u64);
        }
    }

    /// INVARIANT: execution succeeds exactly when the threshold is met
    #[test]
    fn execution_requires_threshold(
        owners in 1usize..10,
        threshold in 1u64..10,
        approving in prop::collection::vec(any::<bool>(), 10),
    ) {
        let mut tx = pending(owners);
        for (slot, approve) in approving.iter().take(owners).enumerate() {
            if *approve {
                tx.approve(slot).unwrap();
            }
        }

        let executor = Pubkey::new_unique();
        let met = tx.approvals() >= threshold;
        prop_assert_eq!(tx.is_executable(threshold), met);
        prop_assert_eq!(tx.execute(threshold, executor, 1).is_ok(), met);
        prop_assert_eq!(tx.is_executed(), met);
        // nothing runs twice
        prop_assert!(tx.execute(threshold, executor, 2).is_err());
    }
}

/// INVARIANT: a repeated approval is refused before reaching the ledger
#[tokio::test]
async fn test_repeat_approval_never_submitted() {
    let f = smart_wallet(3, 3);
    let backend = SmartWalletBackend::load(f.ledger.clone(), f.wallet, SMART_WALLET_PROGRAM_ID)
        .await
        .unwrap()
        .with_proposer(f.owners[0].clone());

    let op = Instruction::new_with_bytes(Pubkey::new_unique(), &[9], vec![AccountMeta::new(f.wallet, true)]);
    let wrapped = wrap(Bundle::new(vec![op]), &backend, f.ledger.as_ref()).await.unwrap();
    submit_partitioned(f.ledger.as_ref(), &wrapped).await.unwrap();

    // every owner twice, in order
    for (slot, owner) in f.owners.iter().enumerate().chain(f.owners.iter().enumerate()) {
        let sent = f.ledger.inner.submissions().len();
        let already = backend.transaction(0).await.unwrap().unwrap().signers[slot];

        let result = backend.approve(0, owner.as_ref()).await;
        assert_eq!(result.is_err(), already);
        assert_eq!(f.ledger.inner.submissions().len(), sent + usize::from(!already));
        assert!(backend.transaction(0).await.unwrap().unwrap().approvals() <= 3);
    }

    let tx = backend.transaction(0).await.unwrap().unwrap();
    assert_eq!(tx.signers, vec![true; 3]);
}
