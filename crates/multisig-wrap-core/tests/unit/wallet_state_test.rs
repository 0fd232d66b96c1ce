//! Unit tests for smart wallet transaction state

use multisig_wrap_core::Error;
use multisig_wrap_core::smart_wallet::state::NOT_EXECUTED;
use multisig_wrap_core::smart_wallet::{SmartWallet, WalletTransaction, WalletTransactionStatus};
use solana_sdk::pubkey::Pubkey;

fn wallet(threshold: u64) -> SmartWallet {
    SmartWallet {
        base: Pubkey::new_unique(),
        bump: 254,
        threshold,
        minimum_delay: 0,
        grace_period: 0,
        owner_set_seqno: 1,
        num_transactions: 0,
        owners: (0..3).map(|_| Pubkey::new_unique()).collect(),
    }
}

fn proposed(wallet: &SmartWallet) -> WalletTransaction {
    WalletTransaction {
        smart_wallet: Pubkey::new_unique(),
        index: wallet.num_transactions,
        bump: 255,
        proposer: wallet.owners[0],
        instructions: vec![],
        signers: vec![false; wallet.owners.len()],
        owner_set_seqno: wallet.owner_set_seqno,
        eta: -1,
        executor: Pubkey::default(),
        executed_at: NOT_EXECUTED,
    }
}

#[test]
fn test_two_of_three_approvals() {
    let wallet = wallet(2);
    let mut tx = proposed(&wallet);
    assert_eq!(tx.status(wallet.threshold), WalletTransactionStatus::Proposed);

    tx.approve(wallet.owner_index(&wallet.owners[0]).unwrap()).unwrap();
    assert_eq!(tx.status(wallet.threshold), WalletTransactionStatus::PartiallyApproved);
    assert!(!tx.is_executable(wallet.threshold));

    tx.approve(wallet.owner_index(&wallet.owners[2]).unwrap()).unwrap();
    assert_eq!(tx.status(wallet.threshold), WalletTransactionStatus::Approved);
    assert!(tx.is_executable(wallet.threshold));

    let before = tx.clone();
    assert!(matches!(tx.approve(0), Err(Error::ApprovalRejected(_))));
    assert_eq!(tx, before);
}

#[test]
fn test_execute_requires_threshold() {
    let wallet = wallet(2);
    let mut tx = proposed(&wallet);
    tx.approve(1).unwrap();

    assert!(matches!(
        tx.execute(wallet.threshold, wallet.owners[1], 10),
        Err(Error::ThresholdNotMet { required: 2, actual: 1 })
    ));
    assert!(!tx.is_executed());

    tx.approve(0).unwrap();
    tx.execute(wallet.threshold, wallet.owners[1], 10).unwrap();
    assert_eq!(tx.status(wallet.threshold), WalletTransactionStatus::Executed);
    assert_eq!(tx.executor, wallet.owners[1]);
    assert!(tx.execute(wallet.threshold, wallet.owners[1], 11).is_err());
    assert!(tx.approve(2).is_err());
}

#[test]
fn test_unknown_owner_slot_rejected() {
    let wallet = wallet(1);
    let mut tx = proposed(&wallet);
    assert!(wallet.owner_index(&Pubkey::new_unique()).is_none());
    assert!(matches!(tx.approve(7), Err(Error::ApprovalRejected(_))));
}

#[test]
fn test_account_layout_round_trip() {
    let wallet = wallet(2);
    let address = Pubkey::new_unique();
    assert_eq!(SmartWallet::unpack(&address, &wallet.pack()).unwrap(), wallet);

    // a transaction is not a wallet
    let tx = proposed(&wallet);
    assert!(SmartWallet::unpack(&address, &tx.pack()).is_err());
    assert_eq!(WalletTransaction::unpack(&address, &tx.pack()).unwrap(), tx);
}
