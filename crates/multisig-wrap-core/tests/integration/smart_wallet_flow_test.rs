//! Smart wallet flow: propose through the wrapping engine, approve, execute

use crate::simulator::{WalletFixture, member, smart_wallet};
use multisig_wrap_core::config::SMART_WALLET_PROGRAM_ID;
use multisig_wrap_core::ledger::submit_partitioned;
use multisig_wrap_core::smart_wallet::{SmartWalletBackend, TxInstruction, WalletTransactionStatus};
use multisig_wrap_core::{Bundle, DerivedAddressSigner, Error, SignerProvider, wrap};
use solana_sdk::instruction::{AccountMeta, Instruction};
use solana_sdk::pubkey::Pubkey;
use std::sync::Arc;

fn transfer(from: Pubkey) -> Instruction {
    Instruction::new_with_bytes(
        Pubkey::new_unique(),
        &[2, 0, 0, 0, 100, 0, 0, 0, 0, 0, 0, 0],
        vec![AccountMeta::new(from, true), AccountMeta::new(Pubkey::new_unique(), false)],
    )
}

async fn backend(f: &WalletFixture) -> SmartWalletBackend {
    SmartWalletBackend::load(f.ledger.clone(), f.wallet, SMART_WALLET_PROGRAM_ID)
        .await
        .unwrap()
        .with_proposer(f.owners[0].clone())
}

/// Wrap `ops` and land the result
async fn propose(f: &WalletFixture, backend: &SmartWalletBackend, ops: Vec<Instruction>) {
    let wrapped = wrap(Bundle::new(ops), backend, f.ledger.as_ref()).await.unwrap();
    submit_partitioned(f.ledger.as_ref(), &wrapped).await.unwrap();
}

#[tokio::test]
async fn test_propose_approve_execute() {
    let f = smart_wallet(2, 3);
    let backend = backend(&f).await;
    let ops = vec![transfer(f.wallet), transfer(f.wallet)];

    propose(&f, &backend, ops.clone()).await;

    assert_eq!(f.ledger.wallet(&f.wallet).num_transactions, 1);
    let tx = backend.transaction(0).await.unwrap().unwrap();
    assert_eq!(tx.instructions, ops.iter().map(TxInstruction::from).collect::<Vec<_>>());
    assert_eq!(tx.proposer, f.owners[0].authority());
    assert_eq!(backend.pending_transactions().await.unwrap().len(), 1);

    backend.approve_and_execute(0, &f.owners).await.unwrap();

    let tx = backend.transaction(0).await.unwrap().unwrap();
    assert_eq!(tx.status(2), WalletTransactionStatus::Executed);
    // threshold is two; the third owner was not asked
    assert_eq!(tx.signers, vec![true, true, false]);
    assert!(backend.pending_transactions().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_single_approval_stays_pending() {
    let f = smart_wallet(2, 3);
    let backend = backend(&f).await;
    propose(&f, &backend, vec![transfer(f.wallet)]).await;

    backend.approve(0, f.owners[1].as_ref()).await.unwrap();
    let tx = backend.transaction(0).await.unwrap().unwrap();
    assert_eq!(tx.status(2), WalletTransactionStatus::PartiallyApproved);

    // repeated approval is refused before anything is sent
    let sent = f.ledger.inner.submissions().len();
    assert!(matches!(
        backend.approve(0, f.owners[1].as_ref()).await,
        Err(Error::ApprovalRejected(_))
    ));
    assert_eq!(f.ledger.inner.submissions().len(), sent);

    assert!(matches!(
        backend.execute(0, f.owners[1].as_ref()).await,
        Err(Error::ThresholdNotMet { required: 2, actual: 1 })
    ));
}

#[tokio::test]
async fn test_members_that_cannot_sign_are_skipped() {
    let f = smart_wallet(2, 3);
    let backend = backend(&f).await;
    propose(&f, &backend, vec![transfer(f.wallet)]).await;

    let placeholder: Arc<dyn SignerProvider> = Arc::new(DerivedAddressSigner::new(f.owners[1].authority()));
    let outsider = member();

    let err = backend
        .approve_and_execute(0, &[placeholder.clone(), outsider.clone(), f.owners[2].clone()])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ThresholdNotMet { required: 2, actual: 1 }));
    assert!(f.ledger.inner.submissions().len() == 1);

    backend
        .approve_and_execute(0, &[placeholder, f.owners[2].clone(), f.owners[0].clone()])
        .await
        .unwrap();
    let tx = backend.transaction(0).await.unwrap().unwrap();
    assert!(tx.is_executed());
    assert_eq!(tx.executor, f.owners[2].authority());
}

#[tokio::test]
async fn test_execute_all_pending_in_order() {
    let f = smart_wallet(1, 2);
    let backend = backend(&f).await;
    propose(&f, &backend, vec![transfer(f.wallet)]).await;
    propose(&f, &backend, vec![transfer(f.wallet)]).await;
    assert_eq!(f.ledger.wallet(&f.wallet).num_transactions, 2);

    let receipts = backend.execute_all_pending(&[f.owners[1].clone()]).await.unwrap();
    assert_eq!(receipts.len(), 2);
    for index in 0..2 {
        assert!(backend.transaction(index).await.unwrap().unwrap().is_executed());
    }

    // nothing left to do
    assert!(backend.execute_all_pending(&[f.owners[1].clone()]).await.unwrap().is_empty());
}
