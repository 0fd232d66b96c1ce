//! Unit tests for the wrapping engine driving a real backend
//!
//! Operations carry 250 bytes of data: two of them fit into one wallet
//! transaction proposal, three do not.

use crate::simulator::smart_wallet;
use borsh::BorshDeserialize;
use multisig_wrap_core::config::SMART_WALLET_PROGRAM_ID;
use multisig_wrap_core::smart_wallet::{SmartWalletBackend, TxInstruction, instruction::find_transaction_address};
use multisig_wrap_core::{Bundle, Error, Operation, wrap};
use solana_sdk::instruction::{AccountMeta, Instruction};
use solana_sdk::pubkey::Pubkey;

fn op(signer: Option<Pubkey>, data_len: usize) -> Operation {
    let mut accounts = vec![AccountMeta::new(Pubkey::new_unique(), false)];
    if let Some(signer) = signer {
        accounts.push(AccountMeta::new(signer, true));
    }
    Instruction::new_with_bytes(Pubkey::new_unique(), &vec![3u8; data_len], accounts)
}

/// Operations proposed by a create_transaction instruction
fn proposed(ix: &Instruction) -> Vec<TxInstruction> {
    assert_eq!(ix.program_id, SMART_WALLET_PROGRAM_ID);
    Vec::<TxInstruction>::try_from_slice(&ix.data[9..]).unwrap()
}

#[tokio::test]
async fn test_groups_shrink_to_fit() {
    let f = smart_wallet(2, 3);
    let backend = SmartWalletBackend::load(f.ledger.clone(), f.wallet, SMART_WALLET_PROGRAM_ID)
        .await
        .unwrap()
        .with_proposer(f.owners[0].clone());

    let head = op(None, 16);
    let tail: Vec<_> = (0..5).map(|_| op(Some(f.wallet), 250)).collect();
    let mut ops = vec![head.clone()];
    ops.extend(tail.iter().cloned());

    let wrapped = wrap(Bundle::new(ops), &backend, f.ledger.as_ref()).await.unwrap();

    assert_eq!(wrapped.instructions[0], head);
    let groups: Vec<_> = wrapped.instructions[1..].iter().map(proposed).collect();
    assert_eq!(groups.iter().map(Vec::len).collect::<Vec<_>>(), vec![2, 2, 1]);

    let flattened: Vec<_> = groups.into_iter().flatten().collect();
    let expected: Vec<_> = tail.iter().map(TxInstruction::from).collect();
    assert_eq!(flattened, expected);

    // consecutive transaction indexes
    for (index, ix) in wrapped.instructions[1..].iter().enumerate() {
        let (address, bump) = find_transaction_address(&SMART_WALLET_PROGRAM_ID, &f.wallet, index as u64);
        assert_eq!(ix.accounts[1].pubkey, address);
        assert_eq!(ix.data[8], bump);
    }
}

#[tokio::test]
async fn test_oversized_operation_is_unwrappable() {
    let f = smart_wallet(2, 3);
    let backend = SmartWalletBackend::load(f.ledger.clone(), f.wallet, SMART_WALLET_PROGRAM_ID)
        .await
        .unwrap()
        .with_proposer(f.owners[0].clone());

    let ops = vec![op(None, 16), op(Some(f.wallet), 16), op(Some(f.wallet), 1000)];
    let err = wrap(Bundle::new(ops), &backend, f.ledger.as_ref()).await.unwrap_err();

    assert!(matches!(err, Error::UnwrappableOperation { index: 2, .. }));
    assert!(f.ledger.inner.submissions().is_empty());
}

#[tokio::test]
async fn test_ineligible_proposer_is_not_retried() {
    let f = smart_wallet(2, 3);
    // the ledger payer is not an owner
    let backend = SmartWalletBackend::load(f.ledger.clone(), f.wallet, SMART_WALLET_PROGRAM_ID)
        .await
        .unwrap();

    let ops: Vec<_> = (0..3).map(|_| op(Some(f.wallet), 250)).collect();
    let err = wrap(Bundle::new(ops), &backend, f.ledger.as_ref()).await.unwrap_err();

    assert!(matches!(err, Error::ProposerIneligible(_)));
    assert!(f.ledger.inner.build_attempts().is_empty());
}
