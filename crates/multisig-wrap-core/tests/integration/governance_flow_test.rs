//! Governance flow: treasury detection, proposal, voting, execution

use crate::simulator::{GovernanceFixture, governance, member};
use multisig_wrap_core::config::{DispatchConfig, GOVERNANCE_PROGRAM_ID};
use multisig_wrap_core::dispatch::{BackendOptions, BackendRegistry};
use multisig_wrap_core::governance::state::{ProposalState, TransactionExecutionStatus};
use multisig_wrap_core::governance::{GovernanceBackend, Voter, instruction as gov_ix};
use multisig_wrap_core::ledger::submit_partitioned;
use multisig_wrap_core::{Bundle, DerivedAddressSigner, Error, SignerProvider};
use solana_sdk::instruction::{AccountMeta, Instruction};
use solana_sdk::pubkey::Pubkey;
use std::sync::Arc;

const START: i64 = 1_700_000_000;

fn signed_by(authority: Pubkey) -> Instruction {
    Instruction::new_with_bytes(
        Pubkey::new_unique(),
        &[7, 7, 7],
        vec![AccountMeta::new(authority, true), AccountMeta::new_readonly(Pubkey::new_unique(), false)],
    )
}

fn unsigned() -> Instruction {
    Instruction::new_with_bytes(Pubkey::new_unique(), &[1], vec![AccountMeta::new(Pubkey::new_unique(), false)])
}

/// Registry holding the treasury backend, proposing as the first member
async fn treasury_registry(f: &GovernanceFixture, config: &DispatchConfig) -> BackendRegistry {
    let mut registry = BackendRegistry::new();
    let options = BackendOptions::default().with_proposer(f.members[0].clone());
    assert!(registry.install(f.treasury, f.ledger.clone(), config, &options).await.unwrap());
    registry
}

fn treasury_backend(registry: &BackendRegistry, treasury: &Pubkey) -> GovernanceBackend {
    registry.get(treasury).unwrap().as_governance().unwrap().clone()
}

/// Wrap a treasury transfer and land the proposal, returning its address
async fn propose(f: &GovernanceFixture, registry: &BackendRegistry) -> Pubkey {
    let bundle = Bundle::new(vec![unsigned(), signed_by(f.treasury)]);
    let wrapped = registry.apply(bundle, f.ledger.as_ref()).await.unwrap();
    submit_partitioned(f.ledger.as_ref(), &wrapped).await.unwrap();

    let pending = treasury_backend(registry, &f.treasury).pending_proposals().await.unwrap();
    assert_eq!(pending.len(), 1);
    pending[0].0
}

fn voters(f: &GovernanceFixture) -> Vec<Voter> {
    f.members.iter().cloned().map(Voter::new).collect()
}

#[tokio::test]
async fn test_treasury_proposal_executes() {
    let f = governance(3, 40, &[300, 100, 600]);
    f.ledger.inner.set_unix_timestamp(START);
    let registry = treasury_registry(&f, &DispatchConfig::default()).await;
    let backend = treasury_backend(&registry, &f.treasury);
    assert_eq!(backend.address(), f.governance);

    let proposal = propose(&f, &registry).await;
    assert_eq!(backend.poll_state(&proposal).await.unwrap(), ProposalState::Voting);
    let stored = f.ledger.proposal(&proposal);
    assert_eq!(stored.transactions_count(), 1);
    assert_eq!(stored.token_owner_record, f.council_record(&f.members[0].authority()));

    let sent = f.ledger.inner.submissions().len();
    backend.approve_and_execute(&proposal, &voters(&f)).await.unwrap();

    let stored = f.ledger.proposal(&proposal);
    assert_eq!(stored.state, ProposalState::Completed);
    // 300 + 100 reaches 40% of 1000; the third member never votes
    assert_eq!(stored.yes_vote_weight(), 400);
    assert_eq!(f.ledger.inner.submissions().len(), sent + 3);

    let entry = gov_ix::proposal_transaction_address(&GOVERNANCE_PROGRAM_ID, &proposal, 0, 0);
    let entry = f.ledger.proposal_transaction(&entry);
    assert_eq!(entry.execution_status, TransactionExecutionStatus::Success);
    assert!(backend.pending_proposals().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_unmet_threshold_is_defeated() {
    let f = governance(3, 40, &[100, 200, 700]);
    f.ledger.inner.set_unix_timestamp(START);
    let registry = treasury_registry(&f, &DispatchConfig::default()).await;
    let backend = treasury_backend(&registry, &f.treasury);
    let proposal = propose(&f, &registry).await;

    let err = backend
        .approve_and_execute(&proposal, &voters(&f)[..1])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ThresholdNotMet { required: 400, actual: 100 }));

    // voting time has not run out yet
    assert!(backend.finalize_vote(&proposal).await.is_err());
    assert_eq!(backend.poll_state(&proposal).await.unwrap(), ProposalState::Voting);

    f.ledger.inner.set_unix_timestamp(START + 3600);
    assert_eq!(backend.poll_state(&proposal).await.unwrap(), ProposalState::Defeated);
    assert_eq!(f.ledger.proposal(&proposal).state, ProposalState::Voting);

    backend.finalize_vote(&proposal).await.unwrap();
    assert_eq!(f.ledger.proposal(&proposal).state, ProposalState::Defeated);
    assert!(backend.pending_proposals().await.unwrap().is_empty());
    assert!(matches!(
        backend.execute(&proposal).await,
        Err(Error::InvalidState { .. })
    ));
}

#[tokio::test]
async fn test_delegate_votes_for_owner() {
    let f = governance(3, 40, &[500, 500]);
    let delegate = member();
    let owner = f.members[1].authority();
    f.deposit(owner, 500, Some(delegate.authority()));

    let registry = treasury_registry(&f, &DispatchConfig::default()).await;
    let backend = treasury_backend(&registry, &f.treasury);
    let proposal = propose(&f, &registry).await;

    // the owner key is not available here
    let absent: Arc<dyn SignerProvider> = Arc::new(DerivedAddressSigner::new(owner));
    assert!(matches!(
        backend.cast_vote(&proposal, &Voter::new(absent.clone()), &[]).await,
        Err(Error::CannotSign(_))
    ));
    let stranger = Voter::new(absent.clone()).with_delegate(member());
    assert!(matches!(
        backend.cast_vote(&proposal, &stranger, &[]).await,
        Err(Error::CannotSign(_))
    ));

    let voter = Voter::new(absent).with_delegate(delegate.clone());
    backend.approve_and_execute(&proposal, &[voter]).await.unwrap();
    assert_eq!(f.ledger.proposal(&proposal).state, ProposalState::Completed);
}

#[tokio::test]
async fn test_legacy_governance_counts_proposals() {
    let f = governance(2, 40, &[600, 400]);
    let config = DispatchConfig::default().with_governance_version(2);
    let registry = treasury_registry(&f, &config).await;
    let backend = treasury_backend(&registry, &f.treasury);

    let first = propose(&f, &registry).await;
    let expected = gov_ix::proposal_address(
        &GOVERNANCE_PROGRAM_ID,
        &f.governance,
        &f.council_mint,
        &0u32.to_le_bytes(),
    );
    assert_eq!(first, expected);
    assert_eq!(f.ledger.governance(&f.governance).proposals_count, 1);

    backend.approve_and_execute(&first, &voters(&f)).await.unwrap();
    assert_eq!(f.ledger.proposal(&first).state, ProposalState::Completed);
}

#[tokio::test]
async fn test_log_only_drops_wrapped_operations() {
    let f = governance(3, 40, &[1000]);
    let config = DispatchConfig::default().with_log_only(true);
    let registry = treasury_registry(&f, &config).await;

    let head = unsigned();
    let bundle = Bundle::new(vec![head.clone(), signed_by(f.treasury), signed_by(f.treasury)]);
    let wrapped = registry.apply(bundle, f.ledger.as_ref()).await.unwrap();

    assert_eq!(wrapped.instructions, vec![head]);
    assert!(f.ledger.inner.build_attempts().is_empty());
    assert_eq!(f.ledger.governance(&f.governance).proposals_count, 0);
}
