//! Dispatch against simulated wallets and realms

use crate::simulator::{governance, smart_wallet};
use multisig_wrap_core::config::{DispatchConfig, GOVERNANCE_PROGRAM_ID, SMART_WALLET_PROGRAM_ID};
use multisig_wrap_core::dispatch::{BackendKind, BackendOptions, BackendRegistry, detect};
use multisig_wrap_core::governance::instruction::NATIVE_TREASURY_SEED;
use multisig_wrap_core::wrap::Wrapper;
use multisig_wrap_core::{AccountData, Bundle, DerivedKeyInfo, Error};
use solana_sdk::instruction::{AccountMeta, Instruction};
use solana_sdk::pubkey::Pubkey;
use solana_sdk::system_program;

fn signed_by(authority: Pubkey) -> Instruction {
    Instruction::new_with_bytes(Pubkey::new_unique(), &[5; 8], vec![AccountMeta::new(authority, true)])
}

#[tokio::test]
async fn test_treasury_resolves_to_its_governance() {
    let f = governance(3, 50, &[100]);

    let backend = detect(f.treasury, f.ledger.clone(), &DispatchConfig::default(), &BackendOptions::default())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(backend.kind(), BackendKind::Governance);
    assert_eq!(backend.host(), f.governance);
    assert_eq!(backend.signing_by(), f.treasury);
    assert_eq!(backend.program_id(), GOVERNANCE_PROGRAM_ID);

    // a funded treasury is a system account and resolves the same way
    f.ledger
        .inner
        .set_account(f.treasury, AccountData::new(system_program::id(), vec![]));
    let funded = detect(f.treasury, f.ledger.clone(), &DispatchConfig::default(), &BackendOptions::default())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(funded.host(), f.governance);
}

#[tokio::test]
async fn test_registry_installs_each_authority_once() {
    let f = governance(3, 50, &[100]);
    let config = DispatchConfig::default();
    let options = BackendOptions::default();
    let mut registry = BackendRegistry::new();

    assert!(registry.install(f.treasury, f.ledger.clone(), &config, &options).await.unwrap());
    assert!(registry.install(f.governance, f.ledger.clone(), &config, &options).await.unwrap());
    assert!(!registry.install(f.treasury, f.ledger.clone(), &config, &options).await.unwrap());

    assert_eq!(registry.len(), 2);
    assert!(registry.contains(BackendKind::Governance, &f.treasury));
    assert!(registry.contains(BackendKind::Governance, &f.governance));
    assert!(!registry.contains(BackendKind::SmartWallet, &f.treasury));

    // an address that is not a multisig installs nothing
    let plain = Pubkey::new_unique();
    assert!(!registry.install(plain, f.ledger.clone(), &config, &options).await.unwrap());
    assert_eq!(registry.len(), 2);
}

#[tokio::test]
async fn test_registry_leaves_foreign_operations_alone() {
    let f = smart_wallet(1, 1);
    let mut registry = BackendRegistry::new();
    let options = BackendOptions::default().with_proposer(f.owners[0].clone());
    registry
        .install(f.wallet, f.ledger.clone(), &DispatchConfig::default(), &options)
        .await
        .unwrap();

    let bundle = Bundle::new(vec![signed_by(Pubkey::new_unique())]);
    let wrapped = registry.apply(bundle.clone(), f.ledger.as_ref()).await.unwrap();
    assert_eq!(wrapped.instructions, bundle.instructions);

    let bundle = Bundle::new(vec![signed_by(f.wallet)]);
    let wrapped = registry.apply(bundle, f.ledger.as_ref()).await.unwrap();
    assert_eq!(wrapped.len(), 1);
    assert_eq!(wrapped.instructions[0].program_id, SMART_WALLET_PROGRAM_ID);
    assert!(!wrapped.instructions[0].accounts.iter().any(|m| m.pubkey == f.wallet && m.is_signer));
}

#[tokio::test]
async fn test_unresolvable_derivations() {
    let f = governance(3, 50, &[100]);
    let config = DispatchConfig::default();
    let options = BackendOptions::default();

    // right prefix, wrong governance
    let forged = Pubkey::new_unique();
    let other = Pubkey::new_unique();
    f.ledger.inner.register_derived(
        forged,
        DerivedKeyInfo::from_seeds(GOVERNANCE_PROGRAM_ID, &[NATIVE_TREASURY_SEED, other.as_ref()]),
    );
    let err = detect(forged, f.ledger.clone(), &config, &options).await.unwrap_err();
    assert!(matches!(err, Error::UnknownSeedScheme { .. }));

    let foreign = Pubkey::new_unique();
    let program = Pubkey::new_unique();
    f.ledger
        .inner
        .register_derived(foreign, DerivedKeyInfo::from_seeds(program, &[b"vault".as_slice()]));
    let err = detect(foreign, f.ledger.clone(), &config, &options).await.unwrap_err();
    assert!(matches!(err, Error::UnknownMultisigProgram(p) if p == program));
}
