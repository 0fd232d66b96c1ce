//! Fuzz tests for the wrapping engine
//!
//! Random bundles are wrapped by a backend that packs each group into one
//! instruction: the group's data concatenated, one readonly account per
//! wrapped operation.

use async_trait::async_trait;
use multisig_wrap_core::ledger::{LedgerClient, MemoryLedger};
use multisig_wrap_core::{Bundle, Operation, Result, Wrapper, requires_signer, wrap};
use proptest::prelude::*;
use solana_sdk::instruction::{AccountMeta, Instruction};
use solana_sdk::pubkey::Pubkey;

struct PackingWrapper {
    authority: Pubkey,
    program: Pubkey,
}

impl PackingWrapper {
    fn pack(&self, ops: &[Operation]) -> Instruction {
        let data: Vec<u8> = ops.iter().flat_map(|op| op.data.iter().copied()).collect();
        let mut accounts = vec![AccountMeta::new(self.authority, false)];
        accounts.extend(ops.iter().map(|op| AccountMeta::new_readonly(op.program_id, false)));
        Instruction::new_with_bytes(self.program, &data, accounts)
    }
}

#[async_trait]
impl Wrapper for PackingWrapper {
    fn signing_by(&self) -> Pubkey {
        self.authority
    }

    fn program_id(&self) -> Pubkey {
        self.program
    }

    async fn create_wrapped(&self, group: Bundle, _sequence: u64) -> Result<Bundle> {
        Ok(Bundle::new(vec![self.pack(&group.instructions)]))
    }
}

// ============================================================================
// Strategies
// ============================================================================

/// (signed by the authority, data length)
fn ops_strategy() -> impl Strategy<Value = Vec<(bool, usize)>> {
    prop::collection::vec((any::<bool>(), 1usize..400), 1..12)
}

fn build(authority: Pubkey, shape: &[(bool, usize)]) -> Vec<Operation> {
    shape
        .iter()
        .enumerate()
        .map(|(i, (signed, len))| {
            let mut accounts = vec![AccountMeta::new(Pubkey::new_unique(), false)];
            if *signed {
                accounts.push(AccountMeta::new(authority, true));
            }
            Instruction::new_with_bytes(Pubkey::new_unique(), &vec![i as u8; *len], accounts)
        })
        .collect()
}

fn run<T>(future: impl std::future::Future<Output = T>) -> T {
    tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap()
        .block_on(future)
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// The head is untouched and the tail survives in order inside the groups
    #[test]
    fn wrap_preserves_order(shape in ops_strategy()) {
        let ledger = MemoryLedger::new();
        let wrapper = PackingWrapper { authority: Pubkey::new_unique(), program: Pubkey::new_unique() };
        let ops = build(wrapper.authority, &shape);

        let result = run(wrap(Bundle::new(ops.clone()), &wrapper, &ledger)).unwrap();

        let Some(start) = ops.iter().position(|op| requires_signer(op, &wrapper.authority)) else {
            prop_assert_eq!(result.instructions, ops);
            return Ok(());
        };
        prop_assert_eq!(&result.instructions[..start], &ops[..start]);

        let wrapped = &result.instructions[start..];
        prop_assert!(wrapped.iter().all(|ix| ix.program_id == wrapper.program));
        prop_assert!(!wrapped.iter().any(|ix| requires_signer(ix, &wrapper.authority)));

        let programs: Vec<Pubkey> = wrapped
            .iter()
            .flat_map(|ix| ix.accounts[1..].iter().map(|m| m.pubkey))
            .collect();
        let expected: Vec<Pubkey> = ops[start..].iter().map(|op| op.program_id).collect();
        prop_assert_eq!(programs, expected);

        let data: Vec<u8> = wrapped.iter().flat_map(|ix| ix.data.clone()).collect();
        let expected: Vec<u8> = ops[start..].iter().flat_map(|op| op.data.clone()).collect();
        prop_assert_eq!(data, expected);
    }

    /// Every group but the last is as large as the ledger allows
    #[test]
    fn groups_are_maximal(shape in ops_strategy()) {
        let ledger = MemoryLedger::new();
        let wrapper = PackingWrapper { authority: Pubkey::new_unique(), program: Pubkey::new_unique() };
        let mut ops = build(wrapper.authority, &shape);
        // wrap from the first operation
        ops[0].accounts.push(AccountMeta::new(wrapper.authority, true));

        let result = run(wrap(Bundle::new(ops.clone()), &wrapper, &ledger)).unwrap();

        let mut consumed = 0;
        for ix in &result.instructions {
            let count = ix.accounts.len() - 1;
            prop_assert!(count >= 1);
            let end = consumed + count;
            if end < ops.len() {
                let grown = wrapper.pack(&ops[consumed..=end]);
                prop_assert!(ledger.try_build(&Bundle::new(vec![grown])).is_err());
            }
            consumed = end;
        }
        prop_assert_eq!(consumed, ops.len());
    }
}
