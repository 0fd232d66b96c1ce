//! Smart wallet instruction builders

use super::state::{TxInstruction, anchor_instruction_discriminator};
use borsh::BorshSerialize;
use solana_sdk::{
    instruction::{AccountMeta, Instruction},
    pubkey::Pubkey,
    system_program,
};

/// Seed prefix of wallet transaction addresses
pub const TRANSACTION_SEED: &[u8] = b"GokiTransaction";

/// Seed prefix of smart wallet addresses
pub const SMART_WALLET_SEED: &[u8] = b"GokiSmartWallet";

/// Address of transaction `index` of `wallet`
pub fn find_transaction_address(program_id: &Pubkey, wallet: &Pubkey, index: u64) -> (Pubkey, u8) {
    Pubkey::find_program_address(
        &[TRANSACTION_SEED, wallet.as_ref(), &index.to_le_bytes()],
        program_id,
    )
}

/// Address of the smart wallet created from `base`
pub fn find_smart_wallet_address(program_id: &Pubkey, base: &Pubkey) -> (Pubkey, u8) {
    Pubkey::find_program_address(&[SMART_WALLET_SEED, base.as_ref()], program_id)
}

fn data<T: BorshSerialize>(name: &str, args: &T) -> Vec<u8> {
    let mut data = anchor_instruction_discriminator(name).to_vec();
    let _ = args.serialize(&mut data);
    data
}

#[derive(BorshSerialize)]
struct CreateTransactionArgs<'a> {
    bump: u8,
    instructions: &'a [TxInstruction],
}

/// Propose `instructions` as a new wallet transaction.
///
/// Accounts:
/// 0. `[writable]` smart wallet
/// 1. `[writable]` transaction (PDA)
/// 2. `[signer]` proposer
/// 3. `[writable, signer]` payer
/// 4. `[]` system program
pub fn create_transaction(
    program_id: &Pubkey,
    wallet: &Pubkey,
    transaction: &Pubkey,
    bump: u8,
    proposer: &Pubkey,
    payer: &Pubkey,
    instructions: &[TxInstruction],
) -> Instruction {
    Instruction {
        program_id: *program_id,
        accounts: vec![
            AccountMeta::new(*wallet, false),
            AccountMeta::new(*transaction, false),
            AccountMeta::new_readonly(*proposer, true),
            AccountMeta::new(*payer, true),
            AccountMeta::new_readonly(system_program::id(), false),
        ],
        data: data("create_transaction", &CreateTransactionArgs { bump, instructions }),
    }
}

/// Approve a wallet transaction as `owner`.
///
/// Accounts:
/// 0. `[]` smart wallet
/// 1. `[writable]` transaction
/// 2. `[signer]` owner
pub fn approve(program_id: &Pubkey, wallet: &Pubkey, transaction: &Pubkey, owner: &Pubkey) -> Instruction {
    Instruction {
        program_id: *program_id,
        accounts: vec![
            AccountMeta::new_readonly(*wallet, false),
            AccountMeta::new(*transaction, false),
            AccountMeta::new_readonly(*owner, true),
        ],
        data: anchor_instruction_discriminator("approve").to_vec(),
    }
}

/// Execute an approved wallet transaction.
///
/// Accounts:
/// 0. `[]` smart wallet
/// 1. `[writable]` transaction
/// 2. `[signer]` owner
/// 3. ..  every account of every stored instruction, then its program
pub fn execute_transaction(
    program_id: &Pubkey,
    wallet: &Pubkey,
    transaction: &Pubkey,
    owner: &Pubkey,
    instructions: &[TxInstruction],
) -> Instruction {
    let mut accounts = vec![
        AccountMeta::new_readonly(*wallet, false),
        AccountMeta::new(*transaction, false),
        AccountMeta::new_readonly(*owner, true),
    ];
    accounts.extend(instructions.iter().flat_map(|ix| ix.replay_accounts(wallet)));

    Instruction {
        program_id: *program_id,
        accounts,
        data: anchor_instruction_discriminator("execute_transaction").to_vec(),
    }
}
