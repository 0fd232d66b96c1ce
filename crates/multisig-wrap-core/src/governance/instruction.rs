//! Governance instruction builders and program addresses
//!
//! Instruction data is the instruction's position in the program's
//! instruction enum followed by its borsh encoded arguments.

use super::state::{InstructionData, Vote, VoteType};
use crate::config::GOVERNANCE_PROGRAM_VERSION_V3;
use borsh::BorshSerialize;
use solana_sdk::{
    instruction::{AccountMeta, Instruction},
    pubkey::Pubkey,
    system_program, sysvar,
};

pub const GOVERNANCE_SEED: &[u8] = b"governance";
pub const NATIVE_TREASURY_SEED: &[u8] = b"native-treasury";
pub const REALM_CONFIG_SEED: &[u8] = b"realm-config";
pub const PROPOSAL_DEPOSIT_SEED: &[u8] = b"proposal-deposit";

const CREATE_PROPOSAL: u8 = 6;
const INSERT_TRANSACTION: u8 = 9;
const SIGN_OFF_PROPOSAL: u8 = 12;
const CAST_VOTE: u8 = 13;
const FINALIZE_VOTE: u8 = 14;
const EXECUTE_TRANSACTION: u8 = 16;

// ============================================================================
// Addresses
// ============================================================================

pub fn token_owner_record_address(program_id: &Pubkey, realm: &Pubkey, mint: &Pubkey, owner: &Pubkey) -> Pubkey {
    Pubkey::find_program_address(
        &[GOVERNANCE_SEED, realm.as_ref(), mint.as_ref(), owner.as_ref()],
        program_id,
    )
    .0
}

/// Proposal address; `seed` is a random key (v3) or the LE proposal index (older)
pub fn proposal_address(program_id: &Pubkey, governance: &Pubkey, mint: &Pubkey, seed: &[u8]) -> Pubkey {
    Pubkey::find_program_address(&[GOVERNANCE_SEED, governance.as_ref(), mint.as_ref(), seed], program_id).0
}

pub fn proposal_transaction_address(program_id: &Pubkey, proposal: &Pubkey, option_index: u8, index: u16) -> Pubkey {
    Pubkey::find_program_address(
        &[GOVERNANCE_SEED, proposal.as_ref(), &[option_index], &index.to_le_bytes()],
        program_id,
    )
    .0
}

pub fn vote_record_address(program_id: &Pubkey, proposal: &Pubkey, token_owner_record: &Pubkey) -> Pubkey {
    Pubkey::find_program_address(
        &[GOVERNANCE_SEED, proposal.as_ref(), token_owner_record.as_ref()],
        program_id,
    )
    .0
}

/// Treasury account signed for by `governance`
pub fn native_treasury_address(program_id: &Pubkey, governance: &Pubkey) -> Pubkey {
    Pubkey::find_program_address(&[NATIVE_TREASURY_SEED, governance.as_ref()], program_id).0
}

pub fn realm_config_address(program_id: &Pubkey, realm: &Pubkey) -> Pubkey {
    Pubkey::find_program_address(&[REALM_CONFIG_SEED, realm.as_ref()], program_id).0
}

pub fn proposal_deposit_address(program_id: &Pubkey, proposal: &Pubkey, payer: &Pubkey) -> Pubkey {
    Pubkey::find_program_address(&[PROPOSAL_DEPOSIT_SEED, proposal.as_ref(), payer.as_ref()], program_id).0
}

fn data<T: BorshSerialize>(tag: u8, args: &T) -> Vec<u8> {
    let mut data = vec![tag];
    let _ = args.serialize(&mut data);
    data
}

// ============================================================================
// Proposal Creation
// ============================================================================

#[derive(BorshSerialize)]
struct CreateProposalArgs<'a> {
    name: &'a str,
    description_link: &'a str,
    vote_type: VoteType,
    options: Vec<String>,
    use_deny_option: bool,
}

/// Accounts taking part in creating and signing off a proposal
#[derive(Debug, Clone, Copy)]
pub struct ProposalAccounts {
    pub program_id: Pubkey,
    pub version: u8,
    pub realm: Pubkey,
    pub governance: Pubkey,
    pub proposal: Pubkey,
    pub token_owner_record: Pubkey,
    pub governing_token_mint: Pubkey,
    /// Owner or delegate of `token_owner_record`
    pub governance_authority: Pubkey,
    pub payer: Pubkey,
}

/// Create a single-choice proposal with one "approve" option and a deny option.
///
/// `seed` is the proposal seed key on v3 and ignored before.
pub fn create_proposal(accounts: &ProposalAccounts, name: &str, description_link: &str, seed: &Pubkey) -> Instruction {
    let mut data = data(
        CREATE_PROPOSAL,
        &CreateProposalArgs {
            name,
            description_link,
            vote_type: VoteType::SingleChoice,
            options: vec!["approve".to_string()],
            use_deny_option: true,
        },
    );

    let mut metas = vec![
        AccountMeta::new_readonly(accounts.realm, false),
        AccountMeta::new(accounts.proposal, false),
        AccountMeta::new(accounts.governance, false),
        AccountMeta::new(accounts.token_owner_record, false),
        AccountMeta::new_readonly(accounts.governing_token_mint, false),
        AccountMeta::new_readonly(accounts.governance_authority, true),
        AccountMeta::new(accounts.payer, true),
        AccountMeta::new_readonly(system_program::id(), false),
    ];

    if accounts.version >= GOVERNANCE_PROGRAM_VERSION_V3 {
        let _ = seed.serialize(&mut data);
        metas.push(AccountMeta::new_readonly(
            realm_config_address(&accounts.program_id, &accounts.realm),
            false,
        ));
        metas.push(AccountMeta::new(
            proposal_deposit_address(&accounts.program_id, &accounts.proposal, &accounts.payer),
            false,
        ));
    } else {
        metas.push(AccountMeta::new_readonly(sysvar::rent::id(), false));
        metas.push(AccountMeta::new_readonly(sysvar::clock::id(), false));
        metas.push(AccountMeta::new_readonly(
            realm_config_address(&accounts.program_id, &accounts.realm),
            false,
        ));
    }

    Instruction {
        program_id: accounts.program_id,
        accounts: metas,
        data,
    }
}

#[derive(BorshSerialize)]
struct InsertTransactionArgs<'a> {
    option_index: u8,
    index: u16,
    hold_up_time: u32,
    instructions: &'a [InstructionData],
}

/// Insert entry `index` of option 0 holding `instructions`
pub fn insert_transaction(accounts: &ProposalAccounts, index: u16, hold_up_time: u32, instructions: &[InstructionData]) -> Instruction {
    let option_index = 0;
    let mut metas = vec![
        AccountMeta::new_readonly(accounts.governance, false),
        AccountMeta::new(accounts.proposal, false),
        AccountMeta::new_readonly(accounts.token_owner_record, false),
        AccountMeta::new_readonly(accounts.governance_authority, true),
        AccountMeta::new(
            proposal_transaction_address(&accounts.program_id, &accounts.proposal, option_index, index),
            false,
        ),
        AccountMeta::new(accounts.payer, true),
        AccountMeta::new_readonly(system_program::id(), false),
    ];
    if accounts.version < GOVERNANCE_PROGRAM_VERSION_V3 {
        metas.push(AccountMeta::new_readonly(sysvar::rent::id(), false));
    }

    Instruction {
        program_id: accounts.program_id,
        accounts: metas,
        data: data(
            INSERT_TRANSACTION,
            &InsertTransactionArgs {
                option_index,
                index,
                hold_up_time,
                instructions,
            },
        ),
    }
}

/// Sign off the proposal as its owner, starting the vote
pub fn sign_off_proposal(accounts: &ProposalAccounts) -> Instruction {
    let mut metas = vec![
        AccountMeta::new(accounts.realm, false),
        AccountMeta::new(accounts.governance, false),
        AccountMeta::new(accounts.proposal, false),
        AccountMeta::new_readonly(accounts.governance_authority, true),
        AccountMeta::new_readonly(accounts.token_owner_record, false),
    ];
    if accounts.version < GOVERNANCE_PROGRAM_VERSION_V3 {
        metas.push(AccountMeta::new_readonly(sysvar::clock::id(), false));
    }

    Instruction {
        program_id: accounts.program_id,
        accounts: metas,
        data: vec![SIGN_OFF_PROPOSAL],
    }
}

// ============================================================================
// Voting
// ============================================================================

/// Accounts of an existing proposal
#[derive(Debug, Clone, Copy)]
pub struct VoteAccounts {
    pub program_id: Pubkey,
    pub realm: Pubkey,
    pub governance: Pubkey,
    pub proposal: Pubkey,
    /// Record of the proposal's creator
    pub proposal_owner_record: Pubkey,
    pub governing_token_mint: Pubkey,
}

/// Cast `vote` with the weight of `voter_record`
pub fn cast_vote(
    accounts: &VoteAccounts,
    voter_record: &Pubkey,
    governance_authority: &Pubkey,
    payer: &Pubkey,
    vote: &Vote,
) -> Instruction {
    Instruction {
        program_id: accounts.program_id,
        accounts: vec![
            AccountMeta::new(accounts.realm, false),
            AccountMeta::new(accounts.governance, false),
            AccountMeta::new(accounts.proposal, false),
            AccountMeta::new(accounts.proposal_owner_record, false),
            AccountMeta::new(*voter_record, false),
            AccountMeta::new_readonly(*governance_authority, true),
            AccountMeta::new(
                vote_record_address(&accounts.program_id, &accounts.proposal, voter_record),
                false,
            ),
            AccountMeta::new_readonly(accounts.governing_token_mint, false),
            AccountMeta::new(*payer, true),
            AccountMeta::new_readonly(system_program::id(), false),
            AccountMeta::new_readonly(realm_config_address(&accounts.program_id, &accounts.realm), false),
        ],
        data: data(CAST_VOTE, vote),
    }
}

/// Close voting once the voting time is over
pub fn finalize_vote(accounts: &VoteAccounts) -> Instruction {
    Instruction {
        program_id: accounts.program_id,
        accounts: vec![
            AccountMeta::new(accounts.realm, false),
            AccountMeta::new(accounts.governance, false),
            AccountMeta::new(accounts.proposal, false),
            AccountMeta::new(accounts.proposal_owner_record, false),
            AccountMeta::new_readonly(accounts.governing_token_mint, false),
            AccountMeta::new_readonly(realm_config_address(&accounts.program_id, &accounts.realm), false),
        ],
        data: vec![FINALIZE_VOTE],
    }
}

// ============================================================================
// Execution
// ============================================================================

/// Execute one proposal-transaction entry.
///
/// The governance and its native treasury sign through the program, so
/// they are passed as plain accounts.
pub fn execute_transaction(
    program_id: &Pubkey,
    governance: &Pubkey,
    proposal: &Pubkey,
    proposal_transaction: &Pubkey,
    instructions: &[InstructionData],
) -> Instruction {
    let treasury = native_treasury_address(program_id, governance);
    let mut metas = vec![
        AccountMeta::new_readonly(*governance, false),
        AccountMeta::new(*proposal, false),
        AccountMeta::new(*proposal_transaction, false),
    ];
    for ix in instructions {
        metas.push(AccountMeta::new_readonly(ix.program_id, false));
        metas.extend(ix.accounts.iter().map(|meta| {
            let is_signer = meta.is_signer && meta.pubkey != *governance && meta.pubkey != treasury;
            if meta.is_writable {
                AccountMeta::new(meta.pubkey, is_signer)
            } else {
                AccountMeta::new_readonly(meta.pubkey, is_signer)
            }
        }));
    }

    Instruction {
        program_id: *program_id,
        accounts: metas,
        data: vec![EXECUTE_TRANSACTION],
    }
}
